//! Well-known keys, annotations and values shared with the guest and the operator

/// Extra-config key the guest tools set while a customization is outstanding
pub const GOSC_PENDING_EXTRA_CONFIG_KEY: &str = "tools.deployPkg.fileName";

/// Prefix of extra-config keys copied by the ExtraConfig transport
pub const EXTRA_CONFIG_GUEST_INFO_PREFIX: &str = "guestinfo.";

pub const CLOUD_INIT_GUEST_INFO_METADATA: &str = "guestinfo.metadata";
pub const CLOUD_INIT_GUEST_INFO_METADATA_ENCODING: &str = "guestinfo.metadata.encoding";
pub const CLOUD_INIT_GUEST_INFO_USERDATA: &str = "guestinfo.userdata";
pub const CLOUD_INIT_GUEST_INFO_USERDATA_ENCODING: &str = "guestinfo.userdata.encoding";

/// Encoding marker written next to encoded guestinfo payloads
pub const GZIP_BASE64_ENCODING: &str = "gzip+base64";

/// Annotation selecting how cloud-init data reaches the guest
pub const CLOUD_INIT_TYPE_ANNOTATION: &str = "vsphere.vmware.com/cloud-init-type";
pub const CLOUD_INIT_TYPE_VALUE_CLOUD_INIT_PREP: &str = "cloud-init-prep";
pub const CLOUD_INIT_TYPE_VALUE_GUEST_INFO: &str = "guestinfo";

/// Annotation that lets an operator bypass guest customization
pub const VSPHERE_CUSTOMIZATION_BYPASS_KEY: &str = "vsphere.vmware.com/vsphere-customization";
pub const VSPHERE_CUSTOMIZATION_BYPASS_DISABLE: &str = "disable";

/// Metadata keys
pub const USER_DATA_KEY: &str = "user-data";
pub const LEGACY_USER_DATA_KEY: &str = "value";
pub const SSH_PUBLIC_KEYS_KEY: &str = "ssh-public-keys";

/// OVF environment transport used for vApp properties
pub const OVF_ENV_TRANSPORT_GUEST_INFO: &str = "com.vmware.guestInfo";

/// Feature flag enabling metadata templating
pub const TEMPLATING_FEATURE_ENV: &str = "FSS_WCP_VMSERVICE_BYOI";
