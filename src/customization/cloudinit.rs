//! Cloud-init customization
//!
//! Builds the cloud-init metadata document for a VM and hands it to the
//! guest either through a CloudInitPrep guest customization or through
//! guestinfo extra-config keys read by the VMware datasource.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::CustomizationSpecs;
use super::transport::CloudInitType;
use crate::constants::{
    CLOUD_INIT_GUEST_INFO_METADATA, CLOUD_INIT_GUEST_INFO_METADATA_ENCODING,
    CLOUD_INIT_GUEST_INFO_USERDATA, CLOUD_INIT_GUEST_INFO_USERDATA_ENCODING,
    GZIP_BASE64_ENCODING, LEGACY_USER_DATA_KEY, SSH_PUBLIC_KEYS_KEY, USER_DATA_KEY,
};
use crate::network::Netplan;
use crate::userdata::{encode_gzip_base64, try_decode_gzip_base64};
use crate::vm::{VirtualMachine, VirtualMachineContext, VirtualMachineResource, VmUpdateArgs};
use crate::vsphere::{
    ConfigInfo, ConfigSpec, CustomizationGlobalIpSettings, CustomizationIdentity,
    CustomizationSpec, merge_extra_config,
};
use crate::CustomizationError;

/// Cloud-init instance metadata (the `meta-data` document)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudInitMetadata {
    #[serde(rename = "instance-id", default, skip_serializing_if = "String::is_empty")]
    pub instance_id: String,
    #[serde(rename = "local-hostname", default, skip_serializing_if = "String::is_empty")]
    pub local_hostname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Netplan::is_empty")]
    pub network: Netplan,
    #[serde(rename = "public-keys", default, skip_serializing_if = "String::is_empty")]
    pub public_keys: String,
}

/// Render the metadata document for `vm`.
///
/// The instance id is the VM's UID, so the guest sees a re-customization
/// of the same VM as the same instance.
pub fn cloud_init_metadata(
    vm: &VirtualMachine,
    netplan: Netplan,
    data: &BTreeMap<String, String>,
) -> Result<String, CustomizationError> {
    let metadata = CloudInitMetadata {
        instance_id: vm.uid.clone(),
        local_hostname: vm.name.clone(),
        hostname: vm.name.clone(),
        network: netplan,
        public_keys: data.get(SSH_PUBLIC_KEYS_KEY).cloned().unwrap_or_default(),
    };

    Ok(serde_yaml::to_string(&metadata)?)
}

/// Guest customization spec that hands metadata and userdata to cloud-init
pub fn cloud_init_prep_cust_spec(
    cloud_init_metadata: String,
    update_args: &VmUpdateArgs,
) -> Result<CustomizationSpec, CustomizationError> {
    let mut userdata = update_args
        .vm_metadata
        .data
        .get(USER_DATA_KEY)
        .cloned()
        .unwrap_or_default();

    if !userdata.is_empty() {
        userdata = try_decode_gzip_base64(&userdata)
            .map_err(|e| e.for_payload("prep userdata"))?;
    }

    Ok(CustomizationSpec {
        identity: CustomizationIdentity::CloudInitPrep {
            metadata: cloud_init_metadata,
            userdata,
        },
        global_ip_settings: CustomizationGlobalIpSettings::default(),
        nic_setting_map: Vec::new(),
    })
}

/// Config spec that publishes metadata and userdata through guestinfo.
///
/// Both payloads are stored gzip+base64 encoded. The vApp config is
/// removed so cloud-init in the guest does not prefer the OVF datasource
/// over the VMware one. Removal is only requested while the VM still has a
/// vApp config or the guestinfo keys change, so a converged VM yields the
/// zero-value spec.
pub fn cloud_init_guest_info_spec(
    cloud_init_metadata: &str,
    config: &ConfigInfo,
    update_args: &VmUpdateArgs,
) -> Result<ConfigSpec, CustomizationError> {
    let mut extra_config = BTreeMap::new();

    let encoded_metadata =
        encode_gzip_base64(cloud_init_metadata).map_err(|e| e.for_payload("metadata"))?;
    extra_config.insert(CLOUD_INIT_GUEST_INFO_METADATA.to_string(), encoded_metadata);
    extra_config.insert(
        CLOUD_INIT_GUEST_INFO_METADATA_ENCODING.to_string(),
        GZIP_BASE64_ENCODING.to_string(),
    );

    // `value` is where cluster bootstrap secrets put their data
    let data = &update_args.vm_metadata.data;
    let userdata = [USER_DATA_KEY, LEGACY_USER_DATA_KEY]
        .iter()
        .filter_map(|key| data.get(*key))
        .find(|value| !value.is_empty());

    if let Some(userdata) = userdata {
        let plain_text =
            try_decode_gzip_base64(userdata).map_err(|e| e.for_payload("userdata"))?;
        let encoded = encode_gzip_base64(&plain_text).map_err(|e| e.for_payload("userdata"))?;

        extra_config.insert(CLOUD_INIT_GUEST_INFO_USERDATA.to_string(), encoded);
        extra_config.insert(
            CLOUD_INIT_GUEST_INFO_USERDATA_ENCODING.to_string(),
            GZIP_BASE64_ENCODING.to_string(),
        );
    }

    let extra_config = merge_extra_config(&config.extra_config, &extra_config);
    let vapp_config_removed =
        (config.vapp_config.is_some() || !extra_config.is_empty()).then_some(true);

    Ok(ConfigSpec {
        extra_config,
        vapp_config: None,
        vapp_config_removed,
    })
}

/// Produce the specs for the CloudInit transport
pub async fn customize_cloud_init(
    vm_ctx: &VirtualMachineContext,
    res_vm: &dyn VirtualMachineResource,
    config: &ConfigInfo,
    update_args: &VmUpdateArgs,
    cloud_init_type: CloudInitType,
) -> Result<CustomizationSpecs, CustomizationError> {
    let eth_cards = res_vm.get_network_devices().await?;

    let netplan = update_args
        .net_if_list
        .netplan(&eth_cards, &update_args.dns_servers);
    let metadata = cloud_init_metadata(&vm_ctx.vm, netplan, &update_args.vm_metadata.data)?;
    debug!("Cloud-init metadata:\n{}", metadata);

    let specs = match cloud_init_type {
        CloudInitType::CloudInitPrep => CustomizationSpecs {
            config_spec: None,
            cust_spec: Some(cloud_init_prep_cust_spec(metadata, update_args)?),
        },
        CloudInitType::GuestInfo => CustomizationSpecs {
            config_spec: Some(cloud_init_guest_info_spec(&metadata, config, update_args)?),
            cust_spec: None,
        },
    };
    Ok(specs)
}
