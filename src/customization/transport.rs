//! Customization transport selection
//!
//! Each transport produces at most one config spec (applied by
//! reconfiguring the VM) and at most one guest customization spec:
//!
//! | Transport                 | config spec            | customization spec |
//! |---------------------------|------------------------|--------------------|
//! | CloudInit, cloud-init-prep| -                      | CloudInitPrep      |
//! | CloudInit, guestinfo      | guestinfo extra-config | -                  |
//! | OvfEnv                    | vApp properties        | LinuxPrep          |
//! | ExtraConfig               | `guestinfo.*` keys     | LinuxPrep          |
//! | unspecified               | -                      | LinuxPrep          |

use std::collections::BTreeMap;
use tracing::debug;

use super::CustomizationSpecs;
use super::cloudinit::customize_cloud_init;
use crate::constants::{
    CLOUD_INIT_TYPE_ANNOTATION, CLOUD_INIT_TYPE_VALUE_CLOUD_INIT_PREP,
    EXTRA_CONFIG_GUEST_INFO_PREFIX,
};
use crate::vm::{
    MetadataTransport, VirtualMachine, VirtualMachineContext, VirtualMachineResource,
    VmUpdateArgs,
};
use crate::vsphere::{
    ConfigInfo, ConfigSpec, CustomizationGlobalIpSettings, CustomizationIdentity,
    CustomizationSpec, merge_extra_config, merged_vapp_config_spec,
};
use crate::CustomizationError;

/// How cloud-init data is handed to the guest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudInitType {
    /// Through a CloudInitPrep guest customization
    CloudInitPrep,
    /// Through guestinfo extra-config keys
    GuestInfo,
}

/// Resolved customization transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    CloudInit(CloudInitType),
    OvfEnv,
    ExtraConfig,
    /// Plain Linux guest customization, no metadata
    LinuxPrep,
}

impl Transport {
    /// Resolve the transport declared for `vm`.
    ///
    /// The cloud-init sub-kind comes from the cloud-init type annotation;
    /// anything other than `cloud-init-prep` selects guestinfo.
    pub fn resolve(vm: &VirtualMachine, transport: MetadataTransport) -> Self {
        match transport {
            MetadataTransport::CloudInit => {
                match vm.annotation(CLOUD_INIT_TYPE_ANNOTATION) {
                    Some(CLOUD_INIT_TYPE_VALUE_CLOUD_INIT_PREP) => {
                        Transport::CloudInit(CloudInitType::CloudInitPrep)
                    }
                    _ => Transport::CloudInit(CloudInitType::GuestInfo),
                }
            }
            MetadataTransport::OvfEnv => Transport::OvfEnv,
            MetadataTransport::ExtraConfig => Transport::ExtraConfig,
            MetadataTransport::Unspecified => Transport::LinuxPrep,
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::CloudInit(CloudInitType::CloudInitPrep) => write!(f, "cloud-init (prep)"),
            Transport::CloudInit(CloudInitType::GuestInfo) => write!(f, "cloud-init (guestinfo)"),
            Transport::OvfEnv => write!(f, "ovf-env"),
            Transport::ExtraConfig => write!(f, "extra-config"),
            Transport::LinuxPrep => write!(f, "linux-prep"),
        }
    }
}

/// Linux guest customization: host name, UTC hardware clock, DNS and
/// per-adapter IP settings
pub fn linux_prep_cust_spec(vm_name: &str, update_args: &VmUpdateArgs) -> CustomizationSpec {
    CustomizationSpec {
        identity: CustomizationIdentity::LinuxPrep {
            host_name: vm_name.to_string(),
            hw_clock_utc: Some(true),
        },
        global_ip_settings: CustomizationGlobalIpSettings {
            dns_server_list: update_args.dns_servers.clone(),
        },
        nic_setting_map: update_args.net_if_list.interface_customizations(),
    }
}

/// Config spec copying the `guestinfo.` prefixed metadata keys verbatim.
///
/// `None` when the metadata has no such key.
pub fn extra_config_cust_spec(config: &ConfigInfo, update_args: &VmUpdateArgs) -> Option<ConfigSpec> {
    let extra_config: BTreeMap<String, String> = update_args
        .vm_metadata
        .data
        .iter()
        .filter(|(key, _)| key.starts_with(EXTRA_CONFIG_GUEST_INFO_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    if extra_config.is_empty() {
        return None;
    }

    Some(ConfigSpec {
        extra_config: merge_extra_config(&config.extra_config, &extra_config),
        ..Default::default()
    })
}

/// Config spec setting the VM's user-configurable vApp properties from
/// metadata.
///
/// `None` when the VM has no vApp config.
pub fn ovf_env_cust_spec(config: &ConfigInfo, update_args: &VmUpdateArgs) -> Option<ConfigSpec> {
    let vapp_config = config.vapp_config.as_ref()?;

    Some(ConfigSpec {
        vapp_config: merged_vapp_config_spec(&update_args.vm_metadata.data, &vapp_config.property),
        ..Default::default()
    })
}

/// Produce the config and customization specs for `transport`
pub async fn select(
    transport: Transport,
    vm_ctx: &VirtualMachineContext,
    res_vm: &dyn VirtualMachineResource,
    config: &ConfigInfo,
    update_args: &VmUpdateArgs,
) -> Result<CustomizationSpecs, CustomizationError> {
    debug!("Selected customization transport: {}", transport);

    let specs = match transport {
        Transport::CloudInit(cloud_init_type) => {
            customize_cloud_init(vm_ctx, res_vm, config, update_args, cloud_init_type).await?
        }
        Transport::OvfEnv => CustomizationSpecs {
            config_spec: ovf_env_cust_spec(config, update_args),
            cust_spec: Some(linux_prep_cust_spec(&vm_ctx.vm.name, update_args)),
        },
        Transport::ExtraConfig => CustomizationSpecs {
            config_spec: extra_config_cust_spec(config, update_args),
            cust_spec: Some(linux_prep_cust_spec(&vm_ctx.vm.name, update_args)),
        },
        Transport::LinuxPrep => CustomizationSpecs {
            config_spec: None,
            cust_spec: Some(linux_prep_cust_spec(&vm_ctx.vm.name, update_args)),
        },
    };
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CLOUD_INIT_TYPE_VALUE_GUEST_INFO;
    use crate::network::{IpConfiguration, NetIfList, NetworkInterfaceInfo};
    use crate::vsphere::{OptionValue, VAppPropertyInfo, VmConfigInfo};

    fn args_with(pairs: &[(&str, &str)]) -> VmUpdateArgs {
        let mut args = VmUpdateArgs {
            dns_servers: vec!["1.1.1.1".to_string()],
            net_if_list: NetIfList(vec![NetworkInterfaceInfo {
                mac_address: None,
                ip_configuration: IpConfiguration {
                    ip: "10.0.0.5".to_string(),
                    subnet_mask: "255.255.255.0".to_string(),
                    gateway: "10.0.0.1".to_string(),
                },
            }]),
            ..Default::default()
        };
        for (k, v) in pairs {
            args.vm_metadata.data.insert(k.to_string(), v.to_string());
        }
        args
    }

    #[test]
    fn test_resolve_transport() {
        let vm = VirtualMachine::new("vm", "ns");
        assert_eq!(
            Transport::resolve(&vm, MetadataTransport::CloudInit),
            Transport::CloudInit(CloudInitType::GuestInfo)
        );
        assert_eq!(Transport::resolve(&vm, MetadataTransport::OvfEnv), Transport::OvfEnv);
        assert_eq!(
            Transport::resolve(&vm, MetadataTransport::ExtraConfig),
            Transport::ExtraConfig
        );
        assert_eq!(
            Transport::resolve(&vm, MetadataTransport::Unspecified),
            Transport::LinuxPrep
        );

        let prep = vm
            .clone()
            .with_annotation(CLOUD_INIT_TYPE_ANNOTATION, CLOUD_INIT_TYPE_VALUE_CLOUD_INIT_PREP);
        assert_eq!(
            Transport::resolve(&prep, MetadataTransport::CloudInit),
            Transport::CloudInit(CloudInitType::CloudInitPrep)
        );

        let guest_info = vm
            .clone()
            .with_annotation(CLOUD_INIT_TYPE_ANNOTATION, CLOUD_INIT_TYPE_VALUE_GUEST_INFO);
        assert_eq!(
            Transport::resolve(&guest_info, MetadataTransport::CloudInit),
            Transport::CloudInit(CloudInitType::GuestInfo)
        );

        let unknown = vm.with_annotation(CLOUD_INIT_TYPE_ANNOTATION, "something-else");
        assert_eq!(
            Transport::resolve(&unknown, MetadataTransport::CloudInit),
            Transport::CloudInit(CloudInitType::GuestInfo)
        );
    }

    #[test]
    fn test_linux_prep_spec() {
        let spec = linux_prep_cust_spec("web-0", &args_with(&[]));
        assert_eq!(
            spec.identity,
            CustomizationIdentity::LinuxPrep {
                host_name: "web-0".to_string(),
                hw_clock_utc: Some(true),
            }
        );
        assert_eq!(spec.global_ip_settings.dns_server_list, vec!["1.1.1.1"]);
        assert_eq!(spec.nic_setting_map.len(), 1);
    }

    #[test]
    fn test_extra_config_copies_prefixed_keys_only() {
        let args = args_with(&[
            ("guestinfo.role", "web"),
            ("guestinfo.zone", "a"),
            ("user-data", "ignored"),
            ("guestinfoX", "ignored"),
        ]);
        let spec = extra_config_cust_spec(&ConfigInfo::default(), &args).unwrap();

        assert_eq!(
            spec.extra_config,
            vec![
                OptionValue::new("guestinfo.role", "web"),
                OptionValue::new("guestinfo.zone", "a"),
            ]
        );
        assert!(spec.vapp_config.is_none());
        assert!(spec.vapp_config_removed.is_none());
    }

    #[test]
    fn test_extra_config_without_prefixed_keys() {
        let args = args_with(&[("user-data", "x")]);
        assert!(extra_config_cust_spec(&ConfigInfo::default(), &args).is_none());
    }

    #[test]
    fn test_extra_config_already_applied_is_zero() {
        let args = args_with(&[("guestinfo.role", "web")]);
        let live = ConfigInfo {
            extra_config: vec![OptionValue::new("guestinfo.role", "web")],
            ..Default::default()
        };
        let spec = extra_config_cust_spec(&live, &args).unwrap();
        assert!(spec.is_empty());
    }

    #[test]
    fn test_ovf_env_without_vapp_config() {
        let args = args_with(&[("hostname", "web")]);
        assert!(ovf_env_cust_spec(&ConfigInfo::default(), &args).is_none());
    }

    #[test]
    fn test_ovf_env_sets_properties() {
        let live = ConfigInfo {
            vapp_config: Some(VmConfigInfo {
                property: vec![VAppPropertyInfo {
                    key: 1,
                    id: "hostname".to_string(),
                    value: "old".to_string(),
                    user_configurable: Some(true),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        };

        let spec = ovf_env_cust_spec(&live, &args_with(&[("hostname", "web")])).unwrap();
        let vapp = spec.vapp_config.unwrap();
        assert_eq!(vapp.property[0].info.value, "web");

        let spec = ovf_env_cust_spec(&live, &args_with(&[("hostname", "old")])).unwrap();
        assert!(spec.is_empty());
    }
}
