//! Hypervisor-side configuration types
//!
//! A sparse model of the vSphere objects the customization engine reads
//! (the live `ConfigInfo` snapshot, virtual ethernet cards) and produces
//! (`ConfigSpec` deltas and `CustomizationSpec` directives). Only the fields
//! this crate touches are modelled.

pub mod merge;

pub use merge::{
    apply_extra_config, extra_config_to_map, merge_extra_config, merged_vapp_config_spec,
};

use serde::{Deserialize, Serialize};

/// A single extra-config key/value entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValue {
    pub key: String,
    pub value: String,
}

impl OptionValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Snapshot of the live VM configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigInfo {
    pub extra_config: Vec<OptionValue>,
    pub vapp_config: Option<VmConfigInfo>,
}

/// vApp configuration of the live VM
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfigInfo {
    pub property: Vec<VAppPropertyInfo>,
}

/// A single vApp (OVF) property
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VAppPropertyInfo {
    pub key: i32,
    pub id: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_configurable: Option<bool>,
}

/// Operation applied to an array element in a spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayUpdateOperation {
    Add,
    Edit,
    Remove,
}

/// Change to one vApp property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VAppPropertySpec {
    pub operation: ArrayUpdateOperation,
    pub info: VAppPropertyInfo,
}

/// Change to the vApp configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VmConfigSpec {
    pub property: Vec<VAppPropertySpec>,
    pub ovf_environment_transport: Vec<String>,
}

/// Sparse configuration delta submitted by a reconfigure call.
///
/// `ConfigSpec::default()` is the zero value: submitting it would change
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigSpec {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_config: Vec<OptionValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vapp_config: Option<VmConfigSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vapp_config_removed: Option<bool>,
}

impl ConfigSpec {
    /// Whether this spec is equal to the zero value
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Guest identity customization directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizationSpec {
    pub identity: CustomizationIdentity,
    #[serde(default)]
    pub global_ip_settings: CustomizationGlobalIpSettings,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nic_setting_map: Vec<CustomizationAdapterMapping>,
}

/// OS specific part of a customization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CustomizationIdentity {
    /// Linux guest preparation by the guest tools
    #[serde(rename_all = "camelCase")]
    LinuxPrep {
        host_name: String,
        hw_clock_utc: Option<bool>,
    },
    /// Hand metadata and userdata to cloud-init inside the guest
    CloudInitPrep { metadata: String, userdata: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomizationGlobalIpSettings {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dns_server_list: Vec<String>,
}

/// Network settings for one adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizationAdapterMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    pub adapter: CustomizationIpSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizationIpSettings {
    pub ip: CustomizationIpGenerator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_mask: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateway: Vec<String>,
}

/// How an adapter obtains its address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CustomizationIpGenerator {
    #[serde(rename_all = "camelCase")]
    Fixed { ip_address: String },
    Dhcp,
}

/// A virtual ethernet card attached to the live VM
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VirtualEthernetCard {
    pub key: i32,
    pub mac_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_spec_is_empty() {
        assert!(ConfigSpec::default().is_empty());

        let spec = ConfigSpec {
            vapp_config_removed: Some(true),
            ..Default::default()
        };
        assert!(!spec.is_empty());

        let spec = ConfigSpec {
            extra_config: vec![OptionValue::new("guestinfo.a", "1")],
            ..Default::default()
        };
        assert!(!spec.is_empty());
    }

    #[test]
    fn test_config_info_from_yaml() {
        let yaml = r#"
extraConfig:
  - key: guestinfo.metadata
    value: abc
vappConfig:
  property:
    - key: 1
      id: hostname
      value: old
      userConfigurable: true
"#;
        let info: ConfigInfo = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(info.extra_config.len(), 1);
        let vapp = info.vapp_config.unwrap();
        assert_eq!(vapp.property[0].id, "hostname");
        assert_eq!(vapp.property[0].user_configurable, Some(true));
    }

    #[test]
    fn test_empty_config_spec_serializes_compactly() {
        let json = serde_json::to_string(&ConfigSpec::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
