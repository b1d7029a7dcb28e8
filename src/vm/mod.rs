//! Desired-state VM model and per-pass update arguments

pub mod memory;
pub mod resource;

pub use memory::{InMemoryVm, VmCall};
pub use resource::VirtualMachineResource;

use crate::network::NetIfList;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Desired-state virtual machine object.
///
/// Owned by the cluster; the customization engine only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualMachine {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub spec: VirtualMachineSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualMachineSpec {
    pub image_name: String,
    pub class_name: String,
    pub power_state: String,
}

impl VirtualMachine {
    /// Create a VM with a freshly generated UID
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            uid: uuid::Uuid::new_v4().to_string(),
            ..Default::default()
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// How customization data reaches the guest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataTransport {
    CloudInit,
    OvfEnv,
    ExtraConfig,
    /// Unset or unrecognized: plain Linux guest customization
    #[default]
    #[serde(other)]
    Unspecified,
}

impl std::fmt::Display for MetadataTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataTransport::CloudInit => write!(f, "CloudInit"),
            MetadataTransport::OvfEnv => write!(f, "OvfEnv"),
            MetadataTransport::ExtraConfig => write!(f, "ExtraConfig"),
            MetadataTransport::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// User supplied metadata and the transport used to deliver it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmMetadata {
    pub data: BTreeMap<String, String>,
    pub transport: MetadataTransport,
}

/// Arguments for one customization pass.
///
/// Built fresh by the caller for every pass. Metadata templating rewrites
/// `vm_metadata.data` in place, so the values read by transport selection
/// are the rendered ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VmUpdateArgs {
    pub vm_metadata: VmMetadata,
    pub net_if_list: NetIfList,
    pub dns_servers: Vec<String>,
}

/// The VM a pass operates on
#[derive(Debug, Clone)]
pub struct VirtualMachineContext {
    pub vm: VirtualMachine,
}

impl VirtualMachineContext {
    pub fn new(vm: VirtualMachine) -> Self {
        Self { vm }
    }
}

impl std::fmt::Display for VirtualMachineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.vm.namespace, self.vm.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_vm_has_uid() {
        let a = VirtualMachine::new("web", "default");
        let b = VirtualMachine::new("web", "default");
        assert!(!a.uid.is_empty());
        assert_ne!(a.uid, b.uid);
    }

    #[test]
    fn test_transport_from_yaml() {
        let meta: VmMetadata = serde_yaml::from_str("transport: CloudInit").unwrap();
        assert_eq!(meta.transport, MetadataTransport::CloudInit);

        let meta: VmMetadata = serde_yaml::from_str("transport: Sysprep").unwrap();
        assert_eq!(meta.transport, MetadataTransport::Unspecified);

        let meta: VmMetadata = serde_yaml::from_str("data:\n  a: b").unwrap();
        assert_eq!(meta.transport, MetadataTransport::Unspecified);
    }

    #[test]
    fn test_context_display() {
        let ctx = VirtualMachineContext::new(VirtualMachine::new("web", "prod"));
        assert_eq!(ctx.to_string(), "prod/web");
    }
}
