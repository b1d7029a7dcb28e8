//! In-memory VM
//!
//! A [`VirtualMachineResource`] backed by a local configuration snapshot.
//! Reconfigure deltas are applied to the snapshot, and a started
//! customization sets the pending marker the way the guest tools do. Every
//! call is recorded. Used for dry-run planning and in tests.
//!
//! # Example
//! ```
//! use vm_customize_rs::vm::InMemoryVm;
//! use vm_customize_rs::vsphere::OptionValue;
//!
//! let vm = InMemoryVm::new()
//!     .with_extra_config(vec![OptionValue::new("guestinfo.role", "web")]);
//! assert_eq!(vm.config_info().extra_config.len(), 1);
//! ```

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::VirtualMachineResource;
use crate::TaskError;
use crate::constants::GOSC_PENDING_EXTRA_CONFIG_KEY;
use crate::vsphere::{
    ConfigInfo, ConfigSpec, CustomizationSpec, OptionValue, VAppPropertyInfo, VirtualEthernetCard,
    VmConfigInfo, apply_extra_config,
};

/// A call made against an [`InMemoryVm`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", content = "spec", rename_all = "camelCase")]
pub enum VmCall {
    GetNetworkDevices,
    Reconfigure(ConfigSpec),
    Customize(CustomizationSpec),
}

#[derive(Debug, Default)]
struct State {
    config: ConfigInfo,
    calls: Vec<VmCall>,
}

/// VM held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryVm {
    state: Mutex<State>,
    eth_cards: Vec<VirtualEthernetCard>,
    network_error: Option<TaskError>,
    reconfigure_error: Option<TaskError>,
    customize_error: Option<TaskError>,
}

impl InMemoryVm {
    /// Create a VM with an empty configuration and no NICs
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration snapshot
    pub fn with_config_info(self, config: ConfigInfo) -> Self {
        self.lock().config = config;
        self
    }

    /// Set the live extra-config entries
    pub fn with_extra_config(self, extra_config: Vec<OptionValue>) -> Self {
        self.lock().config.extra_config = extra_config;
        self
    }

    /// Give the VM a vApp configuration with the given properties
    pub fn with_vapp_properties(self, property: Vec<VAppPropertyInfo>) -> Self {
        self.lock().config.vapp_config = Some(VmConfigInfo { property });
        self
    }

    /// Set the attached virtual ethernet cards
    pub fn with_eth_cards(mut self, eth_cards: Vec<VirtualEthernetCard>) -> Self {
        self.eth_cards = eth_cards;
        self
    }

    /// Fail every network device query
    pub fn with_network_error(mut self, error: TaskError) -> Self {
        self.network_error = Some(error);
        self
    }

    /// Fail every reconfigure call
    pub fn with_reconfigure_error(mut self, error: TaskError) -> Self {
        self.reconfigure_error = Some(error);
        self
    }

    /// Fail every customize call
    pub fn with_customize_error(mut self, error: TaskError) -> Self {
        self.customize_error = Some(error);
        self
    }

    /// Current configuration snapshot
    pub fn config_info(&self) -> ConfigInfo {
        self.lock().config.clone()
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<VmCall> {
        self.lock().calls.clone()
    }

    pub fn reconfigure_calls(&self) -> Vec<ConfigSpec> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                VmCall::Reconfigure(spec) => Some(spec.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn customize_calls(&self) -> Vec<CustomizationSpec> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                VmCall::Customize(spec) => Some(spec.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clear the pending-customization marker, as the guest does once it
    /// has processed a customization
    pub fn acknowledge_customization(&self) {
        let mut state = self.lock();
        state
            .config
            .extra_config
            .retain(|opt| opt.key != GOSC_PENDING_EXTRA_CONFIG_KEY);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl VirtualMachineResource for InMemoryVm {
    async fn get_network_devices(&self) -> Result<Vec<VirtualEthernetCard>, TaskError> {
        self.lock().calls.push(VmCall::GetNetworkDevices);
        if let Some(error) = &self.network_error {
            return Err(error.clone());
        }
        Ok(self.eth_cards.clone())
    }

    async fn reconfigure(&self, spec: &ConfigSpec) -> Result<(), TaskError> {
        let mut state = self.lock();
        state.calls.push(VmCall::Reconfigure(spec.clone()));
        if let Some(error) = &self.reconfigure_error {
            return Err(error.clone());
        }

        let merged = apply_extra_config(&state.config.extra_config, &spec.extra_config);
        state.config.extra_config = merged;

        if spec.vapp_config_removed == Some(true) {
            state.config.vapp_config = None;
        } else if let (Some(vapp_spec), Some(vapp_info)) =
            (&spec.vapp_config, state.config.vapp_config.as_mut())
        {
            for prop_spec in &vapp_spec.property {
                if let Some(prop) = vapp_info
                    .property
                    .iter_mut()
                    .find(|p| p.id == prop_spec.info.id)
                {
                    prop.value = prop_spec.info.value.clone();
                }
            }
        }

        debug!("In-memory VM reconfigured");
        Ok(())
    }

    async fn customize(&self, spec: &CustomizationSpec) -> Result<(), TaskError> {
        let mut state = self.lock();
        state.calls.push(VmCall::Customize(spec.clone()));
        if let Some(error) = &self.customize_error {
            return Err(error.clone());
        }

        let marker = vec![OptionValue::new(
            GOSC_PENDING_EXTRA_CONFIG_KEY,
            "imc-package.tar",
        )];
        let merged = apply_extra_config(&state.config.extra_config, &marker);
        state.config.extra_config = merged;

        debug!("In-memory VM customization started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsphere::{CustomizationGlobalIpSettings, CustomizationIdentity};

    fn linux_prep() -> CustomizationSpec {
        CustomizationSpec {
            identity: CustomizationIdentity::LinuxPrep {
                host_name: "vm".to_string(),
                hw_clock_utc: Some(true),
            },
            global_ip_settings: CustomizationGlobalIpSettings::default(),
            nic_setting_map: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_reconfigure_applies_delta() {
        let vm = InMemoryVm::new().with_extra_config(vec![OptionValue::new("keep", "1")]);
        let spec = ConfigSpec {
            extra_config: vec![OptionValue::new("guestinfo.a", "b")],
            ..Default::default()
        };

        vm.reconfigure(&spec).await.unwrap();

        let info = vm.config_info();
        assert_eq!(info.extra_config.len(), 2);
        assert_eq!(vm.reconfigure_calls(), vec![spec]);
    }

    #[tokio::test]
    async fn test_reconfigure_removes_vapp_config() {
        let vm = InMemoryVm::new().with_vapp_properties(Vec::new());
        let spec = ConfigSpec {
            vapp_config_removed: Some(true),
            ..Default::default()
        };

        vm.reconfigure(&spec).await.unwrap();
        assert!(vm.config_info().vapp_config.is_none());
    }

    #[tokio::test]
    async fn test_customize_sets_and_acknowledge_clears_marker() {
        let vm = InMemoryVm::new();

        vm.customize(&linux_prep()).await.unwrap();
        assert!(
            vm.config_info()
                .extra_config
                .iter()
                .any(|opt| opt.key == GOSC_PENDING_EXTRA_CONFIG_KEY)
        );

        vm.acknowledge_customization();
        assert!(vm.config_info().extra_config.is_empty());
    }

    #[tokio::test]
    async fn test_scripted_errors() {
        let vm = InMemoryVm::new()
            .with_network_error(TaskError::new("no devices"))
            .with_reconfigure_error(TaskError::new("locked"));

        assert!(vm.get_network_devices().await.is_err());
        assert!(vm.reconfigure(&ConfigSpec::default()).await.is_err());
        assert_eq!(vm.calls().len(), 2);
    }
}
