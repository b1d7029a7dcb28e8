//! Guest customization of a VM
//!
//! One call to [`Session::customize`] is one reconciliation pass: it
//! derives the config and customization specs for the VM's transport,
//! reconfigures the VM if the config spec changes anything, and starts a
//! guest customization unless one is bypassed or already pending.
//!
//! Nothing is retried here. A failed pass returns an error and the caller
//! runs the pass again later; reconfiguring only with non-empty deltas and
//! checking the pending marker before customizing make that safe.

pub mod cloudinit;
pub mod transport;

pub use transport::{CloudInitType, Transport};

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::constants::{
    GOSC_PENDING_EXTRA_CONFIG_KEY, VSPHERE_CUSTOMIZATION_BYPASS_DISABLE,
    VSPHERE_CUSTOMIZATION_BYPASS_KEY,
};
use crate::template::{normalize_vm_metadata, template_vm_metadata};
use crate::vm::{VirtualMachineContext, VirtualMachineResource, VmUpdateArgs};
use crate::vsphere::{ConfigInfo, ConfigSpec, CustomizationSpec, OptionValue};
use crate::CustomizationError;

/// Specs produced for one pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizationSpecs {
    /// Applied with a reconfigure call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_spec: Option<ConfigSpec>,
    /// Applied with a guest customization call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cust_spec: Option<CustomizationSpec>,
}

/// Whether the live extra-config carries a non-empty pending-customization
/// marker
pub fn is_customization_pending_extra_config(extra_config: &[OptionValue]) -> bool {
    extra_config
        .iter()
        .find(|opt| opt.key == GOSC_PENDING_EXTRA_CONFIG_KEY)
        .is_some_and(|opt| !opt.value.is_empty())
}

/// Customization engine.
///
/// Holds no per-VM state, so one session can serve passes for many VMs
/// concurrently.
#[derive(Debug, Clone, Default)]
pub struct Session {
    config: EngineConfig,
}

impl Session {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Prepare the metadata and compute the specs for one pass without
    /// applying them.
    ///
    /// Metadata values in `update_args` are rewritten in place: rendered
    /// when templating is enabled, otherwise only unescaped.
    pub async fn customization_specs(
        &self,
        vm_ctx: &VirtualMachineContext,
        res_vm: &dyn VirtualMachineResource,
        config: &ConfigInfo,
        update_args: &mut VmUpdateArgs,
    ) -> Result<CustomizationSpecs, CustomizationError> {
        if self.config.templating_enabled {
            template_vm_metadata(vm_ctx, update_args);
        } else {
            normalize_vm_metadata(update_args);
        }

        let transport = Transport::resolve(&vm_ctx.vm, update_args.vm_metadata.transport);
        transport::select(transport, vm_ctx, res_vm, config, update_args).await
    }

    /// Run one customization pass against `res_vm`.
    ///
    /// `config` is the live configuration snapshot the pass decides on.
    #[instrument(skip_all, fields(vm = %vm_ctx))]
    pub async fn customize(
        &self,
        vm_ctx: &VirtualMachineContext,
        res_vm: &dyn VirtualMachineResource,
        config: &ConfigInfo,
        update_args: &mut VmUpdateArgs,
    ) -> Result<(), CustomizationError> {
        let specs = self
            .customization_specs(vm_ctx, res_vm, config, update_args)
            .await?;

        if let Some(config_spec) = specs.config_spec.filter(|spec| !spec.is_empty()) {
            info!(config_spec = ?config_spec, "Customization reconfigure");
            if let Err(e) = res_vm.reconfigure(&config_spec).await {
                error!(config_spec = ?config_spec, "Customization reconfigure failed: {}", e);
                return Err(e.into());
            }
        }

        let Some(cust_spec) = specs.cust_spec else {
            return Ok(());
        };

        if vm_ctx.vm.annotation(VSPHERE_CUSTOMIZATION_BYPASS_KEY)
            == Some(VSPHERE_CUSTOMIZATION_BYPASS_DISABLE)
        {
            info!("Skipping vSphere customization because of the customization bypass annotation");
            return Ok(());
        }

        // TODO: detect a stale pending marker and clear it; until then a
        // customization the guest never acknowledges blocks all later ones.
        if is_customization_pending_extra_config(&config.extra_config) {
            info!("Skipping customization because it is already pending");
            return Ok(());
        }

        info!(customization_spec = ?cust_spec, "Customizing VM");
        if let Err(e) = res_vm.customize(&cust_spec).await {
            if !e.is_customization_pending() {
                return Err(e.into());
            }
            warn!("Customization already pending on the VM: {}", e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{InMemoryVm, MetadataTransport, VirtualMachine, VmCall};
    use crate::{Fault, TaskError};

    fn pass_args(transport: MetadataTransport, pairs: &[(&str, &str)]) -> VmUpdateArgs {
        let mut args = VmUpdateArgs::default();
        args.vm_metadata.transport = transport;
        for (k, v) in pairs {
            args.vm_metadata.data.insert(k.to_string(), v.to_string());
        }
        args
    }

    #[test]
    fn test_pending_marker() {
        assert!(!is_customization_pending_extra_config(&[]));
        assert!(!is_customization_pending_extra_config(&[OptionValue::new(
            GOSC_PENDING_EXTRA_CONFIG_KEY,
            ""
        )]));
        assert!(is_customization_pending_extra_config(&[
            OptionValue::new("other", "x"),
            OptionValue::new(GOSC_PENDING_EXTRA_CONFIG_KEY, "/tmp/imc.tar"),
        ]));
    }

    #[tokio::test]
    async fn test_linux_prep_customizes() {
        let session = Session::default();
        let vm_ctx = VirtualMachineContext::new(VirtualMachine::new("web-0", "prod"));
        let res_vm = InMemoryVm::new();
        let mut args = pass_args(MetadataTransport::Unspecified, &[]);

        session
            .customize(&vm_ctx, &res_vm, &res_vm.config_info(), &mut args)
            .await
            .unwrap();

        assert!(res_vm.reconfigure_calls().is_empty());
        assert_eq!(res_vm.customize_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_bypass_annotation_skips_customize() {
        let session = Session::default();
        let vm = VirtualMachine::new("web-0", "prod").with_annotation(
            VSPHERE_CUSTOMIZATION_BYPASS_KEY,
            VSPHERE_CUSTOMIZATION_BYPASS_DISABLE,
        );
        let vm_ctx = VirtualMachineContext::new(vm);
        let res_vm = InMemoryVm::new();
        let mut args = pass_args(MetadataTransport::ExtraConfig, &[("guestinfo.a", "b")]);

        session
            .customize(&vm_ctx, &res_vm, &res_vm.config_info(), &mut args)
            .await
            .unwrap();

        // The config spec is still applied
        assert_eq!(res_vm.reconfigure_calls().len(), 1);
        assert!(res_vm.customize_calls().is_empty());
    }

    #[tokio::test]
    async fn test_pending_marker_skips_customize() {
        let session = Session::default();
        let vm_ctx = VirtualMachineContext::new(VirtualMachine::new("web-0", "prod"));
        let res_vm = InMemoryVm::new().with_extra_config(vec![OptionValue::new(
            GOSC_PENDING_EXTRA_CONFIG_KEY,
            "imc.tar",
        )]);
        let mut args = pass_args(MetadataTransport::Unspecified, &[]);

        session
            .customize(&vm_ctx, &res_vm, &res_vm.config_info(), &mut args)
            .await
            .unwrap();

        assert!(res_vm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_pending_fault_is_success() {
        let session = Session::default();
        let vm_ctx = VirtualMachineContext::new(VirtualMachine::new("web-0", "prod"));
        let res_vm = InMemoryVm::new().with_customize_error(TaskError::with_fault(
            Fault::CustomizationPending,
            "customization pending",
        ));
        let mut args = pass_args(MetadataTransport::Unspecified, &[]);

        let result = session
            .customize(&vm_ctx, &res_vm, &res_vm.config_info(), &mut args)
            .await;
        assert!(result.is_ok());
        assert_eq!(res_vm.customize_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_other_customize_fault_is_error() {
        let session = Session::default();
        let vm_ctx = VirtualMachineContext::new(VirtualMachine::new("web-0", "prod"));
        let res_vm = InMemoryVm::new().with_customize_error(TaskError::with_fault(
            Fault::Other("InvalidPowerState".to_string()),
            "vm is powered on",
        ));
        let mut args = pass_args(MetadataTransport::Unspecified, &[]);

        let err = session
            .customize(&vm_ctx, &res_vm, &res_vm.config_info(), &mut args)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "vm is powered on");
    }

    #[tokio::test]
    async fn test_reconfigure_failure_stops_pass() {
        let session = Session::default();
        let vm_ctx = VirtualMachineContext::new(VirtualMachine::new("web-0", "prod"));
        let res_vm = InMemoryVm::new().with_reconfigure_error(TaskError::new("vm is locked"));
        let mut args = pass_args(MetadataTransport::ExtraConfig, &[("guestinfo.a", "b")]);

        let result = session
            .customize(&vm_ctx, &res_vm, &res_vm.config_info(), &mut args)
            .await;

        assert!(matches!(result, Err(CustomizationError::Task(_))));
        assert_eq!(res_vm.reconfigure_calls().len(), 1);
        assert!(res_vm.customize_calls().is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_stops_cloud_init_pass() {
        let session = Session::default();
        let vm_ctx = VirtualMachineContext::new(VirtualMachine::new("web-0", "prod"));
        let res_vm = InMemoryVm::new().with_network_error(TaskError::new("no devices"));
        let mut args = pass_args(MetadataTransport::CloudInit, &[]);

        let result = session
            .customize(&vm_ctx, &res_vm, &res_vm.config_info(), &mut args)
            .await;

        assert!(result.is_err());
        assert_eq!(res_vm.calls(), vec![VmCall::GetNetworkDevices]);
    }

    #[tokio::test]
    async fn test_escapes_normalized_without_templating() {
        let session = Session::default();
        let vm_ctx = VirtualMachineContext::new(VirtualMachine::new("web-0", "prod"));
        let res_vm = InMemoryVm::new();
        let mut args = pass_args(
            MetadataTransport::ExtraConfig,
            &[("guestinfo.greeting", "hello \\{world\\}")],
        );

        let specs = session
            .customization_specs(&vm_ctx, &res_vm, &res_vm.config_info(), &mut args)
            .await
            .unwrap();

        let config_spec = specs.config_spec.unwrap();
        assert_eq!(config_spec.extra_config[0].value, "hello {world}");
    }
}
