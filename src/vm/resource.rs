//! Live VM operations used by the customization engine

use async_trait::async_trait;

use crate::TaskError;
use crate::vsphere::{ConfigSpec, CustomizationSpec, VirtualEthernetCard};

/// Operations against the hypervisor-side VM.
///
/// Each call returns once the remote operation has been initiated and has
/// either completed or failed. Timeouts and cancellation belong to the
/// session that implements this trait.
#[async_trait]
pub trait VirtualMachineResource: Send + Sync {
    /// Virtual ethernet cards currently attached to the VM, in device order
    async fn get_network_devices(&self) -> Result<Vec<VirtualEthernetCard>, TaskError>;

    /// Apply a configuration delta
    async fn reconfigure(&self, spec: &ConfigSpec) -> Result<(), TaskError>;

    /// Start a guest customization.
    ///
    /// Fails with [`crate::Fault::CustomizationPending`] when one is already
    /// outstanding.
    async fn customize(&self, spec: &CustomizationSpec) -> Result<(), TaskError>;
}
