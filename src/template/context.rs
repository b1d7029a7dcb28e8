//! Template context building
//!
//! Everything a metadata template can see lives under the `v1alpha1`
//! namespace:
//! - `v1alpha1.vm`: the VM object (`name`, `namespace`, `uid`, `labels`,
//!   `annotations`, `spec`)
//! - `v1alpha1.net`: `devices` (`gateway4`, `ip_addresses`) and
//!   `nameservers`

use crate::network::{NetIfList, NetworkStatus};
use crate::vm::VirtualMachine;
use minijinja::value::Value;
use serde::Serialize;

#[derive(Serialize)]
struct TemplateContext<'a> {
    v1alpha1: VirtualMachineTemplate<'a>,
}

#[derive(Serialize)]
struct VirtualMachineTemplate<'a> {
    net: NetworkStatus,
    vm: &'a VirtualMachine,
}

/// Build the template context for one pass.
///
/// The returned value is a snapshot; later changes to the VM or the
/// metadata are not visible to templates rendered with it.
pub fn build_context(vm: &VirtualMachine, net_if_list: &NetIfList, dns_servers: &[String]) -> Value {
    Value::from_serialize(&TemplateContext {
        v1alpha1: VirtualMachineTemplate {
            net: net_if_list.network_status(dns_servers),
            vm,
        },
    })
}
