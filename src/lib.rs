//! vm-customize-rs library
//!
//! Guest customization and configuration reconciliation for vSphere
//! virtual machines.
//!
//! A customization pass takes the desired state of a VM (its metadata,
//! network interfaces and DNS servers) and the live configuration of the
//! backing vSphere VM, and brings the two together by reconfiguring the VM
//! and starting a guest customization where needed. See
//! [`customization::Session`].
//!
//! # Design Principles
//!
//! - **Safety First**: No unsafe code (`#![forbid(unsafe_code)]`)
//! - **Idempotent**: Repeating a pass against an already-converged VM
//!   issues no reconfigure and no duplicate customization
//! - **Fail-soft templating**: A bad template never blocks a pass

pub mod config;
pub mod constants;
pub mod customization;
pub mod network;
pub mod template;
pub mod userdata;
pub mod vm;
pub mod vsphere;

mod error;

pub use customization::{CustomizationSpecs, Session};
pub use error::{CodecAction, CustomizationError, Fault, TaskError};
