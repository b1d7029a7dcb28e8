//! ExtraConfig and vApp property merging
//!
//! A reconfigure call only carries the entries that change. Extra-config
//! entries not named in a spec are left alone by the hypervisor, so the
//! delta produced here, once applied, yields the full merge: updated keys
//! override, every other existing key is kept.

use super::{
    ArrayUpdateOperation, OptionValue, VAppPropertyInfo, VAppPropertySpec, VmConfigSpec,
};
use crate::constants::OVF_ENV_TRANSPORT_GUEST_INFO;
use std::collections::BTreeMap;
use tracing::debug;

/// Convert extra-config entries to a map. Later duplicates win.
pub fn extra_config_to_map(extra_config: &[OptionValue]) -> BTreeMap<String, String> {
    extra_config
        .iter()
        .map(|opt| (opt.key.clone(), opt.value.clone()))
        .collect()
}

/// Compute the extra-config delta that merges `updates` into `existing`.
///
/// Only keys that are new or whose value differs are returned, sorted by
/// key. An empty result means `existing` already reflects `updates`.
pub fn merge_extra_config(
    existing: &[OptionValue],
    updates: &BTreeMap<String, String>,
) -> Vec<OptionValue> {
    let current = extra_config_to_map(existing);

    let delta: Vec<OptionValue> = updates
        .iter()
        .filter(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, value)| OptionValue::new(key.clone(), value.clone()))
        .collect();

    debug!(
        "ExtraConfig merge: {} updates, {} changed",
        updates.len(),
        delta.len()
    );
    delta
}

/// Apply an extra-config delta, returning the full merged entry list
pub fn apply_extra_config(existing: &[OptionValue], delta: &[OptionValue]) -> Vec<OptionValue> {
    let mut merged = extra_config_to_map(existing);
    for opt in delta {
        merged.insert(opt.key.clone(), opt.value.clone());
    }

    merged
        .into_iter()
        .map(|(key, value)| OptionValue { key, value })
        .collect()
}

/// Build the vApp config spec that sets user-configurable properties from
/// `data`.
///
/// Properties that are not user configurable, absent from `data`, or
/// already hold the requested value are skipped. Returns `None` when
/// nothing would change.
pub fn merged_vapp_config_spec(
    data: &BTreeMap<String, String>,
    properties: &[VAppPropertyInfo],
) -> Option<VmConfigSpec> {
    let changed: Vec<VAppPropertySpec> = properties
        .iter()
        .filter(|prop| prop.user_configurable == Some(true))
        .filter_map(|prop| {
            let value = data.get(&prop.id)?;
            if *value == prop.value {
                return None;
            }
            Some(VAppPropertySpec {
                operation: ArrayUpdateOperation::Edit,
                info: VAppPropertyInfo {
                    value: value.clone(),
                    ..prop.clone()
                },
            })
        })
        .collect();

    if changed.is_empty() {
        return None;
    }

    debug!("vApp merge: {} properties changed", changed.len());
    Some(VmConfigSpec {
        property: changed,
        ovf_environment_transport: vec![OVF_ENV_TRANSPORT_GUEST_INFO.to_string()],
    })
}
