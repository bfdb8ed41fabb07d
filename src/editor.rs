//! Field- and group-level deletion.
//!
//! Both operations are total. Deleting something that is not there returns
//! an equal model, because a caller's view of the model may be stale.

use crate::model::{GroupKind, MetadataModel};

/// Return a copy of `model` without `group`'s field `key`.
///
/// If that was the group's last field, the group is gone too.
pub fn delete_field(model: &MetadataModel, group: GroupKind, key: &str) -> MetadataModel {
    let mut edited = model.clone();
    if edited.remove_field(group, key).is_some() {
        log::debug!("Deleted {group}:{key}");
    }
    edited
}

/// Return a copy of `model` without `group` and all of its fields.
pub fn delete_group(model: &MetadataModel, group: GroupKind) -> MetadataModel {
    let mut edited = model.clone();
    if let Some(removed) = edited.remove_group(group) {
        log::debug!("Deleted group {group} ({} fields)", removed.len());
    }
    edited
}
