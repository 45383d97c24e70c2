//! Two-pass leak detection over a registry.
//!
//! [`mark_all`] flags every registered resource, the owner of the registry
//! then [`unmark`]s the resources it still accounts for, and [`sweep`]
//! reports whatever is left flagged and clears the flags again.

use crate::resources::{GpuResource, ResourceHandle, ResourceKind, ResourceRegistry};

/// A resource still flagged when the sweep ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakEntry {
    /// Handle of the resource.
    pub handle: ResourceHandle,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Debug label, if any.
    pub label: Option<String>,
    /// References still held.
    pub ref_count: u32,
}

impl std::fmt::Display for LeakEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} {:?} ({} refs)",
            self.kind,
            self.label.as_deref().unwrap_or("<unnamed>"),
            self.ref_count
        )
    }
}

/// Flag every registered resource.
pub fn mark_all(registry: &mut ResourceRegistry) {
    registry.for_each(|_, resource| resource.header_mut().set_flagged(true));
}

/// Clear the flag of one resource. Returns false for a stale handle.
pub fn unmark(registry: &mut ResourceRegistry, handle: ResourceHandle) -> bool {
    match registry.get_mut(handle) {
        Some(resource) => {
            resource.header_mut().set_flagged(false);
            true
        }
        None => false,
    }
}

/// Report every flagged resource in registry order and clear all flags.
pub fn sweep(registry: &mut ResourceRegistry) -> Vec<LeakEntry> {
    let mut flagged = Vec::new();
    registry.for_each(|handle, resource| {
        if resource.header().is_flagged() {
            flagged.push((handle, resource.kind(), resource.label().map(str::to_owned)));
            resource.header_mut().set_flagged(false);
        }
    });
    flagged
        .into_iter()
        .map(|(handle, kind, label)| LeakEntry {
            handle,
            kind,
            label,
            ref_count: registry.ref_count(handle).unwrap_or(0),
        })
        .collect()
}
