//! Registry of every live GPU resource owned by a device.
//!
//! The registry is an ordered, doubly-linked set built on a generational
//! arena. Each node stores the keys of its neighbours, so insertion at the
//! head and removal from any position are O(1), and a [`ResourceHandle`] to
//! a removed node can never alias a node inserted later.
//!
//! ```text
//!   head ──► [C] ◄──► [B] ◄──► [A] ◄── tail
//!            newest             oldest
//! ```
//!
//! Resources are reference counted inside the registry. The release that
//! drops the count to zero unlinks the node and hands the resource back to
//! the caller for teardown.

use std::sync::atomic::{AtomicU64, Ordering};

use slotmap::{SlotMap, new_key_type};

use super::{GpuResource, Resource};

new_key_type! {
    /// Stable handle to a registered resource.
    pub struct ResourceHandle;
}

/// Identity of a device, used as the back-reference from a resource to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u64);

impl DeviceId {
    /// Allocate a process-unique device id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct Node {
    resource: Resource,
    prev: Option<ResourceHandle>,
    next: Option<ResourceHandle>,
    ref_count: u32,
}

/// Ordered set of the resources registered with one device.
#[derive(Debug)]
pub struct ResourceRegistry {
    device: DeviceId,
    nodes: SlotMap<ResourceHandle, Node>,
    head: Option<ResourceHandle>,
}

impl ResourceRegistry {
    /// Create an empty registry for the given device.
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            nodes: SlotMap::with_key(),
            head: None,
        }
    }

    /// The owning device.
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true if the handle refers to a registered resource.
    pub fn contains(&self, handle: ResourceHandle) -> bool {
        self.nodes.contains_key(handle)
    }

    /// Register a resource at the head of the list with a reference count of 1.
    ///
    /// # Panics
    ///
    /// Panics if the resource already belongs to a device. A resource is
    /// registered exactly once in its lifetime.
    pub fn register(&mut self, mut resource: Resource) -> ResourceHandle {
        if let Some(owner) = resource.header().owner() {
            panic!(
                "{:?} resource is already registered with device {}",
                resource.kind(),
                owner.get()
            );
        }
        resource.header_mut().set_owner(self.device);

        let old_head = self.head;
        let handle = self.nodes.insert(Node {
            resource,
            prev: None,
            next: old_head,
            ref_count: 1,
        });
        if let Some(old_head) = old_head {
            self.nodes[old_head].prev = Some(handle);
        }
        self.head = Some(handle);
        handle
    }

    /// Unlink a resource regardless of its reference count.
    ///
    /// The returned resource keeps its owner; it cannot be registered again.
    pub fn unregister(&mut self, handle: ResourceHandle) -> Option<Resource> {
        let node = self.nodes.remove(handle)?;
        match node.prev {
            Some(prev) => self.nodes[prev].next = node.next,
            None => self.head = node.next,
        }
        if let Some(next) = node.next {
            self.nodes[next].prev = node.prev;
        }
        Some(node.resource)
    }

    /// Add a reference. Returns the new count, or `None` for a stale handle.
    pub fn retain(&mut self, handle: ResourceHandle) -> Option<u32> {
        let node = self.nodes.get_mut(handle)?;
        node.ref_count += 1;
        Some(node.ref_count)
    }

    /// Drop a reference.
    ///
    /// Returns the resource when this was the last reference; the caller is
    /// responsible for tearing it down.
    pub fn release(&mut self, handle: ResourceHandle) -> Option<Resource> {
        let node = self.nodes.get_mut(handle)?;
        node.ref_count -= 1;
        if node.ref_count > 0 {
            return None;
        }
        self.unregister(handle)
    }

    /// Current reference count of a resource.
    pub fn ref_count(&self, handle: ResourceHandle) -> Option<u32> {
        self.nodes.get(handle).map(|n| n.ref_count)
    }

    /// Get a registered resource.
    pub fn get(&self, handle: ResourceHandle) -> Option<&Resource> {
        self.nodes.get(handle).map(|n| &n.resource)
    }

    /// Get a registered resource mutably.
    pub fn get_mut(&mut self, handle: ResourceHandle) -> Option<&mut Resource> {
        self.nodes.get_mut(handle).map(|n| &mut n.resource)
    }

    /// Iterate over the resources in list order (newest first).
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            registry: self,
            cursor: self.head,
        }
    }

    /// Handles of every resource in list order.
    pub fn handles(&self) -> Vec<ResourceHandle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    /// Visit every resource exactly once in list order.
    pub fn for_each(&mut self, mut f: impl FnMut(ResourceHandle, &mut Resource)) {
        let mut cursor = self.head;
        while let Some(handle) = cursor {
            let node = &mut self.nodes[handle];
            cursor = node.next;
            f(handle, &mut node.resource);
        }
    }

    /// Visit every resource registered when the walk starts, in list order,
    /// while allowing the callback to mutate the registry.
    ///
    /// The callback may register or unregister *other* resources. Resources
    /// unregistered before the walk reaches them are skipped; resources
    /// registered during the walk are not visited.
    pub fn walk(&mut self, mut f: impl FnMut(&mut Self, ResourceHandle)) {
        for handle in self.handles() {
            if self.contains(handle) {
                f(self, handle);
            }
        }
    }
}

/// Iterator over a registry in list order.
pub struct Iter<'a> {
    registry: &'a ResourceRegistry,
    cursor: Option<ResourceHandle>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (ResourceHandle, &'a Resource);

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.cursor?;
        let node = &self.registry.nodes[handle];
        self.cursor = node.next;
        Some((handle, &node.resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Fence, ResourceKind};

    fn registry() -> ResourceRegistry {
        ResourceRegistry::new(DeviceId::next())
    }

    fn fence() -> Resource {
        Resource::Fence(Fence::detached())
    }

    #[test]
    fn test_register_inserts_at_head() {
        let mut registry = registry();
        let a = registry.register(fence());
        let b = registry.register(fence());
        let c = registry.register(fence());

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.handles(), vec![c, b, a]);
        assert_eq!(
            registry.get(a).unwrap().header().owner(),
            Some(registry.device())
        );
    }

    #[test]
    fn test_unregister_splices_any_position() {
        let mut registry = registry();
        let a = registry.register(fence());
        let b = registry.register(fence());
        let c = registry.register(fence());
        let d = registry.register(fence());

        // middle
        assert!(registry.unregister(b).is_some());
        assert_eq!(registry.handles(), vec![d, c, a]);
        // head
        assert!(registry.unregister(d).is_some());
        assert_eq!(registry.handles(), vec![c, a]);
        // tail
        assert!(registry.unregister(a).is_some());
        assert_eq!(registry.handles(), vec![c]);
        assert!(registry.unregister(c).is_some());
        assert!(registry.is_empty());
        assert!(registry.handles().is_empty());
    }

    #[test]
    fn test_stale_handle_does_not_alias() {
        let mut registry = registry();
        let a = registry.register(fence());
        registry.unregister(a);
        let b = registry.register(fence());

        assert_ne!(a, b);
        assert!(registry.get(a).is_none());
        assert!(registry.unregister(a).is_none());
        assert!(registry.contains(b));
    }

    #[test]
    fn test_count_matches_after_mixed_operations() {
        let mut registry = registry();
        let mut live = Vec::new();
        for i in 0..50 {
            live.push(registry.register(fence()));
            if i % 3 == 0 {
                let victim = live.remove(live.len() / 2);
                assert!(registry.unregister(victim).is_some());
            }
        }

        assert_eq!(registry.len(), live.len());
        let mut visited = Vec::new();
        registry.for_each(|handle, _| visited.push(handle));
        assert_eq!(visited.len(), live.len());
        for handle in &live {
            assert_eq!(visited.iter().filter(|h| *h == handle).count(), 1);
        }
    }

    #[test]
    fn test_reference_counting() {
        let mut registry = registry();
        let a = registry.register(fence());
        assert_eq!(registry.retain(a), Some(2));

        assert!(registry.release(a).is_none());
        assert_eq!(registry.ref_count(a), Some(1));

        let released = registry.release(a).unwrap();
        assert_eq!(released.kind(), ResourceKind::Fence);
        assert!(!registry.contains(a));
        assert!(registry.release(a).is_none());
    }

    #[test]
    fn test_walk_tolerates_removing_other_nodes() {
        let mut registry = registry();
        let a = registry.register(fence());
        let b = registry.register(fence());
        let c = registry.register(fence());

        let mut visited = Vec::new();
        registry.walk(|registry, handle| {
            visited.push(handle);
            if handle == c {
                registry.unregister(b);
                registry.register(fence());
            }
        });

        assert_eq!(visited, vec![c, a]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_flag_is_left_to_callers() {
        let mut registry = registry();
        let a = registry.register(fence());
        assert!(!registry.get(a).unwrap().header().is_flagged());

        registry.get_mut(a).unwrap().header_mut().set_flagged(true);
        registry.retain(a);
        registry.release(a);
        assert!(registry.get(a).unwrap().header().is_flagged());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_double_registration_panics() {
        let mut first = registry();
        let mut second = registry();
        let handle = first.register(fence());
        let resource = first.unregister(handle).unwrap();
        second.register(resource);
    }
}
