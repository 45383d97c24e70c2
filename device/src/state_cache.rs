//! Content-addressed cache of compiled state objects.
//!
//! Render state is described by a plain-old-data [`StateBlockDesc`]. The
//! cache hashes its raw bytes with 64-bit FNV-1a and keeps, per hash, the
//! descriptors it has compiled together with the handle of the registered
//! [`StateObject`]. A lookup only hits when the stored descriptor is
//! bit-identical, so two different descriptors that share a hash each get
//! their own state object.

use std::collections::HashMap;
use std::hash::Hasher;

use fnv::FnvHasher;

use crate::backend::GpuBackend;
use crate::error::GraphicsError;
use crate::resources::{GpuResource, ResourceHandle, ResourceRegistry, StateObject};
use crate::types::StateBlockDesc;

/// 64-bit FNV-1a over a descriptor's bytes.
pub fn hash_state_block(desc: &StateBlockDesc) -> u64 {
    fnv1a(desc.as_bytes())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

/// Hit and miss counters of a [`StateBlockCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that compiled a new state object.
    pub misses: u64,
    /// Misses whose hash matched an entry with different contents.
    pub collisions: u64,
    /// Number of flushes.
    pub flushes: u64,
}

#[derive(Debug)]
struct Entry {
    desc: StateBlockDesc,
    handle: ResourceHandle,
}

/// Deduplicating cache of compiled state objects.
///
/// The cache holds one registry reference to every state object it created.
/// [`flush`](Self::flush) gives those references back.
#[derive(Debug)]
pub struct StateBlockCache {
    buckets: HashMap<u64, Vec<Entry>>,
    hash_fn: fn(&[u8]) -> u64,
    len: usize,
    stats: StateCacheStats,
}

impl Default for StateBlockCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBlockCache {
    /// Create an empty cache using FNV-1a.
    pub fn new() -> Self {
        Self::with_hash_fn(fnv1a)
    }

    /// Create an empty cache hashing descriptor bytes with `hash_fn`.
    pub fn with_hash_fn(hash_fn: fn(&[u8]) -> u64) -> Self {
        Self {
            buckets: HashMap::new(),
            hash_fn,
            len: 0,
            stats: StateCacheStats::default(),
        }
    }

    /// Hash a descriptor with this cache's hash function.
    pub fn hash(&self, desc: &StateBlockDesc) -> u64 {
        (self.hash_fn)(desc.as_bytes())
    }

    /// Number of cached state objects.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Counters.
    pub fn stats(&self) -> StateCacheStats {
        self.stats
    }

    /// Cached handle for a descriptor, without creating anything.
    pub fn get(&self, desc: &StateBlockDesc) -> Option<ResourceHandle> {
        self.buckets
            .get(&self.hash(desc))?
            .iter()
            .find(|entry| entry.desc == *desc)
            .map(|entry| entry.handle)
    }

    /// Returns true if `handle` is owned by this cache.
    pub fn contains_handle(&self, handle: ResourceHandle) -> bool {
        self.handles().any(|h| h == handle)
    }

    /// Handles of every cached state object.
    pub fn handles(&self) -> impl Iterator<Item = ResourceHandle> + '_ {
        self.buckets.values().flatten().map(|entry| entry.handle)
    }

    /// Return the state object for `desc`, compiling and registering it on a miss.
    pub fn get_or_create(
        &mut self,
        desc: &StateBlockDesc,
        registry: &mut ResourceRegistry,
        backend: &dyn GpuBackend,
    ) -> Result<ResourceHandle, GraphicsError> {
        let hash = self.hash(desc);
        let bucket = self.buckets.entry(hash).or_default();

        if let Some(entry) = bucket.iter().find(|entry| entry.desc == *desc) {
            self.stats.hits += 1;
            return Ok(entry.handle);
        }

        if !bucket.is_empty() {
            log::warn!(
                "StateBlockCache: hash collision on {hash:#018x} ({} entries)",
                bucket.len()
            );
            self.stats.collisions += 1;
        }

        let state = StateObject::create(backend, *desc, hash)?;
        let handle = registry.register(state.into());
        bucket.push(Entry {
            desc: *desc,
            handle,
        });
        self.len += 1;
        self.stats.misses += 1;
        log::debug!("StateBlockCache: compiled state object {hash:#018x}");
        Ok(handle)
    }

    /// Drop every entry and release the cache's reference to each state object.
    ///
    /// State objects that reach a zero count are destroyed. Returns the
    /// number of entries dropped.
    pub fn flush(&mut self, registry: &mut ResourceRegistry, backend: &dyn GpuBackend) -> usize {
        let dropped = self.len;
        for entry in self.buckets.drain().flat_map(|(_, bucket)| bucket) {
            if let Some(mut resource) = registry.release(entry.handle) {
                resource.invalidate(backend);
            }
        }
        self.len = 0;
        self.stats.flushes += 1;
        log::debug!("StateBlockCache: flushed {dropped} state objects");
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, NativeKind};
    use crate::config::SurfaceConfig;
    use crate::resources::DeviceId;
    use crate::types::{BlendState, CullMode, DepthStencilState, RasterizerState};

    fn setup() -> (DummyBackend, ResourceRegistry) {
        let backend = DummyBackend::new();
        backend.create_context(&SurfaceConfig::default()).unwrap();
        (backend, ResourceRegistry::new(DeviceId::next()))
    }

    fn blended() -> StateBlockDesc {
        StateBlockDesc::new().with_blend(BlendState::alpha_blending())
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_state_block(&blended()), hash_state_block(&blended()));
        assert_ne!(
            hash_state_block(&blended()),
            hash_state_block(&StateBlockDesc::new())
        );
        assert_eq!(StateBlockCache::new().hash(&blended()), hash_state_block(&blended()));
    }

    #[test]
    fn test_identical_descriptors_share_one_object() {
        let (backend, mut registry) = setup();
        let mut cache = StateBlockCache::new();

        let a = cache.get_or_create(&blended(), &mut registry, &backend).unwrap();
        let b = cache.get_or_create(&blended(), &mut registry, &backend).unwrap();
        assert_eq!(a, b);
        assert_eq!(backend.stats().state_objects_created, 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(registry.ref_count(a), Some(1));
    }

    #[test]
    fn test_single_bit_difference_misses() {
        let (backend, mut registry) = setup();
        let mut cache = StateBlockCache::new();
        let base = StateBlockDesc::new();
        let mut rasterizer = RasterizerState::default();
        rasterizer.cull_mode = CullMode::Front;
        let changed = base.with_rasterizer(rasterizer);

        let a = cache.get_or_create(&base, &mut registry, &backend).unwrap();
        let b = cache.get_or_create(&changed, &mut registry, &backend).unwrap();
        assert_ne!(a, b);
        assert_eq!(backend.stats().state_objects_created, 2);
    }

    #[test]
    fn test_collision_falls_back_to_equality() {
        let (backend, mut registry) = setup();
        let mut cache = StateBlockCache::with_hash_fn(|_| 7);

        let a = cache.get_or_create(&blended(), &mut registry, &backend).unwrap();
        let disabled = StateBlockDesc::new().with_depth_stencil(DepthStencilState::disabled());
        let b = cache.get_or_create(&disabled, &mut registry, &backend).unwrap();
        assert_ne!(a, b);
        assert_eq!(cache.stats().collisions, 1);

        assert_eq!(cache.get_or_create(&blended(), &mut registry, &backend).unwrap(), a);
        assert_eq!(cache.get_or_create(&disabled, &mut registry, &backend).unwrap(), b);
        assert_eq!(cache.len(), 2);
        assert_eq!(backend.stats().state_objects_created, 2);
    }

    #[test]
    fn test_flush_releases_objects() {
        let (backend, mut registry) = setup();
        let mut cache = StateBlockCache::new();
        let handle = cache.get_or_create(&blended(), &mut registry, &backend).unwrap();
        cache.get_or_create(&StateBlockDesc::new(), &mut registry, &backend).unwrap();

        assert_eq!(cache.flush(&mut registry, &backend), 2);
        assert!(cache.is_empty());
        assert!(!registry.contains(handle));
        assert_eq!(backend.live_count(NativeKind::StateObject), 0);
        assert!(cache.get(&blended()).is_none());
    }

    #[test]
    fn test_failed_compile_is_not_cached() {
        let (backend, mut registry) = setup();
        let mut cache = StateBlockCache::new();
        backend.fail_next_allocations(1);

        assert_eq!(
            cache.get_or_create(&blended(), &mut registry, &backend),
            Err(GraphicsError::OutOfMemory)
        );
        assert!(cache.is_empty());
        assert!(registry.is_empty());
        assert!(cache.get_or_create(&blended(), &mut registry, &backend).is_ok());
    }
}
