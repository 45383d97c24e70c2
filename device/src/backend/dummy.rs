//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It hands out unique
//! object ids, tracks which of them are alive, and counts every lock, write
//! and bind call, so tests can observe exactly what the device asked the
//! native API to do. It can also simulate a lost context, failed
//! allocations and fences that have not completed yet.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::config::SurfaceConfig;
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, StateBlockDesc, TextureDescriptor};

use super::{
    GpuBackend, GpuBuffer, GpuFence, GpuQuery, GpuStateObject, GpuSurface, GpuTexture, LockPolicy,
    SurfaceKind,
};

/// Kind of native object tracked by the dummy backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeKind {
    /// A surface.
    Surface,
    /// A buffer.
    Buffer,
    /// A texture.
    Texture,
    /// A compiled state object.
    StateObject,
    /// A fence.
    Fence,
    /// An occlusion query.
    Query,
}

/// Counters collected by the dummy backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DummyStats {
    /// Native objects created, all kinds.
    pub objects_created: u64,
    /// Native objects destroyed, all kinds.
    pub objects_destroyed: u64,
    /// Buffers created.
    pub buffers_created: u64,
    /// State objects created.
    pub state_objects_created: u64,
    /// Locks requested with [`LockPolicy::Discard`].
    pub discard_locks: u64,
    /// Locks requested with [`LockPolicy::NoOverwrite`].
    pub no_overwrite_locks: u64,
    /// Bytes written through `write_buffer` and `write_texture`.
    pub bytes_written: u64,
    /// Bind calls that bound an object.
    pub binds: u64,
    /// Bind calls that cleared a slot.
    pub unbinds: u64,
    /// Destroy calls for ids that were not alive.
    pub double_destroys: u64,
}

/// A native object lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeEvent {
    /// An object was created with the given id.
    Created(NativeKind, u64),
    /// A live object was destroyed.
    Destroyed(NativeKind, u64),
}

/// A recorded buffer lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRecord {
    /// Buffer id.
    pub buffer: u64,
    /// Byte offset.
    pub offset: u64,
    /// Byte size.
    pub size: u64,
    /// Requested policy.
    pub policy: LockPolicy,
}

#[derive(Debug, Default)]
struct FenceSim {
    issued: bool,
    signaled: bool,
}

#[derive(Debug, Default)]
struct QuerySim {
    active: bool,
    ended: bool,
    resolved: bool,
}

#[derive(Debug)]
struct DummyState {
    next_id: u64,
    live: HashMap<u64, NativeKind>,
    locked: HashMap<u64, LockRecord>,
    fences: HashMap<u64, FenceSim>,
    queries: HashMap<u64, QuerySim>,
    context_alive: bool,
    context_lost: bool,
    pending_failures: u32,
    auto_signal: bool,
    query_samples: u64,
    preserves_state_objects: bool,
    lock_log: Vec<LockRecord>,
    events: Vec<NativeEvent>,
    stats: DummyStats,
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    state: Mutex<DummyState>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    ///
    /// Fences signal as soon as they are issued and state objects do not
    /// survive a context loss.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DummyState {
                next_id: 1,
                live: HashMap::new(),
                locked: HashMap::new(),
                fences: HashMap::new(),
                queries: HashMap::new(),
                context_alive: false,
                context_lost: false,
                pending_failures: 0,
                auto_signal: true,
                query_samples: 0,
                preserves_state_objects: false,
                lock_log: Vec::new(),
                events: Vec::new(),
                stats: DummyStats::default(),
            }),
        }
    }

    /// Report compiled state objects as surviving a context loss.
    pub fn with_preserved_state_objects(self, preserved: bool) -> Self {
        self.state.lock().preserves_state_objects = preserved;
        self
    }

    /// Simulate a driver-signalled context loss.
    ///
    /// While lost, every `create_*` call fails with [`GraphicsError::DeviceLost`].
    pub fn lose_context(&self) {
        log::debug!("DummyBackend: context lost");
        self.state.lock().context_lost = true;
    }

    /// End a simulated context loss.
    pub fn restore_context(&self) {
        log::debug!("DummyBackend: context restored");
        self.state.lock().context_lost = false;
    }

    /// Make the next `count` allocations fail with [`GraphicsError::OutOfMemory`].
    pub fn fail_next_allocations(&self, count: u32) {
        self.state.lock().pending_failures = count;
    }

    /// Choose whether issued fences and ended queries complete immediately.
    pub fn set_auto_signal(&self, auto_signal: bool) {
        self.state.lock().auto_signal = auto_signal;
    }

    /// Complete every issued fence and ended query.
    pub fn signal_all(&self) {
        let mut state = self.state.lock();
        for fence in state.fences.values_mut().filter(|f| f.issued) {
            fence.signaled = true;
        }
        for query in state.queries.values_mut().filter(|q| q.ended) {
            query.resolved = true;
        }
    }

    /// Sample count reported by resolved queries.
    pub fn set_query_samples(&self, samples: u64) {
        self.state.lock().query_samples = samples;
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> DummyStats {
        self.state.lock().stats
    }

    /// Every lock requested so far, oldest first.
    pub fn lock_log(&self) -> Vec<LockRecord> {
        self.state.lock().lock_log.clone()
    }

    /// Every create and destroy so far, oldest first.
    pub fn events(&self) -> Vec<NativeEvent> {
        self.state.lock().events.clone()
    }

    /// Forget the recorded lock log and lifecycle events.
    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.lock_log.clear();
        state.events.clear();
    }

    /// Number of live native objects of the given kind.
    pub fn live_count(&self, kind: NativeKind) -> usize {
        self.state.lock().live.values().filter(|k| **k == kind).count()
    }

    /// Number of live native objects of every kind.
    pub fn live_objects(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Whether the context exists.
    pub fn has_context(&self) -> bool {
        self.state.lock().context_alive
    }

    fn allocate(&self, kind: NativeKind) -> Result<u64, GraphicsError> {
        let mut state = self.state.lock();
        if state.context_lost {
            return Err(GraphicsError::DeviceLost);
        }
        if !state.context_alive {
            return Err(GraphicsError::InvalidState(
                "no native context".to_string(),
            ));
        }
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(GraphicsError::OutOfMemory);
        }

        let id = state.next_id;
        state.next_id += 1;
        state.live.insert(id, kind);
        state.events.push(NativeEvent::Created(kind, id));
        state.stats.objects_created += 1;
        Ok(id)
    }

    fn release(&self, id: u64, kind: NativeKind) {
        let mut state = self.state.lock();
        match state.live.remove(&id) {
            Some(live_kind) => {
                debug_assert_eq!(live_kind, kind, "destroyed native {id} as the wrong kind");
                state.stats.objects_destroyed += 1;
                state.events.push(NativeEvent::Destroyed(kind, id));
                state.locked.remove(&id);
                state.fences.remove(&id);
                state.queries.remove(&id);
            }
            None => {
                log::warn!("DummyBackend: destroy of dead {:?} {}", kind, id);
                state.stats.double_destroys += 1;
            }
        }
    }

    fn record_bind(&self, bound: bool) {
        let mut state = self.state.lock();
        if bound {
            state.stats.binds += 1;
        } else {
            state.stats.unbinds += 1;
        }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn preserves_state_objects(&self) -> bool {
        self.state.lock().preserves_state_objects
    }

    fn create_context(&self, config: &SurfaceConfig) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        if state.context_lost {
            return Err(GraphicsError::DeviceLost);
        }
        log::trace!(
            "DummyBackend: creating context {}x{} (fullscreen: {})",
            config.width,
            config.height,
            config.fullscreen
        );
        state.context_alive = true;
        Ok(())
    }

    fn destroy_context(&self) {
        let mut state = self.state.lock();
        if !state.live.is_empty() {
            log::warn!(
                "DummyBackend: destroying context with {} live native objects",
                state.live.len()
            );
        }
        state.context_alive = false;
    }

    fn is_context_lost(&self) -> bool {
        self.state.lock().context_lost
    }

    fn create_surface(
        &self,
        kind: SurfaceKind,
        width: u32,
        height: u32,
    ) -> Result<GpuSurface, GraphicsError> {
        let id = self.allocate(NativeKind::Surface)?;
        log::trace!("DummyBackend: creating {:?} surface {}x{}", kind, width, height);
        Ok(GpuSurface::new(id, kind, width, height))
    }

    fn destroy_surface(&self, surface: GpuSurface) {
        self.release(surface.id(), NativeKind::Surface);
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        let id = self.allocate(NativeKind::Buffer)?;
        self.state.lock().stats.buffers_created += 1;
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        Ok(GpuBuffer::new(id, descriptor.size))
    }

    fn destroy_buffer(&self, buffer: GpuBuffer) {
        self.release(buffer.id(), NativeKind::Buffer);
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        if offset
            .checked_add(data.len() as u64)
            .is_none_or(|end| end > buffer.size())
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at {} overflows buffer of {} bytes",
                data.len(),
                offset,
                buffer.size()
            )));
        }
        log::trace!(
            "DummyBackend: write_buffer {} offset={} len={}",
            buffer.id(),
            offset,
            data.len()
        );
        self.state.lock().stats.bytes_written += data.len() as u64;
        Ok(())
    }

    fn lock_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
        policy: LockPolicy,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        if state.context_lost {
            return Err(GraphicsError::DeviceLost);
        }
        if state.locked.contains_key(&buffer.id()) {
            return Err(GraphicsError::Internal(format!(
                "buffer {} is already locked",
                buffer.id()
            )));
        }
        let record = LockRecord {
            buffer: buffer.id(),
            offset,
            size,
            policy,
        };
        match policy {
            LockPolicy::Discard => state.stats.discard_locks += 1,
            LockPolicy::NoOverwrite => state.stats.no_overwrite_locks += 1,
        }
        state.locked.insert(buffer.id(), record);
        state.lock_log.push(record);
        Ok(())
    }

    fn unlock_buffer(&self, buffer: &GpuBuffer) {
        if self.state.lock().locked.remove(&buffer.id()).is_none() {
            log::warn!("DummyBackend: unlock of unlocked buffer {}", buffer.id());
        }
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        let id = self.allocate(NativeKind::Texture)?;
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{})",
            descriptor.label,
            descriptor.width,
            descriptor.height
        );
        Ok(GpuTexture::new(id))
    }

    fn destroy_texture(&self, texture: GpuTexture) {
        self.release(texture.id(), NativeKind::Texture);
    }

    fn write_texture(&self, texture: &GpuTexture, data: &[u8]) -> Result<(), GraphicsError> {
        log::trace!(
            "DummyBackend: write_texture {} len={}",
            texture.id(),
            data.len()
        );
        self.state.lock().stats.bytes_written += data.len() as u64;
        Ok(())
    }

    fn create_state_object(&self, desc: &StateBlockDesc) -> Result<GpuStateObject, GraphicsError> {
        let id = self.allocate(NativeKind::StateObject)?;
        self.state.lock().stats.state_objects_created += 1;
        log::trace!(
            "DummyBackend: compiling state object {} (blend: {}, depth: {})",
            id,
            desc.blend.blend_enable,
            desc.depth_stencil.depth_test_enable
        );
        Ok(GpuStateObject::new(id))
    }

    fn destroy_state_object(&self, state: GpuStateObject) {
        self.release(state.id(), NativeKind::StateObject);
    }

    fn create_fence(&self) -> Result<GpuFence, GraphicsError> {
        let id = self.allocate(NativeKind::Fence)?;
        self.state.lock().fences.insert(id, FenceSim::default());
        Ok(GpuFence::new(id))
    }

    fn destroy_fence(&self, fence: GpuFence) {
        self.release(fence.id(), NativeKind::Fence);
    }

    fn issue_fence(&self, fence: &GpuFence) {
        let mut state = self.state.lock();
        let auto_signal = state.auto_signal;
        if let Some(sim) = state.fences.get_mut(&fence.id()) {
            sim.issued = true;
            sim.signaled = auto_signal;
        }
    }

    fn is_fence_signaled(&self, fence: &GpuFence) -> bool {
        self.state
            .lock()
            .fences
            .get(&fence.id())
            .is_some_and(|f| f.signaled)
    }

    fn wait_fence(&self, fence: &GpuFence) {
        // Waiting completes the simulated GPU work.
        if let Some(sim) = self.state.lock().fences.get_mut(&fence.id()) {
            if sim.issued {
                sim.signaled = true;
            }
        }
    }

    fn create_query(&self) -> Result<GpuQuery, GraphicsError> {
        let id = self.allocate(NativeKind::Query)?;
        self.state.lock().queries.insert(id, QuerySim::default());
        Ok(GpuQuery::new(id))
    }

    fn destroy_query(&self, query: GpuQuery) {
        self.release(query.id(), NativeKind::Query);
    }

    fn begin_query(&self, query: &GpuQuery) {
        if let Some(sim) = self.state.lock().queries.get_mut(&query.id()) {
            *sim = QuerySim {
                active: true,
                ..Default::default()
            };
        }
    }

    fn end_query(&self, query: &GpuQuery) {
        let mut state = self.state.lock();
        let auto_signal = state.auto_signal;
        if let Some(sim) = state.queries.get_mut(&query.id()) {
            sim.active = false;
            sim.ended = true;
            sim.resolved = auto_signal;
        }
    }

    fn query_result(&self, query: &GpuQuery, block: bool) -> Option<u64> {
        let mut state = self.state.lock();
        let samples = state.query_samples;
        let sim = state.queries.get_mut(&query.id())?;
        if !sim.ended {
            return None;
        }
        if block {
            sim.resolved = true;
        }
        sim.resolved.then_some(samples)
    }

    fn bind_vertex_buffer(&self, stream: u32, buffer: Option<&GpuBuffer>, offset: u64) {
        log::trace!(
            "DummyBackend: bind vertex stream {} -> {:?} @ {}",
            stream,
            buffer.map(GpuBuffer::id),
            offset
        );
        self.record_bind(buffer.is_some());
    }

    fn bind_index_buffer(&self, buffer: Option<&GpuBuffer>) {
        self.record_bind(buffer.is_some());
    }

    fn bind_texture(&self, unit: u32, texture: Option<&GpuTexture>) {
        log::trace!(
            "DummyBackend: bind texture unit {} -> {:?}",
            unit,
            texture.map(GpuTexture::id)
        );
        self.record_bind(texture.is_some());
    }

    fn bind_state_object(&self, state: Option<&GpuStateObject>) {
        self.record_bind(state.is_some());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferUsage;

    fn backend_with_context() -> DummyBackend {
        let backend = DummyBackend::new();
        backend.create_context(&SurfaceConfig::default()).unwrap();
        backend
    }

    #[test]
    fn test_create_requires_context() {
        let backend = DummyBackend::new();
        let result = backend.create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX));
        assert!(matches!(result, Err(GraphicsError::InvalidState(_))));
    }

    #[test]
    fn test_live_tracking() {
        let backend = backend_with_context();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        let fence = backend.create_fence().unwrap();
        assert_eq!(backend.live_objects(), 2);
        assert_eq!(backend.live_count(NativeKind::Buffer), 1);

        let buffer_id = buffer.id();
        backend.destroy_buffer(buffer);
        backend.destroy_fence(fence);
        assert_eq!(backend.live_objects(), 0);
        assert_eq!(backend.stats().double_destroys, 0);
        assert_eq!(
            backend.events()[0],
            NativeEvent::Created(NativeKind::Buffer, buffer_id)
        );
        assert_eq!(
            backend.events()[2],
            NativeEvent::Destroyed(NativeKind::Buffer, buffer_id)
        );
    }

    #[test]
    fn test_double_destroy_is_counted() {
        let backend = backend_with_context();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        let id = buffer.id();
        backend.destroy_buffer(buffer);
        backend.destroy_buffer(GpuBuffer::new(id, 64));
        assert_eq!(backend.stats().double_destroys, 1);
    }

    #[test]
    fn test_lost_context_fails_creation() {
        let backend = backend_with_context();
        backend.lose_context();
        assert_eq!(backend.create_fence(), Err(GraphicsError::DeviceLost));
        backend.restore_context();
        assert!(backend.create_fence().is_ok());
    }

    #[test]
    fn test_allocation_failure_injection() {
        let backend = backend_with_context();
        backend.fail_next_allocations(1);
        assert_eq!(backend.create_query(), Err(GraphicsError::OutOfMemory));
        assert!(backend.create_query().is_ok());
    }

    #[test]
    fn test_fence_completion() {
        let backend = backend_with_context();
        backend.set_auto_signal(false);
        let fence = backend.create_fence().unwrap();
        assert!(!backend.is_fence_signaled(&fence));

        backend.issue_fence(&fence);
        assert!(!backend.is_fence_signaled(&fence));

        backend.wait_fence(&fence);
        assert!(backend.is_fence_signaled(&fence));
    }

    #[test]
    fn test_query_resolution() {
        let backend = backend_with_context();
        backend.set_auto_signal(false);
        backend.set_query_samples(42);
        let query = backend.create_query().unwrap();
        assert_eq!(backend.query_result(&query, false), None);

        backend.begin_query(&query);
        backend.end_query(&query);
        assert_eq!(backend.query_result(&query, false), None);

        backend.signal_all();
        assert_eq!(backend.query_result(&query, false), Some(42));
    }

    #[test]
    fn test_lock_log() {
        let backend = backend_with_context();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        backend
            .lock_buffer(&buffer, 0, 64, LockPolicy::Discard)
            .unwrap();
        assert!(
            backend
                .lock_buffer(&buffer, 0, 64, LockPolicy::NoOverwrite)
                .is_err()
        );
        backend.unlock_buffer(&buffer);

        let log = backend.lock_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].policy, LockPolicy::Discard);
        assert_eq!(backend.stats().discard_locks, 1);
    }

    #[test]
    fn test_clear_log_drops_records_keeps_stats() {
        let backend = backend_with_context();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        backend
            .lock_buffer(&buffer, 0, 64, LockPolicy::Discard)
            .unwrap();
        backend.unlock_buffer(&buffer);
        assert!(!backend.lock_log().is_empty());
        assert!(!backend.events().is_empty());

        backend.clear_log();
        assert!(backend.lock_log().is_empty());
        assert!(backend.events().is_empty());
        assert_eq!(backend.stats().discard_locks, 1);
    }

    #[test]
    fn test_write_buffer_offset_overflow() {
        let backend = backend_with_context();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(8, BufferUsage::VERTEX))
            .unwrap();
        assert!(matches!(
            backend.write_buffer(&buffer, u64::MAX, &[1, 2]),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert_eq!(backend.stats().bytes_written, 0);
    }
}
