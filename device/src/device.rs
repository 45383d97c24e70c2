//! Graphics device.
//!
//! The [`GraphicsDevice`] owns every GPU resource it creates and keeps them
//! usable across context loss. Its lifecycle is a small state machine:
//!
//! ```text
//!  Uninitialized ──init──► Ready ──begin_reset──► Invalidated
//!                            ▲                        │
//!                            └──────end_reset─────────┘
//!  Ready | Invalidated ──destroy──► Destroyed
//! ```
//!
//! `begin_reset` clears the binding table, invalidates every registered
//! resource and then the swap-chain surfaces. `end_reset` recreates the
//! surfaces, applies the [`StateCachePolicy`], rebuilds every registered
//! resource and marks the whole binding table dirty.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::GpuBackend;
use crate::binding::{BindingState, DirtyState, MAX_TEXTURE_UNITS, MAX_VERTEX_STREAMS, StreamBinding};
use crate::config::{DeviceConfig, StateCachePolicy, SurfaceConfig};
use crate::diagnostics::{self, LeakEntry};
use crate::error::GraphicsError;
use crate::resources::{
    Buffer, DeviceId, Fence, FenceStatus, GpuResource, Query, QueryStatus, Resource,
    ResourceHandle, ResourceKind, ResourceRegistry, Texture, VolatileAllocation, VolatileBuffer,
};
use crate::state_cache::StateBlockCache;
use crate::surface::SurfaceSet;
use crate::types::{
    BufferDescriptor, BufferShape, BufferType, BufferUsage, INDEX_SIZE, StateBlockDesc,
    TextureDescriptor, VertexLayout,
};

/// Lifecycle state of a [`GraphicsDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    /// Created, no native context yet.
    Uninitialized,
    /// Every registered resource is valid.
    Ready,
    /// The context is gone; resources hold no native objects.
    Invalidated,
    /// Torn down for good.
    Destroyed,
}

/// Owner of the native context and of every resource created through it.
///
/// All operations run on the render thread and take `&mut self`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use redlilium_device::{BufferShape, DeviceConfig, DummyBackend, GraphicsDevice, LockPolicy};
///
/// let mut device = GraphicsDevice::new(Arc::new(DummyBackend::new()), DeviceConfig::default());
/// device.init()?;
///
/// let alloc = device.acquire_volatile(&BufferShape::Index, 6)?;
/// device.write_volatile(&BufferShape::Index, bytemuck::cast_slice(&[0u16, 1, 2, 2, 1, 3]))?;
/// device.unlock_volatile(&BufferShape::Index)?;
/// assert_eq!(alloc.policy, LockPolicy::NoOverwrite);
///
/// device.on_context_lost()?;
/// device.on_context_restored()?;
/// # Ok::<(), redlilium_device::GraphicsError>(())
/// ```
pub struct GraphicsDevice {
    id: DeviceId,
    config: DeviceConfig,
    backend: Arc<dyn GpuBackend>,
    state: DeviceState,
    registry: ResourceRegistry,
    pools: HashMap<BufferShape, ResourceHandle>,
    state_cache: StateBlockCache,
    bindings: BindingState,
    surfaces: SurfaceSet,
    frame_index: u64,
    rebuild_failures: u64,
}

impl GraphicsDevice {
    /// Create a device on top of a backend. Call [`init`](Self::init) before use.
    pub fn new(backend: Arc<dyn GpuBackend>, config: DeviceConfig) -> Self {
        let id = DeviceId::next();
        Self {
            id,
            surfaces: SurfaceSet::new(config.surface),
            config,
            backend,
            state: DeviceState::Uninitialized,
            registry: ResourceRegistry::new(id),
            pools: HashMap::new(),
            state_cache: StateBlockCache::new(),
            bindings: BindingState::new(),
            frame_index: 0,
            rebuild_failures: 0,
        }
    }

    /// Device identity, as recorded in every resource it owns.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Returns true in [`DeviceState::Ready`].
    pub fn is_ready(&self) -> bool {
        self.state == DeviceState::Ready
    }

    /// Device configuration.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// The native backend.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Every registered resource.
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// The state block cache.
    pub fn state_cache(&self) -> &StateBlockCache {
        &self.state_cache
    }

    /// The binding table.
    pub fn bindings(&self) -> &BindingState {
        &self.bindings
    }

    /// The swap-chain surfaces.
    pub fn surfaces(&self) -> &SurfaceSet {
        &self.surfaces
    }

    /// Frames completed with [`end_frame`](Self::end_frame).
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Resources that failed to rebuild across all restores.
    pub fn rebuild_failures(&self) -> u64 {
        self.rebuild_failures
    }

    /// A registered resource.
    pub fn resource(&self, handle: ResourceHandle) -> Option<&Resource> {
        self.registry.get(handle)
    }

    /// A registered buffer.
    pub fn buffer(&self, handle: ResourceHandle) -> Option<&Buffer> {
        self.registry.get(handle).and_then(Resource::as_buffer)
    }

    /// A registered texture.
    pub fn texture(&self, handle: ResourceHandle) -> Option<&Texture> {
        self.registry.get(handle).and_then(Resource::as_texture)
    }

    /// The volatile pool serving `shape`, if one exists yet.
    pub fn volatile_pool(&self, shape: &BufferShape) -> Option<&VolatileBuffer> {
        let handle = self.pools.get(shape)?;
        self.registry.get(*handle).and_then(Resource::as_volatile)
    }

    /// Create the native context, the surfaces and the volatile index pool.
    pub fn init(&mut self) -> Result<(), GraphicsError> {
        if self.state != DeviceState::Uninitialized {
            return Err(GraphicsError::InvalidState(format!(
                "init called on a device in {:?} state",
                self.state
            )));
        }
        crate::profile_function!();

        let backend = &*self.backend;
        backend
            .create_context(&self.config.surface)
            .map_err(|err| GraphicsError::InitializationFailed(err.to_string()))?;
        if let Err(err) = self.surfaces.create(backend) {
            backend.destroy_context();
            return Err(GraphicsError::InitializationFailed(err.to_string()));
        }

        self.state = DeviceState::Ready;
        if let Err(err) = self.pool_for(&BufferShape::Index) {
            self.surfaces.release(&*self.backend);
            self.backend.destroy_context();
            self.state = DeviceState::Uninitialized;
            return Err(GraphicsError::InitializationFailed(err.to_string()));
        }

        log::info!(
            "GraphicsDevice: initialized {:?} on {} ({}x{})",
            self.config.label,
            self.backend.name(),
            self.config.surface.width,
            self.config.surface.height
        );
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), GraphicsError> {
        match self.state {
            DeviceState::Ready => Ok(()),
            state => Err(GraphicsError::InvalidState(format!(
                "device is {state:?}, expected Ready"
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Factories
    // ------------------------------------------------------------------

    /// Create a static or dynamic vertex buffer of `vertex_count` vertices.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the device is ready, `InvalidParameter` for an
    /// empty buffer, an invalid layout or [`BufferType::Volatile`] (volatile
    /// data goes through [`acquire_volatile`](Self::acquire_volatile)), and
    /// any backend allocation error.
    pub fn create_vertex_buffer(
        &mut self,
        vertex_count: u32,
        layout: &VertexLayout,
        buffer_type: BufferType,
        initial_data: Option<&[u8]>,
    ) -> Result<ResourceHandle, GraphicsError> {
        self.ensure_ready()?;
        if !layout.is_valid() {
            return Err(GraphicsError::InvalidParameter(format!(
                "vertex layout with stride {} is invalid",
                layout.stride
            )));
        }
        let descriptor = BufferDescriptor::new(
            u64::from(vertex_count) * u64::from(layout.stride),
            BufferUsage::VERTEX | BufferUsage::COPY_DST,
        )
        .with_type(buffer_type);
        self.register_buffer(descriptor, BufferShape::vertex(layout.clone()), initial_data)
    }

    /// Create a static or dynamic buffer of `index_count` 16-bit indices.
    pub fn create_index_buffer(
        &mut self,
        index_count: u32,
        buffer_type: BufferType,
        initial_data: Option<&[u8]>,
    ) -> Result<ResourceHandle, GraphicsError> {
        self.ensure_ready()?;
        let descriptor = BufferDescriptor::new(
            u64::from(index_count) * INDEX_SIZE,
            BufferUsage::INDEX | BufferUsage::COPY_DST,
        )
        .with_type(buffer_type);
        self.register_buffer(descriptor, BufferShape::Index, initial_data)
    }

    fn register_buffer(
        &mut self,
        descriptor: BufferDescriptor,
        shape: BufferShape,
        initial_data: Option<&[u8]>,
    ) -> Result<ResourceHandle, GraphicsError> {
        let buffer = Buffer::create(&*self.backend, descriptor, shape, initial_data)?;
        log::trace!(
            "GraphicsDevice: created {:?} buffer, size={}",
            buffer.buffer_type(),
            buffer.size()
        );
        Ok(self.registry.register(buffer.into()))
    }

    /// Create a texture, optionally with the pixels of its top mip level.
    pub fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
        pixels: Option<&[u8]>,
    ) -> Result<ResourceHandle, GraphicsError> {
        self.ensure_ready()?;
        let texture = Texture::create(&*self.backend, descriptor.clone(), pixels)?;
        log::trace!(
            "GraphicsDevice: created texture {:?}, size={}x{}",
            descriptor.label,
            descriptor.width,
            descriptor.height
        );
        Ok(self.registry.register(texture.into()))
    }

    /// Create a fence.
    pub fn create_fence(&mut self) -> Result<ResourceHandle, GraphicsError> {
        self.ensure_ready()?;
        let fence = Fence::create(&*self.backend)?;
        Ok(self.registry.register(fence.into()))
    }

    /// Create an occlusion query.
    pub fn create_query(&mut self) -> Result<ResourceHandle, GraphicsError> {
        self.ensure_ready()?;
        let query = Query::create(&*self.backend)?;
        Ok(self.registry.register(query.into()))
    }

    /// Return the cached state object for `desc`, compiling it on first use.
    ///
    /// Bit-identical descriptors always yield the same handle. The handle
    /// belongs to the cache; it cannot be released by the caller.
    pub fn get_or_create_state_object(
        &mut self,
        desc: &StateBlockDesc,
    ) -> Result<ResourceHandle, GraphicsError> {
        self.ensure_ready()?;
        self.state_cache
            .get_or_create(desc, &mut self.registry, &*self.backend)
    }

    /// Add a reference to a resource. Returns the new count.
    pub fn retain(&mut self, handle: ResourceHandle) -> Result<u32, GraphicsError> {
        self.registry
            .retain(handle)
            .ok_or_else(|| stale_handle(handle))
    }

    /// Drop a reference to a resource; the last release destroys it and
    /// unbinds it from every slot.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` for a stale handle or for a resource the device owns
    /// itself (volatile pools, cached state objects).
    pub fn release(&mut self, handle: ResourceHandle) -> Result<(), GraphicsError> {
        if !self.registry.contains(handle) {
            return Err(stale_handle(handle));
        }
        if self.is_device_owned(handle) {
            return Err(GraphicsError::InvalidHandle(format!(
                "{handle:?} is owned by the device"
            )));
        }
        if let Some(mut resource) = self.registry.release(handle) {
            self.bindings.forget(handle);
            resource.invalidate(&*self.backend);
            log::trace!(
                "GraphicsDevice: destroyed {:?} {:?}",
                resource.kind(),
                resource.label()
            );
        }
        Ok(())
    }

    fn is_device_owned(&self, handle: ResourceHandle) -> bool {
        self.pools.values().any(|h| *h == handle) || self.state_cache.contains_handle(handle)
    }

    /// Overwrite part of a static or dynamic buffer.
    pub fn update_buffer(
        &mut self,
        handle: ResourceHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        self.ensure_ready()?;
        let buffer = self
            .registry
            .get_mut(handle)
            .and_then(Resource::as_buffer_mut)
            .ok_or_else(|| wrong_kind(handle, ResourceKind::Buffer))?;
        buffer.update(&*self.backend, offset, data)
    }

    // ------------------------------------------------------------------
    // Volatile pools
    // ------------------------------------------------------------------

    fn pool_for(&mut self, shape: &BufferShape) -> Result<ResourceHandle, GraphicsError> {
        if let Some(handle) = self.pools.get(shape) {
            return Ok(*handle);
        }
        let capacity = match shape {
            BufferShape::Index => self.config.max_dynamic_indices,
            BufferShape::Vertex(_) => self.config.max_dynamic_vertices,
        };
        let pool = VolatileBuffer::create(
            &*self.backend,
            shape.clone(),
            capacity,
            self.config.buffered_frames,
        )?;
        log::debug!(
            "GraphicsDevice: created volatile pool {:?} ({} elements x {} frames)",
            pool.label(),
            capacity,
            pool.buffered_frames()
        );
        let handle = self.registry.register(pool.into());
        self.pools.insert(shape.clone(), handle);
        Ok(handle)
    }

    /// Lock `count_needed` elements of the pool serving `shape`, creating
    /// the pool on first use.
    ///
    /// # Panics
    ///
    /// Panics if `count_needed` is zero or exceeds the pool capacity, or if
    /// the pool is already locked.
    pub fn acquire_volatile(
        &mut self,
        shape: &BufferShape,
        count_needed: u32,
    ) -> Result<VolatileAllocation, GraphicsError> {
        self.ensure_ready()?;
        crate::profile_scope!("acquire_volatile");
        let handle = self.pool_for(shape)?;
        let pool = volatile_mut(&mut self.registry, handle)?;
        let lock = pool.lock(&*self.backend, count_needed)?;
        Ok(VolatileAllocation {
            buffer: handle,
            start_offset: lock.start,
            count: lock.count(),
            byte_offset: u64::from(lock.start) * shape.element_size(),
            policy: lock.policy,
        })
    }

    /// Copy element bytes into the locked range of the pool serving `shape`.
    ///
    /// # Panics
    ///
    /// Panics if no pool serves `shape` or the pool is not locked.
    pub fn write_volatile(&mut self, shape: &BufferShape, data: &[u8]) -> Result<(), GraphicsError> {
        let handle = self.existing_pool(shape);
        volatile_mut(&mut self.registry, handle)?.write(&*self.backend, data)
    }

    /// Commit the outstanding lock of the pool serving `shape`.
    ///
    /// # Panics
    ///
    /// Panics if no pool serves `shape` or the pool is not locked.
    pub fn unlock_volatile(&mut self, shape: &BufferShape) -> Result<(), GraphicsError> {
        let handle = self.existing_pool(shape);
        volatile_mut(&mut self.registry, handle)?.unlock(&*self.backend);
        Ok(())
    }

    fn existing_pool(&self, shape: &BufferShape) -> ResourceHandle {
        match self.pools.get(shape) {
            Some(handle) => *handle,
            None => panic!("no volatile pool serves {shape:?}; acquire_volatile first"),
        }
    }

    /// Per-frame reset of every volatile pool.
    ///
    /// # Panics
    ///
    /// Panics if any pool is still locked.
    pub fn end_frame(&mut self) {
        let mut discards = 0;
        for handle in self.pools.values() {
            if let Some(pool) = self.registry.get_mut(*handle).and_then(Resource::as_volatile_mut) {
                discards += pool.stats().frame_discards;
                pool.end_frame();
            }
        }
        crate::profile_plot!("volatile discards", discards);
        self.frame_index += 1;
        crate::frame_mark!();
    }

    // ------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------

    /// Bind a buffer or volatile pool to a vertex stream, `offset` bytes in.
    pub fn set_vertex_buffer(
        &mut self,
        stream: u32,
        buffer: Option<ResourceHandle>,
        offset: u64,
    ) -> Result<(), GraphicsError> {
        if stream as usize >= MAX_VERTEX_STREAMS {
            return Err(GraphicsError::InvalidParameter(format!(
                "vertex stream {stream} out of range (max {MAX_VERTEX_STREAMS})"
            )));
        }
        if let Some(handle) = buffer {
            self.expect_shape(handle, false)?;
        }
        self.bindings
            .set_stream(stream as usize, buffer.map(|buffer| StreamBinding { buffer, offset }));
        Ok(())
    }

    /// Bind an index buffer or the volatile index pool.
    pub fn set_index_buffer(&mut self, buffer: Option<ResourceHandle>) -> Result<(), GraphicsError> {
        if let Some(handle) = buffer {
            self.expect_shape(handle, true)?;
        }
        self.bindings.set_index_buffer(buffer);
        Ok(())
    }

    fn expect_shape(&self, handle: ResourceHandle, index: bool) -> Result<(), GraphicsError> {
        let shape = match self.registry.get(handle) {
            Some(Resource::Buffer(buffer)) => buffer.shape(),
            Some(Resource::VolatileBuffer(pool)) => pool.shape(),
            _ => return Err(wrong_kind(handle, ResourceKind::Buffer)),
        };
        if shape.is_index() != index {
            return Err(GraphicsError::InvalidParameter(format!(
                "{handle:?} holds {} data",
                if shape.is_index() { "index" } else { "vertex" }
            )));
        }
        Ok(())
    }

    /// Bind a texture to a unit.
    pub fn set_texture(
        &mut self,
        unit: u32,
        texture: Option<ResourceHandle>,
    ) -> Result<(), GraphicsError> {
        if unit as usize >= MAX_TEXTURE_UNITS {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture unit {unit} out of range (max {MAX_TEXTURE_UNITS})"
            )));
        }
        if let Some(handle) = texture
            && self.texture(handle).is_none()
        {
            return Err(wrong_kind(handle, ResourceKind::Texture));
        }
        self.bindings.set_texture(unit as usize, texture);
        Ok(())
    }

    /// Bind a cached state object.
    pub fn set_state_block(&mut self, state: Option<ResourceHandle>) -> Result<(), GraphicsError> {
        if let Some(handle) = state
            && self
                .registry
                .get(handle)
                .and_then(Resource::as_state_object)
                .is_none()
        {
            return Err(wrong_kind(handle, ResourceKind::StateObject));
        }
        self.bindings.set_state_block(state);
        Ok(())
    }

    /// Send every dirty binding slot to the backend. Returns the slots sent.
    pub fn commit_bindings(&mut self) -> Result<DirtyState, GraphicsError> {
        self.ensure_ready()?;
        let dirty = self.bindings.take_dirty();
        let backend = &*self.backend;
        let registry = &self.registry;

        if dirty.contains(DirtyState::VERTEX_STREAMS) {
            for (stream, binding) in self.bindings.streams() {
                let native = binding
                    .and_then(|b| registry.get(b.buffer))
                    .and_then(Resource::native_buffer);
                backend.bind_vertex_buffer(stream as u32, native, binding.map_or(0, |b| b.offset));
            }
        }
        if dirty.contains(DirtyState::INDEX_BUFFER) {
            let native = self
                .bindings
                .index_buffer()
                .and_then(|h| registry.get(h))
                .and_then(Resource::native_buffer);
            backend.bind_index_buffer(native);
        }
        if dirty.contains(DirtyState::TEXTURES) {
            for (unit, texture) in self.bindings.textures() {
                let native = texture
                    .and_then(|h| registry.get(h))
                    .and_then(Resource::as_texture)
                    .and_then(Texture::native);
                backend.bind_texture(unit as u32, native);
            }
        }
        if dirty.contains(DirtyState::STATE_BLOCK) {
            let native = self
                .bindings
                .state_block()
                .and_then(|h| registry.get(h))
                .and_then(Resource::as_state_object)
                .and_then(|s| s.native());
            backend.bind_state_object(native);
        }
        Ok(dirty)
    }

    fn unbind_backend(backend: &dyn GpuBackend) {
        for stream in 0..MAX_VERTEX_STREAMS {
            backend.bind_vertex_buffer(stream as u32, None, 0);
        }
        backend.bind_index_buffer(None);
        for unit in 0..MAX_TEXTURE_UNITS {
            backend.bind_texture(unit as u32, None);
        }
        backend.bind_state_object(None);
    }

    // ------------------------------------------------------------------
    // Fences and queries
    // ------------------------------------------------------------------

    /// Insert a fence into the command stream.
    pub fn issue_fence(&mut self, handle: ResourceHandle) -> Result<(), GraphicsError> {
        self.ensure_ready()?;
        self.registry
            .get_mut(handle)
            .and_then(Resource::as_fence_mut)
            .ok_or_else(|| wrong_kind(handle, ResourceKind::Fence))?
            .issue(&*self.backend)
    }

    /// Poll a fence, or wait for it when `block` is set.
    pub fn fence_status(
        &self,
        handle: ResourceHandle,
        block: bool,
    ) -> Result<FenceStatus, GraphicsError> {
        let fence = self
            .registry
            .get(handle)
            .and_then(Resource::as_fence)
            .ok_or_else(|| wrong_kind(handle, ResourceKind::Fence))?;
        Ok(fence.status(&*self.backend, block))
    }

    /// Start an occlusion query.
    pub fn begin_query(&mut self, handle: ResourceHandle) -> Result<(), GraphicsError> {
        self.ensure_ready()?;
        query_mut(&mut self.registry, handle)?.begin(&*self.backend)
    }

    /// End an occlusion query.
    pub fn end_query(&mut self, handle: ResourceHandle) -> Result<(), GraphicsError> {
        self.ensure_ready()?;
        query_mut(&mut self.registry, handle)?.end(&*self.backend)
    }

    /// Poll a query, or wait for its result when `block` is set.
    pub fn query_status(
        &self,
        handle: ResourceHandle,
        block: bool,
    ) -> Result<QueryStatus, GraphicsError> {
        let query = self
            .registry
            .get(handle)
            .and_then(Resource::as_query)
            .ok_or_else(|| wrong_kind(handle, ResourceKind::Query))?;
        Ok(query.status(&*self.backend, block))
    }

    // ------------------------------------------------------------------
    // Reset protocol
    // ------------------------------------------------------------------

    /// Release every native object after the context was lost.
    ///
    /// Does nothing if the device is already invalidated.
    pub fn begin_reset(&mut self) -> Result<(), GraphicsError> {
        match self.state {
            DeviceState::Ready => {}
            DeviceState::Invalidated => return Ok(()),
            state => {
                return Err(GraphicsError::InvalidState(format!(
                    "cannot reset a device in {state:?} state"
                )));
            }
        }
        crate::profile_scope!("begin_reset");
        log::info!(
            "GraphicsDevice: invalidating {} resources",
            self.registry.len()
        );

        let backend = &*self.backend;
        self.bindings.clear();
        Self::unbind_backend(backend);
        self.registry.for_each(|_, resource| resource.invalidate(backend));
        self.surfaces.release(backend);

        self.state = DeviceState::Invalidated;
        Ok(())
    }

    /// Recreate every native object once the context is back.
    ///
    /// Does nothing if the device is ready. Resources that fail to rebuild
    /// stay invalid; the first failure is returned after every other
    /// resource had its chance, and the device is `Ready` regardless.
    ///
    /// # Errors
    ///
    /// `DeviceLost` (and the device stays invalidated) while the backend
    /// still reports the context as lost or the surfaces cannot be created.
    pub fn end_reset(&mut self) -> Result<(), GraphicsError> {
        match self.state {
            DeviceState::Invalidated => {}
            DeviceState::Ready => return Ok(()),
            state => {
                return Err(GraphicsError::InvalidState(format!(
                    "cannot restore a device in {state:?} state"
                )));
            }
        }
        crate::profile_scope!("end_reset");

        let backend = &*self.backend;
        if backend.is_context_lost() {
            return Err(GraphicsError::DeviceLost);
        }
        self.surfaces.create(backend)?;

        let flush = match self.config.state_cache_policy {
            StateCachePolicy::Auto => !backend.preserves_state_objects(),
            StateCachePolicy::Retain => false,
            StateCachePolicy::Flush => true,
        };
        if flush {
            self.state_cache.flush(&mut self.registry, backend);
        }

        let mut first_error = None;
        let mut failures = 0;
        self.registry.for_each(|handle, resource| {
            if let Err(err) = resource.rebuild(backend) {
                log::error!(
                    "GraphicsDevice: failed to rebuild {:?} {:?} ({handle:?}): {err}",
                    resource.kind(),
                    resource.label()
                );
                failures += 1;
                first_error.get_or_insert(err);
            }
        });
        self.rebuild_failures += failures;

        self.bindings.mark_all_dirty();
        self.state = DeviceState::Ready;
        log::info!(
            "GraphicsDevice: restored {} resources ({} failed)",
            self.registry.len(),
            failures
        );
        first_error.map_or(Ok(()), Err)
    }

    /// Platform notification that the context was lost. Same as [`begin_reset`](Self::begin_reset).
    pub fn on_context_lost(&mut self) -> Result<(), GraphicsError> {
        self.begin_reset()
    }

    /// Platform notification that the context is back. Same as [`end_reset`](Self::end_reset).
    pub fn on_context_restored(&mut self) -> Result<(), GraphicsError> {
        self.end_reset()
    }

    /// Resize the back buffer. A ready device goes through a full reset.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), GraphicsError> {
        if width == 0 || height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "surface size {width}x{height} is empty"
            )));
        }
        let surface = SurfaceConfig {
            width,
            height,
            ..self.config.surface
        };
        self.switch_mode(surface)
    }

    /// Enter or leave exclusive fullscreen. A ready device goes through a full reset.
    pub fn set_fullscreen(&mut self, fullscreen: bool) -> Result<(), GraphicsError> {
        let surface = SurfaceConfig {
            fullscreen,
            ..self.config.surface
        };
        self.switch_mode(surface)
    }

    fn switch_mode(&mut self, surface: SurfaceConfig) -> Result<(), GraphicsError> {
        if surface == self.config.surface {
            return Ok(());
        }
        match self.state {
            DeviceState::Destroyed => Err(GraphicsError::InvalidState(
                "device is destroyed".to_string(),
            )),
            DeviceState::Uninitialized | DeviceState::Invalidated => {
                self.config.surface = surface;
                self.surfaces.reconfigure(surface);
                Ok(())
            }
            DeviceState::Ready => {
                log::info!(
                    "GraphicsDevice: mode switch to {}x{} (fullscreen: {})",
                    surface.width,
                    surface.height,
                    surface.fullscreen
                );
                self.begin_reset()?;
                self.config.surface = surface;
                self.surfaces.reconfigure(surface);
                self.end_reset()
            }
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Resources still registered that the device does not account for.
    ///
    /// Everything except volatile pools and cached state objects counts;
    /// the front end is expected to have released those before teardown.
    pub fn leak_report(&mut self) -> Vec<LeakEntry> {
        let owned: Vec<ResourceHandle> = self
            .pools
            .values()
            .copied()
            .chain(self.state_cache.handles())
            .collect();
        diagnostics::mark_all(&mut self.registry);
        for handle in owned {
            diagnostics::unmark(&mut self.registry, handle);
        }
        diagnostics::sweep(&mut self.registry)
    }

    /// Tear the device down: release the volatile pools, flush the state
    /// cache, report and destroy leaked resources, then destroy the native
    /// context. Idempotent; also run on drop.
    pub fn destroy(&mut self) {
        if self.state == DeviceState::Destroyed {
            return;
        }
        crate::profile_function!();
        let had_context = self.state != DeviceState::Uninitialized;

        let leaks = self.leak_report();
        for leak in &leaks {
            log::warn!("GraphicsDevice: leaked {leak}");
        }

        let backend = &*self.backend;
        for (_, handle) in self.pools.drain() {
            if let Some(mut pool) = self.registry.unregister(handle) {
                pool.invalidate(backend);
            }
        }
        self.state_cache.flush(&mut self.registry, backend);
        for handle in self.registry.handles() {
            if let Some(mut resource) = self.registry.unregister(handle) {
                resource.invalidate(backend);
            }
        }

        self.bindings.clear();
        self.surfaces.release(backend);
        if had_context {
            backend.destroy_context();
        }
        self.state = DeviceState::Destroyed;
        log::info!(
            "GraphicsDevice: destroyed {:?} ({} leaked resources)",
            self.config.label,
            leaks.len()
        );
    }
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("id", &self.id)
            .field("label", &self.config.label)
            .field("backend", &self.backend.name())
            .field("state", &self.state)
            .field("resources", &self.registry.len())
            .field("pools", &self.pools.len())
            .field("cached_states", &self.state_cache.len())
            .finish()
    }
}

fn volatile_mut(
    registry: &mut ResourceRegistry,
    handle: ResourceHandle,
) -> Result<&mut VolatileBuffer, GraphicsError> {
    registry
        .get_mut(handle)
        .and_then(Resource::as_volatile_mut)
        .ok_or_else(|| GraphicsError::Internal(format!("volatile pool {handle:?} is missing")))
}

fn query_mut(
    registry: &mut ResourceRegistry,
    handle: ResourceHandle,
) -> Result<&mut Query, GraphicsError> {
    registry
        .get_mut(handle)
        .and_then(Resource::as_query_mut)
        .ok_or_else(|| wrong_kind(handle, ResourceKind::Query))
}

fn stale_handle(handle: ResourceHandle) -> GraphicsError {
    GraphicsError::InvalidHandle(format!("{handle:?} does not refer to a live resource"))
}

fn wrong_kind(handle: ResourceHandle, expected: ResourceKind) -> GraphicsError {
    GraphicsError::InvalidHandle(format!("{handle:?} is not a live {expected:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, NativeKind};

    fn device() -> (Arc<DummyBackend>, GraphicsDevice) {
        let backend = Arc::new(DummyBackend::new());
        let mut device = GraphicsDevice::new(backend.clone(), DeviceConfig::default());
        device.init().unwrap();
        (backend, device)
    }

    #[test]
    fn test_init_creates_index_pool() {
        let (backend, device) = device();
        assert!(device.is_ready());
        assert_eq!(device.registry().len(), 1);
        let pool = device.volatile_pool(&BufferShape::Index).unwrap();
        assert_eq!(pool.capacity(), DeviceConfig::DEFAULT_MAX_DYNAMIC_INDICES);
        assert_eq!(backend.live_count(NativeKind::Surface), 2);
    }

    #[test]
    fn test_init_twice_fails() {
        let (_backend, mut device) = device();
        assert!(matches!(device.init(), Err(GraphicsError::InvalidState(_))));
    }

    #[test]
    fn test_init_failure_rolls_back() {
        let backend = Arc::new(DummyBackend::new());
        let mut device = GraphicsDevice::new(backend.clone(), DeviceConfig::default());
        backend.lose_context();
        assert!(matches!(
            device.init(),
            Err(GraphicsError::InitializationFailed(_))
        ));
        assert_eq!(device.state(), DeviceState::Uninitialized);
        assert_eq!(backend.live_objects(), 0);

        backend.restore_context();
        backend.fail_next_allocations(1);
        assert!(device.init().is_err());
        assert!(!backend.has_context());
        assert_eq!(backend.live_objects(), 0);

        device.init().unwrap();
        assert!(device.is_ready());
    }

    #[test]
    fn test_creation_requires_ready() {
        let backend = Arc::new(DummyBackend::new());
        let mut device = GraphicsDevice::new(backend, DeviceConfig::default());
        assert!(matches!(
            device.create_fence(),
            Err(GraphicsError::InvalidState(_))
        ));
    }

    #[test]
    fn test_device_owned_handles_cannot_be_released() {
        let (_backend, mut device) = device();
        let pool = device
            .acquire_volatile(&BufferShape::Index, 3)
            .unwrap()
            .buffer;
        device.unlock_volatile(&BufferShape::Index).unwrap();
        assert!(matches!(
            device.release(pool),
            Err(GraphicsError::InvalidHandle(_))
        ));

        let state = device
            .get_or_create_state_object(&StateBlockDesc::new())
            .unwrap();
        assert!(matches!(
            device.release(state),
            Err(GraphicsError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_drop_destroys_everything() {
        let backend = Arc::new(DummyBackend::new());
        {
            let mut device = GraphicsDevice::new(backend.clone(), DeviceConfig::default());
            device.init().unwrap();
            device.create_fence().unwrap();
            device
                .get_or_create_state_object(&StateBlockDesc::new())
                .unwrap();
        }
        assert_eq!(backend.live_objects(), 0);
        assert!(!backend.has_context());
        assert_eq!(backend.stats().double_destroys, 0);
    }

    #[test]
    fn test_debug_output() {
        let (_backend, device) = device();
        let debug = format!("{:?}", device);
        assert!(debug.contains("GraphicsDevice"));
        assert!(debug.contains("Ready"));
    }
}
