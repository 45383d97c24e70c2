//! GPU backend abstraction layer.
//!
//! This module provides the trait-based seam between the portable resource
//! lifecycle machinery and a native graphics API.
//!
//! # Available Backends
//!
//! - `dummy`: No-op backend that keeps full bookkeeping of native objects,
//!   used for testing and headless development.
//!
//! # Ownership
//!
//! Native handles ([`GpuBuffer`], [`GpuTexture`], ...) are neither `Clone` nor
//! `Copy`. The resource wrapper that receives one from a `create_*` call owns
//! it exclusively and gives it back by value to the matching `destroy_*` call,
//! so a handle cannot be released twice.

pub mod dummy;

pub use dummy::{DummyBackend, DummyStats, LockRecord, NativeEvent, NativeKind};

use crate::config::SurfaceConfig;
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, StateBlockDesc, TextureDescriptor};

/// Write policy for a buffer lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockPolicy {
    /// The whole buffer may be overwritten; the backend renames storage
    /// instead of waiting for in-flight reads.
    Discard,
    /// Append after regions that may still be read by the GPU, without
    /// touching them.
    NoOverwrite,
}

/// Kind of swap-chain surface owned directly by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    /// The presentable color buffer.
    BackBuffer,
    /// The depth-stencil buffer paired with the back buffer.
    DepthStencil,
}

macro_rules! native_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, PartialEq, Eq, Hash)]
        pub struct $name {
            id: u64,
        }

        impl $name {
            /// Wrap a backend object id (called by backends).
            pub fn new(id: u64) -> Self {
                Self { id }
            }

            /// Backend object id.
            pub fn id(&self) -> u64 {
                self.id
            }
        }
    };
}

native_handle!(
    /// Native texture handle.
    GpuTexture
);
native_handle!(
    /// Native compiled state object handle.
    GpuStateObject
);
native_handle!(
    /// Native fence handle.
    GpuFence
);
native_handle!(
    /// Native occlusion query handle.
    GpuQuery
);

/// Native buffer handle.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct GpuBuffer {
    id: u64,
    size: u64,
}

impl GpuBuffer {
    /// Wrap a backend buffer id (called by backends).
    pub fn new(id: u64, size: u64) -> Self {
        Self { id, size }
    }

    /// Backend object id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Size of the storage in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Native swap-chain surface handle.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct GpuSurface {
    id: u64,
    kind: SurfaceKind,
    width: u32,
    height: u32,
}

impl GpuSurface {
    /// Wrap a backend surface id (called by backends).
    pub fn new(id: u64, kind: SurfaceKind, width: u32, height: u32) -> Self {
        Self {
            id,
            kind,
            width,
            height,
        }
    }

    /// Backend object id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Surface kind.
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    /// Size in pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// GPU backend trait for abstracting different GPU APIs.
///
/// All methods take `&self`; backends use interior mutability for their own
/// bookkeeping. The device calls them from a single thread.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Whether compiled state objects survive a context loss.
    ///
    /// When `true` the device keeps its state block cache across a reset.
    fn preserves_state_objects(&self) -> bool;

    /// Create the native context.
    fn create_context(&self, config: &SurfaceConfig) -> Result<(), GraphicsError>;

    /// Destroy the native context.
    fn destroy_context(&self);

    /// Whether the native context is currently lost.
    fn is_context_lost(&self) -> bool;

    /// Create a swap-chain surface.
    fn create_surface(
        &self,
        kind: SurfaceKind,
        width: u32,
        height: u32,
    ) -> Result<GpuSurface, GraphicsError>;

    /// Destroy a swap-chain surface.
    fn destroy_surface(&self, surface: GpuSurface);

    /// Create a buffer resource.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError>;

    /// Destroy a buffer resource.
    fn destroy_buffer(&self, buffer: GpuBuffer);

    /// Write data to a buffer.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8])
    -> Result<(), GraphicsError>;

    /// Lock a byte range of a buffer for CPU writes with the given policy.
    fn lock_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
        policy: LockPolicy,
    ) -> Result<(), GraphicsError>;

    /// Commit the outstanding lock on a buffer.
    fn unlock_buffer(&self, buffer: &GpuBuffer);

    /// Create a texture resource.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError>;

    /// Destroy a texture resource.
    fn destroy_texture(&self, texture: GpuTexture);

    /// Upload the top mip level of a texture.
    fn write_texture(&self, texture: &GpuTexture, data: &[u8]) -> Result<(), GraphicsError>;

    /// Compile a state object.
    fn create_state_object(&self, desc: &StateBlockDesc) -> Result<GpuStateObject, GraphicsError>;

    /// Destroy a state object.
    fn destroy_state_object(&self, state: GpuStateObject);

    /// Create a fence.
    fn create_fence(&self) -> Result<GpuFence, GraphicsError>;

    /// Destroy a fence.
    fn destroy_fence(&self, fence: GpuFence);

    /// Insert the fence into the command stream.
    fn issue_fence(&self, fence: &GpuFence);

    /// Check if a fence is signaled (non-blocking).
    fn is_fence_signaled(&self, fence: &GpuFence) -> bool;

    /// Wait for a fence to be signaled.
    fn wait_fence(&self, fence: &GpuFence);

    /// Create an occlusion query.
    fn create_query(&self) -> Result<GpuQuery, GraphicsError>;

    /// Destroy an occlusion query.
    fn destroy_query(&self, query: GpuQuery);

    /// Start counting samples.
    fn begin_query(&self, query: &GpuQuery);

    /// Stop counting samples.
    fn end_query(&self, query: &GpuQuery);

    /// Fetch the sample count of an ended query.
    ///
    /// With `block = false` returns `None` while the GPU has not resolved it.
    fn query_result(&self, query: &GpuQuery, block: bool) -> Option<u64>;

    /// Bind (or unbind) a vertex stream.
    fn bind_vertex_buffer(&self, stream: u32, buffer: Option<&GpuBuffer>, offset: u64);

    /// Bind (or unbind) the index buffer.
    fn bind_index_buffer(&self, buffer: Option<&GpuBuffer>);

    /// Bind (or unbind) a texture unit.
    fn bind_texture(&self, unit: u32, texture: Option<&GpuTexture>);

    /// Bind (or unbind) the pipeline state object.
    fn bind_state_object(&self, state: Option<&GpuStateObject>);
}
