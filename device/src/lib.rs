//! # RedLilium Device
//!
//! GPU resource lifecycle layer for RedLilium.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GraphicsDevice`] - Owner of the native context and every resource created through it
//! - [`ResourceRegistry`] - Ordered, arena-backed set of live resources with reference counts
//! - [`VolatileBuffer`] - Per-shape pools for geometry rewritten every frame
//! - [`StateBlockCache`] - Deduplicated compiled pipeline state, keyed by FNV-1a hash
//! - [`GpuBackend`] - Trait for native API implementations, plus the [`DummyBackend`]
//!
//! Resources survive a lost context: [`GraphicsDevice::begin_reset`] releases
//! every native object and [`GraphicsDevice::end_reset`] recreates them from
//! the metadata each resource retains. Handles stay valid across the reset.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use redlilium_device::{BufferType, DeviceConfig, DummyBackend, GraphicsDevice, StateBlockDesc};
//!
//! let mut device = GraphicsDevice::new(Arc::new(DummyBackend::new()), DeviceConfig::default());
//! device.init()?;
//!
//! let indices = device.create_index_buffer(6, BufferType::Static, None)?;
//! let state = device.get_or_create_state_object(&StateBlockDesc::new())?;
//! device.set_index_buffer(Some(indices))?;
//! device.set_state_block(Some(state))?;
//! device.commit_bindings()?;
//! device.end_frame();
//! # Ok::<(), redlilium_device::GraphicsError>(())
//! ```

pub mod backend;
pub mod binding;
pub mod config;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod profiling;
pub mod resources;
pub mod state_cache;
pub mod surface;
pub mod types;

// Re-export main types for convenience
pub use backend::{DummyBackend, GpuBackend, LockPolicy, SurfaceKind};
pub use binding::{BindingState, DirtyState, MAX_TEXTURE_UNITS, MAX_VERTEX_STREAMS, StreamBinding};
pub use config::{DeviceConfig, StateCachePolicy, SurfaceConfig};
pub use device::{DeviceState, GraphicsDevice};
pub use diagnostics::LeakEntry;
pub use error::GraphicsError;
pub use resources::{
    Buffer, DeviceId, Fence, FenceStatus, GpuResource, Query, QueryStatus, Resource,
    ResourceHandle, ResourceKind, ResourceRegistry, StateObject, Texture, VolatileAllocation,
    VolatileBuffer, VolatileStats,
};
pub use state_cache::{StateBlockCache, StateCacheStats, hash_state_block};
pub use surface::SurfaceSet;
pub use types::{
    BlendState, BufferDescriptor, BufferShape, BufferType, BufferUsage, CullMode,
    DepthStencilState, RasterizerState, SamplerState, StateBlockDesc, TextureDescriptor,
    TextureFormat, TextureUsage, VertexAttribute, VertexLayout,
};

/// Device library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the device subsystem.
///
/// Only logs the version; kept so hosts can call it next to their other
/// subsystem initializers.
pub fn init() {
    log::info!("RedLilium Device v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy Backend");
    }

    #[test]
    fn test_device_creation() {
        let device = GraphicsDevice::new(
            std::sync::Arc::new(DummyBackend::new()),
            DeviceConfig::default(),
        );
        assert_eq!(device.state(), DeviceState::Uninitialized);
        assert!(device.registry().is_empty());
    }
}
