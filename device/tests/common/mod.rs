//! Common utilities for device integration tests.
//!
//! Every test drives a [`GraphicsDevice`] on top of the [`DummyBackend`],
//! keeping a second `Arc` to the backend so it can inspect native objects,
//! lock records and lifecycle events.

use std::sync::Arc;

use redlilium_device::backend::NativeEvent;
use redlilium_device::{
    BufferShape, BufferType, DeviceConfig, DummyBackend, GraphicsDevice, ResourceHandle,
    VertexAttribute, VertexLayout,
};

/// Initialize logging for test output.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// A ready device and the backend under it.
pub struct TestContext {
    pub backend: Arc<DummyBackend>,
    pub device: GraphicsDevice,
}

impl TestContext {
    /// Initialized device with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DeviceConfig::default())
    }

    /// Initialized device with a custom configuration.
    pub fn with_config(config: DeviceConfig) -> Self {
        Self::with_backend(DummyBackend::new(), config)
    }

    /// Initialized device on a preconfigured backend.
    pub fn with_backend(backend: DummyBackend, config: DeviceConfig) -> Self {
        init_logging();
        let backend = Arc::new(backend);
        let mut device = GraphicsDevice::new(backend.clone(), config);
        device.init().expect("device init");
        Self { backend, device }
    }

    /// Lose and restore the context, returning the result of the restore.
    pub fn reset(&mut self) -> Result<(), redlilium_device::GraphicsError> {
        self.backend.lose_context();
        self.device.on_context_lost()?;
        self.backend.restore_context();
        self.device.on_context_restored()
    }

    /// Static index buffer holding `count` indices.
    pub fn static_indices(&mut self, count: u32) -> ResourceHandle {
        let data: Vec<u16> = (0..count as u16).collect();
        self.device
            .create_index_buffer(count, BufferType::Static, Some(bytemuck::cast_slice(&data)))
            .expect("index buffer")
    }

    /// Lock, fill and unlock `count` indices of the volatile index pool.
    pub fn push_indices(&mut self, count: u32) -> redlilium_device::VolatileAllocation {
        let alloc = self
            .device
            .acquire_volatile(&BufferShape::Index, count)
            .expect("volatile lock");
        let data = vec![0u16; count as usize];
        self.device
            .write_volatile(&BufferShape::Index, bytemuck::cast_slice(&data))
            .expect("volatile write");
        self.device
            .unlock_volatile(&BufferShape::Index)
            .expect("volatile unlock");
        alloc
    }
}

/// Position + packed color layout, 16 bytes per vertex.
pub fn colored_layout() -> VertexLayout {
    VertexLayout::new(16)
        .with_attribute(VertexAttribute::position(0))
        .with_attribute(VertexAttribute::color(12))
}

/// Native object ids in the order they were destroyed.
pub fn destroyed_ids(events: &[NativeEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|event| match event {
            NativeEvent::Destroyed(_, id) => Some(*id),
            NativeEvent::Created(..) => None,
        })
        .collect()
}

/// Native object ids in the order they were created.
pub fn created_ids(events: &[NativeEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|event| match event {
            NativeEvent::Created(_, id) => Some(*id),
            NativeEvent::Destroyed(..) => None,
        })
        .collect()
}
