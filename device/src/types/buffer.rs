//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 2;
        /// Buffer is mappable for CPU write.
        const MAP_WRITE = 1 << 3;
        /// Buffer is written with discard / no-overwrite locks.
        const RING = 1 << 4;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// How often the contents of a buffer are expected to change.
///
/// The type decides what happens to a buffer across a context reset: static
/// buffers re-upload their shadow copy, dynamic buffers come back empty, and
/// volatile data is only ever served from the device's ring pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferType {
    /// Written once, drawn many times.
    #[default]
    Static,
    /// Rewritten every few frames by the owner.
    Dynamic,
    /// Written and consumed within a single draw or frame.
    Volatile,
}

/// Size in bytes of the indices served by the volatile index pool.
pub const INDEX_SIZE: u64 = 2;

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Update frequency.
    pub buffer_type: BufferType,
}

impl BufferDescriptor {
    /// Create a new static buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            buffer_type: BufferType::Static,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the update frequency.
    pub fn with_type(mut self, buffer_type: BufferType) -> Self {
        self.buffer_type = buffer_type;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let desc = BufferDescriptor::new(256, BufferUsage::VERTEX)
            .with_label("quad")
            .with_type(BufferType::Dynamic);
        assert_eq!(desc.size, 256);
        assert_eq!(desc.label.as_deref(), Some("quad"));
        assert_eq!(desc.buffer_type, BufferType::Dynamic);
    }
}
