//! Transient binding table.
//!
//! The device remembers which resource is bound to each vertex stream,
//! texture unit, the index slot and the state slot, and which of those slots
//! changed since they were last sent to the backend. After a context reset
//! every slot is dirty so the first draw re-issues the whole table.

use bitflags::bitflags;

use crate::resources::ResourceHandle;

/// Number of vertex streams.
pub const MAX_VERTEX_STREAMS: usize = 4;

/// Number of texture units.
pub const MAX_TEXTURE_UNITS: usize = 8;

bitflags! {
    /// Binding slots changed since the last commit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyState: u32 {
        /// At least one vertex stream.
        const VERTEX_STREAMS = 1 << 0;
        /// The index buffer.
        const INDEX_BUFFER = 1 << 1;
        /// At least one texture unit.
        const TEXTURES = 1 << 2;
        /// The state block.
        const STATE_BLOCK = 1 << 3;
    }
}

impl Default for DirtyState {
    fn default() -> Self {
        Self::empty()
    }
}

/// A vertex stream binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamBinding {
    /// Bound buffer or volatile pool.
    pub buffer: ResourceHandle,
    /// Byte offset of the first vertex.
    pub offset: u64,
}

/// What is bound to every slot, plus the dirty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingState {
    streams: [Option<StreamBinding>; MAX_VERTEX_STREAMS],
    index_buffer: Option<ResourceHandle>,
    textures: [Option<ResourceHandle>; MAX_TEXTURE_UNITS],
    state_block: Option<ResourceHandle>,
    dirty: DirtyState,
}

impl BindingState {
    /// Empty table, nothing dirty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binding of a vertex stream.
    pub fn stream(&self, stream: usize) -> Option<StreamBinding> {
        self.streams.get(stream).copied().flatten()
    }

    /// Bound index buffer.
    pub fn index_buffer(&self) -> Option<ResourceHandle> {
        self.index_buffer
    }

    /// Texture bound to a unit.
    pub fn texture(&self, unit: usize) -> Option<ResourceHandle> {
        self.textures.get(unit).copied().flatten()
    }

    /// Bound state block.
    pub fn state_block(&self) -> Option<ResourceHandle> {
        self.state_block
    }

    /// Slots changed since the last commit.
    pub fn dirty(&self) -> DirtyState {
        self.dirty
    }

    /// Returns true if no slot is bound.
    pub fn is_empty(&self) -> bool {
        self.streams.iter().all(Option::is_none)
            && self.index_buffer.is_none()
            && self.textures.iter().all(Option::is_none)
            && self.state_block.is_none()
    }

    /// # Panics
    ///
    /// Panics if `stream >= MAX_VERTEX_STREAMS`.
    pub(crate) fn set_stream(&mut self, stream: usize, binding: Option<StreamBinding>) {
        assert!(
            stream < MAX_VERTEX_STREAMS,
            "vertex stream {stream} out of range (max {MAX_VERTEX_STREAMS})"
        );
        if self.streams[stream] != binding {
            self.streams[stream] = binding;
            self.dirty |= DirtyState::VERTEX_STREAMS;
        }
    }

    pub(crate) fn set_index_buffer(&mut self, buffer: Option<ResourceHandle>) {
        if self.index_buffer != buffer {
            self.index_buffer = buffer;
            self.dirty |= DirtyState::INDEX_BUFFER;
        }
    }

    /// # Panics
    ///
    /// Panics if `unit >= MAX_TEXTURE_UNITS`.
    pub(crate) fn set_texture(&mut self, unit: usize, texture: Option<ResourceHandle>) {
        assert!(
            unit < MAX_TEXTURE_UNITS,
            "texture unit {unit} out of range (max {MAX_TEXTURE_UNITS})"
        );
        if self.textures[unit] != texture {
            self.textures[unit] = texture;
            self.dirty |= DirtyState::TEXTURES;
        }
    }

    pub(crate) fn set_state_block(&mut self, state: Option<ResourceHandle>) {
        if self.state_block != state {
            self.state_block = state;
            self.dirty |= DirtyState::STATE_BLOCK;
        }
    }

    /// Drop every binding. The dirty set is left empty: the backend is told
    /// to unbind directly.
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    /// Drop every binding of a resource that is going away.
    pub(crate) fn forget(&mut self, handle: ResourceHandle) {
        for stream in 0..MAX_VERTEX_STREAMS {
            if self.streams[stream].is_some_and(|s| s.buffer == handle) {
                self.set_stream(stream, None);
            }
        }
        if self.index_buffer == Some(handle) {
            self.set_index_buffer(None);
        }
        for unit in 0..MAX_TEXTURE_UNITS {
            if self.textures[unit] == Some(handle) {
                self.set_texture(unit, None);
            }
        }
        if self.state_block == Some(handle) {
            self.set_state_block(None);
        }
    }

    pub(crate) fn mark_all_dirty(&mut self) {
        self.dirty = DirtyState::all();
    }

    pub(crate) fn take_dirty(&mut self) -> DirtyState {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn streams(&self) -> impl Iterator<Item = (usize, Option<StreamBinding>)> + '_ {
        self.streams.iter().copied().enumerate()
    }

    pub(crate) fn textures(&self) -> impl Iterator<Item = (usize, Option<ResourceHandle>)> + '_ {
        self.textures.iter().copied().enumerate()
    }
}
