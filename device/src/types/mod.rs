//! Common types and descriptors for device resources.
//!
//! This module contains usage flags, vertex layouts, and the descriptor structs
//! consumed by [`GraphicsDevice`](crate::GraphicsDevice) factory operations.

mod buffer;
mod layout;
mod state;
mod texture;

pub use buffer::{BufferDescriptor, BufferType, BufferUsage, INDEX_SIZE};
pub use layout::{
    BufferShape, VertexAttribute, VertexAttributeFormat, VertexAttributeSemantic, VertexLayout,
};
pub use state::{
    AddressMode, BlendFactor, BlendOp, BlendState, ColorWrites, CompareFunction, CullMode,
    DepthStencilState, FillMode, FilterMode, FrontFace, MAX_SAMPLER_STATES, RasterizerState,
    SamplerState, StateBlockDesc, StencilOp,
};
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage};
