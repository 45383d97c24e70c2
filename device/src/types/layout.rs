//! Vertex layouts and volatile buffer shapes.
//!
//! A [`VertexLayout`] describes one interleaved vertex stream. Volatile pools
//! are keyed by [`BufferShape`], so two draws share a ring buffer only when
//! their layouts match exactly (stride and every attribute).
//!
//! # Example
//!
//! ```
//! use redlilium_device::{BufferShape, VertexAttribute, VertexLayout};
//!
//! let layout = VertexLayout::new(20)
//!     .with_attribute(VertexAttribute::position(0))
//!     .with_attribute(VertexAttribute::texcoord0(12));
//! let shape = BufferShape::vertex(layout);
//! assert_eq!(shape.element_size(), 20);
//! ```

use super::buffer::INDEX_SIZE;

/// Semantic meaning of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeSemantic {
    /// Vertex position.
    Position,
    /// Vertex normal.
    Normal,
    /// Texture coordinates set 0.
    TexCoord0,
    /// Texture coordinates set 1.
    TexCoord1,
    /// Vertex color.
    Color,
}

/// Format of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeFormat {
    /// Two 32-bit floats.
    Float2,
    /// Three 32-bit floats.
    Float3,
    /// Four 32-bit floats.
    Float4,
    /// Four 8-bit unsigned integers (normalized to 0.0-1.0).
    Unorm8x4,
}

impl VertexAttributeFormat {
    /// Get the size in bytes of this format.
    pub fn size(&self) -> u32 {
        match self {
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
            Self::Unorm8x4 => 4,
        }
    }
}

/// A single vertex attribute description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Semantic meaning of this attribute.
    pub semantic: VertexAttributeSemantic,
    /// Data format of this attribute.
    pub format: VertexAttributeFormat,
    /// Byte offset within the vertex.
    pub offset: u32,
}

impl VertexAttribute {
    /// Create a new vertex attribute.
    pub fn new(semantic: VertexAttributeSemantic, format: VertexAttributeFormat, offset: u32) -> Self {
        Self {
            semantic,
            format,
            offset,
        }
    }

    /// Create a position attribute (float3).
    pub fn position(offset: u32) -> Self {
        Self::new(
            VertexAttributeSemantic::Position,
            VertexAttributeFormat::Float3,
            offset,
        )
    }

    /// Create a normal attribute (float3).
    pub fn normal(offset: u32) -> Self {
        Self::new(
            VertexAttributeSemantic::Normal,
            VertexAttributeFormat::Float3,
            offset,
        )
    }

    /// Create a texcoord0 attribute (float2).
    pub fn texcoord0(offset: u32) -> Self {
        Self::new(
            VertexAttributeSemantic::TexCoord0,
            VertexAttributeFormat::Float2,
            offset,
        )
    }

    /// Create a packed color attribute (unorm8x4).
    pub fn color(offset: u32) -> Self {
        Self::new(
            VertexAttributeSemantic::Color,
            VertexAttributeFormat::Unorm8x4,
            offset,
        )
    }

    /// One past the last byte this attribute occupies.
    pub fn end(&self) -> u32 {
        self.offset + self.format.size()
    }
}

/// Layout of a single interleaved vertex stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Stride in bytes between consecutive vertices.
    pub stride: u32,
    /// The vertex attributes.
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Create an empty layout with the given stride.
    pub fn new(stride: u32) -> Self {
        Self {
            stride,
            attributes: Vec::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, attribute: VertexAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Check that every attribute fits inside the stride.
    pub fn is_valid(&self) -> bool {
        self.stride > 0 && self.attributes.iter().all(|a| a.end() <= self.stride)
    }
}

/// The key a volatile pool is looked up by.
///
/// All index data shares one shape; vertex data gets one shape per distinct
/// layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BufferShape {
    /// 16-bit index data.
    Index,
    /// Vertex data with the given layout.
    Vertex(VertexLayout),
}

impl BufferShape {
    /// Shape for vertex data with the given layout.
    pub fn vertex(layout: VertexLayout) -> Self {
        Self::Vertex(layout)
    }

    /// Size in bytes of one element of this shape.
    pub fn element_size(&self) -> u64 {
        match self {
            Self::Index => INDEX_SIZE,
            Self::Vertex(layout) => u64::from(layout.stride),
        }
    }

    /// Returns true for the index shape.
    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_validation() {
        let layout = VertexLayout::new(20)
            .with_attribute(VertexAttribute::position(0))
            .with_attribute(VertexAttribute::texcoord0(12));
        assert!(layout.is_valid());

        let overflow = VertexLayout::new(16).with_attribute(VertexAttribute::normal(8));
        assert!(!overflow.is_valid());

        assert!(!VertexLayout::new(0).is_valid());
    }

    #[test]
    fn test_shape_equality_is_exact() {
        let a = BufferShape::vertex(VertexLayout::new(16).with_attribute(VertexAttribute::position(0)));
        let b = BufferShape::vertex(VertexLayout::new(16).with_attribute(VertexAttribute::position(0)));
        let c = BufferShape::vertex(VertexLayout::new(16).with_attribute(VertexAttribute::normal(0)));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, BufferShape::Index);
    }

    #[test]
    fn test_element_size() {
        assert_eq!(BufferShape::Index.element_size(), 2);
        assert_eq!(BufferShape::vertex(VertexLayout::new(24)).element_size(), 24);
    }
}
