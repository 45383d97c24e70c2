//! GPU texture resource.

use crate::backend::{GpuBackend, GpuTexture};
use crate::error::GraphicsError;
use crate::types::{TextureDescriptor, TextureFormat};

use super::{GpuResource, ResourceHeader, ResourceKind};

/// A 2D texture.
///
/// Textures created with initial pixels keep them and upload them again
/// when rebuilt. Textures created empty (render targets) come back empty.
///
/// # Example
///
/// ```ignore
/// let texture = device.create_texture(
///     &TextureDescriptor::new_2d(256, 256, TextureFormat::Rgba8Unorm, TextureUsage::TEXTURE_BINDING),
///     Some(&pixels),
/// )?;
/// ```
pub struct Texture {
    header: ResourceHeader,
    descriptor: TextureDescriptor,
    native: Option<GpuTexture>,
    pixels: Option<Vec<u8>>,
}

impl Texture {
    /// Create the native texture (called by GraphicsDevice).
    pub(crate) fn create(
        backend: &dyn GpuBackend,
        descriptor: TextureDescriptor,
        pixels: Option<&[u8]>,
    ) -> Result<Self, GraphicsError> {
        if descriptor.width == 0 || descriptor.height == 0 || descriptor.mip_level_count == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture extent {}x{} with {} mips is empty",
                descriptor.width, descriptor.height, descriptor.mip_level_count
            )));
        }
        if let Some(pixels) = pixels
            && pixels.len() as u64 != descriptor.byte_size()
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "expected {} bytes of pixel data, got {}",
                descriptor.byte_size(),
                pixels.len()
            )));
        }

        let mut texture = Self {
            header: ResourceHeader::default(),
            descriptor,
            native: None,
            pixels: pixels.map(<[u8]>::to_vec),
        };
        texture.rebuild(backend)?;
        Ok(texture)
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Get the texture width.
    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    /// Get the texture height.
    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// Get the mip level count.
    pub fn mip_level_count(&self) -> u32 {
        self.descriptor.mip_level_count
    }

    pub(crate) fn native(&self) -> Option<&GpuTexture> {
        self.native.as_ref()
    }
}

impl GpuResource for Texture {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Texture
    }

    fn header(&self) -> &ResourceHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ResourceHeader {
        &mut self.header
    }

    fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    fn is_valid(&self) -> bool {
        self.native.is_some()
    }

    fn invalidate(&mut self, backend: &dyn GpuBackend) {
        if let Some(native) = self.native.take() {
            backend.destroy_texture(native);
        }
    }

    fn rebuild(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        if self.native.is_some() {
            return Ok(());
        }
        let native = backend.create_texture(&self.descriptor)?;
        if let Some(pixels) = &self.pixels
            && let Err(err) = backend.write_texture(&native, pixels)
        {
            backend.destroy_texture(native);
            return Err(err);
        }
        self.native = Some(native);
        Ok(())
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("width", &self.descriptor.width)
            .field("height", &self.descriptor.height)
            .field("format", &self.descriptor.format)
            .field("label", &self.descriptor.label)
            .field("valid", &self.native.is_some())
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::config::SurfaceConfig;
    use crate::types::TextureUsage;

    fn backend() -> DummyBackend {
        let backend = DummyBackend::new();
        backend.create_context(&SurfaceConfig::default()).unwrap();
        backend
    }

    fn desc() -> TextureDescriptor {
        TextureDescriptor::new_2d(2, 2, TextureFormat::R8Unorm, TextureUsage::TEXTURE_BINDING)
    }

    #[test]
    fn test_texture_reuploads_pixels() {
        let backend = backend();
        let mut texture = Texture::create(&backend, desc(), Some(&[1, 2, 3, 4])).unwrap();
        assert_eq!(backend.stats().bytes_written, 4);

        texture.invalidate(&backend);
        assert!(!texture.is_valid());
        texture.rebuild(&backend).unwrap();
        assert_eq!(backend.stats().bytes_written, 8);
    }

    #[test]
    fn test_render_target_rebuilds_empty() {
        let backend = backend();
        let mut texture = Texture::create(&backend, desc(), None).unwrap();
        texture.invalidate(&backend);
        texture.rebuild(&backend).unwrap();
        assert!(texture.is_valid());
        assert_eq!(backend.stats().bytes_written, 0);
    }

    #[test]
    fn test_pixel_size_mismatch() {
        let backend = backend();
        let result = Texture::create(&backend, desc(), Some(&[0; 3]));
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_texture_debug() {
        let backend = backend();
        let texture = Texture::create(&backend, desc().with_label("font"), None).unwrap();
        let debug = format!("{:?}", texture);
        assert!(debug.contains("Texture"));
        assert!(debug.contains("font"));
    }
}
