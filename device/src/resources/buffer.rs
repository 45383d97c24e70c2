//! Static and dynamic GPU buffers.

use crate::backend::{GpuBackend, GpuBuffer};
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, BufferShape, BufferType};

use super::{GpuResource, ResourceHeader, ResourceKind};

/// A vertex or index buffer owned by the front end.
///
/// Static buffers keep a CPU shadow of their contents and re-upload it when
/// rebuilt, so they survive a context loss transparently. Dynamic buffers
/// come back zero-filled; their owner rewrites them on the next update.
///
/// # Example
///
/// ```ignore
/// let quad = device.create_vertex_buffer(4, &layout, BufferType::Static, Some(bytes))?;
/// device.set_vertex_buffer(0, Some(quad), 0);
/// ```
pub struct Buffer {
    header: ResourceHeader,
    descriptor: BufferDescriptor,
    shape: BufferShape,
    native: Option<GpuBuffer>,
    shadow: Option<Vec<u8>>,
}

impl Buffer {
    /// Create the native buffer and upload the initial contents (called by GraphicsDevice).
    pub(crate) fn create(
        backend: &dyn GpuBackend,
        descriptor: BufferDescriptor,
        shape: BufferShape,
        initial_data: Option<&[u8]>,
    ) -> Result<Self, GraphicsError> {
        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }
        if descriptor.buffer_type == BufferType::Volatile {
            return Err(GraphicsError::InvalidParameter(
                "volatile geometry is served by the device's volatile pools".to_string(),
            ));
        }
        if let Some(data) = initial_data
            && data.len() as u64 > descriptor.size
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "initial data of {} bytes exceeds buffer size {}",
                data.len(),
                descriptor.size
            )));
        }

        let shadow = match descriptor.buffer_type {
            BufferType::Static => {
                let mut shadow = vec![0u8; descriptor.size as usize];
                if let Some(data) = initial_data {
                    shadow[..data.len()].copy_from_slice(data);
                }
                Some(shadow)
            }
            _ => None,
        };

        let mut buffer = Self {
            header: ResourceHeader::default(),
            descriptor,
            shape,
            native: None,
            shadow,
        };
        buffer.rebuild(backend)?;
        if buffer.shadow.is_none()
            && let (Some(native), Some(data)) = (&buffer.native, initial_data)
        {
            backend.write_buffer(native, 0, data)?;
        }
        Ok(buffer)
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Element shape of the buffer.
    pub fn shape(&self) -> &BufferShape {
        &self.shape
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Number of whole elements the buffer holds.
    pub fn element_count(&self) -> u64 {
        self.descriptor.size / self.shape.element_size()
    }

    /// Update frequency.
    pub fn buffer_type(&self) -> BufferType {
        self.descriptor.buffer_type
    }

    /// CPU copy of the contents, kept for static buffers.
    pub fn shadow(&self) -> Option<&[u8]> {
        self.shadow.as_deref()
    }

    pub(crate) fn native(&self) -> Option<&GpuBuffer> {
        self.native.as_ref()
    }

    /// Overwrite a byte range of the buffer.
    pub(crate) fn update(
        &mut self,
        backend: &dyn GpuBackend,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let Some(end) = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= self.descriptor.size)
        else {
            return Err(GraphicsError::InvalidParameter(format!(
                "update of {} bytes at {offset} overflows buffer of {} bytes",
                data.len(),
                self.descriptor.size
            )));
        };
        let native = self.native.as_ref().ok_or(GraphicsError::DeviceLost)?;
        backend.write_buffer(native, offset, data)?;
        if let Some(shadow) = &mut self.shadow {
            shadow[offset as usize..end as usize].copy_from_slice(data);
        }
        Ok(())
    }
}

impl GpuResource for Buffer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Buffer
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
            backend.destroy_buffer(native);
        }
    }

    fn rebuild(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        if self.native.is_some() {
            return Ok(());
        }
        let native = backend.create_buffer(&self.descriptor)?;
        if let Some(shadow) = &self.shadow
            && let Err(err) = backend.write_buffer(&native, 0, shadow)
        {
            backend.destroy_buffer(native);
            return Err(err);
        }
        self.native = Some(native);
        Ok(())
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.descriptor.size)
            .field("type", &self.descriptor.buffer_type)
            .field("label", &self.descriptor.label)
            .field("valid", &self.native.is_some())
            .finish()
    }
}

static_assertions::assert_impl_all!(Buffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, NativeKind};
    use crate::config::SurfaceConfig;
    use crate::types::BufferUsage;

    fn backend() -> DummyBackend {
        let backend = DummyBackend::new();
        backend.create_context(&SurfaceConfig::default()).unwrap();
        backend
    }

    fn static_desc(size: u64) -> BufferDescriptor {
        BufferDescriptor::new(size, BufferUsage::INDEX).with_label("indices")
    }

    #[test]
    fn test_static_buffer_keeps_shadow() {
        let backend = backend();
        let buffer =
            Buffer::create(&backend, static_desc(8), BufferShape::Index, Some(&[1, 2, 3, 4])).unwrap();
        assert_eq!(buffer.shadow(), Some(&[1, 2, 3, 4, 0, 0, 0, 0][..]));
        assert_eq!(buffer.element_count(), 4);
        assert!(buffer.is_valid());
    }

    #[test]
    fn test_invalidate_and_rebuild_are_idempotent() {
        let backend = backend();
        let mut buffer = Buffer::create(&backend, static_desc(8), BufferShape::Index, None).unwrap();

        buffer.invalidate(&backend);
        buffer.invalidate(&backend);
        assert!(!buffer.is_valid());
        assert_eq!(backend.live_count(NativeKind::Buffer), 0);
        assert_eq!(backend.stats().double_destroys, 0);

        buffer.rebuild(&backend).unwrap();
        buffer.rebuild(&backend).unwrap();
        assert!(buffer.is_valid());
        assert_eq!(backend.live_count(NativeKind::Buffer), 1);
        assert_eq!(backend.stats().buffers_created, 2);
    }

    #[test]
    fn test_static_rebuild_reuploads_shadow() {
        let backend = backend();
        let mut buffer = Buffer::create(&backend, static_desc(8), BufferShape::Index, None).unwrap();
        buffer.update(&backend, 2, &[9, 9]).unwrap();
        let written = backend.stats().bytes_written;

        buffer.invalidate(&backend);
        buffer.rebuild(&backend).unwrap();
        assert_eq!(backend.stats().bytes_written, written + 8);
        assert_eq!(buffer.shadow().unwrap()[2..4], [9, 9]);
    }

    #[test]
    fn test_dynamic_buffer_has_no_shadow() {
        let backend = backend();
        let desc = static_desc(8).with_type(BufferType::Dynamic);
        let buffer = Buffer::create(&backend, desc, BufferShape::Index, Some(&[1, 2])).unwrap();
        assert!(buffer.shadow().is_none());
        assert_eq!(backend.stats().bytes_written, 2);
    }

    #[test]
    fn test_rejects_bad_descriptors() {
        let backend = backend();
        assert!(Buffer::create(&backend, static_desc(0), BufferShape::Index, None).is_err());
        assert!(
            Buffer::create(
                &backend,
                static_desc(8).with_type(BufferType::Volatile),
                BufferShape::Index,
                None
            )
            .is_err()
        );
        assert!(Buffer::create(&backend, static_desc(2), BufferShape::Index, Some(&[0; 4])).is_err());
    }

    #[test]
    fn test_update_on_invalid_buffer_fails() {
        let backend = backend();
        let mut buffer = Buffer::create(&backend, static_desc(8), BufferShape::Index, None).unwrap();
        buffer.invalidate(&backend);
        assert_eq!(buffer.update(&backend, 0, &[1]), Err(GraphicsError::DeviceLost));
    }

    #[test]
    fn test_update_offset_overflow_rejected() {
        let backend = backend();
        let mut buffer = Buffer::create(&backend, static_desc(8), BufferShape::Index, None).unwrap();
        let written = backend.stats().bytes_written;

        assert!(matches!(
            buffer.update(&backend, u64::MAX, &[1, 2]),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert!(matches!(
            buffer.update(&backend, 7, &[1, 2]),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert_eq!(backend.stats().bytes_written, written);
        assert_eq!(buffer.shadow(), Some(&[0u8; 8][..]));
    }
}
