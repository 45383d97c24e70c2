//! Swap-chain surfaces owned directly by the device.
//!
//! The back buffer and its depth-stencil companion are not registered
//! resources: the device destroys them first when the context goes away and
//! recreates them first when it comes back, before any registered resource.

use crate::backend::{GpuBackend, GpuSurface, SurfaceKind};
use crate::config::SurfaceConfig;
use crate::error::GraphicsError;

/// The device's back buffer and optional depth-stencil surface.
#[derive(Debug)]
pub struct SurfaceSet {
    config: SurfaceConfig,
    back_buffer: Option<GpuSurface>,
    depth_stencil: Option<GpuSurface>,
}

impl SurfaceSet {
    /// Describe the surfaces without creating them.
    pub fn new(config: SurfaceConfig) -> Self {
        Self {
            config,
            back_buffer: None,
            depth_stencil: None,
        }
    }

    /// Current surface configuration.
    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    /// Size of the back buffer in pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Whether the back buffer exists.
    pub fn is_valid(&self) -> bool {
        self.back_buffer.is_some()
    }

    /// Whether a depth-stencil surface exists.
    pub fn has_depth_stencil(&self) -> bool {
        self.depth_stencil.is_some()
    }

    /// Change the configuration used by the next [`create`](Self::create).
    pub(crate) fn reconfigure(&mut self, config: SurfaceConfig) {
        self.config = config;
    }

    /// Create any missing surface.
    pub(crate) fn create(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        let SurfaceConfig {
            width,
            height,
            depth_stencil,
            ..
        } = self.config;
        if width == 0 || height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "surface size {width}x{height} is empty"
            )));
        }

        if self.back_buffer.is_none() {
            self.back_buffer = Some(backend.create_surface(SurfaceKind::BackBuffer, width, height)?);
        }
        if depth_stencil && self.depth_stencil.is_none() {
            match backend.create_surface(SurfaceKind::DepthStencil, width, height) {
                Ok(surface) => self.depth_stencil = Some(surface),
                Err(err) => {
                    self.release(backend);
                    return Err(err);
                }
            }
        }
        log::debug!("SurfaceSet: created {}x{} surfaces", width, height);
        Ok(())
    }

    /// Destroy both surfaces. Does nothing if they are already gone.
    pub(crate) fn release(&mut self, backend: &dyn GpuBackend) {
        if let Some(surface) = self.depth_stencil.take() {
            backend.destroy_surface(surface);
        }
        if let Some(surface) = self.back_buffer.take() {
            backend.destroy_surface(surface);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, NativeKind};

    #[test]
    fn test_create_and_release() {
        let backend = DummyBackend::new();
        backend.create_context(&SurfaceConfig::default()).unwrap();
        let mut surfaces = SurfaceSet::new(SurfaceConfig::new(640, 480));

        surfaces.create(&backend).unwrap();
        assert!(surfaces.is_valid());
        assert!(surfaces.has_depth_stencil());
        assert_eq!(backend.live_count(NativeKind::Surface), 2);

        surfaces.release(&backend);
        surfaces.release(&backend);
        assert!(!surfaces.is_valid());
        assert_eq!(backend.live_count(NativeKind::Surface), 0);
        assert_eq!(backend.stats().double_destroys, 0);
    }

    #[test]
    fn test_without_depth_stencil() {
        let backend = DummyBackend::new();
        backend.create_context(&SurfaceConfig::default()).unwrap();
        let config = SurfaceConfig {
            depth_stencil: false,
            ..SurfaceConfig::new(320, 200)
        };
        let mut surfaces = SurfaceSet::new(config);
        surfaces.create(&backend).unwrap();
        assert!(!surfaces.has_depth_stencil());
        assert_eq!(surfaces.size(), (320, 200));
    }

    #[test]
    fn test_create_while_lost_fails() {
        let backend = DummyBackend::new();
        backend.create_context(&SurfaceConfig::default()).unwrap();
        backend.lose_context();
        let mut surfaces = SurfaceSet::new(SurfaceConfig::default());
        assert_eq!(surfaces.create(&backend), Err(GraphicsError::DeviceLost));
        assert!(!surfaces.is_valid());
        assert_eq!(backend.live_count(NativeKind::Surface), 0);
    }

    #[test]
    fn test_empty_size_rejected() {
        let backend = DummyBackend::new();
        backend.create_context(&SurfaceConfig::default()).unwrap();
        let mut surfaces = SurfaceSet::new(SurfaceConfig::new(0, 480));
        assert!(matches!(
            surfaces.create(&backend),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }
}
