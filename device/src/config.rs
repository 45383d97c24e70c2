//! Device configuration.
//!
//! The knobs here are consumed once, when the device is created. They size
//! the volatile pools, choose how many frames of volatile data are kept in
//! flight, describe the swap-chain surfaces and decide what happens to the
//! state block cache when the context comes back.

/// Swap-chain surface configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceConfig {
    /// Back buffer width in pixels.
    pub width: u32,
    /// Back buffer height in pixels.
    pub height: u32,
    /// Exclusive fullscreen.
    pub fullscreen: bool,
    /// Create a depth-stencil surface alongside the back buffer.
    pub depth_stencil: bool,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fullscreen: false,
            depth_stencil: true,
        }
    }
}

impl SurfaceConfig {
    /// Create a windowed surface configuration with a depth-stencil surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }
}

/// What to do with cached state objects when the context is restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StateCachePolicy {
    /// Ask the backend whether its state objects survive a context loss.
    #[default]
    Auto,
    /// Keep every entry; the state objects rebuild from their descriptors.
    Retain,
    /// Drop every entry before resources are rebuilt.
    Flush,
}

/// Configuration for a [`GraphicsDevice`](crate::GraphicsDevice).
///
/// # Example
///
/// ```
/// use redlilium_device::{DeviceConfig, StateCachePolicy};
///
/// let config = DeviceConfig::default()
///     .with_max_dynamic_vertices(4096)
///     .with_buffered_frames(2)
///     .with_state_cache_policy(StateCachePolicy::Flush);
/// assert_eq!(config.buffered_frames, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceConfig {
    /// Debug label for the device.
    pub label: Option<String>,
    /// Capacity, in vertices, of every volatile vertex pool.
    pub max_dynamic_vertices: u32,
    /// Capacity, in indices, of the volatile index pool.
    pub max_dynamic_indices: u32,
    /// Backing buffers per volatile pool (1 = single ring, 2/3 = rotate per frame).
    pub buffered_frames: u32,
    /// Swap-chain surfaces.
    pub surface: SurfaceConfig,
    /// State cache handling on context restore.
    pub state_cache_policy: StateCachePolicy,
}

impl DeviceConfig {
    /// Default vertex capacity of a volatile pool.
    pub const DEFAULT_MAX_DYNAMIC_VERTICES: u32 = 8192;
    /// Default index capacity of the volatile index pool.
    pub const DEFAULT_MAX_DYNAMIC_INDICES: u32 = 16384;
    /// Upper bound for [`buffered_frames`](Self::buffered_frames).
    pub const MAX_BUFFERED_FRAMES: u32 = 3;

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the volatile vertex pool capacity.
    pub fn with_max_dynamic_vertices(mut self, count: u32) -> Self {
        self.max_dynamic_vertices = count;
        self
    }

    /// Set the volatile index pool capacity.
    pub fn with_max_dynamic_indices(mut self, count: u32) -> Self {
        self.max_dynamic_indices = count;
        self
    }

    /// Set the number of buffered frames, clamped to `1..=MAX_BUFFERED_FRAMES`.
    pub fn with_buffered_frames(mut self, frames: u32) -> Self {
        self.buffered_frames = frames.clamp(1, Self::MAX_BUFFERED_FRAMES);
        self
    }

    /// Set the surface configuration.
    pub fn with_surface(mut self, surface: SurfaceConfig) -> Self {
        self.surface = surface;
        self
    }

    /// Set the state cache policy.
    pub fn with_state_cache_policy(mut self, policy: StateCachePolicy) -> Self {
        self.state_cache_policy = policy;
        self
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            label: None,
            max_dynamic_vertices: Self::DEFAULT_MAX_DYNAMIC_VERTICES,
            max_dynamic_indices: Self::DEFAULT_MAX_DYNAMIC_INDICES,
            buffered_frames: 1,
            surface: SurfaceConfig::default(),
            state_cache_policy: StateCachePolicy::Auto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_frames_clamped() {
        assert_eq!(DeviceConfig::default().with_buffered_frames(0).buffered_frames, 1);
        assert_eq!(DeviceConfig::default().with_buffered_frames(8).buffered_frames, 3);
        assert_eq!(DeviceConfig::default().with_buffered_frames(2).buffered_frames, 2);
    }

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.max_dynamic_vertices, 8192);
        assert_eq!(config.max_dynamic_indices, 16384);
        assert_eq!(config.state_cache_policy, StateCachePolicy::Auto);
        assert!(config.surface.depth_stencil);
    }
}
