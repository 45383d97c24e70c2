//! GPU fences.

use crate::backend::{GpuBackend, GpuFence};
use crate::error::GraphicsError;

use super::{GpuResource, ResourceHeader, ResourceKind};

/// Progress of a fence as seen by the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenceStatus {
    /// Never issued, or not issued since the last rebuild.
    Unset,
    /// Issued; the GPU has not reached it yet.
    Pending,
    /// The GPU has passed the fence.
    Processed,
    /// The native fence is gone (context lost).
    Invalidated,
}

/// A marker inserted into the command stream to track GPU progress.
///
/// A fence issued before a context loss is never reported as processed:
/// after the rebuild it reads [`FenceStatus::Unset`] until it is issued again.
#[derive(Debug)]
pub struct Fence {
    header: ResourceHeader,
    native: Option<GpuFence>,
    issued: bool,
}

impl Fence {
    pub(crate) fn create(backend: &dyn GpuBackend) -> Result<Self, GraphicsError> {
        Ok(Self {
            header: ResourceHeader::default(),
            native: Some(backend.create_fence()?),
            issued: false,
        })
    }

    /// A fence with no native object, for exercising containers.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            header: ResourceHeader::default(),
            native: None,
            issued: false,
        }
    }

    /// Insert the fence into the command stream.
    pub(crate) fn issue(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        let native = self.native.as_ref().ok_or(GraphicsError::DeviceLost)?;
        backend.issue_fence(native);
        self.issued = true;
        Ok(())
    }

    /// Poll the fence, or wait for it when `block` is set.
    pub(crate) fn status(&self, backend: &dyn GpuBackend, block: bool) -> FenceStatus {
        let Some(native) = &self.native else {
            return FenceStatus::Invalidated;
        };
        if !self.issued {
            return FenceStatus::Unset;
        }
        if backend.is_fence_signaled(native) {
            return FenceStatus::Processed;
        }
        if block {
            backend.wait_fence(native);
            return FenceStatus::Processed;
        }
        FenceStatus::Pending
    }
}

impl GpuResource for Fence {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Fence
    }

    fn header(&self) -> &ResourceHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ResourceHeader {
        &mut self.header
    }

    fn is_valid(&self) -> bool {
        self.native.is_some()
    }

    fn invalidate(&mut self, backend: &dyn GpuBackend) {
        if let Some(native) = self.native.take() {
            backend.destroy_fence(native);
        }
        self.issued = false;
    }

    fn rebuild(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        if self.native.is_none() {
            self.native = Some(backend.create_fence()?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::config::SurfaceConfig;

    fn backend() -> DummyBackend {
        let backend = DummyBackend::new();
        backend.create_context(&SurfaceConfig::default()).unwrap();
        backend.set_auto_signal(false);
        backend
    }

    #[test]
    fn test_fence_transitions() {
        let backend = backend();
        let mut fence = Fence::create(&backend).unwrap();
        assert_eq!(fence.status(&backend, false), FenceStatus::Unset);

        fence.issue(&backend).unwrap();
        assert_eq!(fence.status(&backend, false), FenceStatus::Pending);
        assert_eq!(fence.status(&backend, true), FenceStatus::Processed);
        assert_eq!(fence.status(&backend, false), FenceStatus::Processed);
    }

    #[test]
    fn test_fence_across_reset() {
        let backend = backend();
        let mut fence = Fence::create(&backend).unwrap();
        fence.issue(&backend).unwrap();

        fence.invalidate(&backend);
        assert_eq!(fence.status(&backend, true), FenceStatus::Invalidated);
        assert_eq!(fence.issue(&backend), Err(GraphicsError::DeviceLost));

        fence.rebuild(&backend).unwrap();
        assert_eq!(fence.status(&backend, false), FenceStatus::Unset);
    }
}
