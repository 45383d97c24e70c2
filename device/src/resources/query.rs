//! Occlusion queries.

use crate::backend::{GpuBackend, GpuQuery};
use crate::error::GraphicsError;

use super::{GpuResource, ResourceHeader, ResourceKind};

/// Result of an occlusion query as seen by the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    /// Never ended, or not ended since the last rebuild.
    Unset,
    /// Ended; the GPU has not produced the result yet.
    Waiting,
    /// Number of samples that passed.
    Ready(u64),
    /// The native query is gone (context lost).
    Invalidated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Active,
    Ended,
}

/// An occlusion query counting the samples drawn between begin and end.
#[derive(Debug)]
pub struct Query {
    header: ResourceHeader,
    native: Option<GpuQuery>,
    phase: Phase,
}

impl Query {
    pub(crate) fn create(backend: &dyn GpuBackend) -> Result<Self, GraphicsError> {
        Ok(Self {
            header: ResourceHeader::default(),
            native: Some(backend.create_query()?),
            phase: Phase::Idle,
        })
    }

    /// Whether the query is between begin and end.
    pub fn is_active(&self) -> bool {
        self.phase == Phase::Active
    }

    pub(crate) fn begin(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        let native = self.native.as_ref().ok_or(GraphicsError::DeviceLost)?;
        if self.phase == Phase::Active {
            return Err(GraphicsError::InvalidState(
                "query is already active".to_string(),
            ));
        }
        backend.begin_query(native);
        self.phase = Phase::Active;
        Ok(())
    }

    pub(crate) fn end(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        let native = self.native.as_ref().ok_or(GraphicsError::DeviceLost)?;
        if self.phase != Phase::Active {
            return Err(GraphicsError::InvalidState(
                "query was not begun".to_string(),
            ));
        }
        backend.end_query(native);
        self.phase = Phase::Ended;
        Ok(())
    }

    pub(crate) fn status(&self, backend: &dyn GpuBackend, block: bool) -> QueryStatus {
        let Some(native) = &self.native else {
            return QueryStatus::Invalidated;
        };
        if self.phase != Phase::Ended {
            return QueryStatus::Unset;
        }
        match backend.query_result(native, block) {
            Some(samples) => QueryStatus::Ready(samples),
            None => QueryStatus::Waiting,
        }
    }
}

impl GpuResource for Query {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Query
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
            backend.destroy_query(native);
        }
        self.phase = Phase::Idle;
    }

    fn rebuild(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        if self.native.is_none() {
            self.native = Some(backend.create_query()?);
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
        backend
    }

    #[test]
    fn test_query_transitions() {
        let backend = backend();
        backend.set_auto_signal(false);
        backend.set_query_samples(128);
        let mut query = Query::create(&backend).unwrap();
        assert_eq!(query.status(&backend, false), QueryStatus::Unset);

        query.begin(&backend).unwrap();
        assert!(query.is_active());
        assert!(query.begin(&backend).is_err());
        query.end(&backend).unwrap();
        assert_eq!(query.status(&backend, false), QueryStatus::Waiting);
        assert_eq!(query.status(&backend, true), QueryStatus::Ready(128));
    }

    #[test]
    fn test_end_without_begin() {
        let backend = backend();
        let mut query = Query::create(&backend).unwrap();
        assert!(matches!(
            query.end(&backend),
            Err(GraphicsError::InvalidState(_))
        ));
    }

    #[test]
    fn test_query_across_reset() {
        let backend = backend();
        let mut query = Query::create(&backend).unwrap();
        query.begin(&backend).unwrap();
        query.end(&backend).unwrap();

        query.invalidate(&backend);
        assert_eq!(query.status(&backend, true), QueryStatus::Invalidated);
        query.rebuild(&backend).unwrap();
        assert_eq!(query.status(&backend, true), QueryStatus::Unset);
    }
}
