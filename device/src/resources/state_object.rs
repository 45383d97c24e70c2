//! Compiled pipeline state.

use crate::backend::{GpuBackend, GpuStateObject};
use crate::error::GraphicsError;
use crate::types::StateBlockDesc;

use super::{GpuResource, ResourceHeader, ResourceKind};

/// A native state object compiled from a [`StateBlockDesc`].
///
/// State objects are only created through the device's state block cache,
/// which holds the reference that keeps them alive.
#[derive(Debug)]
pub struct StateObject {
    header: ResourceHeader,
    desc: StateBlockDesc,
    hash: u64,
    native: Option<GpuStateObject>,
}

impl StateObject {
    pub(crate) fn create(
        backend: &dyn GpuBackend,
        desc: StateBlockDesc,
        hash: u64,
    ) -> Result<Self, GraphicsError> {
        let mut state = Self {
            header: ResourceHeader::default(),
            desc,
            hash,
            native: None,
        };
        state.rebuild(backend)?;
        Ok(state)
    }

    /// The descriptor this object was compiled from.
    pub fn desc(&self) -> &StateBlockDesc {
        &self.desc
    }

    /// Cache hash of the descriptor.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub(crate) fn native(&self) -> Option<&GpuStateObject> {
        self.native.as_ref()
    }
}

impl GpuResource for StateObject {
    fn kind(&self) -> ResourceKind {
        ResourceKind::StateObject
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
            backend.destroy_state_object(native);
        }
    }

    fn rebuild(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        if self.native.is_none() {
            self.native = Some(backend.create_state_object(&self.desc)?);
        }
        Ok(())
    }
}
