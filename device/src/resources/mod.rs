//! GPU resources.
//!
//! Every resource a [`GraphicsDevice`] hands out lives in its
//! [`ResourceRegistry`] as one variant of [`Resource`]:
//! - [`Buffer`] - static or dynamic vertex/index buffer
//! - [`Texture`] - 2D texture with an optional CPU shadow copy
//! - [`StateObject`] - compiled pipeline state, owned by the state cache
//! - [`Fence`] - GPU progress marker
//! - [`Query`] - occlusion query
//! - [`VolatileBuffer`] - per-shape pool for per-frame geometry
//!
//! All of them follow the same two-phase lifecycle through [`GpuResource`]:
//! [`invalidate`](GpuResource::invalidate) releases the native object and
//! [`rebuild`](GpuResource::rebuild) recreates it from retained metadata.
//! Both are idempotent, so a device can broadcast them without tracking
//! which resources already went through a transition.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice

mod buffer;
mod fence;
mod query;
mod registry;
mod state_object;
mod texture;
mod volatile;

pub use buffer::Buffer;
pub use fence::{Fence, FenceStatus};
pub use query::{Query, QueryStatus};
pub use registry::{DeviceId, Iter, ResourceHandle, ResourceRegistry};
pub use state_object::StateObject;
pub use texture::Texture;
pub use volatile::{VolatileAllocation, VolatileBuffer, VolatileLock, VolatileStats};

use crate::backend::{GpuBackend, GpuBuffer};
use crate::error::GraphicsError;

/// Discriminant of a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// [`Buffer`]
    Buffer,
    /// [`Texture`]
    Texture,
    /// [`StateObject`]
    StateObject,
    /// [`Fence`]
    Fence,
    /// [`Query`]
    Query,
    /// [`VolatileBuffer`]
    VolatileBuffer,
}

/// Bookkeeping shared by every resource kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceHeader {
    owner: Option<DeviceId>,
    flagged: bool,
}

impl ResourceHeader {
    /// The device this resource is registered with, once registered.
    pub fn owner(&self) -> Option<DeviceId> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: DeviceId) {
        self.owner = Some(owner);
    }

    /// Caller-defined marker bit, used by leak sweeps.
    pub fn is_flagged(&self) -> bool {
        self.flagged
    }

    /// Set the marker bit.
    pub fn set_flagged(&mut self, flagged: bool) {
        self.flagged = flagged;
    }
}

/// Lifecycle contract shared by all device resources.
pub trait GpuResource {
    /// Resource kind.
    fn kind(&self) -> ResourceKind;

    /// Shared bookkeeping.
    fn header(&self) -> &ResourceHeader;

    /// Shared bookkeeping, mutably.
    fn header_mut(&mut self) -> &mut ResourceHeader;

    /// Debug label, if any.
    fn label(&self) -> Option<&str> {
        None
    }

    /// Whether the native object currently exists.
    fn is_valid(&self) -> bool;

    /// Release the native object, keeping everything needed to rebuild it.
    ///
    /// Calling it on an already invalid resource does nothing.
    fn invalidate(&mut self, backend: &dyn GpuBackend);

    /// Recreate the native object from retained metadata.
    ///
    /// Calling it on a valid resource does nothing. On failure the resource
    /// stays invalid.
    fn rebuild(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError>;
}

/// A registered resource of any kind.
#[derive(Debug)]
pub enum Resource {
    /// Static or dynamic buffer.
    Buffer(Buffer),
    /// Texture.
    Texture(Texture),
    /// Compiled state object.
    StateObject(StateObject),
    /// Fence.
    Fence(Fence),
    /// Occlusion query.
    Query(Query),
    /// Volatile geometry pool.
    VolatileBuffer(VolatileBuffer),
}

macro_rules! dispatch {
    ($self:expr, $res:ident => $body:expr) => {
        match $self {
            Resource::Buffer($res) => $body,
            Resource::Texture($res) => $body,
            Resource::StateObject($res) => $body,
            Resource::Fence($res) => $body,
            Resource::Query($res) => $body,
            Resource::VolatileBuffer($res) => $body,
        }
    };
}

impl GpuResource for Resource {
    fn kind(&self) -> ResourceKind {
        dispatch!(self, r => r.kind())
    }

    fn header(&self) -> &ResourceHeader {
        dispatch!(self, r => r.header())
    }

    fn header_mut(&mut self) -> &mut ResourceHeader {
        dispatch!(self, r => r.header_mut())
    }

    fn label(&self) -> Option<&str> {
        dispatch!(self, r => r.label())
    }

    fn is_valid(&self) -> bool {
        dispatch!(self, r => r.is_valid())
    }

    fn invalidate(&mut self, backend: &dyn GpuBackend) {
        dispatch!(self, r => r.invalidate(backend))
    }

    fn rebuild(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        dispatch!(self, r => r.rebuild(backend))
    }
}

macro_rules! accessors {
    ($variant:ident, $ty:ty, $as_ref:ident, $as_mut:ident) => {
        impl Resource {
            #[doc = concat!("Borrow as a [`", stringify!($ty), "`], if it is one.")]
            pub fn $as_ref(&self) -> Option<&$ty> {
                match self {
                    Resource::$variant(r) => Some(r),
                    _ => None,
                }
            }

            #[doc = concat!("Mutably borrow as a [`", stringify!($ty), "`], if it is one.")]
            pub fn $as_mut(&mut self) -> Option<&mut $ty> {
                match self {
                    Resource::$variant(r) => Some(r),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Resource {
            fn from(resource: $ty) -> Self {
                Resource::$variant(resource)
            }
        }
    };
}

accessors!(Buffer, Buffer, as_buffer, as_buffer_mut);
accessors!(Texture, Texture, as_texture, as_texture_mut);
accessors!(StateObject, StateObject, as_state_object, as_state_object_mut);
accessors!(Fence, Fence, as_fence, as_fence_mut);
accessors!(Query, Query, as_query, as_query_mut);
accessors!(VolatileBuffer, VolatileBuffer, as_volatile, as_volatile_mut);

impl Resource {
    /// The native buffer that should be bound for this resource, if it is a
    /// valid buffer or volatile pool.
    pub(crate) fn native_buffer(&self) -> Option<&GpuBuffer> {
        match self {
            Resource::Buffer(buffer) => buffer.native(),
            Resource::VolatileBuffer(pool) => pool.native(),
            _ => None,
        }
    }
}
