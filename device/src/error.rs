//! Graphics error types.

use std::fmt;

/// Errors that can occur in the graphics device.
///
/// Programming errors in the lock/register discipline are not represented here;
/// those panic at the call site. Expected transient states (a pending fence, a
/// lost context) are status values, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the native context.
    InitializationFailed(String),
    /// Failed to create a resource.
    ResourceCreationFailed(String),
    /// Out of GPU memory.
    OutOfMemory,
    /// The GPU device was lost.
    DeviceLost,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// The handle does not refer to a live resource of the expected kind.
    InvalidHandle(String),
    /// The operation is not allowed in the current device state.
    InvalidState(String),
    /// An internal error occurred.
    Internal(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::InvalidHandle(msg) => write!(f, "invalid handle: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid device state: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}
