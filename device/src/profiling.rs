//! Profiling support via Tracy.
//!
//! Enable the `profiling` feature to record device lifecycle spans (init,
//! reset, volatile locks) and per-frame plots of volatile pool discards:
//!
//! ```toml
//! [dependencies]
//! redlilium-device = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! When the feature is off every macro compiles to nothing.

#[cfg(feature = "profiling")]
pub use tracy_client::{self, Client, frame_mark as tracy_frame_mark, plot as tracy_plot, span};

/// Create a profiling span for the current scope.
///
/// ```ignore
/// fn rebuild_all(&mut self) {
///     profile_scope!("rebuild_all");
///     // ...
/// }
/// ```
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

/// Create a profiling span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Create a profiling span for the entire function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::span!();
    };
}

/// Create a profiling span for function (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Plot a value over time in Tracy.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        $crate::profiling::tracy_plot!($name, $value as f64)
    };
}

/// Plot a value (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        let _ = $value;
    };
}

/// Mark the end of a frame for Tracy's frame analysis.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        $crate::profiling::tracy_frame_mark()
    };
}

/// Mark the end of a frame (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

pub use crate::{frame_mark, profile_function, profile_plot, profile_scope};

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_expand() {
        profile_function!();
        profile_scope!("scope");
        profile_plot!("value", 3u32);
        frame_mark!();
    }
}
