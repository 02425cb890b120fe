//! Logging shim: forwards to `tracing` when the feature is on, expands to nothing otherwise.
//!
//! Loaded with `#[macro_use]` ahead of the other modules. The warning macro is named
//! `warning!` since `warn` is taken by the built-in lint attribute.

#[cfg(feature = "tracing")]
macro_rules! debug {
    ($($t: tt)*) => { ::tracing::debug!($($t)*) };
}

#[cfg(feature = "tracing")]
macro_rules! info {
    ($($t: tt)*) => { ::tracing::info!($($t)*) };
}

#[cfg(feature = "tracing")]
macro_rules! warning {
    ($($t: tt)*) => { ::tracing::warn!($($t)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($t: tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! info {
    ($($t: tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! warning {
    ($($t: tt)*) => {};
}
