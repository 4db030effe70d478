use std::fmt;

/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); terminate gracefully.
    Fatal,
}

/// Error reported by a [`Driver`](super::Driver) call.
///
/// Mirrors the classic GL error classes plus the surface and shader failures a
/// windowed backend can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverError {
    /// An argument is out of range for the call.
    InvalidValue(&'static str),
    /// The call is not allowed in the current binding state.
    InvalidOperation(&'static str),
    /// The driver could not allocate storage.
    OutOfMemory,
    /// Acquiring or presenting the surface failed.
    Surface(SurfaceErrorAction),
    /// Shader compilation failed.
    Shader(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue(what) => write!(f, "invalid value: {what}"),
            Self::InvalidOperation(what) => write!(f, "invalid operation: {what}"),
            Self::OutOfMemory => write!(f, "driver out of memory"),
            Self::Surface(action) => write!(f, "surface error ({action:?})"),
            Self::Shader(msg) => write!(f, "shader error: {msg}"),
        }
    }
}

impl std::error::Error for DriverError {}
