use std::fmt;

use crate::device::{DriverError, SurfaceErrorAction};

/// Recoverable failures of the helper layer.
///
/// Precondition violations (no current context, zero sizes, draw ranges past
/// the uploaded data) are not represented here; they panic.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuError {
    /// The driver returned a null name for the named object kind.
    OutOfResources(&'static str),
    /// A driver call rejected its arguments or the binding state.
    Driver(DriverError),
    /// The intermediate RGBA buffer for a texture could not be built.
    ResampleFailed { width: u32, height: u32 },
    /// Acquiring or presenting the drawable failed.
    Present(SurfaceErrorAction),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfResources(kind) => write!(f, "driver could not allocate a {kind} name"),
            Self::Driver(err) => write!(f, "driver error: {err}"),
            Self::ResampleFailed { width, height } => {
                write!(f, "failed to resample image into a {width}x{height} RGBA buffer")
            }
            Self::Present(action) => write!(f, "present failed ({action:?})"),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DriverError> for GpuError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Surface(action) => Self::Present(action),
            other => Self::Driver(other),
        }
    }
}
