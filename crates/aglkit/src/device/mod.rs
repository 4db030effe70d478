//! Driver layer.
//!
//! This module is responsible for:
//! - the [`Driver`] command interface every context talks through
//! - an in-memory [`HeadlessDriver`] that journals commands
//! - a wgpu-backed [`WgpuDriver`] presenting to a window surface

mod driver;
mod error;
mod gpu;
mod handle;
mod headless;
mod init;
mod pipeline;
mod state;
mod surface;
mod types;

pub use driver::{Drawable, Driver, MAX_TEXTURE_UNITS, MAX_VERTEX_ATTRIBS};
pub use error::{DriverError, SurfaceErrorAction};
pub use gpu::WgpuDriver;
pub use handle::{BufferHandle, FramebufferHandle, ProgramHandle, RenderbufferHandle, TextureHandle};
pub use headless::{Command, HeadlessDrawable, HeadlessDriver, Journal, DEFAULT_JOURNAL_CAPACITY};
pub use init::GpuInit;
pub use state::AttribPointer;
pub use types::{
    BufferUsage, ClearMask, DrawMode, FramebufferStatus, ProgramSource, TextureFilter,
    TextureTarget, ViewportRect,
};
