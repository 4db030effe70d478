//! aglkit: GPU resource helpers.
//!
//! Explicit lifetime management for the objects a small renderer needs:
//! contexts and the per-thread current-context registry, vertex buffers,
//! power-of-two textures, shader programs and the framebuffer/renderbuffer
//! pair that renders into a window surface. A display link paces redraws.
//!
//! Everything talks to a [`device::Driver`]. [`device::WgpuDriver`] renders
//! through wgpu; [`device::HeadlessDriver`] keeps objects in memory and
//! journals commands.

pub mod buffer;
pub mod context;
pub mod coords;
pub mod core;
pub mod device;
pub mod error;
pub mod logging;
pub mod shader;
pub mod texture;
pub mod time;
pub mod view;
pub mod window;

pub use error::GpuError;
