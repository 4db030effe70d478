//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and Window and wires them to a wgpu-backed
//! context, a [`RenderSurfaceView`](crate::view::RenderSurfaceView) and a
//! [`DisplayLink`](crate::time::DisplayLink).

mod drawable;
mod runtime;

pub use runtime::{Runtime, RuntimeConfig, RuntimeCtx};
