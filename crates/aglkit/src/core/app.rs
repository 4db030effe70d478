use winit::event::WindowEvent;

use crate::context::{ContextRegistry, GpuContext};
use crate::time::FrameTime;
use crate::view::FrameCallback;
use crate::window::RuntimeCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract driven by [`Runtime`](crate::window::Runtime).
///
/// Drawing happens in [`FrameCallback::draw_in`], which the runtime's view
/// invokes once per display-link tick after [`update`](Self::update).
pub trait App: FrameCallback + 'static {
    /// Called once the window, its context and view exist. The context is
    /// current; create buffers, textures and programs here.
    fn init(&mut self, registry: &ContextRegistry, context: &GpuContext) -> anyhow::Result<()>;

    /// Called once per tick, before the frame is drawn.
    fn update(&mut self, time: FrameTime, runtime: &mut RuntimeCtx) {
        let _ = (time, runtime);
    }

    /// Called for window events.
    fn on_window_event(&mut self, event: &WindowEvent, runtime: &mut RuntimeCtx) -> AppControl {
        let _ = (event, runtime);
        AppControl::Continue
    }
}
