use crate::coords::Rect;

use super::RenderSurfaceView;

/// Per-frame drawing hook of a [`RenderSurfaceView`].
///
/// Called from [`RenderSurfaceView::display`] with the view's framebuffer
/// bound, its context current and the viewport covering the drawable.
pub trait FrameCallback {
    fn draw_in(&mut self, view: &RenderSurfaceView, rect: Rect);
}

impl<F> FrameCallback for F
where
    F: FnMut(&RenderSurfaceView, Rect),
{
    fn draw_in(&mut self, view: &RenderSurfaceView, rect: Rect) {
        self(view, rect)
    }
}
