//! Surface-backed render targets.

mod callback;
mod surface_view;

pub use callback::FrameCallback;
pub use surface_view::RenderSurfaceView;
