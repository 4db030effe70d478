//! Small value types shared by the context, view and callback layers.
//!
//! Logical space is DPI-aware with a top-left origin. Drawable sizes (physical
//! pixels) are plain `(u32, u32)` pairs and never mixed with these types.

mod color;
mod rect;
mod vec2;

pub use color::ColorRgba;
pub use rect::Rect;
pub use vec2::Vec2;
