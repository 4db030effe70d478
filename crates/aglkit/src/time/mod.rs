//! Frame timing.
//!
//! A [`DisplayLink`] paces redraws at a preferred rate without coupling to
//! the event loop that polls it.

mod display_link;

pub use display_link::{DisplayLink, FrameTime, DEFAULT_FRAMES_PER_SECOND};
