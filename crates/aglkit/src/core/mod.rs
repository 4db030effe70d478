//! Contract between the runtime loop and consumer applications.

mod app;

pub use app::{App, AppControl};
