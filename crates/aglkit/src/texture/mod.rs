//! Power-of-two textures from decoded images.

mod loader;
mod pot;

pub use image::imageops::FilterType;
pub use loader::{resample_rgba, Texture, TextureDescriptor, TextureLoadOptions, TextureLoader};
pub use pot::{power_of_two_ceiling, power_of_two_ceiling_capped, DEFAULT_MAX_TEXTURE_DIMENSION};
