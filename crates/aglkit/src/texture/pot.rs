/// Largest texture side the loader produces unless configured otherwise.
pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 1024;

/// Smallest power of two `>= dimension`, clamped to
/// [`DEFAULT_MAX_TEXTURE_DIMENSION`].
///
/// Sources larger than the clamp are downsampled by the loader.
#[track_caller]
pub fn power_of_two_ceiling(dimension: u32) -> u32 {
    power_of_two_ceiling_capped(dimension, DEFAULT_MAX_TEXTURE_DIMENSION)
}

/// Smallest power of two `>= dimension`, clamped to `max`.
///
/// # Panics
///
/// When `dimension` is zero or `max` is not a power of two.
#[track_caller]
pub fn power_of_two_ceiling_capped(dimension: u32, max: u32) -> u32 {
    assert!(dimension > 0, "texture dimension must be positive");
    assert!(max.is_power_of_two(), "maximum texture dimension {max} is not a power of two");
    dimension
        .checked_next_power_of_two()
        .map_or(max, |pot| pot.min(max))
}
