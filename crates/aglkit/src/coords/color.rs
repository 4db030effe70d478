/// RGBA color with `f32` channels, each expected in `0.0..=1.0`.
///
/// Used for the clear color cached on a [`GpuContext`](crate::context::GpuContext).
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ColorRgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ColorRgba {
    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    #[inline]
    pub const fn black() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    #[inline]
    pub const fn white() -> Self {
        Self::new(1.0, 1.0, 1.0, 1.0)
    }

    /// Returns `true` when every channel is finite and inside `0.0..=1.0`.
    #[inline]
    pub fn is_normalized(self) -> bool {
        self.to_array()
            .iter()
            .all(|c| c.is_finite() && (0.0..=1.0).contains(c))
    }

    #[inline]
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl From<[f32; 4]> for ColorRgba {
    #[inline]
    fn from([r, g, b, a]: [f32; 4]) -> Self {
        Self::new(r, g, b, a)
    }
}

impl From<ColorRgba> for wgpu::Color {
    #[inline]
    fn from(c: ColorRgba) -> Self {
        wgpu::Color {
            r: c.r as f64,
            g: c.g as f64,
            b: c.b as f64,
            a: c.a as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_range() {
        assert!(ColorRgba::white().is_normalized());
        assert!(!ColorRgba::new(1.5, 0.0, 0.0, 1.0).is_normalized());
        assert!(!ColorRgba::new(f32::NAN, 0.0, 0.0, 1.0).is_normalized());
    }

    #[test]
    fn array_conversion() {
        let c = ColorRgba::from([0.1, 0.2, 0.3, 0.4]);
        assert_eq!(c.to_array(), [0.1, 0.2, 0.3, 0.4]);
    }
}
