use std::borrow::Cow;
use std::ops::{BitOr, BitOrAssign};

/// Upload hint for buffer contents.
///
/// Informs the driver how often the data store is expected to change, which
/// drives placement and whether an existing allocation is reused.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    /// Uploaded once, drawn many times.
    StaticDraw,
    /// Re-uploaded frequently (per-frame animation).
    DynamicDraw,
    /// Uploaded once, drawn a handful of times.
    StreamDraw,
}

/// Primitive assembly mode for `draw_arrays`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DrawMode {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

impl DrawMode {
    pub(crate) fn topology(self) -> wgpu::PrimitiveTopology {
        match self {
            DrawMode::Points => wgpu::PrimitiveTopology::PointList,
            DrawMode::Lines => wgpu::PrimitiveTopology::LineList,
            DrawMode::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            DrawMode::Triangles => wgpu::PrimitiveTopology::TriangleList,
            DrawMode::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        }
    }
}

/// Texture dimensionality.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureTarget {
    Texture2D,
}

/// Minification filter applied when sampling a texture.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum TextureFilter {
    #[default]
    Nearest,
    Linear,
}

/// Render-target components selected by a clear.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct ClearMask(u8);

impl ClearMask {
    pub const COLOR: Self = Self(0b001);
    pub const DEPTH: Self = Self(0b010);
    pub const STENCIL: Self = Self(0b100);

    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn all() -> Self {
        Self(0b111)
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ClearMask {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ClearMask {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Result of a framebuffer completeness check.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FramebufferStatus {
    Complete,
    /// An attachment exists but has no pixel storage (e.g. zero-sized drawable).
    IncompleteAttachment,
    /// No color attachment.
    MissingAttachment,
    /// No framebuffer is bound.
    Undefined,
}

impl FramebufferStatus {
    #[inline]
    pub fn is_complete(self) -> bool {
        self == FramebufferStatus::Complete
    }
}

/// Viewport rectangle in physical pixels of the bound render target.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct ViewportRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ViewportRect {
    #[inline]
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

/// Shader program source.
///
/// The wgpu driver compiles `wgsl` and links `vertex_entry`/`fragment_entry`.
/// Vertex inputs use `@location(n)` matching the attribute index passed to
/// `prepare_to_draw`; textures bound to unit `u` appear at `@group(0)
/// @binding(2u)` with their sampler at `@binding(2u + 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSource {
    pub label: Option<Cow<'static, str>>,
    pub wgsl: Cow<'static, str>,
    pub vertex_entry: Cow<'static, str>,
    pub fragment_entry: Cow<'static, str>,
}

impl ProgramSource {
    /// WGSL source with the conventional `vs_main`/`fs_main` entry points.
    pub fn wgsl(source: impl Into<Cow<'static, str>>) -> Self {
        Self {
            label: None,
            wgsl: source.into(),
            vertex_entry: Cow::Borrowed("vs_main"),
            fragment_entry: Cow::Borrowed("fs_main"),
        }
    }

    pub fn with_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_mask_composes() {
        let mask = ClearMask::COLOR | ClearMask::DEPTH;
        assert!(mask.contains(ClearMask::COLOR));
        assert!(mask.contains(ClearMask::DEPTH));
        assert!(!mask.contains(ClearMask::STENCIL));
        assert!(ClearMask::all().contains(mask));
        assert!(ClearMask::empty().is_empty());
    }
}
