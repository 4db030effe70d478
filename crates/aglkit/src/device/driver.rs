use crate::coords::{ColorRgba, Rect};

use super::{
    BufferHandle, BufferUsage, ClearMask, DrawMode, DriverError, FramebufferHandle,
    FramebufferStatus, ProgramHandle, ProgramSource, RenderbufferHandle, TextureFilter,
    TextureHandle, TextureTarget, ViewportRect,
};

/// Number of vertex attribute slots every driver exposes.
pub const MAX_VERTEX_ATTRIBS: u32 = 8;

/// Number of texture units every driver exposes.
pub const MAX_TEXTURE_UNITS: u32 = 2;

/// Platform drawable a color renderbuffer can take its pixel storage from.
///
/// The renderbuffer shares storage with the drawable (the compositor's surface)
/// instead of owning a separate copy, so presenting needs no extra blit.
pub trait Drawable {
    /// Backing size in physical pixels.
    fn drawable_size(&self) -> (u32, u32);

    /// Logical bounds handed to frame callbacks.
    fn bounds(&self) -> Rect;

    /// Called right before the renderbuffer is presented.
    fn will_present(&self) {}
}

/// Command stream of a single GPU context.
///
/// Objects are named by non-zero integers scoped to the driver instance. Calls
/// follow bind-to-edit semantics: `buffer_data` targets the bound array buffer,
/// `tex_image_2d` the texture bound on the active unit, storage and status calls
/// the bound renderbuffer/framebuffer.
///
/// `gen_*` returns `None` when the driver cannot allocate another name.
pub trait Driver {
    // ── buffers ─────────────────────────────────────────────────────────
    fn gen_buffer(&mut self) -> Option<BufferHandle>;
    fn bind_array_buffer(&mut self, buffer: Option<BufferHandle>);
    fn buffer_data(&mut self, data: &[u8], usage: BufferUsage) -> Result<(), DriverError>;
    fn delete_buffer(&mut self, buffer: BufferHandle);
    fn is_buffer(&self, buffer: BufferHandle) -> bool;

    // ── vertex attributes ───────────────────────────────────────────────
    fn enable_vertex_attrib_array(&mut self, index: u32) -> Result<(), DriverError>;

    /// Points attribute `index` at `components` tightly packed `f32`s located
    /// `offset` bytes into each `stride`-byte record of the bound array buffer.
    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        components: u32,
        stride: u32,
        offset: u64,
    ) -> Result<(), DriverError>;

    // ── state & commands ────────────────────────────────────────────────
    fn set_clear_color(&mut self, color: ColorRgba);
    fn clear(&mut self, mask: ClearMask);
    fn viewport(&mut self, rect: ViewportRect);
    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32);

    // ── textures ────────────────────────────────────────────────────────
    fn gen_texture(&mut self) -> Option<TextureHandle>;
    fn active_texture(&mut self, unit: u32) -> Result<(), DriverError>;
    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureHandle>);

    /// Uploads tightly packed RGBA8 `pixels` as mip `level` of the bound texture.
    fn tex_image_2d(
        &mut self,
        target: TextureTarget,
        level: u32,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), DriverError>;
    fn tex_min_filter(&mut self, target: TextureTarget, filter: TextureFilter)
        -> Result<(), DriverError>;
    fn delete_texture(&mut self, texture: TextureHandle);
    fn is_texture(&self, texture: TextureHandle) -> bool;

    // ── programs ────────────────────────────────────────────────────────
    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle, DriverError>;
    fn use_program(&mut self, program: Option<ProgramHandle>);
    fn delete_program(&mut self, program: ProgramHandle);
    fn is_program(&self, program: ProgramHandle) -> bool;

    // ── framebuffers & renderbuffers ────────────────────────────────────
    fn gen_framebuffer(&mut self) -> Option<FramebufferHandle>;
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);
    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);
    fn is_framebuffer(&self, framebuffer: FramebufferHandle) -> bool;

    fn gen_renderbuffer(&mut self) -> Option<RenderbufferHandle>;
    fn bind_renderbuffer(&mut self, renderbuffer: Option<RenderbufferHandle>);
    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);
    fn is_renderbuffer(&self, renderbuffer: RenderbufferHandle) -> bool;

    /// Attaches `renderbuffer` as color attachment 0 of the bound framebuffer.
    fn framebuffer_color_renderbuffer(
        &mut self,
        renderbuffer: Option<RenderbufferHandle>,
    ) -> Result<(), DriverError>;
    fn check_framebuffer_status(&self) -> FramebufferStatus;

    /// Pixel size of the bound renderbuffer's storage; `(0, 0)` without storage.
    fn renderbuffer_size(&self) -> (u32, u32);

    /// Backs the bound renderbuffer with the drawable's pixel storage.
    fn renderbuffer_storage_from_drawable(
        &mut self,
        drawable: &dyn Drawable,
    ) -> Result<(), DriverError>;

    /// Presents the bound renderbuffer to the compositor.
    fn present_renderbuffer(&mut self, drawable: &dyn Drawable) -> Result<(), DriverError>;
}
