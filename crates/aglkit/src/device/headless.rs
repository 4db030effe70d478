//! In-memory driver.
//!
//! Tracks object names and the render target graph and records commands into
//! a bounded [`Journal`] the caller can inspect. Upload payloads are not
//! retained; uploads are journaled by size. No pixels are rasterized.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::coords::{ColorRgba, Rect};

use super::driver::{Drawable, Driver, MAX_TEXTURE_UNITS};
use super::state::{AttribPointer, CommandState, Namespace};
use super::{
    BufferHandle, BufferUsage, ClearMask, DrawMode, DriverError, FramebufferHandle,
    FramebufferStatus, ProgramHandle, ProgramSource, RenderbufferHandle, TextureFilter,
    TextureHandle, TextureTarget, ViewportRect,
};

/// Commands a [`Journal`] keeps before dropping the oldest.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 4096;

/// A command observed by the headless driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BufferData {
        buffer: BufferHandle,
        usage: BufferUsage,
        len: usize,
    },
    TexImage2D {
        texture: TextureHandle,
        level: u32,
        width: u32,
        height: u32,
        len: usize,
    },
    TexMinFilter {
        texture: TextureHandle,
        filter: TextureFilter,
    },
    SetClearColor(ColorRgba),
    Clear {
        mask: ClearMask,
        color: ColorRgba,
    },
    Viewport(ViewportRect),
    DrawArrays {
        mode: DrawMode,
        first: u32,
        count: u32,
        attribs: Vec<(u32, AttribPointer)>,
        program: Option<ProgramHandle>,
        textures: [Option<TextureHandle>; MAX_TEXTURE_UNITS as usize],
    },
    GenFramebuffer(FramebufferHandle),
    DeleteFramebuffer(FramebufferHandle),
    GenRenderbuffer(RenderbufferHandle),
    DeleteRenderbuffer(RenderbufferHandle),
    Present {
        renderbuffer: RenderbufferHandle,
        width: u32,
        height: u32,
    },
}

#[derive(Debug)]
struct JournalLog {
    commands: VecDeque<Command>,
    capacity: usize,
    dropped: u64,
    buffers_generated: usize,
    textures_generated: usize,
    framebuffers_generated: usize,
    renderbuffers_generated: usize,
}

/// Shared, bounded view of a [`HeadlessDriver`]'s command log.
///
/// Obtain it with [`HeadlessDriver::journal`] before handing the driver to a
/// context; it stays readable for the driver's whole life. Once `capacity`
/// commands are held, recording a new one drops the oldest.
#[derive(Debug, Clone)]
pub struct Journal(Rc<RefCell<JournalLog>>);

impl Journal {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "journal capacity must be non-zero");
        Self(Rc::new(RefCell::new(JournalLog {
            commands: VecDeque::new(),
            capacity,
            dropped: 0,
            buffers_generated: 0,
            textures_generated: 0,
            framebuffers_generated: 0,
            renderbuffers_generated: 0,
        })))
    }

    fn record(&self, command: Command) {
        let mut log = self.0.borrow_mut();
        if log.commands.len() == log.capacity {
            log.commands.pop_front();
            log.dropped += 1;
        }
        log.commands.push_back(command);
    }

    /// Snapshot of the retained commands, oldest first.
    pub fn commands(&self) -> Vec<Command> {
        self.0.borrow().commands.iter().cloned().collect()
    }

    /// Drains the retained commands.
    pub fn take_commands(&self) -> Vec<Command> {
        self.0.borrow_mut().commands.drain(..).collect()
    }

    pub fn capacity(&self) -> usize {
        self.0.borrow().capacity
    }

    /// Commands evicted because the journal was full.
    pub fn dropped(&self) -> u64 {
        self.0.borrow().dropped
    }

    pub fn buffers_generated(&self) -> usize {
        self.0.borrow().buffers_generated
    }

    pub fn textures_generated(&self) -> usize {
        self.0.borrow().textures_generated
    }

    pub fn framebuffers_generated(&self) -> usize {
        self.0.borrow().framebuffers_generated
    }

    pub fn renderbuffers_generated(&self) -> usize {
        self.0.borrow().renderbuffers_generated
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_JOURNAL_CAPACITY)
    }
}

/// Driver without a GPU; see the module docs.
#[derive(Debug)]
pub struct HeadlessDriver {
    state: CommandState,
    buffers: Namespace<()>,
    textures: Namespace<()>,
    programs: Namespace<ProgramSource>,
    object_limit: Option<usize>,
    journal: Journal,
}

impl HeadlessDriver {
    pub fn new() -> Self {
        Self {
            state: CommandState::new(),
            buffers: Namespace::new(),
            textures: Namespace::new(),
            programs: Namespace::new(),
            object_limit: None,
            journal: Journal::default(),
        }
    }

    /// Caps the number of live objects; further `gen_*` calls return `None`.
    ///
    /// Simulates driver/context exhaustion.
    pub fn with_object_limit(mut self, limit: usize) -> Self {
        self.object_limit = Some(limit);
        self
    }

    /// Records into `journal` instead of a private one.
    ///
    /// Several drivers sharing one journal interleave their commands in
    /// call order.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn live_objects(&self) -> usize {
        self.buffers.len() + self.textures.len() + self.programs.len() + self.state.target_objects()
    }

    fn can_allocate(&self) -> bool {
        self.object_limit
            .is_none_or(|limit| self.live_objects() < limit)
    }
}

impl Default for HeadlessDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for HeadlessDriver {
    fn gen_buffer(&mut self) -> Option<BufferHandle> {
        if !self.can_allocate() {
            return None;
        }
        self.journal.0.borrow_mut().buffers_generated += 1;
        Some(BufferHandle::from_nonzero(self.buffers.alloc(())))
    }

    fn bind_array_buffer(&mut self, buffer: Option<BufferHandle>) {
        self.state.array_buffer = buffer.filter(|b| self.buffers.contains(b.get()));
    }

    fn buffer_data(&mut self, data: &[u8], usage: BufferUsage) -> Result<(), DriverError> {
        let buffer = self
            .state
            .array_buffer
            .ok_or(DriverError::InvalidOperation("no array buffer bound"))?;
        if !self.buffers.contains(buffer.get()) {
            return Err(DriverError::InvalidOperation("bound buffer was deleted"));
        }
        self.journal.record(Command::BufferData {
            buffer,
            usage,
            len: data.len(),
        });
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(buffer.get()).is_some() {
            self.state.buffer_deleted(buffer);
        }
    }

    fn is_buffer(&self, buffer: BufferHandle) -> bool {
        self.buffers.contains(buffer.get())
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) -> Result<(), DriverError> {
        self.state.enable_attrib(index)
    }

    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        components: u32,
        stride: u32,
        offset: u64,
    ) -> Result<(), DriverError> {
        self.state.attrib_pointer(index, components, stride, offset)
    }

    fn set_clear_color(&mut self, color: ColorRgba) {
        self.state.clear_color = color;
        self.journal.record(Command::SetClearColor(color));
    }

    fn clear(&mut self, mask: ClearMask) {
        self.journal.record(Command::Clear {
            mask,
            color: self.state.clear_color,
        });
    }

    fn viewport(&mut self, rect: ViewportRect) {
        self.state.viewport = rect;
        self.journal.record(Command::Viewport(rect));
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) {
        self.journal.record(Command::DrawArrays {
            mode,
            first,
            count,
            attribs: self.state.enabled_attribs(),
            program: self.state.program,
            textures: self.state.texture_units(),
        });
    }

    fn gen_texture(&mut self) -> Option<TextureHandle> {
        if !self.can_allocate() {
            return None;
        }
        self.journal.0.borrow_mut().textures_generated += 1;
        Some(TextureHandle::from_nonzero(self.textures.alloc(())))
    }

    fn active_texture(&mut self, unit: u32) -> Result<(), DriverError> {
        self.state.set_active_unit(unit)
    }

    fn bind_texture(&mut self, _target: TextureTarget, texture: Option<TextureHandle>) {
        self.state
            .bind_texture(texture.filter(|t| self.textures.contains(t.get())));
    }

    fn tex_image_2d(
        &mut self,
        _target: TextureTarget,
        level: u32,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), DriverError> {
        if width == 0 || height == 0 {
            return Err(DriverError::InvalidValue("zero texture dimension"));
        }
        if pixels.len() as u64 != u64::from(width) * u64::from(height) * 4 {
            return Err(DriverError::InvalidValue("pixel data does not match dimensions"));
        }
        let texture = self
            .state
            .bound_texture()
            .ok_or(DriverError::InvalidOperation("no texture bound"))?;
        if !self.textures.contains(texture.get()) {
            return Err(DriverError::InvalidOperation("bound texture was deleted"));
        }
        self.journal.record(Command::TexImage2D {
            texture,
            level,
            width,
            height,
            len: pixels.len(),
        });
        Ok(())
    }

    fn tex_min_filter(
        &mut self,
        _target: TextureTarget,
        filter: TextureFilter,
    ) -> Result<(), DriverError> {
        let texture = self
            .state
            .bound_texture()
            .ok_or(DriverError::InvalidOperation("no texture bound"))?;
        self.journal.record(Command::TexMinFilter { texture, filter });
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(texture.get()).is_some() {
            self.state.texture_deleted(texture);
        }
    }

    fn is_texture(&self, texture: TextureHandle) -> bool {
        self.textures.contains(texture.get())
    }

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle, DriverError> {
        if !self.can_allocate() {
            return Err(DriverError::OutOfMemory);
        }
        if source.wgsl.trim().is_empty() {
            return Err(DriverError::Shader("empty program source".to_string()));
        }
        Ok(ProgramHandle::from_nonzero(self.programs.alloc(source.clone())))
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.state.program = program.filter(|p| self.programs.contains(p.get()));
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(program.get()).is_some() {
            self.state.program_deleted(program);
        }
    }

    fn is_program(&self, program: ProgramHandle) -> bool {
        self.programs.contains(program.get())
    }

    fn gen_framebuffer(&mut self) -> Option<FramebufferHandle> {
        if !self.can_allocate() {
            return None;
        }
        self.journal.0.borrow_mut().framebuffers_generated += 1;
        let framebuffer = self.state.gen_framebuffer();
        self.journal.record(Command::GenFramebuffer(framebuffer));
        Some(framebuffer)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.state.bind_framebuffer(framebuffer);
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.state.is_framebuffer(framebuffer) {
            self.state.delete_framebuffer(framebuffer);
            self.journal.record(Command::DeleteFramebuffer(framebuffer));
        }
    }

    fn is_framebuffer(&self, framebuffer: FramebufferHandle) -> bool {
        self.state.is_framebuffer(framebuffer)
    }

    fn gen_renderbuffer(&mut self) -> Option<RenderbufferHandle> {
        if !self.can_allocate() {
            return None;
        }
        self.journal.0.borrow_mut().renderbuffers_generated += 1;
        let renderbuffer = self.state.gen_renderbuffer();
        self.journal.record(Command::GenRenderbuffer(renderbuffer));
        Some(renderbuffer)
    }

    fn bind_renderbuffer(&mut self, renderbuffer: Option<RenderbufferHandle>) {
        self.state.bind_renderbuffer(renderbuffer);
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        if self.state.is_renderbuffer(renderbuffer) {
            self.state.delete_renderbuffer(renderbuffer);
            self.journal.record(Command::DeleteRenderbuffer(renderbuffer));
        }
    }

    fn is_renderbuffer(&self, renderbuffer: RenderbufferHandle) -> bool {
        self.state.is_renderbuffer(renderbuffer)
    }

    fn framebuffer_color_renderbuffer(
        &mut self,
        renderbuffer: Option<RenderbufferHandle>,
    ) -> Result<(), DriverError> {
        self.state.attach_color(renderbuffer)
    }

    fn check_framebuffer_status(&self) -> FramebufferStatus {
        self.state.framebuffer_status()
    }

    fn renderbuffer_size(&self) -> (u32, u32) {
        self.state.renderbuffer_size()
    }

    fn renderbuffer_storage_from_drawable(
        &mut self,
        drawable: &dyn Drawable,
    ) -> Result<(), DriverError> {
        let (width, height) = drawable.drawable_size();
        self.state.set_renderbuffer_storage(width, height)
    }

    fn present_renderbuffer(&mut self, _drawable: &dyn Drawable) -> Result<(), DriverError> {
        let renderbuffer = self
            .state
            .bound_renderbuffer()
            .ok_or(DriverError::InvalidOperation("no renderbuffer bound"))?;
        let (width, height) = self.state.renderbuffer_size();
        if width == 0 || height == 0 {
            return Err(DriverError::InvalidOperation("renderbuffer has no storage"));
        }
        self.journal.record(Command::Present {
            renderbuffer,
            width,
            height,
        });
        Ok(())
    }
}

/// Fixed-size drawable for headless rendering.
#[derive(Debug)]
pub struct HeadlessDrawable {
    size: Cell<(u32, u32)>,
    scale_factor: f32,
    presents: Cell<u64>,
}

impl HeadlessDrawable {
    /// Drawable of `width × height` physical pixels at scale factor 1.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_scale(width, height, 1.0)
    }

    pub fn with_scale(width: u32, height: u32, scale_factor: f32) -> Self {
        debug_assert!(scale_factor > 0.0);
        Self {
            size: Cell::new((width, height)),
            scale_factor,
            presents: Cell::new(0),
        }
    }

    /// Simulates a platform resize; call `layout` on the view afterwards.
    pub fn resize(&self, width: u32, height: u32) {
        self.size.set((width, height));
    }

    /// Number of `will_present` notifications received.
    pub fn presents(&self) -> u64 {
        self.presents.get()
    }
}

impl Drawable for HeadlessDrawable {
    fn drawable_size(&self) -> (u32, u32) {
        self.size.get()
    }

    fn bounds(&self) -> Rect {
        let (w, h) = self.size.get();
        Rect::from_size(w as f32 / self.scale_factor, h as f32 / self.scale_factor)
    }

    fn will_present(&self) {
        self.presents.set(self.presents.get() + 1);
    }
}
