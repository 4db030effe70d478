//! Binding state and object bookkeeping shared by every driver.
//!
//! Backends differ in where buffer, texture and program storage lives; the
//! bind points, attribute slots and the framebuffer/renderbuffer graph behave
//! identically and live here.

use std::collections::HashMap;
use std::num::NonZeroU32;

use crate::coords::ColorRgba;

use super::driver::{MAX_TEXTURE_UNITS, MAX_VERTEX_ATTRIBS};
use super::{
    BufferHandle, DriverError, FramebufferHandle, FramebufferStatus, ProgramHandle,
    RenderbufferHandle, TextureHandle, ViewportRect,
};

/// Name allocator + object table for one object kind.
#[derive(Debug)]
pub(crate) struct Namespace<T> {
    next: u32,
    objects: HashMap<u32, T>,
}

impl<T> Namespace<T> {
    pub(crate) fn new() -> Self {
        Self {
            next: 1,
            objects: HashMap::new(),
        }
    }

    /// Stores `value` under a fresh non-zero name.
    pub(crate) fn alloc(&mut self, value: T) -> NonZeroU32 {
        loop {
            let candidate = self.next;
            self.next = self.next.wrapping_add(1).max(1);
            if let (Some(name), false) = (
                NonZeroU32::new(candidate),
                self.objects.contains_key(&candidate),
            ) {
                self.objects.insert(candidate, value);
                return name;
            }
        }
    }

    pub(crate) fn get(&self, name: u32) -> Option<&T> {
        self.objects.get(&name)
    }

    pub(crate) fn get_mut(&mut self, name: u32) -> Option<&mut T> {
        self.objects.get_mut(&name)
    }

    pub(crate) fn remove(&mut self, name: u32) -> Option<T> {
        self.objects.remove(&name)
    }

    pub(crate) fn contains(&self, name: u32) -> bool {
        self.objects.contains_key(&name)
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.objects.values_mut()
    }
}

/// Where an enabled attribute reads its data from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct AttribPointer {
    pub buffer: BufferHandle,
    pub components: u32,
    pub stride: u32,
    pub offset: u64,
}

#[derive(Debug, Copy, Clone, Default)]
struct AttribSlot {
    enabled: bool,
    pointer: Option<AttribPointer>,
}

#[derive(Debug, Default)]
struct FramebufferObject {
    color: Option<RenderbufferHandle>,
}

#[derive(Debug, Default)]
struct RenderbufferObject {
    width: u32,
    height: u32,
}

/// GL-style binding state of one context.
#[derive(Debug)]
pub(crate) struct CommandState {
    pub(crate) array_buffer: Option<BufferHandle>,
    attribs: [AttribSlot; MAX_VERTEX_ATTRIBS as usize],
    active_unit: usize,
    textures: [Option<TextureHandle>; MAX_TEXTURE_UNITS as usize],
    pub(crate) program: Option<ProgramHandle>,
    pub(crate) viewport: ViewportRect,
    pub(crate) clear_color: ColorRgba,

    framebuffer: Option<FramebufferHandle>,
    renderbuffer: Option<RenderbufferHandle>,
    framebuffers: Namespace<FramebufferObject>,
    renderbuffers: Namespace<RenderbufferObject>,
}

impl CommandState {
    pub(crate) fn new() -> Self {
        Self {
            array_buffer: None,
            attribs: [AttribSlot::default(); MAX_VERTEX_ATTRIBS as usize],
            active_unit: 0,
            textures: [None; MAX_TEXTURE_UNITS as usize],
            program: None,
            viewport: ViewportRect::default(),
            clear_color: ColorRgba::new(0.0, 0.0, 0.0, 0.0),
            framebuffer: None,
            renderbuffer: None,
            framebuffers: Namespace::new(),
            renderbuffers: Namespace::new(),
        }
    }

    // ── vertex attributes ───────────────────────────────────────────────

    pub(crate) fn enable_attrib(&mut self, index: u32) -> Result<(), DriverError> {
        let slot = self
            .attribs
            .get_mut(index as usize)
            .ok_or(DriverError::InvalidValue("attribute index out of range"))?;
        slot.enabled = true;
        Ok(())
    }

    pub(crate) fn attrib_pointer(
        &mut self,
        index: u32,
        components: u32,
        stride: u32,
        offset: u64,
    ) -> Result<(), DriverError> {
        if !(1..=4).contains(&components) {
            return Err(DriverError::InvalidValue("attribute component count"));
        }
        let buffer = self
            .array_buffer
            .ok_or(DriverError::InvalidOperation("no array buffer bound"))?;
        let slot = self
            .attribs
            .get_mut(index as usize)
            .ok_or(DriverError::InvalidValue("attribute index out of range"))?;
        slot.pointer = Some(AttribPointer {
            buffer,
            components,
            stride,
            offset,
        });
        Ok(())
    }

    /// Enabled attributes that have a pointer, in slot order.
    pub(crate) fn enabled_attribs(&self) -> Vec<(u32, AttribPointer)> {
        self.attribs
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.enabled)
            .filter_map(|(i, slot)| slot.pointer.map(|p| (i as u32, p)))
            .collect()
    }

    pub(crate) fn buffer_deleted(&mut self, buffer: BufferHandle) {
        if self.array_buffer == Some(buffer) {
            self.array_buffer = None;
        }
    }

    // ── textures & programs ─────────────────────────────────────────────

    pub(crate) fn set_active_unit(&mut self, unit: u32) -> Result<(), DriverError> {
        if unit >= MAX_TEXTURE_UNITS {
            return Err(DriverError::InvalidValue("texture unit out of range"));
        }
        self.active_unit = unit as usize;
        Ok(())
    }

    pub(crate) fn bind_texture(&mut self, texture: Option<TextureHandle>) {
        self.textures[self.active_unit] = texture;
    }

    pub(crate) fn bound_texture(&self) -> Option<TextureHandle> {
        self.textures[self.active_unit]
    }

    pub(crate) fn texture_units(&self) -> [Option<TextureHandle>; MAX_TEXTURE_UNITS as usize] {
        self.textures
    }

    pub(crate) fn texture_deleted(&mut self, texture: TextureHandle) {
        for unit in self.textures.iter_mut() {
            if *unit == Some(texture) {
                *unit = None;
            }
        }
    }

    pub(crate) fn program_deleted(&mut self, program: ProgramHandle) {
        if self.program == Some(program) {
            self.program = None;
        }
    }

    // ── framebuffers & renderbuffers ────────────────────────────────────

    /// Live framebuffer + renderbuffer count.
    pub(crate) fn target_objects(&self) -> usize {
        self.framebuffers.len() + self.renderbuffers.len()
    }

    pub(crate) fn gen_framebuffer(&mut self) -> FramebufferHandle {
        FramebufferHandle::from_nonzero(self.framebuffers.alloc(FramebufferObject::default()))
    }

    pub(crate) fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.framebuffer = framebuffer.filter(|f| self.framebuffers.contains(f.get()));
    }

    pub(crate) fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.framebuffers.remove(framebuffer.get()).is_some()
            && self.framebuffer == Some(framebuffer)
        {
            self.framebuffer = None;
        }
    }

    pub(crate) fn is_framebuffer(&self, framebuffer: FramebufferHandle) -> bool {
        self.framebuffers.contains(framebuffer.get())
    }

    pub(crate) fn gen_renderbuffer(&mut self) -> RenderbufferHandle {
        RenderbufferHandle::from_nonzero(self.renderbuffers.alloc(RenderbufferObject::default()))
    }

    pub(crate) fn bind_renderbuffer(&mut self, renderbuffer: Option<RenderbufferHandle>) {
        self.renderbuffer = renderbuffer.filter(|r| self.renderbuffers.contains(r.get()));
    }

    pub(crate) fn bound_renderbuffer(&self) -> Option<RenderbufferHandle> {
        self.renderbuffer
    }

    /// Deleting a renderbuffer detaches it from every framebuffer.
    pub(crate) fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        if self.renderbuffers.remove(renderbuffer.get()).is_none() {
            return;
        }
        if self.renderbuffer == Some(renderbuffer) {
            self.renderbuffer = None;
        }
        for fb in self.framebuffers.values_mut() {
            if fb.color == Some(renderbuffer) {
                fb.color = None;
            }
        }
    }

    pub(crate) fn is_renderbuffer(&self, renderbuffer: RenderbufferHandle) -> bool {
        self.renderbuffers.contains(renderbuffer.get())
    }

    pub(crate) fn attach_color(
        &mut self,
        renderbuffer: Option<RenderbufferHandle>,
    ) -> Result<(), DriverError> {
        if let Some(rb) = renderbuffer {
            if !self.renderbuffers.contains(rb.get()) {
                return Err(DriverError::InvalidOperation("unknown renderbuffer"));
            }
        }
        let fb = self
            .framebuffer
            .and_then(|f| self.framebuffers.get_mut(f.get()))
            .ok_or(DriverError::InvalidOperation("no framebuffer bound"))?;
        fb.color = renderbuffer;
        Ok(())
    }

    pub(crate) fn framebuffer_status(&self) -> FramebufferStatus {
        let Some(fb) = self.framebuffer.and_then(|f| self.framebuffers.get(f.get())) else {
            return FramebufferStatus::Undefined;
        };
        let Some(color) = fb.color.and_then(|rb| self.renderbuffers.get(rb.get())) else {
            return FramebufferStatus::MissingAttachment;
        };
        if color.width == 0 || color.height == 0 {
            return FramebufferStatus::IncompleteAttachment;
        }
        FramebufferStatus::Complete
    }

    pub(crate) fn renderbuffer_size(&self) -> (u32, u32) {
        self.renderbuffer
            .and_then(|rb| self.renderbuffers.get(rb.get()))
            .map_or((0, 0), |rb| (rb.width, rb.height))
    }

    pub(crate) fn set_renderbuffer_storage(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<(), DriverError> {
        let rb = self
            .renderbuffer
            .and_then(|r| self.renderbuffers.get_mut(r.get()))
            .ok_or(DriverError::InvalidOperation("no renderbuffer bound"))?;
        rb.width = width;
        rb.height = height;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached() -> (CommandState, FramebufferHandle, RenderbufferHandle) {
        let mut state = CommandState::new();
        let fb = state.gen_framebuffer();
        state.bind_framebuffer(Some(fb));
        let rb = state.gen_renderbuffer();
        state.bind_renderbuffer(Some(rb));
        state.attach_color(Some(rb)).unwrap();
        (state, fb, rb)
    }

    #[test]
    fn names_are_never_zero_or_reused_while_live() {
        let mut ns = Namespace::new();
        let a = ns.alloc(());
        let b = ns.alloc(());
        assert_ne!(a, b);
        ns.remove(a.get());
        let c = ns.alloc(());
        assert_ne!(c, b);
    }

    #[test]
    fn status_follows_attachment_and_storage() {
        let mut state = CommandState::new();
        assert_eq!(state.framebuffer_status(), FramebufferStatus::Undefined);

        let (mut state2, _fb, _rb) = attached();
        assert_eq!(state2.framebuffer_status(), FramebufferStatus::IncompleteAttachment);
        state2.set_renderbuffer_storage(64, 32).unwrap();
        assert_eq!(state2.framebuffer_status(), FramebufferStatus::Complete);
        assert_eq!(state2.renderbuffer_size(), (64, 32));

        let fb = state.gen_framebuffer();
        state.bind_framebuffer(Some(fb));
        assert_eq!(state.framebuffer_status(), FramebufferStatus::MissingAttachment);
    }

    #[test]
    fn deleting_renderbuffer_detaches_and_unbinds() {
        let (mut state, fb, rb) = attached();
        state.set_renderbuffer_storage(8, 8).unwrap();
        state.delete_renderbuffer(rb);
        assert!(!state.is_renderbuffer(rb));
        assert_eq!(state.bound_renderbuffer(), None);
        assert_eq!(state.framebuffer_status(), FramebufferStatus::MissingAttachment);

        state.delete_framebuffer(fb);
        assert_eq!(state.framebuffer_status(), FramebufferStatus::Undefined);
        assert_eq!(state.target_objects(), 0);
    }

    #[test]
    fn attrib_pointer_requires_bound_buffer() {
        let mut state = CommandState::new();
        assert!(state.attrib_pointer(0, 3, 12, 0).is_err());

        let buffer = BufferHandle::new(1).unwrap();
        state.array_buffer = Some(buffer);
        state.attrib_pointer(0, 3, 12, 0).unwrap();
        assert!(state.enabled_attribs().is_empty());

        state.enable_attrib(0).unwrap();
        assert_eq!(state.enabled_attribs()[0].1.buffer, buffer);
        assert!(state.enable_attrib(MAX_VERTEX_ATTRIBS).is_err());
    }
}
