use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::context::{ContextRegistry, GpuContext, WeakGpuContext};
use crate::coords::Rect;
use crate::device::{
    Drawable, Driver, FramebufferHandle, FramebufferStatus, RenderbufferHandle, ViewportRect,
};
use crate::error::GpuError;

use super::FrameCallback;

/// Owns the framebuffer and color renderbuffer that render into a drawable.
///
/// The pair lives in the attached context. Attaching a different context
/// deletes the old pair and allocates a new one; attaching the same context
/// again does nothing. Either both names are set or neither is.
pub struct RenderSurfaceView {
    registry: ContextRegistry,
    context: Option<WeakGpuContext>,
    default_frame_buffer: Option<FramebufferHandle>,
    color_render_buffer: Option<RenderbufferHandle>,
    bounds: Rect,
    callback: Option<Rc<RefCell<dyn FrameCallback>>>,
}

impl RenderSurfaceView {
    /// Creates a view with no context attached.
    pub fn new(registry: &ContextRegistry) -> Self {
        Self {
            registry: registry.clone(),
            context: None,
            default_frame_buffer: None,
            color_render_buffer: None,
            bounds: Rect::default(),
            callback: None,
        }
    }

    /// Creates a view and attaches `context`.
    pub fn with_context(registry: &ContextRegistry, context: &GpuContext) -> Result<Self, GpuError> {
        let mut view = Self::new(registry);
        view.set_context(Some(context))?;
        Ok(view)
    }

    /// The attached context, if it is still alive.
    pub fn context(&self) -> Option<GpuContext> {
        self.context.as_ref().and_then(WeakGpuContext::upgrade)
    }

    /// Attaches `context`, or detaches with `None`.
    ///
    /// The new context is made current (`None` clears the current context).
    /// When allocating the new pair fails, whatever was allocated is deleted
    /// and the view is left without a context.
    ///
    /// # Panics
    ///
    /// When `context` belongs to a different registry.
    #[track_caller]
    pub fn set_context(&mut self, context: Option<&GpuContext>) -> Result<(), GpuError> {
        if let (Some(new), Some(attached)) = (context, self.context.as_ref()) {
            if attached.refers_to(new) {
                return Ok(());
            }
        }
        if let Some(new) = context {
            assert!(
                new.registry().same_registry(&self.registry),
                "context {} belongs to another registry",
                new.id()
            );
        }

        self.release_pair();
        self.registry.set_current(context);

        let Some(new) = context else {
            log::debug!("view detached from its context");
            return Ok(());
        };

        let (framebuffer, renderbuffer) = new.with_driver(allocate_pair)?;
        self.context = Some(new.downgrade());
        self.default_frame_buffer = Some(framebuffer);
        self.color_render_buffer = Some(renderbuffer);
        log::debug!("view attached to {}: {framebuffer}, {renderbuffer}", new.id());
        Ok(())
    }

    /// Framebuffer name; `None` without a context.
    pub fn frame_buffer(&self) -> Option<FramebufferHandle> {
        self.default_frame_buffer
    }

    /// Color renderbuffer name; `None` without a context.
    pub fn color_render_buffer(&self) -> Option<RenderbufferHandle> {
        self.color_render_buffer
    }

    /// Logical bounds recorded by the last [`layout`](Self::layout).
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Pixel width of the color renderbuffer's storage, read from the driver.
    pub fn drawable_width(&self) -> u32 {
        self.drawable_size().0
    }

    /// Pixel height of the color renderbuffer's storage, read from the driver.
    pub fn drawable_height(&self) -> u32 {
        self.drawable_size().1
    }

    fn drawable_size(&self) -> (u32, u32) {
        let (Some(ctx), Some(rb)) = (self.context(), self.color_render_buffer) else {
            return (0, 0);
        };
        ctx.with_driver(|driver| {
            driver.bind_renderbuffer(Some(rb));
            driver.renderbuffer_size()
        })
    }

    /// Backs the color renderbuffer with `drawable`'s pixel storage and
    /// records its logical bounds.
    ///
    /// Call after the drawable is created and whenever it changes size. An
    /// incomplete framebuffer is logged and reported, not treated as an error;
    /// it is expected while the drawable has no area.
    pub fn layout(&mut self, drawable: &dyn Drawable) -> FramebufferStatus {
        self.bounds = drawable.bounds();

        let (Some(ctx), Some(fb), Some(rb)) = (
            self.context(),
            self.default_frame_buffer,
            self.color_render_buffer,
        ) else {
            log::warn!("layout on a view without a context");
            return FramebufferStatus::Undefined;
        };

        ctx.make_current();
        let status = ctx.with_driver(|driver| {
            driver.bind_framebuffer(Some(fb));
            driver.bind_renderbuffer(Some(rb));
            if let Err(err) = driver.renderbuffer_storage_from_drawable(drawable) {
                log::warn!("failed to back {rb} with the drawable: {err}");
            }
            driver.check_framebuffer_status()
        });

        if status.is_complete() {
            let (w, h) = drawable.drawable_size();
            log::debug!("view laid out at {w}x{h} px");
        } else {
            log::warn!("failed to make complete framebuffer object: {status:?}");
        }
        status
    }

    /// Installs the hook invoked by [`display`](Self::display).
    pub fn set_frame_callback(&mut self, callback: Option<Rc<RefCell<dyn FrameCallback>>>) {
        self.callback = callback;
    }

    /// Draws one frame and presents it.
    ///
    /// Makes the view's context current, binds its framebuffer, sets the
    /// viewport to the renderbuffer's pixel size, runs the frame callback
    /// with the view's bounds and presents the renderbuffer to `drawable`.
    ///
    /// # Panics
    ///
    /// When no live context is attached.
    #[track_caller]
    pub fn display(&self, drawable: &dyn Drawable) -> Result<(), GpuError> {
        let (Some(ctx), Some(fb), Some(rb)) = (
            self.context(),
            self.default_frame_buffer,
            self.color_render_buffer,
        ) else {
            panic!("display requires an attached context");
        };

        ctx.make_current();
        let (width, height) = ctx.with_driver(|driver| {
            driver.bind_framebuffer(Some(fb));
            driver.bind_renderbuffer(Some(rb));
            let size = driver.renderbuffer_size();
            driver.viewport(ViewportRect::from_size(size.0, size.1));
            size
        });
        log::trace!("display {width}x{height} px");

        if let Some(callback) = self.callback.clone() {
            callback.borrow_mut().draw_in(self, self.bounds);
        }

        drawable.will_present();
        ctx.with_driver(|driver| {
            driver.bind_renderbuffer(Some(rb));
            driver.present_renderbuffer(drawable)
        })?;
        Ok(())
    }

    /// Deletes the pair in the context it was created in, if that context is
    /// still alive.
    fn release_pair(&mut self) {
        let framebuffer = self.default_frame_buffer.take();
        let renderbuffer = self.color_render_buffer.take();
        let Some(ctx) = self.context.take().and_then(|weak| weak.upgrade()) else {
            return;
        };

        let deleted = ctx.try_with_driver(|driver| {
            if let Some(fb) = framebuffer {
                driver.delete_framebuffer(fb);
            }
            if let Some(rb) = renderbuffer {
                driver.delete_renderbuffer(rb);
            }
        });
        match deleted {
            Some(()) => log::debug!("view released its buffers in {}", ctx.id()),
            None => log::warn!("view buffers leaked: {} was busy", ctx.id()),
        }
    }
}

/// Generates, binds and attaches a framebuffer + color renderbuffer.
///
/// Deletes what it generated when a later step fails.
fn allocate_pair(
    driver: &mut dyn Driver,
) -> Result<(FramebufferHandle, RenderbufferHandle), GpuError> {
    let framebuffer = driver
        .gen_framebuffer()
        .ok_or(GpuError::OutOfResources("framebuffer"))?;
    driver.bind_framebuffer(Some(framebuffer));

    let Some(renderbuffer) = driver.gen_renderbuffer() else {
        driver.delete_framebuffer(framebuffer);
        return Err(GpuError::OutOfResources("renderbuffer"));
    };
    driver.bind_renderbuffer(Some(renderbuffer));

    if let Err(err) = driver.framebuffer_color_renderbuffer(Some(renderbuffer)) {
        driver.delete_renderbuffer(renderbuffer);
        driver.delete_framebuffer(framebuffer);
        return Err(err.into());
    }
    Ok((framebuffer, renderbuffer))
}

impl Drop for RenderSurfaceView {
    fn drop(&mut self) {
        self.release_pair();
    }
}

impl fmt::Debug for RenderSurfaceView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSurfaceView")
            .field("context", &self.context)
            .field("default_frame_buffer", &self.default_frame_buffer)
            .field("color_render_buffer", &self.color_render_buffer)
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::VertexAttribArrayBuffer;
    use crate::coords::ColorRgba;
    use crate::device::{
        BufferUsage, ClearMask, Command, DrawMode, HeadlessDrawable, HeadlessDriver, Journal,
    };

    #[test]
    fn attaching_allocates_a_complete_pair_after_layout() {
        let registry = ContextRegistry::new();
        let (ctx, journal) = GpuContext::headless(&registry);
        let mut view = RenderSurfaceView::with_context(&registry, &ctx).unwrap();

        assert!(ctx.is_current());
        assert!(view.frame_buffer().is_some());
        assert!(view.color_render_buffer().is_some());
        assert_eq!(journal.framebuffers_generated(), 1);
        assert_eq!(journal.renderbuffers_generated(), 1);
        assert_eq!(view.drawable_width(), 0);

        let drawable = HeadlessDrawable::with_scale(640, 480, 2.0);
        assert_eq!(view.layout(&drawable), FramebufferStatus::Complete);
        assert_eq!((view.drawable_width(), view.drawable_height()), (640, 480));
        assert_eq!(view.bounds(), Rect::from_size(320.0, 240.0));
    }

    #[test]
    fn same_context_twice_allocates_one_pair() {
        let registry = ContextRegistry::new();
        let (ctx, journal) = GpuContext::headless(&registry);
        let mut view = RenderSurfaceView::new(&registry);

        view.set_context(Some(&ctx)).unwrap();
        let pair = (view.frame_buffer(), view.color_render_buffer());
        view.set_context(Some(&ctx)).unwrap();

        assert_eq!((view.frame_buffer(), view.color_render_buffer()), pair);
        assert_eq!(journal.framebuffers_generated(), 1);
        assert_eq!(journal.renderbuffers_generated(), 1);
    }

    #[test]
    fn switching_context_releases_the_old_pair_first() {
        let registry = ContextRegistry::new();
        let journal = Journal::default();
        let a = GpuContext::new(
            &registry,
            Box::new(HeadlessDriver::new().with_journal(journal.clone())),
        );
        let b = GpuContext::new(
            &registry,
            Box::new(HeadlessDriver::new().with_journal(journal.clone())),
        );
        let mut view = RenderSurfaceView::with_context(&registry, &a).unwrap();
        let old_fb = view.frame_buffer().unwrap();
        let old_rb = view.color_render_buffer().unwrap();
        journal.take_commands();

        view.set_context(Some(&b)).unwrap();
        let new_fb = view.frame_buffer().unwrap();
        let new_rb = view.color_render_buffer().unwrap();

        let commands = journal.commands();
        let position = |command: Command| {
            commands
                .iter()
                .position(|c| *c == command)
                .unwrap_or_else(|| panic!("{command:?} not recorded"))
        };
        let released = position(Command::DeleteFramebuffer(old_fb))
            .max(position(Command::DeleteRenderbuffer(old_rb)));
        let allocated = position(Command::GenFramebuffer(new_fb))
            .min(position(Command::GenRenderbuffer(new_rb)));
        assert!(released < allocated);

        assert!(!a.with_driver(|d| d.is_framebuffer(old_fb)));
        assert!(!a.with_driver(|d| d.is_renderbuffer(old_rb)));
        assert!(b.is_current());
        assert!(b.with_driver(|d| d.is_framebuffer(new_fb)));
        assert_eq!(view.context(), Some(b));
    }

    #[test]
    fn detaching_clears_pair_and_current_context() {
        let registry = ContextRegistry::new();
        let (ctx, _journal) = GpuContext::headless(&registry);
        let mut view = RenderSurfaceView::with_context(&registry, &ctx).unwrap();
        let fb = view.frame_buffer().unwrap();

        view.set_context(None).unwrap();
        assert!(view.frame_buffer().is_none());
        assert!(view.color_render_buffer().is_none());
        assert!(view.context().is_none());
        assert!(registry.current().is_none());
        assert!(!ctx.with_driver(|d| d.is_framebuffer(fb)));
    }

    #[test]
    fn failed_allocation_leaves_no_half_pair() {
        let registry = ContextRegistry::new();
        let ctx = GpuContext::new(&registry, Box::new(HeadlessDriver::new().with_object_limit(1)));
        let mut view = RenderSurfaceView::new(&registry);

        let err = view.set_context(Some(&ctx)).unwrap_err();
        assert_eq!(err, GpuError::OutOfResources("renderbuffer"));
        assert!(view.frame_buffer().is_none());
        assert!(view.color_render_buffer().is_none());
        assert!(view.context().is_none());

        // The framebuffer generated before the failure was deleted.
        assert!(ctx.with_driver(|d| d.gen_framebuffer()).is_some());
    }

    #[test]
    fn empty_drawable_reports_incomplete_framebuffer() {
        let registry = ContextRegistry::new();
        let (ctx, _journal) = GpuContext::headless(&registry);
        let mut view = RenderSurfaceView::with_context(&registry, &ctx).unwrap();

        let drawable = HeadlessDrawable::new(0, 0);
        assert_eq!(view.layout(&drawable), FramebufferStatus::IncompleteAttachment);

        drawable.resize(8, 8);
        assert!(view.layout(&drawable).is_complete());
    }

    #[test]
    fn layout_without_context_is_undefined() {
        let registry = ContextRegistry::new();
        let mut view = RenderSurfaceView::new(&registry);
        assert_eq!(
            view.layout(&HeadlessDrawable::new(4, 4)),
            FramebufferStatus::Undefined
        );
    }

    #[test]
    fn display_sets_viewport_draws_then_presents() {
        let registry = ContextRegistry::new();
        let (ctx, journal) = GpuContext::headless(&registry);
        let mut view = RenderSurfaceView::with_context(&registry, &ctx).unwrap();
        let drawable = HeadlessDrawable::new(200, 100);
        view.layout(&drawable);

        let buffer = VertexAttribArrayBuffer::new(
            &registry,
            12,
            3,
            &[0; 36],
            BufferUsage::StaticDraw,
        )
        .unwrap();
        let rects = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&rects);
        let callback = move |view: &RenderSurfaceView, rect: Rect| {
            seen.borrow_mut().push(rect);
            let ctx = view.context().unwrap();
            ctx.set_clear_color(ColorRgba::black());
            ctx.clear(ClearMask::COLOR);
            buffer.prepare_to_draw(0, 3, 0, true);
            buffer.draw_arrays(DrawMode::Triangles, 0, 3);
        };
        view.set_frame_callback(Some(Rc::new(RefCell::new(callback))));
        journal.take_commands();

        view.display(&drawable).unwrap();

        let commands = journal.commands();
        assert_eq!(commands.first(), Some(&Command::Viewport(ViewportRect::from_size(200, 100))));
        assert!(matches!(commands.get(3), Some(Command::DrawArrays { count: 3, .. })));
        assert!(matches!(
            commands.last(),
            Some(Command::Present { width: 200, height: 100, .. })
        ));
        assert_eq!(drawable.presents(), 1);
        assert_eq!(*rects.borrow(), vec![Rect::from_size(200.0, 100.0)]);
    }

    #[test]
    fn display_before_layout_fails_to_present() {
        let registry = ContextRegistry::new();
        let (ctx, _journal) = GpuContext::headless(&registry);
        let view = RenderSurfaceView::with_context(&registry, &ctx).unwrap();
        let err = view.display(&HeadlessDrawable::new(4, 4)).unwrap_err();
        assert!(matches!(err, GpuError::Driver(_)));
    }

    #[test]
    fn drop_releases_the_pair() {
        let registry = ContextRegistry::new();
        let (ctx, _journal) = GpuContext::headless(&registry);
        let view = RenderSurfaceView::with_context(&registry, &ctx).unwrap();
        let rb = view.color_render_buffer().unwrap();
        drop(view);
        assert!(!ctx.with_driver(|d| d.is_renderbuffer(rb)));
    }

    #[test]
    #[should_panic(expected = "another registry")]
    fn foreign_context_is_rejected() {
        let registry = ContextRegistry::new();
        let other = ContextRegistry::new();
        let (ctx, _journal) = GpuContext::headless(&other);
        let mut view = RenderSurfaceView::new(&registry);
        let _ = view.set_context(Some(&ctx));
    }
}
