use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::coords::ColorRgba;
use crate::device::{ClearMask, Driver, HeadlessDriver, Journal};

use super::registry::ContextRegistry;

/// Identity of a context, unique within its registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

pub(crate) struct ContextInner {
    id: ContextId,
    registry: ContextRegistry,
    driver: RefCell<Box<dyn Driver>>,
    clear_color: Cell<ColorRgba>,
}

/// Handle to one GPU command context.
///
/// Cloning is cheap and yields another handle to the same context. The driver
/// stays alive while any handle exists, including the ones held by buffers,
/// textures and programs created in the context.
///
/// State-mutating calls require the context to be current in its registry;
/// calling them otherwise panics.
#[derive(Clone)]
pub struct GpuContext {
    inner: Rc<ContextInner>,
}

impl GpuContext {
    /// Wraps `driver` in a new context registered with `registry`.
    ///
    /// The context is not made current.
    pub fn new(registry: &ContextRegistry, driver: Box<dyn Driver>) -> Self {
        let id = ContextId(registry.next_id());
        log::debug!("context {id} created");
        Self {
            inner: Rc::new(ContextInner {
                id,
                registry: registry.clone(),
                driver: RefCell::new(driver),
                clear_color: Cell::new(ColorRgba::default()),
            }),
        }
    }

    /// Creates a context backed by a [`HeadlessDriver`] and returns its journal.
    pub fn headless(registry: &ContextRegistry) -> (Self, Journal) {
        let driver = HeadlessDriver::new();
        let journal = driver.journal();
        (Self::new(registry, Box::new(driver)), journal)
    }

    pub(crate) fn from_inner(inner: Rc<ContextInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade_inner(&self) -> Weak<ContextInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn is_same_inner(&self, weak: &Weak<ContextInner>) -> bool {
        std::ptr::eq(Rc::as_ptr(&self.inner), weak.as_ptr())
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Registry this context belongs to.
    pub fn registry(&self) -> &ContextRegistry {
        &self.inner.registry
    }

    pub fn make_current(&self) {
        self.inner.registry.set_current(Some(self));
    }

    pub fn is_current(&self) -> bool {
        self.inner.registry.is_current(self)
    }

    /// Panics unless this context is current.
    #[track_caller]
    pub(crate) fn assert_current(&self) {
        assert!(
            self.is_current(),
            "context {} is required to be the current context",
            self.inner.id
        );
    }

    /// Caches `color` and issues it to the driver.
    ///
    /// Every channel must be finite and inside `0.0..=1.0`.
    #[track_caller]
    pub fn set_clear_color(&self, color: ColorRgba) {
        self.assert_current();
        assert!(
            color.is_normalized(),
            "clear color {color:?} has a channel outside 0.0..=1.0"
        );
        self.inner.clear_color.set(color);
        self.inner.driver.borrow_mut().set_clear_color(color);
    }

    /// Last color passed to [`set_clear_color`](Self::set_clear_color).
    ///
    /// Reads the cached value only; the driver is never queried.
    pub fn clear_color(&self) -> ColorRgba {
        self.inner.clear_color.get()
    }

    /// Clears the render target components selected by `mask`.
    #[track_caller]
    pub fn clear(&self, mask: ClearMask) {
        self.assert_current();
        self.inner.driver.borrow_mut().clear(mask);
    }

    /// Runs `f` with exclusive access to the context's command stream.
    ///
    /// Must not be re-entered from inside `f`.
    pub fn with_driver<R>(&self, f: impl FnOnce(&mut dyn Driver) -> R) -> R {
        let mut driver = self.inner.driver.borrow_mut();
        f(driver.as_mut())
    }

    /// Like [`with_driver`](Self::with_driver), but returns `None` instead of
    /// panicking when the driver is already borrowed. Used on release paths
    /// that run from `Drop`.
    pub(crate) fn try_with_driver<R>(&self, f: impl FnOnce(&mut dyn Driver) -> R) -> Option<R> {
        let mut driver = self.inner.driver.try_borrow_mut().ok()?;
        Some(f(driver.as_mut()))
    }

    pub fn downgrade(&self) -> WeakGpuContext {
        WeakGpuContext {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl PartialEq for GpuContext {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for GpuContext {}

impl fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuContext")
            .field("id", &self.inner.id)
            .field("clear_color", &self.inner.clear_color.get())
            .finish()
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        log::debug!("context {} destroyed", self.id);
    }
}

/// Non-owning reference to a [`GpuContext`].
#[derive(Clone, Default)]
pub struct WeakGpuContext {
    inner: Weak<ContextInner>,
}

impl WeakGpuContext {
    pub fn upgrade(&self) -> Option<GpuContext> {
        self.inner.upgrade().map(GpuContext::from_inner)
    }

    /// Returns `true` when this refers to `context`.
    pub fn refers_to(&self, context: &GpuContext) -> bool {
        context.is_same_inner(&self.inner)
    }
}

impl fmt::Debug for WeakGpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakGpuContext")
            .field(&self.upgrade().map(|c| c.id()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Command;

    #[test]
    fn clear_color_is_cached() {
        let registry = ContextRegistry::new();
        let (ctx, journal) = GpuContext::headless(&registry);
        ctx.make_current();

        let color = ColorRgba::new(0.1, 0.2, 0.3, 1.0);
        ctx.set_clear_color(color);
        assert_eq!(journal.take_commands(), vec![Command::SetClearColor(color)]);

        // Reading back never reaches the driver.
        assert_eq!(ctx.clear_color(), color);
        assert!(journal.commands().is_empty());
    }

    #[test]
    fn clear_uses_mask_and_cached_color() {
        let registry = ContextRegistry::new();
        let (ctx, journal) = GpuContext::headless(&registry);
        ctx.make_current();
        ctx.set_clear_color(ColorRgba::white());
        ctx.clear(ClearMask::COLOR | ClearMask::DEPTH);

        assert_eq!(
            journal.commands().last(),
            Some(&Command::Clear {
                mask: ClearMask::COLOR | ClearMask::DEPTH,
                color: ColorRgba::white(),
            })
        );
    }

    #[test]
    #[should_panic(expected = "current context")]
    fn clear_requires_current_context() {
        let registry = ContextRegistry::new();
        let (a, _) = GpuContext::headless(&registry);
        let (b, _) = GpuContext::headless(&registry);
        b.make_current();
        a.clear(ClearMask::COLOR);
    }

    #[test]
    #[should_panic(expected = "current context")]
    fn set_clear_color_requires_current_context() {
        let registry = ContextRegistry::new();
        let (ctx, _) = GpuContext::headless(&registry);
        ctx.set_clear_color(ColorRgba::black());
    }

    #[test]
    #[should_panic(expected = "outside 0.0..=1.0")]
    fn clear_color_rejects_out_of_range_channels() {
        let registry = ContextRegistry::new();
        let (ctx, _) = GpuContext::headless(&registry);
        ctx.make_current();
        ctx.set_clear_color(ColorRgba::new(1.5, 0.0, -2.0, 1.0));
    }

    #[test]
    fn rejected_clear_color_never_reaches_the_driver() {
        let registry = ContextRegistry::new();
        let (ctx, journal) = GpuContext::headless(&registry);
        ctx.make_current();
        ctx.set_clear_color(ColorRgba::white());
        journal.take_commands();

        let nan = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            ctx.set_clear_color(ColorRgba::new(0.0, f32::NAN, 0.0, 1.0));
        }));
        assert!(nan.is_err());
        assert_eq!(ctx.clear_color(), ColorRgba::white());
        assert!(journal.commands().is_empty());
    }

    #[test]
    fn weak_handle_tracks_lifetime() {
        let registry = ContextRegistry::new();
        let (ctx, _) = GpuContext::headless(&registry);
        let weak = ctx.downgrade();
        assert!(weak.refers_to(&ctx));
        assert_eq!(weak.upgrade(), Some(ctx.clone()));

        drop(ctx);
        assert!(weak.upgrade().is_none());
    }
}
