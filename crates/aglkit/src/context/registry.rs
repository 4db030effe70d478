use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::gpu_context::{ContextInner, GpuContext};

/// Tracks which [`GpuContext`] is current for the thread that owns it.
///
/// The registry is `!Send`; every thread that issues GPU work holds its own.
/// It references the current context weakly: dropping the last handle to a
/// context leaves the registry with no current context.
#[derive(Clone, Default)]
pub struct ContextRegistry {
    inner: Rc<RegistryInner>,
}

#[derive(Default)]
pub(crate) struct RegistryInner {
    current: RefCell<Option<Weak<ContextInner>>>,
    next_id: Cell<u64>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current context, if one is set and still alive.
    pub fn current(&self) -> Option<GpuContext> {
        self.inner
            .current
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(GpuContext::from_inner)
    }

    /// Makes `context` current, or clears the current context with `None`.
    pub fn set_current(&self, context: Option<&GpuContext>) {
        match context {
            Some(ctx) => log::trace!("context {} made current", ctx.id()),
            None => log::trace!("current context cleared"),
        }
        *self.inner.current.borrow_mut() = context.map(GpuContext::downgrade_inner);
    }

    /// Returns `true` when `context` is the current one.
    pub fn is_current(&self, context: &GpuContext) -> bool {
        self.inner
            .current
            .borrow()
            .as_ref()
            .is_some_and(|weak| context.is_same_inner(weak))
    }

    pub(crate) fn next_id(&self) -> u64 {
        let id = self.inner.next_id.get() + 1;
        self.inner.next_id.set(id);
        id
    }

    /// Returns `true` when both values refer to the same registry.
    pub fn same_registry(&self, other: &ContextRegistry) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("current", &self.current().map(|c| c.id()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDriver;

    #[test]
    fn current_is_cleared_when_context_dies() {
        let registry = ContextRegistry::new();
        let ctx = GpuContext::new(&registry, Box::new(HeadlessDriver::new()));
        assert!(registry.current().is_none());

        registry.set_current(Some(&ctx));
        assert!(registry.is_current(&ctx));
        assert_eq!(registry.current().map(|c| c.id()), Some(ctx.id()));

        drop(ctx);
        assert!(registry.current().is_none());
    }

    #[test]
    fn only_one_context_is_current() {
        let registry = ContextRegistry::new();
        let a = GpuContext::new(&registry, Box::new(HeadlessDriver::new()));
        let b = GpuContext::new(&registry, Box::new(HeadlessDriver::new()));
        assert_ne!(a.id(), b.id());

        registry.set_current(Some(&a));
        registry.set_current(Some(&b));
        assert!(!registry.is_current(&a));
        assert!(registry.is_current(&b));

        registry.set_current(None);
        assert!(!registry.is_current(&b));
    }
}
