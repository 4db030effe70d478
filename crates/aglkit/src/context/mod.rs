//! Rendering contexts and the per-thread "current context" registry.
//!
//! Resource wrappers are created "in the current context": they take the
//! registry, look up its current context and keep a handle to it for later
//! calls and release.

mod gpu_context;
mod registry;

pub use gpu_context::{ContextId, GpuContext, WeakGpuContext};
pub use registry::ContextRegistry;

/// Returns the current context of `registry`, panicking when there is none.
#[track_caller]
pub(crate) fn require_current(registry: &ContextRegistry) -> GpuContext {
    match registry.current() {
        Some(ctx) => ctx,
        None => panic!("a current context is required"),
    }
}
