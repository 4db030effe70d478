use std::fmt;

use crate::context::{require_current, ContextRegistry, GpuContext};
use crate::device::{ProgramHandle, ProgramSource};
use crate::error::GpuError;

/// A linked program object; deleted on drop.
pub struct ShaderProgram {
    context: GpuContext,
    name: Option<ProgramHandle>,
}

impl ShaderProgram {
    /// Compiles `source` in the current context.
    #[track_caller]
    pub fn new(registry: &ContextRegistry, source: ProgramSource) -> Result<Self, GpuError> {
        let context = require_current(registry);
        let name = context.with_driver(|driver| driver.create_program(&source))?;
        log::debug!(
            "{name} created ({})",
            source.label.as_deref().unwrap_or("unlabeled")
        );
        Ok(Self {
            context,
            name: Some(name),
        })
    }

    /// Makes this the program used by subsequent draws.
    #[track_caller]
    pub fn use_program(&self) {
        let Some(name) = self.name else {
            panic!("shader program used after release");
        };
        self.context.assert_current();
        self.context.with_driver(|driver| driver.use_program(Some(name)));
    }

    /// Deletes the program. Later calls do nothing.
    pub fn release(&mut self) {
        let Some(name) = self.name.take() else { return };
        if self
            .context
            .try_with_driver(|driver| driver.delete_program(name))
            .is_none()
        {
            log::warn!("{name} released while its driver was busy; name leaked");
        }
    }

    /// Program name; `None` once released.
    pub fn name(&self) -> Option<ProgramHandle> {
        self.name
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderProgram").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::VertexAttribArrayBuffer;
    use crate::device::{BufferUsage, Command, DrawMode, DriverError};

    const SOURCE: &str = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(); }";

    #[test]
    fn draws_record_the_program_in_use() {
        let registry = ContextRegistry::new();
        let (ctx, journal) = GpuContext::headless(&registry);
        ctx.make_current();

        let program = ShaderProgram::new(&registry, ProgramSource::wgsl(SOURCE)).unwrap();
        program.use_program();
        let buffer =
            VertexAttribArrayBuffer::new(&registry, 4, 1, &[0; 4], BufferUsage::StaticDraw)
                .unwrap();
        buffer.draw_arrays(DrawMode::Points, 0, 1);

        assert!(matches!(
            journal.commands().last(),
            Some(Command::DrawArrays { program: Some(p), .. }) if Some(*p) == program.name()
        ));
    }

    #[test]
    fn release_unbinds_and_is_idempotent() {
        let registry = ContextRegistry::new();
        let (ctx, _journal) = GpuContext::headless(&registry);
        ctx.make_current();

        let mut program = ShaderProgram::new(&registry, ProgramSource::wgsl(SOURCE)).unwrap();
        let name = program.name().unwrap();
        program.release();
        program.release();
        assert!(!ctx.with_driver(|d| d.is_program(name)));
    }

    #[test]
    fn empty_source_is_a_shader_error() {
        let registry = ContextRegistry::new();
        let (ctx, _journal) = GpuContext::headless(&registry);
        ctx.make_current();

        let err = ShaderProgram::new(&registry, ProgramSource::wgsl("  ")).unwrap_err();
        assert!(matches!(err, GpuError::Driver(DriverError::Shader(_))));
    }
}
