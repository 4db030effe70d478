//! Shader program objects.

mod program;

pub use program::ShaderProgram;
