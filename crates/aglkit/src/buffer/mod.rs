//! Vertex buffer objects.

mod vertex_attrib;

pub use vertex_attrib::{DrawRangeError, VertexAttribArrayBuffer};
