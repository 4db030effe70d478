use std::fmt;

use crate::context::{require_current, ContextRegistry, GpuContext};
use crate::device::{BufferHandle, BufferUsage, DrawMode};
use crate::error::GpuError;

/// A draw range that reaches past the uploaded vertex data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DrawRangeError {
    pub first: u32,
    pub count: u32,
    pub vertex_count: u32,
}

impl fmt::Display for DrawRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = u64::from(self.first) + u64::from(self.count);
        write!(
            f,
            "attempt to draw vertices {}..{end} from a buffer of {} vertices",
            self.first, self.vertex_count
        )
    }
}

impl std::error::Error for DrawRangeError {}

/// One GPU vertex buffer plus the record stride its data was uploaded with.
///
/// Created in the registry's current context and bound to it for life.
/// Attribute layout is the caller's business: `prepare_to_draw` is called once
/// per attribute with caller-computed offsets.
///
/// The buffer name is deleted exactly once, on [`release`](Self::release) or
/// drop, whichever comes first.
pub struct VertexAttribArrayBuffer {
    context: GpuContext,
    name: Option<BufferHandle>,
    stride: u32,
    vertex_count: u32,
    size_bytes: u64,
}

fn checked_size(stride: u32, vertex_count: u32, data: &[u8]) -> usize {
    assert!(stride > 0, "vertex stride must be positive");
    assert!(vertex_count > 0, "vertex count must be positive");
    let size = u64::from(stride) * u64::from(vertex_count);
    assert!(
        data.len() as u64 >= size,
        "vertex data holds {} bytes, {size} required",
        data.len()
    );
    size as usize
}

impl VertexAttribArrayBuffer {
    /// Creates a buffer in the current context and uploads
    /// `stride * vertex_count` bytes of `data` under `usage`.
    ///
    /// The new buffer is left bound as the array buffer.
    ///
    /// # Panics
    ///
    /// When `stride` or `vertex_count` is zero, when `data` is too short, or
    /// when `registry` has no current context.
    #[track_caller]
    pub fn new(
        registry: &ContextRegistry,
        stride: u32,
        vertex_count: u32,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<Self, GpuError> {
        let size = checked_size(stride, vertex_count, data);
        let context = require_current(registry);

        let name = context.with_driver(|driver| {
            let name = driver
                .gen_buffer()
                .ok_or(GpuError::OutOfResources("buffer"))?;
            driver.bind_array_buffer(Some(name));
            if let Err(err) = driver.buffer_data(&data[..size], usage) {
                driver.delete_buffer(name);
                return Err(GpuError::from(err));
            }
            Ok(name)
        })?;

        log::debug!("{name} created: {vertex_count} x {stride} bytes ({usage:?})");

        Ok(Self {
            context,
            name: Some(name),
            stride,
            vertex_count,
            size_bytes: size as u64,
        })
    }

    /// Creates a buffer holding `vertices`, one record per element.
    #[track_caller]
    pub fn from_vertices<T: bytemuck::Pod>(
        registry: &ContextRegistry,
        vertices: &[T],
        usage: BufferUsage,
    ) -> Result<Self, GpuError> {
        let stride = u32::try_from(std::mem::size_of::<T>())
            .unwrap_or_else(|_| panic!("vertex record too large"));
        let count = u32::try_from(vertices.len())
            .unwrap_or_else(|_| panic!("too many vertices for one buffer"));
        Self::new(registry, stride, count, bytemuck::cast_slice(vertices), usage)
    }

    /// Re-uploads into the existing buffer name under [`BufferUsage::DynamicDraw`].
    ///
    /// Stride and vertex count are replaced only when the upload succeeds.
    #[track_caller]
    pub fn reinit(&mut self, stride: u32, vertex_count: u32, data: &[u8]) -> Result<(), GpuError> {
        let size = checked_size(stride, vertex_count, data);
        let name = self.require_name();
        self.context.assert_current();

        self.context.with_driver(|driver| {
            driver.bind_array_buffer(Some(name));
            driver.buffer_data(&data[..size], BufferUsage::DynamicDraw)
        })?;

        self.stride = stride;
        self.vertex_count = vertex_count;
        self.size_bytes = size as u64;
        log::trace!("{name} reinitialized: {vertex_count} x {stride} bytes");
        Ok(())
    }

    /// Binds the buffer and points attribute `attrib` at `components` packed
    /// `f32`s located `offset` bytes into every record.
    ///
    /// Attribute state is global to the context, not stored per buffer: call
    /// this for every attribute the next draw reads.
    ///
    /// # Panics
    ///
    /// Unless `0 < components < 4`, the buffer is unreleased and its context
    /// is current. A driver rejection is also a panic.
    #[track_caller]
    pub fn prepare_to_draw(&self, attrib: u32, components: u32, offset: u64, should_enable: bool) {
        assert!(
            components > 0 && components < 4,
            "attribute component count must be 1, 2 or 3, got {components}"
        );
        let name = self.require_name();
        self.context.assert_current();

        let result = self.context.with_driver(|driver| {
            driver.bind_array_buffer(Some(name));
            if should_enable {
                driver.enable_vertex_attrib_array(attrib)?;
            }
            driver.vertex_attrib_pointer(attrib, components, self.stride, offset)
        });
        if let Err(err) = result {
            panic!("failed to configure attribute {attrib} of {name}: {err}");
        }
    }

    /// Checks that `[first, first + count)` lies within the uploaded records.
    pub fn validate_draw_range(&self, first: u32, count: u32) -> Result<(), DrawRangeError> {
        let needed = first
            .checked_add(count)
            .map(|end| u64::from(end) * u64::from(self.stride));
        match needed {
            Some(bytes) if bytes <= self.size_bytes => Ok(()),
            _ => Err(DrawRangeError {
                first,
                count,
                vertex_count: self.vertex_count,
            }),
        }
    }

    /// Draws `count` vertices starting at record `first`.
    ///
    /// # Panics
    ///
    /// When the range reaches past the uploaded data or the context is not
    /// current.
    #[track_caller]
    pub fn draw_arrays(&self, mode: DrawMode, first: u32, count: u32) {
        self.context.assert_current();
        if let Err(err) = self.validate_draw_range(first, count) {
            panic!("{err}");
        }
        self.context
            .with_driver(|driver| driver.draw_arrays(mode, first, count));
    }

    /// Deletes the buffer name. Later calls do nothing.
    pub fn release(&mut self) {
        let Some(name) = self.name.take() else { return };
        if self
            .context
            .try_with_driver(|driver| driver.delete_buffer(name))
            .is_none()
        {
            log::warn!("{name} released while its driver was busy; name leaked");
            return;
        }
        log::trace!("{name} released");
    }

    /// Buffer name; `None` once released.
    pub fn name(&self) -> Option<BufferHandle> {
        self.name
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Size of the most recent upload.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    #[track_caller]
    fn require_name(&self) -> BufferHandle {
        match self.name {
            Some(name) => name,
            None => panic!("vertex buffer used after release"),
        }
    }
}

impl Drop for VertexAttribArrayBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for VertexAttribArrayBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexAttribArrayBuffer")
            .field("name", &self.name)
            .field("stride", &self.stride)
            .field("vertex_count", &self.vertex_count)
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AttribPointer, Command, HeadlessDriver, Journal};

    const TRIANGLE: [[f32; 3]; 3] = [[-0.5, -0.5, 0.0], [0.5, -0.5, 0.0], [-0.5, 0.5, 0.0]];

    fn current() -> (ContextRegistry, GpuContext, crate::device::Journal) {
        let registry = ContextRegistry::new();
        let (ctx, journal) = GpuContext::headless(&registry);
        ctx.make_current();
        (registry, ctx, journal)
    }

    #[test]
    fn triangle_prepares_and_draws() {
        let (registry, _ctx, journal) = current();
        let buffer =
            VertexAttribArrayBuffer::from_vertices(&registry, &TRIANGLE, BufferUsage::StaticDraw)
                .unwrap();
        assert_eq!(buffer.stride(), 12);
        assert_eq!(buffer.size_bytes(), 36);

        buffer.prepare_to_draw(0, 3, 0, true);
        buffer.draw_arrays(DrawMode::Triangles, 0, 3);

        let name = buffer.name().unwrap();
        let draw = journal.commands().into_iter().last();
        assert_eq!(
            draw,
            Some(Command::DrawArrays {
                mode: DrawMode::Triangles,
                first: 0,
                count: 3,
                attribs: vec![(
                    0,
                    AttribPointer {
                        buffer: name,
                        components: 3,
                        stride: 12,
                        offset: 0,
                    }
                )],
                program: None,
                textures: [None, None],
            })
        );
    }

    #[test]
    fn size_is_stride_times_count() {
        let (registry, _ctx, journal) = current();
        let data = vec![0u8; 20 * 7];
        let buffer =
            VertexAttribArrayBuffer::new(&registry, 20, 7, &data, BufferUsage::StreamDraw).unwrap();
        assert_eq!(buffer.size_bytes(), 140);
        assert!(matches!(
            journal.commands().first(),
            Some(Command::BufferData { len: 140, usage: BufferUsage::StreamDraw, .. })
        ));
    }

    #[test]
    fn only_the_required_prefix_is_uploaded() {
        let (registry, _ctx, journal) = current();
        let data = [1u8; 16];
        let _buffer =
            VertexAttribArrayBuffer::new(&registry, 4, 3, &data, BufferUsage::StaticDraw).unwrap();
        assert!(matches!(
            journal.commands().first(),
            Some(Command::BufferData { len: 12, .. })
        ));
    }

    #[test]
    fn release_twice_is_a_noop() {
        let (registry, ctx, _journal) = current();
        let mut buffer =
            VertexAttribArrayBuffer::from_vertices(&registry, &TRIANGLE, BufferUsage::StaticDraw)
                .unwrap();
        let name = buffer.name().unwrap();

        buffer.release();
        assert!(buffer.name().is_none());
        assert!(!ctx.with_driver(|d| d.is_buffer(name)));

        buffer.release();
        drop(buffer);
        assert!(!ctx.with_driver(|d| d.is_buffer(name)));
    }

    #[test]
    fn drop_releases_the_name() {
        let (registry, ctx, _journal) = current();
        let buffer =
            VertexAttribArrayBuffer::from_vertices(&registry, &TRIANGLE, BufferUsage::StaticDraw)
                .unwrap();
        let name = buffer.name().unwrap();
        drop(buffer);
        assert!(!ctx.with_driver(|d| d.is_buffer(name)));
    }

    #[test]
    fn every_overrun_is_rejected() {
        let (registry, _ctx, _journal) = current();
        let buffer =
            VertexAttribArrayBuffer::new(&registry, 8, 4, &[0; 32], BufferUsage::StaticDraw)
                .unwrap();

        for first in 0..10 {
            for count in 0..10 {
                let fits = first + count <= 4;
                assert_eq!(
                    buffer.validate_draw_range(first, count).is_ok(),
                    fits,
                    "first={first} count={count}"
                );
            }
        }
        assert!(buffer.validate_draw_range(u32::MAX, 2).is_err());
    }

    #[test]
    #[should_panic(expected = "attempt to draw")]
    fn overrun_draw_panics() {
        let (registry, _ctx, _journal) = current();
        let buffer =
            VertexAttribArrayBuffer::from_vertices(&registry, &TRIANGLE, BufferUsage::StaticDraw)
                .unwrap();
        buffer.draw_arrays(DrawMode::Triangles, 1, 3);
    }

    #[test]
    fn reinit_keeps_the_name_and_resizes() {
        let (registry, _ctx, journal) = current();
        let mut buffer =
            VertexAttribArrayBuffer::from_vertices(&registry, &TRIANGLE, BufferUsage::StaticDraw)
                .unwrap();
        let name = buffer.name();

        buffer.reinit(8, 6, &[0; 48]).unwrap();
        assert_eq!(buffer.name(), name);
        assert_eq!(buffer.size_bytes(), 48);
        assert_eq!(buffer.vertex_count(), 6);
        assert_eq!(journal.buffers_generated(), 1);
        assert!(matches!(
            journal.commands().last(),
            Some(Command::BufferData { usage: BufferUsage::DynamicDraw, .. })
        ));
        assert!(buffer.validate_draw_range(0, 6).is_ok());
    }

    #[test]
    fn per_frame_reinit_keeps_the_journal_bounded() {
        let registry = ContextRegistry::new();
        let journal = Journal::with_capacity(16);
        let driver = HeadlessDriver::new().with_journal(journal.clone());
        let ctx = GpuContext::new(&registry, Box::new(driver));
        ctx.make_current();

        let frame = vec![0u8; 64 * 1024];
        let mut buffer =
            VertexAttribArrayBuffer::new(&registry, 16, 4096, &frame, BufferUsage::DynamicDraw)
                .unwrap();
        for _ in 0..2000 {
            buffer.reinit(16, 4096, &frame).unwrap();
        }

        assert_eq!(journal.commands().len(), 16);
        assert_eq!(journal.dropped(), 2001 - 16);
        assert!(matches!(
            journal.commands().last(),
            Some(Command::BufferData { len: 65536, .. })
        ));
    }

    #[test]
    fn null_name_is_out_of_resources() {
        let registry = ContextRegistry::new();
        let ctx = GpuContext::new(&registry, Box::new(HeadlessDriver::new().with_object_limit(0)));
        ctx.make_current();
        let err = VertexAttribArrayBuffer::from_vertices(&registry, &TRIANGLE, BufferUsage::StaticDraw)
            .unwrap_err();
        assert_eq!(err, GpuError::OutOfResources("buffer"));
    }

    #[test]
    #[should_panic(expected = "current context")]
    fn creation_requires_current_context() {
        let registry = ContextRegistry::new();
        let _ = VertexAttribArrayBuffer::from_vertices(&registry, &TRIANGLE, BufferUsage::StaticDraw);
    }

    #[test]
    #[should_panic(expected = "component count")]
    fn four_components_are_rejected() {
        let (registry, _ctx, _journal) = current();
        let buffer =
            VertexAttribArrayBuffer::new(&registry, 16, 1, &[0; 16], BufferUsage::StaticDraw)
                .unwrap();
        buffer.prepare_to_draw(0, 4, 0, true);
    }

    #[test]
    #[should_panic(expected = "after release")]
    fn drawing_after_release_panics() {
        let (registry, _ctx, _journal) = current();
        let mut buffer =
            VertexAttribArrayBuffer::from_vertices(&registry, &TRIANGLE, BufferUsage::StaticDraw)
                .unwrap();
        buffer.release();
        buffer.prepare_to_draw(0, 3, 0, true);
    }
}
