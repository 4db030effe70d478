use std::borrow::Cow;
use std::sync::Arc;

use anyhow::{Context, Result};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::coords::ColorRgba;

use super::driver::{Drawable, Driver, MAX_TEXTURE_UNITS};
use super::pipeline::{self, CompiledProgram, PipelineCache, PipelineKey};
use super::state::{CommandState, Namespace};
use super::surface;
use super::{
    BufferHandle, BufferUsage, ClearMask, DrawMode, DriverError, FramebufferHandle,
    FramebufferStatus, GpuInit, ProgramHandle, ProgramSource, RenderbufferHandle, TextureFilter,
    TextureHandle, TextureTarget, ViewportRect,
};

/// wgpu-backed driver bound to one window surface.
///
/// State calls (binds, uploads, attribute setup) take effect immediately.
/// Clears and draws are recorded for the current frame and replayed into
/// render passes by `present_renderbuffer`, which acquires the surface
/// texture, submits and presents.
///
/// The color renderbuffer is the surface itself: backing it from the drawable
/// reconfigures the swapchain to the drawable's size.
pub struct WgpuDriver {
    /// Surface bound to the window.
    surface: wgpu::Surface<'static>,

    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,

    /// Active surface configuration.
    config: wgpu::SurfaceConfiguration,

    state: CommandState,
    buffers: Namespace<GpuBuffer>,
    textures: Namespace<GpuTexture>,
    programs: Namespace<CompiledProgram>,
    pipelines: PipelineCache,

    /// Bound on texture units nothing was bound to.
    fallback_view: wgpu::TextureView,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,

    /// Clears and draws recorded since the last present.
    frame: Vec<FrameOp>,
}

#[derive(Default)]
struct GpuBuffer {
    buffer: Option<wgpu::Buffer>,
    capacity: u64,
}

#[derive(Default)]
struct GpuTexture {
    image: Option<(wgpu::Texture, wgpu::TextureView)>,
    min_filter: TextureFilter,
}

enum FrameOp {
    Clear(wgpu::Color),
    Draw(DrawOp),
}

struct DrawOp {
    key: PipelineKey,
    vertex_buffers: Vec<BufferHandle>,
    textures: [Option<TextureHandle>; MAX_TEXTURE_UNITS as usize],
    viewport: ViewportRect,
    first: u32,
    count: u32,
}

struct PreparedDraw {
    key: PipelineKey,
    bind_group: wgpu::BindGroup,
    vertex_buffers: Vec<BufferHandle>,
    viewport: ViewportRect,
    first: u32,
    count: u32,
}

enum FrameStep {
    Clear(wgpu::Color),
    Draw(PreparedDraw),
}

impl WgpuDriver {
    /// Creates a driver whose color renderbuffer presents to `window`.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: Arc<Window>, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let GpuInit {
            prefer_srgb,
            present_mode,
            alpha_mode,
            required_features,
            required_limits,
            desired_maximum_frame_latency,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("aglkit device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&surface_caps, prefer_srgb)
            .context("no supported surface formats")?;
        let alpha_mode = surface::choose_alpha_mode(&surface_caps, alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency,
        };

        surface.configure(&device, &config);
        log::debug!("wgpu surface configured: {format:?} {}x{}", size.width, size.height);

        let pipelines = PipelineCache::new(&device, format);
        let fallback_view = white_texture(&device, &queue, texture_format_for(format));
        let linear_sampler = sampler(&device, wgpu::FilterMode::Linear);
        let nearest_sampler = sampler(&device, wgpu::FilterMode::Nearest);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            state: CommandState::new(),
            buffers: Namespace::new(),
            textures: Namespace::new(),
            programs: Namespace::new(),
            pipelines,
            fallback_view,
            linear_sampler,
            nearest_sampler,
            frame: Vec::new(),
        })
    }

    /// Returns the active surface format.
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn sampler_for(&self, filter: TextureFilter) -> &wgpu::Sampler {
        match filter {
            TextureFilter::Linear => &self.linear_sampler,
            TextureFilter::Nearest => &self.nearest_sampler,
        }
    }

    fn texture_bind_group(
        &self,
        units: &[Option<TextureHandle>; MAX_TEXTURE_UNITS as usize],
    ) -> wgpu::BindGroup {
        let bound: Vec<(&wgpu::TextureView, &wgpu::Sampler)> = units
            .iter()
            .map(|unit| {
                unit.and_then(|h| self.textures.get(h.get()))
                    .and_then(|t| t.image.as_ref().map(|(_, view)| (view, t.min_filter)))
                    .map_or((&self.fallback_view, &self.nearest_sampler), |(view, filter)| {
                        (view, self.sampler_for(filter))
                    })
            })
            .collect();

        let entries: Vec<wgpu::BindGroupEntry<'_>> = bound
            .iter()
            .enumerate()
            .flat_map(|(unit, &(view, sampler))| {
                [
                    wgpu::BindGroupEntry {
                        binding: unit as u32 * 2,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: unit as u32 * 2 + 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ]
            })
            .collect();

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("aglkit texture units"),
            layout: self.pipelines.bind_group_layout(),
            entries: &entries,
        })
    }

    fn prepare_draw(&mut self, draw: DrawOp) -> Option<PreparedDraw> {
        let Some(program) = self.programs.get(draw.key.program.get()) else {
            log::warn!("draw skipped: {} was deleted before present", draw.key.program);
            return None;
        };
        self.pipelines.ensure(&self.device, &draw.key, program);
        let bind_group = self.texture_bind_group(&draw.textures);

        Some(PreparedDraw {
            key: draw.key,
            bind_group,
            vertex_buffers: draw.vertex_buffers,
            viewport: draw.viewport,
            first: draw.first,
            count: draw.count,
        })
    }

    /// Encodes `steps` as consecutive render passes; each clear opens a new pass.
    fn encode_steps(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        target_size: (u32, u32),
        steps: &[FrameStep],
    ) {
        let mut rest = steps;
        while !rest.is_empty() {
            let (load, body) = match rest.split_first() {
                Some((FrameStep::Clear(color), tail)) => (wgpu::LoadOp::Clear(*color), tail),
                _ => (wgpu::LoadOp::Load, rest),
            };
            let end = body
                .iter()
                .position(|s| matches!(s, FrameStep::Clear(_)))
                .unwrap_or(body.len());
            let (draws, tail) = body.split_at(end);

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("aglkit frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for step in draws {
                if let FrameStep::Draw(draw) = step {
                    self.encode_draw(&mut rpass, draw, target_size);
                }
            }

            rest = tail;
        }
    }

    fn encode_draw(
        &self,
        rpass: &mut wgpu::RenderPass<'_>,
        draw: &PreparedDraw,
        target_size: (u32, u32),
    ) {
        let Some(pipeline) = self.pipelines.get(&draw.key) else { return };
        let Some((x, y, w, h)) = viewport_in_target(draw.viewport, target_size) else {
            return;
        };

        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &draw.bind_group, &[]);
        for (slot, handle) in draw.vertex_buffers.iter().enumerate() {
            let Some(buffer) = self.buffers.get(handle.get()).and_then(|b| b.buffer.as_ref())
            else {
                log::warn!("draw skipped: {handle} has no data store");
                return;
            };
            rpass.set_vertex_buffer(slot as u32, buffer.slice(..));
        }
        rpass.set_viewport(x, y, w, h, 0.0, 1.0);
        rpass.draw(draw.first..draw.first + draw.count, 0..1);
    }
}

/// Converts a bottom-left-origin viewport into a top-left wgpu viewport
/// clipped to the target. A zero-sized viewport means "whole target".
fn viewport_in_target(
    viewport: ViewportRect,
    (target_w, target_h): (u32, u32),
) -> Option<(f32, f32, f32, f32)> {
    if viewport.width == 0 || viewport.height == 0 {
        return Some((0.0, 0.0, target_w as f32, target_h as f32));
    }

    let (tw, th) = (i64::from(target_w), i64::from(target_h));
    let x0 = i64::from(viewport.x).clamp(0, tw);
    let x1 = (i64::from(viewport.x) + i64::from(viewport.width)).clamp(0, tw);
    let y0 = i64::from(viewport.y).clamp(0, th);
    let y1 = (i64::from(viewport.y) + i64::from(viewport.height)).clamp(0, th);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some((x0 as f32, (th - y1) as f32, (x1 - x0) as f32, (y1 - y0) as f32))
}

/// Pads `data` to wgpu's copy alignment.
fn padded(data: &[u8]) -> Cow<'_, [u8]> {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    let len = data.len().div_ceil(align) * align;
    if len == data.len() {
        return Cow::Borrowed(data);
    }
    let mut owned = data.to_vec();
    owned.resize(len, 0);
    Cow::Owned(owned)
}

fn texture_format_for(surface_format: wgpu::TextureFormat) -> wgpu::TextureFormat {
    if surface_format.is_srgb() {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    }
}

fn sampler(device: &wgpu::Device, min_filter: wgpu::FilterMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("aglkit sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    })
}

fn white_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    format: wgpu::TextureFormat,
) -> wgpu::TextureView {
    let extent = wgpu::Extent3d {
        width: 1,
        height: 1,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("aglkit fallback texture"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    write_rgba(queue, &texture, &[255; 4], 1, 1);
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn write_rgba(queue: &wgpu::Queue, texture: &wgpu::Texture, pixels: &[u8], width: u32, height: u32) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

impl Driver for WgpuDriver {
    fn gen_buffer(&mut self) -> Option<BufferHandle> {
        Some(BufferHandle::from_nonzero(
            self.buffers.alloc(GpuBuffer::default()),
        ))
    }

    fn bind_array_buffer(&mut self, buffer: Option<BufferHandle>) {
        self.state.array_buffer = buffer.filter(|b| self.buffers.contains(b.get()));
    }

    fn buffer_data(&mut self, data: &[u8], usage: BufferUsage) -> Result<(), DriverError> {
        let handle = self
            .state
            .array_buffer
            .ok_or(DriverError::InvalidOperation("no array buffer bound"))?;
        let object = self
            .buffers
            .get_mut(handle.get())
            .ok_or(DriverError::InvalidOperation("bound buffer was deleted"))?;

        let contents = padded(data);
        let len = contents.len() as u64;

        // Static data always gets a fresh store; changing data reuses capacity.
        let reuse = usage != BufferUsage::StaticDraw && object.capacity >= len;
        if let (true, Some(buffer)) = (reuse, object.buffer.as_ref()) {
            self.queue.write_buffer(buffer, 0, &contents);
            return Ok(());
        }

        if let Some(old) = object.buffer.take() {
            old.destroy();
        }
        object.buffer = Some(self.device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("aglkit vertex buffer"),
                contents: &contents,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            },
        ));
        object.capacity = len;
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if let Some(object) = self.buffers.remove(buffer.get()) {
            if let Some(b) = object.buffer {
                b.destroy();
            }
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
        if stride % 4 != 0 || offset % 4 != 0 {
            return Err(DriverError::InvalidValue("stride and offset must be 4-byte aligned"));
        }
        self.state.attrib_pointer(index, components, stride, offset)
    }

    fn set_clear_color(&mut self, color: ColorRgba) {
        self.state.clear_color = color;
    }

    fn clear(&mut self, mask: ClearMask) {
        // Only a color attachment exists; depth/stencil bits have nothing to clear.
        if mask.contains(ClearMask::COLOR) {
            self.frame.push(FrameOp::Clear(self.state.clear_color.into()));
        }
    }

    fn viewport(&mut self, rect: ViewportRect) {
        self.state.viewport = rect;
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) {
        if count == 0 {
            return;
        }
        let Some(program) = self.state.program else {
            log::warn!("draw_arrays without a program in use; skipped");
            return;
        };

        let attribs = self.state.enabled_attribs();
        let (vertex_buffers, buffers) = pipeline::vertex_layouts(&attribs);
        self.frame.push(FrameOp::Draw(DrawOp {
            key: PipelineKey {
                program,
                mode,
                buffers,
            },
            vertex_buffers,
            textures: self.state.texture_units(),
            viewport: self.state.viewport,
            first,
            count,
        }));
    }

    fn gen_texture(&mut self) -> Option<TextureHandle> {
        Some(TextureHandle::from_nonzero(
            self.textures.alloc(GpuTexture::default()),
        ))
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
        if level != 0 {
            return Err(DriverError::InvalidValue("only mip level 0 is supported"));
        }
        if width == 0 || height == 0 {
            return Err(DriverError::InvalidValue("zero texture dimension"));
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(DriverError::InvalidValue("texture exceeds device limits"));
        }
        if pixels.len() as u64 != u64::from(width) * u64::from(height) * 4 {
            return Err(DriverError::InvalidValue("pixel data does not match dimensions"));
        }

        let format = texture_format_for(self.config.format);
        let handle = self
            .state
            .bound_texture()
            .ok_or(DriverError::InvalidOperation("no texture bound"))?;
        let object = self
            .textures
            .get_mut(handle.get())
            .ok_or(DriverError::InvalidOperation("bound texture was deleted"))?;

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("aglkit texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        write_rgba(&self.queue, &texture, pixels, width, height);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        if let Some((old, _)) = object.image.replace((texture, view)) {
            old.destroy();
        }
        Ok(())
    }

    fn tex_min_filter(
        &mut self,
        _target: TextureTarget,
        filter: TextureFilter,
    ) -> Result<(), DriverError> {
        let handle = self
            .state
            .bound_texture()
            .ok_or(DriverError::InvalidOperation("no texture bound"))?;
        if let Some(object) = self.textures.get_mut(handle.get()) {
            object.min_filter = filter;
        }
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if let Some(object) = self.textures.remove(texture.get()) {
            if let Some((t, _)) = object.image {
                t.destroy();
            }
            self.state.texture_deleted(texture);
        }
    }

    fn is_texture(&self, texture: TextureHandle) -> bool {
        self.textures.contains(texture.get())
    }

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle, DriverError> {
        if source.wgsl.trim().is_empty() {
            return Err(DriverError::Shader("empty program source".to_string()));
        }
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: source.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(source.wgsl.clone()),
            });
        let program = CompiledProgram {
            module,
            vertex_entry: source.vertex_entry.to_string(),
            fragment_entry: source.fragment_entry.to_string(),
        };
        Ok(ProgramHandle::from_nonzero(self.programs.alloc(program)))
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.state.program = program.filter(|p| self.programs.contains(p.get()));
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(program.get()).is_some() {
            self.pipelines.evict_program(program);
            self.state.program_deleted(program);
        }
    }

    fn is_program(&self, program: ProgramHandle) -> bool {
        self.programs.contains(program.get())
    }

    fn gen_framebuffer(&mut self) -> Option<FramebufferHandle> {
        Some(self.state.gen_framebuffer())
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.state.bind_framebuffer(framebuffer);
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.state.delete_framebuffer(framebuffer);
    }

    fn is_framebuffer(&self, framebuffer: FramebufferHandle) -> bool {
        self.state.is_framebuffer(framebuffer)
    }

    fn gen_renderbuffer(&mut self) -> Option<RenderbufferHandle> {
        Some(self.state.gen_renderbuffer())
    }

    fn bind_renderbuffer(&mut self, renderbuffer: Option<RenderbufferHandle>) {
        self.state.bind_renderbuffer(renderbuffer);
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        self.state.delete_renderbuffer(renderbuffer);
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
        let size = drawable.drawable_size();
        self.state.set_renderbuffer_storage(size.0, size.1)?;
        surface::apply_drawable_size(&self.surface, &self.device, &mut self.config, size);
        Ok(())
    }

    fn present_renderbuffer(&mut self, _drawable: &dyn Drawable) -> Result<(), DriverError> {
        let ops = std::mem::take(&mut self.frame);
        if self.state.bound_renderbuffer().is_none() {
            return Err(DriverError::InvalidOperation("no renderbuffer bound"));
        }
        let (width, height) = self.state.renderbuffer_size();
        if width == 0 || height == 0 {
            return Err(DriverError::InvalidOperation("renderbuffer has no storage"));
        }

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(err) => {
                let action =
                    surface::map_surface_error(&self.surface, &self.device, &self.config, err);
                return Err(DriverError::Surface(action));
            }
        };
        let target = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let target_size = (surface_texture.texture.width(), surface_texture.texture.height());

        let steps: Vec<FrameStep> = ops
            .into_iter()
            .filter_map(|op| match op {
                FrameOp::Clear(color) => Some(FrameStep::Clear(color)),
                FrameOp::Draw(draw) => self.prepare_draw(draw).map(FrameStep::Draw),
            })
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("aglkit frame encoder"),
            });
        self.encode_steps(&mut encoder, &target, target_size, &steps);

        self.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_viewport_covers_target() {
        assert_eq!(
            viewport_in_target(ViewportRect::default(), (640, 480)),
            Some((0.0, 0.0, 640.0, 480.0))
        );
    }

    #[test]
    fn viewport_flips_to_top_left_and_clips() {
        let vp = ViewportRect {
            x: 10,
            y: 20,
            width: 100,
            height: 50,
        };
        assert_eq!(
            viewport_in_target(vp, (200, 100)),
            Some((10.0, 30.0, 100.0, 50.0))
        );

        let oversized = ViewportRect::from_size(1000, 1000);
        assert_eq!(
            viewport_in_target(oversized, (200, 100)),
            Some((0.0, 0.0, 200.0, 100.0))
        );

        let outside = ViewportRect {
            x: 300,
            y: 0,
            width: 10,
            height: 10,
        };
        assert_eq!(viewport_in_target(outside, (200, 100)), None);
    }

    #[test]
    fn padding_rounds_up_to_copy_alignment() {
        assert_eq!(padded(&[1, 2, 3, 4]).len(), 4);
        assert_eq!(padded(&[1, 2, 3, 4, 5]).as_ref(), &[1, 2, 3, 4, 5, 0, 0, 0]);
    }
}
