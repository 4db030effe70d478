use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use image::{DynamicImage, ImageBuffer, Rgba};
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use aglkit::buffer::VertexAttribArrayBuffer;
use aglkit::context::{ContextRegistry, GpuContext};
use aglkit::coords::{ColorRgba, Rect};
use aglkit::core::{App, AppControl};
use aglkit::device::{BufferUsage, ClearMask, DrawMode, GpuInit, ProgramSource};
use aglkit::logging::{init_logging, LoggingConfig};
use aglkit::shader::ShaderProgram;
use aglkit::texture::{Texture, TextureLoadOptions, TextureLoader};
use aglkit::time::FrameTime;
use aglkit::view::{FrameCallback, RenderSurfaceView};
use aglkit::window::{Runtime, RuntimeConfig, RuntimeCtx};

const SHADER: &str = r#"
struct VsOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var tex: texture_2d<f32>;
@group(0) @binding(1) var samp: sampler;

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) uv: vec2<f32>) -> VsOut {
    var vs: VsOut;
    vs.position = vec4<f32>(position, 1.0);
    vs.uv = uv;
    return vs;
}

@fragment
fn fs_main(frag: VsOut) -> @location(0) vec4<f32> {
    return textureSample(tex, samp, frag.uv);
}
"#;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct SceneVertex {
    position: [f32; 3],
    uv: [f32; 2],
}

const POSITION_OFFSET: u64 = 0;
const UV_OFFSET: u64 = 12;

const TRIANGLES: [SceneVertex; 6] = [
    SceneVertex { position: [-0.5, -0.5, 0.0], uv: [0.0, 1.0] },
    SceneVertex { position: [0.5, -0.5, 0.0], uv: [1.0, 1.0] },
    SceneVertex { position: [-0.5, 0.5, 0.0], uv: [0.0, 0.0] },
    SceneVertex { position: [0.5, -0.5, 0.0], uv: [1.0, 1.0] },
    SceneVertex { position: [0.5, 0.5, 0.0], uv: [1.0, 0.0] },
    SceneVertex { position: [-0.5, 0.5, 0.0], uv: [0.0, 0.0] },
];

/// Procedural stand-in for an image asset: a 300x200 checkerboard, which the
/// loader resamples to 512x256.
fn checkerboard() -> DynamicImage {
    DynamicImage::ImageRgba8(ImageBuffer::from_fn(300, 200, |x, y| {
        if (x / 25 + y / 25) % 2 == 0 {
            Rgba([240, 200, 60, 255])
        } else {
            Rgba([40, 90, 160, 255])
        }
    }))
}

struct Scene {
    context: GpuContext,
    vertices: [SceneVertex; 6],
    buffer: VertexAttribArrayBuffer,
    texture: Texture,
    program: ShaderProgram,
}

#[derive(Default)]
struct BouncingQuad {
    scene: Option<Scene>,
    velocity: [f32; 2],
    offset: [f32; 2],
}

impl BouncingQuad {
    fn new() -> Self {
        Self {
            velocity: [0.6, 0.4],
            ..Self::default()
        }
    }

    fn step(&mut self, dt: f32) {
        for axis in 0..2 {
            self.offset[axis] += self.velocity[axis] * dt;
            if self.offset[axis].abs() > 0.5 {
                self.offset[axis] = self.offset[axis].clamp(-0.5, 0.5);
                self.velocity[axis] = -self.velocity[axis];
            }
        }
    }
}

impl App for BouncingQuad {
    fn init(&mut self, registry: &ContextRegistry, context: &GpuContext) -> Result<()> {
        context.set_clear_color(ColorRgba::new(0.08, 0.08, 0.1, 1.0));

        let buffer =
            VertexAttribArrayBuffer::from_vertices(registry, &TRIANGLES, BufferUsage::DynamicDraw)?;
        let texture = TextureLoader::texture_with_image(
            registry,
            &checkerboard(),
            &TextureLoadOptions::default(),
        )?;
        let program = ShaderProgram::new(
            registry,
            ProgramSource::wgsl(SHADER).with_label("textured quad"),
        )?;

        log::info!(
            "texture {}x{}; space pauses, escape quits",
            texture.info().width,
            texture.info().height
        );

        self.scene = Some(Scene {
            context: context.clone(),
            vertices: TRIANGLES,
            buffer,
            texture,
            program,
        });
        Ok(())
    }

    fn update(&mut self, time: FrameTime, _runtime: &mut RuntimeCtx) {
        self.step(time.dt);
        let offset = self.offset;
        let Some(scene) = self.scene.as_mut() else { return };

        for (moved, base) in scene.vertices.iter_mut().zip(TRIANGLES.iter()) {
            moved.position[0] = base.position[0] + offset[0];
            moved.position[1] = base.position[1] + offset[1];
        }

        scene.context.make_current();
        let stride = std::mem::size_of::<SceneVertex>() as u32;
        let bytes: &[u8] = bytemuck::cast_slice(&scene.vertices);
        if let Err(err) = scene.buffer.reinit(stride, scene.vertices.len() as u32, bytes) {
            log::warn!("vertex upload failed: {err}");
        }
    }

    fn on_window_event(&mut self, event: &WindowEvent, runtime: &mut RuntimeCtx) -> AppControl {
        let WindowEvent::KeyboardInput { event, .. } = event else {
            return AppControl::Continue;
        };
        if event.state != ElementState::Pressed || event.repeat {
            return AppControl::Continue;
        }

        match event.physical_key {
            PhysicalKey::Code(KeyCode::Space) => {
                runtime.set_paused(!runtime.is_paused());
                AppControl::Continue
            }
            PhysicalKey::Code(KeyCode::Escape) => AppControl::Exit,
            _ => AppControl::Continue,
        }
    }
}

impl FrameCallback for BouncingQuad {
    fn draw_in(&mut self, view: &RenderSurfaceView, _rect: Rect) {
        let (Some(scene), Some(context)) = (self.scene.as_ref(), view.context()) else {
            return;
        };

        context.clear(ClearMask::COLOR);
        scene.program.use_program();
        scene.texture.bind(0);
        scene.buffer.prepare_to_draw(0, 3, POSITION_OFFSET, true);
        scene.buffer.prepare_to_draw(1, 2, UV_OFFSET, true);
        scene
            .buffer
            .draw_arrays(DrawMode::Triangles, 0, scene.buffer.vertex_count());
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = RuntimeConfig {
        title: "aglkit demo".to_string(),
        ..RuntimeConfig::default()
    };
    Runtime::run(config, GpuInit::default(), BouncingQuad::new())
}
