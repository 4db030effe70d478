//! Render pipelines for recorded draws, built lazily and cached.
//!
//! A pipeline is identified by the program, the primitive topology and the
//! vertex layout derived from the enabled attribute slots at draw time.

use std::collections::HashMap;

use super::driver::MAX_TEXTURE_UNITS;
use super::state::AttribPointer;
use super::{BufferHandle, DrawMode, ProgramHandle};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct VertexAttribKey {
    pub location: u32,
    pub components: u32,
    pub offset: u64,
}

/// One vertex buffer slot: all enabled attributes reading the same buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct VertexBufferKey {
    pub stride: u32,
    pub attributes: Vec<VertexAttribKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub program: ProgramHandle,
    pub mode: DrawMode,
    pub buffers: Vec<VertexBufferKey>,
}

pub(crate) struct CompiledProgram {
    pub module: wgpu::ShaderModule,
    pub vertex_entry: String,
    pub fragment_entry: String,
}

/// Groups enabled attributes into vertex buffer slots, in first-use order.
///
/// Returns the buffer bound to each slot alongside the slot layouts.
pub(crate) fn vertex_layouts(
    attribs: &[(u32, AttribPointer)],
) -> (Vec<BufferHandle>, Vec<VertexBufferKey>) {
    let mut handles: Vec<BufferHandle> = Vec::new();
    let mut layouts: Vec<VertexBufferKey> = Vec::new();

    for &(location, pointer) in attribs {
        let attr = VertexAttribKey {
            location,
            components: pointer.components,
            offset: pointer.offset,
        };
        let slot = handles
            .iter()
            .zip(&layouts)
            .position(|(h, l)| *h == pointer.buffer && l.stride == pointer.stride);
        match slot {
            Some(i) => layouts[i].attributes.push(attr),
            None => {
                handles.push(pointer.buffer);
                layouts.push(VertexBufferKey {
                    stride: pointer.stride,
                    attributes: vec![attr],
                });
            }
        }
    }

    (handles, layouts)
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

fn premul_alpha_blend() -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
    }
}

pub(crate) struct PipelineCache {
    format: wgpu::TextureFormat,
    bind_group_layout: wgpu::BindGroupLayout,
    layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub(crate) fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..MAX_TEXTURE_UNITS)
            .flat_map(|unit| {
                [
                    wgpu::BindGroupLayoutEntry {
                        binding: unit * 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: unit * 2 + 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ]
            })
            .collect();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("aglkit texture units bgl"),
            entries: &entries,
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("aglkit pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        Self {
            format,
            bind_group_layout,
            layout,
            pipelines: HashMap::new(),
        }
    }

    pub(crate) fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub(crate) fn get(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }

    /// Drops every pipeline built from `program`.
    pub(crate) fn evict_program(&mut self, program: ProgramHandle) {
        self.pipelines.retain(|key, _| key.program != program);
    }

    pub(crate) fn ensure(
        &mut self,
        device: &wgpu::Device,
        key: &PipelineKey,
        program: &CompiledProgram,
    ) {
        if self.pipelines.contains_key(key) {
            return;
        }

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = key
            .buffers
            .iter()
            .map(|buffer| {
                buffer
                    .attributes
                    .iter()
                    .map(|a| wgpu::VertexAttribute {
                        format: vertex_format(a.components),
                        offset: a.offset,
                        shader_location: a.location,
                    })
                    .collect()
            })
            .collect();

        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
            .buffers
            .iter()
            .zip(&attributes)
            .map(|(buffer, attrs)| wgpu::VertexBufferLayout {
                array_stride: u64::from(buffer.stride),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attrs,
            })
            .collect();

        log::debug!(
            "building pipeline for {} ({:?}, {} vertex buffer(s))",
            key.program,
            key.mode,
            buffers.len()
        );

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("aglkit draw pipeline"),
            layout: Some(&self.layout),

            vertex: wgpu::VertexState {
                module: &program.module,
                entry_point: Some(program.vertex_entry.as_str()),
                compilation_options: Default::default(),
                buffers: &buffers,
            },

            fragment: Some(wgpu::FragmentState {
                module: &program.module,
                entry_point: Some(program.fragment_entry.as_str()),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.format,
                    blend: Some(premul_alpha_blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: key.mode.topology(),
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        self.pipelines.insert(key.clone(), pipeline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pointer(buffer: u32, components: u32, stride: u32, offset: u64) -> AttribPointer {
        AttribPointer {
            buffer: BufferHandle::new(buffer).unwrap(),
            components,
            stride,
            offset,
        }
    }

    #[test]
    fn interleaved_attributes_share_a_slot() {
        let attribs = [(0, pointer(1, 3, 20, 0)), (1, pointer(1, 2, 20, 12))];
        let (handles, layouts) = vertex_layouts(&attribs);
        assert_eq!(handles.len(), 1);
        assert_eq!(layouts[0].stride, 20);
        assert_eq!(layouts[0].attributes.len(), 2);
        assert_eq!(layouts[0].attributes[1].offset, 12);
    }

    #[test]
    fn separate_buffers_get_separate_slots() {
        let attribs = [(0, pointer(1, 3, 12, 0)), (1, pointer(2, 2, 8, 0))];
        let (handles, layouts) = vertex_layouts(&attribs);
        assert_eq!(handles.iter().map(|h| h.get()).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(layouts[1].attributes[0].location, 1);
    }

    #[test]
    fn component_counts_map_to_float_formats() {
        assert_eq!(vertex_format(1), wgpu::VertexFormat::Float32);
        assert_eq!(vertex_format(3), wgpu::VertexFormat::Float32x3);
    }
}
