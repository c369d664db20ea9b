//! Blit pipelines and bind groups on wgpu.

use engine_shaders::bindings;

use crate::backend::PipelineDesc;
use crate::blit::BlitProgram;

use super::WgpuBackend;

/// A compiled blit pipeline and the bind group layout its program expects.
#[derive(Debug)]
pub struct WgpuPipeline {
    pub(crate) pipeline: wgpu::RenderPipeline,
    pub(crate) bind_group_layout: wgpu::BindGroupLayout,
    pub program: BlitProgram,
}

fn source_binding(program: BlitProgram) -> u32 {
    match program {
        BlitProgram::Color | BlitProgram::ColorUnfilterable => bindings::SRC_COLOR,
        BlitProgram::ColorMultisampled => bindings::SRC_COLOR_MS,
        BlitProgram::Depth => bindings::SRC_DEPTH,
        BlitProgram::DepthMultisampled => bindings::SRC_DEPTH_MS,
        BlitProgram::ColorUint => bindings::SRC_UINT,
        BlitProgram::ColorSint => bindings::SRC_SINT,
        BlitProgram::ColorUintMultisampled => bindings::SRC_UINT_MS,
        BlitProgram::ColorSintMultisampled => bindings::SRC_SINT_MS,
    }
}

fn source_entry(program: BlitProgram) -> wgpu::BindGroupLayoutEntry {
    let (sample_type, multisampled) = match program {
        BlitProgram::Color => (wgpu::TextureSampleType::Float { filterable: true }, false),
        BlitProgram::ColorUnfilterable => {
            (wgpu::TextureSampleType::Float { filterable: false }, false)
        }
        BlitProgram::ColorMultisampled => {
            (wgpu::TextureSampleType::Float { filterable: false }, true)
        }
        BlitProgram::Depth => (wgpu::TextureSampleType::Depth, false),
        BlitProgram::DepthMultisampled => (wgpu::TextureSampleType::Depth, true),
        BlitProgram::ColorUint => (wgpu::TextureSampleType::Uint, false),
        BlitProgram::ColorSint => (wgpu::TextureSampleType::Sint, false),
        BlitProgram::ColorUintMultisampled => (wgpu::TextureSampleType::Uint, true),
        BlitProgram::ColorSintMultisampled => (wgpu::TextureSampleType::Sint, true),
    };
    wgpu::BindGroupLayoutEntry {
        binding: source_binding(program),
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled,
        },
        count: None,
    }
}

fn layout_entries(program: BlitProgram) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = vec![
        source_entry(program),
        wgpu::BindGroupLayoutEntry {
            binding: bindings::PARAMS,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
    ];
    if !program.filters_in_shader() {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: bindings::SAMPLER,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

pub(crate) fn create(device: &wgpu::Device, desc: &PipelineDesc<'_, WgpuBackend>) -> WgpuPipeline {
    let key = desc.key;
    let program = key.program;

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("blit-bgl"),
        entries: &layout_entries(program),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("blit-pipeline-layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let attributes = [
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: key.vertex_layout.position_offset as u64,
            shader_location: 0,
        },
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: key.vertex_layout.uv_offset as u64,
            shader_location: 1,
        },
    ];
    let vertex_buffers = [wgpu::VertexBufferLayout {
        array_stride: key.vertex_layout.stride as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &attributes,
    }];

    let color_targets: Vec<Option<wgpu::ColorTargetState>> = key
        .target
        .color
        .map(|format| wgpu::ColorTargetState {
            format,
            blend: None,
            write_mask: if key.raster.color_write {
                wgpu::ColorWrites::ALL
            } else {
                wgpu::ColorWrites::empty()
            },
        })
        .into_iter()
        .map(Some)
        .collect();

    let depth_stencil = key.target.depth.map(|format| wgpu::DepthStencilState {
        format,
        depth_write_enabled: key.raster.depth_write,
        depth_compare: key
            .raster
            .depth_compare
            .unwrap_or(wgpu::CompareFunction::Always),
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: desc.vertex,
            entry_point: engine_shaders::BLIT_VS_ENTRY,
            buffers: &vertex_buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: desc.fragment,
            entry_point: program.entry_point(),
            targets: &color_targets,
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil,
        multisample: wgpu::MultisampleState {
            count: key.target.samples,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    });

    WgpuPipeline {
        pipeline,
        bind_group_layout,
        program,
    }
}

pub(crate) fn bind_group(
    device: &wgpu::Device,
    pipeline: &WgpuPipeline,
    source: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    uniforms: &wgpu::Buffer,
) -> wgpu::BindGroup {
    let mut entries = vec![
        wgpu::BindGroupEntry {
            binding: source_binding(pipeline.program),
            resource: wgpu::BindingResource::TextureView(source),
        },
        wgpu::BindGroupEntry {
            binding: bindings::PARAMS,
            resource: uniforms.as_entire_binding(),
        },
    ];
    if !pipeline.program.filters_in_shader() {
        entries.push(wgpu::BindGroupEntry {
            binding: bindings::SAMPLER,
            resource: wgpu::BindingResource::Sampler(sampler),
        });
    }
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("blit-bg"),
        layout: &pipeline.bind_group_layout,
        entries: &entries,
    })
}
