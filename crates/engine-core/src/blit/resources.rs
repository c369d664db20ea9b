//! Shader modules and geometry retained by a blitter between calls.

use std::sync::atomic::{AtomicU64, Ordering};

use engine_shaders::{FULLSCREEN_TRIANGLE, FullscreenVertex};
use tracing::debug;

use crate::backend::{Backend, BufferDesc, RenderPrimitive, ShaderModuleDesc, VertexLayout};
use crate::error::Result;

static NEXT_SHADER_SET: AtomicU64 = AtomicU64::new(1);

impl RenderPrimitive {
    pub fn fullscreen_triangle() -> Self {
        Self {
            layout: VertexLayout {
                stride: std::mem::size_of::<FullscreenVertex>() as u32,
                position_offset: std::mem::offset_of!(FullscreenVertex, pos) as u32,
                uv_offset: std::mem::offset_of!(FullscreenVertex, uv) as u32,
            },
            vertex_count: FULLSCREEN_TRIANGLE.len() as u32,
            instance_count: 1,
        }
    }
}

pub(crate) struct RetainedResources<B: Backend> {
    pub vertex_shader: B::ShaderModule,
    pub fragment_shader: B::ShaderModule,
    pub geometry: B::Buffer,
    pub primitive: RenderPrimitive,
    /// Distinguishes pipelines built from these modules in the shared cache.
    pub shader_set: u64,
    /// Whether the triangle has been recorded into a command buffer yet.
    pub geometry_uploaded: bool,
}

impl<B: Backend> RetainedResources<B> {
    /// Create all retained objects or none of them.
    pub fn create(backend: &B) -> Result<Self> {
        let vertex_shader = backend.create_shader_module(&ShaderModuleDesc {
            label: "blit-vs",
            source: engine_shaders::BLIT_VERTEX_WGSL,
        })?;
        let fragment_shader = match backend.create_shader_module(&ShaderModuleDesc {
            label: "blit-fs",
            source: engine_shaders::BLIT_FRAGMENT_WGSL,
        }) {
            Ok(module) => module,
            Err(err) => {
                backend.destroy_shader_module(vertex_shader);
                return Err(err);
            }
        };
        let geometry = match backend.create_buffer(&BufferDesc {
            label: "blit-triangle",
            size: std::mem::size_of_val(&FULLSCREEN_TRIANGLE) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        }) {
            Ok(buffer) => buffer,
            Err(err) => {
                backend.destroy_shader_module(vertex_shader);
                backend.destroy_shader_module(fragment_shader);
                return Err(err);
            }
        };

        let shader_set = NEXT_SHADER_SET.fetch_add(1, Ordering::Relaxed);
        debug!(shader_set, "blit resources initialized");
        Ok(Self {
            vertex_shader,
            fragment_shader,
            geometry,
            primitive: RenderPrimitive::fullscreen_triangle(),
            shader_set,
            geometry_uploaded: false,
        })
    }

    pub fn destroy(self, backend: &B) {
        backend.destroy_shader_module(self.vertex_shader);
        backend.destroy_shader_module(self.fragment_shader);
        backend.destroy_buffer(self.geometry);
    }
}
