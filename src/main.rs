//! Headless smoke run: renders into an offscreen color + depth target, blits
//! it into a half-size target for a few frames and reads the result back.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Context, Result};
use engine_core::{
    Attachment, BlitFilter, BlitPath, BlitRequest, BlitterOptions, EngineOptions, GraphicsEngine,
    RectPair, RenderTarget, StagePoolOptions, WgpuBackend, wgpu,
};
use rune_config::RuneConfig;
use tracing::{info, warn};

const SOURCE_SIZE: u32 = 512;
const TARGET_SIZE: u32 = 256;
const FRAMES: u64 = 6;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

fn init_logging(config: &RuneConfig) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filter) = &config.logging.filter {
        builder.parse_filters(filter);
    }
    builder.init();
}

fn engine_options(config: &RuneConfig) -> EngineOptions {
    EngineOptions {
        blit: BlitterOptions {
            force_shader_path: config.blit.force_shader_path,
            allow_hardware_scaling: config.blit.allow_hardware_scaling,
        },
        staging: StagePoolOptions {
            min_stage_size: config.staging.min_stage_size,
            max_idle_generations: config.staging.max_idle_generations,
        },
    }
}

fn offscreen(
    backend: &WgpuBackend,
    label: &str,
    format: wgpu::TextureFormat,
    size: u32,
) -> Arc<wgpu::Texture> {
    backend.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    })
}

/// Offscreen target with one color attachment and a depth attachment.
struct Offscreen {
    color: Arc<wgpu::Texture>,
    depth: Arc<wgpu::Texture>,
    target: RenderTarget<WgpuBackend>,
}

impl Offscreen {
    fn new(backend: &WgpuBackend, name: &str, size: u32) -> Self {
        let color = offscreen(backend, &format!("{name}.color"), COLOR_FORMAT, size);
        let depth = offscreen(backend, &format!("{name}.depth"), DEPTH_FORMAT, size);
        let target = RenderTarget::new(size, size)
            .with_color(Attachment::from_texture(color.clone()))
            .with_depth(Attachment::from_texture(depth.clone()));
        Self {
            color,
            depth,
            target,
        }
    }

    fn clear(&self, encoder: &mut wgpu::CommandEncoder, frame: u64) {
        let shade = (frame as f64 + 1.0) / (FRAMES as f64 + 1.0);
        let color_view = self.color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = self.depth.create_view(&wgpu::TextureViewDescriptor::default());
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("smoke.clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: shade,
                        g: 0.25,
                        b: 1.0 - shade,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(0.5),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }
}

fn read_color(device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) -> Vec<u8> {
    let (width, height) = (texture.width(), texture.height());
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("smoke.readback"),
        size: (width * height * 4) as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("smoke.readback"),
    });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
        },
        texture.size(),
    );
    queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    slice.map_async(wgpu::MapMode::Read, |_| {});
    let _ = device.poll(wgpu::Maintain::Wait);
    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();
    data
}

fn main() -> Result<()> {
    let config = RuneConfig::load();
    init_logging(&config);

    let (backend, queue) =
        WgpuBackend::request_headless().context("failed to create a headless device")?;
    let device = backend.device();
    info!(adapter = ?backend.adapter().get_info().name, "smoke run starting");

    let source = Offscreen::new(&backend, "smoke.src", SOURCE_SIZE);
    let dest = Offscreen::new(&backend, "smoke.dst", TARGET_SIZE);

    let engine = GraphicsEngine::new(backend, engine_options(&config));
    let mut blitter = engine.blitter();
    let frames_in_flight = config.disposer.frames_in_flight.max(1) as usize;
    let mut in_flight: VecDeque<(u64, wgpu::SubmissionIndex)> = VecDeque::new();

    let full_src = RectPair::from_extent(SOURCE_SIZE, SOURCE_SIZE);
    let full_dst = RectPair::from_extent(TARGET_SIZE, TARGET_SIZE);
    let mut paths = (BlitPath::Shader, BlitPath::Shader);

    for frame in 0..FRAMES {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("smoke.frame"),
        });
        source.clear(&mut encoder, frame);

        let request = BlitRequest::new(&dest.target, full_dst, &source.target, full_src)
            .with_filter(BlitFilter::Linear);
        let color = blitter.blit_color(&mut encoder, &request)?;
        let depth = blitter.blit_depth(&mut encoder, &request)?;
        paths = (color, depth);

        let submission = queue.submit(Some(encoder.finish()));
        in_flight.push_back((engine.end_frame(), submission));

        while in_flight.len() > frames_in_flight {
            if let Some((generation, submission)) = in_flight.pop_front() {
                let _ = device.poll(wgpu::Maintain::WaitForSubmissionIndex(submission));
                engine.collect(generation);
            }
        }
    }

    let pixels = read_color(&device, &queue, &dest.color);
    if let Some((generation, _)) = in_flight.back() {
        engine.collect(*generation);
    }

    let center = ((TARGET_SIZE / 2 * TARGET_SIZE + TARGET_SIZE / 2) * 4) as usize;
    let texel = &pixels[center..center + 4];
    info!(
        color_path = ?paths.0,
        depth_path = ?paths.1,
        ?texel,
        stats = ?blitter.stats(),
        staging = ?engine.stage_pool().stats(),
        "smoke run finished"
    );
    if texel[3] != 255 {
        warn!(?texel, "destination was not written");
    }

    blitter.shutdown();
    engine.shutdown();
    Ok(())
}
