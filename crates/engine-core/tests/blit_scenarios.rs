use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::Result;
use engine_core::blit::BlitProgram;
use engine_core::cache::RasterState;
use engine_core::format::FormatCaps;
use engine_core::recording::{
    FormatSupport, RecordedCommand, RecordingBackend, RecordingCommandBuffer,
};
use engine_core::{
    Attachment, BlitFilter, BlitPath, BlitRequest, BlitterOptions, EngineOptions, GraphicsEngine,
    Offset3d, RectPair, RenderTarget, wgpu,
};

const RGBA: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

fn engine(support: FormatSupport) -> GraphicsEngine<RecordingBackend> {
    GraphicsEngine::new(RecordingBackend::new(support), EngineOptions::default())
}

fn color(engine: &GraphicsEngine<RecordingBackend>, size: u32) -> RenderTarget<RecordingBackend> {
    let texture = engine.backend().create_texture("color");
    RenderTarget::new(size, size).with_color(Attachment::new(texture, RGBA, size, size))
}

fn depth(engine: &GraphicsEngine<RecordingBackend>, size: u32) -> RenderTarget<RecordingBackend> {
    let texture = engine.backend().create_texture("depth");
    RenderTarget::new(size, size).with_depth(Attachment::new(texture, DEPTH, size, size))
}

fn full(size: u32) -> RectPair {
    RectPair::from_extent(size, size)
}

#[test]
fn hardware_scaled_color_blit_takes_fast_path() -> Result<()> {
    let engine = engine(FormatSupport::hardware_blit());
    let src = color(&engine, 256);
    let dst = color(&engine, 128);
    let mut blitter = engine.blitter();
    let mut cmd = RecordingCommandBuffer::default();

    let request =
        BlitRequest::new(&dst, full(128), &src, full(256)).with_filter(BlitFilter::Linear);
    let path = blitter.blit_color(&mut cmd, &request)?;

    assert_eq!(path, BlitPath::Scale);
    match cmd.commands.as_slice() {
        [RecordedCommand::BlitTexture { filter, src_rect, dst_rect, .. }] => {
            assert_eq!(*filter, BlitFilter::Linear);
            assert_eq!(*src_rect, full(256));
            assert_eq!(*dst_rect, full(128));
        }
        other => panic!("expected a single scaled blit, got {other:?}"),
    }
    assert_eq!(engine.pipeline_cache().stats().lookups(), 0);
    assert_eq!(engine.sampler_cache().stats().lookups(), 0);
    assert!(!blitter.is_initialized());
    blitter.shutdown();
    Ok(())
}

#[test]
fn scaled_depth_blit_draws_depth_only_pass() -> Result<()> {
    let engine = engine(FormatSupport::hardware_blit());
    let src = depth(&engine, 512);
    let dst = depth(&engine, 256);
    let mut blitter = engine.blitter();
    let mut cmd = RecordingCommandBuffer::default();

    let request =
        BlitRequest::new(&dst, full(256), &src, full(512)).with_filter(BlitFilter::Linear);
    assert_eq!(blitter.blit_depth(&mut cmd, &request)?, BlitPath::Shader);

    assert_eq!(cmd.texture_operations(), 1);
    let draws: Vec<_> = cmd.draws().collect();
    assert_eq!(draws.len(), 1);
    let draw = draws[0];
    assert_eq!(draw.program, BlitProgram::Depth);
    assert_eq!(draw.pipeline.raster, RasterState::DEPTH_ONLY);
    assert_eq!(draw.pipeline.target.depth, Some(DEPTH));
    assert_eq!(draw.pipeline.target.color, None);
    assert_eq!((draw.vertex_count, draw.instance_count), (3, 1));
    assert_eq!(draw.viewport.width, 256);
    assert_eq!(engine.sampler_cache().stats().lookups(), 1);
    // shader filtering reads texels directly
    assert_eq!(draw.sampler.filter, BlitFilter::Nearest);
    let uniforms = draw.uniforms.expect("uniforms uploaded before the draw");
    assert_eq!(uniforms.src_max, [512.0, 512.0]);
    assert_eq!(uniforms.filter_mode, 1);
    blitter.shutdown();
    Ok(())
}

#[test]
fn every_valid_blit_records_one_texture_operation() -> Result<()> {
    let engine = engine(FormatSupport::copy_only());
    let src = color(&engine, 64);
    let dst = color(&engine, 64);
    let small = color(&engine, 16);
    let src_depth = depth(&engine, 64);
    let dst_depth = depth(&engine, 64);
    let mut blitter = engine.blitter();

    let requests = [
        BlitRequest::new(&dst, full(64), &src, full(64)),
        BlitRequest::new(&small, full(16), &src, full(64)).with_filter(BlitFilter::Linear),
        BlitRequest::new(&dst, RectPair::from_xywh(8, 8, 16, 16), &src, full(64)),
    ];
    for request in &requests {
        let mut cmd = RecordingCommandBuffer::default();
        blitter.blit_color(&mut cmd, request)?;
        assert_eq!(cmd.texture_operations(), 1);
    }

    let mut cmd = RecordingCommandBuffer::default();
    let request = BlitRequest::new(&dst_depth, full(64), &src_depth, full(64));
    assert_eq!(blitter.blit_depth(&mut cmd, &request)?, BlitPath::Copy);
    assert_eq!(cmd.texture_operations(), 1);

    let stats = blitter.stats();
    assert_eq!((stats.fast, stats.slow), (2, 2));
    blitter.shutdown();
    Ok(())
}

#[test]
fn lazy_initialization_happens_once() -> Result<()> {
    let engine = engine(FormatSupport::copy_only());
    let src = color(&engine, 64);
    let dst = color(&engine, 32);
    let mut blitter = engine.blitter();
    let mut cmd = RecordingCommandBuffer::default();

    for _ in 0..5 {
        let request = BlitRequest::new(&dst, full(32), &src, full(64));
        assert_eq!(blitter.blit_color(&mut cmd, &request)?, BlitPath::Shader);
    }

    let stats = engine.backend().object_stats();
    assert_eq!(stats.shader_modules_created, 2);
    assert_eq!(blitter.stats().initializations, 1);
    assert_eq!(engine.pipeline_cache().stats().misses, 1);
    assert_eq!(engine.pipeline_cache().stats().hits, 4);

    // the triangle is uploaded once, then one uniform upload per blit
    let buffer_copies = cmd
        .commands
        .iter()
        .filter(|c| matches!(c, RecordedCommand::CopyBuffer { .. }))
        .count();
    assert_eq!(buffer_copies, 6);
    blitter.shutdown();
    Ok(())
}

#[test]
fn degenerate_rectangle_records_nothing() {
    let engine = engine(FormatSupport::hardware_blit());
    let src = color(&engine, 64);
    let dst = color(&engine, 64);
    let mut blitter = engine.blitter();
    let mut cmd = RecordingCommandBuffer::default();

    let request = BlitRequest::new(&dst, RectPair::from_xywh(0, 0, 0, 8), &src, full(64));
    let result = catch_unwind(AssertUnwindSafe(|| blitter.blit_color(&mut cmd, &request)));
    assert!(result.is_err());
    assert!(cmd.commands.is_empty());
    assert!(!blitter.is_initialized());
    blitter.shutdown();
}

#[test]
fn shutdown_is_idempotent() -> Result<()> {
    let engine = engine(FormatSupport::copy_only());
    let src = color(&engine, 64);
    let dst = color(&engine, 32);
    let mut blitter = engine.blitter();
    let mut cmd = RecordingCommandBuffer::default();
    blitter.blit_color(&mut cmd, &BlitRequest::new(&dst, full(32), &src, full(64)))?;

    blitter.shutdown();
    blitter.shutdown();
    let stats = engine.backend().object_stats();
    assert_eq!(stats.shader_modules_destroyed, 2);
    assert!(blitter.is_shut_down());
    assert!(!blitter.is_initialized());
    Ok(())
}

#[test]
fn shutdown_without_use_destroys_nothing() {
    let engine = engine(FormatSupport::copy_only());
    let mut blitter = engine.blitter();
    blitter.shutdown();
    assert_eq!(engine.backend().object_stats().shader_modules_destroyed, 0);
}

#[test]
#[should_panic(expected = "blit after Blitter::shutdown")]
fn blit_after_shutdown_panics() {
    let engine = engine(FormatSupport::copy_only());
    let src = color(&engine, 8);
    let dst = color(&engine, 8);
    let mut blitter = engine.blitter();
    blitter.shutdown();
    let mut cmd = RecordingCommandBuffer::default();
    let _ = blitter.blit_color(&mut cmd, &BlitRequest::new(&dst, full(8), &src, full(8)));
}

#[test]
#[should_panic(expected = "no color attachment 2")]
fn missing_target_index_panics() {
    let engine = engine(FormatSupport::copy_only());
    let src = color(&engine, 8);
    let dst = color(&engine, 8);
    let mut blitter = engine.blitter();
    let mut cmd = RecordingCommandBuffer::default();
    let request = BlitRequest::new(&dst, full(8), &src, full(8)).with_target_index(2);
    let _ = blitter.blit_color(&mut cmd, &request);
}

#[test]
#[should_panic(expected = "exceeds attachment extent")]
fn out_of_bounds_rectangle_panics() {
    let engine = engine(FormatSupport::copy_only());
    let src = color(&engine, 8);
    let dst = color(&engine, 8);
    let mut blitter = engine.blitter();
    let mut cmd = RecordingCommandBuffer::default();
    let request = BlitRequest::new(&dst, full(8), &src, RectPair::from_xywh(4, 4, 8, 8));
    let _ = blitter.blit_color(&mut cmd, &request);
}

#[test]
fn target_index_selects_color_attachment() -> Result<()> {
    let engine = engine(FormatSupport::copy_only());
    let backend = engine.backend();
    let mut src = RenderTarget::new(32, 32);
    let mut dst = RenderTarget::new(32, 32);
    for i in 0..4 {
        let s = backend.create_texture(&format!("src{i}"));
        let d = backend.create_texture(&format!("dst{i}"));
        src = src.with_color(Attachment::new(s, RGBA, 32, 32));
        dst = dst.with_color(Attachment::new(d, RGBA, 32, 32));
    }
    let mut blitter = engine.blitter();
    let mut cmd = RecordingCommandBuffer::default();
    let request = BlitRequest::new(&dst, full(32), &src, full(32)).with_target_index(3);
    blitter.blit_color(&mut cmd, &request)?;

    let expected_src = src.color(3).map(|a| a.texture.id);
    let expected_dst = dst.color(3).map(|a| a.texture.id);
    match cmd.commands.as_slice() {
        [RecordedCommand::CopyTexture { src, dst, .. }] => {
            assert_eq!(Some(src.texture), expected_src);
            assert_eq!(Some(dst.texture), expected_dst);
        }
        other => panic!("expected one copy, got {other:?}"),
    }
    blitter.shutdown();
    Ok(())
}

#[test]
fn copy_addresses_level_and_layer() -> Result<()> {
    let engine = engine(FormatSupport::copy_only());
    let backend = engine.backend();
    let src = RenderTarget::new(64, 64).with_color(
        Attachment::new(backend.create_texture("src"), RGBA, 64, 64)
            .with_level(2, 64, 64)
            .with_layer(3),
    );
    let dst = RenderTarget::new(16, 16)
        .with_color(Attachment::new(backend.create_texture("dst"), RGBA, 16, 16).with_layer(1));
    let mut blitter = engine.blitter();
    let mut cmd = RecordingCommandBuffer::default();
    let request = BlitRequest::new(
        &dst,
        RectPair::from_xywh(2, 2, 8, 8),
        &src,
        RectPair::from_xywh(4, 4, 8, 8),
    );
    assert_eq!(blitter.blit_color(&mut cmd, &request)?, BlitPath::Copy);

    match cmd.commands.as_slice() {
        [RecordedCommand::CopyTexture { src, src_origin, dst, dst_origin, extent }] => {
            assert_eq!((src.level, src.layer), (2, 3));
            assert_eq!(*src_origin, [4, 4, 3]);
            assert_eq!((dst.level, dst.layer), (0, 1));
            assert_eq!(*dst_origin, [2, 2, 1]);
            assert_eq!(*extent, [8, 8, 1]);
        }
        other => panic!("expected one copy, got {other:?}"),
    }
    blitter.shutdown();
    Ok(())
}

#[test]
fn mirrored_copy_falls_back_to_shader() -> Result<()> {
    let engine = engine(FormatSupport::copy_only());
    let src = color(&engine, 32);
    let dst = color(&engine, 32);
    let mut blitter = engine.blitter();
    let mut cmd = RecordingCommandBuffer::default();

    let flipped = RectPair::new(Offset3d::new(0, 32, 0), Offset3d::new(32, 0, 1));
    let request = BlitRequest::new(&dst, flipped, &src, full(32));
    assert_eq!(blitter.blit_color(&mut cmd, &request)?, BlitPath::Shader);

    let draw = cmd.draws().next().expect("one draw");
    let uniforms = draw.uniforms.expect("uniforms");
    assert_eq!(uniforms.src_min, [0.0, 32.0]);
    assert_eq!(uniforms.src_max, [32.0, 0.0]);
    assert_eq!(draw.viewport.y, 0);
    assert_eq!(draw.viewport.height, 32);
    blitter.shutdown();
    Ok(())
}

#[test]
fn multisampled_color_resolves_in_hardware() -> Result<()> {
    let engine = engine(FormatSupport::copy_only());
    let backend = engine.backend();
    let src = RenderTarget::new(64, 64)
        .with_color(Attachment::new(backend.create_texture("msaa"), RGBA, 64, 64).with_samples(4));
    let dst = color(&engine, 64);
    let half = color(&engine, 32);
    let mut blitter = engine.blitter();

    let mut cmd = RecordingCommandBuffer::default();
    let request = BlitRequest::new(&dst, full(64), &src, full(64));
    assert_eq!(blitter.blit_color(&mut cmd, &request)?, BlitPath::Resolve);
    assert!(matches!(
        cmd.commands.as_slice(),
        [RecordedCommand::ResolveTexture { .. }]
    ));

    let mut cmd = RecordingCommandBuffer::default();
    let request = BlitRequest::new(&half, full(32), &src, full(64));
    assert_eq!(blitter.blit_color(&mut cmd, &request)?, BlitPath::Shader);
    let draw = cmd.draws().next().expect("one draw");
    assert_eq!(draw.program, BlitProgram::ColorMultisampled);
    assert_eq!(draw.uniforms.map(|u| u.sample_count), Some(4));
    blitter.shutdown();
    Ok(())
}

#[test]
fn unfilterable_source_uses_shader_filtering() -> Result<()> {
    let support = FormatSupport::copy_only().with_override(
        wgpu::TextureFormat::Rgba32Float,
        FormatCaps {
            copy_src: true,
            copy_dst: true,
            sampled: true,
            renderable: true,
            ..Default::default()
        },
    );
    let engine = engine(support);
    let backend = engine.backend();
    let format = wgpu::TextureFormat::Rgba32Float;
    let src = RenderTarget::new(64, 64)
        .with_color(Attachment::new(backend.create_texture("hdr"), format, 64, 64));
    let dst = RenderTarget::new(32, 32)
        .with_color(Attachment::new(backend.create_texture("hdr-half"), format, 32, 32));
    let mut blitter = engine.blitter();
    let mut cmd = RecordingCommandBuffer::default();
    let request =
        BlitRequest::new(&dst, full(32), &src, full(64)).with_filter(BlitFilter::Linear);
    blitter.blit_color(&mut cmd, &request)?;

    let draw = cmd.draws().next().expect("one draw");
    assert_eq!(draw.program, BlitProgram::ColorUnfilterable);
    assert_eq!(draw.sampler.filter, BlitFilter::Nearest);
    assert_eq!(draw.uniforms.map(|u| u.filter_mode), Some(1));
    blitter.shutdown();
    Ok(())
}

#[test]
fn pipeline_failure_is_reported_and_recoverable() -> Result<()> {
    let engine = engine(FormatSupport::copy_only());
    let src = color(&engine, 64);
    let dst = color(&engine, 32);
    let mut blitter = engine.blitter();
    let request = BlitRequest::new(&dst, full(32), &src, full(64));

    engine.backend().fail_pipelines(true);
    let mut cmd = RecordingCommandBuffer::default();
    assert!(blitter.blit_color(&mut cmd, &request).is_err());
    assert!(cmd.commands.is_empty());

    engine.backend().fail_pipelines(false);
    let mut cmd = RecordingCommandBuffer::default();
    assert_eq!(blitter.blit_color(&mut cmd, &request)?, BlitPath::Shader);
    assert_eq!(cmd.texture_operations(), 1);
    assert_eq!(blitter.stats().initializations, 1);
    blitter.shutdown();
    Ok(())
}

#[test]
fn forced_shader_path_for_parity_checks() -> Result<()> {
    let engine = engine(FormatSupport::hardware_blit());
    let src = color(&engine, 64);
    let dst = color(&engine, 64);
    let mut blitter = engine.blitter_with(BlitterOptions {
        force_shader_path: true,
        ..Default::default()
    });
    let mut cmd = RecordingCommandBuffer::default();
    let request = BlitRequest::new(&dst, full(64), &src, full(64));
    assert_eq!(blitter.blit_color(&mut cmd, &request)?, BlitPath::Shader);
    assert_eq!(cmd.draws().count(), 1);
    blitter.shutdown();
    Ok(())
}

#[test]
#[should_panic(expected = "cannot be sampled")]
fn unserviceable_request_panics() {
    let engine = engine(FormatSupport::copy_only());
    let backend = engine.backend();
    let src = RenderTarget::new(64, 64).with_color(
        Attachment::new(backend.create_texture("copy-only"), RGBA, 64, 64)
            .with_usage(wgpu::TextureUsages::COPY_SRC),
    );
    let dst = color(&engine, 32);
    let mut blitter = engine.blitter();
    let mut cmd = RecordingCommandBuffer::default();
    let _ = blitter.blit_color(&mut cmd, &BlitRequest::new(&dst, full(32), &src, full(64)));
}

fn buffer_copies(cmd: &RecordingCommandBuffer) -> usize {
    cmd.commands
        .iter()
        .filter(|c| matches!(c, RecordedCommand::CopyBuffer { .. }))
        .count()
}

#[test]
fn failed_staging_leaves_command_buffer_untouched() -> Result<()> {
    let engine = engine(FormatSupport::copy_only());
    let src = color(&engine, 64);
    let dst = color(&engine, 32);
    let mut blitter = engine.blitter();
    let request = BlitRequest::new(&dst, full(32), &src, full(64));

    // room for the triangle's stage but not the uniforms'
    engine.backend().limit_stages(Some(1));
    let mut cmd = RecordingCommandBuffer::default();
    assert!(blitter.blit_color(&mut cmd, &request).is_err());
    assert!(cmd.commands.is_empty());
    assert_eq!(engine.stage_pool().in_flight_count(), 0);
    assert_eq!(engine.backend().object_stats().live_buffers(), 1);

    engine.backend().limit_stages(None);
    let mut cmd = RecordingCommandBuffer::default();
    assert_eq!(blitter.blit_color(&mut cmd, &request)?, BlitPath::Shader);
    // the triangle upload is retried along with the uniforms
    assert_eq!(buffer_copies(&cmd), 2);
    assert_eq!(cmd.texture_operations(), 1);

    let mut cmd = RecordingCommandBuffer::default();
    blitter.blit_color(&mut cmd, &request)?;
    assert_eq!(buffer_copies(&cmd), 1);
    assert_eq!(blitter.stats().initializations, 1);
    blitter.shutdown();
    Ok(())
}

#[test]
fn pipeline_cache_stays_bounded_across_blitters() -> Result<()> {
    let engine = engine(FormatSupport::copy_only());
    let src = color(&engine, 64);
    let dst = color(&engine, 32);
    let request = BlitRequest::new(&dst, full(32), &src, full(64));

    for _ in 0..50 {
        let mut blitter = engine.blitter();
        let mut cmd = RecordingCommandBuffer::default();
        blitter.blit_color(&mut cmd, &request)?;
        assert_eq!(engine.pipeline_cache().len(), 1);
        blitter.shutdown();
        assert!(engine.pipeline_cache().is_empty());
    }

    {
        let mut dropped = engine.blitter();
        let mut cmd = RecordingCommandBuffer::default();
        dropped.blit_color(&mut cmd, &request)?;
    }
    assert!(engine.pipeline_cache().is_empty());
    engine.shutdown();
    Ok(())
}

#[test]
fn scaled_integer_blit_loads_nearest_texels() -> Result<()> {
    const UINT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Uint;
    let engine = engine(FormatSupport::copy_only());
    let backend = engine.backend();
    let src = RenderTarget::new(64, 64)
        .with_color(Attachment::new(backend.create_texture("ids"), UINT, 64, 64));
    let dst = RenderTarget::new(32, 32)
        .with_color(Attachment::new(backend.create_texture("ids-half"), UINT, 32, 32));
    let mut blitter = engine.blitter();
    let mut cmd = RecordingCommandBuffer::default();

    let request =
        BlitRequest::new(&dst, full(32), &src, full(64)).with_filter(BlitFilter::Linear);
    assert_eq!(blitter.blit_color(&mut cmd, &request)?, BlitPath::Shader);

    let draws: Vec<_> = cmd.draws().collect();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].program, BlitProgram::ColorUint);
    assert_eq!(draws[0].sampler.filter, BlitFilter::Nearest);
    assert_eq!(draws[0].render_pass.color, Some(UINT));
    blitter.shutdown();
    Ok(())
}

#[test]
#[should_panic(expected = "cannot be written to")]
fn integer_to_float_shader_blit_panics() {
    let engine = engine(FormatSupport::copy_only());
    let backend = engine.backend();
    let src = RenderTarget::new(64, 64).with_color(Attachment::new(
        backend.create_texture("ids"),
        wgpu::TextureFormat::Rgba8Uint,
        64,
        64,
    ));
    let dst = color(&engine, 32);
    let mut blitter = engine.blitter();
    let mut cmd = RecordingCommandBuffer::default();
    let _ = blitter.blit_color(&mut cmd, &BlitRequest::new(&dst, full(32), &src, full(64)));
}
