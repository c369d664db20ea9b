//! engine-shaders: WGSL shader sources and helpers.
//!
//! The blit shaders are split into one vertex module and one fragment module.
//! The fragment module carries one entry point per blit program; each program
//! reads its source through a dedicated binding slot so the module never
//! declares two resources at the same binding.

use bytemuck::{Pod, Zeroable};

/// Vertex entry point of [`BLIT_VERTEX_WGSL`].
pub const BLIT_VS_ENTRY: &str = "vs_main";

/// Fragment entry: hardware-filtered sampling of a single-sampled color source.
pub const BLIT_FS_COLOR: &str = "fs_color";
/// Fragment entry: texel loads with shader-side bilinear for unfilterable color formats.
pub const BLIT_FS_COLOR_UNFILTERABLE: &str = "fs_color_unfilterable";
/// Fragment entry: resolves a multisampled color source (sample average) while scaling.
pub const BLIT_FS_COLOR_MULTISAMPLED: &str = "fs_color_multisampled";
/// Fragment entry: writes `frag_depth` from a single-sampled depth source.
pub const BLIT_FS_DEPTH: &str = "fs_depth";
/// Fragment entry: writes `frag_depth` from sample 0 of a multisampled depth source.
pub const BLIT_FS_DEPTH_MULTISAMPLED: &str = "fs_depth_multisampled";
/// Fragment entry: nearest texel loads from an unsigned-integer color source.
pub const BLIT_FS_COLOR_UINT: &str = "fs_color_uint";
/// Fragment entry: nearest texel loads from a signed-integer color source.
pub const BLIT_FS_COLOR_SINT: &str = "fs_color_sint";
/// Fragment entry: sample 0 of a multisampled unsigned-integer color source.
pub const BLIT_FS_COLOR_UINT_MULTISAMPLED: &str = "fs_color_uint_multisampled";
/// Fragment entry: sample 0 of a multisampled signed-integer color source.
pub const BLIT_FS_COLOR_SINT_MULTISAMPLED: &str = "fs_color_sint_multisampled";

/// Binding slots used by the blit fragment module (all in group 0).
pub mod bindings {
    pub const SRC_COLOR: u32 = 0;
    pub const SAMPLER: u32 = 1;
    pub const PARAMS: u32 = 2;
    pub const SRC_COLOR_MS: u32 = 3;
    pub const SRC_DEPTH: u32 = 4;
    pub const SRC_DEPTH_MS: u32 = 5;
    pub const SRC_UINT: u32 = 6;
    pub const SRC_SINT: u32 = 7;
    pub const SRC_UINT_MS: u32 = 8;
    pub const SRC_SINT_MS: u32 = 9;
}

/// Full-screen triangle vertex shader. Positions and UVs come from the
/// retained triangle buffer (see [`FULLSCREEN_TRIANGLE`]).
pub const BLIT_VERTEX_WGSL: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) in_pos: vec2<f32>, @location(1) in_uv: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.pos = vec4<f32>(in_pos, 0.0, 1.0);
    out.uv = in_uv;
    return out;
}
"#;

/// Blit fragment programs. `uv` spans [0,1] across the destination viewport;
/// `params` maps it onto the source rectangle in texel space.
pub const BLIT_FRAGMENT_WGSL: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

struct BlitParams {
    src_min: vec2<f32>,
    src_max: vec2<f32>,
    src_extent: vec2<f32>,
    filter_mode: u32,  // 0 nearest, 1 linear
    sample_count: u32,
};

@group(0) @binding(0) var src_color: texture_2d<f32>;
@group(0) @binding(1) var src_sampler: sampler;
@group(0) @binding(2) var<uniform> params: BlitParams;
@group(0) @binding(3) var src_color_ms: texture_multisampled_2d<f32>;
@group(0) @binding(4) var src_depth: texture_depth_2d;
@group(0) @binding(5) var src_depth_ms: texture_depth_multisampled_2d;
@group(0) @binding(6) var src_uint: texture_2d<u32>;
@group(0) @binding(7) var src_sint: texture_2d<i32>;
@group(0) @binding(8) var src_uint_ms: texture_multisampled_2d<u32>;
@group(0) @binding(9) var src_sint_ms: texture_multisampled_2d<i32>;

fn src_coord(uv: vec2<f32>) -> vec2<f32> {
    return mix(params.src_min, params.src_max, uv);
}

fn clamp_texel(p: vec2<i32>) -> vec2<i32> {
    let max_texel = vec2<i32>(params.src_extent) - vec2<i32>(1, 1);
    return clamp(p, vec2<i32>(0, 0), max_texel);
}

// Integer sources are never filtered.
fn nearest_texel(uv: vec2<f32>) -> vec2<i32> {
    return clamp_texel(vec2<i32>(floor(src_coord(uv))));
}

fn load_color(p: vec2<i32>) -> vec4<f32> {
    return textureLoad(src_color, clamp_texel(p), 0);
}

fn load_color_ms(p: vec2<i32>) -> vec4<f32> {
    let q = clamp_texel(p);
    var acc = vec4<f32>(0.0, 0.0, 0.0, 0.0);
    for (var i = 0u; i < params.sample_count; i = i + 1u) {
        acc = acc + textureLoad(src_color_ms, q, i32(i));
    }
    return acc / f32(max(params.sample_count, 1u));
}

fn load_depth(p: vec2<i32>) -> f32 {
    return textureLoad(src_depth, clamp_texel(p), 0);
}

fn load_depth_ms(p: vec2<i32>) -> f32 {
    return textureLoad(src_depth_ms, clamp_texel(p), 0);
}

@fragment
fn fs_color(inp: VsOut) -> @location(0) vec4<f32> {
    let uv = src_coord(inp.uv) / params.src_extent;
    return textureSampleLevel(src_color, src_sampler, uv, 0.0);
}

@fragment
fn fs_color_unfilterable(inp: VsOut) -> @location(0) vec4<f32> {
    let c = src_coord(inp.uv);
    if (params.filter_mode == 0u) {
        return load_color(vec2<i32>(floor(c)));
    }
    let t = c - vec2<f32>(0.5, 0.5);
    let base = vec2<i32>(floor(t));
    let f = fract(t);
    let c00 = load_color(base);
    let c10 = load_color(base + vec2<i32>(1, 0));
    let c01 = load_color(base + vec2<i32>(0, 1));
    let c11 = load_color(base + vec2<i32>(1, 1));
    return mix(mix(c00, c10, f.x), mix(c01, c11, f.x), f.y);
}

@fragment
fn fs_color_multisampled(inp: VsOut) -> @location(0) vec4<f32> {
    let c = src_coord(inp.uv);
    if (params.filter_mode == 0u) {
        return load_color_ms(vec2<i32>(floor(c)));
    }
    let t = c - vec2<f32>(0.5, 0.5);
    let base = vec2<i32>(floor(t));
    let f = fract(t);
    let c00 = load_color_ms(base);
    let c10 = load_color_ms(base + vec2<i32>(1, 0));
    let c01 = load_color_ms(base + vec2<i32>(0, 1));
    let c11 = load_color_ms(base + vec2<i32>(1, 1));
    return mix(mix(c00, c10, f.x), mix(c01, c11, f.x), f.y);
}

@fragment
fn fs_depth(inp: VsOut) -> @builtin(frag_depth) f32 {
    let c = src_coord(inp.uv);
    if (params.filter_mode == 0u) {
        return load_depth(vec2<i32>(floor(c)));
    }
    let t = c - vec2<f32>(0.5, 0.5);
    let base = vec2<i32>(floor(t));
    let f = fract(t);
    let d00 = load_depth(base);
    let d10 = load_depth(base + vec2<i32>(1, 0));
    let d01 = load_depth(base + vec2<i32>(0, 1));
    let d11 = load_depth(base + vec2<i32>(1, 1));
    return mix(mix(d00, d10, f.x), mix(d01, d11, f.x), f.y);
}

@fragment
fn fs_depth_multisampled(inp: VsOut) -> @builtin(frag_depth) f32 {
    let c = src_coord(inp.uv);
    if (params.filter_mode == 0u) {
        return load_depth_ms(vec2<i32>(floor(c)));
    }
    let t = c - vec2<f32>(0.5, 0.5);
    let base = vec2<i32>(floor(t));
    let f = fract(t);
    let d00 = load_depth_ms(base);
    let d10 = load_depth_ms(base + vec2<i32>(1, 0));
    let d01 = load_depth_ms(base + vec2<i32>(0, 1));
    let d11 = load_depth_ms(base + vec2<i32>(1, 1));
    return mix(mix(d00, d10, f.x), mix(d01, d11, f.x), f.y);
}

@fragment
fn fs_color_uint(inp: VsOut) -> @location(0) vec4<u32> {
    return textureLoad(src_uint, nearest_texel(inp.uv), 0);
}

@fragment
fn fs_color_sint(inp: VsOut) -> @location(0) vec4<i32> {
    return textureLoad(src_sint, nearest_texel(inp.uv), 0);
}

@fragment
fn fs_color_uint_multisampled(inp: VsOut) -> @location(0) vec4<u32> {
    return textureLoad(src_uint_ms, nearest_texel(inp.uv), 0);
}

@fragment
fn fs_color_sint_multisampled(inp: VsOut) -> @location(0) vec4<i32> {
    return textureLoad(src_sint_ms, nearest_texel(inp.uv), 0);
}
"#;

/// Vertex layout of the retained full-screen triangle.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FullscreenVertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
}

/// One oversized triangle covering clip space. UV (0,0) sits at the top-left
/// corner of the viewport and (1,1) at the bottom-right.
pub const FULLSCREEN_TRIANGLE: [FullscreenVertex; 3] = [
    FullscreenVertex { pos: [-1.0, -1.0], uv: [0.0, 1.0] },
    FullscreenVertex { pos: [3.0, -1.0], uv: [2.0, 1.0] },
    FullscreenVertex { pos: [-1.0, 3.0], uv: [0.0, -1.0] },
];

/// Per-call parameters of the slow blit path (matches `BlitParams` in WGSL).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BlitUniforms {
    /// Source rectangle corner mapped to uv (0,0), in texels.
    pub src_min: [f32; 2],
    /// Source rectangle corner mapped to uv (1,1), in texels.
    pub src_max: [f32; 2],
    /// Extent of the source attachment's mip level.
    pub src_extent: [f32; 2],
    pub filter_mode: u32,
    pub sample_count: u32,
}

impl BlitUniforms {
    pub const FILTER_NEAREST: u32 = 0;
    pub const FILTER_LINEAR: u32 = 1;
}
