//! Attachments, render targets and blit rectangles.

use std::fmt;
use std::sync::Arc;

use crate::backend::Backend;
use crate::format::Aspect;
use crate::wgpu_backend::WgpuBackend;

/// Maximum number of color attachments a render target can carry.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

/// Integer texel coordinate. `z` addresses depth slices and must stay within
/// a single slice for blits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Offset3d {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Offset3d {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Two corners of a blit region. `max < min` on an axis mirrors that axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RectPair {
    pub min: Offset3d,
    pub max: Offset3d,
}

const fn far_edge(origin: i32, len: u32) -> i32 {
    match origin.checked_add_unsigned(len) {
        Some(edge) => edge,
        None => panic!("rectangle edge overflows i32"),
    }
}

impl RectPair {
    pub const fn new(min: Offset3d, max: Offset3d) -> Self {
        Self { min, max }
    }

    /// Rectangle `[0,width) x [0,height)` on slice 0.
    ///
    /// Panics if either extent exceeds `i32::MAX`.
    pub const fn from_extent(width: u32, height: u32) -> Self {
        Self::from_xywh(0, 0, width, height)
    }

    /// Rectangle at `(x, y)` with the given size on slice 0.
    ///
    /// Panics if the far corner does not fit in `i32`.
    pub const fn from_xywh(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            min: Offset3d::new(x, y, 0),
            max: Offset3d::new(far_edge(x, width), far_edge(y, height), 1),
        }
    }

    pub fn width(&self) -> u32 {
        self.max.x.abs_diff(self.min.x)
    }

    pub fn height(&self) -> u32 {
        self.max.y.abs_diff(self.min.y)
    }

    pub fn depth(&self) -> u32 {
        self.max.z.abs_diff(self.min.z)
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() == 0 || self.height() == 0 || self.depth() == 0
    }

    pub fn mirrored_x(&self) -> bool {
        self.max.x < self.min.x
    }

    pub fn mirrored_y(&self) -> bool {
        self.max.y < self.min.y
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored_x() || self.mirrored_y() || self.max.z < self.min.z
    }

    /// Same region with `min <= max` on every axis.
    pub fn normalized(&self) -> Self {
        Self {
            min: Offset3d::new(
                self.min.x.min(self.max.x),
                self.min.y.min(self.max.y),
                self.min.z.min(self.max.z),
            ),
            max: Offset3d::new(
                self.min.x.max(self.max.x),
                self.min.y.max(self.max.y),
                self.min.z.max(self.max.z),
            ),
        }
    }

    /// Whether the rectangle lies within a `width x height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let r = self.normalized();
        r.min.x >= 0
            && r.min.y >= 0
            && r.min.z >= 0
            && (r.max.x as i64) <= width as i64
            && (r.max.y as i64) <= height as i64
    }

    /// Whether the rectangle covers exactly a `width x height` image.
    pub fn covers(&self, width: u32, height: u32) -> bool {
        let r = self.normalized();
        r.min.x == 0 && r.min.y == 0 && r.width() == width && r.height() == height
    }
}

/// One texture subresource a blit reads from or writes to.
pub struct Attachment<B: Backend> {
    pub texture: B::Texture,
    pub format: wgpu::TextureFormat,
    pub samples: u32,
    pub aspect: Aspect,
    pub usage: wgpu::TextureUsages,
    pub level: u32,
    pub layer: u32,
    /// Extent of `level`.
    pub width: u32,
    pub height: u32,
}

impl<B: Backend> Clone for Attachment<B> {
    fn clone(&self) -> Self {
        Self {
            texture: self.texture.clone(),
            format: self.format,
            samples: self.samples,
            aspect: self.aspect,
            usage: self.usage,
            level: self.level,
            layer: self.layer,
            width: self.width,
            height: self.height,
        }
    }
}

impl<B: Backend> fmt::Debug for Attachment<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("texture", &self.texture)
            .field("format", &self.format)
            .field("samples", &self.samples)
            .field("aspect", &self.aspect)
            .field("level", &self.level)
            .field("layer", &self.layer)
            .field("extent", &(self.width, self.height))
            .finish()
    }
}

impl<B: Backend> Attachment<B> {
    /// Single-sampled attachment at level 0, layer 0. Usage defaults to
    /// everything a blit may need; narrow it with [`Attachment::with_usage`].
    ///
    /// Panics for stencil-only formats.
    pub fn new(texture: B::Texture, format: wgpu::TextureFormat, width: u32, height: u32) -> Self {
        let aspect = Aspect::of_format(format)
            .unwrap_or_else(|| panic!("format {format:?} has no color or depth aspect"));
        Self {
            texture,
            format,
            samples: 1,
            aspect,
            usage: wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT,
            level: 0,
            layer: 0,
            width,
            height,
        }
    }

    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples.max(1);
        self
    }

    pub fn with_usage(mut self, usage: wgpu::TextureUsages) -> Self {
        self.usage = usage;
        self
    }

    /// Address mip `level`; `base_width`/`base_height` are the level-0 extent.
    pub fn with_level(mut self, level: u32, base_width: u32, base_height: u32) -> Self {
        self.level = level;
        self.width = (base_width >> level).max(1);
        self.height = (base_height >> level).max(1);
        self
    }

    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }

    pub fn is_multisampled(&self) -> bool {
        self.samples > 1
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Attachment<WgpuBackend> {
    /// Describe level 0, layer 0 of a wgpu texture.
    pub fn from_texture(texture: Arc<wgpu::Texture>) -> Self {
        let format = texture.format();
        let (width, height) = (texture.width(), texture.height());
        let samples = texture.sample_count();
        let usage = texture.usage();
        Self::new(texture, format, width, height)
            .with_samples(samples)
            .with_usage(usage)
    }
}

/// A set of color attachments plus an optional depth attachment.
pub struct RenderTarget<B: Backend> {
    color: Vec<Attachment<B>>,
    depth: Option<Attachment<B>>,
    width: u32,
    height: u32,
}

impl<B: Backend> fmt::Debug for RenderTarget<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTarget")
            .field("color", &self.color)
            .field("depth", &self.depth)
            .field("extent", &(self.width, self.height))
            .finish()
    }
}

impl<B: Backend> RenderTarget<B> {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            color: Vec::new(),
            depth: None,
            width,
            height,
        }
    }

    /// Append a color attachment. Panics past [`MAX_COLOR_ATTACHMENTS`] or
    /// when given a depth attachment.
    pub fn with_color(mut self, attachment: Attachment<B>) -> Self {
        assert!(
            self.color.len() < MAX_COLOR_ATTACHMENTS,
            "render target already has {MAX_COLOR_ATTACHMENTS} color attachments"
        );
        assert_eq!(attachment.aspect, Aspect::Color, "color slot given a depth attachment");
        self.color.push(attachment);
        self
    }

    pub fn with_depth(mut self, attachment: Attachment<B>) -> Self {
        assert_eq!(attachment.aspect, Aspect::Depth, "depth slot given a color attachment");
        self.depth = Some(attachment);
        self
    }

    pub fn color(&self, index: usize) -> Option<&Attachment<B>> {
        self.color.get(index)
    }

    pub fn depth(&self) -> Option<&Attachment<B>> {
        self.depth.as_ref()
    }

    pub fn color_count(&self) -> usize {
        self.color.len()
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
