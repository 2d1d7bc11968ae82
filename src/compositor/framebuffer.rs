//! Render-to-texture frame buffers
//!
//! A [`FrameBuffer`] owns a color texture (and optionally a depth texture)
//! that can be rendered into and then sampled by other primitives. Sources
//! render into one, the rendering view composes into one, and the mixer
//! draws the current view into one for display.
//!
//! Frame buffers referenced by scene primitives are shared through
//! [`SharedFrameBuffer`]; primitives keep only a weak reference and fall back
//! to the black texture once the buffer is gone.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use super::RenderContext;
use crate::gpu::{
    GpuBackend, GpuError, GpuResult, RenderTarget, TextureDesc, TextureFormat, TextureHandle,
    TextureUsage,
};

/// Smallest resolution accepted for the session output.
pub const MIN_RESOLUTION: u32 = 128;

/// Aspect-ratio presets (label, width ratio, height ratio).
pub const ASPECT_RATIO_PRESETS: [(&str, u32, u32); 5] = [
    ("4:3", 4, 3),
    ("3:2", 3, 2),
    ("16:10", 16, 10),
    ("16:9", 16, 9),
    ("21:9", 21, 9),
];

/// Height presets (label, pixels).
pub const HEIGHT_PRESETS: [(&str, u32); 4] =
    [("720", 720), ("1080", 1080), ("1440", 1440), ("4K", 2160)];

pub type SharedFrameBuffer = Rc<RefCell<FrameBuffer>>;

/// Pixel size of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Resolution from preset indices, clamped to the preset tables.
    pub fn from_presets(aspect_ratio: usize, height: usize) -> Self {
        let (_, ar_w, ar_h) = ASPECT_RATIO_PRESETS[aspect_ratio.min(ASPECT_RATIO_PRESETS.len() - 1)];
        let (_, h) = HEIGHT_PRESETS[height.min(HEIGHT_PRESETS.len() - 1)];
        let w = (ar_w as f32 * h as f32 / ar_h as f32).round() as u32;
        Self::new(w, h)
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }

    /// Large enough to be used as the session output
    pub fn is_valid_output(&self) -> bool {
        self.width >= MIN_RESOLUTION && self.height >= MIN_RESOLUTION
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// GPU render target with an optional depth attachment.
#[derive(Debug)]
pub struct FrameBuffer {
    label: String,
    resolution: Resolution,
    use_depth: bool,
    clear_color: [f32; 4],
    color: Option<TextureHandle>,
    depth: Option<TextureHandle>,
}

impl FrameBuffer {
    /// Allocate a frame buffer. Fails if the backend rejects the size.
    pub fn new(
        gpu: &mut dyn GpuBackend,
        label: &str,
        resolution: Resolution,
        use_depth: bool,
    ) -> GpuResult<Self> {
        let mut framebuffer = Self {
            label: label.to_string(),
            resolution,
            use_depth,
            clear_color: [0.0; 4],
            color: None,
            depth: None,
        };
        framebuffer.allocate(gpu)?;
        Ok(framebuffer)
    }

    pub fn into_shared(self) -> SharedFrameBuffer {
        Rc::new(RefCell::new(self))
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.resolution.aspect_ratio()
    }

    pub fn use_depth(&self) -> bool {
        self.use_depth
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Color texture, `None` once released or after a failed reallocation
    pub fn texture(&self) -> Option<TextureHandle> {
        self.color
    }

    pub fn is_valid(&self) -> bool {
        self.color.is_some()
    }

    pub fn render_target(&self) -> Option<RenderTarget> {
        self.color.map(|color| RenderTarget {
            color,
            depth: self.depth,
            width: self.resolution.width,
            height: self.resolution.height,
        })
    }

    /// Make this frame buffer the current target until the returned scope
    /// ends. The previous target is current again afterwards.
    pub fn begin<'a>(&self, ctx: &'a mut RenderContext) -> GpuResult<FrameBufferScope<'a>> {
        let target = self
            .render_target()
            .ok_or_else(|| GpuError::Released(self.label.clone()))?;
        ctx.gpu().begin_pass(&target, self.clear_color)?;
        Ok(FrameBufferScope { ctx, ended: false })
    }

    /// Reallocate at a new size. The old textures are released before the new
    /// ones are created. If allocation fails the buffer is reallocated at its
    /// previous size and the error is returned.
    pub fn resize(&mut self, gpu: &mut dyn GpuBackend, resolution: Resolution) -> GpuResult<()> {
        if resolution == self.resolution && self.is_valid() {
            return Ok(());
        }
        crate::gpu::validate_size(
            resolution.width,
            resolution.height,
            gpu.max_texture_dimension(),
        )?;

        let previous = self.resolution;
        self.release(gpu);
        self.resolution = resolution;
        if let Err(e) = self.allocate(gpu) {
            tracing::error!(
                "Frame buffer '{}' failed to resize to {}: {}",
                self.label,
                resolution,
                e
            );
            self.resolution = previous;
            self.allocate(gpu)?;
            return Err(e);
        }
        tracing::debug!("Frame buffer '{}' resized to {}", self.label, resolution);
        Ok(())
    }

    /// Copy the color content into `destination`. Returns false when the
    /// two buffers are not the same size or either one has no texture.
    pub fn blit(&self, gpu: &mut dyn GpuBackend, destination: &FrameBuffer) -> bool {
        if self.resolution != destination.resolution {
            return false;
        }
        let (Some(src), Some(dst)) = (self.color, destination.color) else {
            return false;
        };
        match gpu.copy_texture(src, dst, self.resolution.width, self.resolution.height) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Blit from '{}' failed: {}", self.label, e);
                false
            }
        }
    }

    /// Destroy the GPU textures. The frame buffer stays usable for a later
    /// [`resize`](Self::resize).
    pub fn release(&mut self, gpu: &mut dyn GpuBackend) {
        if let Some(color) = self.color.take() {
            gpu.destroy_texture(color);
        }
        if let Some(depth) = self.depth.take() {
            gpu.destroy_texture(depth);
        }
    }

    fn allocate(&mut self, gpu: &mut dyn GpuBackend) -> GpuResult<()> {
        let color = gpu.create_texture(&TextureDesc {
            label: &self.label,
            width: self.resolution.width,
            height: self.resolution.height,
            format: TextureFormat::Rgba8,
            usage: TextureUsage::RenderTarget,
        })?;

        if self.use_depth {
            let depth = gpu.create_texture(&TextureDesc {
                label: &self.label,
                width: self.resolution.width,
                height: self.resolution.height,
                format: TextureFormat::Depth,
                usage: TextureUsage::DepthAttachment,
            });
            match depth {
                Ok(depth) => self.depth = Some(depth),
                Err(e) => {
                    gpu.destroy_texture(color);
                    return Err(e);
                }
            }
        }

        self.color = Some(color);
        Ok(())
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        if self.color.is_some() {
            tracing::warn!(
                "Frame buffer '{}' dropped without release, GPU texture leaked",
                self.label
            );
        }
    }
}

/// Active binding of a frame buffer as render target.
///
/// Dereferences to the [`RenderContext`] so drawing happens through the
/// scope. Ending the scope (explicitly or on drop) restores the previous
/// target.
pub struct FrameBufferScope<'a> {
    ctx: &'a mut RenderContext,
    ended: bool,
}

impl FrameBufferScope<'_> {
    /// End the pass and report errors, instead of logging them on drop.
    pub fn end(mut self) -> GpuResult<()> {
        self.ended = true;
        self.ctx.gpu().end_pass()
    }
}

impl Deref for FrameBufferScope<'_> {
    type Target = RenderContext;

    fn deref(&self) -> &RenderContext {
        self.ctx
    }
}

impl DerefMut for FrameBufferScope<'_> {
    fn deref_mut(&mut self) -> &mut RenderContext {
        self.ctx
    }
}

impl Drop for FrameBufferScope<'_> {
    fn drop(&mut self) {
        if !self.ended {
            if let Err(e) = self.ctx.gpu().end_pass() {
                tracing::warn!("Failed to end frame buffer pass: {}", e);
            }
        }
    }
}
