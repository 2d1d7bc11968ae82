//! GPU abstraction
//!
//! The scene graph, frame buffers and sources talk to the GPU exclusively
//! through the [`GpuBackend`] trait. Two implementations are provided:
//!
//! - [`WgpuBackend`]: real rendering through `wgpu` (headless device or a
//!   device shared with the host application)
//! - [`HeadlessBackend`]: bookkeeping only, used by tests and offline tools to
//!   observe texture lifetimes, passes and draw calls without a GPU
//!
//! Resources are referred to by small copyable handles. A handle is only
//! valid until the matching `destroy_*` call.

mod headless;
mod wgpu_backend;

pub use headless::{DrawRecord, HeadlessBackend, HeadlessProbe, HeadlessStats};
pub use wgpu_backend::WgpuBackend;

use std::collections::BTreeMap;

use glam::{Mat4, Vec4};
use thiserror::Error;

use crate::compositor::BlendMode;
use crate::shaders::{ProgramKind, UniformValue};

/// Handle to a GPU texture (color or depth).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to uploaded vertex/index data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryHandle(pub(crate) u64);

/// Pixel format of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA, the only color format of the pipeline
    Rgba8,
    /// Depth attachment
    Depth,
}

/// How a texture is going to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureUsage {
    /// Uploaded from the CPU and sampled (images, media frames)
    Sampled,
    /// Rendered into and sampled (frame buffer color attachments)
    RenderTarget,
    /// Depth attachment of a frame buffer
    DepthAttachment,
}

/// Texture creation parameters.
#[derive(Debug, Clone, Copy)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

/// Primitive topology of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    TriangleList,
    TriangleStrip,
    LineList,
    LineStrip,
    PointList,
}

/// Interleaved vertex as uploaded to the GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl Vertex {
    /// White vertex at `position` with texture coordinates `uv`.
    pub fn new(position: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            color: [1.0; 4],
            uv,
        }
    }
}

/// CPU-side geometry ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub topology: Topology,
}

impl MeshData {
    /// Build a mesh whose indices simply enumerate the vertices.
    pub fn sequential(vertices: Vec<Vertex>, topology: Topology) -> Self {
        let indices = (0..vertices.len() as u32).collect();
        Self {
            vertices,
            indices,
            topology,
        }
    }
}

/// A color (+ optional depth) attachment pair to render into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub color: TextureHandle,
    pub depth: Option<TextureHandle>,
    pub width: u32,
    pub height: u32,
}

/// One draw of one geometry with one texture and one shader state.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub geometry: GeometryHandle,
    pub texture: TextureHandle,
    pub projection: Mat4,
    pub modelview: Mat4,
    pub color: Vec4,
    pub blend: BlendMode,
    pub program: ProgramKind,
    pub uniforms: &'a BTreeMap<String, UniformValue>,
}

/// GPU errors
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("invalid texture size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("failed to create geometry: {0}")]
    GeometryCreationFailed(String),
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureHandle),
    #[error("unknown geometry {0:?}")]
    UnknownGeometry(GeometryHandle),
    #[error("texture data size mismatch: expected {expected} bytes, got {actual}")]
    DataSizeMismatch { expected: usize, actual: usize },
    #[error("frame buffer '{0}' has no texture")]
    Released(String),
    #[error("no render pass is active")]
    NoActivePass,
    #[error("texture {0:?} is sampled while being the current render target")]
    SamplingRenderTarget(TextureHandle),
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    DeviceRequest(String),
}

pub type GpuResult<T> = Result<T, GpuError>;

/// Render-target and resource operations the compositing core needs.
///
/// Passes nest: `begin_pass` pushes a target and `end_pass` pops it, making
/// the previous target current again. Draws are only valid inside a pass.
pub trait GpuBackend: std::fmt::Debug {
    /// Human-readable backend name
    fn name(&self) -> &'static str;

    /// Largest texture edge the backend accepts
    fn max_texture_dimension(&self) -> u32;

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> GpuResult<TextureHandle>;

    /// Upload tightly packed RGBA pixels covering the whole texture
    fn write_texture(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> GpuResult<()>;

    fn destroy_texture(&mut self, texture: TextureHandle);

    fn create_geometry(&mut self, mesh: &MeshData) -> GpuResult<GeometryHandle>;

    fn destroy_geometry(&mut self, geometry: GeometryHandle);

    fn begin_pass(&mut self, target: &RenderTarget, clear: [f32; 4]) -> GpuResult<()>;

    fn end_pass(&mut self) -> GpuResult<()>;

    fn draw(&mut self, call: &DrawCall<'_>) -> GpuResult<()>;

    /// Copy `width`x`height` texels from `src` into `dst`
    fn copy_texture(
        &mut self,
        src: TextureHandle,
        dst: TextureHandle,
        width: u32,
        height: u32,
    ) -> GpuResult<()>;
}

/// Check a requested texture size against the backend limit.
pub fn validate_size(width: u32, height: u32, max_dimension: u32) -> GpuResult<()> {
    if width == 0 || height == 0 || width > max_dimension || height > max_dimension {
        return Err(GpuError::InvalidSize { width, height });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_size() {
        assert!(validate_size(1, 1, 8192).is_ok());
        assert!(validate_size(8192, 8192, 8192).is_ok());
        assert!(validate_size(0, 10, 8192).is_err());
        assert!(validate_size(10, 8193, 8192).is_err());
    }

    #[test]
    fn test_sequential_mesh_indices() {
        let mesh = MeshData::sequential(
            vec![
                Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0]),
                Vertex::new([1.0, 0.0, 0.0], [1.0, 0.0]),
                Vertex::new([1.0, 1.0, 0.0], [1.0, 1.0]),
            ],
            Topology::LineStrip,
        );
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_vertex_layout_size() {
        // position (12) + color (16) + uv (8)
        assert_eq!(std::mem::size_of::<Vertex>(), 36);
    }
}
