//! Drawable leaves of the scene graph
//!
//! A [`Primitive`] is a shape (geometry), a [`Shader`] and, for surfaces, a
//! content strategy deciding which texture is sampled: nothing, a decoded
//! image, a media player, or another frame buffer.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Weak;

use glam::{Mat4, Vec3, Vec4};

use super::node::Transform;
use super::shapes;
use crate::compositor::{FrameBuffer, RenderContext, SharedFrameBuffer, ShapeKey};
use crate::gpu::{GeometryHandle, GpuResult, TextureHandle};
use crate::shaders::{ProgramKind, Shader};
use crate::video::MediaPlayer;

/// Texture source of a surface.
#[derive(Debug)]
pub enum SurfaceContent {
    /// Untextured, drawn in the shader color
    Plain,
    Image {
        path: PathBuf,
        texture: Option<TextureHandle>,
    },
    Media {
        uri: String,
        player: Box<dyn MediaPlayer>,
    },
    /// Samples a frame buffer owned elsewhere
    FrameBuffer(Weak<RefCell<FrameBuffer>>),
}

#[derive(Debug)]
pub enum Shape {
    /// Unit quad
    Surface(SurfaceContent),
    LineStrip { points: Vec<Vec3>, width: f32 },
    LineSquare { width: f32 },
    LineCircle { width: f32 },
    Points { points: Vec<Vec3>, size: f32 },
    /// Builtin mesh by name
    Mesh { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SurfaceTag {
    Plain,
    Image,
    Media,
    FrameBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShapeTag {
    Surface(SurfaceTag),
    LineStrip,
    LineSquare,
    LineCircle,
    Points,
    Mesh,
}

/// Renderable leaf.
#[derive(Debug)]
pub struct Primitive {
    pub shape: Shape,
    pub shader: Shader,
    texture: Option<TextureHandle>,
    geometry: Option<GeometryHandle>,
    initialized: bool,
}

impl Primitive {
    pub fn new(shape: Shape, shader: Shader) -> Self {
        Self {
            shape,
            shader,
            texture: None,
            geometry: None,
            initialized: false,
        }
    }

    pub fn surface() -> Self {
        Self::new(Shape::Surface(SurfaceContent::Plain), Shader::default())
    }

    pub fn image_surface(path: impl Into<PathBuf>) -> Self {
        Self::new(
            Shape::Surface(SurfaceContent::Image {
                path: path.into(),
                texture: None,
            }),
            Shader::default(),
        )
    }

    pub fn media_surface(uri: impl Into<String>, player: Box<dyn MediaPlayer>) -> Self {
        Self::new(
            Shape::Surface(SurfaceContent::Media {
                uri: uri.into(),
                player,
            }),
            Shader::default(),
        )
    }

    pub fn frame_buffer_surface(framebuffer: &SharedFrameBuffer, shader: Shader) -> Self {
        Self::new(
            Shape::Surface(SurfaceContent::FrameBuffer(std::rc::Rc::downgrade(
                framebuffer,
            ))),
            shader,
        )
    }

    pub fn line_strip(points: Vec<Vec3>, color: Vec4, width: f32) -> Self {
        Self::new(Shape::LineStrip { points, width }, Shader::flat(color))
    }

    pub fn line_square(color: Vec4, width: f32) -> Self {
        Self::new(Shape::LineSquare { width }, Shader::flat(color))
    }

    pub fn line_circle(color: Vec4, width: f32) -> Self {
        Self::new(Shape::LineCircle { width }, Shader::flat(color))
    }

    pub fn points(points: Vec<Vec3>, color: Vec4, size: f32) -> Self {
        Self::new(Shape::Points { points, size }, Shader::flat(color))
    }

    pub fn mesh(name: impl Into<String>, color: Vec4) -> Self {
        Self::new(
            Shape::Mesh { name: name.into() },
            Shader::with_color(ProgramKind::Image, color),
        )
    }

    /// Texture sampled by non-surface shapes (white when unset).
    pub fn set_texture(&mut self, texture: Option<TextureHandle>) {
        self.texture = texture;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn geometry(&self) -> Option<GeometryHandle> {
        self.geometry
    }

    pub(crate) fn tag(&self) -> ShapeTag {
        match &self.shape {
            Shape::Surface(content) => ShapeTag::Surface(match content {
                SurfaceContent::Plain => SurfaceTag::Plain,
                SurfaceContent::Image { .. } => SurfaceTag::Image,
                SurfaceContent::Media { .. } => SurfaceTag::Media,
                SurfaceContent::FrameBuffer(_) => SurfaceTag::FrameBuffer,
            }),
            Shape::LineStrip { .. } => ShapeTag::LineStrip,
            Shape::LineSquare { .. } => ShapeTag::LineSquare,
            Shape::LineCircle { .. } => ShapeTag::LineCircle,
            Shape::Points { .. } => ShapeTag::Points,
            Shape::Mesh { .. } => ShapeTag::Mesh,
        }
    }

    pub fn media_player(&self) -> Option<&dyn MediaPlayer> {
        match &self.shape {
            Shape::Surface(SurfaceContent::Media { player, .. }) => Some(player.as_ref()),
            _ => None,
        }
    }

    pub fn media_player_mut(&mut self) -> Option<&mut dyn MediaPlayer> {
        match &mut self.shape {
            Shape::Surface(SurfaceContent::Media { player, .. }) => Some(player.as_mut()),
            _ => None,
        }
    }

    /// Frame buffer sampled by a frame-buffer surface, if it is still alive
    pub fn frame_buffer(&self) -> Option<SharedFrameBuffer> {
        match &self.shape {
            Shape::Surface(SurfaceContent::FrameBuffer(fb)) => fb.upgrade(),
            _ => None,
        }
    }

    /// Upload the geometry if not done yet.
    pub fn ensure_geometry(&mut self, ctx: &mut RenderContext) -> GpuResult<()> {
        if self.geometry.is_some() {
            return Ok(());
        }
        let (gpu, cache, _) = ctx.parts();
        let geometry = match &self.shape {
            Shape::Surface(_) => Some(cache.acquire(gpu, ShapeKey::Quad, || Some(shapes::quad()))?),
            Shape::LineSquare { .. } => Some(cache.acquire(gpu, ShapeKey::SquareOutline, || {
                Some(shapes::square_outline())
            })?),
            Shape::LineCircle { .. } => Some(cache.acquire(gpu, ShapeKey::CircleOutline, || {
                Some(shapes::circle_outline())
            })?),
            Shape::Mesh { name } => Some(cache.acquire(gpu, ShapeKey::Mesh(name.clone()), || {
                shapes::builtin_mesh(name)
            })?),
            Shape::LineStrip { points, .. } if !points.is_empty() => {
                Some(cache.acquire_unique(gpu, &shapes::line_strip(points))?)
            }
            Shape::Points { points, .. } if !points.is_empty() => {
                Some(cache.acquire_unique(gpu, &shapes::points(points))?)
            }
            Shape::LineStrip { .. } | Shape::Points { .. } => None,
        };
        self.geometry = geometry;
        Ok(())
    }

    /// Create GPU resources and apply content-dependent sizing. Runs once;
    /// later calls are no-ops.
    pub fn init(&mut self, ctx: &mut RenderContext, transform: &mut Transform) -> GpuResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.ensure_geometry(ctx)?;

        let (gpu, _, resources) = ctx.parts();
        match &mut self.shape {
            Shape::Surface(SurfaceContent::Image { path, texture }) => {
                match resources.texture_image(gpu, path) {
                    Ok((handle, aspect_ratio)) => {
                        *texture = Some(handle);
                        transform.scale.x = aspect_ratio;
                    }
                    Err(e) => tracing::warn!("Image surface falls back to black: {}", e),
                }
            }
            Shape::Surface(SurfaceContent::Media { uri, player }) => {
                if !player.is_open() {
                    player.open(uri);
                    player.play(true);
                }
            }
            Shape::Surface(SurfaceContent::FrameBuffer(fb)) => {
                if let Some(fb) = fb.upgrade() {
                    transform.scale.x = fb.borrow().aspect_ratio();
                }
            }
            _ => {}
        }

        self.initialized = true;
        Ok(())
    }

    fn resolve_texture(&mut self, ctx: &mut RenderContext) -> GpuResult<TextureHandle> {
        let (gpu, _, resources) = ctx.parts();
        let (texture, placeholder_black) = match &mut self.shape {
            Shape::Surface(SurfaceContent::Plain) => (self.texture, false),
            Shape::Surface(SurfaceContent::Image { texture, .. }) => (*texture, true),
            Shape::Surface(SurfaceContent::Media { player, .. }) => (player.texture(gpu), true),
            Shape::Surface(SurfaceContent::FrameBuffer(fb)) => {
                (fb.upgrade().and_then(|fb| fb.borrow().texture()), true)
            }
            _ => (self.texture, false),
        };
        match texture {
            Some(texture) => Ok(texture),
            None if placeholder_black => resources.texture_black(gpu),
            None => resources.texture_white(gpu),
        }
    }

    /// Draw with the content texture.
    pub fn draw(
        &mut self,
        ctx: &mut RenderContext,
        modelview: Mat4,
        projection: Mat4,
    ) -> GpuResult<()> {
        let Some(geometry) = self.geometry else {
            return Ok(());
        };
        let texture = self.resolve_texture(ctx)?;
        ctx.gpu()
            .draw(&self.shader.draw_call(geometry, texture, modelview, projection))
    }

    /// Draw sampling `texture` instead of the content texture.
    pub fn draw_with_texture(
        &mut self,
        ctx: &mut RenderContext,
        texture: TextureHandle,
        modelview: Mat4,
        projection: Mat4,
    ) -> GpuResult<()> {
        self.ensure_geometry(ctx)?;
        let Some(geometry) = self.geometry else {
            return Ok(());
        };
        ctx.gpu()
            .draw(&self.shader.draw_call(geometry, texture, modelview, projection))
    }

    /// Give back the geometry; the primitive initializes again on next draw.
    pub fn release(&mut self, ctx: &mut RenderContext) {
        if let Some(geometry) = self.geometry.take() {
            let (gpu, cache, _) = ctx.parts();
            cache.release(gpu, geometry);
        }
        self.initialized = false;
    }
}
