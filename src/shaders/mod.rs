//! Shader state attached to primitives
//!
//! A [`Shader`] is the per-primitive render state: modulation color, blend
//! mode, program and named uniforms. The GPU program itself is the embedded
//! `scene.wgsl`; the state is turned into a [`DrawCall`] when a primitive is
//! drawn.

use std::collections::BTreeMap;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::compositor::BlendMode;
use crate::gpu::{DrawCall, GeometryHandle, TextureHandle};

/// The embedded scene shader
pub const SCENE_SHADER: &str = include_str!("scene.wgsl");

/// Which fragment path a primitive uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProgramKind {
    /// Vertex color times shader color (lines, points, handles)
    Flat,
    /// Sampled texture times shader color
    #[default]
    Image,
    /// Image with brightness / contrast / saturation adjustment
    ImageProcessing,
}

/// Value of a named uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
}

impl UniformValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            UniformValue::Float(v) => Some(*v),
            UniformValue::Int(v) => Some(*v as f32),
            _ => None,
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

/// Render state of one primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct Shader {
    pub color: Vec4,
    pub blend: BlendMode,
    program: ProgramKind,
    uniforms: BTreeMap<String, UniformValue>,
}

impl Default for Shader {
    fn default() -> Self {
        Self::new(ProgramKind::Image)
    }
}

impl Shader {
    pub fn new(program: ProgramKind) -> Self {
        let mut shader = Self {
            color: Vec4::ONE,
            blend: BlendMode::Normal,
            program,
            uniforms: BTreeMap::new(),
        };
        shader.reset();
        shader
    }

    pub fn with_color(program: ProgramKind, color: Vec4) -> Self {
        Self {
            color,
            ..Self::new(program)
        }
    }

    pub fn flat(color: Vec4) -> Self {
        Self::with_color(ProgramKind::Flat, color)
    }

    /// Image shader with adjustable brightness, contrast and saturation
    pub fn processing() -> Self {
        Self::new(ProgramKind::ImageProcessing)
    }

    pub fn program(&self) -> ProgramKind {
        self.program
    }

    /// Restore color and uniforms to their defaults.
    pub fn reset(&mut self) {
        self.color = Vec4::ONE;
        self.uniforms.clear();
        if self.program == ProgramKind::ImageProcessing {
            self.uniforms
                .insert("brightness".to_string(), UniformValue::Float(0.0));
            self.uniforms
                .insert("contrast".to_string(), UniformValue::Float(1.0));
            self.uniforms
                .insert("saturation".to_string(), UniformValue::Float(1.0));
        }
    }

    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) {
        self.uniforms.insert(name.to_string(), value.into());
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    pub fn uniforms(&self) -> &BTreeMap<String, UniformValue> {
        &self.uniforms
    }

    /// Bind this state for one draw of `geometry` sampling `texture`.
    pub fn draw_call(
        &self,
        geometry: GeometryHandle,
        texture: TextureHandle,
        modelview: Mat4,
        projection: Mat4,
    ) -> DrawCall<'_> {
        DrawCall {
            geometry,
            texture,
            projection,
            modelview,
            color: self.color,
            blend: self.blend,
            program: self.program,
            uniforms: &self.uniforms,
        }
    }
}
