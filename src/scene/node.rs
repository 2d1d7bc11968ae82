//! Scene nodes
//!
//! A [`Node`] carries a local transform, a cached world transform and one of
//! the [`NodeKind`] variants. Containers keep an ordered list of child ids;
//! the nodes themselves live in the owning [`Scene`](super::Scene).

use std::fmt;

use glam::{Mat4, Vec2, Vec3};

use super::primitive::Primitive;
use crate::gpu::GeometryHandle;
use crate::shaders::Shader;

/// Handle to a node of a [`Scene`](super::Scene).
///
/// Carries the slot generation so handles to destroyed nodes never resolve
/// to a node created later in the same slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    /// Id that never resolves, for slots filled in later
    pub(crate) const DANGLING: NodeId = NodeId {
        index: u32::MAX,
        generation: u32::MAX,
    };
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}@gen{})", self.index, self.generation)
    }
}

/// Translation, rotation (radians per axis) and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn from_scale(scale: Vec3) -> Self {
        Self {
            scale,
            ..Self::IDENTITY
        }
    }

    /// Local matrix `T · Rx · Ry · Rz · S`
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_translation(self.translation)
            * Mat4::from_rotation_x(self.rotation.x)
            * Mat4::from_rotation_y(self.rotation.y)
            * Mat4::from_rotation_z(self.rotation.z)
            * Mat4::from_scale(self.scale)
    }
}

/// Ordered children of a plain group.
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub(crate) children: Vec<NodeId>,
}

/// Group drawing and picking only its active child.
#[derive(Debug, Clone, Default)]
pub struct Switch {
    pub(crate) children: Vec<NodeId>,
    pub active: usize,
}

/// Group whose translation orbits on a circle.
#[derive(Debug, Clone, Default)]
pub struct Animation {
    pub(crate) children: Vec<NodeId>,
    /// Radians per second
    pub speed: f32,
    pub radius: f32,
    pub(crate) angle: f32,
}

impl Animation {
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Advance the orbit and place `transform` on it.
    pub(crate) fn step(&mut self, dt: f32, transform: &mut Transform) {
        self.angle = (self.angle + self.speed * dt) % std::f32::consts::TAU;
        transform.translation.x = self.radius * self.angle.cos();
        transform.translation.y = self.radius * self.angle.sin();
    }
}

/// Manipulation handle types of the geometry view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// Four corners, scale both axes
    Resize,
    /// Left and right edges
    ResizeH,
    /// Top and bottom edges
    ResizeV,
    /// Outside the top-right corner
    Rotate,
}

impl HandleKind {
    pub const ALL: [HandleKind; 4] = [
        HandleKind::Resize,
        HandleKind::ResizeH,
        HandleKind::ResizeV,
        HandleKind::Rotate,
    ];

    /// Marker positions in the local frame of the handled surface.
    pub fn positions(self) -> &'static [Vec2] {
        const RESIZE: [Vec2; 4] = [
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(-1.0, 1.0),
            Vec2::new(1.0, 1.0),
        ];
        const RESIZE_H: [Vec2; 2] = [Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)];
        const RESIZE_V: [Vec2; 2] = [Vec2::new(0.0, -1.0), Vec2::new(0.0, 1.0)];
        const ROTATE: [Vec2; 1] = [Vec2::new(1.2, -1.2)];
        match self {
            HandleKind::Resize => &RESIZE,
            HandleKind::ResizeH => &RESIZE_H,
            HandleKind::ResizeV => &RESIZE_V,
            HandleKind::Rotate => &ROTATE,
        }
    }
}

/// Size of a handle marker in scene units, independent of the handled scale.
pub const HANDLE_SIZE: f32 = 0.04;

/// Handle markers drawn around a surface.
#[derive(Debug, Clone)]
pub struct Handles {
    pub kind: HandleKind,
    pub shader: Shader,
    pub(crate) geometry: Option<GeometryHandle>,
}

impl Handles {
    pub fn new(kind: HandleKind, shader: Shader) -> Self {
        Self {
            kind,
            shader,
            geometry: None,
        }
    }
}

/// What a node is.
#[derive(Debug)]
pub enum NodeKind {
    Group(Group),
    Switch(Switch),
    Animation(Animation),
    Primitive(Primitive),
    Handles(Handles),
}

impl NodeKind {
    pub fn children(&self) -> Option<&[NodeId]> {
        match self {
            NodeKind::Group(g) => Some(&g.children),
            NodeKind::Switch(s) => Some(&s.children),
            NodeKind::Animation(a) => Some(&a.children),
            NodeKind::Primitive(_) | NodeKind::Handles(_) => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            NodeKind::Group(g) => Some(&mut g.children),
            NodeKind::Switch(s) => Some(&mut s.children),
            NodeKind::Animation(a) => Some(&mut a.children),
            NodeKind::Primitive(_) | NodeKind::Handles(_) => None,
        }
    }

    pub fn is_container(&self) -> bool {
        self.children().is_some()
    }
}

/// Element of a scene.
#[derive(Debug)]
pub struct Node {
    pub transform: Transform,
    pub visible: bool,
    pub(crate) world: Mat4,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            transform: Transform::IDENTITY,
            visible: true,
            world: Mat4::IDENTITY,
            parent: None,
            kind,
        }
    }

    pub fn group() -> Self {
        Self::new(NodeKind::Group(Group::default()))
    }

    pub fn switch() -> Self {
        Self::new(NodeKind::Switch(Switch::default()))
    }

    pub fn animation(speed: f32, radius: f32) -> Self {
        Self::new(NodeKind::Animation(Animation {
            speed,
            radius,
            ..Default::default()
        }))
    }

    pub fn primitive(primitive: Primitive) -> Self {
        Self::new(NodeKind::Primitive(primitive))
    }

    pub fn handles(handles: Handles) -> Self {
        Self::new(NodeKind::Handles(handles))
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// World transform as of the last update pass
    pub fn world(&self) -> Mat4 {
        self.world
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        match &self.kind {
            NodeKind::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_primitive_mut(&mut self) -> Option<&mut Primitive> {
        match &mut self.kind {
            NodeKind::Primitive(p) => Some(p),
            _ => None,
        }
    }

    /// GPU resources are created lazily on first draw; containers need none
    pub fn is_initialized(&self) -> bool {
        match &self.kind {
            NodeKind::Primitive(p) => p.is_initialized(),
            NodeKind::Handles(h) => h.geometry.is_some(),
            _ => true,
        }
    }
}
