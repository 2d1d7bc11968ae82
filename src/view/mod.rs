//! Views
//!
//! A view presents the session's sources through its own [`Scene`]: every
//! source owns one group per view, so moving a source in the mixing view
//! does not move it in the geometry view. Views translate pointer gestures
//! (drag, grab, zoom) into changes of those groups.
//!
//! # Architecture
//!
//! - [`RenderView`]: composes the sources into the session output frame buffer
//! - [`MixingView`]: position on the mixing disk sets the source opacity
//! - [`GeometryView`]: move, resize and rotate sources on the output frame
//! - [`LayerView`]: depth ordering along a diagonal
//!
//! Pointer positions are in pixels of the view's viewport, origin top-left.

mod geometry;
mod layer;
mod mixing;
mod render;

use std::fmt;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::compositor::RenderContext;
use crate::gpu::GpuResult;
use crate::scene::{NodeId, PickHit, Scene, Transform};
use crate::settings::ViewSettings;
use crate::source::{Source, SourceId};

pub use geometry::GeometryView;
pub use layer::{LayerView, DEPTH_FRONT_INCREMENT};
pub use mixing::MixingView;
pub use render::RenderView;

/// Depth range of every scene; layer depths stay within `MAX_DEPTH - 2`.
pub const MAX_DEPTH: f32 = 12.0;

/// Root scale limits of [`View::zoom`].
pub const MIN_ZOOM: f32 = 0.2;
pub const MAX_ZOOM: f32 = 10.0;

/// Color of view frames and outlines.
pub(crate) const FRAME_COLOR: Vec4 = Vec4::new(0.8, 0.0, 0.8, 1.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewMode {
    Rendering,
    Mixing,
    Geometry,
    Layer,
}

impl ViewMode {
    pub const ALL: [ViewMode; 4] = [
        ViewMode::Rendering,
        ViewMode::Mixing,
        ViewMode::Geometry,
        ViewMode::Layer,
    ];

    /// Views the user interacts with
    pub const INTERACTIVE: [ViewMode; 3] = [ViewMode::Mixing, ViewMode::Geometry, ViewMode::Layer];

    pub fn index(self) -> usize {
        match self {
            ViewMode::Rendering => 0,
            ViewMode::Mixing => 1,
            ViewMode::Geometry => 2,
            ViewMode::Layer => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ViewMode::Rendering => "Rendering",
            ViewMode::Mixing => "Mixing",
            ViewMode::Geometry => "Geometry",
            ViewMode::Layer => "Layer",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scenes of the three interactive views, borrowed together.
pub struct InteractiveScenes<'a> {
    pub mixing: &'a mut Scene,
    pub geometry: &'a mut Scene,
    pub layer: &'a mut Scene,
}

impl<'a> InteractiveScenes<'a> {
    /// Add the rendering scene to make a complete set.
    pub fn with_rendering<'b>(&'b mut self, rendering: &'b mut Scene) -> SceneSet<'b> {
        SceneSet {
            rendering,
            mixing: &mut *self.mixing,
            geometry: &mut *self.geometry,
            layer: &mut *self.layer,
        }
    }
}

/// One scene per [`ViewMode`], borrowed together.
pub struct SceneSet<'a> {
    pub rendering: &'a mut Scene,
    pub mixing: &'a mut Scene,
    pub geometry: &'a mut Scene,
    pub layer: &'a mut Scene,
}

impl SceneSet<'_> {
    pub fn get(&self, mode: ViewMode) -> &Scene {
        match mode {
            ViewMode::Rendering => &*self.rendering,
            ViewMode::Mixing => &*self.mixing,
            ViewMode::Geometry => &*self.geometry,
            ViewMode::Layer => &*self.layer,
        }
    }

    pub fn get_mut(&mut self, mode: ViewMode) -> &mut Scene {
        match mode {
            ViewMode::Rendering => &mut *self.rendering,
            ViewMode::Mixing => &mut *self.mixing,
            ViewMode::Geometry => &mut *self.geometry,
            ViewMode::Layer => &mut *self.layer,
        }
    }
}

/// Pointer shape requested by a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cursor {
    #[default]
    Arrow,
    TextInput,
    ResizeAll,
    ResizeNS,
    ResizeEW,
    ResizeNESW,
    ResizeNWSE,
    Hand,
    NotAllowed,
}

/// Projection of a view and conversion between viewport pixels and scene
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    viewport: Vec2,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec2::new(1280.0, 720.0))
    }
}

impl Camera {
    pub fn new(viewport: Vec2) -> Self {
        Self {
            viewport: viewport.max(Vec2::ONE),
        }
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Vec2) {
        self.viewport = viewport.max(Vec2::ONE);
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.viewport.x / self.viewport.y
    }

    /// Orthographic projection with y pointing down, x spanning the aspect
    /// ratio and z spanning `[-1, MAX_DEPTH]`.
    pub fn projection(&self) -> Mat4 {
        Mat4::orthographic_rh_gl(-1.0, 1.0, 1.0, -1.0, -MAX_DEPTH, 1.0)
            * Mat4::from_scale(Vec3::new(1.0 / self.aspect_ratio(), 1.0, 1.0))
    }

    /// Scene coordinates under the viewport pixel `screen`, in the frame of
    /// `modelview`.
    pub fn unproject(&self, screen: Vec2, modelview: Mat4) -> Vec3 {
        let ndc = Vec3::new(
            2.0 * screen.x / self.viewport.x - 1.0,
            1.0 - 2.0 * screen.y / self.viewport.y,
            0.0,
        );
        (self.projection() * modelview).inverse().project_point3(ndc)
    }

    /// Viewport pixel of the point `position` given in the frame of
    /// `modelview`.
    pub fn project(&self, position: Vec3, modelview: Mat4) -> Vec2 {
        let ndc = (self.projection() * modelview).project_point3(position);
        Vec2::new(
            (ndc.x + 1.0) * 0.5 * self.viewport.x,
            (1.0 - ndc.y) * 0.5 * self.viewport.y,
        )
    }
}

/// Request to re-derive depth order and aspect-ratio dependent state.
///
/// Raised by any change of depth or output resolution; consumed once per
/// frame by the mixer, which hands the result to every view update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeepUpdate {
    pending: bool,
}

impl Default for DeepUpdate {
    /// Pending, so the first frame derives everything
    fn default() -> Self {
        Self { pending: true }
    }
}

impl DeepUpdate {
    pub fn request(&mut self) {
        self.pending = true;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Consume the request.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
}

/// Per-frame inputs of [`View::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Seconds since the previous frame
    pub dt: f32,
    pub deep_update: bool,
    /// Aspect ratio of the session output frame buffer
    pub output_aspect_ratio: f32,
}

#[derive(Debug, Clone, Copy)]
struct DragAnchor {
    from: Vec2,
    translation: Vec3,
}

/// Source transform captured when a grab gesture starts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrabAnchor {
    pub from: Vec2,
    pub source: SourceId,
    pub transform: Transform,
}

/// State shared by every view: its scene, camera and gesture anchors.
#[derive(Debug)]
pub struct ViewCore {
    mode: ViewMode,
    pub scene: Scene,
    pub camera: Camera,
    drag: Option<DragAnchor>,
    grab: Option<GrabAnchor>,
}

impl ViewCore {
    pub fn new(mode: ViewMode) -> Self {
        Self {
            mode,
            scene: Scene::new(),
            camera: Camera::default(),
            drag: None,
            grab: None,
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn root_transform(&self) -> Transform {
        self.scene
            .node(self.scene.root())
            .map(|n| n.transform)
            .unwrap_or_default()
    }

    pub fn root_transform_mut(&mut self) -> Option<&mut Transform> {
        let root = self.scene.root();
        self.scene.node_mut(root).map(|n| &mut n.transform)
    }

    /// Scene point under `screen` in the frame of the workspace.
    pub fn unproject_in_workspace(&self, screen: Vec2) -> Vec3 {
        self.camera
            .unproject(screen, self.root_transform().matrix())
    }

    /// Anchor of the grab starting at `from` on `source`; a new `from` or a
    /// different source starts a new gesture.
    pub(crate) fn grab_anchor(&mut self, from: Vec2, source: &Source) -> Option<GrabAnchor> {
        let group = source.group(self.mode);
        let transform = self.scene.node(group)?.transform;
        match self.grab {
            Some(anchor) if anchor.from == from && anchor.source == source.id() => Some(anchor),
            _ => {
                let anchor = GrabAnchor {
                    from,
                    source: source.id(),
                    transform,
                };
                self.grab = Some(anchor);
                Some(anchor)
            }
        }
    }

    /// Mutable transform of `source`'s group in this view.
    pub(crate) fn source_transform_mut(&mut self, source: &Source) -> Option<&mut Transform> {
        let group = source.group(self.mode);
        self.scene.node_mut(group).map(|n| &mut n.transform)
    }

    fn zoom(&mut self, factor: f32) {
        if factor.is_nan() {
            return;
        }
        if let Some(root) = self.root_transform_mut() {
            let z = (root.scale.x + 0.1 * factor).clamp(MIN_ZOOM, MAX_ZOOM);
            root.scale.x = z;
            root.scale.y = z;
        }
    }

    fn drag(&mut self, from: Vec2, to: Vec2) -> Cursor {
        let start = match self.drag {
            Some(anchor) if anchor.from == from => anchor.translation,
            _ => {
                let translation = self.root_transform().translation;
                self.drag = Some(DragAnchor { from, translation });
                translation
            }
        };
        let delta = self.camera.unproject(to, Mat4::IDENTITY)
            - self.camera.unproject(from, Mat4::IDENTITY);
        if let Some(root) = self.root_transform_mut() {
            root.translation.x = start.x + delta.x;
            root.translation.y = start.y + delta.y;
        }
        Cursor::ResizeAll
    }

    /// Generic part of [`View::update`].
    pub fn update_scene(&mut self, frame: &FrameContext) {
        if frame.deep_update {
            self.sort_workspace();
        }
        self.scene.update(frame.dt);
    }

    /// Generic part of [`View::draw`].
    pub fn draw_scene(&mut self, ctx: &mut RenderContext) -> GpuResult<usize> {
        let projection = self.camera.projection();
        self.scene.draw(ctx, Mat4::IDENTITY, projection)
    }

    /// Re-order the workspace back to front by depth.
    pub(crate) fn sort_workspace(&mut self) {
        let workspace = self.scene.workspace();
        self.scene
            .sort_children_by_key(workspace, |n| n.transform.translation.z);
    }
}

/// Behaviour of one view over its [`Scene`].
pub trait View {
    fn core(&self) -> &ViewCore;

    fn core_mut(&mut self) -> &mut ViewCore;

    fn mode(&self) -> ViewMode {
        self.core().mode()
    }

    fn scene(&self) -> &Scene {
        &self.core().scene
    }

    fn scene_mut(&mut self) -> &mut Scene {
        &mut self.core_mut().scene
    }

    /// Recompute transforms, then re-sort the workspace by depth when a deep
    /// update is pending.
    fn update(&mut self, frame: &FrameContext) {
        self.core_mut().update_scene(frame);
    }

    /// Draw into the current pass with the view's camera.
    fn draw(&mut self, ctx: &mut RenderContext) -> GpuResult<usize> {
        self.core_mut().draw_scene(ctx)
    }

    /// Scale the whole view by `0.1 · factor`, within `[MIN_ZOOM, MAX_ZOOM]`.
    fn zoom(&mut self, factor: f32) {
        self.core_mut().zoom(factor);
    }

    /// Pan the whole view by the pointer motion from `from` to `to`.
    fn drag(&mut self, from: Vec2, to: Vec2) -> Cursor {
        self.core_mut().drag(from, to)
    }

    /// Manipulate `source` by the pointer motion from `from` to `to`.
    /// `pick` is the hit that started the gesture and `modifier` constrains
    /// it (uniform resize, stepped rotation).
    fn grab(
        &mut self,
        _from: Vec2,
        _to: Vec2,
        _source: Option<&mut Source>,
        _pick: Option<PickHit>,
        _modifier: bool,
        _deep: &mut DeepUpdate,
    ) -> Cursor {
        Cursor::Arrow
    }

    /// Nodes under the viewport pixel `screen`, back to front.
    fn pick(&mut self, screen: Vec2) -> Vec<PickHit> {
        let core = self.core_mut();
        let point = core.camera.unproject(screen, Mat4::IDENTITY);
        core.scene.pick(point.truncate())
    }

    fn set_viewport(&mut self, viewport: Vec2) {
        self.core_mut().camera.set_viewport(viewport);
    }

    fn restore_settings(&mut self, settings: &ViewSettings) {
        if let Some(root) = self.core_mut().root_transform_mut() {
            root.scale = settings.scale;
            root.translation = settings.translation;
        }
    }

    fn save_settings(&self) -> ViewSettings {
        let root = self.core().root_transform();
        ViewSettings {
            name: self.mode().name().to_string(),
            scale: root.scale,
            translation: root.translation,
        }
    }
}

/// Apply `f` to the transform of every child of `id`.
pub(crate) fn for_each_child(scene: &mut Scene, id: NodeId, mut f: impl FnMut(&mut Transform)) {
    for child in scene.children(id).to_vec() {
        if let Some(node) = scene.node_mut(child) {
            f(&mut node.transform);
        }
    }
}
