//! Layer view: sources sorted by depth along a diagonal

use glam::{Vec2, Vec4};

use super::{
    for_each_child, Cursor, DeepUpdate, FrameContext, View, ViewCore, ViewMode, FRAME_COLOR,
    MAX_DEPTH,
};
use crate::scene::{Node, PickHit, Primitive};
use crate::settings::ViewSettings;
use crate::source::Source;

/// Distance in front of the front-most source given to a source placed
/// "in front".
pub const DEPTH_FRONT_INCREMENT: f32 = 0.5;

const BACKGROUND_COLOR: Vec4 = Vec4::new(0.3, 0.3, 0.3, 0.3);

#[derive(Debug)]
pub struct LayerView {
    core: ViewCore,
    aspect_ratio: f32,
}

impl Default for LayerView {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerView {
    pub fn new() -> Self {
        let mut core = ViewCore::new(ViewMode::Layer);
        let background = core.scene.background();
        let mut surface = Primitive::surface();
        surface.shader.color = BACKGROUND_COLOR;
        core.scene.add(background, Node::primitive(surface));
        core.scene.add(
            background,
            Node::primitive(Primitive::mesh("perspective_layer", FRAME_COLOR)),
        );
        core.scene.add(
            background,
            Node::primitive(Primitive::line_square(FRAME_COLOR, 1.0)),
        );
        let mut view = Self {
            core,
            aspect_ratio: 1.0,
        };
        view.restore_settings(&ViewSettings::default_for(ViewMode::Layer));
        view
    }

    /// Place `source` at `depth` and return the depth it ended up at.
    ///
    /// A negative `depth` puts it in front of the current front-most
    /// source. The depth is clamped to `[0, MAX_DEPTH - 2]` and the source
    /// moves along the diagonal `y = x / aspect_ratio`.
    pub fn set_depth(&mut self, source: &mut Source, depth: f32, deep: &mut DeepUpdate) -> f32 {
        let depth = if depth.is_nan() { 0.0 } else { depth };
        let depth = if depth < 0.0 {
            let workspace = self.core.scene.workspace();
            self.core
                .scene
                .front(workspace)
                .and_then(|front| self.core.scene.node(front))
                .map_or(DEPTH_FRONT_INCREMENT, |n| {
                    n.transform.translation.z + DEPTH_FRONT_INCREMENT
                })
        } else {
            depth
        };

        let aspect_ratio = self.aspect_ratio;
        let Some(transform) = self.core.source_transform_mut(source) else {
            return 0.0;
        };
        transform.translation.x = (-depth).clamp(-(MAX_DEPTH - 2.0), 0.0);
        transform.translation.y = transform.translation.x / aspect_ratio;
        transform.translation.z = -transform.translation.x;
        let depth = transform.translation.z;

        source.touch();
        deep.request();
        depth
    }
}

impl View for LayerView {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    /// Keep the sources on the diagonal of the output aspect ratio.
    fn update(&mut self, frame: &FrameContext) {
        if frame.deep_update {
            let aspect_ratio = frame.output_aspect_ratio;
            self.aspect_ratio = aspect_ratio;
            let background = self.core.scene.background();
            let workspace = self.core.scene.workspace();
            for_each_child(&mut self.core.scene, background, |t| t.scale.x = aspect_ratio);
            for_each_child(&mut self.core.scene, workspace, |t| {
                t.translation.y = t.translation.x / aspect_ratio;
            });
        }
        self.core.update_scene(frame);
    }

    fn grab(
        &mut self,
        from: Vec2,
        to: Vec2,
        source: Option<&mut Source>,
        _pick: Option<PickHit>,
        _modifier: bool,
        deep: &mut DeepUpdate,
    ) -> Cursor {
        let Some(source) = source else {
            return Cursor::Arrow;
        };
        let Some(anchor) = self.core.grab_anchor(from, source) else {
            return Cursor::Arrow;
        };
        let delta = self.core.unproject_in_workspace(to) - self.core.unproject_in_workspace(from);
        let x = anchor.transform.translation.x + delta.x;
        self.set_depth(source, (-x).max(0.0), deep);
        Cursor::ResizeNESW
    }
}
