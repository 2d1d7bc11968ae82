//! Mixing view: the distance to the center of the disk sets the opacity

use glam::{Vec2, Vec4};

use super::{Cursor, DeepUpdate, View, ViewCore, ViewMode, FRAME_COLOR};
use crate::compositor::RenderContext;
use crate::gpu::GpuResult;
use crate::scene::{Node, NodeId, PickHit, Primitive};
use crate::settings::ViewSettings;
use crate::source::Source;

#[derive(Debug)]
pub struct MixingView {
    core: ViewCore,
    disk: NodeId,
}

impl Default for MixingView {
    fn default() -> Self {
        Self::new()
    }
}

impl MixingView {
    pub fn new() -> Self {
        let mut core = ViewCore::new(ViewMode::Mixing);
        let background = core.scene.background();
        let disk = core
            .scene
            .add(background, Node::primitive(Primitive::mesh("disk", Vec4::ONE)));
        core.scene.add(
            background,
            Node::primitive(Primitive::line_circle(FRAME_COLOR, 2.0)),
        );
        let mut view = Self { core, disk };
        view.restore_settings(&ViewSettings::default_for(ViewMode::Mixing));
        view
    }
}

impl View for MixingView {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn draw(&mut self, ctx: &mut RenderContext) -> GpuResult<usize> {
        let (gpu, _, resources) = ctx.parts();
        let texture = resources.texture_mixing_quadratic(gpu)?;
        if let Some(disk) = self.core.scene.primitive_mut(self.disk) {
            disk.set_texture(Some(texture));
        }
        self.core.draw_scene(ctx)
    }

    /// Move the source on the disk.
    fn grab(
        &mut self,
        from: Vec2,
        to: Vec2,
        source: Option<&mut Source>,
        _pick: Option<PickHit>,
        _modifier: bool,
        _deep: &mut DeepUpdate,
    ) -> Cursor {
        let Some(source) = source else {
            return Cursor::Arrow;
        };
        let Some(anchor) = self.core.grab_anchor(from, source) else {
            return Cursor::Arrow;
        };
        let delta = self.core.unproject_in_workspace(to) - self.core.unproject_in_workspace(from);
        if let Some(transform) = self.core.source_transform_mut(source) {
            transform.translation.x = anchor.transform.translation.x + delta.x;
            transform.translation.y = anchor.transform.translation.y + delta.y;
        }
        source.touch();
        Cursor::ResizeAll
    }
}
