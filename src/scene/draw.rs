//! Draw traversal

use glam::{Mat4, Vec3};

use super::node::{HandleKind, NodeId, NodeKind, HANDLE_SIZE};
use super::store::Scene;
use super::visitor::{walk_active_child, walk_visible_children, Visitor};
use crate::compositor::{RenderContext, ShapeKey};
use crate::gpu::{GpuError, GpuResult};
use crate::scene::shapes;

/// Issues one draw call per visible, drawable primitive.
///
/// Primitives are initialized on their first visit. The first GPU error
/// stops further drawing and is returned by [`DrawVisitor::finish`].
pub struct DrawVisitor<'a> {
    ctx: &'a mut RenderContext,
    modelview: Mat4,
    projection: Mat4,
    count: usize,
    error: Option<GpuError>,
}

impl<'a> DrawVisitor<'a> {
    pub fn new(ctx: &'a mut RenderContext, modelview: Mat4, projection: Mat4) -> Self {
        Self {
            ctx,
            modelview,
            projection,
            count: 0,
            error: None,
        }
    }

    /// Number of draw calls issued, or the error that stopped the pass.
    pub fn finish(self) -> GpuResult<usize> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.count),
        }
    }

    fn record(&mut self, result: GpuResult<bool>) {
        match result {
            Ok(true) => self.count += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Draw pass stopped: {}", e);
                self.error = Some(e);
            }
        }
    }
}

impl Visitor for DrawVisitor<'_> {
    fn visit_group(&mut self, scene: &mut Scene, id: NodeId) {
        walk_visible_children(self, scene, id);
    }

    fn visit_switch(&mut self, scene: &mut Scene, id: NodeId) {
        if scene.node(id).is_some_and(|n| n.visible) {
            walk_active_child(self, scene, id);
        }
    }

    fn visit_animation(&mut self, scene: &mut Scene, id: NodeId) {
        walk_visible_children(self, scene, id);
    }

    fn visit_primitive(&mut self, scene: &mut Scene, id: NodeId) {
        if self.error.is_some() {
            return;
        }
        let Some(node) = scene.node_mut(id) else {
            return;
        };
        if !node.visible {
            return;
        }
        let modelview = self.modelview * node.world;
        let NodeKind::Primitive(primitive) = &mut node.kind else {
            return;
        };

        let ctx = &mut *self.ctx;
        let result = primitive.init(ctx, &mut node.transform).and_then(|()| {
            let drawable = primitive.geometry().is_some();
            primitive.draw(ctx, modelview, self.projection)?;
            Ok(drawable)
        });
        self.record(result);
    }

    fn visit_handles(&mut self, scene: &mut Scene, id: NodeId) {
        if self.error.is_some() {
            return;
        }
        let Some(node) = scene.node_mut(id) else {
            return;
        };
        if !node.visible {
            return;
        }
        let world = node.world;
        let NodeKind::Handles(handles) = &mut node.kind else {
            return;
        };

        let (gpu, cache, resources) = self.ctx.parts();
        let geometry = match handles.geometry {
            Some(geometry) => geometry,
            None => match cache.acquire(gpu, ShapeKey::Quad, || Some(shapes::quad())) {
                Ok(geometry) => {
                    handles.geometry = Some(geometry);
                    geometry
                }
                Err(e) => {
                    self.record(Err(e));
                    return;
                }
            },
        };
        let texture = match resources.texture_white(gpu) {
            Ok(texture) => texture,
            Err(e) => {
                self.record(Err(e));
                return;
            }
        };

        // markers keep a constant size whatever the scale of the handled node
        let (scale, _, _) = world.to_scale_rotation_translation();
        let marker = |s: f32| if s.abs() > f32::EPSILON { HANDLE_SIZE / s.abs() } else { HANDLE_SIZE };
        let size = match handles.kind {
            HandleKind::Rotate => 1.5,
            _ => 1.0,
        };
        let marker_scale = Vec3::new(marker(scale.x) * size, marker(scale.y) * size, 1.0);

        for position in handles.kind.positions() {
            let local = Mat4::from_translation(position.extend(0.0)) * Mat4::from_scale(marker_scale);
            let call = handles
                .shader
                .draw_call(geometry, texture, self.modelview * world * local, self.projection);
            let result = self.ctx.gpu().draw(&call).map(|()| true);
            self.record(result);
            if self.error.is_some() {
                return;
            }
        }
    }
}
