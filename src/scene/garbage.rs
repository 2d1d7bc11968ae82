//! Destruction traversal

use super::node::{NodeId, NodeKind};
use super::store::Scene;
use super::visitor::{walk_children, Visitor};
use crate::compositor::RenderContext;
use crate::video::MediaPlayer;

/// Releases the GPU resources of a subtree and lists its nodes for removal.
pub struct GarbageVisitor<'a> {
    ctx: &'a mut RenderContext,
    collected: Vec<NodeId>,
}

impl<'a> GarbageVisitor<'a> {
    pub fn new(ctx: &'a mut RenderContext) -> Self {
        Self {
            ctx,
            collected: Vec::new(),
        }
    }

    pub fn into_collected(self) -> Vec<NodeId> {
        self.collected
    }
}

impl Visitor for GarbageVisitor<'_> {
    fn visit_node(&mut self, _scene: &mut Scene, id: NodeId) {
        self.collected.push(id);
    }

    // every child goes, not only the active one
    fn visit_switch(&mut self, scene: &mut Scene, id: NodeId) {
        walk_children(self, scene, id);
    }

    fn visit_primitive(&mut self, scene: &mut Scene, id: NodeId) {
        if let Some(primitive) = scene.primitive_mut(id) {
            primitive.release(self.ctx);
        }
    }

    fn visit_handles(&mut self, scene: &mut Scene, id: NodeId) {
        if let Some(NodeKind::Handles(handles)) = scene.node_mut(id).map(|n| n.kind_mut()) {
            if let Some(geometry) = handles.geometry.take() {
                let (gpu, cache, _) = self.ctx.parts();
                cache.release(gpu, geometry);
            }
        }
    }

    fn visit_media_player(&mut self, player: &mut dyn MediaPlayer) {
        player.close(self.ctx.gpu());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;
    use crate::scene::node::Node;
    use crate::scene::primitive::Primitive;
    use glam::Vec4;

    #[test]
    fn test_destroy_releases_geometry_of_inactive_switch_children() {
        let (backend, probe) = HeadlessBackend::with_probe();
        let mut ctx = RenderContext::new(Box::new(backend));
        let mut scene = Scene::new();
        let switch = scene.add(scene.workspace(), Node::switch());
        let a = scene.add(switch, Node::primitive(Primitive::surface()));
        let b = scene.add(switch, Node::primitive(Primitive::line_circle(Vec4::ONE, 1.0)));
        for id in [a, b] {
            let node = scene.node_mut(id).unwrap();
            let transform = &mut node.transform;
            if let NodeKind::Primitive(p) = &mut node.kind {
                p.init(&mut ctx, transform).unwrap();
            }
        }
        assert_eq!(probe.stats().live_geometries, 2);

        assert!(scene.destroy(switch, &mut ctx));
        assert_eq!(probe.stats().live_geometries, 0);
        assert!(!scene.contains(a) && !scene.contains(b));
    }
}
