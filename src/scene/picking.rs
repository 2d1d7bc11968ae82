//! Hit-testing traversal

use glam::{Mat4, Vec2};

use super::node::{NodeId, NodeKind, HANDLE_SIZE};
use super::store::Scene;
use super::visitor::{walk_active_child, walk_visible_children, Visitor};

/// Node under the picked point, with the point in the node's local frame.
///
/// For handles, `local` is the position of the handle that was hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickHit {
    pub node: NodeId,
    pub local: Vec2,
}

/// Collects hits in pre-order; later hits are in front of earlier ones.
#[derive(Debug)]
pub struct PickingVisitor {
    point: Vec2,
    hits: Vec<PickHit>,
}

impl PickingVisitor {
    pub fn new(point: Vec2) -> Self {
        Self {
            point,
            hits: Vec::new(),
        }
    }

    pub fn into_hits(self) -> Vec<PickHit> {
        self.hits
    }

    /// Picked point in the local frame of `id`, if the node is visible and
    /// its transform can be inverted.
    fn local_point(&self, scene: &Scene, id: NodeId) -> Option<(Vec2, Mat4)> {
        let node = scene.node(id).filter(|n| n.visible)?;
        let world = node.world();
        if world.determinant().abs() < f32::EPSILON {
            return None;
        }
        let local = world.inverse().transform_point3(self.point.extend(0.0));
        Some((local.truncate(), world))
    }

    fn hit_if(&mut self, scene: &Scene, id: NodeId, inside: impl Fn(Vec2) -> bool) {
        if let Some((local, _)) = self.local_point(scene, id) {
            if inside(local) {
                self.hits.push(PickHit { node: id, local });
            }
        }
    }
}

fn in_unit_square(p: Vec2) -> bool {
    p.x.abs() <= 1.0 && p.y.abs() <= 1.0
}

impl Visitor for PickingVisitor {
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

    fn visit_surface(&mut self, scene: &mut Scene, id: NodeId) {
        self.hit_if(scene, id, in_unit_square);
    }

    fn visit_line_square(&mut self, scene: &mut Scene, id: NodeId) {
        self.hit_if(scene, id, in_unit_square);
    }

    fn visit_line_circle(&mut self, scene: &mut Scene, id: NodeId) {
        self.hit_if(scene, id, |p| p.length() <= 1.0);
    }

    fn visit_handles(&mut self, scene: &mut Scene, id: NodeId) {
        let Some((local, world)) = self.local_point(scene, id) else {
            return;
        };
        let Some(NodeKind::Handles(handles)) = scene.node(id).map(|n| n.kind()) else {
            return;
        };

        // tolerance is a constant scene-space size, converted per axis
        let (scale, _, _) = world.to_scale_rotation_translation();
        let tolerance = Vec2::new(
            2.0 * HANDLE_SIZE / scale.x.abs().max(f32::EPSILON),
            2.0 * HANDLE_SIZE / scale.y.abs().max(f32::EPSILON),
        );
        let hit = handles.kind.positions().iter().find(|p| {
            let d = (local - **p).abs();
            d.x <= tolerance.x && d.y <= tolerance.y
        });
        if let Some(position) = hit {
            self.hits.push(PickHit {
                node: id,
                local: *position,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::node::{HandleKind, Handles, Node, Transform};
    use crate::scene::primitive::Primitive;
    use crate::shaders::Shader;
    use glam::{Vec3, Vec4};

    #[test]
    fn test_pick_surface_in_local_frame() {
        let mut scene = Scene::new();
        let group = scene.add(
            scene.workspace(),
            Node::group().with_transform(Transform {
                translation: Vec3::new(1.0, 0.0, 0.0),
                scale: Vec3::new(0.5, 0.5, 1.0),
                ..Transform::IDENTITY
            }),
        );
        let surface = scene.add(group, Node::primitive(Primitive::surface()));
        scene.update(0.0);

        let hits = scene.pick(Vec2::new(1.25, 0.25));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node, surface);
        assert!(hits[0].local.abs_diff_eq(Vec2::new(0.5, 0.5), 1e-5));

        assert!(scene.pick(Vec2::new(0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_pick_skips_hidden_and_degenerate() {
        let mut scene = Scene::new();
        let hidden = scene.add(scene.workspace(), Node::primitive(Primitive::surface()));
        scene.node_mut(hidden).unwrap().visible = false;
        scene.add(
            scene.workspace(),
            Node::primitive(Primitive::surface())
                .with_transform(Transform::from_scale(Vec3::new(0.0, 1.0, 1.0))),
        );
        scene.update(0.0);
        assert!(scene.pick(Vec2::ZERO).is_empty());
    }

    #[test]
    fn test_pick_order_is_back_to_front() {
        let mut scene = Scene::new();
        let back = scene.add(scene.workspace(), Node::primitive(Primitive::surface()));
        let front = scene.add(
            scene.workspace(),
            Node::primitive(Primitive::line_circle(Vec4::ONE, 1.0)),
        );
        scene.update(0.0);
        let hits = scene.pick(Vec2::new(0.1, 0.1));
        assert_eq!(hits.iter().map(|h| h.node).collect::<Vec<_>>(), [back, front]);
        // outside the circle but inside the square
        let hits = scene.pick(Vec2::new(0.9, 0.9));
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_pick_handle_reports_position() {
        let mut scene = Scene::new();
        let handles = scene.add(
            scene.workspace(),
            Node::handles(Handles::new(HandleKind::Resize, Shader::flat(Vec4::ONE)))
                .with_transform(Transform::from_scale(Vec3::new(2.0, 1.0, 1.0))),
        );
        scene.update(0.0);
        let hits = scene.pick(Vec2::new(2.02, 0.99));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node, handles);
        assert_eq!(hits[0].local, Vec2::new(1.0, 1.0));
        assert!(scene.pick(Vec2::new(0.0, 0.0)).is_empty());
    }
}
