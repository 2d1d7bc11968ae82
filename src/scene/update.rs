//! Update traversal: animations, media aspect ratios and world transforms

use glam::Mat4;

use super::node::{NodeId, NodeKind};
use super::primitive::{Shape, SurfaceContent};
use super::store::Scene;
use super::visitor::Visitor;
use crate::video::MediaPlayer;

/// Recomputes `world = parent.world · T · R · S` in pre-order.
#[derive(Debug)]
pub struct UpdateVisitor {
    dt: f32,
}

impl UpdateVisitor {
    pub fn new(dt: f32) -> Self {
        Self { dt }
    }
}

impl Visitor for UpdateVisitor {
    fn visit_node(&mut self, scene: &mut Scene, id: NodeId) {
        let parent_world = scene
            .parent(id)
            .and_then(|p| scene.world(p))
            .unwrap_or(Mat4::IDENTITY);
        let Some(node) = scene.node_mut(id) else {
            return;
        };

        match &mut node.kind {
            NodeKind::Animation(animation) => animation.step(self.dt, &mut node.transform),
            NodeKind::Primitive(primitive) => {
                if let Shape::Surface(SurfaceContent::Media { player, .. }) = &primitive.shape {
                    if player.is_open() {
                        node.transform.scale.x = player.aspect_ratio();
                    }
                }
            }
            _ => {}
        }

        node.world = parent_world * node.transform.matrix();
    }

    fn visit_media_player(&mut self, player: &mut dyn MediaPlayer) {
        player.update();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::node::{Node, Transform};
    use glam::Vec3;

    fn random_transform(seed: u32) -> Transform {
        let f = |k: u32| ((seed.wrapping_mul(2654435761).wrapping_add(k * 40503)) % 1000) as f32 / 1000.0;
        Transform {
            translation: Vec3::new(f(1) * 2.0 - 1.0, f(2) * 2.0 - 1.0, f(3)),
            rotation: Vec3::new(0.0, 0.0, f(4) * 6.0),
            scale: Vec3::new(0.5 + f(5), 0.5 + f(6), 1.0),
        }
    }

    #[test]
    fn test_world_composes_parent_and_local() {
        for depth in 1..=5u32 {
            let mut scene = Scene::new();
            let mut parent = scene.workspace();
            let mut chain = Vec::new();
            for level in 0..depth {
                let node = Node::group().with_transform(random_transform(depth * 10 + level));
                parent = scene.add(parent, node);
                chain.push(parent);
            }
            scene.update(0.016);

            for id in chain {
                let node = scene.node(id).unwrap();
                let parent_world = scene.world(node.parent().unwrap()).unwrap();
                let expected = parent_world * node.transform.matrix();
                assert!(node.world().abs_diff_eq(expected, 1e-5));

                // decomposing the local part gives back the node's transform
                let local = parent_world.inverse() * node.world();
                let (scale, rotation, translation) = local.to_scale_rotation_translation();
                assert!(scale.abs_diff_eq(node.transform.scale, 1e-4));
                assert!(translation.abs_diff_eq(node.transform.translation, 1e-4));
                let (_, _, angle) = rotation.to_euler(glam::EulerRot::XYZ);
                let expected_angle = node.transform.rotation.z;
                let diff = (angle - expected_angle).rem_euclid(std::f32::consts::TAU);
                assert!(diff < 1e-3 || diff > std::f32::consts::TAU - 1e-3);
            }
        }
    }

    #[test]
    fn test_root_scale_reaches_leaves() {
        let mut scene = Scene::new();
        let root = scene.root();
        if let Some(node) = scene.node_mut(root) {
            node.transform.scale = Vec3::new(2.0, 2.0, 1.0);
        }
        let leaf = scene.add(
            scene.workspace(),
            Node::group().with_transform(Transform::from_translation(Vec3::new(0.5, 0.0, 0.0))),
        );
        scene.update(0.0);
        let p = scene.world(leaf).unwrap().transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn test_animation_advances_with_dt() {
        let mut scene = Scene::new();
        let anim = scene.add(scene.workspace(), Node::animation(1.0, 0.5));
        scene.update(0.25);
        scene.update(0.25);
        let node = scene.node(anim).unwrap();
        let expected = Vec3::new(0.5 * 0.5f32.cos(), 0.5 * 0.5f32.sin(), 0.0);
        assert!(node.transform.translation.abs_diff_eq(expected, 1e-5));
    }
}
