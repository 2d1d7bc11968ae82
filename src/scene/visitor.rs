//! Traversal dispatch
//!
//! A [`Visitor`] has one method per node kind. [`Scene::accept`] always
//! runs the generic behaviour first and the specific one last: every node
//! gets `visit_node`, every primitive gets `visit_primitive` and
//! `visit_shader` before its shape method, every surface gets `visit_surface`
//! before its content method. All methods default to doing nothing except
//! the container methods, which walk their children.
//!
//! New traversals implement the trait; new node kinds add one method here
//! and one arm in `Scene::accept`.

use super::node::{NodeId, NodeKind};
use super::store::Scene;
use crate::shaders::Shader;
use crate::video::MediaPlayer;

pub trait Visitor {
    /// Entry point: visit from the root.
    fn visit_scene(&mut self, scene: &mut Scene) {
        let root = scene.root();
        scene.accept(root, self);
    }

    fn visit_node(&mut self, _scene: &mut Scene, _id: NodeId) {}

    fn visit_group(&mut self, scene: &mut Scene, id: NodeId) {
        walk_children(self, scene, id);
    }

    fn visit_switch(&mut self, scene: &mut Scene, id: NodeId) {
        walk_active_child(self, scene, id);
    }

    fn visit_animation(&mut self, scene: &mut Scene, id: NodeId) {
        walk_children(self, scene, id);
    }

    fn visit_primitive(&mut self, _scene: &mut Scene, _id: NodeId) {}

    fn visit_surface(&mut self, _scene: &mut Scene, _id: NodeId) {}

    fn visit_image_surface(&mut self, _scene: &mut Scene, _id: NodeId) {}

    fn visit_media_surface(&mut self, _scene: &mut Scene, _id: NodeId) {}

    fn visit_frame_buffer_surface(&mut self, _scene: &mut Scene, _id: NodeId) {}

    fn visit_line_strip(&mut self, _scene: &mut Scene, _id: NodeId) {}

    fn visit_line_square(&mut self, _scene: &mut Scene, _id: NodeId) {}

    fn visit_line_circle(&mut self, _scene: &mut Scene, _id: NodeId) {}

    fn visit_points(&mut self, _scene: &mut Scene, _id: NodeId) {}

    fn visit_mesh(&mut self, _scene: &mut Scene, _id: NodeId) {}

    fn visit_handles(&mut self, _scene: &mut Scene, _id: NodeId) {}

    fn visit_shader(&mut self, _shader: &mut Shader) {}

    fn visit_media_player(&mut self, _player: &mut dyn MediaPlayer) {}
}

/// Visit every child of `id` in order.
pub fn walk_children<V: Visitor + ?Sized>(visitor: &mut V, scene: &mut Scene, id: NodeId) {
    let children = scene.children(id).to_vec();
    for child in children {
        scene.accept(child, visitor);
    }
}

/// Visit only the active child of a switch.
pub fn walk_active_child<V: Visitor + ?Sized>(visitor: &mut V, scene: &mut Scene, id: NodeId) {
    let active = match scene.node(id).map(|n| n.kind()) {
        Some(NodeKind::Switch(switch)) => scene.children(id).get(switch.active).copied(),
        _ => None,
    };
    if let Some(child) = active {
        scene.accept(child, visitor);
    }
}

/// Children walk for traversals that skip hidden subtrees.
pub fn walk_visible_children<V: Visitor + ?Sized>(
    visitor: &mut V,
    scene: &mut Scene,
    id: NodeId,
) {
    if scene.node(id).is_some_and(|n| n.visible) {
        walk_children(visitor, scene, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::node::Node;
    use crate::scene::primitive::Primitive;
    use glam::Vec4;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<&'static str>,
    }

    impl Visitor for Recorder {
        fn visit_node(&mut self, _scene: &mut Scene, _id: NodeId) {
            self.calls.push("node");
        }
        fn visit_group(&mut self, scene: &mut Scene, id: NodeId) {
            self.calls.push("group");
            walk_children(self, scene, id);
        }
        fn visit_primitive(&mut self, _scene: &mut Scene, _id: NodeId) {
            self.calls.push("primitive");
        }
        fn visit_shader(&mut self, _shader: &mut Shader) {
            self.calls.push("shader");
        }
        fn visit_surface(&mut self, _scene: &mut Scene, _id: NodeId) {
            self.calls.push("surface");
        }
        fn visit_image_surface(&mut self, _scene: &mut Scene, _id: NodeId) {
            self.calls.push("image");
        }
        fn visit_line_circle(&mut self, _scene: &mut Scene, _id: NodeId) {
            self.calls.push("circle");
        }
    }

    #[test]
    fn test_generic_behaviour_runs_first() {
        let mut scene = Scene::new();
        let image = scene.add(scene.workspace(), Node::primitive(Primitive::image_surface("a.png")));
        let mut recorder = Recorder::default();
        scene.accept(image, &mut recorder);
        assert_eq!(recorder.calls, ["node", "primitive", "shader", "surface", "image"]);

        let circle = scene.add(
            scene.workspace(),
            Node::primitive(Primitive::line_circle(Vec4::ONE, 1.0)),
        );
        let mut recorder = Recorder::default();
        scene.accept(circle, &mut recorder);
        assert_eq!(recorder.calls, ["node", "primitive", "shader", "circle"]);
    }

    #[test]
    fn test_switch_visits_active_child_only() {
        let mut scene = Scene::new();
        let switch = scene.add(scene.workspace(), Node::switch());
        scene.add(switch, Node::primitive(Primitive::surface()));
        scene.add(switch, Node::primitive(Primitive::line_circle(Vec4::ONE, 1.0)));
        if let Some(NodeKind::Switch(s)) = scene.node_mut(switch).map(|n| n.kind_mut()) {
            s.active = 1;
        }

        let mut recorder = Recorder::default();
        scene.accept(switch, &mut recorder);
        assert!(recorder.calls.contains(&"circle"));
        assert!(!recorder.calls.contains(&"surface"));
    }

    #[test]
    fn test_pre_order_over_scene() {
        let mut scene = Scene::new();
        let group = scene.add(scene.workspace(), Node::group());
        scene.add(group, Node::primitive(Primitive::surface()));
        let mut recorder = Recorder::default();
        recorder.visit_scene(&mut scene);
        // root, background, workspace, group, surface, foreground
        assert_eq!(recorder.calls.iter().filter(|c| **c == "group").count(), 5);
        assert_eq!(recorder.calls.last(), Some(&"group"));
    }
}
