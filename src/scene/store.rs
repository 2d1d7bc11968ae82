//! Node arena of one view
//!
//! A [`Scene`] owns every node of one view in a slot arena addressed by
//! generational [`NodeId`]s. The topology below the root is fixed:
//!
//! ```text
//! root
//! ├── background
//! ├── workspace      (one group per source)
//! └── foreground
//! ```

use glam::{Mat4, Vec2};

use super::node::{Node, NodeId, NodeKind};
use super::primitive::Primitive;
use super::draw::DrawVisitor;
use super::garbage::GarbageVisitor;
use super::picking::{PickHit, PickingVisitor};
use super::update::UpdateVisitor;
use super::visitor::Visitor;
use crate::compositor::RenderContext;
use crate::gpu::GpuResult;

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Scene graph of one view.
#[derive(Debug)]
pub struct Scene {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    background: NodeId,
    workspace: NodeId,
    foreground: NodeId,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        let mut scene = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId::DANGLING,
            background: NodeId::DANGLING,
            workspace: NodeId::DANGLING,
            foreground: NodeId::DANGLING,
        };
        scene.root = scene.insert(Node::group());
        scene.background = scene.add(scene.root, Node::group());
        scene.workspace = scene.add(scene.root, Node::group());
        scene.foreground = scene.add(scene.root, Node::group());
        scene
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn background(&self) -> NodeId {
        self.background
    }

    pub fn workspace(&self) -> NodeId {
        self.workspace
    }

    pub fn foreground(&self) -> NodeId {
        self.foreground
    }

    fn is_fixed(&self, id: NodeId) -> bool {
        id == self.root || id == self.background || id == self.workspace || id == self.foreground
    }

    /// Number of live nodes, the four fixed groups included
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn primitive(&self, id: NodeId) -> Option<&Primitive> {
        self.node(id).and_then(Node::as_primitive)
    }

    pub fn primitive_mut(&mut self, id: NodeId) -> Option<&mut Primitive> {
        self.node_mut(id).and_then(Node::as_primitive_mut)
    }

    /// Insert a detached node.
    pub fn insert(&mut self, mut node: Node) -> NodeId {
        node.parent = None;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    /// Insert a node as last child of `parent`.
    pub fn add(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.insert(node);
        if !self.attach(parent, id) {
            tracing::warn!("Scene: {:?} cannot hold children, node left detached", parent);
        }
        id
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .and_then(|n| n.kind.children())
            .unwrap_or(&[])
    }

    /// True when `ancestor` is `id` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Append `child` to the children of `parent`. Fails when the child is
    /// already attached, the parent is not a container, or the link would
    /// create a cycle.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> bool {
        let index = self.children(parent).len();
        self.insert_child(parent, index, child)
    }

    /// Insert `child` at `index` among the children of `parent`.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> bool {
        match self.node(child) {
            Some(node) if node.parent.is_none() => {}
            _ => return false,
        }
        if self.is_ancestor(child, parent) {
            return false;
        }
        let Some(children) = self.node_mut(parent).and_then(|n| n.kind.children_mut()) else {
            return false;
        };
        let index = index.min(children.len());
        children.insert(index, child);
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        true
    }

    /// Remove `child` from its parent, keeping its subtree alive.
    pub fn detach(&mut self, child: NodeId) -> bool {
        let Some(parent) = self.parent(child) else {
            return false;
        };
        if let Some(children) = self.node_mut(parent).and_then(|n| n.kind.children_mut()) {
            children.retain(|c| *c != child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = None;
        }
        true
    }

    /// Stable sort of the children of `id` by `key`.
    pub fn sort_children_by_key(&mut self, id: NodeId, key: impl Fn(&Node) -> f32) {
        let mut keyed: Vec<(f32, NodeId)> = self
            .children(id)
            .iter()
            .map(|c| (self.node(*c).map(&key).unwrap_or(0.0), *c))
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        if let Some(children) = self.node_mut(id).and_then(|n| n.kind.children_mut()) {
            *children = keyed.into_iter().map(|(_, c)| c).collect();
        }
    }

    /// Child of `id` with the largest translation z.
    pub fn front(&self, id: NodeId) -> Option<NodeId> {
        self.children(id)
            .iter()
            .filter_map(|c| self.node(*c).map(|n| (n.transform.translation.z, *c)))
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, c)| c)
    }

    /// Dispatch `visitor` on node `id` (see [`Visitor`]).
    pub fn accept<V: Visitor + ?Sized>(&mut self, id: NodeId, visitor: &mut V) {
        use super::primitive::{ShapeTag, SurfaceTag};

        enum Tag {
            Group,
            Switch,
            Animation,
            Handles,
            Primitive(ShapeTag),
        }

        let tag = match self.node(id).map(|n| &n.kind) {
            Some(NodeKind::Group(_)) => Tag::Group,
            Some(NodeKind::Switch(_)) => Tag::Switch,
            Some(NodeKind::Animation(_)) => Tag::Animation,
            Some(NodeKind::Handles(_)) => Tag::Handles,
            Some(NodeKind::Primitive(p)) => Tag::Primitive(p.tag()),
            None => return,
        };

        visitor.visit_node(self, id);
        match tag {
            Tag::Group => visitor.visit_group(self, id),
            Tag::Switch => visitor.visit_switch(self, id),
            Tag::Animation => visitor.visit_animation(self, id),
            Tag::Handles => visitor.visit_handles(self, id),
            Tag::Primitive(shape) => {
                visitor.visit_primitive(self, id);
                if let Some(primitive) = self.primitive_mut(id) {
                    visitor.visit_shader(&mut primitive.shader);
                }
                match shape {
                    ShapeTag::Surface(content) => {
                        visitor.visit_surface(self, id);
                        match content {
                            SurfaceTag::Plain => {}
                            SurfaceTag::Image => visitor.visit_image_surface(self, id),
                            SurfaceTag::Media => {
                                visitor.visit_media_surface(self, id);
                                if let Some(player) =
                                    self.primitive_mut(id).and_then(|p| p.media_player_mut())
                                {
                                    visitor.visit_media_player(player);
                                }
                            }
                            SurfaceTag::FrameBuffer => visitor.visit_frame_buffer_surface(self, id),
                        }
                    }
                    ShapeTag::LineStrip => visitor.visit_line_strip(self, id),
                    ShapeTag::LineSquare => visitor.visit_line_square(self, id),
                    ShapeTag::LineCircle => visitor.visit_line_circle(self, id),
                    ShapeTag::Points => visitor.visit_points(self, id),
                    ShapeTag::Mesh => visitor.visit_mesh(self, id),
                }
            }
        }
    }

    /// Advance animations and recompute world transforms.
    pub fn update(&mut self, dt: f32) {
        let mut visitor = UpdateVisitor::new(dt);
        visitor.visit_scene(self);
    }

    /// Draw every visible node with `modelview` as the base transform.
    pub fn draw(
        &mut self,
        ctx: &mut RenderContext,
        modelview: Mat4,
        projection: Mat4,
    ) -> GpuResult<usize> {
        let mut visitor = DrawVisitor::new(ctx, modelview, projection);
        visitor.visit_scene(self);
        visitor.finish()
    }

    /// Hit-test a scene-space point; hits are in pre-order, the last one is
    /// front-most.
    pub fn pick(&mut self, point: Vec2) -> Vec<PickHit> {
        let mut visitor = PickingVisitor::new(point);
        visitor.visit_scene(self);
        visitor.into_hits()
    }

    /// Destroy `id` and its subtree, releasing GPU resources. The fixed
    /// groups cannot be destroyed.
    pub fn destroy(&mut self, id: NodeId, ctx: &mut RenderContext) -> bool {
        if self.is_fixed(id) || !self.contains(id) {
            return false;
        }
        self.detach(id);
        let mut visitor = GarbageVisitor::new(ctx);
        self.accept(id, &mut visitor);
        for node in visitor.into_collected() {
            self.remove_slot(node);
        }
        true
    }

    fn remove_slot(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            if slot.generation == id.generation && slot.node.take().is_some() {
                self.free.push(id.index);
            }
        }
    }

    /// World transform from local coordinates of `id` to scene space, as of
    /// the last update pass
    pub fn world(&self, id: NodeId) -> Option<Mat4> {
        self.node(id).map(|n| n.world)
    }

    /// Compose the local transforms from the root down to `id`, without
    /// waiting for an update pass.
    pub fn compose_world(&self, id: NodeId) -> Option<Mat4> {
        let mut matrix = self.node(id)?.transform.matrix();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            let node = self.node(parent)?;
            matrix = node.transform.matrix() * matrix;
            current = node.parent;
        }
        Some(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::node::Transform;
    use glam::Vec3;

    #[test]
    fn test_fixed_topology() {
        let scene = Scene::new();
        assert_eq!(
            scene.children(scene.root()),
            &[scene.background(), scene.workspace(), scene.foreground()]
        );
        assert_eq!(scene.len(), 4);
    }

    #[test]
    fn test_attach_rejects_second_parent_and_cycles() {
        let mut scene = Scene::new();
        let a = scene.add(scene.workspace(), Node::group());
        let b = scene.add(a, Node::group());

        assert!(!scene.attach(scene.foreground(), b));
        assert!(!scene.attach(b, a));
        scene.detach(a);
        assert!(!scene.attach(b, a));
        assert!(scene.attach(scene.workspace(), a));
    }

    #[test]
    fn test_stale_id_does_not_resolve() {
        let mut ctx = RenderContext::headless();
        let mut scene = Scene::new();
        let a = scene.add(scene.workspace(), Node::group());
        assert!(scene.destroy(a, &mut ctx));
        let b = scene.add(scene.workspace(), Node::group());
        assert_eq!(a.index, b.index);
        assert!(scene.node(a).is_none());
        assert!(scene.node(b).is_some());
    }

    #[test]
    fn test_destroy_removes_subtree() {
        let mut ctx = RenderContext::headless();
        let mut scene = Scene::new();
        let group = scene.add(scene.workspace(), Node::group());
        let child = scene.add(group, Node::primitive(Primitive::surface()));
        scene.add(group, Node::primitive(Primitive::line_circle(glam::Vec4::ONE, 1.0)));

        assert_eq!(scene.len(), 7);
        assert!(scene.destroy(group, &mut ctx));
        assert_eq!(scene.len(), 4);
        assert!(!scene.contains(child));
        assert!(scene.children(scene.workspace()).is_empty());
        assert!(!scene.destroy(scene.workspace(), &mut ctx));
    }

    #[test]
    fn test_sort_children_is_stable() {
        let mut scene = Scene::new();
        let ws = scene.workspace();
        let z = |z: f32| Node::group().with_transform(Transform::from_translation(Vec3::new(0.0, 0.0, z)));
        let a = scene.add(ws, z(2.0));
        let b = scene.add(ws, z(1.0));
        let c = scene.add(ws, z(2.0));
        let d = scene.add(ws, z(0.5));

        scene.sort_children_by_key(ws, |n| n.transform.translation.z);
        assert_eq!(scene.children(ws), &[d, b, a, c]);
        // ties resolve to the last of the equal children
        assert_eq!(scene.front(ws), Some(c));
    }

    #[test]
    fn test_compose_world_matches_update() {
        let mut scene = Scene::new();
        let a = scene.add(
            scene.workspace(),
            Node::group().with_transform(Transform::from_translation(Vec3::new(1.0, 0.0, 0.0))),
        );
        let b = scene.add(
            a,
            Node::group().with_transform(Transform::from_scale(Vec3::new(2.0, 3.0, 1.0))),
        );
        scene.update(0.0);
        let composed = scene.compose_world(b).unwrap();
        assert!(composed.abs_diff_eq(scene.world(b).unwrap(), 1e-6));
    }
}
