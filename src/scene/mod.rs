//! Scene graph
//!
//! Each view owns one [`Scene`]: an arena of [`Node`]s below a fixed
//! background / workspace / foreground topology. Traversals are
//! [`Visitor`] implementations: [`UpdateVisitor`], [`DrawVisitor`],
//! [`PickingVisitor`] and [`GarbageVisitor`].

pub mod draw;
pub mod garbage;
pub mod node;
pub mod picking;
pub mod primitive;
pub mod shapes;
pub mod store;
pub mod update;
pub mod visitor;

pub use draw::DrawVisitor;
pub use garbage::GarbageVisitor;
pub use node::{
    Animation, Group, HandleKind, Handles, Node, NodeId, NodeKind, Switch, Transform, HANDLE_SIZE,
};
pub use picking::{PickHit, PickingVisitor};
pub use primitive::{Primitive, Shape, SurfaceContent};
pub use store::Scene;
pub use update::UpdateVisitor;
pub use visitor::{walk_active_child, walk_children, walk_visible_children, Visitor};
