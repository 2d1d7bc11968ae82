//! Compositor module
//!
//! GPU-side building blocks shared by the scene graph and the views.
//!
//! # Architecture
//!
//! - `FrameBuffer`: render target whose color texture can be sampled elsewhere
//! - `GeometryCache`: reference-counted uploads of shared shapes
//! - `Resources`: placeholder, background and image textures
//! - `RenderContext`: the backend and both caches, threaded through every pass
//! - `BlendMode`: how a primitive combines with the target

pub mod blend;
pub mod context;
pub mod framebuffer;
pub mod geometry;
pub mod resources;

pub use blend::BlendMode;
pub use context::RenderContext;
pub use framebuffer::{
    FrameBuffer, FrameBufferScope, Resolution, SharedFrameBuffer, ASPECT_RATIO_PRESETS,
    HEIGHT_PRESETS, MIN_RESOLUTION,
};
pub use geometry::{GeometryCache, ShapeKey};
pub use resources::{ResourceError, Resources};

/// Output resolution for an aspect-ratio preset and a height preset.
pub fn resolution_from_parameters(aspect_ratio: usize, height: usize) -> Resolution {
    Resolution::from_presets(aspect_ratio, height)
}
