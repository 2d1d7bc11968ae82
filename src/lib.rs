//! Immersive Mixer Library
//!
//! Compositing core of a live video mixer. Every source renders into its
//! own frame buffer and appears in four views: the rendering view composes
//! the session output, while the mixing, geometry and layer views let the
//! user set opacity, placement and depth of each source independently.
//!
//! - [`scene`]: node arena, transforms and the visitor traversals
//! - [`compositor`]: frame buffers, shared geometry and textures
//! - [`view`]: the four views and their gestures
//! - [`mixer`]: the frame loop tying sources, session and views together

pub mod compositor;
pub mod gpu;
pub mod mixer;
pub mod scene;
pub mod session;
pub mod settings;
pub mod shaders;
pub mod source;
pub mod telemetry;
pub mod video;
pub mod view;

pub use compositor::{BlendMode, FrameBuffer, RenderContext, Resolution};
pub use gpu::{GpuBackend, GpuError, GpuResult, HeadlessBackend, WgpuBackend};
pub use mixer::Mixer;
pub use scene::{NodeId, Scene, Transform};
pub use session::Session;
pub use settings::{MixerSettings, SettingsError};
pub use source::{Source, SourceId, SourceKind};
pub use video::{MediaPlayer, StillImagePlayer};
pub use view::{Cursor, View, ViewMode};
