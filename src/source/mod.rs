//! Sources
//!
//! A [`Source`] is one compositing unit. It renders its content (a media
//! file, another source, or the session output) into a private frame
//! buffer, and shows that buffer in every view through one group per view:
//!
//! ```text
//! workspace
//! └── group              (transform edited by the view)
//!     ├── surface        (samples the source frame buffer)
//!     ├── overlay        (frame, handles; shown for the current source)
//!     └── icon           (mixing view only)
//! ```
//!
//! The rendering group is never edited directly: [`Source::update`] derives
//! it from the geometry group (position, rotation, scale) and the layer
//! group (depth), and derives the opacity from the mixing group.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Vec3, Vec4};

use crate::compositor::{BlendMode, FrameBuffer, RenderContext, Resolution, SharedFrameBuffer};
use crate::gpu::GpuResult;
use crate::scene::{
    HandleKind, Handles, Node, NodeId, Primitive, Scene, Shape, SurfaceContent, Transform,
};
use crate::shaders::Shader;
use crate::video::MediaPlayer;
use crate::view::{SceneSet, ViewMode};

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    fn next() -> Self {
        Self(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a source renders.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// A media file played by the content surface's player
    Media { path: PathBuf },
    /// Another source's frame, looked up by id every frame
    Clone { origin: Option<SourceId> },
    /// The session output of the previous frame
    Render,
}

/// Frame buffers a source may sample while rendering.
#[derive(Debug, Default, Clone)]
pub struct RenderInputs {
    /// Frame of the origin of a clone
    pub origin: Option<SharedFrameBuffer>,
    /// Session output
    pub session: Option<SharedFrameBuffer>,
}

/// Color of overlay frames and handles
const OVERLAY_COLOR: Vec4 = Vec4::new(1.0, 1.0, 1.0, 0.9);

/// Size of the mixing icon relative to the source
const ICON_SCALE: f32 = 0.15;

/// Two upper-case letters: first and last alphanumeric character of `name`.
pub fn initials(name: &str) -> String {
    let mut chars = name.chars().filter(|c| c.is_alphanumeric());
    let first = chars.next();
    let last = chars.last().or(first);
    first
        .into_iter()
        .chain(last)
        .flat_map(char::to_uppercase)
        .collect()
}

/// Compositing unit with one group per view and a private frame buffer.
#[derive(Debug)]
pub struct Source {
    id: SourceId,
    name: String,
    initials: String,
    kind: SourceKind,

    /// Group of this source in the scene of each view, by [`ViewMode::index`]
    groups: [NodeId; 4],
    overlays: [NodeId; 4],
    /// Frame-buffer surfaces, created once the frame buffer exists
    surfaces: [Option<NodeId>; 4],
    /// Handle nodes in the geometry overlay, in [`HandleKind::ALL`] order
    handles: [NodeId; 4],

    /// Draws the content into `render_buffer`
    content: Primitive,
    render_buffer: Option<SharedFrameBuffer>,
    /// Opacity and blend mode of the rendering surface
    blending: Shader,

    initialized: bool,
    need_update: bool,
}

impl Source {
    fn new(
        name: impl Into<String>,
        kind: SourceKind,
        content: Primitive,
        scenes: &mut SceneSet<'_>,
    ) -> Self {
        let name = name.into();
        let mut groups = [NodeId::DANGLING; 4];
        let mut overlays = [NodeId::DANGLING; 4];
        let mut handles = [NodeId::DANGLING; 4];

        for mode in ViewMode::ALL {
            let scene = scenes.get_mut(mode);
            let group = scene.insert(Node::group());
            let overlay = scene.add(group, Node::group());
            if let Some(node) = scene.node_mut(overlay) {
                node.visible = false;
            }
            if mode != ViewMode::Rendering {
                scene.add(overlay, Node::primitive(Primitive::line_square(OVERLAY_COLOR, 1.5)));
            }
            if mode == ViewMode::Geometry {
                for (slot, kind) in handles.iter_mut().zip(HandleKind::ALL) {
                    *slot = scene.add(
                        overlay,
                        Node::handles(Handles::new(kind, Shader::flat(OVERLAY_COLOR))),
                    );
                }
            }
            groups[mode.index()] = group;
            overlays[mode.index()] = overlay;
        }

        tracing::info!("Source '{}' created", name);
        Self {
            id: SourceId::next(),
            initials: initials(&name),
            name,
            kind,
            groups,
            overlays,
            surfaces: [None; 4],
            handles,
            content,
            render_buffer: None,
            blending: Shader::default(),
            initialized: false,
            need_update: true,
        }
    }

    /// Source playing `path` through `player`.
    pub fn media(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        player: Box<dyn MediaPlayer>,
        scenes: &mut SceneSet<'_>,
    ) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut content = Primitive::media_surface(path.to_string_lossy(), player);
        content.shader = Shader::processing();
        Self::new(name, SourceKind::Media { path }, content, scenes)
    }

    /// Source showing the frame of `origin`.
    pub fn clone_of(name: impl Into<String>, origin: SourceId, scenes: &mut SceneSet<'_>) -> Self {
        Self::new(
            name,
            SourceKind::Clone {
                origin: Some(origin),
            },
            Primitive::new(Shape::Surface(SurfaceContent::Plain), Shader::processing()),
            scenes,
        )
    }

    /// Source showing the session output.
    pub fn render_output(name: impl Into<String>, scenes: &mut SceneSet<'_>) -> Self {
        Self::new(
            name,
            SourceKind::Render,
            Primitive::new(Shape::Surface(SurfaceContent::Plain), Shader::processing()),
            scenes,
        )
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.initials = initials(&self.name);
    }

    pub fn initials(&self) -> &str {
        &self.initials
    }

    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    /// Origin of a clone, `None` for other kinds or once the origin is gone
    pub fn origin(&self) -> Option<SourceId> {
        match self.kind {
            SourceKind::Clone { origin } => origin,
            _ => None,
        }
    }

    /// Forget `origin`; a clone of it fails from now on.
    pub(crate) fn invalidate_origin(&mut self, origin: SourceId) {
        if let SourceKind::Clone { origin: current } = &mut self.kind {
            if *current == Some(origin) {
                tracing::warn!("Source '{}' lost its origin {}", self.name, origin);
                *current = None;
            }
        }
    }

    /// Group of this source in the scene of `mode`.
    pub fn group(&self, mode: ViewMode) -> NodeId {
        self.groups[mode.index()]
    }

    pub fn overlay(&self, mode: ViewMode) -> NodeId {
        self.overlays[mode.index()]
    }

    /// Frame-buffer surface in the scene of `mode`, once initialized
    pub fn surface(&self, mode: ViewMode) -> Option<NodeId> {
        self.surfaces[mode.index()]
    }

    /// Which handle `node` of the geometry scene is, if it is one of ours
    pub fn handle_kind(&self, node: NodeId) -> Option<HandleKind> {
        self.handles
            .iter()
            .position(|h| *h == node)
            .map(|i| HandleKind::ALL[i])
    }

    /// True when `node` belongs to this source in the scene of `mode`.
    pub fn owns_node(&self, scene: &Scene, mode: ViewMode, node: NodeId) -> bool {
        scene.is_ancestor(self.group(mode), node)
    }

    pub fn media_player(&self) -> Option<&dyn MediaPlayer> {
        self.content.media_player()
    }

    pub fn media_player_mut(&mut self) -> Option<&mut dyn MediaPlayer> {
        self.content.media_player_mut()
    }

    /// Brightness, contrast and saturation of the content
    pub fn processing_shader_mut(&mut self) -> &mut Shader {
        &mut self.content.shader
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blending.blend
    }

    pub fn set_blend_mode(&mut self, blend: BlendMode) {
        self.blending.blend = blend;
        self.touch();
    }

    /// Opacity applied to the surfaces, derived from the mixing position
    pub fn alpha(&self) -> f32 {
        self.blending.color.w
    }

    /// Frame buffer the source renders into, once initialized
    pub fn frame(&self) -> Option<SharedFrameBuffer> {
        self.render_buffer.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Ask for the next [`Source::update`] to run.
    pub fn touch(&mut self) {
        self.need_update = true;
    }

    /// A failed source must not be rendered.
    pub fn failed(&self) -> bool {
        match &self.kind {
            SourceKind::Media { .. } => self.media_player().is_some_and(|p| p.failed()),
            SourceKind::Clone { origin } => origin.is_none(),
            SourceKind::Render => false,
        }
    }

    /// Create the frame buffer once the content size is known, and the
    /// surfaces showing it in every view.
    fn init(
        &mut self,
        ctx: &mut RenderContext,
        scenes: &mut SceneSet<'_>,
        inputs: &RenderInputs,
    ) -> GpuResult<()> {
        let (resolution, use_depth) = match &self.kind {
            SourceKind::Media { .. } => {
                let mut transform = Transform::IDENTITY;
                self.content.init(ctx, &mut transform)?;
                match self.content.media_player() {
                    Some(p) if p.is_open() && !p.failed() && p.width() > 0 && p.height() > 0 => {
                        (Resolution::new(p.width(), p.height()), true)
                    }
                    _ => return Ok(()),
                }
            }
            SourceKind::Clone { .. } => match &inputs.origin {
                Some(fb) => (fb.borrow().resolution(), false),
                None => return Ok(()),
            },
            SourceKind::Render => match &inputs.session {
                Some(fb) => (fb.borrow().resolution(), false),
                None => return Ok(()),
            },
        };

        let framebuffer =
            FrameBuffer::new(ctx.gpu(), &self.name, resolution, use_depth)?.into_shared();
        self.attach(scenes, &framebuffer);
        self.render_buffer = Some(framebuffer);
        self.initialized = true;
        self.need_update = true;
        tracing::info!("Source '{}' initialized at {}", self.name, resolution);
        Ok(())
    }

    fn attach(&mut self, scenes: &mut SceneSet<'_>, framebuffer: &SharedFrameBuffer) {
        let aspect_ratio = framebuffer.borrow().aspect_ratio();

        for mode in ViewMode::ALL {
            let shader = match mode {
                ViewMode::Rendering => self.blending.clone(),
                _ => Shader::default(),
            };
            let group = self.group(mode);
            let scene = scenes.get_mut(mode);
            let surface = scene.insert(Node::primitive(Primitive::frame_buffer_surface(
                framebuffer,
                shader,
            )));
            scene.insert_child(group, 0, surface);
            self.surfaces[mode.index()] = Some(surface);

            // sources keep their proportions in the interactive views
            if mode != ViewMode::Rendering {
                crate::view::for_each_child(scene, group, |t| t.scale.x = aspect_ratio);
            }
        }

        let icon = match &self.kind {
            SourceKind::Media { .. } => match self.media_player().and_then(|p| p.duration()) {
                Some(_) => "icon_video",
                None => "icon_image",
            },
            SourceKind::Clone { .. } => "icon_clone",
            SourceKind::Render => "icon_render",
        };
        let group = self.group(ViewMode::Mixing);
        scenes.mixing.add(
            group,
            Node::primitive(Primitive::mesh(icon, OVERLAY_COLOR)).with_transform(Transform {
                translation: Vec3::new(0.8 * aspect_ratio, -0.8, 0.0),
                scale: Vec3::new(ICON_SCALE, ICON_SCALE, 1.0),
                ..Transform::IDENTITY
            }),
        );
    }

    /// Render the content into the source frame buffer, initializing the
    /// source first if needed.
    pub fn render(
        &mut self,
        ctx: &mut RenderContext,
        scenes: &mut SceneSet<'_>,
        inputs: &RenderInputs,
    ) -> GpuResult<()> {
        if !self.initialized {
            self.init(ctx, scenes, inputs)?;
            if !self.initialized {
                return Ok(());
            }
        }
        let Some(framebuffer) = self.render_buffer.clone() else {
            return Ok(());
        };

        if let Some(player) = self.content.media_player_mut() {
            player.update();
        }

        let sampled = match &self.kind {
            SourceKind::Media { .. } => None,
            SourceKind::Clone { .. } => inputs.origin.as_ref(),
            SourceKind::Render => inputs.session.as_ref(),
        };
        let sampled = sampled.and_then(|fb| fb.borrow().texture());

        let framebuffer = framebuffer.borrow();
        let mut pass = framebuffer.begin(ctx)?;
        match (&self.kind, sampled) {
            (SourceKind::Media { .. }, _) => {
                self.content.draw(&mut pass, Mat4::IDENTITY, Mat4::IDENTITY)?;
            }
            (_, Some(texture)) => {
                self.content
                    .draw_with_texture(&mut pass, texture, Mat4::IDENTITY, Mat4::IDENTITY)?;
            }
            (_, None) => {
                let (gpu, _, resources) = pass.parts();
                let black = resources.texture_black(gpu)?;
                self.content
                    .draw_with_texture(&mut pass, black, Mat4::IDENTITY, Mat4::IDENTITY)?;
            }
        }
        pass.end()
    }

    /// Derive the rendering group and the opacity from the interactive
    /// groups. Only runs after [`Source::touch`].
    pub fn update(&mut self, scenes: &mut SceneSet<'_>) {
        if !self.need_update {
            return;
        }
        let transform_in = |scenes: &SceneSet<'_>, mode: ViewMode| {
            scenes
                .get(mode)
                .node(self.group(mode))
                .map(|n| n.transform)
                .unwrap_or_default()
        };
        let geometry = transform_in(&*scenes, ViewMode::Geometry);
        let layer = transform_in(&*scenes, ViewMode::Layer);
        let mixing = transform_in(&*scenes, ViewMode::Mixing);
        let depth = layer.translation.z;

        if let Some(node) = scenes.rendering.node_mut(self.group(ViewMode::Rendering)) {
            node.transform = Transform {
                translation: Vec3::new(geometry.translation.x, geometry.translation.y, depth),
                rotation: geometry.rotation,
                scale: geometry.scale,
            };
        }
        // keep the same stacking order in every view
        for mode in [ViewMode::Mixing, ViewMode::Geometry] {
            if let Some(node) = scenes.get_mut(mode).node_mut(self.group(mode)) {
                node.transform.translation.z = depth;
            }
        }

        let alpha = 1.0 - mixing.translation.truncate().length_squared().clamp(0.0, 1.0);
        self.blending.color.w = alpha;
        for mode in ViewMode::ALL {
            let Some(surface) = self.surface(mode) else {
                continue;
            };
            if let Some(primitive) = scenes.get_mut(mode).primitive_mut(surface) {
                primitive.shader.color.w = alpha;
                if mode == ViewMode::Rendering {
                    primitive.shader.blend = self.blending.blend;
                }
            }
        }
        self.need_update = false;
    }

    /// Destroy the groups in every scene and release GPU resources.
    pub fn destroy(mut self, ctx: &mut RenderContext, scenes: &mut SceneSet<'_>) {
        for mode in ViewMode::ALL {
            scenes.get_mut(mode).destroy(self.group(mode), ctx);
        }
        if let Some(player) = self.content.media_player_mut() {
            player.close(ctx.gpu());
        }
        self.content.release(ctx);
        if let Some(framebuffer) = self.render_buffer.take() {
            framebuffer.borrow_mut().release(ctx.gpu());
        }
        tracing::info!("Source '{}' destroyed", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;
    use crate::video::testing::ScriptedPlayer;

    struct Scenes {
        rendering: Scene,
        mixing: Scene,
        geometry: Scene,
        layer: Scene,
    }

    impl Scenes {
        fn new() -> Self {
            Self {
                rendering: Scene::new(),
                mixing: Scene::new(),
                geometry: Scene::new(),
                layer: Scene::new(),
            }
        }

        fn set(&mut self) -> SceneSet<'_> {
            SceneSet {
                rendering: &mut self.rendering,
                mixing: &mut self.mixing,
                geometry: &mut self.geometry,
                layer: &mut self.layer,
            }
        }
    }

    #[test]
    fn test_initials() {
        assert_eq!(initials("video"), "VO");
        assert_eq!(initials("  my clip-2 "), "M2");
        assert_eq!(initials("x"), "XX");
        assert_eq!(initials("--"), "");
    }

    #[test]
    fn test_media_source_lifecycle() {
        let (backend, probe) = HeadlessBackend::with_probe();
        let mut ctx = RenderContext::new(Box::new(backend));
        let mut scenes = Scenes::new();
        let mut source = Source::media(
            "clip",
            "clip.mov",
            Box::new(ScriptedPlayer::new(320, 180)),
            &mut scenes.set(),
        );
        assert!(source.handle_kind(source.handles[3]) == Some(HandleKind::Rotate));

        source
            .render(&mut ctx, &mut scenes.set(), &RenderInputs::default())
            .unwrap();
        assert!(source.is_initialized());
        let frame = source.frame().unwrap();
        assert_eq!(frame.borrow().resolution(), Resolution::new(320, 180));

        // surface first, then overlay, in every view
        for mode in ViewMode::ALL {
            let scene = scenes.set().get(mode).children(source.group(mode)).to_vec();
            assert_eq!(scene.first().copied(), source.surface(mode));
        }
        let mixing_children = scenes.mixing.children(source.group(ViewMode::Mixing));
        assert_eq!(mixing_children.len(), 3);

        source.destroy(&mut ctx, &mut scenes.set());
        assert_eq!(scenes.mixing.len(), 4);
        assert_eq!(scenes.geometry.len(), 4);
        ctx.shutdown();
        assert_eq!(probe.stats().live_textures, 0);
        assert_eq!(probe.stats().live_geometries, 0);
    }

    #[test]
    fn test_update_derives_rendering_group_and_alpha() {
        let mut ctx = RenderContext::headless();
        let mut scenes = Scenes::new();
        let mut source = Source::media(
            "clip",
            "clip.mov",
            Box::new(ScriptedPlayer::new(64, 64)),
            &mut scenes.set(),
        );
        source
            .render(&mut ctx, &mut scenes.set(), &RenderInputs::default())
            .unwrap();

        let geometry = Transform {
            translation: Vec3::new(0.5, -0.25, 0.0),
            rotation: Vec3::new(0.0, 0.0, 0.3),
            scale: Vec3::new(2.0, 1.5, 1.0),
        };
        scenes.geometry.node_mut(source.group(ViewMode::Geometry)).unwrap().transform = geometry;
        scenes.layer.node_mut(source.group(ViewMode::Layer)).unwrap().transform.translation.z = 3.0;
        scenes.mixing.node_mut(source.group(ViewMode::Mixing)).unwrap().transform.translation =
            Vec3::new(0.6, 0.0, 0.0);

        source.update(&mut scenes.set());
        let rendering = scenes.rendering.node(source.group(ViewMode::Rendering)).unwrap().transform;
        assert_eq!(rendering.translation, Vec3::new(0.5, -0.25, 3.0));
        assert_eq!(rendering.rotation, geometry.rotation);
        assert_eq!(rendering.scale, geometry.scale);
        assert!((source.alpha() - 0.64).abs() < 1e-6);
        let surface = source.surface(ViewMode::Rendering).unwrap();
        assert!((scenes.rendering.primitive(surface).unwrap().shader.color.w - 0.64).abs() < 1e-6);

        // not touched: further changes are ignored
        scenes.mixing.node_mut(source.group(ViewMode::Mixing)).unwrap().transform.translation =
            Vec3::new(2.0, 0.0, 0.0);
        source.update(&mut scenes.set());
        assert!((source.alpha() - 0.64).abs() < 1e-6);
        source.touch();
        source.update(&mut scenes.set());
        assert_eq!(source.alpha(), 0.0);

        source.destroy(&mut ctx, &mut scenes.set());
    }

    #[test]
    fn test_clone_fails_without_origin() {
        let mut scenes = Scenes::new();
        let origin = SourceId::next();
        let mut clone = Source::clone_of("copy", origin, &mut scenes.set());
        assert!(!clone.failed());
        clone.invalidate_origin(SourceId::next());
        assert!(!clone.failed());
        clone.invalidate_origin(origin);
        assert!(clone.failed());
        assert_eq!(clone.origin(), None);
    }

    #[test]
    fn test_render_output_source() {
        let mut scenes = Scenes::new();
        let source = Source::render_output("render", &mut scenes.set());
        assert_eq!(source.kind(), &SourceKind::Render);
        assert_eq!(source.initials(), "RR");
        assert_eq!(source.origin(), None);
        assert!(!source.failed());
        assert!(!source.is_initialized());
        for mode in ViewMode::ALL {
            assert!(scenes.set().get_mut(mode).contains(source.group(mode)));
        }
    }

    #[test]
    fn test_scripted_failure_reported() {
        let mut scenes = Scenes::new();
        let player = ScriptedPlayer::new(64, 64);
        let failed = player.failed.clone();
        let source = Source::media("clip", "clip.mov", Box::new(player), &mut scenes.set());
        assert!(!source.failed());
        failed.set(true);
        assert!(source.failed());
    }
}
