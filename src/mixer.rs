//! Mixer: the session, the interactive views and the frame loop
//!
//! One frame is [`Mixer::update`] (sources render, the output is composed,
//! views update) followed by [`Mixer::draw`] (the current view is drawn into
//! the display frame buffer). Source creation and deletion happen between
//! frames; the `&mut Mixer` they take cannot coexist with a running update.

use std::path::Path;
use std::time::Duration;

use glam::Vec2;

use crate::compositor::{FrameBuffer, RenderContext, Resolution, SharedFrameBuffer};
use crate::gpu::{GpuBackend, GpuResult};
use crate::scene::{NodeId, PickHit};
use crate::session::Session;
use crate::settings::{MixerSettings, SettingsError};
use crate::source::{Source, SourceId};
use crate::telemetry::{FrameProfiler, FrameStats, MixerMetrics};
use crate::video::{MediaPlayer, StillImagePlayer};
use crate::view::{
    Cursor, DeepUpdate, FrameContext, GeometryView, InteractiveScenes, LayerView, MixingView,
    SceneSet, View, ViewMode,
};

/// The three interactive views.
#[derive(Debug)]
struct Views {
    mixing: MixingView,
    geometry: GeometryView,
    layer: LayerView,
}

impl Views {
    fn scenes(&mut self) -> InteractiveScenes<'_> {
        InteractiveScenes {
            mixing: self.mixing.scene_mut(),
            geometry: self.geometry.scene_mut(),
            layer: self.layer.scene_mut(),
        }
    }

    fn get(&self, mode: ViewMode) -> Option<&dyn View> {
        match mode {
            ViewMode::Mixing => Some(&self.mixing),
            ViewMode::Geometry => Some(&self.geometry),
            ViewMode::Layer => Some(&self.layer),
            ViewMode::Rendering => None,
        }
    }

    fn get_mut(&mut self, mode: ViewMode) -> Option<&mut dyn View> {
        match mode {
            ViewMode::Mixing => Some(&mut self.mixing),
            ViewMode::Geometry => Some(&mut self.geometry),
            ViewMode::Layer => Some(&mut self.layer),
            ViewMode::Rendering => None,
        }
    }
}

#[derive(Debug)]
pub struct Mixer {
    session: Session,
    views: Views,
    current_view: ViewMode,
    current_source: Option<SourceId>,
    deep: DeepUpdate,
    /// Target of [`Mixer::draw`], sized like the window
    display: SharedFrameBuffer,
    settings: MixerSettings,
    profiler: FrameProfiler,
    output_primitives: usize,
}

impl Mixer {
    pub fn new(gpu: &mut dyn GpuBackend, settings: MixerSettings) -> GpuResult<Self> {
        let session = Session::new(gpu, &settings)?;
        let display = FrameBuffer::new(gpu, "Display", Resolution::new(1280, 720), false)?
            .into_shared();
        let mut mixer = Self {
            session,
            views: Views {
                mixing: MixingView::new(),
                geometry: GeometryView::new(),
                layer: LayerView::new(),
            },
            current_view: ViewMode::Mixing,
            current_source: None,
            deep: DeepUpdate::default(),
            display,
            settings,
            profiler: FrameProfiler::new(),
            output_primitives: 0,
        };
        mixer.apply_session_config();
        tracing::info!("Mixer ready, output {}", mixer.session.resolution());
        Ok(mixer)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The session output frame buffer.
    pub fn output(&self) -> SharedFrameBuffer {
        self.session.frame()
    }

    /// The frame buffer [`Mixer::draw`] renders the current view into.
    pub fn display(&self) -> SharedFrameBuffer {
        self.display.clone()
    }

    /// Request a deep update for the next frame.
    pub fn request_deep_update(&mut self) {
        self.deep.request();
    }

    // ---- frame loop ----

    /// Render the sources, compose the output and update every view.
    pub fn update(&mut self, ctx: &mut RenderContext, dt: f32) -> GpuResult<()> {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.profiler
            .record_frame(Duration::try_from_secs_f32(dt).unwrap_or(Duration::MAX));

        let deep_update = self.deep.take();
        self.output_primitives = self
            .session
            .update(ctx, dt, self.views.scenes(), deep_update)?;

        let frame = FrameContext {
            dt,
            deep_update,
            output_aspect_ratio: self.session.render_view().aspect_ratio(),
        };
        for mode in ViewMode::INTERACTIVE {
            if let Some(view) = self.views.get_mut(mode) {
                view.update(&frame);
            }
        }
        tracing::trace!(
            "Frame: {} sources, {} primitives in output",
            self.session.len(),
            self.output_primitives
        );
        Ok(())
    }

    /// Draw the current view into the display frame buffer.
    pub fn draw(&mut self, ctx: &mut RenderContext) -> GpuResult<usize> {
        let Some(view) = self.views.get_mut(self.current_view) else {
            return Ok(0);
        };
        let display = self.display.borrow();
        let mut pass = display.begin(ctx)?;
        let count = view.draw(&mut pass)?;
        pass.end()?;
        Ok(count)
    }

    /// Resize the display frame buffer and the view cameras to the window.
    pub fn set_viewport_size(
        &mut self,
        gpu: &mut dyn GpuBackend,
        width: u32,
        height: u32,
    ) -> GpuResult<()> {
        self.display
            .borrow_mut()
            .resize(gpu, Resolution::new(width, height))?;
        let viewport = Vec2::new(width as f32, height as f32);
        for mode in ViewMode::INTERACTIVE {
            if let Some(view) = self.views.get_mut(mode) {
                view.set_viewport(viewport);
            }
        }
        Ok(())
    }

    /// Resize the session output. Invalid sizes fall back to the presets.
    pub fn set_resolution(
        &mut self,
        gpu: &mut dyn GpuBackend,
        resolution: Resolution,
    ) -> GpuResult<()> {
        self.session.set_resolution(gpu, resolution)?;
        self.deep.request();
        Ok(())
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.profiler.stats()
    }

    pub fn metrics(&self) -> MixerMetrics {
        MixerMetrics {
            frame_stats: self.profiler.stats(),
            fps: self.profiler.fps(),
            source_count: self.session.len(),
            output_primitives: self.output_primitives,
            failed_source: self
                .session
                .failed_source()
                .and_then(|id| self.session.find(id))
                .map(|s| s.name().to_string()),
        }
    }

    // ---- sources ----

    /// `base`, or `base` followed by the first free number.
    fn unique_name(&self, base: &str) -> String {
        let base = if base.is_empty() { "source" } else { base };
        if self.session.find_by_name(base).is_none() {
            return base.to_string();
        }
        (2..)
            .map(|i| format!("{}{}", base, i))
            .find(|name| self.session.find_by_name(name).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    /// Build a source with groups in every view scene.
    fn build_source(
        &mut self,
        make: impl FnOnce(&mut SceneSet<'_>) -> Source,
    ) -> Source {
        let mut scenes = self.views.scenes();
        let mut set = scenes.with_rendering(self.session.render_view_mut().scene_mut());
        make(&mut set)
    }

    /// Source playing `path` through `player`, inserted as current.
    pub fn create_source_media(
        &mut self,
        path: impl AsRef<Path>,
        player: Box<dyn MediaPlayer>,
    ) -> SourceId {
        let path = path.as_ref();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = self.unique_name(&stem);
        let source = self.build_source(|set| Source::media(name, path, player, set));
        self.insert_source(source, true)
    }

    /// Source showing the image file at `path`.
    pub fn create_source_image(&mut self, path: impl AsRef<Path>) -> SourceId {
        self.create_source_media(path, Box::new(StillImagePlayer::new()))
    }

    /// Clone of the source named `origin`.
    pub fn create_source_clone(&mut self, origin: &str) -> Option<SourceId> {
        let origin_id = self.session.find_by_name(origin)?.id();
        let name = self.unique_name(&format!("{}_clone", origin));
        let source = self.build_source(|set| Source::clone_of(name, origin_id, set));
        Some(self.insert_source(source, true))
    }

    /// Source showing the session output.
    pub fn create_source_render(&mut self) -> SourceId {
        let name = self.unique_name("render");
        let source = self.build_source(|set| Source::render_output(name, set));
        self.insert_source(source, true)
    }

    /// Attach `source` to every view, in front of the other sources.
    pub fn insert_source(&mut self, mut source: Source, make_current: bool) -> SourceId {
        let scenes = self.views.scenes();
        for (mode, scene) in [
            (ViewMode::Mixing, &mut *scenes.mixing),
            (ViewMode::Geometry, &mut *scenes.geometry),
            (ViewMode::Layer, &mut *scenes.layer),
        ] {
            let workspace = scene.workspace();
            scene.attach(workspace, source.group(mode));
        }
        self.views.layer.set_depth(&mut source, -1.0, &mut self.deep);

        let id = self.session.add_source(source);
        self.deep.request();
        if make_current {
            self.set_current_source(id);
        }
        id
    }

    /// Remove and destroy the source `id`.
    pub fn delete_source(&mut self, ctx: &mut RenderContext, id: SourceId) -> bool {
        if self.current_source == Some(id) {
            self.unset_current_source();
        }
        let deleted = self.session.delete_source(ctx, id, self.views.scenes());
        if deleted {
            self.deep.request();
        }
        deleted
    }

    /// Give `id` a name no other source has. Returns the name given.
    pub fn rename_source(&mut self, id: SourceId, name: &str) -> Option<String> {
        if self.session.find(id)?.name() == name {
            return Some(name.to_string());
        }
        let name = self.unique_name(name);
        let source = self.session.find_mut(id)?;
        tracing::info!("Source '{}' renamed to '{}'", source.name(), name);
        source.set_name(name.clone());
        Some(name)
    }

    /// Place the source `id` at `depth` in the layer view; a negative depth
    /// puts it in front.
    pub fn set_depth(&mut self, id: SourceId, depth: f32) -> Option<f32> {
        let source = self.session.find_mut(id)?;
        Some(self.views.layer.set_depth(source, depth, &mut self.deep))
    }

    // ---- current source ----

    pub fn current_source(&self) -> Option<SourceId> {
        self.current_source
    }

    pub fn index_current_source(&self) -> Option<usize> {
        self.current_source.and_then(|id| self.session.index_of(id))
    }

    fn show_overlays(&mut self, id: SourceId, visible: bool) {
        let Some(source) = self.session.find(id) else {
            return;
        };
        for mode in ViewMode::INTERACTIVE {
            let overlay = source.overlay(mode);
            if let Some(node) = self
                .views
                .get_mut(mode)
                .and_then(|v| v.scene_mut().node_mut(overlay))
            {
                node.visible = visible;
            }
        }
    }

    pub fn set_current_source(&mut self, id: SourceId) -> bool {
        if self.session.find(id).is_none() {
            return false;
        }
        if let Some(previous) = self.current_source.take() {
            self.show_overlays(previous, false);
        }
        self.show_overlays(id, true);
        self.current_source = Some(id);
        true
    }

    pub fn set_current_source_by_name(&mut self, name: &str) -> bool {
        let id = self.session.find_by_name(name).map(Source::id);
        id.is_some_and(|id| self.set_current_source(id))
    }

    pub fn set_current_source_by_index(&mut self, index: usize) -> bool {
        let id = self.session.at(index).map(Source::id);
        id.is_some_and(|id| self.set_current_source(id))
    }

    /// Make the source owning `node` in the current view current.
    pub fn set_current_source_by_node(&mut self, node: NodeId) -> bool {
        let Some(view) = self.views.get(self.current_view) else {
            return false;
        };
        let id = self
            .session
            .find_by_node(view.scene(), self.current_view, node)
            .map(Source::id);
        id.is_some_and(|id| self.set_current_source(id))
    }

    pub fn unset_current_source(&mut self) {
        if let Some(previous) = self.current_source.take() {
            self.show_overlays(previous, false);
        }
    }

    pub fn clone_current_source(&mut self) -> Option<SourceId> {
        let name = self.session.find(self.current_source?)?.name().to_string();
        self.create_source_clone(&name)
    }

    pub fn delete_current_source(&mut self, ctx: &mut RenderContext) -> bool {
        match self.current_source {
            Some(id) => self.delete_source(ctx, id),
            None => false,
        }
    }

    // ---- views ----

    pub fn current_view(&self) -> ViewMode {
        self.current_view
    }

    /// Switch the interactive view shown by [`Mixer::draw`].
    pub fn set_view(&mut self, mode: ViewMode) -> bool {
        if self.views.get(mode).is_none() {
            tracing::warn!("{} view cannot be shown interactively", mode);
            return false;
        }
        self.current_view = mode;
        true
    }

    pub fn view(&self, mode: ViewMode) -> Option<&dyn View> {
        match mode {
            ViewMode::Rendering => Some(self.session.render_view()),
            _ => self.views.get(mode),
        }
    }

    /// Front-most source node under `screen` in the current view. View
    /// decorations are ignored.
    pub fn pick(&mut self, screen: Vec2) -> Option<PickHit> {
        let mode = self.current_view;
        let view = self.views.get_mut(mode)?;
        let hits = view.pick(screen);
        let scene = view.scene();
        hits.into_iter()
            .rev()
            .find(|hit| self.session.find_by_node(scene, mode, hit.node).is_some())
    }

    pub fn drag(&mut self, from: Vec2, to: Vec2) -> Cursor {
        match self.views.get_mut(self.current_view) {
            Some(view) => view.drag(from, to),
            None => Cursor::Arrow,
        }
    }

    /// Manipulate the current source in the current view.
    pub fn grab(&mut self, from: Vec2, to: Vec2, pick: Option<PickHit>, modifier: bool) -> Cursor {
        let Some(view) = self.views.get_mut(self.current_view) else {
            return Cursor::Arrow;
        };
        let source = self
            .current_source
            .and_then(|id| self.session.find_mut(id));
        view.grab(from, to, source, pick, modifier, &mut self.deep)
    }

    pub fn zoom(&mut self, factor: f32) {
        if let Some(view) = self.views.get_mut(self.current_view) {
            view.zoom(factor);
        }
    }

    // ---- settings ----

    fn apply_session_config(&mut self) {
        for mode in ViewMode::INTERACTIVE {
            let config = self.session.config(mode);
            if let Some(root) = self
                .views
                .get_mut(mode)
                .and_then(|v| v.core_mut().root_transform_mut())
            {
                root.scale = config.scale;
                root.translation = config.translation;
            }
        }
        self.deep.request();
    }

    /// Restore the view transforms and output presets from `settings`.
    pub fn restore_settings(&mut self, settings: MixerSettings) {
        for mode in ViewMode::INTERACTIVE {
            if let Some(view) = self.views.get_mut(mode) {
                let stored = settings.view(mode);
                view.restore_settings(&stored);
                self.session.set_config(mode, view.core().root_transform());
            }
        }
        self.session
            .render_view_mut()
            .set_presets(settings.output);
        self.settings = settings;
        self.deep.request();
    }

    /// Current view transforms and output presets.
    pub fn collect_settings(&mut self) -> MixerSettings {
        for mode in ViewMode::INTERACTIVE {
            if let Some(view) = self.views.get(mode) {
                let stored = view.save_settings();
                let root = view.core().root_transform();
                self.settings.set_view(stored);
                self.session.set_config(mode, root);
            }
        }
        self.settings.output = self.session.render_view().presets();
        self.settings.clone()
    }

    /// Write [`Mixer::collect_settings`] to the config directory.
    pub fn save_settings(&mut self) -> Result<(), SettingsError> {
        self.collect_settings().save()
    }

    // ---- lifetime ----

    /// Drop every source and start a fresh session.
    pub fn clear(&mut self, ctx: &mut RenderContext) -> GpuResult<()> {
        let settings = self.collect_settings();
        let fresh = Session::new(ctx.gpu(), &settings)?;
        self.current_source = None;
        let old = std::mem::replace(&mut self.session, fresh);
        old.destroy(ctx, self.views.scenes());
        self.apply_session_config();
        tracing::info!("Session cleared");
        Ok(())
    }

    /// Destroy the session and release the display.
    pub fn shutdown(mut self, ctx: &mut RenderContext) {
        self.session.destroy(ctx, self.views.scenes());
        self.display.borrow_mut().release(ctx.gpu());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;
    use crate::scene::HandleKind;
    use crate::video::testing::ScriptedPlayer;

    fn mixer(ctx: &mut RenderContext) -> Mixer {
        Mixer::new(ctx.gpu(), MixerSettings::default()).unwrap()
    }

    fn layer_z(mixer: &Mixer, id: SourceId) -> f32 {
        let source = mixer.session().find(id).unwrap();
        let scene = mixer.view(ViewMode::Layer).unwrap().scene();
        scene.node(source.group(ViewMode::Layer)).unwrap().transform.translation.z
    }

    #[test]
    fn test_set_depth_places_in_front() {
        let mut ctx = RenderContext::headless();
        let mut mixer = mixer(&mut ctx);
        let a = mixer.create_source_media("a.mov", Box::new(ScriptedPlayer::new(64, 64)));
        let b = mixer.create_source_media("b.mov", Box::new(ScriptedPlayer::new(64, 64)));
        mixer.update(&mut ctx, 0.016).unwrap();

        mixer.set_depth(a, 2.0);
        mixer.set_depth(b, -1.0);
        assert!(layer_z(&mixer, b) > layer_z(&mixer, a));
        assert!((layer_z(&mixer, b) - (2.0 + DEPTH)).abs() < 1e-6);

        // the rendering group takes its depth from the layer view
        mixer.update(&mut ctx, 0.016).unwrap();
        let rendering = mixer.view(ViewMode::Rendering).unwrap().scene();
        let workspace = rendering.children(rendering.workspace()).to_vec();
        let b_group = mixer.session().find(b).unwrap().group(ViewMode::Rendering);
        assert_eq!(workspace.last(), Some(&b_group));
        mixer.shutdown(&mut ctx);
    }

    const DEPTH: f32 = crate::view::DEPTH_FRONT_INCREMENT;

    #[test]
    fn test_set_depth_invariants() {
        let mut ctx = RenderContext::headless();
        let mut mixer = mixer(&mut ctx);
        let id = mixer.create_source_media("a.mov", Box::new(ScriptedPlayer::new(64, 64)));
        mixer.set_resolution(ctx.gpu(), Resolution::new(1920, 1080)).unwrap();
        mixer.update(&mut ctx, 0.016).unwrap();
        let aspect_ratio = mixer.session().resolution().aspect_ratio();

        for depth in [0.0, 0.3, 4.0, 9.99, 10.0, 250.0, f32::MAX] {
            mixer.set_depth(id, depth);
            let source = mixer.session().find(id).unwrap();
            let scene = mixer.view(ViewMode::Layer).unwrap().scene();
            let t = scene.node(source.group(ViewMode::Layer)).unwrap().transform.translation;
            assert_eq!(t.z, -t.x);
            assert_eq!(t.y, t.x / aspect_ratio);
            assert!(t.x >= -(crate::view::MAX_DEPTH - 2.0) && t.x <= 0.0);
        }
        mixer.shutdown(&mut ctx);
    }

    #[test]
    fn test_unique_names_and_current_source() {
        let mut ctx = RenderContext::headless();
        let mut mixer = mixer(&mut ctx);
        let first = mixer.create_source_media("clip.mov", Box::new(ScriptedPlayer::new(64, 64)));
        let second = mixer.create_source_media("clip.mov", Box::new(ScriptedPlayer::new(64, 64)));
        assert_eq!(mixer.session().find(second).unwrap().name(), "clip2");
        assert_eq!(mixer.current_source(), Some(second));
        assert_eq!(mixer.index_current_source(), Some(0));

        assert_eq!(mixer.rename_source(first, "other").as_deref(), Some("other"));
        assert_eq!(mixer.rename_source(second, "other").as_deref(), Some("other2"));
        assert!(mixer.set_current_source_by_name("other"));
        assert_eq!(mixer.current_source(), Some(first));

        // only the current source shows its overlay
        let overlay_visible = |mixer: &Mixer, id: SourceId| {
            let source = mixer.session().find(id).unwrap();
            let scene = mixer.view(ViewMode::Geometry).unwrap().scene();
            scene.node(source.overlay(ViewMode::Geometry)).unwrap().visible
        };
        assert!(overlay_visible(&mixer, first));
        assert!(!overlay_visible(&mixer, second));

        let clone = mixer.clone_current_source().unwrap();
        assert_eq!(mixer.session().find(clone).unwrap().origin(), Some(first));
        assert_eq!(mixer.current_source(), Some(clone));
        assert!(mixer.set_current_source(first));
        assert!(mixer.delete_current_source(&mut ctx));
        assert_eq!(mixer.current_source(), None);
        mixer.update(&mut ctx, 0.016).unwrap();
        assert_eq!(mixer.metrics().failed_source.as_deref(), Some("other_clone"));
        mixer.shutdown(&mut ctx);
    }

    #[test]
    fn test_grab_in_mixing_view_sets_alpha() {
        let mut ctx = RenderContext::headless();
        let mut mixer = mixer(&mut ctx);
        mixer.set_viewport_size(ctx.gpu(), 200, 200).unwrap();
        let id = mixer.create_source_media("clip.mov", Box::new(ScriptedPlayer::new(64, 64)));
        mixer.update(&mut ctx, 0.016).unwrap();
        assert_eq!(mixer.session().find(id).unwrap().alpha(), 1.0);

        // mixing root scale is 2: half the viewport width is 0.5 in the
        // workspace
        let cursor = mixer.grab(Vec2::new(100.0, 100.0), Vec2::new(200.0, 100.0), None, false);
        assert_eq!(cursor, Cursor::ResizeAll);
        mixer.update(&mut ctx, 0.016).unwrap();
        let alpha = mixer.session().find(id).unwrap().alpha();
        assert!((alpha - 0.75).abs() < 1e-4);

        mixer.unset_current_source();
        let cursor = mixer.grab(Vec2::new(100.0, 100.0), Vec2::new(10.0, 10.0), None, false);
        assert_eq!(cursor, Cursor::Arrow);
        mixer.shutdown(&mut ctx);
    }

    #[test]
    fn test_update_accepts_any_frame_time() {
        let mut ctx = RenderContext::headless();
        let mut mixer = mixer(&mut ctx);
        mixer.create_source_media("clip.mov", Box::new(ScriptedPlayer::new(64, 64)));
        for dt in [f32::MAX, f32::INFINITY, f32::NAN, -1.0, 0.016] {
            assert!(mixer.update(&mut ctx, dt).is_ok());
        }
        assert!(mixer.frame_stats().max_ms > 0.0);
        assert!(mixer.metrics().fps >= 0.0);
        mixer.shutdown(&mut ctx);
    }

    #[test]
    fn test_grab_in_layer_view_moves_along_diagonal() {
        let mut ctx = RenderContext::headless();
        let mut mixer = mixer(&mut ctx);
        mixer.set_viewport_size(ctx.gpu(), 200, 200).unwrap();
        assert!(mixer.set_view(ViewMode::Layer));
        let id = mixer.create_source_media("clip.mov", Box::new(ScriptedPlayer::new(64, 64)));
        mixer.update(&mut ctx, 0.016).unwrap();
        assert!(!mixer.deep.is_pending());
        let start = layer_z(&mixer, id);

        let from = Vec2::new(100.0, 100.0);
        let cursor = mixer.grab(from, Vec2::new(40.0, 100.0), None, false);
        assert_eq!(cursor, Cursor::ResizeNESW);
        assert!(mixer.deep.is_pending());
        let deeper = layer_z(&mixer, id);
        assert!(deeper > start);

        let source = mixer.session().find(id).unwrap();
        let scene = mixer.view(ViewMode::Layer).unwrap().scene();
        let t = scene.node(source.group(ViewMode::Layer)).unwrap().transform.translation;
        assert_eq!(t.z, -t.x);

        // same gesture: relative to where it started
        mixer.grab(from, from, None, false);
        assert!((layer_z(&mixer, id) - start).abs() < 1e-5);

        // dragging right past the front clamps to depth 0
        mixer.grab(from, Vec2::new(200.0, 100.0), None, false);
        assert_eq!(layer_z(&mixer, id), 0.0);
        mixer.shutdown(&mut ctx);
    }

    #[test]
    fn test_grab_resize_handle_in_geometry_view() {
        let mut ctx = RenderContext::headless();
        let mut mixer = mixer(&mut ctx);
        mixer.set_viewport_size(ctx.gpu(), 200, 200).unwrap();
        assert!(mixer.set_view(ViewMode::Geometry));
        let id = mixer.create_source_media("clip.mov", Box::new(ScriptedPlayer::new(64, 64)));
        mixer.update(&mut ctx, 0.016).unwrap();

        let (corner, group) = {
            let source = mixer.session().find(id).unwrap();
            let scene = mixer.view(ViewMode::Geometry).unwrap().scene();
            let corner = scene
                .children(source.overlay(ViewMode::Geometry))
                .iter()
                .copied()
                .find(|node| source.handle_kind(*node) == Some(HandleKind::Resize))
                .unwrap();
            (corner, source.group(ViewMode::Geometry))
        };
        let scale = |mixer: &Mixer| {
            let scene = mixer.view(ViewMode::Geometry).unwrap().scene();
            scene.node(group).unwrap().transform.scale
        };
        let start = scale(&mixer);
        let hit = PickHit {
            node: corner,
            local: Vec2::new(1.0, 1.0),
        };

        let from = Vec2::new(150.0, 50.0);
        let to = Vec2::new(180.0, 20.0);
        let cursor = mixer.grab(from, to, Some(hit), true);
        assert_eq!(cursor, Cursor::ResizeNWSE);
        let grown = scale(&mixer);
        assert_eq!(grown.x, grown.y);
        assert!(grown.x > start.x);

        // same `from`: the gesture is relative to its anchor
        mixer.grab(from, from, Some(hit), true);
        assert!((scale(&mixer).x - start.x).abs() < 1e-5);

        // a new `from` starts a new gesture at the current scale
        mixer.grab(from, to, Some(hit), true);
        mixer.grab(to, to, Some(hit), true);
        assert!((scale(&mixer).x - grown.x).abs() < 1e-5);
        mixer.shutdown(&mut ctx);
    }

    #[test]
    fn test_pick_finds_front_source() {
        let mut ctx = RenderContext::headless();
        let mut mixer = mixer(&mut ctx);
        mixer.set_viewport_size(ctx.gpu(), 200, 200).unwrap();
        assert!(mixer.set_view(ViewMode::Geometry));
        assert!(!mixer.set_view(ViewMode::Rendering));
        let a = mixer.create_source_media("a.mov", Box::new(ScriptedPlayer::new(64, 64)));
        let b = mixer.create_source_media("b.mov", Box::new(ScriptedPlayer::new(64, 64)));
        mixer.update(&mut ctx, 0.016).unwrap();
        mixer.update(&mut ctx, 0.016).unwrap();

        let hit = mixer.pick(Vec2::new(100.0, 100.0)).unwrap();
        assert!(mixer.set_current_source_by_node(hit.node));
        assert_eq!(mixer.current_source(), Some(b));
        assert!(mixer.set_current_source(a));
        assert!(mixer.draw(&mut ctx).unwrap() > 0);
        mixer.shutdown(&mut ctx);
    }

    #[test]
    fn test_zoom_and_settings_round_trip() {
        let mut ctx = RenderContext::headless();
        let mut mixer = mixer(&mut ctx);
        mixer.set_view(ViewMode::Layer);
        mixer.zoom(f32::INFINITY);
        let settings = mixer.collect_settings();
        assert_eq!(settings.view(ViewMode::Layer).scale.x, crate::view::MAX_ZOOM);
        assert_eq!(settings.view(ViewMode::Mixing).scale.x, 2.0);

        mixer.restore_settings(MixerSettings::default());
        let root = mixer.view(ViewMode::Layer).unwrap().core().root_transform();
        assert_eq!(root.scale.x, 0.8);
        mixer.shutdown(&mut ctx);
    }

    #[test]
    fn test_failed_source_end_to_end() {
        let (gpu, probe) = HeadlessBackend::with_probe();
        let mut ctx = RenderContext::new(Box::new(gpu));
        let mut mixer = mixer(&mut ctx);
        let player = ScriptedPlayer::new(64, 64);
        let failed = player.failed.clone();
        let id = mixer.create_source_media("clip.mov", Box::new(player));
        assert_eq!(mixer.session().len(), 1);

        failed.set(true);
        mixer.update(&mut ctx, 0.016).unwrap();
        assert_eq!(mixer.session().failed_source(), Some(id));
        assert_eq!(mixer.metrics().output_primitives, 0);
        assert_eq!(probe.stats().draw_calls, 0);

        assert!(mixer.delete_source(&mut ctx, id));
        assert_eq!(mixer.session().len(), 0);
        for mode in ViewMode::ALL {
            let scene = mixer.view(mode).unwrap().scene();
            assert!(scene.children(scene.workspace()).is_empty());
        }
        mixer.clear(&mut ctx).unwrap();
        mixer.shutdown(&mut ctx);
        ctx.shutdown();
        assert_eq!(probe.stats().live_textures, 0);
    }
}
