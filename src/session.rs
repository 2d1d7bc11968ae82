//! Session: the live source list and the output they compose into
//!
//! The order of the list is the compositing order; the front of the list is
//! the most recently added source. Every source in the list has its
//! rendering group attached to the workspace of the [`RenderView`], and
//! every insert or delete keeps the two in step.

use glam::Vec3;

use crate::compositor::{RenderContext, Resolution, SharedFrameBuffer};
use crate::gpu::{GpuBackend, GpuResult};
use crate::scene::{NodeId, Scene, Transform};
use crate::settings::MixerSettings;
use crate::source::{RenderInputs, Source, SourceId};
use crate::view::{FrameContext, InteractiveScenes, RenderView, View, ViewMode};

#[derive(Debug)]
pub struct Session {
    sources: Vec<Source>,
    render: RenderView,
    /// Root transform of each view, restored when a view shows this session
    config: [Transform; 4],
    failed_source: Option<SourceId>,
}

impl Session {
    pub fn new(gpu: &mut dyn GpuBackend, settings: &MixerSettings) -> GpuResult<Self> {
        let render = RenderView::new(gpu, settings.output)?;
        let mut config = [Transform::IDENTITY; 4];
        for mode in ViewMode::INTERACTIVE {
            let view = settings.view(mode);
            config[mode.index()] = Transform {
                translation: view.translation,
                scale: view.scale,
                ..Transform::IDENTITY
            };
        }
        let mut session = Self {
            sources: Vec::new(),
            render,
            config,
            failed_source: None,
        };
        session.update_render_config();
        Ok(session)
    }

    pub fn render_view(&self) -> &RenderView {
        &self.render
    }

    pub fn render_view_mut(&mut self) -> &mut RenderView {
        &mut self.render
    }

    /// The output frame buffer.
    pub fn frame(&self) -> SharedFrameBuffer {
        self.render.frame()
    }

    pub fn resolution(&self) -> Resolution {
        self.render.resolution()
    }

    /// Resize the output; invalid sizes fall back to the presets.
    pub fn set_resolution(
        &mut self,
        gpu: &mut dyn GpuBackend,
        resolution: Resolution,
    ) -> GpuResult<()> {
        self.render.set_resolution(gpu, resolution)?;
        self.update_render_config();
        Ok(())
    }

    fn update_render_config(&mut self) {
        let resolution = self.render.resolution();
        self.config[ViewMode::Rendering.index()] = Transform::from_scale(Vec3::new(
            resolution.width as f32,
            resolution.height as f32,
            1.0,
        ));
    }

    /// View configuration of `mode`. For the rendering view the scale is
    /// the output resolution.
    pub fn config(&self, mode: ViewMode) -> Transform {
        self.config[mode.index()]
    }

    pub fn set_config(&mut self, mode: ViewMode, transform: Transform) {
        if mode != ViewMode::Rendering {
            self.config[mode.index()] = transform;
        }
    }

    /// Put `source` in front and attach its rendering group to the output.
    pub fn add_source(&mut self, source: Source) -> SourceId {
        let id = source.id();
        let scene = self.render.scene_mut();
        let workspace = scene.workspace();
        if !scene.attach(workspace, source.group(ViewMode::Rendering)) {
            tracing::warn!("Source '{}' was already attached to the output", source.name());
        }
        tracing::info!("Source '{}' added to the session", source.name());
        self.sources.insert(0, source);
        id
    }

    /// Remove and destroy the source `id`. Clones of it lose their origin
    /// and fail from now on.
    pub fn delete_source(
        &mut self,
        ctx: &mut RenderContext,
        id: SourceId,
        mut scenes: InteractiveScenes<'_>,
    ) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let source = self.sources.remove(index);
        if self.failed_source == Some(id) {
            self.failed_source = None;
        }
        for other in &mut self.sources {
            other.invalidate_origin(id);
        }
        tracing::info!("Source '{}' deleted from the session", source.name());
        let mut scenes = scenes.with_rendering(self.render.scene_mut());
        source.destroy(ctx, &mut scenes);
        true
    }

    /// Take the front source out of the session without destroying it.
    pub fn pop_source(&mut self) -> Option<Source> {
        if self.sources.is_empty() {
            return None;
        }
        let source = self.sources.remove(0);
        self.render
            .scene_mut()
            .detach(source.group(ViewMode::Rendering));
        if self.failed_source == Some(source.id()) {
            self.failed_source = None;
        }
        Some(source)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Source> {
        self.sources.iter_mut()
    }

    pub fn at(&self, index: usize) -> Option<&Source> {
        self.sources.get(index)
    }

    pub fn index_of(&self, id: SourceId) -> Option<usize> {
        self.sources.iter().position(|s| s.id() == id)
    }

    pub fn find(&self, id: SourceId) -> Option<&Source> {
        self.sources.iter().find(|s| s.id() == id)
    }

    pub fn find_mut(&mut self, id: SourceId) -> Option<&mut Source> {
        self.sources.iter_mut().find(|s| s.id() == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name() == name)
    }

    /// Source owning `node` in `scene`, the scene of the view `mode`.
    pub fn find_by_node(&self, scene: &Scene, mode: ViewMode, node: NodeId) -> Option<&Source> {
        self.sources
            .iter()
            .find(|s| s.owns_node(scene, mode, node))
    }

    /// First source found failed by the last [`Session::update`].
    pub fn failed_source(&self) -> Option<SourceId> {
        self.failed_source
    }

    /// Render every source into its frame buffer, then compose them into
    /// the output. Failed sources are hidden and skipped. Returns the
    /// number of primitives drawn into the output.
    pub fn update(
        &mut self,
        ctx: &mut RenderContext,
        dt: f32,
        mut scenes: InteractiveScenes<'_>,
        deep_update: bool,
    ) -> GpuResult<usize> {
        self.failed_source = None;
        let output = self.render.frame();

        // clones look their origin up by id every frame
        let origins: Vec<Option<SharedFrameBuffer>> = self
            .sources
            .iter()
            .map(|s| s.origin().and_then(|o| self.find(o)).and_then(Source::frame))
            .collect();

        {
            let mut scenes = scenes.with_rendering(self.render.scene_mut());
            for (source, origin) in self.sources.iter_mut().zip(origins) {
                let failed = source.failed();
                if let Some(node) = scenes.rendering.node_mut(source.group(ViewMode::Rendering)) {
                    node.visible = !failed;
                }
                if failed {
                    if self.failed_source.is_none() {
                        tracing::warn!("Source '{}' failed, not rendered", source.name());
                        self.failed_source = Some(source.id());
                    }
                    continue;
                }

                let inputs = RenderInputs {
                    origin,
                    session: Some(output.clone()),
                };
                if let Err(e) = source.render(ctx, &mut scenes, &inputs) {
                    tracing::warn!("Source '{}' could not render: {}", source.name(), e);
                }
                source.update(&mut scenes);
            }
        }

        let frame = FrameContext {
            dt,
            deep_update,
            output_aspect_ratio: self.render.aspect_ratio(),
        };
        self.render.update(&frame);
        self.render.draw(ctx)
    }

    /// Destroy every source and release the output.
    pub fn destroy(mut self, ctx: &mut RenderContext, mut scenes: InteractiveScenes<'_>) {
        let mut set = scenes.with_rendering(self.render.scene_mut());
        for source in self.sources.drain(..) {
            source.destroy(ctx, &mut set);
        }
        self.render.release(ctx.gpu());
        tracing::info!("Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;
    use crate::video::testing::ScriptedPlayer;

    struct Views {
        mixing: Scene,
        geometry: Scene,
        layer: Scene,
    }

    impl Views {
        fn new() -> Self {
            Self {
                mixing: Scene::new(),
                geometry: Scene::new(),
                layer: Scene::new(),
            }
        }

        fn scenes(&mut self) -> InteractiveScenes<'_> {
            InteractiveScenes {
                mixing: &mut self.mixing,
                geometry: &mut self.geometry,
                layer: &mut self.layer,
            }
        }

        fn workspace_len(&self, mode: ViewMode) -> usize {
            let scene = match mode {
                ViewMode::Mixing => &self.mixing,
                ViewMode::Geometry => &self.geometry,
                _ => &self.layer,
            };
            scene.children(scene.workspace()).len()
        }
    }

    fn new_source(session: &mut Session, views: &mut Views, name: &str, player: ScriptedPlayer) -> SourceId {
        let mut scenes = views.scenes();
        let source = {
            let mut set = scenes.with_rendering(session.render_view_mut().scene_mut());
            Source::media(name, format!("{}.mov", name), Box::new(player), &mut set)
        };
        for mode in ViewMode::INTERACTIVE {
            let scene = match mode {
                ViewMode::Mixing => &mut *scenes.mixing,
                ViewMode::Geometry => &mut *scenes.geometry,
                _ => &mut *scenes.layer,
            };
            let workspace = scene.workspace();
            assert!(scene.attach(workspace, source.group(mode)));
        }
        session.add_source(source)
    }

    fn output_len(session: &Session) -> usize {
        let scene = session.render_view().scene();
        scene.children(scene.workspace()).len()
    }

    #[test]
    fn test_add_puts_source_in_front() {
        let mut ctx = RenderContext::headless();
        let mut views = Views::new();
        let mut session = Session::new(ctx.gpu(), &MixerSettings::default()).unwrap();
        let a = new_source(&mut session, &mut views, "a", ScriptedPlayer::new(64, 64));
        let b = new_source(&mut session, &mut views, "b", ScriptedPlayer::new(64, 64));

        assert_eq!(session.len(), 2);
        assert_eq!(session.index_of(b), Some(0));
        assert_eq!(session.index_of(a), Some(1));
        assert_eq!(session.find_by_name("a").map(Source::id), Some(a));
        assert_eq!(output_len(&session), 2);

        let popped = session.pop_source().unwrap();
        assert_eq!(popped.id(), b);
        assert_eq!(output_len(&session), 1);
        let mut scenes = views.scenes();
        popped.destroy(&mut ctx, &mut scenes.with_rendering(session.render_view_mut().scene_mut()));
        session.destroy(&mut ctx, views.scenes());
    }

    #[test]
    fn test_delete_detaches_from_every_view() {
        let mut ctx = RenderContext::headless();
        let mut views = Views::new();
        let mut session = Session::new(ctx.gpu(), &MixerSettings::default()).unwrap();
        let ids: Vec<SourceId> = (0..4)
            .map(|i| new_source(&mut session, &mut views, &format!("s{}", i), ScriptedPlayer::new(32, 32)))
            .collect();
        session.update(&mut ctx, 0.016, views.scenes(), true).unwrap();

        for (deleted, id) in ids.iter().enumerate() {
            let remaining = ids.len() - deleted - 1;
            assert!(session.delete_source(&mut ctx, *id, views.scenes()));
            assert_eq!(session.len(), remaining);
            assert_eq!(output_len(&session), remaining);
            for mode in ViewMode::INTERACTIVE {
                assert_eq!(views.workspace_len(mode), remaining);
            }
        }
        assert!(!session.delete_source(&mut ctx, ids[0], views.scenes()));
        session.destroy(&mut ctx, views.scenes());
    }

    #[test]
    fn test_failed_source_is_not_rendered() {
        let (gpu, probe) = HeadlessBackend::with_probe();
        let mut ctx = RenderContext::new(Box::new(gpu));
        let mut views = Views::new();
        let mut session = Session::new(ctx.gpu(), &MixerSettings::default()).unwrap();

        let player = ScriptedPlayer::new(64, 64);
        let failed = player.failed.clone();
        let id = new_source(&mut session, &mut views, "clip", player);
        assert_eq!(session.len(), 1);
        assert_eq!(output_len(&session), 1);

        failed.set(true);
        let drawn = session.update(&mut ctx, 0.016, views.scenes(), true).unwrap();
        assert_eq!(session.failed_source(), Some(id));
        assert_eq!(drawn, 0);
        assert_eq!(probe.stats().draw_calls, 0);

        assert!(session.delete_source(&mut ctx, id, views.scenes()));
        assert_eq!(session.len(), 0);
        assert_eq!(output_len(&session), 0);
        assert_eq!(session.failed_source(), None);
        session.destroy(&mut ctx, views.scenes());
        ctx.shutdown();
        assert_eq!(probe.stats().live_textures, 0);
    }

    #[test]
    fn test_clone_follows_origin() {
        let (gpu, probe) = HeadlessBackend::with_probe();
        let mut ctx = RenderContext::new(Box::new(gpu));
        let mut views = Views::new();
        let mut session = Session::new(ctx.gpu(), &MixerSettings::default()).unwrap();
        let origin = new_source(&mut session, &mut views, "clip", ScriptedPlayer::new(64, 32));
        let clone = {
            let mut scenes = views.scenes();
            let mut set = scenes.with_rendering(session.render_view_mut().scene_mut());
            Source::clone_of("clip copy", origin, &mut set)
        };
        let clone = session.add_source(clone);

        // the origin has no frame during the first update
        session.update(&mut ctx, 0.016, views.scenes(), true).unwrap();
        assert!(!session.find(clone).is_some_and(Source::is_initialized));
        session.update(&mut ctx, 0.016, views.scenes(), false).unwrap();
        let clone_frame = session.find(clone).and_then(Source::frame).unwrap();
        assert_eq!(clone_frame.borrow().resolution(), Resolution::new(64, 32));
        let origin_texture = session.find(origin).and_then(Source::frame).unwrap().borrow().texture();
        let clone_texture = clone_frame.borrow().texture();
        assert!(probe
            .draws()
            .iter()
            .any(|d| Some(d.target) == clone_texture && Some(d.texture) == origin_texture));

        assert!(session.delete_source(&mut ctx, origin, views.scenes()));
        assert!(session.find(clone).is_some_and(Source::failed));
        session.update(&mut ctx, 0.016, views.scenes(), false).unwrap();
        assert_eq!(session.failed_source(), Some(clone));
        session.destroy(&mut ctx, views.scenes());
    }

    #[test]
    fn test_rendering_config_follows_resolution() {
        let mut gpu = HeadlessBackend::new();
        let mut session = Session::new(&mut gpu, &MixerSettings::default()).unwrap();
        session.set_resolution(&mut gpu, Resolution::new(800, 600)).unwrap();
        assert_eq!(
            session.config(ViewMode::Rendering).scale,
            Vec3::new(800.0, 600.0, 1.0)
        );
        assert_eq!(session.config(ViewMode::Mixing).scale, Vec3::new(2.0, 2.0, 1.0));
        session.render_view_mut().release(&mut gpu);
    }
}
