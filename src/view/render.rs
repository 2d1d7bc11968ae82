//! Rendering view: composes the sources into the session output

use glam::{Mat4, Vec2};

use super::{View, ViewCore, ViewMode};
use crate::compositor::{FrameBuffer, RenderContext, Resolution, SharedFrameBuffer};
use crate::gpu::{GpuBackend, GpuResult};
use crate::settings::OutputSettings;

/// Owner of the session output frame buffer.
///
/// Unlike the other views it draws into its own frame buffer, with a camera
/// matching the output resolution.
#[derive(Debug)]
pub struct RenderView {
    core: ViewCore,
    frame: SharedFrameBuffer,
    presets: OutputSettings,
}

impl RenderView {
    /// Create the view with an output at the `presets` resolution.
    pub fn new(gpu: &mut dyn GpuBackend, presets: OutputSettings) -> GpuResult<Self> {
        let resolution = Resolution::from_presets(presets.aspect_ratio, presets.height);
        let frame = FrameBuffer::new(gpu, "Session Output", resolution, false)?.into_shared();
        let mut core = ViewCore::new(ViewMode::Rendering);
        core.camera
            .set_viewport(Vec2::new(resolution.width as f32, resolution.height as f32));
        Ok(Self {
            core,
            frame,
            presets,
        })
    }

    /// The output frame buffer. Frame buffer surfaces keep sampling it
    /// across resolution changes.
    pub fn frame(&self) -> SharedFrameBuffer {
        self.frame.clone()
    }

    pub fn resolution(&self) -> Resolution {
        self.frame.borrow().resolution()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.frame.borrow().aspect_ratio()
    }

    pub fn presets(&self) -> OutputSettings {
        self.presets
    }

    pub fn set_presets(&mut self, mut presets: OutputSettings) {
        presets.clamp();
        self.presets = presets;
    }

    /// Resize the output in place. A resolution smaller than
    /// [`MIN_RESOLUTION`](crate::compositor::MIN_RESOLUTION) falls back to
    /// the presets.
    pub fn set_resolution(
        &mut self,
        gpu: &mut dyn GpuBackend,
        resolution: Resolution,
    ) -> GpuResult<()> {
        let resolution = if resolution.is_valid_output() {
            resolution
        } else {
            let fallback = Resolution::from_presets(self.presets.aspect_ratio, self.presets.height);
            tracing::warn!(
                "Invalid output resolution {}, using {} instead",
                resolution,
                fallback
            );
            fallback
        };
        self.frame.borrow_mut().resize(gpu, resolution)?;
        self.core
            .camera
            .set_viewport(Vec2::new(resolution.width as f32, resolution.height as f32));
        tracing::info!("Session output set to {}", resolution);
        Ok(())
    }

    /// Destroy the output textures.
    pub fn release(&mut self, gpu: &mut dyn GpuBackend) {
        self.frame.borrow_mut().release(gpu);
    }
}

impl View for RenderView {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    /// Draw the scene into the output frame buffer.
    fn draw(&mut self, ctx: &mut RenderContext) -> GpuResult<usize> {
        let projection = self.core.camera.projection();
        let frame = self.frame.borrow();
        let mut pass = frame.begin(ctx)?;
        let count = self.core.scene.draw(&mut pass, Mat4::IDENTITY, projection)?;
        pass.end()?;
        Ok(count)
    }

    /// The output does not follow the window.
    fn set_viewport(&mut self, _viewport: Vec2) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::MIN_RESOLUTION;
    use crate::gpu::HeadlessBackend;
    use crate::scene::{Node, Primitive};

    #[test]
    fn test_invalid_resolution_falls_back_to_presets() {
        let mut gpu = HeadlessBackend::new();
        let mut view = RenderView::new(&mut gpu, OutputSettings::default()).unwrap();
        let shared = view.frame();

        view.set_resolution(&mut gpu, Resolution::new(640, 480)).unwrap();
        assert_eq!(view.resolution(), Resolution::new(640, 480));
        assert_eq!(view.core().camera.viewport(), Vec2::new(640.0, 480.0));

        view.set_resolution(&mut gpu, Resolution::new(MIN_RESOLUTION - 1, 480))
            .unwrap();
        assert_eq!(view.resolution(), Resolution::from_presets(3, 1));
        // resized in place
        assert!(std::rc::Rc::ptr_eq(&shared, &view.frame()));
        view.release(&mut gpu);
    }

    #[test]
    fn test_draw_into_output() {
        let (gpu, probe) = HeadlessBackend::with_probe();
        let mut ctx = RenderContext::new(Box::new(gpu));
        let mut view = RenderView::new(ctx.gpu(), OutputSettings::default()).unwrap();
        let workspace = view.scene().workspace();
        view.scene_mut()
            .add(workspace, Node::primitive(Primitive::surface()));

        assert_eq!(view.draw(&mut ctx).unwrap(), 1);
        assert_eq!(probe.stats().draw_calls, 1);
        let output = view.frame().borrow().texture();
        assert_eq!(probe.draws().first().map(|d| d.target), output);
        view.release(ctx.gpu());
        ctx.shutdown();
    }
}
