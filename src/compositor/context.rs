//! Render context passed through every draw and update path

use super::{GeometryCache, Resources};
use crate::gpu::{GpuBackend, HeadlessBackend};

/// GPU backend plus the caches that live as long as it does.
#[derive(Debug)]
pub struct RenderContext {
    gpu: Box<dyn GpuBackend>,
    pub geometry: GeometryCache,
    pub resources: Resources,
}

impl RenderContext {
    pub fn new(gpu: Box<dyn GpuBackend>) -> Self {
        tracing::info!("Render context on {} backend", gpu.name());
        Self {
            gpu,
            geometry: GeometryCache::new(),
            resources: Resources::new(),
        }
    }

    /// Context on a [`HeadlessBackend`], for tools and tests
    pub fn headless() -> Self {
        Self::new(Box::new(HeadlessBackend::new()))
    }

    pub fn gpu(&mut self) -> &mut dyn GpuBackend {
        self.gpu.as_mut()
    }

    /// Split borrow of the backend and the caches
    pub fn parts(&mut self) -> (&mut dyn GpuBackend, &mut GeometryCache, &mut Resources) {
        (self.gpu.as_mut(), &mut self.geometry, &mut self.resources)
    }

    /// Tear down cached geometry and textures.
    pub fn shutdown(&mut self) {
        let (gpu, geometry, resources) = self.parts();
        geometry.clear(gpu);
        resources.clear(gpu);
    }
}
