//! Headless GPU backend
//!
//! Performs no GPU work but keeps exact books on every resource and pass so
//! that lifetimes and draw traffic can be asserted on. Statistics are shared
//! through a [`HeadlessProbe`] that stays readable after the backend itself
//! has been boxed into a render context.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use glam::Vec4;

use super::{
    validate_size, DrawCall, GeometryHandle, GpuBackend, GpuError, GpuResult, MeshData,
    RenderTarget, TextureDesc, TextureFormat, TextureHandle,
};

/// Default texture limit, matching common desktop adapters.
const DEFAULT_MAX_DIMENSION: u32 = 8192;

/// Counters kept by the headless backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub textures_created: u64,
    pub textures_destroyed: u64,
    pub live_textures: usize,
    pub peak_live_textures: usize,
    pub live_geometries: usize,
    pub passes: u64,
    pub draw_calls: u64,
    pub blits: u64,
}

/// One recorded draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRecord {
    /// Color attachment that was current
    pub target: TextureHandle,
    /// Texture that was sampled
    pub texture: TextureHandle,
    pub color: Vec4,
}

#[derive(Debug, Default)]
struct ProbeState {
    stats: HeadlessStats,
    draws: Vec<DrawRecord>,
    failing_textures: usize,
}

/// Shared read access to the statistics of a [`HeadlessBackend`].
#[derive(Debug, Clone, Default)]
pub struct HeadlessProbe {
    state: Rc<RefCell<ProbeState>>,
}

impl HeadlessProbe {
    pub fn stats(&self) -> HeadlessStats {
        self.state.borrow().stats.clone()
    }

    /// Every draw recorded since the last [`clear_draws`](Self::clear_draws)
    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state.borrow().draws.clone()
    }

    pub fn clear_draws(&self) {
        self.state.borrow_mut().draws.clear();
    }

    /// Make the next `count` texture creations fail as if out of memory.
    pub fn fail_next_textures(&self, count: usize) {
        self.state.borrow_mut().failing_textures = count;
    }
}

#[derive(Debug, Clone, Copy)]
struct TextureRecord {
    width: u32,
    height: u32,
    format: TextureFormat,
}

/// GPU backend that only tracks resources.
#[derive(Debug)]
pub struct HeadlessBackend {
    next_id: u64,
    max_dimension: u32,
    textures: HashMap<TextureHandle, TextureRecord>,
    geometries: HashMap<GeometryHandle, usize>,
    passes: Vec<RenderTarget>,
    probe: HeadlessProbe,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            max_dimension: DEFAULT_MAX_DIMENSION,
            textures: HashMap::new(),
            geometries: HashMap::new(),
            passes: Vec::new(),
            probe: HeadlessProbe::default(),
        }
    }

    /// Create a backend together with a probe observing it.
    pub fn with_probe() -> (Self, HeadlessProbe) {
        let backend = Self::new();
        let probe = backend.probe.clone();
        (backend, probe)
    }

    /// Lower the texture limit, e.g. to provoke allocation failures.
    pub fn with_max_texture_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn probe(&self) -> HeadlessProbe {
        self.probe.clone()
    }

    /// Depth of the render-target stack
    pub fn pass_depth(&self) -> usize {
        self.passes.len()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GpuBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "Headless"
    }

    fn max_texture_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> GpuResult<TextureHandle> {
        validate_size(desc.width, desc.height, self.max_dimension)?;
        {
            let mut state = self.probe.state.borrow_mut();
            if state.failing_textures > 0 {
                state.failing_textures -= 1;
                return Err(GpuError::TextureCreationFailed(format!(
                    "'{}' out of memory",
                    desc.label
                )));
            }
        }
        let handle = TextureHandle(self.next_id());
        self.textures.insert(
            handle,
            TextureRecord {
                width: desc.width,
                height: desc.height,
                format: desc.format,
            },
        );

        let mut state = self.probe.state.borrow_mut();
        state.stats.textures_created += 1;
        state.stats.live_textures = self.textures.len();
        state.stats.peak_live_textures = state.stats.peak_live_textures.max(self.textures.len());
        tracing::trace!(
            "Headless: created texture {:?} '{}' {}x{}",
            handle,
            desc.label,
            desc.width,
            desc.height
        );
        Ok(handle)
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> GpuResult<()> {
        let record = self
            .textures
            .get(&texture)
            .ok_or(GpuError::UnknownTexture(texture))?;
        if record.format != TextureFormat::Rgba8 || record.width != width || record.height != height
        {
            return Err(GpuError::InvalidSize { width, height });
        }
        let expected = (width as usize) * (height as usize) * 4;
        if rgba.len() != expected {
            return Err(GpuError::DataSizeMismatch {
                expected,
                actual: rgba.len(),
            });
        }
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_some() {
            let mut state = self.probe.state.borrow_mut();
            state.stats.textures_destroyed += 1;
            state.stats.live_textures = self.textures.len();
        }
    }

    fn create_geometry(&mut self, mesh: &MeshData) -> GpuResult<GeometryHandle> {
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            return Err(GpuError::GeometryCreationFailed("empty mesh".to_string()));
        }
        let handle = GeometryHandle(self.next_id());
        self.geometries.insert(handle, mesh.indices.len());
        self.probe.state.borrow_mut().stats.live_geometries = self.geometries.len();
        Ok(handle)
    }

    fn destroy_geometry(&mut self, geometry: GeometryHandle) {
        if self.geometries.remove(&geometry).is_some() {
            self.probe.state.borrow_mut().stats.live_geometries = self.geometries.len();
        }
    }

    fn begin_pass(&mut self, target: &RenderTarget, _clear: [f32; 4]) -> GpuResult<()> {
        if !self.textures.contains_key(&target.color) {
            return Err(GpuError::UnknownTexture(target.color));
        }
        if let Some(depth) = target.depth {
            if !self.textures.contains_key(&depth) {
                return Err(GpuError::UnknownTexture(depth));
            }
        }
        self.passes.push(*target);
        self.probe.state.borrow_mut().stats.passes += 1;
        Ok(())
    }

    fn end_pass(&mut self) -> GpuResult<()> {
        self.passes.pop().map(|_| ()).ok_or(GpuError::NoActivePass)
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> GpuResult<()> {
        let target = self.passes.last().ok_or(GpuError::NoActivePass)?;
        if !self.geometries.contains_key(&call.geometry) {
            return Err(GpuError::UnknownGeometry(call.geometry));
        }
        if !self.textures.contains_key(&call.texture) {
            return Err(GpuError::UnknownTexture(call.texture));
        }
        if call.texture == target.color {
            return Err(GpuError::SamplingRenderTarget(call.texture));
        }

        let mut state = self.probe.state.borrow_mut();
        state.stats.draw_calls += 1;
        state.draws.push(DrawRecord {
            target: target.color,
            texture: call.texture,
            color: call.color,
        });
        Ok(())
    }

    fn copy_texture(
        &mut self,
        src: TextureHandle,
        dst: TextureHandle,
        width: u32,
        height: u32,
    ) -> GpuResult<()> {
        let src_record = *self.textures.get(&src).ok_or(GpuError::UnknownTexture(src))?;
        let dst_record = *self.textures.get(&dst).ok_or(GpuError::UnknownTexture(dst))?;
        let fits = |r: TextureRecord| r.width >= width && r.height >= height;
        if src_record.format != dst_record.format || !fits(src_record) || !fits(dst_record) {
            return Err(GpuError::InvalidSize { width, height });
        }
        self.probe.state.borrow_mut().stats.blits += 1;
        Ok(())
    }
}
