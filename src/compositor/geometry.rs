//! Shared geometry cache
//!
//! Identical shapes (unit quad, outlines, builtin meshes) are uploaded once
//! and reference counted. Freeform geometry such as line strips is uploaded
//! per primitive and owned by it.

use std::collections::HashMap;

use crate::gpu::{GeometryHandle, GpuBackend, GpuResult, MeshData};

/// Key of a cacheable shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShapeKey {
    /// Unit quad spanning [-1, 1]²
    Quad,
    SquareOutline,
    CircleOutline,
    /// Builtin mesh by name
    Mesh(String),
}

#[derive(Debug)]
struct CacheEntry {
    key: ShapeKey,
    refs: usize,
}

/// Reference-counted geometry uploads.
#[derive(Debug, Default)]
pub struct GeometryCache {
    shared: HashMap<ShapeKey, GeometryHandle>,
    entries: HashMap<GeometryHandle, CacheEntry>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the geometry for `key`, uploading it with `build` the first time.
    pub fn acquire(
        &mut self,
        gpu: &mut dyn GpuBackend,
        key: ShapeKey,
        build: impl FnOnce() -> Option<MeshData>,
    ) -> GpuResult<GeometryHandle> {
        if let Some(handle) = self.shared.get(&key) {
            if let Some(entry) = self.entries.get_mut(handle) {
                entry.refs += 1;
            }
            return Ok(*handle);
        }

        let mesh = build().ok_or_else(|| {
            crate::gpu::GpuError::GeometryCreationFailed(format!("no mesh for {:?}", key))
        })?;
        let handle = gpu.create_geometry(&mesh)?;
        tracing::trace!("Geometry cache: uploaded {:?}", key);
        self.shared.insert(key.clone(), handle);
        self.entries.insert(handle, CacheEntry { key, refs: 1 });
        Ok(handle)
    }

    /// Upload geometry owned by a single primitive.
    pub fn acquire_unique(
        &mut self,
        gpu: &mut dyn GpuBackend,
        mesh: &MeshData,
    ) -> GpuResult<GeometryHandle> {
        gpu.create_geometry(mesh)
    }

    /// Drop one reference; the upload is destroyed with the last one.
    /// Handles not known to the cache are destroyed right away.
    pub fn release(&mut self, gpu: &mut dyn GpuBackend, handle: GeometryHandle) {
        let Some(entry) = self.entries.get_mut(&handle) else {
            gpu.destroy_geometry(handle);
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            if let Some(entry) = self.entries.remove(&handle) {
                self.shared.remove(&entry.key);
            }
            gpu.destroy_geometry(handle);
        }
    }

    pub fn ref_count(&self, key: &ShapeKey) -> usize {
        self.shared
            .get(key)
            .and_then(|handle| self.entries.get(handle))
            .map(|entry| entry.refs)
            .unwrap_or(0)
    }

    /// Number of distinct shared uploads
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// Destroy every shared upload regardless of outstanding references.
    pub fn clear(&mut self, gpu: &mut dyn GpuBackend) {
        for (handle, _) in self.entries.drain() {
            gpu.destroy_geometry(handle);
        }
        self.shared.clear();
    }
}
