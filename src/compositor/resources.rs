//! Texture resources shared by the whole graph
//!
//! Placeholder textures (black, white), the mixing-view background falloff and
//! decoded image files are created on first use and cached for the lifetime
//! of the render context.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::gpu::{GpuBackend, GpuError, TextureDesc, TextureFormat, TextureHandle, TextureUsage};

/// Edge length of the mixing background texture.
pub const MIXING_TEXTURE_SIZE: u32 = 64;

/// Resource loading errors
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Cache of loader-owned textures.
#[derive(Debug, Default)]
pub struct Resources {
    black: Option<TextureHandle>,
    white: Option<TextureHandle>,
    mixing_quadratic: Option<TextureHandle>,
    images: HashMap<PathBuf, (TextureHandle, f32)>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1x1 opaque black, the placeholder for any missing texture
    pub fn texture_black(&mut self, gpu: &mut dyn GpuBackend) -> Result<TextureHandle, GpuError> {
        if let Some(texture) = self.black {
            return Ok(texture);
        }
        let texture = upload(gpu, "Black", 1, 1, &[0, 0, 0, 255])?;
        self.black = Some(texture);
        Ok(texture)
    }

    /// 1x1 opaque white, sampled by untextured primitives
    pub fn texture_white(&mut self, gpu: &mut dyn GpuBackend) -> Result<TextureHandle, GpuError> {
        if let Some(texture) = self.white {
            return Ok(texture);
        }
        let texture = upload(gpu, "White", 1, 1, &[255; 4])?;
        self.white = Some(texture);
        Ok(texture)
    }

    /// Radial falloff drawn under the mixing view
    pub fn texture_mixing_quadratic(
        &mut self,
        gpu: &mut dyn GpuBackend,
    ) -> Result<TextureHandle, GpuError> {
        if let Some(texture) = self.mixing_quadratic {
            return Ok(texture);
        }
        let pixels = mixing_quadratic_pixels();
        let texture = upload(
            gpu,
            "Mixing Quadratic",
            MIXING_TEXTURE_SIZE,
            MIXING_TEXTURE_SIZE,
            &pixels,
        )?;
        self.mixing_quadratic = Some(texture);
        Ok(texture)
    }

    /// Decode and upload an image file, returning the texture and its aspect
    /// ratio. Files are decoded once per path.
    pub fn texture_image(
        &mut self,
        gpu: &mut dyn GpuBackend,
        path: &Path,
    ) -> Result<(TextureHandle, f32), ResourceError> {
        if let Some(entry) = self.images.get(path) {
            return Ok(*entry);
        }

        let image = image::open(path)
            .map_err(|source| ResourceError::Decode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        let (width, height) = image.dimensions();
        let label = path.display().to_string();
        let texture = upload(gpu, &label, width, height, image.as_raw())?;
        let aspect_ratio = width as f32 / height.max(1) as f32;

        tracing::info!("Loaded image {} ({}x{})", label, width, height);
        self.images
            .insert(path.to_path_buf(), (texture, aspect_ratio));
        Ok((texture, aspect_ratio))
    }

    /// Destroy every cached texture.
    pub fn clear(&mut self, gpu: &mut dyn GpuBackend) {
        let cached = [
            self.black.take(),
            self.white.take(),
            self.mixing_quadratic.take(),
        ];
        for texture in cached.into_iter().flatten() {
            gpu.destroy_texture(texture);
        }
        for (_, (texture, _)) in self.images.drain() {
            gpu.destroy_texture(texture);
        }
    }
}

fn upload(
    gpu: &mut dyn GpuBackend,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> Result<TextureHandle, GpuError> {
    let texture = gpu.create_texture(&TextureDesc {
        label,
        width,
        height,
        format: TextureFormat::Rgba8,
        usage: TextureUsage::Sampled,
    })?;
    if let Err(e) = gpu.write_texture(texture, width, height, rgba) {
        gpu.destroy_texture(texture);
        return Err(e);
    }
    Ok(texture)
}

/// RGBA pixels of the mixing background: luminance and alpha fall off with
/// the squared distance to the center.
pub fn mixing_quadratic_pixels() -> Vec<u8> {
    let size = MIXING_TEXTURE_SIZE as i32;
    let half = size / 2;
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for l in -half..half {
        for c in -half..half {
            let d = ((c * c + l * l) as f32 / 1024.0).clamp(0.0, 1.0);
            let luminance = ((0.95 - 0.8 * d) * 255.0).round() as u8;
            let alpha = ((1.0 - d) * 255.0).round() as u8;
            pixels.extend_from_slice(&[luminance, luminance, luminance, alpha]);
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;

    #[test]
    fn test_mixing_quadratic_falloff() {
        let pixels = mixing_quadratic_pixels();
        assert_eq!(pixels.len(), 64 * 64 * 4);

        let pixel = |row: usize, col: usize| {
            let i = (row * 64 + col) * 4;
            [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
        };
        // center is bright and opaque
        assert_eq!(pixel(32, 32), [242, 242, 242, 255]);
        // corners are fully transparent
        assert_eq!(pixel(0, 0)[3], 0);
        // luminance decreases outwards
        assert!(pixel(32, 48)[0] < pixel(32, 40)[0]);
    }

    #[test]
    fn test_placeholders_cached() {
        let (mut gpu, probe) = HeadlessBackend::with_probe();
        let mut resources = Resources::new();
        let a = resources.texture_black(&mut gpu).unwrap();
        let b = resources.texture_black(&mut gpu).unwrap();
        assert_eq!(a, b);
        resources.texture_white(&mut gpu).unwrap();
        resources.texture_mixing_quadratic(&mut gpu).unwrap();
        assert_eq!(probe.stats().live_textures, 3);

        resources.clear(&mut gpu);
        assert_eq!(probe.stats().live_textures, 0);
    }

    #[test]
    fn test_missing_image_is_decode_error() {
        let mut gpu = HeadlessBackend::new();
        let mut resources = Resources::new();
        let result = resources.texture_image(&mut gpu, Path::new("/nonexistent/picture.png"));
        assert!(matches!(result, Err(ResourceError::Decode { .. })));
    }
}
