//! Still image played as media

use std::time::Duration;

use image::RgbaImage;

use super::MediaPlayer;
use crate::gpu::{GpuBackend, TextureDesc, TextureFormat, TextureHandle, TextureUsage};

/// [`MediaPlayer`] showing a single decoded image.
///
/// Decoding happens on `open`; the texture is uploaded on the first
/// `texture` call after it.
#[derive(Debug, Default)]
pub struct StillImagePlayer {
    uri: String,
    pixels: Option<RgbaImage>,
    texture: Option<TextureHandle>,
    width: u32,
    height: u32,
    playing: bool,
    failed: bool,
}

impl StillImagePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Player over pixels already in memory; it counts as open.
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            uri: String::from("memory"),
            pixels: Some(image),
            width,
            height,
            ..Self::default()
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn upload(&mut self, gpu: &mut dyn GpuBackend) -> Option<TextureHandle> {
        let pixels = self.pixels.take()?;
        let desc = TextureDesc {
            label: &self.uri,
            width: self.width,
            height: self.height,
            format: TextureFormat::Rgba8,
            usage: TextureUsage::Sampled,
        };
        let uploaded = gpu.create_texture(&desc).and_then(|texture| {
            match gpu.write_texture(texture, self.width, self.height, pixels.as_raw()) {
                Ok(()) => Ok(texture),
                Err(e) => {
                    gpu.destroy_texture(texture);
                    Err(e)
                }
            }
        });
        match uploaded {
            Ok(texture) => {
                self.texture = Some(texture);
                Some(texture)
            }
            Err(e) => {
                tracing::error!("StillImagePlayer: upload of {} failed: {}", self.uri, e);
                self.failed = true;
                None
            }
        }
    }
}

impl MediaPlayer for StillImagePlayer {
    fn open(&mut self, uri: &str) {
        self.uri = uri.to_string();
        self.failed = false;
        match image::open(uri) {
            Ok(image) => {
                let image = image.to_rgba8();
                (self.width, self.height) = image.dimensions();
                tracing::info!("StillImagePlayer: {} ({}x{})", uri, self.width, self.height);
                self.pixels = Some(image);
            }
            Err(e) => {
                tracing::warn!("StillImagePlayer: cannot open {}: {}", uri, e);
                self.failed = true;
            }
        }
    }

    fn play(&mut self, on: bool) {
        self.playing = on;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn update(&mut self) {}

    fn texture(&mut self, gpu: &mut dyn GpuBackend) -> Option<TextureHandle> {
        if self.failed {
            return None;
        }
        match self.texture {
            Some(texture) => Some(texture),
            None => self.upload(gpu),
        }
    }

    fn is_open(&self) -> bool {
        self.pixels.is_some() || self.texture.is_some()
    }

    fn failed(&self) -> bool {
        self.failed
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn duration(&self) -> Option<Duration> {
        None
    }

    fn close(&mut self, gpu: &mut dyn GpuBackend) {
        if let Some(texture) = self.texture.take() {
            gpu.destroy_texture(texture);
        }
        self.pixels = None;
        self.playing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;

    #[test]
    fn test_texture_uploaded_once() {
        let (mut gpu, probe) = HeadlessBackend::with_probe();
        let mut player = StillImagePlayer::from_rgba(RgbaImage::new(40, 20));
        assert!(player.is_open());
        assert_eq!(player.aspect_ratio(), 2.0);
        assert!(player.duration().is_none());

        let first = player.texture(&mut gpu);
        assert!(first.is_some());
        assert_eq!(player.texture(&mut gpu), first);
        assert_eq!(probe.stats().live_textures, 1);

        player.close(&mut gpu);
        assert_eq!(probe.stats().live_textures, 0);
        assert!(!player.is_open());
    }

    #[test]
    fn test_missing_file_fails() {
        let mut player = StillImagePlayer::new();
        player.open("/nonexistent/picture.png");
        assert!(player.failed());
        assert!(!player.is_open());
        let mut gpu = HeadlessBackend::new();
        assert!(player.texture(&mut gpu).is_none());
    }
}
