//! Scriptable player for tests

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use super::MediaPlayer;
use crate::gpu::{GpuBackend, TextureDesc, TextureFormat, TextureHandle, TextureUsage};

/// Player whose failure can be switched from outside through the shared flag.
#[derive(Debug)]
pub(crate) struct ScriptedPlayer {
    pub width: u32,
    pub height: u32,
    pub duration: Option<Duration>,
    pub failed: Rc<Cell<bool>>,
    pub updates: Rc<Cell<usize>>,
    open: bool,
    playing: bool,
    texture: Option<TextureHandle>,
}

impl ScriptedPlayer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            duration: Some(Duration::from_secs(10)),
            failed: Rc::new(Cell::new(false)),
            updates: Rc::new(Cell::new(0)),
            open: false,
            playing: false,
            texture: None,
        }
    }
}

impl MediaPlayer for ScriptedPlayer {
    fn open(&mut self, _uri: &str) {
        self.open = true;
    }

    fn play(&mut self, on: bool) {
        self.playing = on;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn update(&mut self) {
        self.updates.set(self.updates.get() + 1);
    }

    fn texture(&mut self, gpu: &mut dyn GpuBackend) -> Option<TextureHandle> {
        if self.failed.get() || !self.open {
            return None;
        }
        if self.texture.is_none() {
            let desc = TextureDesc {
                label: "scripted",
                width: self.width,
                height: self.height,
                format: TextureFormat::Rgba8,
                usage: TextureUsage::Sampled,
            };
            self.texture = gpu.create_texture(&desc).ok();
        }
        self.texture
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn failed(&self) -> bool {
        self.failed.get()
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn close(&mut self, gpu: &mut dyn GpuBackend) {
        if let Some(texture) = self.texture.take() {
            gpu.destroy_texture(texture);
        }
        self.open = false;
    }
}
