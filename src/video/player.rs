//! Media player collaborator
//!
//! The compositing core never decodes media itself. A surface backed by a
//! [`MediaPlayer`] asks it for the current frame every draw; a player that
//! has no frame yet answers `None` and the surface samples the black
//! placeholder until it does.

use std::fmt;
use std::time::Duration;

use crate::gpu::{GpuBackend, TextureHandle};

/// Playback of one media file.
pub trait MediaPlayer: fmt::Debug {
    /// Open `uri`. Failures are reported through [`MediaPlayer::failed`].
    fn open(&mut self, uri: &str);

    fn play(&mut self, on: bool);

    fn is_playing(&self) -> bool;

    /// Advance playback; called once per frame by the update traversal.
    fn update(&mut self);

    /// Texture holding the current frame, if one has been produced.
    fn texture(&mut self, gpu: &mut dyn GpuBackend) -> Option<TextureHandle>;

    fn is_open(&self) -> bool;

    fn failed(&self) -> bool;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn aspect_ratio(&self) -> f32 {
        if self.height() == 0 {
            1.0
        } else {
            self.width() as f32 / self.height() as f32
        }
    }

    /// `None` for media without a finite duration (still images).
    fn duration(&self) -> Option<Duration>;

    /// Release GPU resources and stop playback.
    fn close(&mut self, gpu: &mut dyn GpuBackend);
}
