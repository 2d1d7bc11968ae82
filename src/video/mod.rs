//! Media playback interface
//!
//! Surfaces sample media through the [`MediaPlayer`] trait. The crate ships
//! [`StillImagePlayer`]; decoders for moving pictures implement the same
//! trait outside the compositing core.

mod player;
mod still;
#[cfg(test)]
pub(crate) mod testing;

pub use player::MediaPlayer;
pub use still::StillImagePlayer;
