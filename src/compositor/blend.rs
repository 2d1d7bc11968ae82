//! Blend modes of shaders
//!
//! Every primitive shader carries a blend mode; sources expose it through
//! their blending shader so the rendering view can combine them differently.

use serde::{Deserialize, Serialize};

/// How a primitive's fragments combine with what is already in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// Porter-Duff source-over
    /// Result = Source × SourceAlpha + Dest × (1 - SourceAlpha)
    #[default]
    Normal,

    /// Result = Source × SourceAlpha + Dest
    Additive,

    /// Result = Dest - Source × SourceAlpha
    Subtract,

    /// Result = Source × Dest
    Multiply,

    /// Result = 1 - (1 - Source) × (1 - Dest)
    Screen,
}

impl BlendMode {
    /// Convert to the wgpu blend state of the color target.
    pub fn to_blend_state(self) -> wgpu::BlendState {
        match self {
            BlendMode::Normal => wgpu::BlendState::ALPHA_BLENDING,

            BlendMode::Additive => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },

            BlendMode::Subtract => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::ReverseSubtract,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Zero,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },

            BlendMode::Multiply => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Dst,
                    dst_factor: wgpu::BlendFactor::Zero,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::DstAlpha,
                    dst_factor: wgpu::BlendFactor::Zero,
                    operation: wgpu::BlendOperation::Add,
                },
            },

            BlendMode::Screen => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::OneMinusSrc,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                    operation: wgpu::BlendOperation::Add,
                },
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Additive => "Additive",
            BlendMode::Subtract => "Subtract",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
        }
    }

    /// Parse a name as produced by [`name`](Self::name), case-insensitive
    pub fn from_name(name: &str) -> Option<BlendMode> {
        Self::all()
            .iter()
            .copied()
            .find(|mode| mode.name().eq_ignore_ascii_case(name))
    }

    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Additive,
            BlendMode::Subtract,
            BlendMode::Multiply,
            BlendMode::Screen,
        ]
    }
}

impl std::fmt::Display for BlendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_mode_default() {
        assert_eq!(BlendMode::default(), BlendMode::Normal);
    }

    #[test]
    fn test_blend_mode_from_name() {
        assert_eq!(BlendMode::from_name("subtract"), Some(BlendMode::Subtract));
        assert_eq!(BlendMode::from_name("Screen"), Some(BlendMode::Screen));
        assert_eq!(BlendMode::from_name("overlay"), None);
        for mode in BlendMode::all() {
            assert_eq!(BlendMode::from_name(&mode.to_string()), Some(*mode));
        }
    }

    #[test]
    fn test_subtract_reverses_operation() {
        let state = BlendMode::Subtract.to_blend_state();
        assert_eq!(state.color.operation, wgpu::BlendOperation::ReverseSubtract);
        assert_eq!(
            BlendMode::Normal.to_blend_state(),
            wgpu::BlendState::ALPHA_BLENDING
        );
    }
}
