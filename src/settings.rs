//! Persisted mixer settings
//!
//! Per-view default transforms and the output resolution presets, stored as
//! XML in the platform config directory.

use std::fs;
use std::path::{Path, PathBuf};

use glam::Vec3;
use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::compositor::{ASPECT_RATIO_PRESETS, HEIGHT_PRESETS};
use crate::view::ViewMode;

/// Root transform of one view, restored when the view is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSettings {
    /// View name, see [`ViewMode::name`]
    #[serde(rename = "@name")]
    pub name: String,

    #[serde(rename = "@scale", with = "vec3_attribute")]
    pub scale: Vec3,

    #[serde(rename = "@translation", with = "vec3_attribute")]
    pub translation: Vec3,
}

impl ViewSettings {
    /// Factory defaults for `mode`
    pub fn default_for(mode: ViewMode) -> Self {
        let (scale, translation) = match mode {
            ViewMode::Rendering => (Vec3::ONE, Vec3::ZERO),
            ViewMode::Mixing => (Vec3::new(2.0, 2.0, 1.0), Vec3::ZERO),
            ViewMode::Geometry => (Vec3::new(1.2, 1.2, 1.0), Vec3::ZERO),
            ViewMode::Layer => (Vec3::new(0.8, 0.8, 1.0), Vec3::new(1.3, 0.5, 0.0)),
        };
        Self {
            name: mode.name().to_string(),
            scale,
            translation,
        }
    }
}

/// Master output resolution, as indices into the preset tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Index into [`ASPECT_RATIO_PRESETS`]
    #[serde(rename = "@aspectRatio")]
    pub aspect_ratio: usize,

    /// Index into [`HEIGHT_PRESETS`]
    #[serde(rename = "@height")]
    pub height: usize,
}

impl Default for OutputSettings {
    /// 16:9 at 1080 lines
    fn default() -> Self {
        Self {
            aspect_ratio: 3,
            height: 1,
        }
    }
}

impl OutputSettings {
    /// Bring out-of-range preset indices back into the tables
    pub fn clamp(&mut self) {
        self.aspect_ratio = self.aspect_ratio.min(ASPECT_RATIO_PRESETS.len() - 1);
        self.height = self.height.min(HEIGHT_PRESETS.len() - 1);
    }
}

/// Settings file contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "MixerSettings")]
pub struct MixerSettings {
    #[serde(rename = "view", default)]
    pub views: Vec<ViewSettings>,

    #[serde(rename = "output", default)]
    pub output: OutputSettings,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            views: ViewMode::ALL.into_iter().map(ViewSettings::default_for).collect(),
            output: OutputSettings::default(),
        }
    }
}

impl MixerSettings {
    /// Stored settings of `mode`, or its defaults when the file has none
    pub fn view(&self, mode: ViewMode) -> ViewSettings {
        self.views
            .iter()
            .find(|v| v.name == mode.name())
            .cloned()
            .unwrap_or_else(|| ViewSettings::default_for(mode))
    }

    /// Replace the stored settings of the view named in `view`
    pub fn set_view(&mut self, view: ViewSettings) {
        match self.views.iter_mut().find(|v| v.name == view.name) {
            Some(existing) => *existing = view,
            None => self.views.push(view),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let mut settings: Self = from_str(&contents)?;
        settings.output.clamp();
        Ok(settings)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        let xml = to_string(self)?;
        let formatted = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml);
        fs::write(path, formatted)?;
        Ok(())
    }

    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("ImmersiveMixer");
            p.push("settings.xml");
            p
        })
    }

    /// Load from the config directory, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring unreadable settings {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save to the config directory
    pub fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = Self::settings_path() else {
            return Err(SettingsError::NoConfigDir);
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.save_to_file(&path)?;
        tracing::info!("Settings saved to {}", path.display());
        Ok(())
    }
}

/// `Vec3` as a space separated attribute value
mod vec3_attribute {
    use super::*;

    pub fn serialize<S: Serializer>(v: &Vec3, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{} {} {}", v.x, v.y, v.z))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec3, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        let values = s
            .split_whitespace()
            .map(str::parse::<f32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(serde::de::Error::custom)?;
        match values.as_slice() {
            [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
            _ => Err(serde::de::Error::custom(format!(
                "expected three components, got '{}'",
                s
            ))),
        }
    }
}

/// Settings-related errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::DeError),
    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::SeError),
    #[error("Could not find config directory")]
    NoConfigDir,
}
