//! Engine tuning parameters.

use crate::tools::{DEFAULT_ERASER_SIZE, DEFAULT_PEN_SIZE};
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// When and how far history is flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionPolicy {
    /// Number of recent actions kept as individual, undoable steps.
    pub target_tail: usize,
    /// Extra growth tolerated before compacting again.
    pub hysteresis: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            target_tail: 100,
            hysteresis: 20,
        }
    }
}

impl CompactionPolicy {
    /// History length above which compaction is due.
    pub fn threshold(&self) -> usize {
        self.target_tail + self.hysteresis
    }
}

/// Export cropping and sizing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Blank margin around the content, in output pixels.
    pub padding: f64,
    /// Longest allowed side of the content before downscaling.
    pub max_dimension: f64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            padding: 20.0,
            max_dimension: 2000.0,
        }
    }
}

/// Serializable RGBA8 colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Everything tunable about a drawing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub compaction: CompactionPolicy,
    pub export: ExportSettings,
    /// Fraction of the device pixel ratio used by the static layer during a pinch.
    pub degraded_pixel_ratio: f64,
    /// Colour every pen stroke and stamp is filled with.
    pub ink: SerializableColor,
    pub default_pen_size: f64,
    pub default_eraser_size: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            compaction: CompactionPolicy::default(),
            export: ExportSettings::default(),
            degraded_pixel_ratio: 0.75,
            ink: SerializableColor::black(),
            default_pen_size: DEFAULT_PEN_SIZE,
            default_eraser_size: DEFAULT_ERASER_SIZE,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    pub fn ink_color(&self) -> Color {
        self.ink.into()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.compaction.target_tail == 0 {
            return Err(ConfigError::Invalid {
                field: "compaction.target_tail",
                message: "must keep at least one action".to_string(),
            });
        }
        if !(self.degraded_pixel_ratio > 0.0 && self.degraded_pixel_ratio <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "degraded_pixel_ratio",
                message: format!("{} is outside (0, 1]", self.degraded_pixel_ratio),
            });
        }
        if !(self.export.max_dimension >= 1.0) {
            return Err(ConfigError::Invalid {
                field: "export.max_dimension",
                message: format!("{} is below 1", self.export.max_dimension),
            });
        }
        if !(self.export.padding >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "export.padding",
                message: format!("{} is negative", self.export.padding),
            });
        }
        Ok(())
    }
}
