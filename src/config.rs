//! Session configuration.
//!
//! Every section has working defaults, so an empty TOML file is a valid
//! configuration.

use crate::geometry::FramingBounds;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Framing rectangle and display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Bounds for the automatically sized framing rectangle.
    #[serde(flatten)]
    pub bounds: FramingBounds,
    /// Display orientation applied to the device, in degrees.
    pub orientation_degrees: u32,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            bounds: FramingBounds::default(),
            orientation_degrees: 90,
        }
    }
}

impl FramingConfig {
    /// Validates the framing settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.bounds;
        if b.min_width == 0 || b.min_height == 0 {
            return Err(ConfigError::InvalidFramingBounds);
        }
        if b.min_width > b.max_width || b.min_height > b.max_height {
            return Err(ConfigError::InvalidFramingBounds);
        }
        if self.orientation_degrees % 90 != 0 || self.orientation_degrees >= 360 {
            return Err(ConfigError::InvalidOrientation(self.orientation_degrees));
        }
        Ok(())
    }
}

/// Auto-focus scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    /// Shortest accepted periodic focus interval in milliseconds.
    pub min_period_ms: u64,
    /// Periodic focus interval applied when preview starts (0 disables).
    pub period_ms: u64,
    /// Issue one focus request as soon as preview starts.
    pub focus_on_start: bool,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            min_period_ms: 100,
            period_ms: 0,
            focus_on_start: true,
        }
    }
}

impl FocusConfig {
    /// Minimum periodic interval.
    pub fn min_period(&self) -> Duration {
        Duration::from_millis(self.min_period_ms)
    }

    /// Validates the focus settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_period_ms == 0 {
            return Err(ConfigError::InvalidFocusPeriod(self.min_period_ms));
        }
        if self.period_ms != 0 && self.period_ms < self.min_period_ms {
            return Err(ConfigError::InvalidFocusPeriod(self.period_ms));
        }
        Ok(())
    }
}

/// What the session does after a frame decodes to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissPolicy {
    /// Wait for the next focus pass (periodic or requested).
    #[default]
    Wait,
    /// Request another focus pass right away.
    Refocus,
    /// Capture another frame without refocusing.
    Recapture,
}

/// Scan loop settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Reaction to a frame without a code.
    pub on_miss: MissPolicy,
}

/// Decode pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Render a preview snapshot of each decoded frame.
    pub preview_snapshots: bool,
    /// Rotation applied to preview snapshots, in degrees.
    pub snapshot_rotation: u32,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            preview_snapshots: true,
            snapshot_rotation: 90,
        }
    }
}

impl DecodeConfig {
    /// Validates the decode settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snapshot_rotation % 90 != 0 || self.snapshot_rotation >= 360 {
            return Err(ConfigError::InvalidOrientation(self.snapshot_rotation));
        }
        Ok(())
    }
}

/// Everything a [`CameraSession`](crate::session::CameraSession) needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Framing rectangle and capture orientation.
    pub framing: FramingConfig,
    /// Focus scheduling.
    pub focus: FocusConfig,
    /// What to do after a miss.
    pub scan: ScanConfig,
    /// Decode pipeline behaviour.
    pub decode: DecodeConfig,
}

impl SessionConfig {
    /// Validates all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.framing.validate()?;
        self.focus.validate()?;
        self.decode.validate()?;
        Ok(())
    }
}

/// Output configuration for the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Stop after the first decoded result.
    pub stop_on_result: bool,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            stop_on_result: true,
            metrics_port: 0,
        }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    /// Settings handed to the session.
    #[serde(default, flatten)]
    pub session: SessionConfig,
    /// Binary output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.session.validate()?;
        Ok(config)
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A minimum is zero or exceeds its maximum.
    #[error("invalid framing bounds (minimums must be non-zero and not exceed maximums)")]
    InvalidFramingBounds,
    /// Orientation is not a right angle.
    #[error("invalid orientation {0} (must be 0, 90, 180 or 270)")]
    InvalidOrientation(u32),
    /// Focus period below the minimum.
    #[error("invalid focus period {0}ms")]
    InvalidFocusPeriod(u64),
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}
