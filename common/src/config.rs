use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::Region;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the monitor to sample is chosen at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorSelection {
    /// Use `capture.monitor_index` as-is.
    Index,
    /// The display flagged as primary, else the first one.
    Primary,
    /// Ask on stdin.
    Prompt,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_selection")]
    pub selection: MonitorSelection,
    #[serde(default)]
    pub monitor_index: usize,
    /// Optional sub-area of the monitor to sample, in monitor coordinates.
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default = "default_capture_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Per-pixel luminance difference cutoff. Higher = less sensitive.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// Smallest changed blob, in pixels, that counts as motion.
    #[serde(default = "default_min_area")]
    pub min_area: u64,
    #[serde(default = "default_dilate_radius")]
    pub dilate_radius: u32,
    #[serde(default)]
    pub ignore_regions: Vec<Region>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_min_capture_interval_ms")]
    pub min_capture_interval_ms: u64,
    /// Outline the ignore regions on saved artifacts.
    #[serde(default = "default_annotate_ignored")]
    pub annotate_ignored: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            selection: default_selection(),
            monitor_index: 0,
            region: None,
            timeout_ms: default_capture_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            min_area: default_min_area(),
            dilate_radius: default_dilate_radius(),
            ignore_regions: Vec::new(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            jpeg_quality: default_jpeg_quality(),
            min_capture_interval_ms: default_min_capture_interval_ms(),
            annotate_ignored: default_annotate_ignored(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl CaptureConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl OutputConfig {
    pub fn min_capture_interval(&self) -> Duration {
        Duration::from_millis(self.min_capture_interval_ms)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges. Whether regions fit the frame can only be known
    /// once the first frame has been captured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detection.threshold > 255 {
            return Err(ConfigError::Invalid(format!(
                "detection.threshold must be within 0..=255, got {}",
                self.detection.threshold
            )));
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "output.jpeg_quality must be within 1..=100, got {}",
                self.output.jpeg_quality
            )));
        }
        if let Some(region) = self.detection.ignore_regions.iter().find(|r| r.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "detection.ignore_regions contains an empty region: {region:?}"
            )));
        }
        if let Some(region) = self.capture.region.filter(|r| r.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "capture.region is empty: {region:?}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_selection() -> MonitorSelection {
    MonitorSelection::Index
}
fn default_capture_timeout_ms() -> u64 {
    2000
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_threshold() -> u32 {
    25
}
fn default_min_area() -> u64 {
    100
}
fn default_dilate_radius() -> u32 {
    1
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("motion_captures")
}
fn default_jpeg_quality() -> u8 {
    95
}
fn default_min_capture_interval_ms() -> u64 {
    100
}
fn default_annotate_ignored() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}
