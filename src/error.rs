use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// A frame could not be produced for this tick.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no display available for capture")]
    NoDisplay,
    #[error("capture region {width}x{height}+{left}+{top} lies outside the {screen_width}x{screen_height} display")]
    OutOfBounds {
        top: u32,
        left: u32,
        width: u32,
        height: u32,
        screen_width: u32,
        screen_height: u32,
    },
    #[error("capture backend failed: {0}")]
    Backend(String),
}

/// The brightness facility rejected or failed a request.
#[derive(Debug, Error)]
pub enum BrightnessError {
    #[error("brightness {0}% is outside 0..=100")]
    OutOfRange(u8),
    #[error("backlight device {path}: {source}")]
    Device {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("backlight device {path} reports malformed max_brightness `{raw}`")]
    MalformedMax { path: PathBuf, raw: String },
}

/// The overlay surface failed to present or clear.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("overlay image is {got_width}x{got_height}, surface expects {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },
    #[error("failed to write overlay snapshot: {0}")]
    Snapshot(#[from] image::ImageError),
}
