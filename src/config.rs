use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Screen rectangle that is captured and overlaid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureRegion {
    pub top: u32,
    pub left: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureRegion {
    fn default() -> Self {
        Self {
            top: 0,
            left: 0,
            width: 800,
            height: 600,
        }
    }
}

impl std::fmt::Display for CaptureRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.left, self.top)
    }
}

/// Process-wide settings, fixed at startup.
///
/// Durations are given in seconds in the file; the core works in
/// microseconds via [`Config::analysis_window_us`] and
/// [`Config::cooldown_us`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub region: CaptureRegion,
    /// Brightness percentage applied while protected.
    pub safe_brightness: u8,
    /// Gaussian sigma of the overlay blur. 0 disables the blur.
    pub blur_strength: f32,
    /// Minimum luminance delta between consecutive samples.
    pub flicker_threshold: f64,
    /// Minimum rate of significant changes, in Hz.
    pub flicker_frequency: f64,
    /// Length of the analysis window, in seconds.
    pub analysis_window: f64,
    /// Quiet time required before protection is lifted, in seconds.
    pub cooldown_sec: f64,
    /// Seconds between polls.
    pub update_rate: f64,
    /// Sysfs backlight directory, e.g. `/sys/class/backlight/intel_backlight`.
    pub backlight: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: CaptureRegion::default(),
            safe_brightness: 25,
            blur_strength: 8.0,
            flicker_threshold: 20.0,
            flicker_frequency: 3.0,
            analysis_window: 0.5,
            cooldown_sec: 1.0,
            update_rate: 1.0 / 60.0,
            backlight: None,
        }
    }
}

fn secs_to_us(secs: f64) -> i64 {
    (secs * 1_000_000.0).round() as i64
}

impl Config {
    /// Read, parse and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.region;
        if r.width == 0 || r.height == 0 {
            return Err(ConfigError::invalid("region", "width and height must be positive"));
        }
        if r.width > crate::MAX_REGION_DIM || r.height > crate::MAX_REGION_DIM {
            return Err(ConfigError::invalid(
                "region",
                format!("dimensions exceed {}", crate::MAX_REGION_DIM),
            ));
        }
        if self.safe_brightness > 100 {
            return Err(ConfigError::invalid("safe_brightness", "must be a percentage in 0..=100"));
        }
        if !self.blur_strength.is_finite() || self.blur_strength < 0.0 {
            return Err(ConfigError::invalid("blur_strength", "must be finite and non-negative"));
        }
        if !self.flicker_threshold.is_finite() || self.flicker_threshold < 0.0 {
            return Err(ConfigError::invalid("flicker_threshold", "must be finite and non-negative"));
        }
        Self::check_positive("flicker_frequency", self.flicker_frequency)?;
        Self::check_positive("analysis_window", self.analysis_window)?;
        Self::check_positive("update_rate", self.update_rate)?;
        if Duration::try_from_secs_f64(self.update_rate).is_err() {
            return Err(ConfigError::invalid("update_rate", "too large for a poll interval"));
        }
        if !self.cooldown_sec.is_finite() || self.cooldown_sec < 0.0 {
            return Err(ConfigError::invalid("cooldown_sec", "must be finite and non-negative"));
        }
        if self.analysis_window_us() == 0 {
            return Err(ConfigError::invalid("analysis_window", "shorter than one microsecond"));
        }
        Ok(())
    }

    fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(ConfigError::invalid(field, "must be finite and positive"))
        }
    }

    pub fn analysis_window_us(&self) -> i64 {
        secs_to_us(self.analysis_window)
    }

    pub fn cooldown_us(&self) -> i64 {
        secs_to_us(self.cooldown_sec)
    }

    /// Target time between the starts of two polls.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs_f64(self.update_rate)
    }
}
