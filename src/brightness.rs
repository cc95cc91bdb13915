use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::BrightnessError;

/// Brightness applied when protection is lifted.
pub const FULL_BRIGHTNESS: u8 = 100;

/// Device-wide display brightness.
///
/// Requests are idempotent; callers log failures and carry on.
pub trait BrightnessControl {
    fn set_brightness(&mut self, percent: u8) -> Result<(), BrightnessError>;
}

impl<T: BrightnessControl + ?Sized> BrightnessControl for Box<T> {
    fn set_brightness(&mut self, percent: u8) -> Result<(), BrightnessError> {
        (**self).set_brightness(percent)
    }
}

fn check_percent(percent: u8) -> Result<(), BrightnessError> {
    if percent > 100 {
        Err(BrightnessError::OutOfRange(percent))
    } else {
        Ok(())
    }
}

/// Linux backlight driven through `/sys/class/backlight/<device>`.
///
/// Percentages are scaled to the device's `max_brightness` and written to
/// its `brightness` attribute.
pub struct SysfsBacklight {
    dir: PathBuf,
    max: u32,
}

impl SysfsBacklight {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, BrightnessError> {
        let dir = dir.into();
        let max_path = dir.join("max_brightness");
        let raw = fs::read_to_string(&max_path).map_err(|source| BrightnessError::Device {
            path: max_path.clone(),
            source,
        })?;
        let max = raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|&m| m > 0)
            .ok_or_else(|| BrightnessError::MalformedMax {
                path: max_path,
                raw: raw.trim().to_string(),
            })?;
        Ok(Self { dir, max })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Raw device value for a percentage, rounded to nearest.
    pub fn raw_value(&self, percent: u8) -> u32 {
        ((self.max as u64 * percent as u64 + 50) / 100) as u32
    }
}

impl BrightnessControl for SysfsBacklight {
    fn set_brightness(&mut self, percent: u8) -> Result<(), BrightnessError> {
        check_percent(percent)?;
        let raw = self.raw_value(percent);
        let path = self.dir.join("brightness");
        fs::write(&path, raw.to_string())
            .map_err(|source| BrightnessError::Device { path, source })?;
        debug!(percent, raw, "backlight updated");
        Ok(())
    }
}

/// Stand-in used when no brightness facility is configured.
/// Records the last request and logs it.
#[derive(Debug, Default)]
pub struct NullBrightness {
    last: Option<u8>,
}

impl NullBrightness {
    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

impl BrightnessControl for NullBrightness {
    fn set_brightness(&mut self, percent: u8) -> Result<(), BrightnessError> {
        check_percent(percent)?;
        debug!(percent, "no brightness device configured, request ignored");
        self.last = Some(percent);
        Ok(())
    }
}
