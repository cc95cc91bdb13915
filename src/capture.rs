use image::{imageops, DynamicImage, Rgb, RgbImage, RgbaImage};

use crate::config::CaptureRegion;
use crate::error::CaptureError;

/// Produces one RGB frame of the configured region per call.
///
/// A returned error means the tick is skipped; it is never treated as a
/// brightness reading.
pub trait FrameSource {
    fn capture(&mut self, region: &CaptureRegion) -> Result<RgbImage, CaptureError>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn capture(&mut self, region: &CaptureRegion) -> Result<RgbImage, CaptureError> {
        (**self).capture(region)
    }
}

/// Crop a full-screen RGBA capture to `region`, dropping the alpha channel.
pub fn crop_region(screen: &RgbaImage, region: &CaptureRegion) -> Result<RgbImage, CaptureError> {
    let out_of_bounds = || CaptureError::OutOfBounds {
        top: region.top,
        left: region.left,
        width: region.width,
        height: region.height,
        screen_width: screen.width(),
        screen_height: screen.height(),
    };
    let right = region.left.checked_add(region.width).ok_or_else(out_of_bounds)?;
    let bottom = region.top.checked_add(region.height).ok_or_else(out_of_bounds)?;
    if right > screen.width() || bottom > screen.height() {
        return Err(out_of_bounds());
    }
    let cropped =
        imageops::crop_imm(screen, region.left, region.top, region.width, region.height).to_image();
    Ok(DynamicImage::ImageRgba8(cropped).to_rgb8())
}

/// Luminance pattern held for a number of ticks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Pattern {
    /// Constant gray level.
    Flat(u8),
    /// Switch between `low` and `high` every `every` ticks.
    Alternate { low: u8, high: u8, every: u32 },
}

/// One step of a synthetic script.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Phase {
    pub ticks: u32,
    pub pattern: Pattern,
}

/// Scripted frame source producing uniform gray frames.
///
/// Walks its phases in order and starts over after the last one. Used for
/// `--simulate` runs and to drive the monitor in tests.
pub struct SyntheticSource {
    phases: Vec<Phase>,
    phase_idx: usize,
    phase_tick: u32,
    frames: u64,
}

impl SyntheticSource {
    pub fn new(phases: Vec<Phase>) -> Self {
        assert!(!phases.is_empty(), "at least one phase is required");
        assert!(
            phases.iter().all(|p| p.ticks > 0),
            "phase length must be positive"
        );
        assert!(
            phases
                .iter()
                .all(|p| !matches!(p.pattern, Pattern::Alternate { every: 0, .. })),
            "alternation period must be positive"
        );
        Self {
            phases,
            phase_idx: 0,
            phase_tick: 0,
            frames: 0,
        }
    }

    /// Two seconds calm, two seconds of 15 Hz strobing, three seconds calm,
    /// at 60 polls per second.
    pub fn demo() -> Self {
        Self::new(vec![
            Phase {
                ticks: 120,
                pattern: Pattern::Flat(90),
            },
            Phase {
                ticks: 120,
                pattern: Pattern::Alternate {
                    low: 20,
                    high: 200,
                    every: 2,
                },
            },
            Phase {
                ticks: 180,
                pattern: Pattern::Flat(90),
            },
        ])
    }

    fn next_level(&mut self) -> u8 {
        let phase = self.phases[self.phase_idx];
        let level = match phase.pattern {
            Pattern::Flat(v) => v,
            Pattern::Alternate { low, high, every } => {
                if (self.phase_tick / every) % 2 == 0 {
                    low
                } else {
                    high
                }
            }
        };
        self.phase_tick += 1;
        if self.phase_tick >= phase.ticks {
            self.phase_tick = 0;
            self.phase_idx = (self.phase_idx + 1) % self.phases.len();
        }
        level
    }

    /// Number of frames produced so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSource for SyntheticSource {
    fn capture(&mut self, region: &CaptureRegion) -> Result<RgbImage, CaptureError> {
        let level = self.next_level();
        self.frames += 1;
        Ok(RgbImage::from_pixel(
            region.width,
            region.height,
            Rgb([level, level, level]),
        ))
    }
}

/// Captures the primary display through `xcap`.
#[cfg(feature = "screen-capture")]
pub struct ScreenCapture {
    monitor: xcap::Monitor,
}

#[cfg(feature = "screen-capture")]
impl ScreenCapture {
    /// Open the primary monitor, or the first one if none is marked primary.
    pub fn primary() -> Result<Self, CaptureError> {
        let mut monitors =
            xcap::Monitor::all().map_err(|e| CaptureError::Backend(e.to_string()))?;
        if monitors.is_empty() {
            return Err(CaptureError::NoDisplay);
        }
        let idx = monitors.iter().position(|m| m.is_primary()).unwrap_or(0);
        Ok(Self {
            monitor: monitors.swap_remove(idx),
        })
    }
}

#[cfg(feature = "screen-capture")]
impl FrameSource for ScreenCapture {
    fn capture(&mut self, region: &CaptureRegion) -> Result<RgbImage, CaptureError> {
        let screen = self
            .monitor
            .capture_image()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        crop_region(&screen, region)
    }
}
