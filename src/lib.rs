//! Photosensitivity guard: watches a screen region for rapid brightness
//! oscillation and, while it lasts, dims the display and paints a
//! desaturated, blurred overlay over the region.

pub mod brightness;
pub mod capture;
pub mod clock;
pub mod config;
pub mod detector;
pub mod error;
pub mod luminance;
pub mod monitor;
pub mod overlay;
pub mod safety;
pub mod sample;
pub mod surface;

/// Maximum allowed capture dimension to prevent excessive frame allocation.
pub const MAX_REGION_DIM: u32 = 32768;

pub use config::{CaptureRegion, Config};
pub use detector::{FlickerDetector, FlickerVerdict};
pub use monitor::{LoopStats, Monitor, TickOutcome};
pub use overlay::ProtectiveOverlayController;
pub use safety::{SafetyState, SafetyStateMachine, Transition};
pub use sample::LuminanceSample;
