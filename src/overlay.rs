use image::{imageops, DynamicImage, GrayImage, Luma, RgbImage};
use tracing::{debug, info, warn};

use crate::brightness::{BrightnessControl, FULL_BRIGHTNESS};
use crate::config::Config;
use crate::luminance::pixel_luma;
use crate::safety::Transition;
use crate::surface::OverlaySurface;

/// Desaturated, blurred copy of `frame`.
///
/// Converts to grayscale, applies a Gaussian blur with standard deviation
/// `sigma` (skipped when `sigma` is 0) and replicates the result across the
/// three channels.
pub fn protective_filter(frame: &RgbImage, sigma: f32) -> RgbImage {
    let gray = GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let luma = pixel_luma(&frame.get_pixel(x, y).0);
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    });
    let gray = if sigma > 0.0 {
        imageops::blur(&gray, sigma)
    } else {
        gray
    };
    DynamicImage::ImageLuma8(gray).to_rgb8()
}

/// Applies and removes the protective measures.
///
/// Entering protection dims the display and presents the filtered frame;
/// every further tick while engaged re-presents the filtered latest frame;
/// leaving protection restores full brightness and clears the overlay.
/// A surface error while presenting falls back to clearing, so a failed
/// render never leaves a stale image on screen. A failed brightness request
/// is kept pending and re-issued on every following tick until it succeeds
/// or a newer edge replaces it.
pub struct ProtectiveOverlayController<B, S> {
    brightness: B,
    surface: S,
    safe_brightness: u8,
    blur_sigma: f32,
    engaged: bool,
    pending_brightness: Option<u8>,
}

impl<B: BrightnessControl, S: OverlaySurface> ProtectiveOverlayController<B, S> {
    pub fn new(brightness: B, surface: S, safe_brightness: u8, blur_sigma: f32) -> Self {
        assert!(safe_brightness <= 100, "safe_brightness must be a percentage");
        assert!(blur_sigma >= 0.0, "blur_sigma must be non-negative");
        Self {
            brightness,
            surface,
            safe_brightness,
            blur_sigma,
            engaged: false,
            pending_brightness: None,
        }
    }

    pub fn from_config(config: &Config, brightness: B, surface: S) -> Self {
        Self::new(
            brightness,
            surface,
            config.safe_brightness,
            config.blur_strength,
        )
    }

    pub fn on_transition(&mut self, transition: Transition, frame: &RgbImage) {
        match transition {
            Transition::EnteredProtected => {
                self.engaged = true;
                info!(
                    brightness = self.safe_brightness,
                    "flicker detected, applying protective measures"
                );
                self.request_brightness(self.safe_brightness);
                self.refresh(frame);
            }
            Transition::NoChange => {
                self.retry_brightness();
                if self.engaged {
                    self.refresh(frame);
                }
            }
            Transition::ExitedProtected => {
                self.engaged = false;
                self.request_brightness(FULL_BRIGHTNESS);
                self.clear_overlay();
                info!("normal display restored");
            }
        }
    }

    /// Unconditionally clear the overlay and restore full brightness.
    pub fn restore(&mut self) {
        self.engaged = false;
        self.clear_overlay();
        self.request_brightness(FULL_BRIGHTNESS);
    }

    /// Take down the overlay while staying engaged, for when no fresh frame
    /// is available to derive it from. The next protected tick re-presents.
    pub fn withdraw_overlay(&mut self) {
        if self.engaged {
            self.clear_overlay();
        }
    }

    fn refresh(&mut self, frame: &RgbImage) {
        let filtered = protective_filter(frame, self.blur_sigma);
        if let Err(e) = self.surface.present(&filtered) {
            warn!(error = %e, "overlay update failed, clearing overlay");
            self.clear_overlay();
        }
    }

    fn clear_overlay(&mut self) {
        if let Err(e) = self.surface.clear() {
            warn!(error = %e, "failed to clear overlay");
        }
    }

    fn request_brightness(&mut self, percent: u8) {
        self.pending_brightness = None;
        if let Err(e) = self.brightness.set_brightness(percent) {
            warn!(error = %e, percent, "brightness change failed, will retry");
            self.pending_brightness = Some(percent);
        }
    }

    fn retry_brightness(&mut self) {
        let Some(percent) = self.pending_brightness else {
            return;
        };
        match self.brightness.set_brightness(percent) {
            Ok(()) => {
                info!(percent, "brightness change applied on retry");
                self.pending_brightness = None;
            }
            Err(e) => debug!(error = %e, percent, "brightness still unavailable"),
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    pub fn brightness(&self) -> &B {
        &self.brightness
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Brightness percentage still waiting to be applied, if any.
    pub fn pending_brightness(&self) -> Option<u8> {
        self.pending_brightness
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BrightnessError, RenderError};
    use image::Rgb;

    #[derive(Default)]
    struct Brightness {
        calls: Vec<u8>,
        /// Number of upcoming requests that fail.
        failures: u32,
    }

    impl BrightnessControl for Brightness {
        fn set_brightness(&mut self, percent: u8) -> Result<(), BrightnessError> {
            self.calls.push(percent);
            if self.failures > 0 {
                self.failures -= 1;
                Err(BrightnessError::OutOfRange(percent))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct Surface {
        shown: Option<RgbImage>,
        presents: u32,
        clears: u32,
        fail_present: bool,
    }

    impl OverlaySurface for Surface {
        fn present(&mut self, image: &RgbImage) -> Result<(), RenderError> {
            self.presents += 1;
            if self.fail_present {
                // Half-drawn before failing
                self.shown = Some(RgbImage::new(1, 1));
                return Err(RenderError::SizeMismatch {
                    width: 1,
                    height: 1,
                    got_width: image.width(),
                    got_height: image.height(),
                });
            }
            self.shown = Some(image.clone());
            Ok(())
        }

        fn clear(&mut self) -> Result<(), RenderError> {
            self.clears += 1;
            self.shown = None;
            Ok(())
        }
    }

    fn frame(level: u8) -> RgbImage {
        RgbImage::from_pixel(6, 4, Rgb([level, level, level]))
    }

    fn controller() -> ProtectiveOverlayController<Brightness, Surface> {
        ProtectiveOverlayController::new(Brightness::default(), Surface::default(), 25, 2.0)
    }

    #[test]
    fn test_filter_is_gray_and_same_size() {
        let src = RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 30) as u8, (y * 30) as u8, 200]));
        let out = protective_filter(&src, 1.5);
        assert_eq!(out.dimensions(), (8, 8));
        assert!(out.pixels().all(|p| p.0[0] == p.0[1] && p.0[1] == p.0[2]));
    }

    #[test]
    fn test_filter_blurs_edges() {
        // Hard vertical edge: black left half, white right half
        let src = RgbImage::from_fn(16, 4, |x, _| {
            if x < 8 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let sharp = protective_filter(&src, 0.0);
        assert_eq!(sharp.get_pixel(7, 2).0[0], 0);
        assert_eq!(sharp.get_pixel(8, 2).0[0], 255);
        let blurred = protective_filter(&src, 2.0);
        let left = blurred.get_pixel(7, 2).0[0];
        let right = blurred.get_pixel(8, 2).0[0];
        assert!(left > 0 && right < 255, "edge not softened: {} {}", left, right);
    }

    #[test]
    fn test_filter_keeps_uniform_level() {
        let out = protective_filter(&frame(120), 8.0);
        assert!(out.pixels().all(|p| (p.0[0] as i32 - 120).abs() <= 1));
    }

    #[test]
    fn test_enter_dims_and_presents() {
        let mut ctl = controller();
        ctl.on_transition(Transition::EnteredProtected, &frame(80));
        assert!(ctl.is_engaged());
        assert_eq!(ctl.brightness().calls, vec![25]);
        assert_eq!(ctl.surface().presents, 1);
        assert!(ctl.surface().shown.is_some());
    }

    #[test]
    fn test_no_change_while_engaged_refreshes_only_overlay() {
        let mut ctl = controller();
        ctl.on_transition(Transition::EnteredProtected, &frame(80));
        for level in [10, 200, 50] {
            ctl.on_transition(Transition::NoChange, &frame(level));
        }
        assert_eq!(ctl.brightness().calls, vec![25]);
        assert_eq!(ctl.surface().presents, 4);
        // Tracks the latest frame
        let shown = ctl.surface().shown.as_ref().unwrap();
        assert!((shown.get_pixel(0, 0).0[0] as i32 - 50).abs() <= 1);
    }

    #[test]
    fn test_no_change_while_idle_does_nothing() {
        let mut ctl = controller();
        for _ in 0..5 {
            ctl.on_transition(Transition::NoChange, &frame(80));
        }
        assert!(ctl.brightness().calls.is_empty());
        assert_eq!(ctl.surface().presents, 0);
        assert_eq!(ctl.surface().clears, 0);
    }

    #[test]
    fn test_exit_restores_and_clears() {
        let mut ctl = controller();
        ctl.on_transition(Transition::EnteredProtected, &frame(80));
        ctl.on_transition(Transition::ExitedProtected, &frame(80));
        assert!(!ctl.is_engaged());
        assert_eq!(ctl.brightness().calls, vec![25, 100]);
        assert_eq!(ctl.surface().clears, 1);
        assert!(ctl.surface().shown.is_none());
        // Idle again afterwards
        ctl.on_transition(Transition::NoChange, &frame(80));
        assert_eq!(ctl.surface().presents, 1);
    }

    #[test]
    fn test_render_failure_falls_back_to_clear() {
        let surface = Surface {
            fail_present: true,
            ..Surface::default()
        };
        let mut ctl = ProtectiveOverlayController::new(Brightness::default(), surface, 25, 2.0);
        ctl.on_transition(Transition::EnteredProtected, &frame(80));
        assert_eq!(ctl.surface().clears, 1);
        assert!(ctl.surface().shown.is_none(), "partial overlay left on screen");
        // Still protected; keeps retrying each tick
        assert!(ctl.is_engaged());
        ctl.on_transition(Transition::NoChange, &frame(80));
        assert_eq!(ctl.surface().presents, 2);
        assert_eq!(ctl.surface().clears, 2);
    }

    #[test]
    fn test_brightness_failure_does_not_stop_overlay() {
        let brightness = Brightness {
            failures: u32::MAX,
            ..Brightness::default()
        };
        let mut ctl = ProtectiveOverlayController::new(brightness, Surface::default(), 25, 2.0);
        ctl.on_transition(Transition::EnteredProtected, &frame(80));
        assert!(ctl.is_engaged());
        assert_eq!(ctl.surface().presents, 1);
        assert!(ctl.surface().shown.is_some());
    }

    #[test]
    fn test_failed_dimming_retried_while_protected() {
        let brightness = Brightness {
            failures: 1,
            ..Brightness::default()
        };
        let mut ctl = ProtectiveOverlayController::new(brightness, Surface::default(), 25, 2.0);
        ctl.on_transition(Transition::EnteredProtected, &frame(80));
        assert_eq!(ctl.pending_brightness(), Some(25));
        ctl.on_transition(Transition::NoChange, &frame(80));
        assert_eq!(ctl.brightness().calls, vec![25, 25]);
        assert_eq!(ctl.pending_brightness(), None);
        // Applied; no further requests
        for _ in 0..10 {
            ctl.on_transition(Transition::NoChange, &frame(80));
        }
        assert_eq!(ctl.brightness().calls, vec![25, 25]);
        assert!(ctl.surface().shown.is_some());
    }

    #[test]
    fn test_failed_restore_retried_after_exit() {
        let mut ctl = controller();
        ctl.on_transition(Transition::EnteredProtected, &frame(80));
        ctl.brightness.failures = 2;
        ctl.on_transition(Transition::ExitedProtected, &frame(80));
        assert!(ctl.surface().shown.is_none());
        assert_eq!(ctl.pending_brightness(), Some(100));
        ctl.on_transition(Transition::NoChange, &frame(80));
        assert_eq!(ctl.pending_brightness(), Some(100));
        ctl.on_transition(Transition::NoChange, &frame(80));
        assert_eq!(ctl.brightness().calls, vec![25, 100, 100, 100]);
        assert_eq!(ctl.pending_brightness(), None);
        // Idle: no overlay came back
        assert_eq!(ctl.surface().presents, 1);
    }

    #[test]
    fn test_new_edge_replaces_pending_request() {
        let brightness = Brightness {
            failures: 1,
            ..Brightness::default()
        };
        let mut ctl = ProtectiveOverlayController::new(brightness, Surface::default(), 25, 2.0);
        ctl.on_transition(Transition::EnteredProtected, &frame(80));
        ctl.on_transition(Transition::ExitedProtected, &frame(80));
        assert_eq!(ctl.pending_brightness(), None);
        ctl.on_transition(Transition::NoChange, &frame(80));
        assert_eq!(ctl.brightness().calls, vec![25, 100]);
    }

    #[test]
    fn test_withdraw_overlay_only_when_engaged() {
        let mut ctl = controller();
        ctl.withdraw_overlay();
        assert_eq!(ctl.surface().clears, 0);
        ctl.on_transition(Transition::EnteredProtected, &frame(80));
        ctl.withdraw_overlay();
        assert!(ctl.surface().shown.is_none());
        assert!(ctl.is_engaged());
        assert_eq!(ctl.brightness().calls, vec![25]);
        ctl.on_transition(Transition::NoChange, &frame(80));
        assert!(ctl.surface().shown.is_some());
    }

    #[test]
    fn test_restore_is_unconditional() {
        let mut ctl = controller();
        ctl.restore();
        assert_eq!(ctl.brightness().calls, vec![100]);
        assert_eq!(ctl.surface().clears, 1);
        assert!(!ctl.is_engaged());
    }
}
