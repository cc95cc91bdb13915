use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::brightness::BrightnessControl;
use crate::capture::FrameSource;
use crate::clock::Clock;
use crate::config::{CaptureRegion, Config};
use crate::detector::FlickerDetector;
use crate::luminance::luminance;
use crate::overlay::ProtectiveOverlayController;
use crate::safety::{SafetyState, SafetyStateMachine, Transition};
use crate::sample::LuminanceSample;
use crate::surface::OverlaySurface;

/// Consecutive failed captures after which an engaged overlay is taken down
/// rather than left showing an outdated frame.
pub const MAX_STALE_TICKS: u64 = 30;

/// Result of a single poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Capture failed; nothing was ingested and no state changed.
    Skipped,
    Processed {
        luminance: f64,
        flicker: bool,
        transition: Transition,
    },
}

/// Loop timing statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub total_ticks: u64,
    pub skipped_ticks: u64,
    pub deadline_misses: u64,
    pub worst_case: Duration,
}

/// Sequential capture → sample → detect → decide → render loop.
///
/// Owns all mutable state (history, safety state, cooldown timer). Time for
/// detection and cooldown comes from `clock`; pacing uses the real clock.
pub struct Monitor<F, B, S, C> {
    region: CaptureRegion,
    source: F,
    detector: FlickerDetector,
    safety: SafetyStateMachine,
    overlay: ProtectiveOverlayController<B, S>,
    clock: C,
    frame_budget: Duration,
    capture_failures: u64,
    stats: LoopStats,
}

impl<F, B, S, C> Monitor<F, B, S, C>
where
    F: FrameSource,
    B: BrightnessControl,
    S: OverlaySurface,
    C: Clock,
{
    pub fn new(config: &Config, source: F, brightness: B, surface: S, clock: C) -> Self {
        Self {
            region: config.region,
            source,
            detector: FlickerDetector::from_config(config),
            safety: SafetyStateMachine::from_config(config),
            overlay: ProtectiveOverlayController::from_config(config, brightness, surface),
            clock,
            frame_budget: config.update_interval(),
            capture_failures: 0,
            stats: LoopStats::default(),
        }
    }

    /// Run one poll.
    pub fn tick(&mut self) -> TickOutcome {
        let start = Instant::now();
        let outcome = self.poll();

        let elapsed = start.elapsed();
        if elapsed > self.frame_budget {
            self.stats.deadline_misses += 1;
        }
        if elapsed > self.stats.worst_case {
            self.stats.worst_case = elapsed;
        }
        self.stats.total_ticks += 1;
        if outcome == TickOutcome::Skipped {
            self.stats.skipped_ticks += 1;
        }
        outcome
    }

    fn poll(&mut self) -> TickOutcome {
        let frame = match self.source.capture(&self.region) {
            Ok(frame) => frame,
            Err(e) => {
                self.capture_failures += 1;
                if self.capture_failures == 1 {
                    warn!(error = %e, "capture failed, skipping tick");
                } else {
                    debug!(error = %e, failures = self.capture_failures, "capture still failing");
                }
                if self.capture_failures == MAX_STALE_TICKS && self.overlay.is_engaged() {
                    warn!(
                        failures = self.capture_failures,
                        "no fresh frames, withdrawing stale overlay"
                    );
                    self.overlay.withdraw_overlay();
                }
                return TickOutcome::Skipped;
            }
        };
        if self.capture_failures > 0 {
            info!(failures = self.capture_failures, "capture recovered");
            self.capture_failures = 0;
        }

        let now = self.clock.now_us();
        let value = luminance(&frame);
        let flicker = self.detector.ingest(LuminanceSample::new(now, value));
        let transition = self.safety.update(flicker, now);
        self.overlay.on_transition(transition, &frame);

        debug!(
            now,
            luminance = value,
            flicker,
            state = ?self.safety.state(),
            "tick"
        );

        TickOutcome::Processed {
            luminance: value,
            flicker,
            transition,
        }
    }

    /// Poll at the configured rate until `shutdown` is set, then restore the
    /// display.
    pub fn run(&mut self, shutdown: &AtomicBool) -> LoopStats {
        while !shutdown.load(Ordering::SeqCst) {
            let cycle_start = Instant::now();
            self.tick();
            let elapsed = cycle_start.elapsed();
            if elapsed < self.frame_budget {
                std::thread::sleep(self.frame_budget - elapsed);
            }
        }
        self.shutdown();
        self.stats
    }

    /// Clear the overlay and restore full brightness.
    pub fn shutdown(&mut self) {
        self.overlay.restore();
        info!(
            ticks = self.stats.total_ticks,
            skipped = self.stats.skipped_ticks,
            deadline_misses = self.stats.deadline_misses,
            worst_case_us = self.stats.worst_case.as_micros() as u64,
            "monitor stopped"
        );
    }

    pub fn state(&self) -> SafetyState {
        self.safety.state()
    }

    pub fn detector(&self) -> &FlickerDetector {
        &self.detector
    }

    pub fn safety(&self) -> &SafetyStateMachine {
        &self.safety
    }

    pub fn overlay(&self) -> &ProtectiveOverlayController<B, S> {
        &self.overlay
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }
}
