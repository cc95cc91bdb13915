use std::collections::VecDeque;

use crate::config::Config;
use crate::sample::LuminanceSample;

/// Minimum number of samples in the window before any judgement is made.
pub const MIN_SAMPLES: usize = 5;

/// Minimum number of above-threshold changes needed to estimate a frequency.
pub const MIN_SIGNIFICANT_CHANGES: usize = 3;

/// Outcome of assessing the current brightness history.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FlickerVerdict {
    /// Not enough samples or changes to estimate a frequency.
    Undetermined {
        samples: usize,
        significant_changes: usize,
    },
    /// Changes occur, but slower than the flicker frequency.
    Steady {
        significant_changes: usize,
        frequency: f64,
    },
    /// Changes occur at or above the flicker frequency.
    Flicker {
        significant_changes: usize,
        frequency: f64,
    },
}

impl FlickerVerdict {
    pub fn is_flicker(&self) -> bool {
        matches!(self, FlickerVerdict::Flicker { .. })
    }

    /// Estimated change frequency in Hz, if one was computed.
    /// Infinite when all counted changes share a timestamp.
    pub fn frequency(&self) -> Option<f64> {
        match *self {
            FlickerVerdict::Undetermined { .. } => None,
            FlickerVerdict::Steady { frequency, .. } | FlickerVerdict::Flicker { frequency, .. } => {
                Some(frequency)
            }
        }
    }
}

/// Rolling-window flicker detector.
///
/// Keeps the luminance samples of the last `window_us` microseconds and
/// reports flicker when the brightness changes by more than `threshold`
/// between consecutive samples often enough: at least
/// [`MIN_SIGNIFICANT_CHANGES`] times, at a rate of at least
/// `min_frequency_hz` changes per second.
///
/// The rate divides the number of significant changes by the time between
/// the earlier samples of the first and last consecutive pairs, i.e. the
/// first and second-to-last samples in the window.
pub struct FlickerDetector {
    history: VecDeque<LuminanceSample>,
    window_us: i64,
    threshold: f64,
    min_frequency_hz: f64,
    last_verdict: FlickerVerdict,
}

impl FlickerDetector {
    /// Create a new detector.
    ///
    /// - `window_us`: Length of the analysis window in microseconds.
    /// - `threshold`: Minimum per-step luminance delta counted as a change.
    /// - `min_frequency_hz`: Minimum change rate reported as flicker.
    pub fn new(window_us: i64, threshold: f64, min_frequency_hz: f64) -> Self {
        assert!(window_us > 0, "window_us must be positive");
        assert!(threshold >= 0.0, "threshold must be non-negative");
        assert!(min_frequency_hz > 0.0, "min_frequency_hz must be positive");
        Self {
            history: VecDeque::new(),
            window_us,
            threshold,
            min_frequency_hz,
            last_verdict: FlickerVerdict::Undetermined {
                samples: 0,
                significant_changes: 0,
            },
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.analysis_window_us(),
            config.flicker_threshold,
            config.flicker_frequency,
        )
    }

    /// Add a sample and return true if flicker is currently occurring.
    ///
    /// The sample is placed in timestamp order. Samples older than the window,
    /// measured from the newest sample held, are evicted on every call; under
    /// a monotonic clock that is the sample being ingested.
    pub fn ingest(&mut self, sample: LuminanceSample) -> bool {
        let idx = self
            .history
            .partition_point(|s| s.timestamp <= sample.timestamp);
        self.history.insert(idx, sample);

        let now = match self.history.back() {
            Some(newest) => newest.timestamp,
            None => return false,
        };
        while let Some(oldest) = self.history.front() {
            if now.saturating_sub(oldest.timestamp) > self.window_us {
                self.history.pop_front();
            } else {
                break;
            }
        }

        self.last_verdict = self.assess();
        self.last_verdict.is_flicker()
    }

    fn assess(&self) -> FlickerVerdict {
        let samples = self.history.len();
        if samples < MIN_SAMPLES {
            return FlickerVerdict::Undetermined {
                samples,
                significant_changes: 0,
            };
        }

        let significant_changes = self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .filter(|(prev, next)| (next.value - prev.value).abs() > self.threshold)
            .count();

        if significant_changes < MIN_SIGNIFICANT_CHANGES {
            return FlickerVerdict::Undetermined {
                samples,
                significant_changes,
            };
        }

        // Each change is stamped with the earlier sample of its pair.
        let first = self.history[0].timestamp;
        let last = self.history[samples - 2].timestamp;
        let span_us = last.saturating_sub(first);
        let frequency = if span_us <= 0 {
            f64::INFINITY
        } else {
            significant_changes as f64 * 1_000_000.0 / span_us as f64
        };

        if frequency >= self.min_frequency_hz {
            FlickerVerdict::Flicker {
                significant_changes,
                frequency,
            }
        } else {
            FlickerVerdict::Steady {
                significant_changes,
                frequency,
            }
        }
    }

    /// Verdict computed by the most recent `ingest`.
    pub fn last_verdict(&self) -> FlickerVerdict {
        self.last_verdict
    }

    /// Samples currently in the window, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &LuminanceSample> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Drop all history.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_verdict = FlickerVerdict::Undetermined {
            samples: 0,
            significant_changes: 0,
        };
    }
}
