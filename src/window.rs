//! Measurement window gating the one-shot report trigger.
//!
//! A report is worth generating only after the device has been read continuously for a
//! while. The window opens on the first valid sample, and once the configured duration
//! has elapsed it fires exactly once, handing the latest sample to the consumer as the
//! trigger payload. The window then stays fired until the consumer explicitly resets
//! it for a new monitoring session.
//!
//! Invariant: the start timestamp, once set, survives invalid samples. An intermittent
//! sensor dropout does not restart the timer; elapsed time is always measured from the
//! first valid observation.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};

use crate::model::VitalSample;

/// How long a continuous run of valid readings must be observed before the window
/// fires, in seconds.
pub const WINDOW_DURATION_SECS: i64 = 20;

/// One-shot window over a continuous run of valid readings.
///
/// `observe` may be called from concurrent workers; the fired flag is a compare-and-
/// swap, so exactly one caller receives the trigger payload per window.
pub struct MeasurementWindow {
    duration: Duration,
    started_at: Mutex<Option<DateTime<Utc>>>,
    fired: AtomicBool,
}

impl Default for MeasurementWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementWindow {
    /// Create a window with the standard duration.
    pub fn new() -> Self {
        Self::with_duration(Duration::seconds(WINDOW_DURATION_SECS))
    }

    /// Create a window with a custom duration (for testing).
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            duration,
            started_at: Mutex::new(None),
            fired: AtomicBool::new(false),
        }
    }

    /// Feed one sample through the window.
    ///
    /// Returns the trigger payload (the sample just observed) exactly once, on the
    /// first observation at or past the window duration. Returns `None` in every other
    /// case: window not yet open, duration not yet elapsed, or already fired.
    pub fn observe(&self, sample: &VitalSample) -> Option<VitalSample> {
        if self.fired.load(Ordering::Acquire) {
            return None;
        }

        let started_at = {
            let mut started = self
                .started_at
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            match *started {
                Some(at) => at,
                None => {
                    // Only a valid sample opens the window.
                    if !sample.is_valid() {
                        return None;
                    }
                    *started = Some(sample.observed_at);
                    sample.observed_at
                }
            }
        };

        // Every sample after opening is checked, valid or not; the trigger payload is
        // whatever the latest sample holds when the duration is crossed.
        if sample.observed_at - started_at >= self.duration
            && self
                .fired
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            return Some(sample.clone());
        }

        None
    }

    /// Whether this window has already fired.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// When the current window opened, if it has.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *self
            .started_at
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Discard all window state and begin a fresh window on the next valid sample.
    pub fn reset(&self) {
        let mut started = self
            .started_at
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *started = None;
        self.fired.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(secs: i64, heart_rate: f64, spo2: f64) -> VitalSample {
        VitalSample {
            heart_rate,
            spo2,
            temperature: 36.5,
            observed_at: DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_window_opens_on_first_valid_sample() {
        let window = MeasurementWindow::new();

        assert!(window.observe(&sample_at(0, 0.0, 0.0)).is_none());
        assert!(window.started_at().is_none());

        assert!(window.observe(&sample_at(1, 70.0, 96.0)).is_none());
        assert_eq!(
            window.started_at(),
            Some(DateTime::from_timestamp(1_700_000_001, 0).unwrap())
        );
    }

    #[test]
    fn test_window_fires_at_duration_inclusive_and_not_before() {
        let window = MeasurementWindow::new();

        assert!(window.observe(&sample_at(0, 70.0, 96.0)).is_none());
        assert!(window.observe(&sample_at(19, 70.0, 96.0)).is_none());

        let trigger = window.observe(&sample_at(20, 71.0, 95.0));
        assert_eq!(trigger.unwrap().heart_rate, 71.0);
    }

    #[test]
    fn test_window_fires_at_most_once() {
        let window = MeasurementWindow::new();

        window.observe(&sample_at(0, 70.0, 96.0));
        assert!(window.observe(&sample_at(20, 70.0, 96.0)).is_some());

        // Any number of later samples must not re-trigger.
        for t in 21..30 {
            assert!(window.observe(&sample_at(t, 70.0, 96.0)).is_none());
        }
        assert!(window.has_fired());
    }

    #[test]
    fn test_intermittent_dropout_does_not_reset_start() {
        let window = MeasurementWindow::new();

        window.observe(&sample_at(0, 70.0, 96.0));
        // Dropout at t=5: invalid sample, window stays open from t=0.
        assert!(window.observe(&sample_at(5, 0.0, 0.0)).is_none());

        // Valid again at t=21: elapsed is measured from t=0, so it fires.
        assert!(window.observe(&sample_at(21, 70.0, 96.0)).is_some());
    }

    #[test]
    fn test_invalid_sample_past_duration_still_triggers() {
        // Once open, every sample is checked against the deadline, valid or not; the
        // trigger payload is the latest sample even when it is a dropout.
        let window = MeasurementWindow::new();

        window.observe(&sample_at(0, 70.0, 96.0));
        let trigger = window.observe(&sample_at(25, 0.0, 0.0));

        assert_eq!(trigger.unwrap().heart_rate, 0.0);
    }

    #[test]
    fn test_reset_starts_a_fresh_window() {
        let window = MeasurementWindow::new();

        window.observe(&sample_at(0, 70.0, 96.0));
        assert!(window.observe(&sample_at(20, 70.0, 96.0)).is_some());

        window.reset();
        assert!(!window.has_fired());
        assert!(window.started_at().is_none());

        // New window opens at t=30 and fires at t=50.
        assert!(window.observe(&sample_at(30, 70.0, 96.0)).is_none());
        assert!(window.observe(&sample_at(49, 70.0, 96.0)).is_none());
        assert!(window.observe(&sample_at(50, 70.0, 96.0)).is_some());
    }

    #[test]
    fn test_concurrent_observers_trigger_exactly_once() {
        use std::sync::Arc;

        let window = Arc::new(MeasurementWindow::new());
        window.observe(&sample_at(0, 70.0, 96.0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let window = Arc::clone(&window);
            handles.push(std::thread::spawn(move || {
                window.observe(&sample_at(20, 70.0, 96.0)).is_some()
            }));
        }

        let fired: usize = handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();
        assert_eq!(fired, 1);
    }
}
