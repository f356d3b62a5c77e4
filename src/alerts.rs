//! Critical-threshold alerting over incoming samples.
//!
//! Every sample is checked against three fixed clinical thresholds. Alerts are
//! append-only and never deduplicated: a breach that persists re-fires on every
//! sample, so a consumer watching the log always sees the latest evaluation.
//!
//! The audible alarm is a latch. The first alert flips it active; no sample-driven
//! logic can deactivate it, only an explicit acknowledgment from a human.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::model::{AlertEvent, AlertKind, VitalSample};

/// Heart rate below this many bpm raises [`AlertKind::LowHeartRate`].
pub const MIN_HEART_RATE_BPM: f64 = 50.0;

/// SpO2 below this percentage raises [`AlertKind::LowOxygen`].
pub const MIN_SPO2_PERCENT: f64 = 88.0;

/// Temperature below this many degrees Celsius raises [`AlertKind::LowTemperature`].
/// A temperature of `0.0` is the no-reading sentinel and skips the check entirely.
pub const MIN_TEMPERATURE_C: f64 = 31.0;

/// Evaluates samples against the clinical thresholds and owns the alarm latch.
pub struct AlertEvaluator {
    alerts: Mutex<Vec<AlertEvent>>,
    alarm_active: AtomicBool,
}

impl Default for AlertEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertEvaluator {
    pub fn new() -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            alarm_active: AtomicBool::new(false),
        }
    }

    /// Check one sample against all thresholds.
    ///
    /// Returns the alerts raised by this sample (possibly empty). Each breach that
    /// holds for this sample appends one event, whether or not an equivalent alert is
    /// already in the log. The first event ever raised also activates the alarm.
    pub fn evaluate(&self, sample: &VitalSample) -> Vec<AlertEvent> {
        let mut raised = Vec::new();

        if sample.heart_rate < MIN_HEART_RATE_BPM {
            raised.push(self.breach(
                AlertKind::LowHeartRate,
                format!(
                    "heart rate {:.0} bpm below the {:.0} bpm threshold",
                    sample.heart_rate, MIN_HEART_RATE_BPM
                ),
                sample,
            ));
        }

        if sample.spo2 < MIN_SPO2_PERCENT {
            raised.push(self.breach(
                AlertKind::LowOxygen,
                format!(
                    "SpO2 {:.0}% below the {:.0}% threshold",
                    sample.spo2, MIN_SPO2_PERCENT
                ),
                sample,
            ));
        }

        // Temperature 0.0 means "no reading"; only a real reading can breach.
        if sample.temperature > 0.0 && sample.temperature < MIN_TEMPERATURE_C {
            raised.push(self.breach(
                AlertKind::LowTemperature,
                format!(
                    "body temperature {:.1} C below the {:.1} C threshold",
                    sample.temperature, MIN_TEMPERATURE_C
                ),
                sample,
            ));
        }

        if !raised.is_empty() {
            self.alerts
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .extend(raised.iter().cloned());

            // Latch the alarm on the first alert; re-raising while active is a no-op
            // so the cue is never restarted mid-loop.
            let _ = self.alarm_active.compare_exchange(
                false,
                true,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }

        raised
    }

    fn breach(&self, kind: AlertKind, message: String, sample: &VitalSample) -> AlertEvent {
        warn!(kind = kind.label(), %message, "critical threshold breached");
        AlertEvent {
            kind,
            message,
            raised_at: sample.observed_at,
        }
    }

    /// Whether the audible alarm is currently active.
    pub fn alarm_active(&self) -> bool {
        self.alarm_active.load(Ordering::Acquire)
    }

    /// Human acknowledgment: silence the alarm. The alert log is untouched.
    pub fn acknowledge(&self) {
        self.alarm_active.store(false, Ordering::Release);
    }

    /// Snapshot of every alert raised so far, in order of appearance.
    pub fn active_alerts(&self) -> Vec<AlertEvent> {
        self.alerts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}
