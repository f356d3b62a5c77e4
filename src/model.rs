//! Data models for vital-sign telemetry.
//!
//! The sensor node reports three readings per frame: heart rate (bpm), blood-oxygen
//! saturation (percent), and skin temperature (degrees Celsius). A reading the device
//! could not produce is represented by the `0.0` sentinel, never by a missing field or
//! a negative value. See [`crate::validate`] for how raw payloads are normalized into
//! this shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single normalized vital-sign sample.
///
/// Every field is `>= 0.0`; a field that the raw payload was missing, non-numeric, or
/// non-positive for is stored as `0.0` ("no reading"). Partial sensor dropout (e.g. a
/// bad SpO2 reading) therefore never discards an otherwise-good heart-rate reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalSample {
    /// Heart rate in beats per minute, or `0.0` for no reading.
    pub heart_rate: f64,

    /// Blood-oxygen saturation in percent, or `0.0` for no reading.
    pub spo2: f64,

    /// Skin temperature in degrees Celsius, or `0.0` for no reading.
    pub temperature: f64,

    /// When this sample was observed (assigned at ingest, UTC).
    pub observed_at: DateTime<Utc>,
}

impl VitalSample {
    /// A sample counts toward the measurement window only when both heart rate and
    /// SpO2 carry real readings. Temperature is optional hardware and does not gate
    /// validity.
    pub fn is_valid(&self) -> bool {
        self.heart_rate > 0.0 && self.spo2 > 0.0
    }
}

/// Raw telemetry payload as produced by the sensor node.
///
/// Used on the probing path (`GET /data`), where a body missing any of the three
/// numeric fields is a fetch failure rather than a partial reading. The device also
/// includes diagnostic fields (rssi, uptime, ...) which are ignored here.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryFrame {
    /// Heart rate in beats per minute.
    pub bpm: f64,

    /// Blood-oxygen saturation in percent.
    pub spo2: f64,

    /// Skin temperature in degrees Celsius.
    pub temp: f64,
}

/// Lifecycle of the link to the sensor node.
///
/// Exactly one link is live per session; the state is mutated only by the link's own
/// event handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport open.
    Disconnected,

    /// A dial attempt is in progress.
    Connecting,

    /// Streaming session established.
    Connected,

    /// Tearing down and re-dialing after an address change.
    Reconnecting,

    /// The last dial attempt failed; the caller decides when to retry.
    Failed,
}

/// Which clinical threshold a sample breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Heart rate below the bradycardia threshold.
    LowHeartRate,

    /// Blood-oxygen saturation below the hypoxemia threshold.
    LowOxygen,

    /// Skin temperature below the hypothermia threshold.
    LowTemperature,
}

impl AlertKind {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::LowHeartRate => "Low Heart Rate",
            AlertKind::LowOxygen => "Low Oxygen Saturation",
            AlertKind::LowTemperature => "Low Body Temperature",
        }
    }
}

/// A single critical-threshold alert.
///
/// Alerts are append-only: an equivalent alert already being active does not suppress
/// a new one, so a persisting breach re-fires on every sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    /// The threshold that was breached.
    pub kind: AlertKind,

    /// Human-readable description of the breach.
    pub message: String,

    /// When the breaching sample was observed.
    pub raised_at: DateTime<Utc>,
}

/// Events published by a monitoring session to its subscribers.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// The streaming link opened (`true`) or closed (`false`).
    ConnectionChanged(bool),

    /// A normalized sample arrived (streamed or fetched on demand).
    Sample(VitalSample),

    /// The measurement window completed; carries the trigger payload.
    WindowFired(VitalSample),

    /// A sample breached a clinical threshold.
    Alert(AlertEvent),
}

/// Sensitivity presets understood by the sensor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitivityLevel {
    Low,
    Medium,
    High,
}

/// Text commands the sensor node accepts over the streaming link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Reinitialize the optical sensor.
    ResetSensor,

    /// Adjust LED drive strength for signal quality.
    Sensitivity(SensitivityLevel),
}

impl DeviceCommand {
    /// The exact text the device firmware matches on.
    pub fn wire_text(&self) -> &'static str {
        match self {
            DeviceCommand::ResetSensor => "resetSensor",
            DeviceCommand::Sensitivity(SensitivityLevel::Low) => "sensitivity=low",
            DeviceCommand::Sensitivity(SensitivityLevel::Medium) => "sensitivity=medium",
            DeviceCommand::Sensitivity(SensitivityLevel::High) => "sensitivity=high",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_validity_requires_heart_rate_and_spo2() {
        let mut sample = VitalSample {
            heart_rate: 72.0,
            spo2: 97.0,
            temperature: 36.4,
            observed_at: Utc::now(),
        };
        assert!(sample.is_valid());

        sample.heart_rate = 0.0;
        assert!(!sample.is_valid());

        sample.heart_rate = 72.0;
        sample.spo2 = 0.0;
        assert!(!sample.is_valid());
    }

    #[test]
    fn test_sample_valid_without_temperature() {
        // Temperature is optional hardware; its absence must not gate validity.
        let sample = VitalSample {
            heart_rate: 72.0,
            spo2: 97.0,
            temperature: 0.0,
            observed_at: Utc::now(),
        };
        assert!(sample.is_valid());
    }

    #[test]
    fn test_telemetry_frame_requires_all_fields() {
        let full: Result<TelemetryFrame, _> =
            serde_json::from_str(r#"{"bpm": 72.0, "spo2": 97.5, "temp": 36.4}"#);
        assert!(full.is_ok());

        let missing: Result<TelemetryFrame, _> =
            serde_json::from_str(r#"{"bpm": 72.0, "spo2": 97.5}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn test_telemetry_frame_ignores_diagnostic_fields() {
        let frame: TelemetryFrame = serde_json::from_str(
            r#"{"bpm": 68.0, "spo2": 96.0, "temp": 36.1, "rssi": -54, "uptime": 120}"#,
        )
        .unwrap();
        assert_eq!(frame.bpm, 68.0);
    }

    #[test]
    fn test_device_command_wire_text() {
        assert_eq!(DeviceCommand::ResetSensor.wire_text(), "resetSensor");
        assert_eq!(
            DeviceCommand::Sensitivity(SensitivityLevel::High).wire_text(),
            "sensitivity=high"
        );
    }
}
