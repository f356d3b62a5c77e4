//! Normalization of raw telemetry payloads into well-formed samples.
//!
//! The sensor node streams whatever it has: fields go missing when the optical sensor
//! loses contact, and weak signals can produce junk values. Normalization is total.
//! Any decoded payload yields a [`VitalSample`], with each field independently kept
//! when it is a positive number and replaced by the `0.0` sentinel otherwise.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::{TelemetryFrame, VitalSample};

/// Normalize an arbitrary decoded payload into a [`VitalSample`].
///
/// Each of the three readings is taken from the payload independently: a field that is
/// present, numeric, and `> 0` is kept, anything else becomes `0.0`. This never fails;
/// a payload with no usable fields yields an all-zero sample.
pub fn normalize(raw: &Value, observed_at: DateTime<Utc>) -> VitalSample {
    VitalSample {
        heart_rate: positive_reading(raw, "bpm"),
        spo2: positive_reading(raw, "spo2"),
        temperature: positive_reading(raw, "temp"),
        observed_at,
    }
}

/// Apply the same per-field clamp to a typed frame from the probing path.
pub fn normalize_frame(frame: &TelemetryFrame, observed_at: DateTime<Utc>) -> VitalSample {
    VitalSample {
        heart_rate: clamp_reading(frame.bpm),
        spo2: clamp_reading(frame.spo2),
        temperature: clamp_reading(frame.temp),
        observed_at,
    }
}

fn positive_reading(raw: &Value, field: &str) -> f64 {
    raw.get(field)
        .and_then(Value::as_f64)
        .map(clamp_reading)
        .unwrap_or(0.0)
}

fn clamp_reading(value: f64) -> f64 {
    if value > 0.0 { value } else { 0.0 }
}
