//! Vitallink - resilient vital-sign telemetry core for a wearable sensor node.
//!
//! # Overview
//!
//! Vitallink keeps one resilient link to a remote embedded sensor node, normalizes its
//! heart-rate / SpO2 / temperature telemetry, and turns a continuous window of valid
//! readings into a one-shot report trigger while continuously checking every sample
//! against critical clinical thresholds.
//!
//! The surrounding application decides what to do with the events: render them, feed
//! the trigger payload to a report generator, sound the alarm cue. This crate owns the
//! data and control flow up to that boundary and nothing past it.
//!
//! # Resilience
//!
//! Every failure in the core is recovered or reported, never fatal:
//!
//! - Malformed stream frames are dropped; the connection stays up
//! - Partial sensor dropout zeroes the affected field, keeping the good ones
//! - Probe attempts retry up to a fixed cap, then report plain failure
//! - An address change migrates a live connection in one disconnect/reconnect cycle
//!
//! # Modules
//!
//! - [`model`]: Data types for samples, link state, alerts, and session events
//! - [`validate`]: Normalization of raw payloads into well-formed samples
//! - [`link`]: Streaming and probing transports to the sensor node
//! - [`window`]: Measurement window gating the one-shot report trigger
//! - [`alerts`]: Critical-threshold evaluation and the alarm latch
//! - [`config`]: Durable device address and trigger-record storage
//! - [`session`]: Owned wiring of one monitoring session

pub mod alerts;
pub mod config;
pub mod link;
pub mod model;
pub mod session;
pub mod validate;
pub mod window;
