//! A monitoring session: one device, one link, one event stream.
//!
//! `MonitorSession` constructs and owns every moving part (the config store handle,
//! the streaming and probing clients, the measurement window, and the alert
//! evaluator), so lifecycle is explicit: build a session when monitoring starts, drop
//! it when monitoring ends. Consumers subscribe to a broadcast channel instead of
//! registering callbacks, so any number of them can watch one session and tear down
//! cleanly by dropping their receiver.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::alerts::AlertEvaluator;
use crate::config::ConfigStore;
use crate::link::stream::DEVICE_WS_PORT;
use crate::link::{LinkError, ProbeClient, StreamClient};
use crate::model::{AlertEvent, ConnectionState, DeviceCommand, MonitorEvent, VitalSample};
use crate::validate;
use crate::window::MeasurementWindow;

/// Buffered events per subscriber before a slow consumer starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Owns the link to one sensor node and the processing attached to it.
pub struct MonitorSession {
    config: ConfigStore,
    stream: Arc<StreamClient>,
    probe: Arc<ProbeClient>,
    window: Arc<MeasurementWindow>,
    alerts: Arc<AlertEvaluator>,
    events: broadcast::Sender<MonitorEvent>,
    pump: JoinHandle<()>,
}

impl MonitorSession {
    /// Build a session around a config store, using the persisted device address.
    pub async fn new(config: ConfigStore) -> anyhow::Result<Self> {
        Self::with_stream_port(config, DEVICE_WS_PORT).await
    }

    /// Build a session whose streaming client dials a custom port (for testing).
    pub async fn with_stream_port(config: ConfigStore, port: u16) -> anyhow::Result<Self> {
        let address = config.device_address().await?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let stream = Arc::new(StreamClient::with_port(events.clone(), port));
        let probe = Arc::new(ProbeClient::new(&address));
        let window = Arc::new(MeasurementWindow::new());
        let alerts = Arc::new(AlertEvaluator::new());

        let pump = tokio::spawn(pump_samples(
            events.subscribe(),
            events.clone(),
            Arc::clone(&window),
            Arc::clone(&alerts),
            config.clone(),
        ));

        Ok(Self {
            config,
            stream,
            probe,
            window,
            alerts,
            events,
            pump,
        })
    }

    /// Subscribe to this session's events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Open the streaming link against the persisted device address.
    ///
    /// The session never re-dials on its own after a close; when to call this again
    /// is the caller's policy.
    pub async fn connect(&self) -> anyhow::Result<()> {
        let address = self.config.device_address().await?;
        self.stream.connect(&address).await?;
        Ok(())
    }

    /// Close the streaming link, if open.
    pub async fn disconnect(&self) {
        self.stream.disconnect().await;
    }

    /// Current state of the streaming link.
    pub fn connection_state(&self) -> ConnectionState {
        self.stream.state()
    }

    /// Reachability check over the probing transport. See [`ProbeClient::connect`]
    /// for the retry and single-flight semantics.
    pub async fn probe_device(&self) -> bool {
        self.probe.connect().await
    }

    /// Fetch one sample over the probing transport.
    ///
    /// The sample is normalized and published like a streamed one, so the measurement
    /// window and alert evaluator observe it as well.
    pub async fn fetch_sample(&self) -> Option<VitalSample> {
        let frame = self.probe.fetch_sample().await?;
        let sample = validate::normalize_frame(&frame, chrono::Utc::now());
        let _ = self.events.send(MonitorEvent::Sample(sample.clone()));
        Some(sample)
    }

    /// Persist a new device address and migrate the link to it.
    ///
    /// The probing client is repointed immediately; if the streaming link is
    /// connected, it performs exactly one disconnect-then-reconnect cycle against the
    /// new address.
    pub async fn set_device_address(&self, address: &str) -> anyhow::Result<()> {
        self.config.set_device_address(address).await?;
        self.probe.set_address(address);
        self.stream.change_address(address).await?;
        info!(%address, "device address updated");
        Ok(())
    }

    /// The persisted device address.
    pub async fn device_address(&self) -> anyhow::Result<String> {
        self.config.device_address().await
    }

    /// Send a command to the device over the streaming link.
    pub async fn send_command(&self, command: DeviceCommand) -> Result<(), LinkError> {
        self.stream.send_command(command).await
    }

    /// Whether the audible alarm is active.
    pub fn alarm_active(&self) -> bool {
        self.alerts.alarm_active()
    }

    /// Human acknowledgment of the alarm.
    pub fn acknowledge_alarm(&self) {
        self.alerts.acknowledge();
    }

    /// All alerts raised during this session, in order.
    pub fn active_alerts(&self) -> Vec<AlertEvent> {
        self.alerts.active_alerts()
    }

    /// Begin a fresh measurement window; the next valid sample opens it.
    pub fn reset_window(&self) {
        self.window.reset();
    }

    /// Whether the current measurement window has already fired.
    pub fn window_fired(&self) -> bool {
        self.window.has_fired()
    }

    /// The trigger payload persisted by the most recent window completion, across
    /// restarts.
    pub async fn last_report_trigger(&self) -> anyhow::Result<Option<VitalSample>> {
        self.config.last_report_trigger().await
    }

    /// Tear the session down: close the link and stop the processing task.
    pub async fn close(self) {
        self.stream.disconnect().await;
        self.pump.abort();
    }
}

/// Feed every published sample through the window and the alert evaluator, publishing
/// the trigger and alert events they produce.
async fn pump_samples(
    mut rx: broadcast::Receiver<MonitorEvent>,
    events: broadcast::Sender<MonitorEvent>,
    window: Arc<MeasurementWindow>,
    alerts: Arc<AlertEvaluator>,
    config: ConfigStore,
) {
    loop {
        match rx.recv().await {
            Ok(MonitorEvent::Sample(sample)) => {
                if let Some(trigger) = window.observe(&sample) {
                    info!(
                        heart_rate = trigger.heart_rate,
                        spo2 = trigger.spo2,
                        temperature = trigger.temperature,
                        "measurement window complete"
                    );
                    if let Err(e) = config.record_report_trigger(&trigger).await {
                        warn!(error = %e, "failed to persist report trigger");
                    }
                    let _ = events.send(MonitorEvent::WindowFired(trigger));
                }

                for alert in alerts.evaluate(&sample) {
                    let _ = events.send(MonitorEvent::Alert(alert));
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "event consumer lagged; samples dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DEVICE_ADDRESS;

    #[tokio::test]
    async fn test_session_starts_disconnected_with_default_address() {
        let config = ConfigStore::new("sqlite::memory:").await.unwrap();
        let session = MonitorSession::new(config).await.unwrap();

        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert_eq!(session.device_address().await.unwrap(), DEFAULT_DEVICE_ADDRESS);
        assert!(!session.alarm_active());
        assert!(session.active_alerts().is_empty());

        session.close().await;
    }

    #[tokio::test]
    async fn test_send_command_without_session_fails() {
        let config = ConfigStore::new("sqlite::memory:").await.unwrap();
        let session = MonitorSession::new(config).await.unwrap();

        let result = session.send_command(DeviceCommand::ResetSensor).await;
        assert!(matches!(result, Err(LinkError::NotConnected)));

        session.close().await;
    }

    #[tokio::test]
    async fn test_address_change_while_disconnected_only_persists() {
        let config = ConfigStore::new("sqlite::memory:").await.unwrap();
        let session = MonitorSession::new(config).await.unwrap();

        session.set_device_address("10.1.1.20").await.unwrap();

        assert_eq!(session.device_address().await.unwrap(), "10.1.1.20");
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);

        session.close().await;
    }
}
