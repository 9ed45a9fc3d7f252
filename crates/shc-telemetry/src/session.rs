use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shc_device::{read_environment, Environment, ProvisioningStore, SensorSource, StoreKey};

use crate::endpoint::{CadenceTable, EndpointTable};
use crate::error::{Result, TelemetryError};
use crate::link::{LinkConnector, LinkReceiver};
use crate::sample::TelemetrySample;

/// Telemetry session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub endpoints: EndpointTable,
    pub cadence: CadenceTable,
    /// Upper bound on one dial.
    pub connect_timeout: Duration,
    /// Pause between a failed session and the next attempt.
    pub retry_delay: Duration,
    /// How long to wait for the remote close after sending ours.
    pub close_grace: Duration,
    /// Upper bound on one temperature reading.
    pub sample_timeout: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoints: EndpointTable::default(),
            cadence: CadenceTable::default(),
            connect_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(1),
            close_grace: Duration::from_secs(1),
            sample_timeout: Duration::from_secs(10),
        }
    }
}

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Not started yet.
    Idle,
    /// Dialing `url` (1-based attempt counter).
    Connecting { attempt: u64, url: String },
    /// Connected and sending at `cadence`.
    Connected { url: String, cadence: Duration },
    /// The last attempt failed; waiting before the next one.
    Disconnected { attempt: u64 },
    /// Interrupted. Terminal.
    Stopped,
}

/// How a single [`TelemetrySession::communicate`] call ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    Interrupted,
}

/// Long-lived reporting session.
///
/// [`TelemetrySession::run`] dials the endpoint for the provisioned
/// environment, sends one [`TelemetrySample`] per tick, and logs whatever
/// the remote end sends back. Any failure tears the connection down and
/// starts over from the environment lookup; only the shutdown token ends
/// the loop.
pub struct TelemetrySession {
    config: TelemetryConfig,
    store: Arc<dyn ProvisioningStore>,
    sensor: Arc<dyn SensorSource>,
    connector: Arc<dyn LinkConnector>,
    state: watch::Sender<SessionState>,
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl TelemetrySession {
    pub fn new(
        config: TelemetryConfig,
        store: Arc<dyn ProvisioningStore>,
        sensor: Arc<dyn SensorSource>,
        connector: Arc<dyn LinkConnector>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            config,
            store,
            sensor,
            connector,
            state,
            last_timestamp: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Retry [`Self::communicate`] until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.communicate(attempt, &shutdown).await {
                Ok(SessionExit::Interrupted) => break,
                Err(err) => {
                    warn!(attempt, error = %err, "telemetry session ended; retrying");
                    self.state
                        .send_replace(SessionState::Disconnected { attempt });
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
        }
        self.state.send_replace(SessionState::Stopped);
        info!("telemetry session stopped");
    }

    fn environment(&self) -> Option<Environment> {
        read_environment(self.store.as_ref()).unwrap_or_else(|err| {
            warn!(error = %err, "could not read environment");
            None
        })
    }

    /// One session: resolve, dial, then send and receive until something
    /// fails or `shutdown` fires.
    pub async fn communicate(
        &self,
        attempt: u64,
        shutdown: &CancellationToken,
    ) -> Result<SessionExit> {
        let environment = self.environment();
        let endpoint = self.config.endpoints.resolve(environment).ok_or_else(|| {
            TelemetryError::NoEndpoint(environment.map_or("unset", Environment::as_str).to_string())
        })?;
        let url = endpoint.url();
        let cadence = self.config.cadence.interval(environment);

        self.state.send_replace(SessionState::Connecting {
            attempt,
            url: url.clone(),
        });
        info!(url = %url, attempt, "connecting telemetry socket");

        let dial = tokio::time::timeout(self.config.connect_timeout, self.connector.connect(&url));
        let (mut sender, receiver) = tokio::select! {
            _ = shutdown.cancelled() => return Ok(SessionExit::Interrupted),
            dialed = dial => dialed.map_err(|_| TelemetryError::ConnectTimeout {
                url: url.clone(),
                timeout: self.config.connect_timeout,
            })??,
        };

        self.state.send_replace(SessionState::Connected {
            url: url.clone(),
            cadence,
        });
        info!(url = %url, cadence_ms = cadence.as_millis() as u64, "telemetry connected");

        let mut reader = tokio::spawn(receive_loop(receiver));
        let mut ticker = tokio::time::interval_at(Instant::now() + cadence, cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    if let Err(err) = sender.close().await {
                        debug!(error = %err, "close frame not sent");
                    }
                    let _ = tokio::time::timeout(self.config.close_grace, &mut reader).await;
                    break Ok(SessionExit::Interrupted);
                }
                ended = &mut reader => {
                    break Err(ended.unwrap_or(TelemetryError::Closed));
                }
                _ = ticker.tick() => {
                    // A slow sensor must not hold up the close handshake.
                    let sample = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => continue,
                        sample = self.sample() => sample,
                    };
                    let text = match sample.to_json() {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(error = %err, "sample not serializable; skipped");
                            continue;
                        }
                    };
                    if let Err(err) = sender.send_text(text).await {
                        break Err(err);
                    }
                    debug!(temperature = sample.temperature, "telemetry sample sent");
                }
            }
        };

        reader.abort();
        result
    }

    /// Build a sample. Never fails: an unreadable sensor reports `0.0`.
    pub async fn sample(&self) -> TelemetrySample {
        let read = |key| {
            self.store.get(key).ok().flatten().unwrap_or_default()
        };
        let identifier = read(StoreKey::Identifier);
        let correlation_id = read(StoreKey::CorrelationId);

        let temperature =
            match tokio::time::timeout(self.config.sample_timeout, self.sensor.temperature())
                .await
            {
                Ok(Ok(value)) => value,
                Ok(Err(err)) => {
                    warn!(error = %err, "temperature unavailable; reporting 0");
                    0.0
                }
                Err(_) => {
                    warn!("temperature read timed out; reporting 0");
                    0.0
                }
            };

        TelemetrySample {
            identifier,
            correlation_id,
            temperature,
            timestamp: self.next_timestamp(),
        }
    }

    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.last_timestamp.lock();
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + chrono::Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

/// Log inbound messages until the link closes or fails.
async fn receive_loop(mut receiver: Box<dyn LinkReceiver>) -> TelemetryError {
    loop {
        match receiver.recv().await {
            Ok(Some(message)) => info!(message = %message, "telemetry message received"),
            Ok(None) => return TelemetryError::Closed,
            Err(err) => return err,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use shc_device::{DeviceError, MemoryStore};
    use tokio::sync::mpsc;

    use super::*;
    use crate::endpoint::Endpoint;
    use crate::link::LinkSender;

    struct FixedSensor(Option<f64>);

    #[async_trait]
    impl SensorSource for FixedSensor {
        async fn temperature(&self) -> shc_device::Result<f64> {
            self.0.ok_or(DeviceError::Parse {
                what: "temperature",
            })
        }
    }

    /// Loopback link: sent text is captured, `close` ends the receiver.
    #[derive(Default)]
    struct MockConnector {
        failures_left: AtomicUsize,
        fail_sends: AtomicBool,
        attempts: AtomicUsize,
        closed: Arc<AtomicBool>,
        sent: Mutex<Option<mpsc::UnboundedSender<String>>>,
    }

    impl MockConnector {
        fn new(failures: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let connector = Self {
                failures_left: AtomicUsize::new(failures),
                sent: Mutex::new(Some(tx)),
                ..Self::default()
            };
            (Arc::new(connector), rx)
        }
    }

    struct MockSender {
        sent: Option<mpsc::UnboundedSender<String>>,
        fail: bool,
        closed: Arc<AtomicBool>,
        inbound: Option<mpsc::UnboundedSender<String>>,
    }

    struct MockReceiver {
        inbound: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl LinkConnector for MockConnector {
        async fn connect(
            &self,
            url: &str,
        ) -> Result<(Box<dyn LinkSender>, Box<dyn LinkReceiver>)> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(TelemetryError::Connect {
                    url: url.to_string(),
                    reason: "refused".into(),
                });
            }
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            let sender = MockSender {
                sent: self.sent.lock().clone(),
                fail: self.fail_sends.swap(false, Ordering::SeqCst),
                closed: self.closed.clone(),
                inbound: Some(inbound_tx),
            };
            Ok((
                Box::new(sender),
                Box::new(MockReceiver {
                    inbound: inbound_rx,
                }),
            ))
        }
    }

    #[async_trait]
    impl LinkSender for MockSender {
        async fn send_text(&mut self, text: String) -> Result<()> {
            if self.fail {
                return Err(TelemetryError::Send("broken pipe".into()));
            }
            if let Some(sent) = &self.sent {
                let _ = sent.send(text);
            }
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            self.inbound.take();
            Ok(())
        }
    }

    #[async_trait]
    impl LinkReceiver for MockReceiver {
        async fn recv(&mut self) -> Result<Option<String>> {
            Ok(self.inbound.recv().await)
        }
    }

    fn fast_config() -> TelemetryConfig {
        TelemetryConfig {
            endpoints: EndpointTable::empty()
                .with(Environment::Development, Endpoint::ws("dev.invalid"))
                .with_fallback(Endpoint::ws("unset.invalid")),
            cadence: CadenceTable {
                development: Duration::from_millis(30),
                production: Duration::from_millis(30),
                unset: Duration::from_millis(30),
            },
            connect_timeout: Duration::from_secs(1),
            retry_delay: Duration::from_millis(10),
            close_grace: Duration::from_millis(50),
            sample_timeout: Duration::from_millis(100),
        }
    }

    fn session(
        config: TelemetryConfig,
        store: Arc<MemoryStore>,
        sensor: Option<f64>,
        connector: Arc<MockConnector>,
    ) -> Arc<TelemetrySession> {
        Arc::new(TelemetrySession::new(
            config,
            store,
            Arc::new(FixedSensor(sensor)),
            connector,
        ))
    }

    async fn wait_connected(session: &TelemetrySession) {
        let mut state = session.subscribe_state();
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| matches!(s, SessionState::Connected { .. })),
        )
        .await
        .expect("session should connect")
        .unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_failed_first_dial() {
        let (connector, _sent) = MockConnector::new(1);
        let session = session(
            fast_config(),
            Arc::new(MemoryStore::new()),
            Some(40.0),
            connector.clone(),
        );
        let shutdown = CancellationToken::new();
        let task = {
            let session = session.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { session.run(shutdown).await })
        };

        wait_connected(&session).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn sends_samples_at_cadence_with_increasing_timestamps() {
        let store = Arc::new(MemoryStore::new());
        store.set(StoreKey::Environment, "dev").unwrap();
        store.set(StoreKey::Identifier, "kitchen").unwrap();
        let (connector, mut sent) = MockConnector::new(0);
        let session = session(fast_config(), store, Some(47.5), connector);
        let shutdown = CancellationToken::new();
        let task = {
            let session = session.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { session.run(shutdown).await })
        };

        wait_connected(&session).await;
        let started = tokio::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(320)).await;
        let elapsed = started.elapsed();
        shutdown.cancel();
        task.await.unwrap();

        let mut samples = Vec::new();
        while let Ok(text) = sent.try_recv() {
            samples.push(serde_json::from_str::<TelemetrySample>(&text).unwrap());
        }
        let expected = (elapsed.as_millis() / 30) as usize;
        assert!(
            samples.len() + 1 >= expected,
            "got {} samples in {elapsed:?}",
            samples.len()
        );
        assert!(samples.len() >= 5);
        for pair in samples.windows(2) {
            assert!(pair[1].timestamp > pair[0].timestamp);
        }
        assert!(samples
            .iter()
            .all(|s| s.identifier == "kitchen" && s.temperature == 47.5));
    }

    #[tokio::test]
    async fn interrupt_sends_close_and_stops() {
        let (connector, _sent) = MockConnector::new(0);
        let session = session(
            fast_config(),
            Arc::new(MemoryStore::new()),
            Some(40.0),
            connector.clone(),
        );
        let shutdown = CancellationToken::new();
        let task = {
            let session = session.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { session.run(shutdown).await })
        };

        wait_connected(&session).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("session should stop promptly")
            .unwrap();
        assert!(connector.closed.load(Ordering::SeqCst));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SessionState::Stopped);
    }

    struct StalledSensor;

    #[async_trait]
    impl SensorSource for StalledSensor {
        async fn temperature(&self) -> shc_device::Result<f64> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(40.0)
        }
    }

    #[tokio::test]
    async fn interrupt_during_slow_sample_stops_promptly() {
        let (connector, mut sent) = MockConnector::new(0);
        let config = TelemetryConfig {
            sample_timeout: Duration::from_secs(30),
            ..fast_config()
        };
        let session = Arc::new(TelemetrySession::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(StalledSensor),
            connector.clone(),
        ));
        let shutdown = CancellationToken::new();
        let task = {
            let session = session.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { session.run(shutdown).await })
        };

        wait_connected(&session).await;
        // First tick lands at 30ms; the sensor is now stuck.
        tokio::time::sleep(Duration::from_millis(80)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_millis(500), task)
            .await
            .expect("shutdown should not wait on the sensor")
            .unwrap();

        assert!(connector.closed.load(Ordering::SeqCst));
        assert!(sent.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn send_failure_restarts_session() {
        let (connector, _sent) = MockConnector::new(0);
        connector.fail_sends.store(true, Ordering::SeqCst);
        let session = session(
            fast_config(),
            Arc::new(MemoryStore::new()),
            Some(40.0),
            connector.clone(),
        );
        let shutdown = CancellationToken::new();
        let task = {
            let session = session.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { session.run(shutdown).await })
        };

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while connector.attempts.load(Ordering::SeqCst) < 2 {
            assert!(tokio::time::Instant::now() < deadline, "no reconnect");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn missing_endpoint_keeps_retrying_without_dialing() {
        let (connector, _sent) = MockConnector::new(0);
        let store = Arc::new(MemoryStore::new());
        store.set(StoreKey::Environment, "prod").unwrap();
        let session = session(fast_config(), store, Some(40.0), connector.clone());

        let err = session
            .communicate(1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::NoEndpoint(_)));

        let shutdown = CancellationToken::new();
        let task = {
            let session = session.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { session.run(shutdown).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreadable_sensor_reports_zero() {
        let (connector, _sent) = MockConnector::new(0);
        let session = session(
            fast_config(),
            Arc::new(MemoryStore::new()),
            None,
            connector,
        );
        let sample = session.sample().await;
        assert_eq!(sample.temperature, 0.0);
        assert_eq!(sample.identifier, "");
    }
}
