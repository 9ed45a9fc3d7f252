use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shc_frame::{split, FrameError, DEFAULT_FRAME_SIZE};

use crate::collect::{Collected, PayloadCollector};
use crate::error::{PeripheralError, Result};
use crate::gate::RequestGate;
use crate::notifier::Notifier;

/// What a channel does when its collector returns zero items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyResultPolicy {
    /// End the cycle without sending anything.
    #[default]
    Abort,
    /// Same as `Abort`, logged at warn level.
    Warn,
    /// Stream the empty record like any other.
    Stream,
}

impl EmptyResultPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            EmptyResultPolicy::Abort => "abort",
            EmptyResultPolicy::Warn => "warn",
            EmptyResultPolicy::Stream => "stream",
        }
    }
}

impl FromStr for EmptyResultPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "abort" => Ok(EmptyResultPolicy::Abort),
            "warn" => Ok(EmptyResultPolicy::Warn),
            "stream" => Ok(EmptyResultPolicy::Stream),
            other => Err(format!("unknown empty-result policy '{other}'")),
        }
    }
}

/// Per-channel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Maximum notification size in bytes.
    pub frame_size: usize,
    /// Fallback wakeup interval while the gate is idle.
    pub poll_interval: Duration,
    /// Upper bound on one collector call.
    pub collect_timeout: Duration,
    pub empty_policy: EmptyResultPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            poll_interval: Duration::from_secs(1),
            collect_timeout: Duration::from_secs(30),
            empty_policy: EmptyResultPolicy::Abort,
        }
    }
}

impl ChannelConfig {
    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size;
        self
    }
}

/// Observable producer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Collecting,
    Streaming,
    Done,
}

/// Result of one [`StreamingCharacteristic::poll_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The gate was not set; nothing ran.
    Idle,
    /// The payload was streamed in full.
    Sent {
        items: usize,
        frames: usize,
        bytes: usize,
    },
    /// The collector returned nothing and the policy suppressed the transfer.
    Empty,
    /// The collector failed or timed out.
    Failed,
    /// The subscriber went away mid-transfer.
    SinkClosed,
}

/// One request-gated streaming channel.
///
/// Owns the channel's [`RequestGate`] and collector. Each granted request
/// runs exactly one collect-and-stream cycle; the gate is cleared when the
/// cycle ends, whatever its outcome.
pub struct StreamingCharacteristic {
    name: String,
    config: ChannelConfig,
    gate: Arc<RequestGate>,
    collector: Arc<dyn PayloadCollector>,
    state: watch::Sender<StreamState>,
}

impl StreamingCharacteristic {
    /// Create a channel. Fails if the frame size is zero.
    pub fn new(
        name: impl Into<String>,
        collector: Arc<dyn PayloadCollector>,
        config: ChannelConfig,
    ) -> Result<Self> {
        if config.frame_size == 0 {
            return Err(FrameError::InvalidFrameSize(0).into());
        }
        let (state, _) = watch::channel(StreamState::Idle);
        Ok(Self {
            name: name.into(),
            config,
            gate: Arc::new(RequestGate::new()),
            collector,
            state,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn gate(&self) -> &Arc<RequestGate> {
        &self.gate
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: StreamState) {
        self.state.send_replace(state);
    }

    /// Run one cycle if the gate is set and no other subscription is
    /// already serving the grant.
    ///
    /// The payload of a cycle goes to the subscription that claimed it;
    /// other subscriptions on the same channel see nothing for that grant.
    pub async fn poll_once(&self, notifier: &dyn Notifier) -> CycleOutcome {
        let Some(claim) = self.gate.claim() else {
            return CycleOutcome::Idle;
        };

        let outcome = self.cycle(notifier).await;
        drop(claim);
        self.set_state(StreamState::Done);
        outcome
    }

    async fn cycle(&self, notifier: &dyn Notifier) -> CycleOutcome {
        self.set_state(StreamState::Collecting);
        let collected = match self.collect().await {
            Ok(collected) => collected,
            Err(err) => {
                warn!(channel = %self.name, error = %err, "collection failed; cycle aborted");
                return CycleOutcome::Failed;
            }
        };

        if collected.is_empty() {
            match self.config.empty_policy {
                EmptyResultPolicy::Abort => {
                    debug!(channel = %self.name, "collector returned no items; nothing sent");
                    return CycleOutcome::Empty;
                }
                EmptyResultPolicy::Warn => {
                    warn!(channel = %self.name, "collector returned no items; nothing sent");
                    return CycleOutcome::Empty;
                }
                EmptyResultPolicy::Stream => {}
            }
        }

        self.set_state(StreamState::Streaming);
        self.stream(collected, notifier).await
    }

    async fn collect(&self) -> Result<Collected> {
        tokio::time::timeout(self.config.collect_timeout, self.collector.collect())
            .await
            .map_err(|_| PeripheralError::CollectTimeout(self.config.collect_timeout))?
    }

    async fn stream(&self, collected: Collected, notifier: &dyn Notifier) -> CycleOutcome {
        let bytes = collected.payload.len();
        let splitter = match split(collected.payload, self.config.frame_size) {
            Ok(splitter) => splitter,
            Err(err) => {
                warn!(channel = %self.name, error = %err, "cannot split payload");
                return CycleOutcome::Failed;
            }
        };

        let mut frames = 0;
        for frame in splitter {
            debug!(channel = %self.name, frame = frames, bytes = frame.len(), "notify");
            if notifier.notify(frame).await.is_err() {
                debug!(channel = %self.name, "subscriber gone mid-transfer");
                return CycleOutcome::SinkClosed;
            }
            frames += 1;
        }
        if notifier.end_of_stream().await.is_err() {
            return CycleOutcome::SinkClosed;
        }

        info!(
            channel = %self.name,
            items = collected.items,
            frames,
            bytes,
            "transfer complete"
        );
        CycleOutcome::Sent {
            items: collected.items,
            frames,
            bytes,
        }
    }

    /// Serve one subscription until it is cancelled or its sink closes.
    pub async fn run(&self, notifier: Arc<dyn Notifier>, cancel: CancellationToken) {
        debug!(channel = %self.name, "subscription started");
        loop {
            self.set_state(StreamState::Idle);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                granted = self.gate.wait(self.config.poll_interval) => {
                    if !granted {
                        continue;
                    }
                }
            }

            // Cancelling drops the in-flight cycle and its claim, which
            // clears the gate.
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.poll_once(notifier.as_ref()) => outcome,
            };
            if outcome == CycleOutcome::SinkClosed {
                break;
            }
        }
        self.set_state(StreamState::Idle);
        debug!(channel = %self.name, "subscription ended");
    }
}
