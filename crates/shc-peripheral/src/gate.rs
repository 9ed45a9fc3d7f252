use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Single-byte "start" command (`'y'`).
pub const START_SENTINEL: u8 = 0x79;

/// True if `value` is exactly one `y` / `Y` byte.
pub fn is_start_command(value: &[u8]) -> bool {
    matches!(value, [b] if b.eq_ignore_ascii_case(&START_SENTINEL))
}

/// Per-channel request flag.
///
/// Written by the inbound trigger path, consumed by the channel's producer
/// loops. A producer takes a grant with [`RequestGate::claim`], runs one
/// cycle, and drops the claim, which clears the flag whatever the outcome.
/// Only one claim can be live at a time, so concurrent producers on the
/// same channel never run a second cycle for one grant.
/// Setting the gate also wakes a producer parked in [`RequestGate::wait`].
#[derive(Debug, Default)]
pub struct RequestGate {
    requested: AtomicBool,
    in_cycle: AtomicBool,
    wakeup: Notify,
}

/// Exclusive ownership of one granted cycle.
///
/// Dropping the claim clears the request and frees the gate for the next
/// grant.
#[derive(Debug)]
#[must_use = "dropping the claim ends the cycle"]
pub struct GateClaim<'a> {
    gate: &'a RequestGate,
}

impl Drop for GateClaim<'_> {
    fn drop(&mut self) {
        self.gate.requested.store(false, Ordering::SeqCst);
        self.gate.in_cycle.store(false, Ordering::SeqCst);
    }
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_requested(&self, requested: bool) {
        self.requested.store(requested, Ordering::SeqCst);
        if requested {
            self.wakeup.notify_one();
        }
    }

    /// Apply an inbound trigger write and return the resulting flag.
    ///
    /// Anything other than the start sentinel, including an empty write,
    /// cancels a pending request.
    pub fn apply_command(&self, value: &[u8]) -> bool {
        let requested = is_start_command(value);
        self.set_requested(requested);
        requested
    }

    /// Read the flag without clearing it.
    pub fn try_consume(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }

    /// True while a claimed cycle is running.
    pub fn is_busy(&self) -> bool {
        self.in_cycle.load(Ordering::SeqCst)
    }

    /// Take the pending grant, if any and if no other cycle holds it.
    pub fn claim(&self) -> Option<GateClaim<'_>> {
        if !self.try_consume() {
            return None;
        }
        self.in_cycle
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        let claim = GateClaim { gate: self };
        // A cancel may have landed between the two loads.
        if !self.try_consume() {
            return None;
        }
        Some(claim)
    }

    fn is_claimable(&self) -> bool {
        self.try_consume() && !self.is_busy()
    }

    /// Wait until a grant is claimable or `timeout` elapses, then report
    /// whether one is.
    pub async fn wait(&self, timeout: Duration) -> bool {
        if self.is_claimable() {
            return true;
        }
        let _ = tokio::time::timeout(timeout, self.wakeup.notified()).await;
        self.is_claimable()
    }
}
