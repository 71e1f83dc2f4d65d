//! Bounded LIFO admission gate.
//!
//! A [`Gate`] admits up to `max_concurrency` callers at once. Callers beyond
//! that wait on a stack of at most `max_stack_size` entries; when a slot frees
//! it goes to the *most recently* arrived waiter. Under sustained overload the
//! oldest waiters time out while fresh requests keep flowing, which bounds the
//! latency of the traffic as a whole instead of guaranteeing per-request
//! fairness.
//!
//! ```text
//!            acquire()
//!               │
//!   active < max? ──yes──► admitted
//!               │no
//!   stack full? ──yes──► QueueFull
//!               │no
//!   push on top, wait ──► handed a slot  ─► admitted
//!                     ├─► timeout        ─► Timeout
//!                     └─► close()        ─► Closed
//! ```
//!
//! A slot freed by [`GatePermit::release`] is handed directly to the waiter
//! popped from the stack, so the active count never dips below the number of
//! callers that believe they hold a slot.

use crate::config::GateConfig;
use crate::error::{AdmissionError, AdmissionResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

type Handoff = oneshot::Sender<AdmissionResult<()>>;

struct Waiter {
    id: u64,
    handoff: Handoff,
}

#[derive(Default)]
struct GateState {
    active: usize,
    /// Top of the stack is the end of the vec.
    waiters: Vec<Waiter>,
    closed: bool,
    next_waiter_id: u64,
}

/// Point-in-time view of a gate, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStats {
    pub config: GateConfig,
    /// Callers currently holding a slot.
    pub active: usize,
    /// Callers waiting on the stack.
    pub waiting: usize,
    pub closed: bool,
}

/// Bounded LIFO admission controller bound to one immutable [`GateConfig`].
pub struct Gate {
    config: GateConfig,
    state: Mutex<GateState>,
}

impl Gate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            state: Mutex::new(GateState::default()),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn stats(&self) -> GateStats {
        let state = self.state.lock();
        GateStats {
            config: self.config,
            active: state.active,
            waiting: state.waiters.len(),
            closed: state.closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Wait for a slot.
    ///
    /// Fails immediately with [`AdmissionError::QueueFull`] when the stack is
    /// full and with [`AdmissionError::Closed`] when the gate is closed.
    /// Otherwise waits up to the configured timeout. The returned permit frees
    /// its slot on [`release`](GatePermit::release) or drop.
    pub async fn acquire(self: &Arc<Self>) -> AdmissionResult<GatePermit> {
        let mut waiting = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(AdmissionError::Closed);
            }
            if state.active < self.config.max_concurrency() {
                state.active += 1;
                return Ok(GatePermit::new(Arc::clone(self)));
            }
            if state.waiters.len() >= self.config.max_stack_size() {
                warn!(
                    active = state.active,
                    waiting = state.waiters.len(),
                    "admission rejected: stack full"
                );
                return Err(AdmissionError::QueueFull);
            }

            self.park(&mut state)
        };

        let outcome = tokio::time::timeout(self.config.timeout(), &mut waiting.rx).await;
        let result = match outcome {
            Ok(Ok(handed)) => handed,
            // Senders are never dropped unsent while the receiver is alive.
            Ok(Err(_)) => Err(AdmissionError::Closed),
            Err(_elapsed) => waiting.expire(),
        };
        waiting.done = true;
        result.map(|()| GatePermit::new(Arc::clone(self)))
    }

    /// Push a new waiter on top of the stack.
    fn park(self: &Arc<Self>, state: &mut GateState) -> PendingWaiter {
        let id = state.next_waiter_id;
        state.next_waiter_id += 1;
        let (handoff, rx) = oneshot::channel();
        state.waiters.push(Waiter { id, handoff });
        PendingWaiter {
            gate: Arc::clone(self),
            id,
            rx,
            done: false,
        }
    }

    /// Close the gate.
    ///
    /// Every waiter fails with [`AdmissionError::Closed`], as does every later
    /// `acquire`. Callers already admitted keep their slot. Closing twice is a
    /// no-op.
    pub fn close(&self) {
        let waiters = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.waiters)
        };

        debug!(
            dropped_waiters = waiters.len(),
            config = ?self.config,
            "admission gate closed"
        );
        for waiter in waiters {
            let _ = waiter.handoff.send(Err(AdmissionError::Closed));
        }
    }

    /// Give a slot back: hand it to the newest live waiter, or free it.
    fn release_slot(&self) {
        let mut state = self.state.lock();
        Self::release_locked(&mut state);
    }

    fn release_locked(state: &mut GateState) {
        while let Some(waiter) = state.waiters.pop() {
            if waiter.handoff.send(Ok(())).is_ok() {
                return;
            }
        }
        state.active = state.active.saturating_sub(1);
    }

    /// Remove a waiter that gave up. Returns `false` if it was already popped.
    fn remove_waiter(state: &mut GateState, id: u64) -> bool {
        match state.waiters.iter().rposition(|w| w.id == id) {
            Some(pos) => {
                state.waiters.remove(pos);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("Gate")
            .field("config", &self.config)
            .field("active", &stats.active)
            .field("waiting", &stats.waiting)
            .field("closed", &stats.closed)
            .finish()
    }
}

/// A caller parked on the stack.
///
/// Dropping it before the wait finished (the request future was cancelled)
/// takes it off the stack, or returns the slot if one was handed over in the
/// meantime.
struct PendingWaiter {
    gate: Arc<Gate>,
    id: u64,
    rx: oneshot::Receiver<AdmissionResult<()>>,
    done: bool,
}

impl PendingWaiter {
    /// Settle a wait whose timeout fired.
    fn expire(&mut self) -> AdmissionResult<()> {
        let mut state = self.gate.state.lock();
        if Gate::remove_waiter(&mut state, self.id) {
            debug!(timeout = ?self.gate.config.timeout(), "admission wait timed out");
            return Err(AdmissionError::Timeout);
        }
        // Already popped: a release sends under the lock, so a handed slot is
        // in the channel; an empty channel means close() took us.
        match self.rx.try_recv() {
            Ok(handed) => handed,
            Err(_) => Err(AdmissionError::Closed),
        }
    }
}

impl Drop for PendingWaiter {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut state = self.gate.state.lock();
        if Gate::remove_waiter(&mut state, self.id) {
            return;
        }
        if let Ok(Ok(())) = self.rx.try_recv() {
            Gate::release_locked(&mut state);
        }
    }
}

/// A held slot. Released once, on [`release`](Self::release) or drop.
#[must_use = "dropping the permit releases the slot immediately"]
pub struct GatePermit {
    gate: Option<Arc<Gate>>,
}

impl GatePermit {
    fn new(gate: Arc<Gate>) -> Self {
        Self { gate: Some(gate) }
    }

    /// Free the slot, admitting the newest waiter if there is one.
    ///
    /// Only the first call has any effect.
    pub fn release(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.release_slot();
        }
    }

    pub fn is_released(&self) -> bool {
        self.gate.is_none()
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for GatePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatePermit")
            .field("released", &self.is_released())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
