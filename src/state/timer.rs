//! Single-slot cancellable timers
//!
//! A `TimerSlot` holds at most one pending timer. Arming always cancels the
//! previous one first, and each arming gets a fresh generation so a firing
//! that raced with a cancel can be recognized and dropped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// At most one pending timer, cancelled on re-arm and on drop
pub struct TimerSlot {
    /// Label for trace logs
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    /// Generation of the latest arming
    generation: u64,
}

impl TimerSlot {
    /// Create an empty slot
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: None,
            generation: 0,
        }
    }

    /// Arm the slot: after `after`, send `event(generation)` on `tx`.
    ///
    /// Returns the generation of the new timer.
    pub fn arm<E, F>(&mut self, after: Duration, tx: mpsc::UnboundedSender<E>, event: F) -> u64
    where
        E: Send + 'static,
        F: FnOnce(u64) -> E + Send + 'static,
    {
        self.disarm();
        self.generation += 1;
        let generation = self.generation;

        trace!(timer = self.name, generation, ?after, "timer armed");

        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(event(generation));
        }));

        generation
    }

    /// Cancel the pending timer, if any
    pub fn disarm(&mut self) {
        if let Some(handle) = self.handle.take() {
            trace!(timer = self.name, generation = self.generation, "timer disarmed");
            handle.abort();
        }
    }

    /// Consume a firing. Returns true only for the currently armed generation.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.handle.is_none() || generation != self.generation {
            return false;
        }
        self.handle = None;
        true
    }

    /// Whether a timer is pending
    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Send `event` on `tx` after `after`, without a way to cancel it
pub fn schedule<E: Send + 'static>(after: Duration, tx: mpsc::UnboundedSender<E>, event: E) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let _ = tx.send(event);
    });
}
