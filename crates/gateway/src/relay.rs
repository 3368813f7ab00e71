//! Thread-safe event relay
//!
//! The only path from the worker thread to the consumer. Producers push
//! envelopes into an unbounded FIFO; the consumer drains it on its own
//! scheduling turn, either synchronously (`drain`, e.g. from a UI timer) or
//! by awaiting `next` on a single-threaded runtime.
//!
//! Sending never blocks and never drops: rates are low (ticks, not depth),
//! so no backpressure is modeled.

use crate::error::TransportError;
use crate::messages::event::Event;
use chrono::{DateTime, Utc};
use log::trace;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Identity of one transport session. Bumped on every connect and every
/// teardown so events of a finished session can be recognised.
pub type SessionEpoch = u64;

/// Called after every enqueue so a UI loop can schedule a deferred drain.
/// Runs on the producing thread; it must only post a wake-up, never touch
/// consumer state.
pub type WakeHook = Arc<dyn Fn() + Send + Sync>;

/// Who produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The worker thread of the given session
    Session(SessionEpoch),
    /// The dispatcher, on the consumer thread
    Local,
}

/// An event plus where and when it entered the relay
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: Origin,
    pub received_at: DateTime<Utc>,
    pub event: Event,
}

/// Producer handle, cheap to clone and `Send`
#[derive(Clone)]
pub struct RelaySender {
    tx: mpsc::UnboundedSender<Envelope>,
    wake: Option<WakeHook>,
}

impl RelaySender {
    /// Enqueue an event produced by a session's worker thread
    pub fn publish(&self, epoch: SessionEpoch, event: Event) -> Result<(), TransportError> {
        self.push(Origin::Session(epoch), event)
    }

    /// Enqueue an event produced by the dispatcher itself
    pub fn publish_local(&self, event: Event) -> Result<(), TransportError> {
        self.push(Origin::Local, event)
    }

    fn push(&self, origin: Origin, event: Event) -> Result<(), TransportError> {
        trace!("Relay <- {:?} {}", origin, event.kind());
        self.tx
            .send(Envelope {
                origin,
                received_at: Utc::now(),
                event,
            })
            .map_err(|_| TransportError::RelayClosed)?;

        if let Some(wake) = &self.wake {
            wake();
        }
        Ok(())
    }
}

impl fmt::Debug for RelaySender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaySender")
            .field("wake_hook", &self.wake.is_some())
            .finish()
    }
}

/// Consumer side of the relay
pub struct EventRelay {
    rx: mpsc::UnboundedReceiver<Envelope>,
    // Keep a sender alive so the queue never reports closed
    tx: mpsc::UnboundedSender<Envelope>,
    wake: Option<WakeHook>,
}

impl EventRelay {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { rx, tx, wake: None }
    }

    /// Relay whose producers invoke `hook` after each enqueue
    pub fn with_wake_hook(hook: WakeHook) -> Self {
        Self {
            wake: Some(hook),
            ..Self::new()
        }
    }

    /// Get a producer handle
    pub fn sender(&self) -> RelaySender {
        RelaySender {
            tx: self.tx.clone(),
            wake: self.wake.clone(),
        }
    }

    /// Take the oldest envelope without waiting
    pub fn try_next(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    /// Take everything queued right now, oldest first
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut envelopes = Vec::with_capacity(self.rx.len());
        while let Ok(envelope) = self.rx.try_recv() {
            envelopes.push(envelope);
        }
        envelopes
    }

    /// Wait for the next envelope
    pub async fn next(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Number of envelopes waiting to be drained
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for EventRelay {
    fn default() -> Self {
        Self::new()
    }
}
