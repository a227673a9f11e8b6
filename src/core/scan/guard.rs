// src/core/scan/guard.rs

//! Defines `RoundGuard`, an RAII guard that owns a round's output channel.

use super::cursor::CursorRegistry;
use super::entry::KeyEntry;
use super::throttle::Throttle;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Holds the sending half of a round's stream and the session's count of
/// outstanding rounds.
///
/// Dropping the guard first decrements the count and then closes the stream,
/// so a consumer that sees end-of-stream never observes the session as still
/// scanning because of this round. This holds on every exit path of the round
/// task, including panics and cancellation.
pub(crate) struct RoundGuard {
    active_rounds: Arc<AtomicUsize>,
    registry: Arc<CursorRegistry>,
    tx: Option<mpsc::Sender<KeyEntry>>,
    emitted: usize,
}

impl RoundGuard {
    /// Wraps a round whose count was already incremented by the caller.
    pub(crate) fn new(
        active_rounds: Arc<AtomicUsize>,
        registry: Arc<CursorRegistry>,
        tx: mpsc::Sender<KeyEntry>,
    ) -> Self {
        Self {
            active_rounds,
            registry,
            tx: Some(tx),
            emitted: 0,
        }
    }

    /// Forwards one entry to the consumer, pausing first if a throttle is
    /// configured. Returns false if the round was cancelled or the consumer
    /// went away; the entry is then not recorded as emitted.
    pub(crate) async fn emit(
        &mut self,
        entry: KeyEntry,
        token: &CancellationToken,
        throttle: Option<&dyn Throttle>,
    ) -> bool {
        if let Some(delay) = throttle.and_then(|t| t.delay()) {
            tokio::select! {
                biased;
                _ = token.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => false,
            res = tx.send(entry.clone()) => res.is_ok(),
        };
        if sent {
            if !entry.is_error() {
                self.registry.mark_emitted(&entry.key);
            }
            self.emitted += 1;
        }
        sent
    }

    /// Number of entries delivered so far.
    pub(crate) fn emitted(&self) -> usize {
        self.emitted
    }
}

impl Drop for RoundGuard {
    fn drop(&mut self) {
        self.active_rounds.fetch_sub(1, Ordering::AcqRel);
        debug!("scan round finished after {} entries", self.emitted);
        // Closing the channel must come after the decrement.
        self.tx.take();
    }
}
