// src/core/scan/session.rs

use super::cursor::CursorRegistry;
use crate::core::client::glob::has_wildcard;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How a session looks keys up, decided by its pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// The pattern is a literal key name: one lookup, no cursor.
    Exact,
    /// The pattern contains `*`: paginated `SCAN` on every shard.
    Enumerate,
}

/// The background task of a round and the token that stops it.
#[derive(Debug)]
pub(crate) struct RoundHandle {
    pub(crate) cancel: CancellationToken,
    pub(crate) task: JoinHandle<()>,
}

/// A resumable, pattern-scoped enumeration.
///
/// Each call to [`ScanDriver::run_async`](super::ScanDriver::run_async) runs
/// one round and continues where the previous round stopped. Discard the
/// session (and create a new one) when the pattern changes.
#[derive(Debug)]
pub struct ScanSession {
    pattern: String,
    page_size: usize,
    registry: Arc<CursorRegistry>,
    active_rounds: Arc<AtomicUsize>,
    current: Mutex<Option<RoundHandle>>,
}

impl ScanSession {
    /// Creates a session. `page_size` is a per-shard hint and is raised to 1
    /// if zero.
    pub fn new(pattern: impl Into<String>, page_size: usize) -> Self {
        let pattern = pattern.into();
        let page_size = page_size.max(1);
        debug!("new scan session: pattern={:?} page_size={}", pattern, page_size);
        Self {
            pattern,
            page_size,
            registry: Arc::new(CursorRegistry::new()),
            active_rounds: Arc::new(AtomicUsize::new(0)),
            current: Mutex::new(None),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn mode(&self) -> ScanMode {
        if has_wildcard(&self.pattern) {
            ScanMode::Enumerate
        } else {
            ScanMode::Exact
        }
    }

    /// True while any round of this session is outstanding.
    pub fn is_scanning(&self) -> bool {
        self.active_rounds.load(Ordering::Acquire) > 0
    }

    /// Whether another round may find more keys. Always true when
    /// enumerating: the engine does not track global end of keyspace, so
    /// whether to ask again is the caller's call.
    pub fn has_more(&self) -> bool {
        self.mode() == ScanMode::Enumerate
    }

    /// Number of distinct keys this session has emitted so far.
    pub fn discovered(&self) -> usize {
        self.registry.emitted_count()
    }

    pub fn cursors(&self) -> &CursorRegistry {
        &self.registry
    }

    pub(crate) fn registry(&self) -> Arc<CursorRegistry> {
        self.registry.clone()
    }

    pub(crate) fn active_rounds(&self) -> Arc<AtomicUsize> {
        self.active_rounds.clone()
    }

    /// Locks the slot holding the outstanding round, so replacing it is atomic.
    pub(crate) fn current_round(&self) -> parking_lot::MutexGuard<'_, Option<RoundHandle>> {
        self.current.lock()
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if let Some(round) = self.current.get_mut().take() {
            round.cancel.cancel();
        }
    }
}
