// src/core/scan/driver.rs

//! Runs scan rounds in the background and streams their entries to the caller.

use super::cursor::CursorRegistry;
use super::entry::KeyEntry;
use super::guard::RoundGuard;
use super::round::{Discovered, cancellable, exact_lookup, scan_shard};
use super::session::{RoundHandle, ScanMode, ScanSession};
use super::throttle::Throttle;
use crate::connection::Connection;
use crate::core::KeyscopeError;
use bytes::Bytes;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_BUFFER: usize = 256;

/// Starts rounds of a [`ScanSession`] against a [`Connection`].
#[derive(Debug, Clone)]
pub struct ScanDriver {
    conn: Connection,
    throttle: Option<Arc<dyn Throttle>>,
    buffer: usize,
}

impl ScanDriver {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            throttle: None,
            buffer: DEFAULT_BUFFER,
        }
    }

    /// Pauses before every emitted entry, as decided by `throttle`.
    pub fn with_throttle(mut self, throttle: Arc<dyn Throttle>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Capacity of each round's output stream.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Starts one round of `session` on a background task and returns the
    /// stream of its entries and a handle to cancel it.
    ///
    /// The session reports scanning as soon as this returns, and stops before
    /// the stream ends. If the session already has a round outstanding, that
    /// round is cancelled and the new one starts only after it has finished.
    /// Must be called from within a Tokio runtime.
    pub fn run_async(&self, session: &ScanSession) -> (ScanStream, ScanCancel) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let active_rounds = session.active_rounds();
        active_rounds.fetch_add(1, Ordering::AcqRel);
        let guard = RoundGuard::new(active_rounds, session.registry(), tx);

        let token = self.conn.shutdown_token().child_token();
        let round = Round {
            conn: self.conn.clone(),
            pattern: session.pattern().to_string(),
            page_size: session.page_size(),
            mode: session.mode(),
            registry: session.registry(),
            throttle: self.throttle.clone(),
            token: token.clone(),
        };

        let mut current = session.current_round();
        let previous = current.take();
        if let Some(previous) = &previous {
            debug!("superseding the outstanding round of {:?}", round.pattern);
            previous.cancel.cancel();
        }
        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.task.await;
            }
            round.run(guard).await;
        });
        *current = Some(RoundHandle {
            cancel: token.clone(),
            task,
        });

        (ScanStream::new(rx), ScanCancel { token })
    }
}

struct Round {
    conn: Connection,
    pattern: String,
    page_size: usize,
    mode: ScanMode,
    registry: Arc<CursorRegistry>,
    throttle: Option<Arc<dyn Throttle>>,
    token: CancellationToken,
}

impl Round {
    async fn run(self, mut guard: RoundGuard) {
        debug!("round started: pattern={:?} mode={:?}", self.pattern, self.mode);
        let outcome = match self.mode {
            ScanMode::Exact => self.exact(&mut guard).await,
            ScanMode::Enumerate => self.enumerate(&mut guard).await,
        };
        if let Err(e) = outcome {
            warn!("scan round for {:?} failed: {}", self.pattern, e);
            guard.emit(KeyEntry::error(&e), &self.token, None).await;
        }
    }

    async fn exact(&self, guard: &mut RoundGuard) -> Result<(), KeyscopeError> {
        let shard = self.conn.shard_for_key(&self.pattern)?;
        match cancellable(&self.token, exact_lookup(shard.as_ref(), &self.pattern)).await {
            None | Some(Ok(None)) | Some(Err(KeyscopeError::KeyNotFound)) => Ok(()),
            Some(Ok(Some(entry))) => {
                guard.emit(entry, &self.token, self.throttle.as_deref()).await;
                Ok(())
            }
            Some(Err(e)) => Err(e),
        }
    }

    /// Fans out one worker per shard and forwards their entries as they
    /// arrive. The first worker failure stops the others.
    async fn enumerate(&self, guard: &mut RoundGuard) -> Result<(), KeyscopeError> {
        let (merge_tx, mut merge_rx) = mpsc::unbounded_channel::<Discovered>();
        let worker_token = self.token.child_token();

        let mut workers = self.conn.spawn_per_shard(|shard| {
            let pattern = self.pattern.clone();
            let page_size = self.page_size;
            let registry = self.registry.clone();
            let token = worker_token.clone();
            let merge_tx = merge_tx.clone();
            async move {
                scan_shard(shard.as_ref(), &pattern, page_size, &registry, &token, &merge_tx).await
            }
        });
        drop(merge_tx);

        let mut failure = None;
        let mut unsent = Vec::new();
        let mut workers_done = false;
        let mut merge_closed = false;
        while !(workers_done && merge_closed) {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                joined = workers.join_next(), if !workers_done => match joined {
                    None => workers_done = true,
                    Some(joined) => {
                        if let Err(e) = joined.map_err(KeyscopeError::from).and_then(|r| r) {
                            failure = Some(e);
                            break;
                        }
                    }
                },
                item = merge_rx.recv(), if !merge_closed => match item {
                    None => merge_closed = true,
                    Some(discovered) => {
                        let sent = guard
                            .emit(discovered.entry.clone(), &self.token, self.throttle.as_deref())
                            .await;
                        if !sent {
                            unsent.push(discovered);
                            break;
                        }
                    }
                },
            }
        }

        worker_token.cancel();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                debug!("shard worker ended abnormally: {}", e);
            }
        }
        while let Ok(discovered) = merge_rx.try_recv() {
            unsent.push(discovered);
        }
        self.restore(unsent);

        debug!(
            "round for {:?} delivered {} entries",
            self.pattern,
            guard.emitted()
        );
        failure.map_or(Ok(()), Err)
    }

    /// Gives entries that were merged but never delivered back to their
    /// shards' pending queues.
    fn restore(&self, unsent: Vec<Discovered>) {
        if unsent.is_empty() {
            return;
        }
        let mut by_shard: HashMap<String, Vec<Bytes>> = HashMap::new();
        for discovered in unsent {
            by_shard
                .entry(discovered.shard)
                .or_default()
                .push(discovered.entry.key);
        }
        for (shard, names) in by_shard {
            self.registry.restore(&shard, names);
        }
    }
}

/// The entries of one round, in the order they were merged.
///
/// Ends when the round finishes, fails (after its single error entry), or is
/// cancelled.
#[derive(Debug)]
pub struct ScanStream {
    inner: ReceiverStream<KeyEntry>,
}

impl ScanStream {
    fn new(rx: mpsc::Receiver<KeyEntry>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Waits for the next entry; `None` once the round is over.
    pub async fn recv(&mut self) -> Option<KeyEntry> {
        self.inner.as_mut().recv().await
    }

    /// Returns the next entry if one is ready, without waiting.
    pub fn try_recv(&mut self) -> Result<KeyEntry, mpsc::error::TryRecvError> {
        self.inner.as_mut().try_recv()
    }
}

impl Stream for ScanStream {
    type Item = KeyEntry;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<KeyEntry>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Cancels one round. Cancelling a finished round does nothing.
#[derive(Debug, Clone)]
pub struct ScanCancel {
    token: CancellationToken,
}

impl ScanCancel {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
