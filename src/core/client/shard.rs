// src/core/client/shard.rs

use crate::core::KeyscopeError;
use crate::core::protocol::{Cmd, RespFrame};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// One independently addressable node of a store: the single server in
/// standalone mode, or one primary in cluster mode.
///
/// Implementations must be safe to share between concurrent shard workers.
#[async_trait]
pub trait Shard: Send + Sync + fmt::Debug {
    /// The `host:port` identifying this shard. Cursor state is keyed by it.
    fn addr(&self) -> &str;

    /// Sends every command in one round trip and returns one reply per
    /// command, in request order. Error replies for individual commands are
    /// returned as `RespFrame::Error`; only a failure of the round trip itself
    /// is returned as `Err`.
    async fn pipeline(&self, cmds: Vec<Cmd>) -> Result<Vec<RespFrame>, KeyscopeError>;

    /// Sends one command and returns its reply, with error replies mapped to
    /// `KeyscopeError::Server`.
    async fn query(&self, cmd: Cmd) -> Result<RespFrame, KeyscopeError> {
        let name = cmd.name();
        self.pipeline(vec![cmd])
            .await?
            .pop()
            .ok_or_else(|| KeyscopeError::Transport(format!("no reply to {name}")))?
            .into_result()
    }

    /// Releases the underlying resources. Later calls fail with `Closed`.
    async fn close(&self) -> Result<(), KeyscopeError>;
}

pub type ShardRef = Arc<dyn Shard>;
