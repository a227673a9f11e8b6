// src/core/client/node.rs

//! A pipelining RESP client for a single node.

use super::shard::Shard;
use super::stream::ClientStream;
use super::uri::ConnectionInfo;
use crate::core::KeyscopeError;
use crate::core::protocol::{Cmd, RespFrame, RespFrameCodec};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Network timeouts applied to every node connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
        }
    }
}

type FramedConn = Framed<ClientStream, RespFrameCodec>;

/// A client for one node. Requests from concurrent callers are serialized on
/// the single underlying connection, so replies are never interleaved.
///
/// After a transport failure the connection is dropped and re-established
/// (including `AUTH` and `SELECT`) on the next request.
pub struct NodeClient {
    info: ConnectionInfo,
    addr: String,
    options: ClientOptions,
    conn: Mutex<Option<FramedConn>>,
    closed: AtomicBool,
}

impl fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeClient")
            .field("addr", &self.addr)
            .field("tls", &self.info.tls)
            .field("db", &self.info.db)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl NodeClient {
    /// Connects to the node and performs the handshake eagerly, so a bad
    /// address or bad credentials surface at construction time.
    pub async fn connect(
        info: ConnectionInfo,
        options: ClientOptions,
    ) -> Result<Self, KeyscopeError> {
        let client = Self {
            addr: info.addr(),
            info,
            options,
            conn: Mutex::new(None),
            closed: AtomicBool::new(false),
        };
        {
            let mut guard = client.conn.lock().await;
            *guard = Some(client.establish().await?);
        }
        info!("connected to {}", client.addr);
        Ok(client)
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    async fn establish(&self) -> Result<FramedConn, KeyscopeError> {
        let stream = ClientStream::connect(&self.info, self.options.connect_timeout).await?;
        let mut framed = Framed::new(stream, RespFrameCodec);

        let mut handshake = Vec::new();
        if let Some(password) = &self.info.password {
            let mut auth = Cmd::new("AUTH");
            if let Some(user) = &self.info.username {
                auth = auth.arg(user.clone());
            }
            handshake.push(auth.arg(password.clone()));
        }
        if self.info.db != 0 {
            handshake.push(Cmd::new("SELECT").int_arg(self.info.db));
        }
        if !handshake.is_empty() {
            debug!("running {} handshake command(s) on {}", handshake.len(), self.addr);
            for reply in self.round_trip(&mut framed, handshake).await? {
                reply.into_result()?;
            }
        }
        Ok(framed)
    }

    /// Writes all commands with a single flush, then reads exactly one reply
    /// per command.
    async fn round_trip(
        &self,
        framed: &mut FramedConn,
        cmds: Vec<Cmd>,
    ) -> Result<Vec<RespFrame>, KeyscopeError> {
        let expected = cmds.len();
        let write = async {
            for cmd in cmds {
                framed.feed(RespFrame::from(cmd)).await?;
            }
            framed.flush().await
        };
        tokio::time::timeout(self.options.write_timeout, write)
            .await
            .map_err(|_| KeyscopeError::Timeout("write"))??;

        let mut replies = Vec::with_capacity(expected);
        while replies.len() < expected {
            match tokio::time::timeout(self.options.read_timeout, framed.next()).await {
                Ok(Some(frame)) => replies.push(frame?),
                Ok(None) => {
                    return Err(KeyscopeError::Transport(format!(
                        "connection to {} closed by peer",
                        self.addr
                    )));
                }
                Err(_) => return Err(KeyscopeError::Timeout("read")),
            }
        }
        Ok(replies)
    }
}

#[async_trait]
impl Shard for NodeClient {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn pipeline(&self, cmds: Vec<Cmd>) -> Result<Vec<RespFrame>, KeyscopeError> {
        if cmds.is_empty() {
            return Ok(Vec::new());
        }
        let mut guard = self.conn.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(KeyscopeError::Closed);
        }
        // Taken out for the whole request: if this future is dropped before the
        // replies are read, the half-used connection is dropped with it.
        let mut framed = match guard.take() {
            Some(framed) => framed,
            None => {
                debug!("reconnecting to {}", self.addr);
                self.establish().await?
            }
        };

        match self.round_trip(&mut framed, cmds).await {
            Ok(replies) => {
                *guard = Some(framed);
                Ok(replies)
            }
            Err(e) => {
                warn!("dropping connection to {} after error: {}", self.addr, e);
                Err(e)
            }
        }
    }

    async fn close(&self) -> Result<(), KeyscopeError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut guard = self.conn.lock().await;
        if let Some(mut framed) = guard.take() {
            framed.close().await?;
        }
        debug!("closed connection to {}", self.addr);
        Ok(())
    }
}
