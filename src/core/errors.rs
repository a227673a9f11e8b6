// src/core/errors.rs

//! Defines the primary error type for the entire library.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing every failure the scan engine can report.
///
/// Construction-time failures (`InvalidUri`, `InvalidClusterTopology`) are
/// returned to the caller directly. Failures during a scan round are turned
/// into a sentinel entry by the driver instead of being propagated.
#[derive(Error, Debug)]
pub enum KeyscopeError {
    #[error("invalid URI: {0}")]
    InvalidUri(String),

    #[error("invalid cluster topology: {0}")]
    InvalidClusterTopology(String),

    #[error("key not found")]
    KeyNotFound,

    #[error("transport error: {0}")]
    Transport(String),

    /// An error reply sent by the store itself (e.g. `WRONGTYPE ...`).
    #[error("{0}")]
    Server(String),

    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: String },

    #[error("unsupported data type '{0}'")]
    UnsupportedType(String),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("incomplete data in stream")]
    IncompleteData,

    #[error("protocol syntax error")]
    SyntaxError,

    #[error("connection closed")]
    Closed,

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("TLS error: {0}")]
    Tls(String),
}

impl KeyscopeError {
    /// Returns true for failures that mean the store could not be reached or
    /// spoke garbage, as opposed to a well-formed error reply.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            KeyscopeError::Transport(_)
                | KeyscopeError::Io(_)
                | KeyscopeError::IncompleteData
                | KeyscopeError::SyntaxError
                | KeyscopeError::Closed
                | KeyscopeError::Timeout(_)
                | KeyscopeError::Tls(_)
        )
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for KeyscopeError {
    fn clone(&self) -> Self {
        match self {
            KeyscopeError::InvalidUri(s) => KeyscopeError::InvalidUri(s.clone()),
            KeyscopeError::InvalidClusterTopology(s) => {
                KeyscopeError::InvalidClusterTopology(s.clone())
            }
            KeyscopeError::KeyNotFound => KeyscopeError::KeyNotFound,
            KeyscopeError::Transport(s) => KeyscopeError::Transport(s.clone()),
            KeyscopeError::Server(s) => KeyscopeError::Server(s.clone()),
            KeyscopeError::UnexpectedReply { command, reply } => KeyscopeError::UnexpectedReply {
                command: command.clone(),
                reply: reply.clone(),
            },
            KeyscopeError::UnsupportedType(s) => KeyscopeError::UnsupportedType(s.clone()),
            KeyscopeError::Io(e) => KeyscopeError::Io(Arc::clone(e)),
            KeyscopeError::IncompleteData => KeyscopeError::IncompleteData,
            KeyscopeError::SyntaxError => KeyscopeError::SyntaxError,
            KeyscopeError::Closed => KeyscopeError::Closed,
            KeyscopeError::Timeout(op) => KeyscopeError::Timeout(op),
            KeyscopeError::Tls(s) => KeyscopeError::Tls(s.clone()),
        }
    }
}

impl From<std::io::Error> for KeyscopeError {
    fn from(e: std::io::Error) -> Self {
        KeyscopeError::Io(Arc::new(e))
    }
}

impl From<url::ParseError> for KeyscopeError {
    fn from(e: url::ParseError) -> Self {
        KeyscopeError::InvalidUri(e.to_string())
    }
}

impl From<tokio::task::JoinError> for KeyscopeError {
    fn from(e: tokio::task::JoinError) -> Self {
        KeyscopeError::Transport(format!("shard worker failed: {e}"))
    }
}
