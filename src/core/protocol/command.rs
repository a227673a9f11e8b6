// src/core/protocol/command.rs

//! A small builder for the request frames the engine sends to a store.

use super::RespFrame;
use bytes::Bytes;

/// A request under construction: the command name followed by its arguments,
/// each sent as a bulk string.
#[derive(Debug, Clone, PartialEq)]
pub struct Cmd {
    args: Vec<Bytes>,
}

impl Cmd {
    pub fn new(name: &'static str) -> Self {
        Self {
            args: vec![Bytes::from_static(name.as_bytes())],
        }
    }

    pub fn arg(mut self, arg: impl Into<Bytes>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn int_arg(self, value: i64) -> Self {
        self.arg(value.to_string())
    }

    /// The command name as it will be sent, used for error messages.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.args[0]).into_owned()
    }

    pub fn scan(cursor: u64, pattern: &str, count: usize) -> Self {
        Cmd::new("SCAN")
            .arg(cursor.to_string())
            .arg("MATCH")
            .arg(pattern.to_string())
            .arg("COUNT")
            .arg(count.to_string())
    }

    pub fn pttl(key: impl Into<Bytes>) -> Self {
        Cmd::new("PTTL").arg(key)
    }

    pub fn key_type(key: impl Into<Bytes>) -> Self {
        Cmd::new("TYPE").arg(key)
    }

    pub fn memory_usage(key: impl Into<Bytes>) -> Self {
        Cmd::new("MEMORY").arg("USAGE").arg(key)
    }

    pub fn dbsize() -> Self {
        Cmd::new("DBSIZE")
    }
}

impl From<Cmd> for RespFrame {
    fn from(cmd: Cmd) -> Self {
        RespFrame::Array(cmd.args.into_iter().map(RespFrame::BulkString).collect())
    }
}
