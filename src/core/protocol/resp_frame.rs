// src/core/protocol/resp_frame.rs

//! Implements the RESP (REdis Serialization Protocol) frame structure and the
//! corresponding `Encoder` and `Decoder` used by the client transport.

use crate::core::KeyscopeError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// The CRLF (Carriage Return, Line Feed) sequence used to terminate lines in RESP.
const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

// Limits applied to replies so a misbehaving server cannot exhaust memory or stack.
const MAX_FRAME_ELEMENTS: usize = 16 * 1024 * 1024;
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024;
const MAX_RECURSION_DEPTH: usize = 128;

/// A single frame in the RESP protocol, as sent to or received from a store.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// Returns the textual content of a simple or bulk string reply.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RespFrame::SimpleString(s) => Some(s.clone()),
            RespFrame::BulkString(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    /// Interprets the reply as an integer. Bulk strings holding digits are
    /// accepted too, since `SCAN` returns its cursor that way.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespFrame::Integer(i) => Some(*i),
            RespFrame::BulkString(b) => std::str::from_utf8(b).ok()?.parse().ok(),
            RespFrame::SimpleString(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespFrame::Null | RespFrame::NullArray)
    }

    /// Converts an error reply into `Err`, passing every other frame through.
    pub fn into_result(self) -> Result<RespFrame, KeyscopeError> {
        match self {
            RespFrame::Error(msg) => Err(KeyscopeError::Server(msg)),
            other => Ok(other),
        }
    }

    /// Encodes a frame into a `Vec<u8>`.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, KeyscopeError> {
        let mut buf = BytesMut::new();
        RespFrameCodec.encode(self.clone(), &mut buf)?;
        Ok(buf.to_vec())
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding `RespFrame`s.
#[derive(Debug, Default, Clone, Copy)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = KeyscopeError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            RespFrame::SimpleString(s) => {
                dst.extend_from_slice(b"+");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Error(s) => {
                dst.extend_from_slice(b"-");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Integer(i) => {
                dst.extend_from_slice(b":");
                dst.extend_from_slice(i.to_string().as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::BulkString(b) => {
                dst.extend_from_slice(b"$");
                dst.extend_from_slice(b.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                dst.extend_from_slice(&b);
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Null => dst.extend_from_slice(b"$-1\r\n"),
            RespFrame::NullArray => dst.extend_from_slice(b"*-1\r\n"),
            RespFrame::Array(arr) => {
                dst.extend_from_slice(b"*");
                dst.extend_from_slice(arr.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                for frame in arr {
                    self.encode(frame, dst)?;
                }
            }
        }
        Ok(())
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = KeyscopeError;

    /// Decodes one `RespFrame` from the buffer, or returns `Ok(None)` while the
    /// frame is still incomplete.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut bytes = &src[..];
        match decode_frame(&mut bytes, 0) {
            Ok(frame) => {
                let consumed = src.len() - bytes.len();
                src.advance(consumed);
                Ok(Some(frame))
            }
            Err(KeyscopeError::IncompleteData) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn decode_frame(bytes: &mut &[u8], depth: usize) -> Result<RespFrame, KeyscopeError> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(KeyscopeError::Transport(
            "RESP reply nested too deeply".to_string(),
        ));
    }
    let Some(&prefix) = bytes.first() else {
        return Err(KeyscopeError::IncompleteData);
    };
    *bytes = &bytes[1..];

    match prefix {
        b'+' => Ok(RespFrame::SimpleString(lossy(read_line(bytes)?))),
        b'-' => Ok(RespFrame::Error(lossy(read_line(bytes)?))),
        b':' => Ok(RespFrame::Integer(parse_number(read_line(bytes)?)?)),
        b'$' => {
            let len = parse_number(read_line(bytes)?)?;
            if len == -1 {
                return Ok(RespFrame::Null);
            }
            let len = usize::try_from(len).map_err(|_| KeyscopeError::SyntaxError)?;
            if len > MAX_BULK_STRING_SIZE {
                return Err(KeyscopeError::SyntaxError);
            }
            if bytes.len() < len + CRLF_LEN {
                return Err(KeyscopeError::IncompleteData);
            }
            if &bytes[len..len + CRLF_LEN] != CRLF {
                return Err(KeyscopeError::SyntaxError);
            }
            let data = Bytes::copy_from_slice(&bytes[..len]);
            *bytes = &bytes[len + CRLF_LEN..];
            Ok(RespFrame::BulkString(data))
        }
        b'*' => {
            let len = parse_number(read_line(bytes)?)?;
            if len == -1 {
                return Ok(RespFrame::NullArray);
            }
            let len = usize::try_from(len).map_err(|_| KeyscopeError::SyntaxError)?;
            if len > MAX_FRAME_ELEMENTS {
                return Err(KeyscopeError::SyntaxError);
            }
            let mut frames = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                frames.push(decode_frame(bytes, depth + 1)?);
            }
            Ok(RespFrame::Array(frames))
        }
        _ => Err(KeyscopeError::SyntaxError),
    }
}

/// Returns the next CRLF-terminated line and advances past it.
fn read_line<'a>(bytes: &mut &'a [u8]) -> Result<&'a [u8], KeyscopeError> {
    let pos = bytes
        .windows(CRLF_LEN)
        .position(|window| window == CRLF)
        .ok_or(KeyscopeError::IncompleteData)?;
    let line = &bytes[..pos];
    *bytes = &bytes[pos + CRLF_LEN..];
    Ok(line)
}

fn parse_number(line: &[u8]) -> Result<i64, KeyscopeError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(KeyscopeError::SyntaxError)
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}
