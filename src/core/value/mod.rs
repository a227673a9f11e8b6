// src/core/value/mod.rs

//! Reading a key's value and rendering it for display.

pub mod render;

use crate::connection::Connection;
use crate::core::KeyscopeError;
use crate::core::protocol::{Cmd, RespFrame};
use crate::core::scan::{KeyEntry, KeyType};
use tracing::debug;

/// Reads the value of `entry` from the shard that owns it and renders it as
/// markdown. Error entries render their own message.
pub async fn fetch_value(conn: &Connection, entry: &KeyEntry) -> Result<String, KeyscopeError> {
    let key = entry.key.clone();
    let command = match &entry.key_type {
        KeyType::Error => return Ok(entry.name.clone()),
        KeyType::Other(tag) => return Ok(render::render_unknown(tag)),
        KeyType::String => Cmd::new("GET").arg(key),
        KeyType::List => Cmd::new("LRANGE").arg(key).int_arg(0).int_arg(-1),
        KeyType::Set => Cmd::new("SMEMBERS").arg(key),
        KeyType::SortedSet => Cmd::new("ZRANGE")
            .arg(key)
            .int_arg(0)
            .int_arg(-1)
            .arg("WITHSCORES"),
        KeyType::Hash => Cmd::new("HGETALL").arg(key),
    };
    debug!("fetching {} value of {:?}", entry.key_type, entry.name);

    let shard = conn.shard_for_key(&entry.key)?;
    let reply = shard.query(command).await?;

    match &entry.key_type {
        KeyType::String => match reply {
            RespFrame::Null => Err(KeyscopeError::KeyNotFound),
            frame => Ok(render::render_string(&text(&frame, "GET")?)),
        },
        KeyType::List => Ok(render::render_list(&texts(reply, "LRANGE")?)),
        KeyType::Set => Ok(render::render_set(&texts(reply, "SMEMBERS")?)),
        KeyType::SortedSet => {
            let flat = texts(reply, "ZRANGE")?;
            let mut members = Vec::with_capacity(flat.len() / 2);
            for pair in flat.chunks(2) {
                let [member, score] = pair else {
                    return Err(unexpected("ZRANGE", "odd number of elements"));
                };
                let score = score
                    .parse::<f64>()
                    .map_err(|_| unexpected("ZRANGE", &format!("invalid score '{score}'")))?;
                members.push((score, member.clone()));
            }
            Ok(render::render_zset(&members))
        }
        KeyType::Hash => {
            let flat = texts(reply, "HGETALL")?;
            let mut fields = Vec::with_capacity(flat.len() / 2);
            for pair in flat.chunks(2) {
                let [field, value] = pair else {
                    return Err(unexpected("HGETALL", "odd number of elements"));
                };
                fields.push((field.clone(), value.clone()));
            }
            Ok(render::render_hash(&fields))
        }
        KeyType::Error | KeyType::Other(_) => Err(KeyscopeError::UnsupportedType(
            entry.key_type.to_string(),
        )),
    }
}

fn unexpected(command: &str, reply: &str) -> KeyscopeError {
    KeyscopeError::UnexpectedReply {
        command: command.to_string(),
        reply: reply.to_string(),
    }
}

fn text(frame: &RespFrame, command: &str) -> Result<String, KeyscopeError> {
    frame
        .as_text()
        .ok_or_else(|| unexpected(command, &format!("{frame:?}")))
}

fn texts(reply: RespFrame, command: &str) -> Result<Vec<String>, KeyscopeError> {
    match reply {
        RespFrame::Array(items) => items.iter().map(|f| text(f, command)).collect(),
        RespFrame::NullArray => Ok(Vec::new()),
        other => Err(unexpected(command, &format!("{other:?}"))),
    }
}
