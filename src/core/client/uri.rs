// src/core/client/uri.rs

//! Parsing of `redis://` and `rediss://` connection URIs.

use crate::core::KeyscopeError;
use url::{Host, Url};

pub const DEFAULT_PORT: u16 = 6379;

/// Everything needed to reach and authenticate against one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: i64,
}

impl ConnectionInfo {
    /// Parses a connection URI of the form `redis[s]://[[user]:password@]host[:port][/db]`.
    ///
    /// The redis-cli form `redis://password@host` is accepted as well: a lone
    /// userinfo value is taken to be the password.
    pub fn parse(uri: &str) -> Result<Self, KeyscopeError> {
        let url = Url::parse(&normalize_uri(uri)?)?;

        let tls = match url.scheme() {
            "redis" => false,
            "rediss" => true,
            other => {
                return Err(KeyscopeError::InvalidUri(format!(
                    "unsupported scheme '{other}', expected redis:// or rediss://"
                )));
            }
        };

        let host = match url.host() {
            Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            _ => return Err(KeyscopeError::InvalidUri(format!("missing host in '{uri}'"))),
        };

        let username = Some(decode(url.username())?).filter(|u| !u.is_empty());
        let password = url.password().map(decode).transpose()?;

        let db = match url.path().trim_start_matches('/') {
            "" => 0,
            path => path.parse::<i64>().map_err(|_| {
                KeyscopeError::InvalidUri(format!("invalid database index '{path}'"))
            })?,
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            tls,
            username,
            password,
            db,
        })
    }

    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// The same credentials and TLS setting pointed at another node, as used
    /// for the primaries discovered in cluster mode.
    pub fn for_node(&self, host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            db: 0,
            ..self.clone()
        }
    }
}

/// Rewrites redis-cli style URIs into standard ones.
///
/// `redis://secret@host` becomes `redis://:secret@host`. URIs that already
/// carry a password are returned unchanged.
pub fn normalize_uri(uri: &str) -> Result<String, KeyscopeError> {
    let mut url = Url::parse(uri)?;
    if !url.username().is_empty() && url.password().is_none() {
        let password = url.username().to_string();
        url.set_username("")
            .and_then(|_| url.set_password(Some(&password)))
            .map_err(|_| KeyscopeError::InvalidUri(format!("cannot rewrite userinfo in '{uri}'")))?;
    }
    Ok(url.to_string())
}

fn decode(raw: &str) -> Result<String, KeyscopeError> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| KeyscopeError::InvalidUri(e.to_string()))
}
