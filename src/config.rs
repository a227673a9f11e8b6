// src/config.rs

//! Manages configuration: loading from a TOML file, command-line overrides,
//! and validation.

use crate::core::client::ClientOptions;
use crate::core::scan::{JitterDelay, Throttle};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Everything the `keyscope` binary can be configured with. Every field has a
/// default, so an empty file is a valid configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// `redis://` or `rediss://` URI of the store, or of a cluster seed node.
    #[serde(default = "default_uri")]
    pub uri: String,
    /// Discover and scan every primary of a cluster.
    #[serde(default)]
    pub cluster: bool,
    /// Keys requested from each shard per round.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// When set, logs go to this file instead of stderr.
    #[serde(default)]
    pub debug_log: Option<String>,

    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub read_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_write_timeout")]
    pub write_timeout: Duration,

    /// Pause before each emitted entry, for watching incremental delivery.
    #[serde(with = "humantime_serde", default)]
    pub debug_delay: Option<Duration>,
    /// Fraction of `debug_delay` applied as random jitter in either direction.
    #[serde(default = "default_debug_delay_jitter")]
    pub debug_delay_jitter: f64,
}

fn default_uri() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_page_size() -> usize {
    100
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_read_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_write_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_debug_delay_jitter() -> f64 {
    0.5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            cluster: false,
            page_size: default_page_size(),
            log_level: default_log_level(),
            debug_log: None,
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            write_timeout: default_write_timeout(),
            debug_delay: None,
            debug_delay_jitter: default_debug_delay_jitter(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.uri.trim().is_empty() {
            return Err(anyhow!("uri cannot be empty"));
        }
        if self.page_size == 0 {
            return Err(anyhow!("page_size cannot be 0"));
        }
        if !(0.0..=1.0).contains(&self.debug_delay_jitter) {
            return Err(anyhow!(
                "debug_delay_jitter must be between 0 and 1, got {}",
                self.debug_delay_jitter
            ));
        }
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
        ] {
            if value.is_zero() {
                return Err(anyhow!("{name} cannot be 0"));
            }
        }
        if self.page_size > 10_000 {
            warn!(
                "large page_size setting: {}. Each round may block the store for a while.",
                self.page_size
            );
        }
        Ok(())
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }

    /// The emit delay to install on the driver, if one is configured.
    pub fn throttle(&self) -> Option<Arc<dyn Throttle>> {
        self.debug_delay
            .filter(|d| !d.is_zero())
            .map(|d| Arc::new(JitterDelay::new(d, self.debug_delay_jitter)) as Arc<dyn Throttle>)
    }
}
