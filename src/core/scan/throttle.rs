// src/core/scan/throttle.rs

//! Optional diagnostic delay injected between emitted entries, to make
//! incremental delivery visible while developing a consumer.

use rand::Rng;
use std::fmt;
use std::time::Duration;

/// Decides how long the driver pauses before emitting each entry.
pub trait Throttle: Send + Sync + fmt::Debug {
    fn delay(&self) -> Option<Duration>;
}

/// A fixed base delay with symmetric random jitter: with `randomness` of
/// `0.5`, each pause falls between half and one and a half times `base`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterDelay {
    base: Duration,
    randomness: f64,
}

impl JitterDelay {
    /// `randomness` is clamped to `[0, 1]`; a non-finite value disables jitter.
    pub fn new(base: Duration, randomness: f64) -> Self {
        let randomness = if randomness.is_finite() {
            randomness.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { base, randomness }
    }
}

impl Throttle for JitterDelay {
    fn delay(&self) -> Option<Duration> {
        if self.base.is_zero() {
            return None;
        }
        if self.randomness == 0.0 {
            return Some(self.base);
        }
        let base = self.base.as_secs_f64();
        let low = base * (1.0 - self.randomness);
        let high = base * (1.0 + self.randomness);
        Some(Duration::from_secs_f64(
            rand::thread_rng().gen_range(low..=high),
        ))
    }
}
