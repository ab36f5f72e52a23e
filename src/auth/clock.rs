// src/auth/clock.rs

use crate::protocol::producer::unix_now;

/// Source of "now" for cache expiry decisions, in seconds since the epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        unix_now()
    }
}
