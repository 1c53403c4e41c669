//! Token validity decisions and the clock they are made against.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use super::token::Claims;

/// Whether `claims` describe a token that is still usable at `now`.
///
/// Missing claims are invalid. The expiry boundary is exclusive: a token
/// whose `exp` equals `now` is already expired.
pub fn is_valid(claims: Option<&Claims>, now: i64) -> bool {
    match claims {
        Some(claims) => claims.exp > now,
        None => false,
    }
}

/// Source of "now" in epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
