//! Wall-clock access
//!
//! Claim tags are stored in local time without an offset, while creation
//! timestamps are absolute instants, so both views are exposed.

use chrono::{DateTime, Local, NaiveDateTime, Utc};

pub trait Clock: Send + Sync {
    /// Current instant
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current local wall-clock time, offset discarded
    fn now_local(&self) -> NaiveDateTime;
}

/// The process clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock frozen at a given instant, with local time equal to UTC
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.now
    }

    fn now_local(&self) -> NaiveDateTime {
        self.now.naive_utc()
    }
}
