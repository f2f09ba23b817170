use crate::types::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A stored value plus its optional absolute expiry.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    /// Milliseconds since the UNIX epoch. `None` means the key never expires.
    pub expires_at: Option<u64>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Entry {
            value,
            expires_at: None,
        }
    }

    pub fn with_expiry(value: Value, expires_at: Option<u64>) -> Self {
        Entry { value, expires_at }
    }

    /// The single expiry predicate, shared by lazy lookups and the reaper.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        is_expired(self.expires_at, now_ms)
    }

    pub fn ttl_at(&self, now_ms: u64) -> Ttl {
        match self.expires_at {
            None => Ttl::Persistent,
            Some(at) if at <= now_ms => Ttl::Missing,
            Some(at) => Ttl::Expires(Duration::from_millis(at - now_ms)),
        }
    }
}

pub fn is_expired(expires_at: Option<u64>, now_ms: u64) -> bool {
    expires_at.is_some_and(|at| at <= now_ms)
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// No such key (or it already expired).
    Missing,
    /// The key exists and has no expiry.
    Persistent,
    Expires(Duration),
}

impl Ttl {
    /// TTL reply in seconds: -2 missing, -1 persistent. Rounds to the nearest second.
    pub fn as_secs_reply(self) -> i64 {
        match self {
            Ttl::Missing => -2,
            Ttl::Persistent => -1,
            Ttl::Expires(d) => ((d.as_millis() + 500) / 1000) as i64,
        }
    }

    pub fn as_millis_reply(self) -> i64 {
        match self {
            Ttl::Missing => -2,
            Ttl::Persistent => -1,
            Ttl::Expires(d) => d.as_millis() as i64,
        }
    }
}

/// Current time in milliseconds since the UNIX epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
