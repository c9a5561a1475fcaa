// src/rate_limit.rs
//! Per-client token buckets guarding the expensive endpoints.
//!
//! The bucket table is behind one mutex (lookup/create only); each bucket has
//! its own mutex so concurrent calls for one identity stay linearizable
//! without serialising unrelated clients on the refill arithmetic.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;

/// Header set by the reverse proxy in front of the service.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    pub capacity: f64,
    /// Time to earn one token.
    pub refill_every: Duration,
}

impl Default for RateLimitConfig {
    /// One request every 6 seconds (10/min), no burst.
    fn default() -> Self {
        Self {
            capacity: 1.0,
            refill_every: Duration::from_secs(6),
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn try_take(&mut self, cfg: &RateLimitConfig, now: Instant) -> bool {
        // `now` earlier than the last refill (caller clocks) earns nothing
        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = elapsed.as_secs_f64() / cfg.refill_every.as_secs_f64();
        self.tokens = (self.tokens + earned).min(cfg.capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    cfg: RateLimitConfig,
    buckets: Mutex<HashMap<String, Arc<Mutex<Bucket>>>>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimitConfig) -> Self {
        Self {
            cfg,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Take a token for `identity` if one is available.
    pub fn allow(&self, identity: &str) -> bool {
        self.allow_at(identity, Instant::now())
    }

    /// Same as `allow` with an explicit clock reading.
    pub fn allow_at(&self, identity: &str, now: Instant) -> bool {
        let bucket = {
            let mut table = self.buckets.lock().unwrap_or_else(|p| p.into_inner());
            table
                .entry(identity.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Bucket::full(self.cfg.capacity, now))))
                .clone()
        };
        let mut b = bucket.lock().unwrap_or_else(|p| p.into_inner());
        b.try_take(&self.cfg, now)
    }

    /// Number of identities seen so far (buckets are never evicted).
    pub fn tracked(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// First `X-Forwarded-For` entry, else the peer IP, else `"unknown"`.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Short stable fingerprint so client addresses never land in logs verbatim.
pub fn anon_id(identity: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(identity.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
