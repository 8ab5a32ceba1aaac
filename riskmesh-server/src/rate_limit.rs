// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-principal token bucket rate limiting, with a pluggable policy for
//! principals that have never been seen before.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitSettings;

/// A single principal's bucket: capacity tokens, refilled continuously at
/// `capacity / window` tokens per second.
struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: Mutex<(f64, Instant)>,
}

impl TokenBucket {
    fn new(capacity: u32, window_secs: u64) -> Self {
        let capacity = capacity as f64;
        let refill_per_sec = capacity / (window_secs.max(1) as f64);
        Self { capacity, refill_per_sec, tokens: Mutex::new((capacity, Instant::now())) }
    }

    /// Refill for elapsed time, then try to take one token. Returns
    /// `Ok(remaining)` on success, `Err(retry_after)` if the bucket is dry.
    fn try_consume(&self) -> Result<f64, Duration> {
        let mut guard = self.tokens.lock();
        let (tokens, last_refill) = &mut *guard;
        let now = Instant::now();
        let elapsed = now.duration_since(*last_refill).as_secs_f64();
        *tokens = (*tokens + elapsed * self.refill_per_sec).min(self.capacity);
        *last_refill = now;

        if *tokens >= 1.0 {
            *tokens -= 1.0;
            Ok(*tokens)
        } else {
            let deficit = 1.0 - *tokens;
            let retry_secs = deficit / self.refill_per_sec.max(f64::MIN_POSITIVE);
            Err(Duration::from_secs_f64(retry_secs))
        }
    }
}

/// The outcome of a rate-limit check.
#[derive(Debug, Clone, Copy)]
pub enum RateLimitOutcome {
    Allowed { remaining: f64 },
    Limited { retry_after: Duration },
    UnknownPrincipalDenied,
}

/// Per-principal token buckets. Unknown principals get a bucket lazily,
/// unless `deny_unknown_principal` is set, in which case they're rejected
/// outright instead of being handed the default bucket.
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    default_capacity: u32,
    default_window_secs: u64,
    deny_unknown_principal: bool,
    known_principals: DashMap<String, (u32, u64)>,
    max_principals: u64,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            buckets: DashMap::new(),
            default_capacity: settings.max_requests,
            default_window_secs: settings.window_secs,
            deny_unknown_principal: settings.deny_unknown_principal,
            known_principals: DashMap::new(),
            max_principals: settings.max_principals,
        }
    }

    /// Register an explicit per-principal capacity override, making that
    /// principal "known" regardless of the deny-unknown policy.
    pub fn configure_principal(&self, principal: &str, capacity: u32, window_secs: u64) {
        self.known_principals.insert(principal.to_string(), (capacity, window_secs));
    }

    pub fn check(&self, principal: &str) -> RateLimitOutcome {
        if self.buckets.len() as u64 >= self.max_principals && !self.buckets.contains_key(principal) {
            if self.deny_unknown_principal {
                return RateLimitOutcome::UnknownPrincipalDenied;
            }
        }

        if !self.buckets.contains_key(principal) {
            if self.deny_unknown_principal && !self.known_principals.contains_key(principal) {
                return RateLimitOutcome::UnknownPrincipalDenied;
            }
            let (capacity, window) = self
                .known_principals
                .get(principal)
                .map(|e| *e)
                .unwrap_or((self.default_capacity, self.default_window_secs));
            self.buckets.entry(principal.to_string()).or_insert_with(|| TokenBucket::new(capacity, window));
        }

        let bucket = self.buckets.get(principal).expect("bucket just inserted");
        match bucket.try_consume() {
            Ok(remaining) => RateLimitOutcome::Allowed { remaining },
            Err(retry_after) => RateLimitOutcome::Limited { retry_after },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(capacity: u32, window_secs: u64, deny_unknown: bool) -> RateLimitSettings {
        RateLimitSettings {
            enabled: true,
            max_requests: capacity,
            window_secs,
            max_principals: 1000,
            deny_unknown_principal: deny_unknown,
        }
    }

    #[test]
    fn allows_requests_under_capacity() {
        let limiter = RateLimiter::new(&settings(5, 60, false));
        for _ in 0..5 {
            assert!(matches!(limiter.check("p1"), RateLimitOutcome::Allowed { .. }));
        }
    }

    #[test]
    fn blocks_once_capacity_exhausted() {
        let limiter = RateLimiter::new(&settings(2, 60, false));
        limiter.check("p1");
        limiter.check("p1");
        assert!(matches!(limiter.check("p1"), RateLimitOutcome::Limited { .. }));
    }

    #[test]
    fn buckets_are_independent_per_principal() {
        let limiter = RateLimiter::new(&settings(1, 60, false));
        limiter.check("p1");
        assert!(matches!(limiter.check("p1"), RateLimitOutcome::Limited { .. }));
        assert!(matches!(limiter.check("p2"), RateLimitOutcome::Allowed { .. }));
    }

    #[test]
    fn deny_unknown_principal_rejects_without_configuration() {
        let limiter = RateLimiter::new(&settings(10, 60, true));
        assert!(matches!(limiter.check("stranger"), RateLimitOutcome::UnknownPrincipalDenied));
        limiter.configure_principal("known", 10, 60);
        assert!(matches!(limiter.check("known"), RateLimitOutcome::Allowed { .. }));
    }
}
