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

//! A `moka`-backed implementation of [`riskmesh_core::traits::RiskCache`],
//! split into three keyspaces with independent TTLs: user risk scores,
//! entity snapshots, and whole propagation results keyed by event
//! fingerprint. Values are opaque JSON strings; the engine decides what
//! goes in them.

use async_trait::async_trait;
use moka::sync::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use riskmesh_core::traits::RiskCache;

use crate::config::CacheConfig;

#[derive(Debug, Default)]
struct CacheStatsInner {
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub user_risk_entries: u64,
    pub entity_entries: u64,
    pub propagation_entries: u64,
}

/// Three independently-sized, independently-ttl'd `moka` caches, one per
/// keyspace named in the ingest pipeline. Each keyspace's TTL is fixed at
/// construction from [`CacheConfig`]; the `ttl` argument on
/// [`RiskCache::set`] is accepted for trait compatibility but the keyspace
/// prefix is what actually determines expiry here.
pub struct RiskMeshCache {
    user_risk: Cache<String, String>,
    entity: Cache<String, String>,
    propagation: Cache<String, String>,
    stats: CacheStatsInner,
}

impl RiskMeshCache {
    pub fn new(config: &CacheConfig) -> Self {
        let build = |ttl_secs: u64| {
            Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(Duration::from_secs(ttl_secs))
                .build()
        };
        Self {
            user_risk: build(config.user_risk_ttl_secs),
            entity: build(config.entity_ttl_secs),
            propagation: build(config.propagation_ttl_secs),
            stats: CacheStatsInner::default(),
        }
    }

    pub fn shared(config: &CacheConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    fn keyspace(&self, key: &str) -> Option<&Cache<String, String>> {
        if key.starts_with("user_risk:") {
            Some(&self.user_risk)
        } else if key.starts_with("entity:") {
            Some(&self.entity)
        } else if key.starts_with("propagation:") {
            Some(&self.propagation)
        } else {
            None
        }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            user_risk_entries: self.user_risk.entry_count(),
            entity_entries: self.entity.entry_count(),
            propagation_entries: self.propagation.entry_count(),
        }
    }

    pub fn clear(&self) {
        self.user_risk.invalidate_all();
        self.entity.invalidate_all();
        self.propagation.invalidate_all();
    }

    /// Invalidate a user's cached risk entry, per the rule that a user's
    /// entry must be dropped whenever their risk moves by more than 0.05
    /// absolute or they join a newly detected ring.
    pub fn invalidate_user_risk(&self, user_id: &str) {
        self.user_risk.invalidate(&user_risk_key(user_id));
    }
}

#[async_trait]
impl RiskCache for RiskMeshCache {
    async fn get(&self, key: &str) -> Option<String> {
        let Some(cache) = self.keyspace(key) else {
            return None;
        };
        match cache.get(key) {
            Some(value) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: String, _ttl: Duration) {
        if let Some(cache) = self.keyspace(key) {
            cache.insert(key.to_string(), value);
        }
    }

    async fn invalidate(&self, key: &str) {
        if let Some(cache) = self.keyspace(key) {
            cache.invalidate(key);
        }
    }
}

/// Key helpers so callers never hand-build the keyspace prefix.
pub fn user_risk_key(user_id: &str) -> String {
    format!("user_risk:{user_id}")
}

pub fn entity_key(kind: &str, id: &str) -> String {
    format!("entity:{kind}:{id}")
}

/// Propagation results are cached per (principal, fingerprint) per the
/// ingest pipeline's cache-probe step, not per fingerprint alone.
pub fn propagation_key(principal: &str, fingerprint: &str) -> String {
    format!("propagation:{principal}:{fingerprint}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CacheConfig {
        CacheConfig { user_risk_ttl_secs: 60, entity_ttl_secs: 60, propagation_ttl_secs: 60, max_entries: 100 }
    }

    #[tokio::test]
    async fn set_then_get_round_trips_within_its_keyspace() {
        let cache = RiskMeshCache::new(&config());
        let key = user_risk_key("u1");
        cache.set(&key, "{\"risk\":0.4}".to_string(), Duration::from_secs(60)).await;
        let value = cache.get(&key).await.unwrap();
        assert_eq!(value, "{\"risk\":0.4}");
    }

    #[tokio::test]
    async fn miss_on_unknown_key_is_recorded() {
        let cache = RiskMeshCache::new(&config());
        assert!(cache.get(&user_risk_key("nope")).await.is_none());
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn invalidate_removes_the_entry() {
        let cache = RiskMeshCache::new(&config());
        let key = propagation_key("p1", "fp1");
        cache.set(&key, "payload".to_string(), Duration::from_secs(60)).await;
        cache.invalidate(&key).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn unrecognized_prefix_is_never_stored() {
        let cache = RiskMeshCache::new(&config());
        cache.set("garbage:1", "x".to_string(), Duration::from_secs(60)).await;
        assert!(cache.get("garbage:1").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_user_risk_helper_targets_the_right_key() {
        let cache = RiskMeshCache::new(&config());
        cache.set(&user_risk_key("u1"), "x".to_string(), Duration::from_secs(60)).await;
        cache.invalidate_user_risk("u1");
        assert!(cache.get(&user_risk_key("u1")).await.is_none());
    }
}
