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

//! RiskMesh server configuration: TOML file, then environment variables,
//! then hardcoded defaults, in that priority order.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskMeshConfig {
    pub server: HttpServerConfig,
    #[serde(default)]
    pub engine: EngineTunables,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub gc: GcConfig,
}

/// Out-of-band graph pruning: never on the ingest hot path, run on an
/// interval by a background task in `run_server`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GcConfig {
    #[serde(default = "default_gc_enabled")]
    pub enabled: bool,
    #[serde(default = "default_gc_horizon_days")]
    pub horizon_days: i64,
    #[serde(default = "default_gc_interval_secs")]
    pub interval_secs: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: default_gc_enabled(),
            horizon_days: default_gc_horizon_days(),
            interval_secs: default_gc_interval_secs(),
        }
    }
}

fn default_gc_enabled() -> bool {
    true
}
fn default_gc_horizon_days() -> i64 {
    90
}
fn default_gc_interval_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineTunables {
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    #[serde(default = "default_decay_floor")]
    pub decay_floor: f64,
    #[serde(default = "default_ring_min_size")]
    pub ring_min_size: usize,
    #[serde(default = "default_dense_ratio")]
    pub dense_ratio_threshold: f64,
    #[serde(default = "default_star_degree")]
    pub star_degree_threshold: usize,
    #[serde(default = "default_event_deadline_ms")]
    pub event_deadline_ms: u64,
    #[serde(default = "default_cache_sub_deadline_ms")]
    pub cache_sub_deadline_ms: u64,
}

impl Default for EngineTunables {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            max_depth: default_max_depth(),
            threshold: default_threshold(),
            decay_rate: default_decay_rate(),
            decay_floor: default_decay_floor(),
            ring_min_size: default_ring_min_size(),
            dense_ratio_threshold: default_dense_ratio(),
            star_degree_threshold: default_star_degree(),
            event_deadline_ms: default_event_deadline_ms(),
            cache_sub_deadline_ms: default_cache_sub_deadline_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_user_risk_ttl_secs")]
    pub user_risk_ttl_secs: u64,
    #[serde(default = "default_entity_ttl_secs")]
    pub entity_ttl_secs: u64,
    #[serde(default = "default_propagation_ttl_secs")]
    pub propagation_ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            user_risk_ttl_secs: default_user_risk_ttl_secs(),
            entity_ttl_secs: default_entity_ttl_secs(),
            propagation_ttl_secs: default_propagation_ttl_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    #[serde(default = "default_rate_limit_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_max_principals")]
    pub max_principals: u64,
    #[serde(default = "default_deny_unknown_principal")]
    pub deny_unknown_principal: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            max_requests: default_rate_limit_max_requests(),
            window_secs: default_rate_limit_window_secs(),
            max_principals: default_max_principals(),
            deny_unknown_principal: default_deny_unknown_principal(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_workers")]
    pub workers: usize,
    #[serde(default = "default_sink_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_sink_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_sink_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_sink_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_sink_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_sink_jitter_ratio")]
    pub jitter_ratio: f64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            workers: default_sink_workers(),
            queue_depth: default_sink_queue_depth(),
            max_attempts: default_sink_max_attempts(),
            initial_backoff_ms: default_sink_initial_backoff_ms(),
            max_backoff_ms: default_sink_max_backoff_ms(),
            backoff_multiplier: default_sink_backoff_multiplier(),
            jitter_ratio: default_sink_jitter_ratio(),
        }
    }
}

fn default_http_addr() -> String {
    "127.0.0.1:47200".to_string()
}
fn default_request_timeout() -> u64 {
    5
}
fn default_enable_cors() -> bool {
    true
}
fn default_alpha() -> f64 {
    0.5
}
fn default_max_depth() -> u32 {
    2
}
fn default_threshold() -> f64 {
    0.1
}
fn default_decay_rate() -> f64 {
    0.995
}
fn default_decay_floor() -> f64 {
    0.01
}
fn default_ring_min_size() -> usize {
    3
}
fn default_dense_ratio() -> f64 {
    1.5
}
fn default_star_degree() -> usize {
    10
}
fn default_event_deadline_ms() -> u64 {
    200
}
fn default_cache_sub_deadline_ms() -> u64 {
    20
}
fn default_user_risk_ttl_secs() -> u64 {
    30 * 60
}
fn default_entity_ttl_secs() -> u64 {
    60 * 60
}
fn default_propagation_ttl_secs() -> u64 {
    15 * 60
}
fn default_cache_max_entries() -> u64 {
    1_000_000
}
fn default_rate_limit_enabled() -> bool {
    true
}
fn default_rate_limit_max_requests() -> u32 {
    100
}
fn default_rate_limit_window_secs() -> u64 {
    60
}
fn default_max_principals() -> u64 {
    100_000
}
fn default_deny_unknown_principal() -> bool {
    true
}
fn default_sink_workers() -> usize {
    4
}
fn default_sink_queue_depth() -> usize {
    10_000
}
fn default_sink_max_attempts() -> u32 {
    3
}
fn default_sink_initial_backoff_ms() -> u64 {
    50
}
fn default_sink_max_backoff_ms() -> u64 {
    2_000
}
fn default_sink_backoff_multiplier() -> f64 {
    2.0
}
fn default_sink_jitter_ratio() -> f64 {
    0.2
}

impl Default for RiskMeshConfig {
    fn default() -> Self {
        Self {
            server: HttpServerConfig {
                listen_addr: default_http_addr(),
                request_timeout_secs: default_request_timeout(),
                enable_cors: default_enable_cors(),
            },
            engine: EngineTunables::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitSettings::default(),
            sink: SinkConfig::default(),
            gc: GcConfig::default(),
        }
    }
}

impl RiskMeshConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply `RISKMESH_*` environment variable overrides on top of an
    /// already-loaded configuration.
    pub fn merge_with_env(mut self) -> Self {
        if let Ok(addr) = std::env::var("RISKMESH_HTTP_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Ok(val) = std::env::var("RISKMESH_ALPHA") {
            if let Ok(v) = val.parse() {
                self.engine.alpha = v;
            }
        }
        if let Ok(val) = std::env::var("RISKMESH_MAX_DEPTH") {
            if let Ok(v) = val.parse() {
                self.engine.max_depth = v;
            }
        }
        if let Ok(val) = std::env::var("RISKMESH_THRESHOLD") {
            if let Ok(v) = val.parse() {
                self.engine.threshold = v;
            }
        }
        if let Ok(val) = std::env::var("RISKMESH_RATE_LIMIT_MAX_REQUESTS") {
            if let Ok(v) = val.parse() {
                self.rate_limit.max_requests = v;
            }
        }
        if let Ok(val) = std::env::var("RISKMESH_RATE_LIMIT_WINDOW_SECS") {
            if let Ok(v) = val.parse() {
                self.rate_limit.window_secs = v;
            }
        }
        if let Ok(val) = std::env::var("RISKMESH_DENY_UNKNOWN_PRINCIPAL") {
            if let Ok(v) = val.parse() {
                self.rate_limit.deny_unknown_principal = v;
            }
        }
        self
    }

    /// Load configuration with priority: file > env > defaults.
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        Ok(config.merge_with_env())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if !(0.0..=1.0).contains(&self.engine.alpha) {
            anyhow::bail!("engine.alpha must be in (0,1]");
        }
        if self.engine.max_depth == 0 {
            anyhow::bail!("engine.max_depth must be >= 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_the_spec_defaults() {
        let config = RiskMeshConfig::default();
        assert_eq!(config.engine.alpha, 0.5);
        assert_eq!(config.engine.max_depth, 2);
        assert_eq!(config.engine.event_deadline_ms, 200);
        assert_eq!(config.cache.propagation_ttl_secs, 15 * 60);
        assert!(config.gc.enabled);
        assert_eq!(config.gc.horizon_days, 90);
        assert_eq!(config.gc.interval_secs, 3600);
    }

    #[test]
    fn env_overrides_take_priority_over_defaults() {
        std::env::set_var("RISKMESH_ALPHA", "0.75");
        let config = RiskMeshConfig::default().merge_with_env();
        assert_eq!(config.engine.alpha, 0.75);
        std::env::remove_var("RISKMESH_ALPHA");
    }
}
