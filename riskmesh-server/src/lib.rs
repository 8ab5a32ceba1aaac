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

//! The RiskMesh HTTP server: wires the pure `riskmesh-core` engine to an
//! axum router, a moka-backed cache, a token-bucket rate limiter, an
//! in-process durable sink, and Prometheus metrics exposition.

pub mod analytics;
pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod metrics;
pub mod rate_limit;
pub mod sink;
pub mod state;

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use riskmesh_core::{EngineConfig, RiskEngine};

use crate::cache::RiskMeshCache;
use crate::config::RiskMeshConfig;
use crate::metrics::RiskMeshMetrics;
use crate::rate_limit::RateLimiter;
use crate::sink::RiskMeshSink;
use crate::state::AppState;

fn engine_config_from(config: &RiskMeshConfig) -> EngineConfig {
    use riskmesh_core::clustering::ClusteringConfig;
    use riskmesh_core::decay::TimeDecay;
    use riskmesh_core::propagate::PropagationConfig;

    EngineConfig {
        propagation: PropagationConfig {
            alpha: config.engine.alpha,
            max_depth: config.engine.max_depth,
            threshold: config.engine.threshold,
        },
        decay: TimeDecay { decay_rate: config.engine.decay_rate, floor: config.engine.decay_floor },
        clustering: ClusteringConfig {
            ring_min_size: config.engine.ring_min_size,
            dense_ratio_threshold: config.engine.dense_ratio_threshold,
            star_degree_threshold: config.engine.star_degree_threshold,
            ..ClusteringConfig::default()
        },
    }
}

/// Initialize logging, build every collaborator, assemble the router, and
/// serve until the process receives a shutdown signal.
pub async fn run_server(config: RiskMeshConfig) -> Result<()> {
    init_tracing();

    config.validate()?;
    tracing::info!(listen_addr = %config.server.listen_addr, "configuration loaded");

    let engine = Arc::new(RiskEngine::new(engine_config_from(&config)));
    let cache = RiskMeshCache::shared(&config.cache);
    let sink = RiskMeshSink::shared(&config.sink);
    let metrics = Arc::new(RiskMeshMetrics::new()?);
    let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    let config = Arc::new(config);

    let state = AppState { engine, cache, sink, metrics, rate_limiter, config: config.clone(), started_at: Instant::now() };

    if config.gc.enabled {
        spawn_gc_task(state.clone(), config.clone());
    }

    let mut router = api::router(state);
    if config.server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }
    router = router.layer(TraceLayer::new_for_http());

    let addr = config.socket_addr()?;
    tracing::info!(%addr, "starting riskmesh-server");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("riskmesh-server shut down");
    Ok(())
}

/// Out-of-band garbage collection: evicts nodes (and their incident edges)
/// whose `last_seen` has aged past the configured horizon. Runs on its own
/// interval, entirely off the ingest hot path.
fn spawn_gc_task(state: AppState, config: Arc<RiskMeshConfig>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(config.gc.interval_secs));
        let horizon = chrono::Duration::days(config.gc.horizon_days);
        loop {
            ticker.tick().await;
            let before = state.engine.graph().snapshot();
            state.engine.graph().prune(horizon);
            let after = state.engine.graph().snapshot();
            tracing::info!(
                pruned_nodes = before.node_count.saturating_sub(after.node_count),
                remaining_nodes = after.node_count,
                "graph garbage collection pass complete"
            );
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining in-flight requests");
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
