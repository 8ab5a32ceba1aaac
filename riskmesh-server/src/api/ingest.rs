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

//! The ingest endpoint: the only handler that touches the graph. Resolves
//! the principal, enforces the rate limit, probes the cache, and on miss
//! runs [`RiskEngine::score`], records the durable row, and caches the
//! response under (principal, fingerprint).

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use riskmesh_core::clustering::ClusteringInfo;
use riskmesh_core::entities::{EntityKind, NodeKey};
use riskmesh_core::explain::{Recommendation, ScoreBreakdown};
use riskmesh_core::traits::{DurableSink, EngineMetrics, RiskCache};
use riskmesh_core::{TransactionEvent, TransactionRecord};

use crate::api::ApiError;
use crate::auth::{self, PrincipalResolution};
use crate::cache::propagation_key;
use crate::rate_limit::RateLimitOutcome;
use crate::state::AppState;

/// §4.8: the user's cached risk entry is stale once their node risk has
/// moved by more than this much, or once they join a newly detected ring.
const USER_RISK_INVALIDATION_DELTA: f64 = 0.05;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub user_id: String,
    pub device_id: String,
    pub ip_address: String,
    pub merchant_id: String,
    #[serde(default)]
    pub card_id: Option<String>,
    pub transaction_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationView {
    pub recommendation: Recommendation,
    pub reason: String,
    pub calculation_breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub transaction_id: String,
    pub risk_score: f64,
    pub base_risk: f64,
    pub clustering_boost: f64,
    pub propagation_depth: u32,
    pub total_latency_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub cached: bool,
    pub explanation: ExplanationView,
    pub clustering_info: ClusteringInfo,
}

const FLAGGED_THRESHOLD: f64 = 0.6;

#[tracing::instrument(skip(state, headers, req))]
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let start = Instant::now();

    let principal = match auth::resolve_principal(&headers) {
        PrincipalResolution::Known(p) => p,
        PrincipalResolution::Missing => {
            if state.config.rate_limit.deny_unknown_principal {
                return Err(ApiError::UnknownPrincipal);
            }
            "anonymous".to_string()
        }
    };

    if state.config.rate_limit.enabled {
        match state.rate_limiter.check(&principal) {
            RateLimitOutcome::Allowed { .. } => {}
            RateLimitOutcome::Limited { retry_after } => {
                return Err(ApiError::RateLimited { retry_after_secs: retry_after.as_secs().max(1) });
            }
            RateLimitOutcome::UnknownPrincipalDenied => return Err(ApiError::UnknownPrincipal),
        }
    }

    let event = TransactionEvent {
        user_id: req.user_id,
        device_id: req.device_id,
        ip_address: req.ip_address,
        merchant_id: req.merchant_id,
        card_id: req.card_id,
        transaction_amount: req.transaction_amount,
    };
    event.validate().map_err(ApiError::from)?;

    let fingerprint = event.fingerprint();
    tracing::debug!(principal = %principal, fingerprint = %fingerprint, "scoring event");
    let cache_key = propagation_key(&principal, &fingerprint);
    let cache_deadline = Duration::from_millis(state.config.engine.cache_sub_deadline_ms);

    let cached_raw = tokio::time::timeout(cache_deadline, state.cache.get(&cache_key)).await.ok().flatten();
    if let Some(raw) = cached_raw {
        if let Ok(mut response) = serde_json::from_str::<IngestResponse>(&raw) {
            response.cached = true;
            response.total_latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            return Ok(Json(response));
        }
    }

    let user_key = NodeKey::new(EntityKind::User, event.user_id.clone());
    let previous_user_risk = state.engine.graph().get_node(&user_key).map(|n| n.risk()).unwrap_or(0.0);

    let event_deadline = Instant::now() + Duration::from_millis(state.config.engine.event_deadline_ms);
    let outcome = state.engine.score(&event, Some(event_deadline)).map_err(|err| {
        state.metrics.record_error();
        ApiError::from(err)
    })?;

    let ring_member = outcome
        .clustering_info
        .rings
        .iter()
        .any(|ring| ring.members.contains(&user_key.as_storage_key()));
    if (outcome.final_score - previous_user_risk).abs() > USER_RISK_INVALIDATION_DELTA || ring_member {
        state.cache.invalidate_user_risk(&event.user_id);
    }

    let flagged = outcome.final_score >= FLAGGED_THRESHOLD;
    let total_latency_ms = start.elapsed().as_secs_f64() * 1000.0;

    state.metrics.record_request(total_latency_ms, flagged);
    state.metrics.record_propagation(total_latency_ms, outcome.propagation_depth);

    let record = TransactionRecord {
        event_id: Uuid::new_v4().to_string(),
        user_id: event.user_id.clone(),
        device_id: event.device_id.clone(),
        ip_address: event.ip_address.clone(),
        merchant_id: event.merchant_id.clone(),
        transaction_amount: event.transaction_amount,
        final_risk: outcome.final_score,
        propagation_depth: outcome.propagation_depth,
        timestamp: Utc::now(),
        latency_ms: total_latency_ms,
    };
    state.sink.record(record.clone()).await;

    let response = IngestResponse {
        transaction_id: record.event_id.clone(),
        risk_score: outcome.final_score,
        base_risk: outcome.explanation.breakdown.base_risk,
        clustering_boost: outcome.explanation.breakdown.cluster_boost,
        propagation_depth: outcome.propagation_depth,
        total_latency_ms,
        timestamp: record.timestamp,
        cached: false,
        explanation: ExplanationView {
            recommendation: outcome.explanation.recommendation,
            reason: outcome.explanation.reason.clone(),
            calculation_breakdown: outcome.explanation.breakdown.clone(),
        },
        clustering_info: outcome.clustering_info,
    };

    if let Ok(serialized) = serde_json::to_string(&response) {
        let ttl = Duration::from_secs(state.config.cache.propagation_ttl_secs);
        state.cache.set(&cache_key, serialized, ttl).await;
    }

    Ok(Json(response))
}
