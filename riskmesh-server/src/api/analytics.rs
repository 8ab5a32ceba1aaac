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

//! Handlers wrapping the pure functions in `crate::analytics` with the
//! durable sink's current row snapshot.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::analytics::{self, PerformanceSummary, RiskHistogramBucket, TopRiskyUser, UserProfile};
use crate::api::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TopUsersQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    10
}

pub async fn histogram(State(state): State<Arc<AppState>>) -> Json<Vec<RiskHistogramBucket>> {
    Json(analytics::risk_histogram(&state.sink.rows()))
}

pub async fn top_risky_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TopUsersQuery>,
) -> Json<Vec<TopRiskyUser>> {
    Json(analytics::top_risky_users(&state.sink.rows(), params.limit))
}

pub async fn user_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    analytics::user_profile(&state.sink.rows(), &user_id)
        .map(Json)
        .ok_or_else(|| ApiError::Validation(format!("no events recorded for user '{user_id}'")))
}

pub async fn performance(State(state): State<Arc<AppState>>) -> Json<PerformanceSummary> {
    Json(analytics::performance_summary(&state.sink.rows()))
}
