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

//! Graph statistics: node/edge counts, taken under the graph's read lock.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use riskmesh_core::entities::EntityKind;

use crate::state::AppState;

#[derive(Serialize)]
pub struct StatsResponse {
    node_count: u64,
    edge_count: u64,
    nodes_by_kind: std::collections::HashMap<String, u64>,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let snapshot = state.engine.graph().snapshot();
    let nodes_by_kind = [EntityKind::User, EntityKind::Device, EntityKind::Ip, EntityKind::Merchant, EntityKind::Card]
        .into_iter()
        .map(|kind| (kind.as_str().to_string(), snapshot.nodes_by_kind.get(kind.as_str()).copied().unwrap_or(0)))
        .collect();

    Json(StatsResponse { node_count: snapshot.node_count, edge_count: snapshot.edge_count, nodes_by_kind })
}
