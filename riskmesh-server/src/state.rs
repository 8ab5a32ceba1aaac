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

//! The shared application state handed to every axum handler via the
//! `State` extractor. Built once in `run_server` and cheap to clone (every
//! field is an `Arc`).

use std::sync::Arc;
use std::time::Instant;

use riskmesh_core::RiskEngine;

use crate::cache::RiskMeshCache;
use crate::config::RiskMeshConfig;
use crate::metrics::RiskMeshMetrics;
use crate::rate_limit::RateLimiter;
use crate::sink::RiskMeshSink;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RiskEngine>,
    pub cache: Arc<RiskMeshCache>,
    pub sink: Arc<RiskMeshSink>,
    pub metrics: Arc<RiskMeshMetrics>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<RiskMeshConfig>,
    pub started_at: Instant,
}

impl AppState {
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
