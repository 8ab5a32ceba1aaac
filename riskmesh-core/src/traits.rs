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

//! Seams between the engine and its external collaborators — cache,
//! durable sink, metrics. Concrete, infra-heavy implementations live in
//! `riskmesh-server`; the engine only ever sees these traits, so it stays
//! free of any particular cache library or storage backend.

use async_trait::async_trait;
use std::time::Duration;

use crate::engine::TransactionRecord;

/// A TTL'd key-value cache. Implementations are expected to be safe for
/// concurrent use and to treat their own unavailability as a miss rather
/// than propagate an error — see the degrade-on-unavailable rule in the
/// error handling design.
#[async_trait]
pub trait RiskCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl: Duration);
    async fn invalidate(&self, key: &str);
}

/// The append-only durable sink. `record` must never block the caller on
/// the write actually landing; retry/backoff and dead-lettering are the
/// implementation's responsibility.
#[async_trait]
pub trait DurableSink: Send + Sync {
    async fn record(&self, row: TransactionRecord);
}

/// Counter/histogram/gauge bus. Kept synchronous since recording a metric
/// is never expected to suspend.
pub trait EngineMetrics: Send + Sync {
    fn record_request(&self, latency_ms: f64, flagged: bool);
    fn record_propagation(&self, latency_ms: f64, depth: u32);
    fn record_error(&self);
    fn set_graph_size(&self, nodes: u64, edges: u64);
}

/// A metrics sink that does nothing — useful for tests and for embedding
/// the engine in contexts that don't care about exposition.
pub struct NoopMetrics;

impl EngineMetrics for NoopMetrics {
    fn record_request(&self, _latency_ms: f64, _flagged: bool) {}
    fn record_propagation(&self, _latency_ms: f64, _depth: u32) {}
    fn record_error(&self) {}
    fn set_graph_size(&self, _nodes: u64, _edges: u64) {}
}
