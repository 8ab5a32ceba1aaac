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

//! Prometheus metrics registry and exposition. Implements
//! [`riskmesh_core::traits::EngineMetrics`] so the engine can record
//! counters/histograms without knowing anything about `prometheus`. The
//! registry is owned per instance rather than a process-wide singleton,
//! matching the "explicit engine instance" design rule — `run_server`
//! builds one and threads it through `AppState`.

use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};

use riskmesh_core::traits::EngineMetrics;

pub struct RiskMeshMetrics {
    registry: Registry,
    requests_total: IntCounter,
    requests_flagged_total: IntCounter,
    errors_total: IntCounter,
    request_latency_ms: Histogram,
    propagation_latency_ms: Histogram,
    graph_nodes: Gauge,
    graph_edges: Gauge,
}

impl RiskMeshMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounter::new("riskmesh_requests_total", "total ingest requests processed")?;
        let requests_flagged_total =
            IntCounter::new("riskmesh_requests_flagged_total", "ingest requests whose final score reached challenge")?;
        let errors_total = IntCounter::new("riskmesh_errors_total", "internal invariant violations surfaced as 5xx")?;
        let request_latency_ms = Histogram::with_opts(
            HistogramOpts::new("riskmesh_request_latency_ms", "end-to-end ingest latency in milliseconds")
                .buckets(vec![1.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0]),
        )?;
        let propagation_latency_ms = Histogram::with_opts(
            HistogramOpts::new("riskmesh_propagation_latency_ms", "propagation-stage latency in milliseconds")
                .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0]),
        )?;
        let graph_nodes = Gauge::new("riskmesh_graph_nodes", "current node count in the graph store")?;
        let graph_edges = Gauge::new("riskmesh_graph_edges", "current edge count in the graph store")?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(requests_flagged_total.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(request_latency_ms.clone()))?;
        registry.register(Box::new(propagation_latency_ms.clone()))?;
        registry.register(Box::new(graph_nodes.clone()))?;
        registry.register(Box::new(graph_edges.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            requests_flagged_total,
            errors_total,
            request_latency_ms,
            propagation_latency_ms,
            graph_nodes,
            graph_edges,
        })
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(err) = encoder.encode(&families, &mut buffer) {
            tracing::error!(%err, "failed to encode prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl EngineMetrics for RiskMeshMetrics {
    fn record_request(&self, latency_ms: f64, flagged: bool) {
        self.requests_total.inc();
        if flagged {
            self.requests_flagged_total.inc();
        }
        self.request_latency_ms.observe(latency_ms);
    }

    fn record_propagation(&self, latency_ms: f64, depth: u32) {
        self.propagation_latency_ms.observe(latency_ms);
        let _ = depth;
    }

    fn record_error(&self) {
        self.errors_total.inc();
    }

    fn set_graph_size(&self, nodes: u64, edges: u64) {
        self.graph_nodes.set(nodes as f64);
        self.graph_edges.set(edges as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_contains_the_named_families_after_recording() {
        let metrics = RiskMeshMetrics::new().expect("metrics registration");
        metrics.record_request(12.5, true);
        metrics.record_propagation(3.0, 2);
        metrics.record_error();
        metrics.set_graph_size(10, 20);

        let exported = metrics.export();
        assert!(exported.contains("riskmesh_requests_total"));
        assert!(exported.contains("riskmesh_request_latency_ms"));
        assert!(exported.contains("riskmesh_graph_nodes"));
    }

    #[test]
    fn two_independent_instances_can_coexist() {
        let a = RiskMeshMetrics::new().expect("first registry");
        let b = RiskMeshMetrics::new().expect("second registry");
        a.record_request(1.0, false);
        b.record_request(2.0, false);
        assert!(a.export().contains("riskmesh_requests_total"));
        assert!(b.export().contains("riskmesh_requests_total"));
    }
}
