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

//! Orchestration: the canonical ordering of graph operations for one
//! transaction event. Cache lookups, durable-sink writes, rate-limiting and
//! metrics exposition live one layer up, in `riskmesh-server`, which wraps
//! [`RiskEngine::score`] with those collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Instant;

use crate::clustering::{ClusteringConfig, ClusteringDetector, ClusteringInfo};
use crate::decay::TimeDecay;
use crate::entities::{EntityKind, NodeKey};
use crate::error::{EngineError, EngineResult};
use crate::explain::{Explainer, ExplainerInput, Explanation, ScoreBreakdown};
use crate::graph::GraphStore;
use crate::propagate::{PropagationConfig, Propagator};
use crate::rules::{BaseRiskRules, RuleContext};

/// The incoming event, as received from the ingest endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransactionEvent {
    pub user_id: String,
    pub device_id: String,
    pub ip_address: String,
    pub merchant_id: String,
    /// Optional fifth node type, same contract as `device`.
    #[serde(default)]
    pub card_id: Option<String>,
    pub transaction_amount: f64,
}

impl TransactionEvent {
    pub fn validate(&self) -> EngineResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(EngineError::Validation("user_id must not be empty".into()));
        }
        if self.device_id.trim().is_empty() {
            return Err(EngineError::Validation("device_id must not be empty".into()));
        }
        if self.ip_address.trim().is_empty() {
            return Err(EngineError::Validation("ip_address must not be empty".into()));
        }
        if self.merchant_id.trim().is_empty() {
            return Err(EngineError::Validation("merchant_id must not be empty".into()));
        }
        if self.transaction_amount < 0.0 {
            return Err(EngineError::Validation("transaction_amount must be non-negative".into()));
        }
        Ok(())
    }

    /// A stable fingerprint over the event's identifying fields, used as a
    /// cache key scoped by principal. The amount is bucketed to the nearest
    /// 100 so near-identical repeat swipes still hit the cache.
    pub fn fingerprint(&self) -> String {
        let bucketed_amount = (self.transaction_amount / 100.0).round() as i64 * 100;
        let mut fields = vec![
            self.user_id.clone(),
            self.device_id.clone(),
            self.ip_address.clone(),
            self.merchant_id.clone(),
            bucketed_amount.to_string(),
        ];
        fields.sort();
        let mut hasher = Sha256::new();
        hasher.update(fields.join("|").as_bytes());
        hex::encode(hasher.finalize())
    }

    fn node_keys(&self) -> (NodeKey, NodeKey, NodeKey, NodeKey, Option<NodeKey>) {
        (
            NodeKey::new(EntityKind::User, self.user_id.clone()),
            NodeKey::new(EntityKind::Device, self.device_id.clone()),
            NodeKey::new(EntityKind::Ip, self.ip_address.clone()),
            NodeKey::new(EntityKind::Merchant, self.merchant_id.clone()),
            self.card_id.clone().map(|id| NodeKey::new(EntityKind::Card, id)),
        )
    }
}

/// One row persisted to the durable sink per processed event. No graph
/// state is persisted — the graph is reconstructible from this log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub event_id: String,
    pub user_id: String,
    pub device_id: String,
    pub ip_address: String,
    pub merchant_id: String,
    pub transaction_amount: f64,
    pub final_risk: f64,
    pub propagation_depth: u32,
    pub timestamp: DateTime<Utc>,
    /// End-to-end handling time, for the performance analytics query in
    /// `riskmesh-server`. Not part of the graph's own state.
    pub latency_ms: f64,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub propagation: PropagationConfig,
    pub decay: TimeDecay,
    pub clustering: ClusteringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            propagation: PropagationConfig::default(),
            decay: TimeDecay::default(),
            clustering: ClusteringConfig::default(),
        }
    }
}

/// The graph-only outcome of scoring one event — everything §4.2 through
/// §4.6 compute, before the cache/sink/metrics wrapping that
/// `riskmesh-server` layers on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub fingerprint: String,
    pub final_score: f64,
    pub propagation_depth: u32,
    pub depth_truncated: bool,
    pub explanation: Explanation,
    pub clustering_info: ClusteringInfo,
}

/// The engine: graph store plus the pluggable rule set and the algorithmic
/// parameters for propagation, decay, and clustering.
pub struct RiskEngine {
    graph: GraphStore,
    rules: BaseRiskRules,
    propagator: Propagator,
    clustering: ClusteringDetector,
    config: EngineConfig,
}

impl RiskEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            graph: GraphStore::new(),
            rules: BaseRiskRules::default_rules(),
            propagator: Propagator::new(config.propagation.clone()),
            clustering: ClusteringDetector::new(config.clustering.clone()),
            config,
        }
    }

    pub fn with_rules(mut self, rules: BaseRiskRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    /// Run steps 2–7 of the canonical event ordering under the graph's
    /// write discipline. `deadline`, if given, bounds how long propagation
    /// is allowed to keep expanding the BFS frontier.
    pub fn score(
        &self,
        event: &TransactionEvent,
        deadline: Option<Instant>,
    ) -> EngineResult<ScoreOutcome> {
        event.validate()?;

        let (user, device, ip, merchant, card) = event.node_keys();
        let now = Utc::now();

        // Step 2: decay each node against its *existing* last_seen first,
        // then upsert. Upserting refreshes last_seen to `now`, so decay has
        // to run first or it always sees zero elapsed time and never erodes
        // anything. `card` is the optional fifth node type; it shares
        // device's contract, so it rides along in both passes whenever the
        // event names one.
        for key in [&user, &device, &ip, &merchant] {
            self.config.decay.apply(&self.graph, key, now);
        }
        if let Some(card) = &card {
            self.config.decay.apply(&self.graph, card, now);
        }
        let after_time_decay = self.graph.get_node(&user).map(|n| n.risk()).unwrap_or(0.0);

        for key in [&user, &device, &ip, &merchant] {
            self.graph.upsert_node((*key).clone(), 0.0);
        }
        if let Some(card) = &card {
            self.graph.upsert_node(card.clone(), 0.0);
        }

        // Step 3: base risk, computed against edges as they stand *before*
        // this event's own mutations.
        let ctx = RuleContext { user: &user, device: &device, ip: &ip, merchant: &merchant, amount: event.transaction_amount };
        let base = self.rules.evaluate(&self.graph, &ctx);

        // Step 4: upsert canonical edges with the observed weight.
        let weight = (event.transaction_amount / 1000.0).clamp(0.1, 1.0);
        self.graph.upsert_edge(user.clone(), device.clone(), weight);
        self.graph.upsert_edge(user.clone(), ip.clone(), weight);
        self.graph.upsert_edge(user.clone(), merchant.clone(), weight);
        self.graph.upsert_edge(device.clone(), ip.clone(), weight);
        self.graph.upsert_edge(device.clone(), merchant.clone(), weight);
        if let Some(card) = &card {
            self.graph.upsert_edge(user.clone(), card.clone(), weight);
        }

        // Step 5: propagate from the user node with the base risk.
        let propagation = self.propagator.propagate(&self.graph, &user, base.score, deadline);
        let after_propagation = propagation.updates.get(&user).copied().unwrap_or(base.score);

        // Step 6: clustering over the 2-hop subgraph seeded by this event's
        // nodes.
        let mut seeds = vec![user.clone(), device.clone(), ip.clone(), merchant.clone()];
        if let Some(card) = &card {
            seeds.push(card.clone());
        }
        let (boosts, clustering_info) = self.clustering.detect(&self.graph, &seeds);
        let cluster_boost = boosts.get(&user).copied().unwrap_or(0.0);

        // Step 7: compose and reclamp.
        let final_score = (after_propagation + cluster_boost).clamp(0.0, 1.0);
        self.graph.set_risk(&user, final_score);

        let ring_member = clustering_info.rings.iter().any(|r| r.members.contains(&user.as_storage_key()));
        let dense_member = clustering_info.dense_subgraphs.iter().any(|r| r.members.contains(&user.as_storage_key()));
        let star_hub = clustering_info.star_patterns.iter().any(|r| r.members.first() == Some(&user.as_storage_key()));

        let breakdown = ScoreBreakdown {
            base_risk: base.score,
            after_propagation,
            after_time_decay,
            cluster_boost,
            final_score,
        };
        let explanation = Explainer::explain(ExplainerInput {
            triggered_rules: &base.triggered,
            ring_member,
            dense_member,
            star_hub,
            breakdown,
        });

        Ok(ScoreOutcome {
            fingerprint: event.fingerprint(),
            final_score,
            propagation_depth: propagation.depth_reached,
            depth_truncated: propagation.depth_truncated,
            explanation,
            clustering_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(amount: f64) -> TransactionEvent {
        TransactionEvent {
            user_id: "u1".into(),
            device_id: "d1".into(),
            ip_address: "i1".into(),
            merchant_id: "m1".into(),
            card_id: None,
            transaction_amount: amount,
        }
    }

    #[test]
    fn cold_start_low_amount_scores_around_base_risk() {
        let engine = RiskEngine::new(EngineConfig::default());
        let outcome = engine.score(&event(50.0), None).unwrap();
        assert!((outcome.final_score - 0.5).abs() < 1e-6);
        // The canonical edges for this event are upserted in step 4, before
        // propagation runs in step 5, so the user's brand-new device/ip/
        // merchant edges are already live neighbors by the time the BFS
        // starts — depth 1 gets touched even though none of them existed
        // before this event.
        assert_eq!(outcome.propagation_depth, 1);
        assert_eq!(outcome.explanation.breakdown.cluster_boost, 0.0);
    }

    #[test]
    fn repeated_event_has_no_new_edges_and_low_base_risk() {
        let engine = RiskEngine::new(EngineConfig::default());
        engine.score(&event(50.0), None).unwrap();
        let second = engine.score(&event(50.0), None).unwrap();
        assert_eq!(second.explanation.breakdown.base_risk, 0.0);
    }

    #[test]
    fn threshold_gating_skips_propagation() {
        let engine = RiskEngine::new(EngineConfig::default());
        // amount below every rule's trigger and no prior edges: base risk
        // still hits 0.5 on cold start (new device/ip/merchant all fire),
        // so force a sub-threshold case by pre-seeding the edges first.
        let e = event(50.0);
        let (user, device, ip, merchant, _) = e.node_keys();
        engine.graph().upsert_edge(user.clone(), device, 1.0);
        engine.graph().upsert_edge(user.clone(), ip, 1.0);
        engine.graph().upsert_edge(user, merchant, 1.0);
        let outcome = engine.score(&e, None).unwrap();
        assert_eq!(outcome.propagation_depth, 0);
        assert_eq!(outcome.explanation.breakdown.base_risk, 0.0);
    }

    #[test]
    fn fingerprint_is_stable_for_the_same_logical_event() {
        let a = event(50.0);
        let b = event(50.0);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn validation_rejects_empty_fields_and_negative_amounts() {
        let mut e = event(50.0);
        e.user_id = "".into();
        assert!(e.validate().is_err());

        let mut e2 = event(-1.0);
        e2.user_id = "u1".into();
        assert!(e2.validate().is_err());
    }
}
