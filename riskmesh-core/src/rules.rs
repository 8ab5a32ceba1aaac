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

//! Per-event heuristic base-risk scoring.
//!
//! Rules are evaluated against the graph state *before* the current event's
//! own mutations land, so "new device" genuinely means "never seen before
//! now". The rule set is a `Vec<Box<dyn BaseRiskRule>>` so adding or
//! replacing a rule never requires touching the engine.

use crate::entities::NodeKey;
use crate::graph::GraphStore;

/// The event fields a rule is allowed to look at.
#[derive(Debug, Clone)]
pub struct RuleContext<'a> {
    pub user: &'a NodeKey,
    pub device: &'a NodeKey,
    pub ip: &'a NodeKey,
    pub merchant: &'a NodeKey,
    pub amount: f64,
}

/// A single additive heuristic. `contribution` is only consulted when
/// `applies` returns true.
pub trait BaseRiskRule: Send + Sync {
    fn applies(&self, graph: &GraphStore, ctx: &RuleContext<'_>) -> bool;
    fn contribution(&self) -> f64;
    fn name(&self) -> &'static str;
}

pub struct HighAmountRule {
    pub threshold: f64,
    pub contribution: f64,
}

impl BaseRiskRule for HighAmountRule {
    fn applies(&self, _graph: &GraphStore, ctx: &RuleContext<'_>) -> bool {
        ctx.amount > self.threshold
    }
    fn contribution(&self) -> f64 {
        self.contribution
    }
    fn name(&self) -> &'static str {
        "high_amount"
    }
}

pub struct NewDeviceRule {
    pub contribution: f64,
}

impl BaseRiskRule for NewDeviceRule {
    fn applies(&self, graph: &GraphStore, ctx: &RuleContext<'_>) -> bool {
        !graph.has_edge(ctx.user, ctx.device)
    }
    fn contribution(&self) -> f64 {
        self.contribution
    }
    fn name(&self) -> &'static str {
        "new_device"
    }
}

pub struct NewIpRule {
    pub contribution: f64,
}

impl BaseRiskRule for NewIpRule {
    fn applies(&self, graph: &GraphStore, ctx: &RuleContext<'_>) -> bool {
        !graph.has_edge(ctx.user, ctx.ip)
    }
    fn contribution(&self) -> f64 {
        self.contribution
    }
    fn name(&self) -> &'static str {
        "new_ip"
    }
}

/// Fires unless either the user or the device already has an edge to this
/// merchant — matches the spec's `{user, device} -> merchant` phrasing.
pub struct NewMerchantRule {
    pub contribution: f64,
}

impl BaseRiskRule for NewMerchantRule {
    fn applies(&self, graph: &GraphStore, ctx: &RuleContext<'_>) -> bool {
        !graph.has_edge(ctx.user, ctx.merchant) && !graph.has_edge(ctx.device, ctx.merchant)
    }
    fn contribution(&self) -> f64 {
        self.contribution
    }
    fn name(&self) -> &'static str {
        "new_merchant"
    }
}

/// The pluggable rule set plus the outcome of evaluating it.
pub struct BaseRiskRules {
    rules: Vec<Box<dyn BaseRiskRule>>,
}

#[derive(Debug, Clone, Default)]
pub struct BaseRiskResult {
    pub score: f64,
    pub triggered: Vec<&'static str>,
}

impl BaseRiskRules {
    pub fn default_rules() -> Self {
        Self {
            rules: vec![
                Box::new(HighAmountRule { threshold: 1000.0, contribution: 0.30 }),
                Box::new(NewDeviceRule { contribution: 0.20 }),
                Box::new(NewIpRule { contribution: 0.20 }),
                Box::new(NewMerchantRule { contribution: 0.10 }),
            ],
        }
    }

    pub fn with_rules(rules: Vec<Box<dyn BaseRiskRule>>) -> Self {
        Self { rules }
    }

    /// Sum the contributions of every rule that applies, clamped to 1.0.
    pub fn evaluate(&self, graph: &GraphStore, ctx: &RuleContext<'_>) -> BaseRiskResult {
        let mut score = 0.0;
        let mut triggered = Vec::new();
        for rule in &self.rules {
            if rule.applies(graph, ctx) {
                score += rule.contribution();
                triggered.push(rule.name());
            }
        }
        BaseRiskResult { score: score.min(1.0), triggered }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityKind;

    fn key(kind: EntityKind, id: &str) -> NodeKey {
        NodeKey::new(kind, id)
    }

    #[test]
    fn cold_start_fresh_entities_low_amount() {
        let graph = GraphStore::new();
        let rules = BaseRiskRules::default_rules();
        let ctx = RuleContext {
            user: &key(EntityKind::User, "u1"),
            device: &key(EntityKind::Device, "d1"),
            ip: &key(EntityKind::Ip, "i1"),
            merchant: &key(EntityKind::Merchant, "m1"),
            amount: 50.0,
        };
        let result = rules.evaluate(&graph, &ctx);
        assert!((result.score - 0.5).abs() < 1e-9);
        assert_eq!(result.triggered.len(), 2);
    }

    #[test]
    fn known_edges_and_low_amount_score_zero() {
        let graph = GraphStore::new();
        let user = key(EntityKind::User, "u1");
        let device = key(EntityKind::Device, "d1");
        let ip = key(EntityKind::Ip, "i1");
        let merchant = key(EntityKind::Merchant, "m1");
        graph.upsert_edge(user.clone(), device.clone(), 1.0);
        graph.upsert_edge(user.clone(), ip.clone(), 1.0);
        graph.upsert_edge(user.clone(), merchant.clone(), 1.0);

        let rules = BaseRiskRules::default_rules();
        let ctx = RuleContext { user: &user, device: &device, ip: &ip, merchant: &merchant, amount: 50.0 };
        let result = rules.evaluate(&graph, &ctx);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn score_is_bounded_even_if_every_rule_fires() {
        let graph = GraphStore::new();
        let rules = BaseRiskRules::with_rules(vec![
            Box::new(HighAmountRule { threshold: 0.0, contribution: 0.9 }),
            Box::new(HighAmountRule { threshold: 0.0, contribution: 0.9 }),
        ]);
        let ctx = RuleContext {
            user: &key(EntityKind::User, "u1"),
            device: &key(EntityKind::Device, "d1"),
            ip: &key(EntityKind::Ip, "i1"),
            merchant: &key(EntityKind::Merchant, "m1"),
            amount: 5000.0,
        };
        assert_eq!(rules.evaluate(&graph, &ctx).score, 1.0);
    }
}
