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

//! Node and edge value types for the entity-relationship graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque node identifier. Two ids of different [`EntityKind`] never collide
/// because identity is `(kind, id)`, not `id` alone — see [`NodeKey`].
pub type NodeId = String;

/// Closed set of entity types RiskMesh reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Device,
    Ip,
    Merchant,
    /// Optional fifth node type, same contract as `Device`.
    Card,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Device => "device",
            EntityKind::Ip => "ip",
            EntityKind::Merchant => "merchant",
            EntityKind::Card => "card",
        }
    }
}

/// Composite key enforcing that node identity is `(kind, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub kind: EntityKind,
    pub id: NodeId,
}

impl NodeKey {
    pub fn new(kind: EntityKind, id: impl Into<NodeId>) -> Self {
        Self { kind, id: id.into() }
    }

    /// Stable string form used as the map key and in cache keyspaces.
    pub fn as_storage_key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.id)
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_storage_key())
    }
}

/// A node in the graph: a user, device, IP, merchant, or card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub key: NodeKey,
    risk: f64,
    pub last_seen: DateTime<Utc>,
    pub first_seen: DateTime<Utc>,
    pub interaction_count: u64,
}

impl Node {
    pub fn new(key: NodeKey, initial_risk: f64, now: DateTime<Utc>) -> Self {
        Self {
            key,
            risk: initial_risk.clamp(0.0, 1.0),
            last_seen: now,
            first_seen: now,
            interaction_count: 1,
        }
    }

    pub fn risk(&self) -> f64 {
        self.risk
    }

    /// Set risk, clamping to `[0,1]`. Callers are responsible for bumping
    /// `last_seen` separately when the mutation reflects a fresh observation
    /// (decay instead refreshes `last_seen` unconditionally, see
    /// [`crate::decay`]).
    pub fn set_risk(&mut self, risk: f64) {
        self.risk = risk.clamp(0.0, 1.0);
    }
}

/// Direction of traversal for neighbor queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

/// A directed edge between two nodes, carrying an influence weight for
/// propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub src: NodeKey,
    pub dst: NodeKey,
    weight: f64,
    pub interaction_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Edge {
    pub fn new(src: NodeKey, dst: NodeKey, weight: f64, now: DateTime<Utc>) -> Self {
        Self {
            src,
            dst,
            weight: weight.clamp(0.0, 1.0),
            interaction_count: 1,
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Blend the stored weight toward `new_weight`, weighted by how many
    /// observations already back the existing weight, so a single outlier
    /// observation cannot swing the edge's influence.
    pub fn blend_weight(&mut self, new_weight: f64) {
        let new_weight = new_weight.clamp(0.0, 1.0);
        let n = self.interaction_count as f64;
        self.weight = ((self.weight * n) + new_weight) / (n + 1.0);
        self.weight = self.weight.clamp(0.0, 1.0);
    }
}

/// Cheap point-in-time statistics over the whole graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: u64,
    pub edge_count: u64,
    pub nodes_by_kind: std::collections::HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_key_distinguishes_kinds_sharing_an_id() {
        let a = NodeKey::new(EntityKind::User, "u1");
        let b = NodeKey::new(EntityKind::Device, "u1");
        assert_ne!(a, b);
        assert_ne!(a.as_storage_key(), b.as_storage_key());
    }

    #[test]
    fn node_risk_is_clamped_on_construction_and_set() {
        let now = Utc::now();
        let mut n = Node::new(NodeKey::new(EntityKind::User, "u1"), 5.0, now);
        assert_eq!(n.risk(), 1.0);
        n.set_risk(-3.0);
        assert_eq!(n.risk(), 0.0);
    }

    #[test]
    fn edge_weight_blend_is_clamped_and_stabilizes() {
        let now = Utc::now();
        let mut e = Edge::new(
            NodeKey::new(EntityKind::User, "u1"),
            NodeKey::new(EntityKind::Device, "d1"),
            1.0,
            now,
        );
        e.blend_weight(0.0);
        assert!((e.weight() - 0.5).abs() < 1e-9);
        e.interaction_count += 1;
        e.blend_weight(2.0);
        assert_eq!(e.weight(), 1.0);
    }
}
