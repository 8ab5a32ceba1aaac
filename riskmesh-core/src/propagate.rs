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

//! Bounded-depth breadth-first risk diffusion.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use crate::entities::{Direction, NodeKey};
use crate::graph::GraphStore;

#[derive(Debug, Clone)]
pub struct PropagationConfig {
    /// Propagation coefficient, `alpha ∈ (0,1]`.
    pub alpha: f64,
    pub max_depth: u32,
    pub threshold: f64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self { alpha: 0.5, max_depth: 2, threshold: 0.1 }
    }
}

/// Result of one propagation call: the new risk for every node touched, the
/// deepest level actually reached, and whether the deadline cut the BFS
/// short before the frontier was exhausted.
#[derive(Debug, Clone, Default)]
pub struct PropagationResult {
    pub updates: HashMap<NodeKey, f64>,
    pub depth_reached: u32,
    pub depth_truncated: bool,
}

pub struct Propagator {
    config: PropagationConfig,
}

impl Propagator {
    pub fn new(config: PropagationConfig) -> Self {
        Self { config }
    }

    /// Diffuse `base_risk` outward from `source` over outgoing edges only,
    /// up to `max_depth` hops, honoring `deadline` as a wall-clock budget.
    pub fn propagate(
        &self,
        graph: &GraphStore,
        source: &NodeKey,
        base_risk: f64,
        deadline: Option<Instant>,
    ) -> PropagationResult {
        graph.set_risk(source, base_risk);

        if base_risk < self.config.threshold {
            let mut updates = HashMap::new();
            updates.insert(source.clone(), base_risk);
            return PropagationResult { updates, depth_reached: 0, depth_truncated: false };
        }

        let mut visited: HashSet<NodeKey> = HashSet::new();
        let mut updates: HashMap<NodeKey, f64> = HashMap::new();
        let mut frontier: VecDeque<(NodeKey, u32)> = VecDeque::new();

        visited.insert(source.clone());
        updates.insert(source.clone(), base_risk);
        frontier.push_back((source.clone(), 0));

        let mut depth_reached = 0u32;
        let mut depth_truncated = false;

        while let Some((node, depth)) = frontier.pop_front() {
            depth_reached = depth_reached.max(depth);

            if depth >= self.config.max_depth {
                continue;
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    depth_truncated = true;
                    break;
                }
            }

            let risk_u = graph.get_node(&node).map(|n| n.risk()).unwrap_or(base_risk);
            let mut neighbors = graph.neighbors(&node, Direction::Out);
            // Ascending node id for deterministic tie-breaking.
            neighbors.sort_by(|a, b| a.key.as_storage_key().cmp(&b.key.as_storage_key()));

            for neighbor in neighbors {
                if visited.contains(&neighbor.key) {
                    continue;
                }
                let delta = self.config.alpha * risk_u * neighbor.weight;
                let current = graph.get_node(&neighbor.key).map(|n| n.risk()).unwrap_or(0.0);
                let new_risk = (current + delta).min(1.0);
                graph.set_risk(&neighbor.key, new_risk);

                visited.insert(neighbor.key.clone());
                updates.insert(neighbor.key.clone(), new_risk);
                frontier.push_back((neighbor.key, depth + 1));
            }
        }

        PropagationResult { updates, depth_reached, depth_truncated }
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
    fn below_threshold_skips_propagation_entirely() {
        let graph = GraphStore::new();
        let user = key(EntityKind::User, "u1");
        graph.upsert_node(user.clone(), 0.0);
        let prop = Propagator::new(PropagationConfig::default());
        let result = prop.propagate(&graph, &user, 0.05, None);
        assert_eq!(result.depth_reached, 0);
        assert_eq!(result.updates.len(), 1);
    }

    #[test]
    fn depth_truncation_never_updates_nodes_past_max_depth() {
        let graph = GraphStore::new();
        let u1 = key(EntityKind::User, "u1");
        let d1 = key(EntityKind::Device, "d1");
        let m1 = key(EntityKind::Merchant, "m1");
        let u2 = key(EntityKind::User, "u2");
        graph.upsert_edge(u1.clone(), d1.clone(), 1.0);
        graph.upsert_edge(d1.clone(), m1.clone(), 1.0);
        graph.upsert_edge(m1.clone(), u2.clone(), 1.0);

        let prop = Propagator::new(PropagationConfig { alpha: 0.5, max_depth: 2, threshold: 0.1 });
        let result = prop.propagate(&graph, &u1, 0.8, None);

        assert!(result.updates.contains_key(&d1));
        assert!(result.updates.contains_key(&m1));
        assert!(!result.updates.contains_key(&u2));
        assert!(result.updates[&d1] >= 0.4 - 1e-9);
    }

    #[test]
    fn visited_set_updates_each_node_at_most_once() {
        let graph = GraphStore::new();
        let u1 = key(EntityKind::User, "u1");
        let d1 = key(EntityKind::Device, "d1");
        let i1 = key(EntityKind::Ip, "i1");
        let hub = key(EntityKind::Merchant, "hub");
        // Two paths from u1 to hub: via d1 and via i1.
        graph.upsert_edge(u1.clone(), d1.clone(), 1.0);
        graph.upsert_edge(u1.clone(), i1.clone(), 1.0);
        graph.upsert_edge(d1.clone(), hub.clone(), 1.0);
        graph.upsert_edge(i1.clone(), hub.clone(), 1.0);

        let prop = Propagator::new(PropagationConfig { alpha: 0.5, max_depth: 2, threshold: 0.1 });
        let result = prop.propagate(&graph, &u1, 0.8, None);
        // hub is reached at depth 2 from both d1 and i1; visited guarantees
        // exactly one entry, not an accumulation of both deltas.
        assert!(result.updates.contains_key(&hub));
        assert!(result.updates[&hub] <= 1.0);
    }
}
