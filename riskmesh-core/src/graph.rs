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

//! The in-memory directed multi-typed entity graph.
//!
//! Nodes and edges live in flat [`DashMap`]s keyed by string ids; there are
//! no pointer cycles, so pruning a node is a handful of map removals. Each
//! shard of a `DashMap` carries its own lock, which gives the finer-grained
//! striping §5 of the design allows in place of one coarse graph-wide lock.

use chrono::Utc;
use dashmap::DashMap;
use dashmap::DashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::entities::{Direction, Edge, EntityKind, GraphStats, Node, NodeKey};

/// A neighbor discovered by [`GraphStore::neighbors`], with the edge
/// attributes relevant to the caller (weight, interaction count).
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub key: NodeKey,
    pub weight: f64,
    pub interaction_count: u64,
}

/// The entity-relationship graph: nodes, directed edges, and the adjacency
/// indexes that make neighbor lookups O(deg) in either direction.
pub struct GraphStore {
    nodes: DashMap<String, Node>,
    edges: DashMap<(String, String), Edge>,
    out_adjacency: DashMap<String, DashSet<String>>,
    in_adjacency: DashMap<String, DashSet<String>>,
    node_count: AtomicU64,
    edge_count: AtomicU64,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
            edges: DashMap::new(),
            out_adjacency: DashMap::new(),
            in_adjacency: DashMap::new(),
            node_count: AtomicU64::new(0),
            edge_count: AtomicU64::new(0),
        }
    }

    /// Create the node if absent; on re-observation, refresh `last_seen` and
    /// bump the interaction count without ever overwriting a higher
    /// existing risk with a lower `initial_risk` default.
    pub fn upsert_node(&self, key: NodeKey, initial_risk: f64) {
        let storage_key = key.as_storage_key();
        let now = Utc::now();
        match self.nodes.entry(storage_key) {
            dashmap::mapref::entry::Entry::Occupied(mut e) => {
                let node = e.get_mut();
                node.last_seen = now;
                node.interaction_count += 1;
                if initial_risk > node.risk() {
                    node.set_risk(initial_risk);
                }
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(Node::new(key, initial_risk, now));
                self.node_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Create endpoints if absent, create the edge if absent, otherwise
    /// bump interaction count, refresh `last_seen`, and blend the stored
    /// weight toward `weight`.
    pub fn upsert_edge(&self, src: NodeKey, dst: NodeKey, weight: f64) {
        self.upsert_node(src.clone(), 0.0);
        self.upsert_node(dst.clone(), 0.0);

        let src_key = src.as_storage_key();
        let dst_key = dst.as_storage_key();
        let now = Utc::now();

        match self.edges.entry((src_key.clone(), dst_key.clone())) {
            dashmap::mapref::entry::Entry::Occupied(mut e) => {
                let edge = e.get_mut();
                edge.blend_weight(weight);
                edge.interaction_count += 1;
                edge.last_seen = now;
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(Edge::new(src, dst, weight, now));
                self.edge_count.fetch_add(1, Ordering::Relaxed);
                self.out_adjacency
                    .entry(src_key.clone())
                    .or_default()
                    .insert(dst_key.clone());
                self.in_adjacency
                    .entry(dst_key)
                    .or_default()
                    .insert(src_key);
            }
        }
    }

    /// Does a directed edge `src -> dst` exist?
    pub fn has_edge(&self, src: &NodeKey, dst: &NodeKey) -> bool {
        self.edges
            .contains_key(&(src.as_storage_key(), dst.as_storage_key()))
    }

    pub fn get_node(&self, key: &NodeKey) -> Option<Node> {
        self.nodes.get(&key.as_storage_key()).map(|n| n.clone())
    }

    /// Clamp to `[0,1]` and refresh `last_seen`.
    pub fn set_risk(&self, key: &NodeKey, risk: f64) {
        if let Some(mut node) = self.nodes.get_mut(&key.as_storage_key()) {
            node.set_risk(risk);
            node.last_seen = Utc::now();
        }
    }

    /// Neighbors of `key` in the given direction, with per-neighbor edge
    /// attributes. Ties are not ordered here; callers needing deterministic
    /// enumeration (the propagator) sort by node id themselves.
    pub fn neighbors(&self, key: &NodeKey, direction: Direction) -> Vec<Neighbor> {
        let storage_key = key.as_storage_key();
        let mut out = Vec::new();

        if matches!(direction, Direction::Out | Direction::Both) {
            if let Some(targets) = self.out_adjacency.get(&storage_key) {
                for target in targets.iter() {
                    if let Some(edge) = self.edges.get(&(storage_key.clone(), target.clone())) {
                        out.push(Neighbor {
                            key: edge.dst.clone(),
                            weight: edge.weight(),
                            interaction_count: edge.interaction_count,
                        });
                    }
                }
            }
        }

        if matches!(direction, Direction::In | Direction::Both) {
            if let Some(sources) = self.in_adjacency.get(&storage_key) {
                for source in sources.iter() {
                    if let Some(edge) = self.edges.get(&(source.clone(), storage_key.clone())) {
                        out.push(Neighbor {
                            key: edge.src.clone(),
                            weight: edge.weight(),
                            interaction_count: edge.interaction_count,
                        });
                    }
                }
            }
        }

        out
    }

    /// Cheap statistics: node count, edge count, counts per entity kind.
    pub fn snapshot(&self) -> GraphStats {
        let mut by_kind = std::collections::HashMap::new();
        for entry in self.nodes.iter() {
            *by_kind.entry(entry.key.kind.as_str().to_string()).or_insert(0u64) += 1;
        }
        GraphStats {
            node_count: self.node_count.load(Ordering::Relaxed),
            edge_count: self.edge_count.load(Ordering::Relaxed),
            nodes_by_kind: by_kind,
        }
    }

    /// Remove nodes whose `last_seen` is older than `horizon`, cascading to
    /// incident edges. Not part of the online hot path.
    pub fn prune(&self, horizon: chrono::Duration) {
        let cutoff = Utc::now() - horizon;
        let stale: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| n.last_seen < cutoff)
            .map(|n| n.key().clone())
            .collect();

        for storage_key in stale {
            self.nodes.remove(&storage_key);
            self.node_count.fetch_sub(1, Ordering::Relaxed);

            if let Some((_, targets)) = self.out_adjacency.remove(&storage_key) {
                for target in targets.iter() {
                    if self.edges.remove(&(storage_key.clone(), target.clone())).is_some() {
                        self.edge_count.fetch_sub(1, Ordering::Relaxed);
                    }
                    if let Some(mut sources) = self.in_adjacency.get_mut(&*target) {
                        sources.remove(&storage_key);
                    }
                }
            }
            if let Some((_, sources)) = self.in_adjacency.remove(&storage_key) {
                for source in sources.iter() {
                    if self.edges.remove(&(source.clone(), storage_key.clone())).is_some() {
                        self.edge_count.fetch_sub(1, Ordering::Relaxed);
                    }
                    if let Some(mut targets) = self.out_adjacency.get_mut(&*source) {
                        targets.remove(&storage_key);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> NodeKey {
        NodeKey::new(EntityKind::User, id)
    }
    fn device(id: &str) -> NodeKey {
        NodeKey::new(EntityKind::Device, id)
    }

    #[test]
    fn upsert_node_never_lowers_existing_risk() {
        let graph = GraphStore::new();
        graph.upsert_node(user("u1"), 0.8);
        graph.upsert_node(user("u1"), 0.1);
        assert_eq!(graph.get_node(&user("u1")).unwrap().risk(), 0.8);
    }

    #[test]
    fn upsert_node_bumps_interaction_count() {
        let graph = GraphStore::new();
        graph.upsert_node(user("u1"), 0.0);
        graph.upsert_node(user("u1"), 0.0);
        graph.upsert_node(user("u1"), 0.0);
        assert_eq!(graph.get_node(&user("u1")).unwrap().interaction_count, 3);
    }

    #[test]
    fn upsert_edge_creates_endpoints_and_is_directional() {
        let graph = GraphStore::new();
        graph.upsert_edge(user("u1"), device("d1"), 0.9);
        assert!(graph.has_edge(&user("u1"), &device("d1")));
        assert!(!graph.has_edge(&device("d1"), &user("u1")));
        assert_eq!(graph.snapshot().node_count, 2);
        assert_eq!(graph.snapshot().edge_count, 1);
    }

    #[test]
    fn reverse_neighbors_find_incoming_edges() {
        let graph = GraphStore::new();
        graph.upsert_edge(user("u1"), device("d1"), 0.9);
        graph.upsert_edge(user("u2"), device("d1"), 0.9);
        let users_of_d1 = graph.neighbors(&device("d1"), Direction::In);
        assert_eq!(users_of_d1.len(), 2);
    }

    #[test]
    fn upsert_edge_never_drops_interaction_count_below_one() {
        let graph = GraphStore::new();
        graph.upsert_edge(user("u1"), device("d1"), 0.5);
        graph.upsert_edge(user("u1"), device("d1"), 0.5);
        let neighbors = graph.neighbors(&user("u1"), Direction::Out);
        assert_eq!(neighbors[0].interaction_count, 2);
    }

    #[test]
    fn prune_removes_stale_nodes_and_incident_edges() {
        let graph = GraphStore::new();
        graph.upsert_edge(user("u1"), device("d1"), 0.5);
        graph.prune(chrono::Duration::seconds(-1));
        assert_eq!(graph.snapshot().node_count, 0);
        assert_eq!(graph.snapshot().edge_count, 0);
    }
}
