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

//! Topological fraud-pattern detection: rings (SCCs), dense subgraphs, and
//! star patterns, run over the induced 2-hop neighborhood of an event's
//! nodes so cost stays bounded regardless of overall graph size.

use std::collections::{HashMap, HashSet};

use crate::entities::{Direction, NodeKey};
use crate::graph::GraphStore;

#[derive(Debug, Clone)]
pub struct ClusteringConfig {
    pub ring_min_size: usize,
    pub ring_boost: f64,
    pub dense_min_size: usize,
    pub dense_ratio_threshold: f64,
    pub dense_boost: f64,
    pub star_degree_threshold: usize,
    pub star_boost: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            ring_min_size: 3,
            ring_boost: 0.15,
            dense_min_size: 4,
            dense_ratio_threshold: 1.5,
            dense_boost: 0.10,
            star_degree_threshold: 10,
            star_boost: 0.10,
        }
    }
}

/// A detected cluster, with the node ids that belong to it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ClusterMembers {
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ClusteringInfo {
    pub rings: Vec<ClusterMembers>,
    pub dense_subgraphs: Vec<ClusterMembers>,
    pub star_patterns: Vec<ClusterMembers>,
}

/// A minimal directed adjacency view, local to one detection call, built
/// from the induced 2-hop subgraph rather than the whole `GraphStore`.
struct InducedSubgraph {
    nodes: Vec<NodeKey>,
    out_edges: Vec<Vec<usize>>,
    in_edges: Vec<Vec<usize>>,
}

pub struct ClusteringDetector {
    config: ClusteringConfig,
}

impl ClusteringDetector {
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Build the induced subgraph over the union of the 2-hop neighborhoods
    /// of `seeds` (both directions, since a ring or hub can be reached
    /// either way from the event's nodes).
    fn induced_subgraph(&self, graph: &GraphStore, seeds: &[NodeKey]) -> InducedSubgraph {
        let mut frontier: HashSet<NodeKey> = seeds.iter().cloned().collect();
        let mut all: HashSet<NodeKey> = frontier.clone();

        for _ in 0..2 {
            let mut next = HashSet::new();
            for node in &frontier {
                for neighbor in graph.neighbors(node, Direction::Both) {
                    if all.insert(neighbor.key.clone()) {
                        next.insert(neighbor.key);
                    }
                }
            }
            frontier = next;
        }

        let mut nodes: Vec<NodeKey> = all.into_iter().collect();
        nodes.sort_by(|a, b| a.as_storage_key().cmp(&b.as_storage_key()));
        let index_of: HashMap<NodeKey, usize> =
            nodes.iter().enumerate().map(|(i, k)| (k.clone(), i)).collect();

        let mut out_edges = vec![Vec::new(); nodes.len()];
        let mut in_edges = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for neighbor in graph.neighbors(node, Direction::Out) {
                if let Some(&j) = index_of.get(&neighbor.key) {
                    out_edges[i].push(j);
                    in_edges[j].push(i);
                }
            }
        }

        InducedSubgraph { nodes, out_edges, in_edges }
    }

    /// Tarjan's strongly connected components, restricted to `sub`.
    fn strongly_connected_components(&self, sub: &InducedSubgraph) -> Vec<Vec<usize>> {
        struct State {
            index: Vec<Option<u32>>,
            lowlink: Vec<u32>,
            on_stack: Vec<bool>,
            stack: Vec<usize>,
            next_index: u32,
            components: Vec<Vec<usize>>,
        }

        fn strongconnect(v: usize, sub: &InducedSubgraph, st: &mut State) {
            st.index[v] = Some(st.next_index);
            st.lowlink[v] = st.next_index;
            st.next_index += 1;
            st.stack.push(v);
            st.on_stack[v] = true;

            for &w in &sub.out_edges[v] {
                if st.index[w].is_none() {
                    strongconnect(w, sub, st);
                    st.lowlink[v] = st.lowlink[v].min(st.lowlink[w]);
                } else if st.on_stack[w] {
                    st.lowlink[v] = st.lowlink[v].min(st.index[w].unwrap());
                }
            }

            if st.lowlink[v] == st.index[v].unwrap() {
                let mut component = Vec::new();
                loop {
                    let w = st.stack.pop().unwrap();
                    st.on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                st.components.push(component);
            }
        }

        let n = sub.nodes.len();
        let mut st = State {
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next_index: 0,
            components: Vec::new(),
        };

        for v in 0..n {
            if st.index[v].is_none() {
                strongconnect(v, sub, &mut st);
            }
        }
        st.components
    }

    /// Undirected connected components (edges treated as bidirectional),
    /// used for density detection.
    fn connected_components(&self, sub: &InducedSubgraph) -> Vec<Vec<usize>> {
        let n = sub.nodes.len();
        let mut seen = vec![false; n];
        let mut components = Vec::new();

        for start in 0..n {
            if seen[start] {
                continue;
            }
            let mut stack = vec![start];
            seen[start] = true;
            let mut component = Vec::new();
            while let Some(v) = stack.pop() {
                component.push(v);
                for &w in sub.out_edges[v].iter().chain(sub.in_edges[v].iter()) {
                    if !seen[w] {
                        seen[w] = true;
                        stack.push(w);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    fn to_members(&self, sub: &InducedSubgraph, indices: &[usize]) -> ClusterMembers {
        let mut members: Vec<String> =
            indices.iter().map(|&i| sub.nodes[i].as_storage_key()).collect();
        members.sort();
        ClusterMembers { members }
    }

    /// Detect rings, dense subgraphs, and star patterns around `seeds`.
    /// Returns the per-node boost (the max of whichever detectors fired for
    /// that node, never the sum) and the explanation payload.
    pub fn detect(
        &self,
        graph: &GraphStore,
        seeds: &[NodeKey],
    ) -> (HashMap<NodeKey, f64>, ClusteringInfo) {
        let sub = self.induced_subgraph(graph, seeds);
        let mut boosts: HashMap<NodeKey, f64> = HashMap::new();
        let mut info = ClusteringInfo::default();

        for component in self.strongly_connected_components(&sub) {
            if component.len() >= self.config.ring_min_size {
                info.rings.push(self.to_members(&sub, &component));
                for &i in &component {
                    let key = sub.nodes[i].clone();
                    let entry = boosts.entry(key).or_insert(0.0);
                    *entry = entry.max(self.config.ring_boost);
                }
            }
        }

        for component in self.connected_components(&sub) {
            let node_count = component.len();
            if node_count < self.config.dense_min_size {
                continue;
            }
            let edge_count: usize = component
                .iter()
                .map(|&i| sub.out_edges[i].iter().filter(|&&j| component.contains(&j)).count())
                .sum();
            let ratio = edge_count as f64 / node_count as f64;
            if ratio >= self.config.dense_ratio_threshold {
                info.dense_subgraphs.push(self.to_members(&sub, &component));
                for &i in &component {
                    let key = sub.nodes[i].clone();
                    let entry = boosts.entry(key).or_insert(0.0);
                    *entry = entry.max(self.config.dense_boost);
                }
            }
        }

        for (i, node) in sub.nodes.iter().enumerate() {
            let degree = sub.out_edges[i].len() + sub.in_edges[i].len();
            if degree > self.config.star_degree_threshold {
                let spokes: HashSet<usize> =
                    sub.out_edges[i].iter().chain(sub.in_edges[i].iter()).copied().collect();
                let spokes_mutually_connected = spokes.iter().any(|&a| {
                    spokes.iter().any(|&b| {
                        a != b
                            && (sub.out_edges[a].contains(&b) || sub.out_edges[b].contains(&a))
                    })
                });
                if !spokes_mutually_connected {
                    let mut members = vec![i];
                    members.extend(spokes.iter().copied());
                    info.star_patterns.push(self.to_members(&sub, &members));
                    let entry = boosts.entry(node.clone()).or_insert(0.0);
                    *entry = entry.max(self.config.star_boost);
                }
            }
        }

        (boosts, info)
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
    fn ring_of_three_users_through_shared_device_and_ip_is_detected() {
        let graph = GraphStore::new();
        let u1 = key(EntityKind::User, "u1");
        let u2 = key(EntityKind::User, "u2");
        let u3 = key(EntityKind::User, "u3");
        let d1 = key(EntityKind::Device, "d1");
        let i1 = key(EntityKind::Ip, "i1");
        // A cycle: u1 -> d1 -> u2 -> i1 -> u3 -> d1 ... construct edges that
        // close a directed cycle among the five nodes.
        graph.upsert_edge(u1.clone(), d1.clone(), 1.0);
        graph.upsert_edge(d1.clone(), u2.clone(), 1.0);
        graph.upsert_edge(u2.clone(), i1.clone(), 1.0);
        graph.upsert_edge(i1.clone(), u3.clone(), 1.0);
        graph.upsert_edge(u3.clone(), u1.clone(), 1.0);

        let detector = ClusteringDetector::new(ClusteringConfig::default());
        let (boosts, info) = detector.detect(&graph, &[u1.clone()]);
        assert!(!info.rings.is_empty());
        assert_eq!(boosts.get(&u1), Some(&0.15));
    }

    #[test]
    fn boost_per_node_is_capped_at_the_single_largest_applicable_boost() {
        let graph = GraphStore::new();
        let u1 = key(EntityKind::User, "u1");
        let u2 = key(EntityKind::User, "u2");
        graph.upsert_edge(u1.clone(), u2.clone(), 1.0);
        graph.upsert_edge(u2.clone(), u1.clone(), 1.0);

        let detector = ClusteringDetector::new(ClusteringConfig {
            ring_min_size: 2,
            ..ClusteringConfig::default()
        });
        let (boosts, _) = detector.detect(&graph, &[u1.clone()]);
        for boost in boosts.values() {
            assert!(*boost <= 0.15);
        }
    }

    #[test]
    fn no_pattern_yields_no_boost() {
        let graph = GraphStore::new();
        let u1 = key(EntityKind::User, "u1");
        let d1 = key(EntityKind::Device, "d1");
        graph.upsert_edge(u1.clone(), d1.clone(), 1.0);
        let detector = ClusteringDetector::new(ClusteringConfig::default());
        let (boosts, info) = detector.detect(&graph, &[u1]);
        assert!(boosts.is_empty());
        assert!(info.rings.is_empty());
        assert!(info.dense_subgraphs.is_empty());
        assert!(info.star_patterns.is_empty());
    }
}
