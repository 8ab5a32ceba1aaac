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

//! Age-weighted risk erosion, applied lazily just before a node takes part
//! in base-risk evaluation or propagation. There is no background sweeper.

use chrono::{DateTime, Utc};

use crate::entities::{Node, NodeKey};
use crate::graph::GraphStore;

#[derive(Debug, Clone)]
pub struct TimeDecay {
    pub decay_rate: f64,
    pub floor: f64,
}

impl Default for TimeDecay {
    fn default() -> Self {
        Self { decay_rate: 0.995, floor: 0.01 }
    }
}

impl TimeDecay {
    /// `decayed = max(risk * decay_rate ^ days_elapsed, floor)`.
    pub fn decay(&self, risk: f64, last_seen: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let elapsed = now.signed_duration_since(last_seen);
        let days = (elapsed.num_milliseconds() as f64 / 86_400_000.0).max(0.0);
        let decayed = risk * self.decay_rate.powf(days);
        decayed.max(self.floor)
    }

    /// Apply decay to `key` in place, against its *current* `last_seen`.
    /// Returns the node as it stands after decay, or `None` if it doesn't
    /// exist yet (nothing to erode on a node that's never been seen before).
    /// Callers must run this *before* upserting the node for the event in
    /// hand — upserting refreshes `last_seen` to `now`, which would make
    /// decay see zero elapsed time every time.
    pub fn apply(&self, graph: &GraphStore, key: &NodeKey, now: DateTime<Utc>) -> Option<Node> {
        let node = graph.get_node(key)?;
        let decayed = self.decay(node.risk(), node.last_seen, now);
        graph.set_risk(key, decayed);
        graph.get_node(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_elapsed_time_is_identity() {
        let decay = TimeDecay::default();
        let now = Utc::now();
        assert_eq!(decay.decay(0.8, now, now), 0.8);
    }

    #[test]
    fn decay_is_monotone_non_increasing_in_elapsed_time() {
        let decay = TimeDecay::default();
        let now = Utc::now();
        let one_day_ago = now - chrono::Duration::days(1);
        let ten_days_ago = now - chrono::Duration::days(10);
        let d1 = decay.decay(0.8, one_day_ago, now);
        let d10 = decay.decay(0.8, ten_days_ago, now);
        assert!(d10 <= d1);
    }

    #[test]
    fn decay_never_drops_below_the_floor() {
        let decay = TimeDecay::default();
        let now = Utc::now();
        let long_ago = now - chrono::Duration::days(10_000);
        assert_eq!(decay.decay(0.9, long_ago, now), decay.floor);
    }
}
