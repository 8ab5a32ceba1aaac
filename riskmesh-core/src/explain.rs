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

//! Assembles the human-readable explanation that accompanies every score.
//! Does no graph work of its own; every input is already available from the
//! earlier stages of the pipeline.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approve,
    Review,
    Challenge,
}

impl Recommendation {
    pub fn from_score(score: f64) -> Self {
        if score < 0.3 {
            Recommendation::Approve
        } else if score < 0.6 {
            Recommendation::Review
        } else {
            Recommendation::Challenge
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base_risk: f64,
    pub after_propagation: f64,
    pub after_time_decay: f64,
    pub cluster_boost: f64,
    pub final_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub recommendation: Recommendation,
    pub reason: String,
    pub breakdown: ScoreBreakdown,
}

pub struct ExplainerInput<'a> {
    pub triggered_rules: &'a [&'static str],
    pub ring_member: bool,
    pub dense_member: bool,
    pub star_hub: bool,
    pub breakdown: ScoreBreakdown,
}

pub struct Explainer;

impl Explainer {
    /// Build the explanation from the already-computed inputs.
    pub fn explain(input: ExplainerInput<'_>) -> Explanation {
        let recommendation = Recommendation::from_score(input.breakdown.final_score);

        let mut factors = Vec::new();
        if !input.triggered_rules.is_empty() {
            factors.push(format!("rules: {}", input.triggered_rules.join(", ")));
        }
        if input.ring_member {
            factors.push("ring membership".to_string());
        }
        if input.dense_member {
            factors.push("dense cluster membership".to_string());
        }
        if input.star_hub {
            factors.push("hub of a star pattern".to_string());
        }
        if factors.is_empty() {
            factors.push("no elevated risk factors".to_string());
        }

        Explanation { recommendation, reason: factors.join("; "), breakdown: input.breakdown }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommendation_thresholds_match_the_boundaries() {
        assert_eq!(Recommendation::from_score(0.0), Recommendation::Approve);
        assert_eq!(Recommendation::from_score(0.29), Recommendation::Approve);
        assert_eq!(Recommendation::from_score(0.3), Recommendation::Review);
        assert_eq!(Recommendation::from_score(0.59), Recommendation::Review);
        assert_eq!(Recommendation::from_score(0.6), Recommendation::Challenge);
        assert_eq!(Recommendation::from_score(1.0), Recommendation::Challenge);
    }

    #[test]
    fn reason_names_triggered_rules_and_cluster_membership() {
        let explanation = Explainer::explain(ExplainerInput {
            triggered_rules: &["high_amount", "new_device"],
            ring_member: true,
            dense_member: false,
            star_hub: false,
            breakdown: ScoreBreakdown { final_score: 0.7, ..Default::default() },
        });
        assert!(explanation.reason.contains("high_amount"));
        assert!(explanation.reason.contains("ring membership"));
        assert_eq!(explanation.recommendation, Recommendation::Challenge);
    }

    #[test]
    fn no_factors_still_produces_a_reason() {
        let explanation = Explainer::explain(ExplainerInput {
            triggered_rules: &[],
            ring_member: false,
            dense_member: false,
            star_hub: false,
            breakdown: ScoreBreakdown::default(),
        });
        assert_eq!(explanation.reason, "no elevated risk factors");
    }
}
