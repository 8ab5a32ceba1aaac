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

//! Read-only analytics over the durable sink's stored rows. Never touches
//! the graph; these queries only ever read what has already been written
//! to the transaction log.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use riskmesh_core::TransactionRecord;

const FLAGGED_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Serialize)]
pub struct RiskHistogramBucket {
    pub range_start: f64,
    pub range_end: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopRiskyUser {
    pub user_id: String,
    pub latest_risk: f64,
    pub event_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub user_id: String,
    pub event_count: u64,
    pub total_volume: f64,
    pub distinct_devices: u64,
    pub distinct_ips: u64,
    pub flagged_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub event_count: u64,
    pub flag_rate: f64,
    pub average_latency_ms: f64,
    pub average_propagation_depth: f64,
}

/// Ten equal-width buckets spanning [0,1].
pub fn risk_histogram(rows: &[TransactionRecord]) -> Vec<RiskHistogramBucket> {
    const BUCKETS: usize = 10;
    let mut counts = vec![0u64; BUCKETS];
    for row in rows {
        let idx = ((row.final_risk.clamp(0.0, 1.0) * BUCKETS as f64) as usize).min(BUCKETS - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| RiskHistogramBucket {
            range_start: i as f64 / BUCKETS as f64,
            range_end: (i + 1) as f64 / BUCKETS as f64,
            count,
        })
        .collect()
}

/// The `limit` users with the highest most-recent recorded risk score,
/// highest first.
pub fn top_risky_users(rows: &[TransactionRecord], limit: usize) -> Vec<TopRiskyUser> {
    let mut latest: HashMap<&str, (f64, u64)> = HashMap::new();
    for row in rows {
        let entry = latest.entry(row.user_id.as_str()).or_insert((0.0, 0));
        entry.0 = row.final_risk;
        entry.1 += 1;
    }
    let mut users: Vec<TopRiskyUser> = latest
        .into_iter()
        .map(|(user_id, (latest_risk, event_count))| TopRiskyUser { user_id: user_id.to_string(), latest_risk, event_count })
        .collect();
    users.sort_by(|a, b| b.latest_risk.partial_cmp(&a.latest_risk).unwrap_or(std::cmp::Ordering::Equal));
    users.truncate(limit);
    users
}

pub fn user_profile(rows: &[TransactionRecord], user_id: &str) -> Option<UserProfile> {
    let mut devices = HashSet::new();
    let mut ips = HashSet::new();
    let mut event_count = 0u64;
    let mut total_volume = 0.0;
    let mut flagged_count = 0u64;

    for row in rows.iter().filter(|r| r.user_id == user_id) {
        event_count += 1;
        total_volume += row.transaction_amount;
        devices.insert(row.device_id.as_str());
        ips.insert(row.ip_address.as_str());
        if row.final_risk >= FLAGGED_THRESHOLD {
            flagged_count += 1;
        }
    }

    if event_count == 0 {
        return None;
    }

    Some(UserProfile {
        user_id: user_id.to_string(),
        event_count,
        total_volume,
        distinct_devices: devices.len() as u64,
        distinct_ips: ips.len() as u64,
        flagged_count,
    })
}

pub fn performance_summary(rows: &[TransactionRecord]) -> PerformanceSummary {
    let event_count = rows.len() as u64;
    if event_count == 0 {
        return PerformanceSummary {
            event_count: 0,
            flag_rate: 0.0,
            average_latency_ms: 0.0,
            average_propagation_depth: 0.0,
        };
    }
    let flagged = rows.iter().filter(|r| r.final_risk >= FLAGGED_THRESHOLD).count() as f64;
    let depth_sum: u64 = rows.iter().map(|r| r.propagation_depth as u64).sum();
    let latency_sum: f64 = rows.iter().map(|r| r.latency_ms).sum();
    PerformanceSummary {
        event_count,
        flag_rate: flagged / event_count as f64,
        average_latency_ms: latency_sum / event_count as f64,
        average_propagation_depth: depth_sum as f64 / event_count as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(user_id: &str, device_id: &str, risk: f64, depth: u32) -> TransactionRecord {
        TransactionRecord {
            event_id: "e".into(),
            user_id: user_id.into(),
            device_id: device_id.into(),
            ip_address: "i1".into(),
            merchant_id: "m1".into(),
            transaction_amount: 100.0,
            final_risk: risk,
            propagation_depth: depth,
            timestamp: Utc::now(),
            latency_ms: 10.0,
        }
    }

    #[test]
    fn histogram_buckets_sum_to_total_row_count() {
        let rows = vec![row("u1", "d1", 0.05, 0), row("u1", "d1", 0.95, 1), row("u2", "d1", 0.5, 1)];
        let hist = risk_histogram(&rows);
        assert_eq!(hist.len(), 10);
        assert_eq!(hist.iter().map(|b| b.count).sum::<u64>(), 3);
    }

    #[test]
    fn top_risky_users_orders_by_latest_score_descending() {
        let rows = vec![row("u1", "d1", 0.2, 0), row("u2", "d1", 0.9, 0), row("u1", "d1", 0.3, 0)];
        let top = top_risky_users(&rows, 2);
        assert_eq!(top[0].user_id, "u2");
        assert_eq!(top[1].user_id, "u1");
        assert_eq!(top[1].latest_risk, 0.3);
    }

    #[test]
    fn user_profile_aggregates_distinct_devices_and_flags() {
        let rows = vec![row("u1", "d1", 0.8, 0), row("u1", "d2", 0.1, 0), row("u2", "d3", 0.9, 0)];
        let profile = user_profile(&rows, "u1").unwrap();
        assert_eq!(profile.event_count, 2);
        assert_eq!(profile.distinct_devices, 2);
        assert_eq!(profile.flagged_count, 1);
    }

    #[test]
    fn unknown_user_profile_is_none() {
        let rows = vec![row("u1", "d1", 0.1, 0)];
        assert!(user_profile(&rows, "ghost").is_none());
    }

    #[test]
    fn performance_summary_computes_flag_rate_and_average_depth() {
        let rows = vec![row("u1", "d1", 0.9, 2), row("u2", "d1", 0.1, 0)];
        let summary = performance_summary(&rows);
        assert_eq!(summary.event_count, 2);
        assert!((summary.flag_rate - 0.5).abs() < 1e-9);
        assert!((summary.average_propagation_depth - 1.0).abs() < 1e-9);
        assert!((summary.average_latency_ms - 10.0).abs() < 1e-9);
    }
}
