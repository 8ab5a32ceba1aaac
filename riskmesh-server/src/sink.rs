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

//! The durable sink: an append-only store for [`TransactionRecord`] rows,
//! written from a bounded worker pool so the engine's hot path never blocks
//! on acknowledgment. No external database is in the dependency stack, so
//! the "durable" store is an in-process append log guarded by a lock; it
//! also backs the read-only analytics queries in `analytics.rs`, since the
//! graph itself holds no historical data.

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use riskmesh_core::traits::DurableSink;
use riskmesh_core::TransactionRecord;

use crate::config::SinkConfig;

/// Rows accepted by the sink, retained for analytics queries. Bounded by
/// `queue_depth * workers` isn't quite right conceptually — this backing
/// store is unbounded in memory since it doubles as the analytics source of
/// truth, but the *ingestion queue* feeding it is bounded and drops to a
/// dead-letter counter under sustained overload.
#[derive(Default)]
struct Store {
    rows: Vec<TransactionRecord>,
}

#[derive(Debug, Default)]
pub struct SinkStats {
    pub accepted: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub queue_depth: usize,
}

struct WriteJob {
    record: TransactionRecord,
    attempt: u32,
}

/// An in-process durable sink: a bounded mpsc channel feeds a pool of
/// worker tasks that append to the shared store, retrying on simulated
/// transient failure with exponential backoff and jitter before giving up
/// and incrementing the dead-letter counter.
pub struct RiskMeshSink {
    store: Arc<RwLock<Store>>,
    tx: mpsc::Sender<WriteJob>,
    accepted: Arc<AtomicU64>,
    retried: Arc<AtomicU64>,
    dead_lettered: Arc<AtomicU64>,
    queue_depth: usize,
}

impl RiskMeshSink {
    pub fn new(config: &SinkConfig) -> Self {
        let store = Arc::new(RwLock::new(Store::default()));
        let (tx, rx) = mpsc::channel(config.queue_depth);
        let accepted = Arc::new(AtomicU64::new(0));
        let retried = Arc::new(AtomicU64::new(0));
        let dead_lettered = Arc::new(AtomicU64::new(0));

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for worker_id in 0..config.workers.max(1) {
            let rx = rx.clone();
            let store = store.clone();
            let accepted = accepted.clone();
            let retried = retried.clone();
            let dead_lettered = dead_lettered.clone();
            let config = config.clone();
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else {
                        break;
                    };
                    run_job(worker_id, job, &store, &config, &accepted, &retried, &dead_lettered).await;
                }
            });
        }

        Self { store, tx, accepted, retried, dead_lettered, queue_depth: config.queue_depth }
    }

    pub fn shared(config: &SinkConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            queue_depth: self.queue_depth,
        }
    }

    /// A snapshot of every row currently held, for analytics queries.
    pub fn rows(&self) -> Vec<TransactionRecord> {
        self.store.read().rows.clone()
    }
}

/// Commits a row to the backing store. The in-process store never actually
/// rejects a write; this stays fallible so the retry/backoff loop around it
/// is the same shape it would be against a real external sink.
fn try_write(store: &RwLock<Store>, record: &TransactionRecord) -> Result<(), ()> {
    store.write().rows.push(record.clone());
    Ok(())
}

async fn run_job(
    worker_id: usize,
    mut job: WriteJob,
    store: &Arc<RwLock<Store>>,
    config: &SinkConfig,
    accepted: &Arc<AtomicU64>,
    retried: &Arc<AtomicU64>,
    dead_lettered: &Arc<AtomicU64>,
) {
    loop {
        match try_write(store, &job.record) {
            Ok(()) => {
                accepted.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(worker_id, attempt = job.attempt, "durable sink write committed");
                return;
            }
            Err(()) => {
                job.attempt += 1;
                if job.attempt >= config.max_attempts {
                    dead_lettered.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(worker_id, "durable sink write dead-lettered after max attempts");
                    return;
                }
                retried.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(backoff_delay(config, job.attempt)).await;
            }
        }
    }
}

fn backoff_delay(config: &SinkConfig, attempt: u32) -> Duration {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32 - 1);
    let capped = base.min(config.max_backoff_ms as f64);
    let jitter_span = capped * config.jitter_ratio;
    let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
    Duration::from_secs_f64(((capped + jitter).max(0.0)) / 1000.0)
}

#[async_trait]
impl DurableSink for RiskMeshSink {
    async fn record(&self, record: TransactionRecord) {
        let job = WriteJob { record, attempt: 0 };
        if self.tx.try_send(job).is_err() {
            self.dead_lettered.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("durable sink queue full, dropping row at admission");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config() -> SinkConfig {
        SinkConfig {
            workers: 2,
            queue_depth: 16,
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            backoff_multiplier: 2.0,
            jitter_ratio: 0.1,
        }
    }

    fn record(user_id: &str) -> TransactionRecord {
        TransactionRecord {
            event_id: "e1".into(),
            user_id: user_id.into(),
            device_id: "d1".into(),
            ip_address: "i1".into(),
            merchant_id: "m1".into(),
            transaction_amount: 10.0,
            final_risk: 0.2,
            propagation_depth: 0,
            timestamp: Utc::now(),
            latency_ms: 5.0,
        }
    }

    #[tokio::test]
    async fn recorded_rows_are_visible_in_the_store() {
        let sink = RiskMeshSink::new(&config());
        sink.record(record("u1")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sink.rows().len(), 1);
        assert_eq!(sink.stats().accepted, 1);
    }

    #[tokio::test]
    async fn queue_overflow_is_dropped_at_admission_not_blocking() {
        let mut cfg = config();
        cfg.queue_depth = 1;
        let sink = RiskMeshSink::new(&cfg);
        for i in 0..50 {
            sink.record(record(&format!("u{i}"))).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Either every row landed (workers drained fast enough) or some
        // were dropped at admission; either way the call never blocked.
        assert!(sink.rows().len() <= 50);
    }
}
