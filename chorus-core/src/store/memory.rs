use super::{Batch, BatchOp, BatchOutcome, BatchReply, KvStore};
use crate::{ChorusError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Process-local store with the same semantics as the redis backend.
///
/// Used by tests and by `backend: memory` for local runs. Counts round trips
/// and can be told to fail a batch midway, which is how partial application
/// is exercised.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    round_trips: AtomicUsize,
    fail_batch_after: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// The next batch applies its first `applied` operations, then fails.
    pub async fn fail_next_batch_after(&self, applied: usize) {
        *self.fail_batch_after.lock().await = Some(applied);
    }

    fn trip(&self) {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
    }
}

fn add(entries: &mut BTreeMap<String, String>, key: &str, delta: i64) -> Result<i64> {
    let current = match entries.get(key) {
        Some(value) => value.parse::<i64>().map_err(|_| {
            ChorusError::Store(format!("value at {} is not an integer", key))
        })?,
        None => 0,
    };

    let next = current
        .checked_add(delta)
        .ok_or_else(|| ChorusError::Store(format!("increment or decrement would overflow {}", key)))?;
    entries.insert(key.to_string(), next.to_string());
    Ok(next)
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.trip();
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.trip();
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.trip();
        add(&mut *self.entries.lock().await, key, 1)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        self.trip();
        add(&mut *self.entries.lock().await, key, -1)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.trip();
        let entries = self.entries.lock().await;
        Ok(keys.iter().map(|key| entries.get(key).cloned()).collect())
    }

    async fn exec(&self, batch: Batch) -> Result<BatchOutcome> {
        self.trip();
        let fail_after = self.fail_batch_after.lock().await.take();
        let mut entries = self.entries.lock().await;

        if let Some(guard) = batch.guard_condition() {
            if entries.get(&guard.key) != guard.expected.as_ref() {
                return Ok(BatchOutcome::Rejected);
            }
        }

        let mut replies = Vec::with_capacity(batch.len());
        for (index, op) in batch.ops().iter().enumerate() {
            if fail_after == Some(index) {
                return Err(ChorusError::Store(format!(
                    "batch aborted after {} of {} operations",
                    index,
                    batch.len()
                )));
            }

            let reply = match op {
                BatchOp::Incr(key) => BatchReply::Int(add(&mut entries, key, 1)?),
                BatchOp::Decr(key) => BatchReply::Int(add(&mut entries, key, -1)?),
                BatchOp::Set(key, value) => {
                    entries.insert(key.clone(), value.clone());
                    BatchReply::Ok
                }
            };
            replies.push(reply);
        }

        Ok(BatchOutcome::Applied(replies))
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.trip();
        let entries = self.entries.lock().await;
        Ok(entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
