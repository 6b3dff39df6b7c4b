//! Out-of-band repair of like/dislike counters.
//!
//! Counters are recomputed from the vote maps of every user record and
//! overwritten wherever they drifted, e.g. after a vote batch failed midway.
//! Running it twice in a row is a no-op. Votes cast while the pass runs can be
//! overwritten by it, so schedule it when the vote path is quiet.

use super::get_tallies::read_tallies;
use crate::store::{Batch, DynKvStore};
use crate::user::{USER_PREFIX, UserRecord};
use crate::vote::{DISLIKES_PREFIX, LIKES_PREFIX, Tally, VoteType, dislikes_key, likes_key};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

const CHUNK_SIZE: usize = 100;

#[derive(Clone)]
pub struct ReconcileTalliesOperation {
    store: DynKvStore,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileTalliesOperationRequest {
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TallyDrift {
    pub item_key: String,
    pub stored: Tally,
    pub expected: Tally,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileTalliesOperationResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub users_scanned: usize,
    pub users_skipped: usize,
    pub items_checked: usize,
    pub drifts: Vec<TallyDrift>,
    pub applied: bool,
}

impl ReconcileTalliesOperation {
    pub fn new(store: DynKvStore) -> Self {
        Self { store }
    }

    pub async fn run(
        &self,
        request: ReconcileTalliesOperationRequest,
    ) -> Result<ReconcileTalliesOperationResult> {
        let started_at = Utc::now();

        let mut user_keys = self.store.scan_keys(&format!("{}:", USER_PREFIX)).await?;
        user_keys.sort();
        user_keys.dedup();

        let mut expected: BTreeMap<String, Tally> = BTreeMap::new();
        let mut users_skipped = 0usize;

        for chunk in user_keys.chunks(CHUNK_SIZE) {
            let records = self.store.mget(chunk).await?;
            for (key, raw) in chunk.iter().zip(records) {
                let Some(raw) = raw else {
                    continue;
                };

                let record = match UserRecord::decode(&raw) {
                    Ok(record) => record,
                    Err(error) => {
                        tracing::warn!("Skipping user record {}: {}", key, error);
                        users_skipped += 1;
                        continue;
                    }
                };

                for (item_key, vote) in record.votes {
                    let tally = expected.entry(item_key).or_default();
                    match vote {
                        VoteType::Like => tally.likes += 1,
                        VoteType::Dislike => tally.dislikes += 1,
                    }
                }
            }
        }

        for prefix in [LIKES_PREFIX, DISLIKES_PREFIX] {
            let counter_prefix = format!("{}:", prefix);
            for key in self.store.scan_keys(&counter_prefix).await? {
                if let Some(item_key) = key.strip_prefix(&counter_prefix) {
                    expected.entry(item_key.to_string()).or_default();
                }
            }
        }

        let items: Vec<String> = expected.keys().cloned().collect();
        let mut drifts = Vec::new();

        for chunk in items.chunks(CHUNK_SIZE) {
            let stored = read_tallies(&self.store, chunk).await?;
            for (item_key, stored) in chunk.iter().zip(stored) {
                let wanted = expected[item_key];
                if stored != wanted {
                    drifts.push(TallyDrift {
                        item_key: item_key.clone(),
                        stored,
                        expected: wanted,
                    });
                }
            }
        }

        let applied = !request.dry_run && !drifts.is_empty();
        if applied {
            for chunk in drifts.chunks(CHUNK_SIZE) {
                let mut batch = Batch::new();
                for drift in chunk {
                    if drift.stored.likes != drift.expected.likes {
                        batch.set(likes_key(&drift.item_key), drift.expected.likes.to_string());
                    }
                    if drift.stored.dislikes != drift.expected.dislikes {
                        batch.set(
                            dislikes_key(&drift.item_key),
                            drift.expected.dislikes.to_string(),
                        );
                    }
                }
                self.store.exec(batch).await?;
            }
        }

        for drift in &drifts {
            tracing::info!(
                "Counter drift item={} stored={}/{} expected={}/{} fixed={}",
                drift.item_key,
                drift.stored.likes,
                drift.stored.dislikes,
                drift.expected.likes,
                drift.expected.dislikes,
                applied
            );
        }

        Ok(ReconcileTalliesOperationResult {
            started_at,
            finished_at: Utc::now(),
            users_scanned: user_keys.len(),
            users_skipped,
            items_checked: items.len(),
            drifts,
            applied,
        })
    }
}
