use super::get_tallies::read_tallies;
use crate::store::{Batch, BatchOutcome, DynKvStore};
use crate::user::{UserRecord, user_key};
use crate::vote::{CounterStep, ItemKey, Tally, VoteTransition, VoteType};
use crate::{ChorusError, Result};
use serde::{Deserialize, Serialize};

/// How the user-record write is protected against a concurrent vote by the
/// same user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyMode {
    /// The batch only applies if the user record is unchanged since it was
    /// read; the losing request gets `Conflict`.
    #[default]
    Optimistic,
    /// Unconditional write. Two racing votes can lose one user-record
    /// update while both counter mutations land.
    LastWriterWins,
}

#[derive(Clone)]
pub struct CastVoteOperation {
    store: DynKvStore,
    mode: ConsistencyMode,
}

#[derive(Debug, Clone)]
pub struct CastVoteOperationRequest {
    pub user_id: String,
    pub item_key: ItemKey,
    pub vote_type: VoteType,
}

impl CastVoteOperationRequest {
    /// Identity is checked before the payload, and neither check touches the store.
    pub fn parse(
        user_id: Option<String>,
        item_type: Option<&str>,
        item_id: Option<&str>,
        vote_type: Option<&str>,
    ) -> Result<Self> {
        let user_id = user_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(ChorusError::Unauthorized)?;

        let item_type =
            item_type.ok_or_else(|| ChorusError::BadRequest("itemType is required".to_string()))?;
        let item_id =
            item_id.ok_or_else(|| ChorusError::BadRequest("itemId is required".to_string()))?;
        let vote_type =
            vote_type.ok_or_else(|| ChorusError::BadRequest("voteType is required".to_string()))?;

        Ok(Self {
            user_id,
            item_key: ItemKey::new(item_type, item_id)?,
            vote_type: vote_type.parse()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CastVoteOperationResult {
    pub tally: Tally,
    pub vote: Option<VoteType>,
}

impl CastVoteOperation {
    pub fn new(store: DynKvStore, mode: ConsistencyMode) -> Self {
        Self { store, mode }
    }

    pub async fn run(&self, request: CastVoteOperationRequest) -> Result<CastVoteOperationResult> {
        let CastVoteOperationRequest {
            user_id,
            item_key,
            vote_type,
        } = request;

        let user_key = user_key(&user_id);
        let raw = self
            .store
            .get(&user_key)
            .await?
            .ok_or(ChorusError::Unauthorized)?;

        let mut record = UserRecord::decode(&raw)?;
        let transition = VoteTransition::plan(record.current_vote(&item_key), vote_type);
        record.apply(&item_key, &transition);

        let mut batch = Batch::new();
        if self.mode == ConsistencyMode::Optimistic {
            batch.guard(user_key.as_str(), Some(raw));
        }
        for step in transition.counter_steps() {
            match step {
                CounterStep::Increment(vote) => batch.incr(vote.counter_key(item_key.as_str())),
                CounterStep::Decrement(vote) => batch.decr(vote.counter_key(item_key.as_str())),
            };
        }
        batch.set(user_key.as_str(), record.encode()?);

        tracing::debug!(
            "vote user={} item={} {:?} -> {:?} ops={}",
            user_id,
            item_key,
            transition.previous,
            transition.next,
            batch.len()
        );

        match self.store.exec(batch).await {
            Ok(BatchOutcome::Applied(_)) => {}
            Ok(BatchOutcome::Rejected) => {
                tracing::warn!(
                    "Concurrent update of user {} while voting on {}; vote rejected",
                    user_id,
                    item_key
                );
                return Err(ChorusError::Conflict(
                    "user record changed concurrently, retry the vote".to_string(),
                ));
            }
            Err(error) => {
                // A prefix of the batch may have been applied; reconciliation repairs counters.
                tracing::error!(
                    "Vote batch failed. user={} item={} error={}",
                    user_id,
                    item_key,
                    error
                );
                return Err(error);
            }
        }

        let tally = read_tallies(&self.store, &[item_key.to_string()])
            .await?
            .pop()
            .unwrap_or_default();

        Ok(CastVoteOperationResult {
            tally,
            vote: transition.next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BatchOutcome, KvStore, MemoryStore};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn seed_user(store: &MemoryStore, user_id: &str) {
        let record = UserRecord::new(user_id);
        store
            .set(&user_key(user_id), &record.encode().unwrap())
            .await
            .unwrap();
    }

    async fn stored_record(store: &MemoryStore, user_id: &str) -> UserRecord {
        let raw = store.get(&user_key(user_id)).await.unwrap().unwrap();
        UserRecord::decode(&raw).unwrap()
    }

    fn vote(user_id: &str, item: &ItemKey, vote_type: VoteType) -> CastVoteOperationRequest {
        CastVoteOperationRequest {
            user_id: user_id.to_string(),
            item_key: item.clone(),
            vote_type,
        }
    }

    #[tokio::test]
    async fn test_like_switch_undo_scenario() {
        let store = Arc::new(MemoryStore::new());
        seed_user(&store, "u1").await;
        let operation = CastVoteOperation::new(store.clone(), ConsistencyMode::Optimistic);
        let track = ItemKey::new("track", "42").unwrap();

        let result = operation.run(vote("u1", &track, VoteType::Like)).await.unwrap();
        assert_eq!(result.tally, Tally { likes: 1, dislikes: 0 });
        assert_eq!(result.vote, Some(VoteType::Like));

        let result = operation.run(vote("u1", &track, VoteType::Dislike)).await.unwrap();
        assert_eq!(result.tally, Tally { likes: 0, dislikes: 1 });

        let result = operation.run(vote("u1", &track, VoteType::Dislike)).await.unwrap();
        assert_eq!(result.tally, Tally { likes: 0, dislikes: 0 });
        assert_eq!(result.vote, None);
        assert!(!stored_record(&store, "u1").await.votes.contains_key("track:42"));
    }

    #[tokio::test]
    async fn test_double_like_restores_baseline() {
        let store = Arc::new(MemoryStore::new());
        seed_user(&store, "u1").await;
        store.set("likes:artist:7", "5").await.unwrap();
        store.set("dislikes:artist:7", "2").await.unwrap();

        let operation = CastVoteOperation::new(store.clone(), ConsistencyMode::Optimistic);
        let artist = ItemKey::new("artist", "7").unwrap();

        operation.run(vote("u1", &artist, VoteType::Like)).await.unwrap();
        let result = operation.run(vote("u1", &artist, VoteType::Like)).await.unwrap();

        assert_eq!(result.tally, Tally { likes: 5, dislikes: 2 });
        assert!(stored_record(&store, "u1").await.votes.is_empty());
    }

    #[tokio::test]
    async fn test_net_delta_matches_final_state() {
        let store = Arc::new(MemoryStore::new());
        let operation = CastVoteOperation::new(store.clone(), ConsistencyMode::Optimistic);
        let item = ItemKey::new("track", "7").unwrap();

        // Fixed LCG so every run walks the same paths.
        let mut seed: u64 = 0x2545_f491;
        for user in 0..24 {
            let user_id = format!("u{}", user);
            seed_user(&store, &user_id).await;

            let before = read_tallies(&(store.clone() as DynKvStore), &[item.to_string()])
                .await
                .unwrap()[0];

            let steps = 1 + user % 9;
            let mut last = None;
            for _ in 0..steps {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let requested = if seed >> 63 == 0 {
                    VoteType::Like
                } else {
                    VoteType::Dislike
                };
                last = operation.run(vote(&user_id, &item, requested)).await.unwrap().vote;
            }

            let after = read_tallies(&(store.clone() as DynKvStore), &[item.to_string()])
                .await
                .unwrap()[0];
            let expected = match last {
                Some(VoteType::Like) => (1, 0),
                Some(VoteType::Dislike) => (0, 1),
                None => (0, 0),
            };
            assert_eq!(
                (after.likes - before.likes, after.dislikes - before.dislikes),
                expected
            );
            assert_eq!(
                stored_record(&store, &user_id).await.current_vote(&item),
                last
            );
        }
    }

    #[tokio::test]
    async fn test_returns_stored_counts_not_local_arithmetic() {
        let store = Arc::new(MemoryStore::new());
        seed_user(&store, "u1").await;
        store.set("likes:track:1", "10").await.unwrap();

        let operation = CastVoteOperation::new(store.clone(), ConsistencyMode::LastWriterWins);
        let item = ItemKey::new("track", "1").unwrap();
        let result = operation.run(vote("u1", &item, VoteType::Like)).await.unwrap();
        assert_eq!(result.tally, Tally { likes: 11, dislikes: 0 });
    }

    #[tokio::test]
    async fn test_unknown_user_is_unauthorized() {
        let store = Arc::new(MemoryStore::new());
        let operation = CastVoteOperation::new(store.clone(), ConsistencyMode::Optimistic);
        let item = ItemKey::new("track", "1").unwrap();

        let result = operation.run(vote("ghost", &item, VoteType::Like)).await;
        assert!(matches!(result, Err(ChorusError::Unauthorized)));
        assert_eq!(store.get("likes:track:1").await.unwrap(), None);
    }

    #[test]
    fn test_parse_checks_identity_first() {
        assert!(matches!(
            CastVoteOperationRequest::parse(None, None, None, None),
            Err(ChorusError::Unauthorized)
        ));
        assert!(matches!(
            CastVoteOperationRequest::parse(Some("u1".into()), Some("track"), None, Some("like")),
            Err(ChorusError::BadRequest(_))
        ));
        assert!(matches!(
            CastVoteOperationRequest::parse(Some("u1".into()), Some("track"), Some("1"), None),
            Err(ChorusError::BadRequest(_))
        ));

        let request =
            CastVoteOperationRequest::parse(Some("u1".into()), Some("track"), Some("1"), Some("dislike"))
                .unwrap();
        assert_eq!(request.item_key.as_str(), "track:1");
        assert_eq!(request.vote_type, VoteType::Dislike);
    }

    #[tokio::test]
    async fn test_failed_batch_is_reported() {
        let store = Arc::new(MemoryStore::new());
        seed_user(&store, "u1").await;
        let operation = CastVoteOperation::new(store.clone(), ConsistencyMode::LastWriterWins);
        let item = ItemKey::new("track", "3").unwrap();

        operation.run(vote("u1", &item, VoteType::Like)).await.unwrap();

        store.fail_next_batch_after(1).await;
        let result = operation.run(vote("u1", &item, VoteType::Dislike)).await;
        assert!(matches!(result, Err(ChorusError::Store(_))));

        // The decrement landed, the increment and the record write did not.
        assert_eq!(store.get("likes:track:3").await.unwrap().as_deref(), Some("0"));
        assert_eq!(store.get("dislikes:track:3").await.unwrap(), None);
        assert_eq!(
            stored_record(&store, "u1").await.current_vote(&item),
            Some(VoteType::Like)
        );
    }

    /// Lands a competing like from the same user right after the first read
    /// of their record, as a second request on another server would.
    struct RacingStore {
        inner: MemoryStore,
        raced: AtomicBool,
    }

    #[async_trait]
    impl KvStore for RacingStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            let value = self.inner.get(key).await?;
            if key.starts_with("user:") && !self.raced.swap(true, Ordering::SeqCst) {
                let mut record = UserRecord::decode(value.as_deref().unwrap_or("{}"))?;
                let item = ItemKey::new("track", "5")?;
                record.apply(&item, &VoteTransition::plan(None, VoteType::Like));

                let mut batch = Batch::new();
                batch.incr("likes:track:5").set(key, record.encode()?);
                self.inner.exec(batch).await?;
            }
            Ok(value)
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.inner.set(key, value).await
        }

        async fn incr(&self, key: &str) -> Result<i64> {
            self.inner.incr(key).await
        }

        async fn decr(&self, key: &str) -> Result<i64> {
            self.inner.decr(key).await
        }

        async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
            self.inner.mget(keys).await
        }

        async fn exec(&self, batch: Batch) -> Result<BatchOutcome> {
            self.inner.exec(batch).await
        }

        async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.scan_keys(prefix).await
        }
    }

    async fn racing_store() -> Arc<RacingStore> {
        let inner = MemoryStore::new();
        seed_user(&inner, "u1").await;
        Arc::new(RacingStore {
            inner,
            raced: AtomicBool::new(false),
        })
    }

    #[tokio::test]
    async fn test_optimistic_mode_rejects_stale_record() {
        let store = racing_store().await;
        let operation = CastVoteOperation::new(store.clone(), ConsistencyMode::Optimistic);
        let item = ItemKey::new("track", "5").unwrap();

        let result = operation.run(vote("u1", &item, VoteType::Like)).await;
        assert!(matches!(result, Err(ChorusError::Conflict(_))));

        assert_eq!(store.inner.get("likes:track:5").await.unwrap().as_deref(), Some("1"));
        assert_eq!(
            stored_record(&store.inner, "u1").await.current_vote(&item),
            Some(VoteType::Like)
        );
    }

    #[tokio::test]
    async fn test_last_writer_wins_loses_an_update() {
        let store = racing_store().await;
        let operation = CastVoteOperation::new(store.clone(), ConsistencyMode::LastWriterWins);
        let item = ItemKey::new("track", "5").unwrap();

        let result = operation.run(vote("u1", &item, VoteType::Like)).await.unwrap();

        // Both increments landed but the record only describes one of them.
        assert_eq!(result.tally, Tally { likes: 2, dislikes: 0 });
        assert_eq!(
            stored_record(&store.inner, "u1").await.current_vote(&item),
            Some(VoteType::Like)
        );
    }
}
