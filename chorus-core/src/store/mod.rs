//! Key-value store seam shared by counters, user records and sessions.
//!
//! Batches are a grouped write, not a transaction: operations run in
//! submission order and replies come back in the same order, but nothing is
//! promised about what the rest of the world observes in between. A batch may
//! carry a guard, a compare-and-set precondition on one key; when the guard
//! does not hold the batch is rejected without applying anything.

pub mod factory;
pub mod memory;
pub mod redis;

use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Incr(String),
    Decr(String),
    Set(String, String),
}

impl BatchOp {
    pub fn key(&self) -> &str {
        match self {
            BatchOp::Incr(key) | BatchOp::Decr(key) | BatchOp::Set(key, _) => key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchReply {
    Int(i64),
    Ok,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchGuard {
    pub key: String,
    /// Value the key must still hold; `None` means the key must be absent.
    pub expected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Applied(Vec<BatchReply>),
    Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    ops: Vec<BatchOp>,
    guard: Option<BatchGuard>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::Incr(key.into()));
        self
    }

    pub fn decr(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::Decr(key.into()));
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::Set(key.into(), value.into()));
        self
    }

    pub fn guard(&mut self, key: impl Into<String>, expected: Option<String>) -> &mut Self {
        self.guard = Some(BatchGuard {
            key: key.into(),
            expected,
        });
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn guard_condition(&self) -> Option<&BatchGuard> {
        self.guard.as_ref()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn incr(&self, key: &str) -> Result<i64>;

    async fn decr(&self, key: &str) -> Result<i64>;

    /// One value per requested key, positionally; missing keys are `None`.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    async fn exec(&self, batch: Batch) -> Result<BatchOutcome>;

    /// All keys starting with `prefix`, in no particular order. A key may be
    /// reported more than once, as with redis `SCAN`.
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

pub type DynKvStore = Arc<dyn KvStore>;

/// Reads a stored counter. Missing and unparsable values count as zero.
pub fn parse_counter(key: &str, raw: Option<&str>) -> i64 {
    match raw {
        None => 0,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Counter {} holds a non-integer value {:?}; reading as 0", key, value);
            0
        }),
    }
}

pub use factory::{StoreTarget, open_store};
pub use memory::MemoryStore;
pub use self::redis::RedisStore;
