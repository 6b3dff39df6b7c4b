//! Chorus Core - like/dislike tallies for a music discovery app
//!
//! Per-item counters live next to per-user vote maps in one key-value store:
//! - atomic INCR/DECR for counters, no in-process locking
//! - one ordered batch per vote, user record written last
//! - optional compare-and-set guard on the user record
//! - out-of-band reconciliation for counters that drifted

pub mod auth;
pub mod error;
pub mod operations;
pub mod store;
pub mod user;
pub mod vote;

pub use auth::{Authenticator, SessionAuthenticator, session_key};
pub use error::{ChorusError, Result};
pub use operations::{
    CastVoteOperation, CastVoteOperationRequest, CastVoteOperationResult, ConsistencyMode,
    GetTalliesOperation, GetTalliesOperationRequest, GetTalliesOperationResult,
    ReconcileTalliesOperation, ReconcileTalliesOperationRequest, ReconcileTalliesOperationResult,
    TallyDrift,
};
pub use store::{
    Batch, BatchOp, BatchOutcome, BatchReply, DynKvStore, KvStore, MemoryStore, RedisStore,
    StoreTarget, open_store,
};
pub use user::{UserRecord, user_key};
pub use vote::{ItemKey, Tally, VoteTransition, VoteType};
