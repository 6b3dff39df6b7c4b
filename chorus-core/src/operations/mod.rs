pub mod cast_vote;
pub mod get_tallies;
pub mod reconcile;

pub use cast_vote::{
    CastVoteOperation, CastVoteOperationRequest, CastVoteOperationResult, ConsistencyMode,
};
pub use get_tallies::{
    DEFAULT_MAX_ITEMS, GetTalliesOperation, GetTalliesOperationRequest, GetTalliesOperationResult,
    read_tallies,
};
pub use reconcile::{
    ReconcileTalliesOperation, ReconcileTalliesOperationRequest, ReconcileTalliesOperationResult,
    TallyDrift,
};
