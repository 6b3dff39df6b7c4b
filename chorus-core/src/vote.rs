//! Vote vocabulary and the per-(user, item) state machine.
//!
//! A user holds at most one vote per item key. Requesting the vote already
//! held removes it; requesting the other vote switches it. Every transition
//! maps to at most one counter decrement followed by at most one increment.

use crate::{ChorusError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const LIKES_PREFIX: &str = "likes";
pub const DISLIKES_PREFIX: &str = "dislikes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Like,
    Dislike,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Like => "like",
            VoteType::Dislike => "dislike",
        }
    }

    /// Store key of the counter this vote type contributes to.
    pub fn counter_key(&self, item_key: &str) -> String {
        match self {
            VoteType::Like => likes_key(item_key),
            VoteType::Dislike => dislikes_key(item_key),
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteType {
    type Err = ChorusError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "like" => Ok(VoteType::Like),
            "dislike" => Ok(VoteType::Dislike),
            "" => Err(ChorusError::BadRequest("voteType is required".to_string())),
            other => Err(ChorusError::BadRequest(format!(
                "invalid voteType '{}': expected like | dislike",
                other
            ))),
        }
    }
}

/// Identifier of a votable entity, rendered as `{itemType}:{itemId}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey(String);

impl ItemKey {
    pub fn new(item_type: &str, item_id: &str) -> Result<Self> {
        if item_type.trim().is_empty() {
            return Err(ChorusError::BadRequest("itemType is required".to_string()));
        }
        if item_id.trim().is_empty() {
            return Err(ChorusError::BadRequest("itemId is required".to_string()));
        }
        // Keys are opaque; " 42" and "42" must not collapse into one item.
        for (field, value) in [("itemType", item_type), ("itemId", item_id)] {
            if value.trim() != value {
                return Err(ChorusError::BadRequest(format!(
                    "{} must not have surrounding whitespace",
                    field
                )));
            }
        }
        if item_type.contains(':') {
            return Err(ChorusError::BadRequest(format!(
                "invalid itemType '{}': must not contain ':'",
                item_type
            )));
        }

        Ok(Self(format!("{}:{}", item_type, item_id)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn likes_key(&self) -> String {
        likes_key(&self.0)
    }

    pub fn dislikes_key(&self) -> String {
        dislikes_key(&self.0)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn likes_key(item_key: &str) -> String {
    format!("{}:{}", LIKES_PREFIX, item_key)
}

pub fn dislikes_key(item_key: &str) -> String {
    format!("{}:{}", DISLIKES_PREFIX, item_key)
}

/// Like/dislike counts of a single item as read from the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub likes: i64,
    pub dislikes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterStep {
    Increment(VoteType),
    Decrement(VoteType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTransition {
    pub previous: Option<VoteType>,
    pub next: Option<VoteType>,
}

impl VoteTransition {
    pub fn plan(current: Option<VoteType>, requested: VoteType) -> Self {
        let next = if current == Some(requested) {
            None
        } else {
            Some(requested)
        };

        Self {
            previous: current,
            next,
        }
    }

    /// Counter mutations in submission order: release the old vote, then count the new one.
    pub fn counter_steps(&self) -> Vec<CounterStep> {
        let mut steps = Vec::with_capacity(2);
        if self.previous == self.next {
            return steps;
        }

        if let Some(previous) = self.previous {
            steps.push(CounterStep::Decrement(previous));
        }
        if let Some(next) = self.next {
            steps.push(CounterStep::Increment(next));
        }

        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_table() {
        use CounterStep::*;
        use VoteType::*;

        let cases = [
            (None, Like, Some(Like), vec![Increment(Like)]),
            (None, Dislike, Some(Dislike), vec![Increment(Dislike)]),
            (Some(Like), Like, None, vec![Decrement(Like)]),
            (Some(Dislike), Dislike, None, vec![Decrement(Dislike)]),
            (Some(Like), Dislike, Some(Dislike), vec![Decrement(Like), Increment(Dislike)]),
            (Some(Dislike), Like, Some(Like), vec![Decrement(Dislike), Increment(Like)]),
        ];

        for (current, requested, next, steps) in cases {
            let transition = VoteTransition::plan(current, requested);
            assert_eq!(transition.next, next, "{:?} -> {:?}", current, requested);
            assert_eq!(transition.counter_steps(), steps);
        }
    }

    #[test]
    fn test_item_key() {
        let key = ItemKey::new("track", "42").unwrap();
        assert_eq!(key.as_str(), "track:42");
        assert_eq!(key.likes_key(), "likes:track:42");
        assert_eq!(key.dislikes_key(), "dislikes:track:42");

        assert!(matches!(ItemKey::new("", "42"), Err(ChorusError::BadRequest(_))));
        assert!(matches!(ItemKey::new("track", "  "), Err(ChorusError::BadRequest(_))));
        assert!(matches!(ItemKey::new("a:b", "1"), Err(ChorusError::BadRequest(_))));
        assert!(matches!(ItemKey::new("track", " 42"), Err(ChorusError::BadRequest(_))));
        assert!(matches!(ItemKey::new("track ", "42"), Err(ChorusError::BadRequest(_))));
    }

    #[test]
    fn test_vote_type_parse() {
        assert_eq!("like".parse::<VoteType>().unwrap(), VoteType::Like);
        assert_eq!(" dislike".parse::<VoteType>().unwrap(), VoteType::Dislike);
        assert!(matches!("meh".parse::<VoteType>(), Err(ChorusError::BadRequest(_))));
        assert_eq!(serde_json::to_string(&VoteType::Dislike).unwrap(), "\"dislike\"");
    }
}
