use crate::vote::{ItemKey, VoteTransition, VoteType};
use crate::{ChorusError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const USER_PREFIX: &str = "user";

pub fn user_key(user_id: &str) -> String {
    format!("{}:{}", USER_PREFIX, user_id)
}

/// User record as persisted in the store.
///
/// Only `votes` belongs to this service. Every other field is carried through
/// untouched in `profile`, because each vote rewrites the whole record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub votes: BTreeMap<String, VoteType>,
    #[serde(flatten)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

impl UserRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|error| {
            ChorusError::Internal(format!("failed to decode user record: {}", error))
        })
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn current_vote(&self, item_key: &ItemKey) -> Option<VoteType> {
        self.votes.get(item_key.as_str()).copied()
    }

    pub fn apply(&mut self, item_key: &ItemKey, transition: &VoteTransition) {
        match transition.next {
            Some(vote) => {
                self.votes.insert(item_key.to_string(), vote);
            }
            None => {
                self.votes.remove(item_key.as_str());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_preserves_profile() {
        let raw = r#"{"id":"u1","username":"mel","friends":["u2"],"votes":{"artist:7":"like"}}"#;
        let mut record = UserRecord::decode(raw).unwrap();
        let item = ItemKey::new("artist", "7").unwrap();
        assert_eq!(record.current_vote(&item), Some(VoteType::Like));

        record.apply(&item, &VoteTransition::plan(Some(VoteType::Like), VoteType::Like));
        assert!(record.votes.is_empty());

        let encoded: serde_json::Value = serde_json::from_str(&record.encode().unwrap()).unwrap();
        assert_eq!(encoded["username"], "mel");
        assert_eq!(encoded["friends"][0], "u2");
    }

    #[test]
    fn test_decode_without_votes() {
        let record = UserRecord::decode(r#"{"id":"u9"}"#).unwrap();
        assert!(record.votes.is_empty());
        assert!(UserRecord::decode("not json").is_err());
    }
}
