use crate::store::{DynKvStore, parse_counter};
use crate::vote::{Tally, dislikes_key, likes_key};
use crate::{ChorusError, Result};
use std::collections::{BTreeMap, HashSet};

pub const DEFAULT_MAX_ITEMS: usize = 500;

#[derive(Clone)]
pub struct GetTalliesOperation {
    store: DynKvStore,
    max_items: usize,
}

#[derive(Debug, Clone)]
pub struct GetTalliesOperationRequest {
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetTalliesOperationResult {
    pub tallies: BTreeMap<String, Tally>,
}

impl GetTalliesOperation {
    pub fn new(store: DynKvStore) -> Self {
        Self {
            store,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.max(1);
        self
    }

    pub async fn run(&self, request: GetTalliesOperationRequest) -> Result<GetTalliesOperationResult> {
        let GetTalliesOperationRequest { items } = request;

        if items.is_empty() {
            return Ok(GetTalliesOperationResult::default());
        }

        if items.len() > self.max_items {
            return Err(ChorusError::BadRequest(format!(
                "too many items: {} (limit {})",
                items.len(),
                self.max_items
            )));
        }

        if items.iter().any(|item| item.trim().is_empty()) {
            return Err(ChorusError::BadRequest(
                "items must be non-empty strings".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(items.len());
        let unique: Vec<String> = items
            .into_iter()
            .filter(|item| seen.insert(item.clone()))
            .collect();

        let tallies = read_tallies(&self.store, &unique).await?;

        Ok(GetTalliesOperationResult {
            tallies: unique.into_iter().zip(tallies).collect(),
        })
    }
}

/// One multi-get for all counters: likes of every item first, then dislikes,
/// zipped back by position.
pub async fn read_tallies(store: &DynKvStore, items: &[String]) -> Result<Vec<Tally>> {
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let mut keys: Vec<String> = items.iter().map(|item| likes_key(item)).collect();
    keys.extend(items.iter().map(|item| dislikes_key(item)));

    let values = store.mget(&keys).await?;
    if values.len() != keys.len() {
        return Err(ChorusError::Store(format!(
            "multi-get returned {} values for {} keys",
            values.len(),
            keys.len()
        )));
    }

    let count = items.len();
    let tallies = (0..count)
        .map(|index| Tally {
            likes: parse_counter(&keys[index], values[index].as_deref()),
            dislikes: parse_counter(&keys[count + index], values[count + index].as_deref()),
        })
        .collect();

    Ok(tallies)
}
