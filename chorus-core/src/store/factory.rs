use super::{DynKvStore, MemoryStore, RedisStore};
use crate::{ChorusError, Result};
use std::sync::Arc;

/// Where counters, user records and sessions are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Redis { url: String },
    Memory,
}

/// Opens the store behind `target`, with every key placed under `namespace`.
pub async fn open_store(target: &StoreTarget, namespace: &str) -> Result<DynKvStore> {
    let namespace = check_namespace(namespace)?;

    match target {
        StoreTarget::Redis { url } if url.trim().is_empty() => Err(ChorusError::Config(
            "store.redis.url cannot be empty".to_string(),
        )),
        StoreTarget::Redis { url } => Ok(Arc::new(RedisStore::new(url.trim(), namespace).await?)),
        StoreTarget::Memory => {
            tracing::warn!("Using in-memory store; votes are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

// The namespace ends up inside SCAN MATCH patterns.
fn check_namespace(namespace: &str) -> Result<&str> {
    if namespace.is_empty()
        || namespace.contains(char::is_whitespace)
        || namespace.contains(['*', '?', '[', ']', '\\'])
    {
        return Err(ChorusError::Config(format!(
            "invalid store namespace {:?}: use a non-empty name without whitespace or glob characters",
            namespace
        )));
    }

    Ok(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory() {
        let store = open_store(&StoreTarget::Memory, "chorus").await.unwrap();
        assert_eq!(store.get("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_bad_settings() {
        let blank_url = StoreTarget::Redis { url: "  ".to_string() };
        assert!(matches!(open_store(&blank_url, "chorus").await, Err(ChorusError::Config(_))));

        for namespace in ["", "chor*us", "my space", "a\\b"] {
            assert!(matches!(
                open_store(&StoreTarget::Memory, namespace).await,
                Err(ChorusError::Config(_))
            ));
        }
    }
}
