use crate::store::DynKvStore;
use crate::{ChorusError, Result};
use async_trait::async_trait;

pub const SESSION_PREFIX: &str = "session";

pub fn session_key(token: &str) -> String {
    format!("{}:{}", SESSION_PREFIX, token)
}

/// Resolves a bearer credential to the id of the user it was issued to.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<String>;
}

/// Sessions issued by the login flow, stored as `session:{token} -> user id`.
pub struct SessionAuthenticator {
    store: DynKvStore,
}

impl SessionAuthenticator {
    pub fn new(store: DynKvStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Authenticator for SessionAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<String> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ChorusError::Unauthorized);
        }

        match self.store.get(&session_key(token)).await? {
            Some(user_id) if !user_id.trim().is_empty() => Ok(user_id.trim().to_string()),
            _ => Err(ChorusError::Unauthorized),
        }
    }
}
