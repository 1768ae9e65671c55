//! SSH client reuse pool
//!
//! Shared cache of authenticated [`SshClient`]s keyed by
//! `(user, asset, credential, username)`. One pool instance serves a whole
//! process; sessions receive an `Arc` at construction, nothing is global.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ssh::SshClient;

/// Cache key for a reusable client.
pub fn reuse_key(user_id: &str, asset_id: &str, credential_id: &str, username: &str) -> String {
    format!("{}|{}|{}|{}", user_id, asset_id, credential_id, username)
}

/// Key prefix matching every username for `(user, asset, credential)`.
pub fn reuse_prefix(user_id: &str, asset_id: &str, credential_id: &str) -> String {
    format!("{}|{}|{}|", user_id, asset_id, credential_id)
}

/// Keyed SSH client cache with prefix lookup.
#[derive(Default)]
pub struct ClientPool {
    clients: Mutex<HashMap<String, Arc<SshClient>>>,
}

impl ClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<SshClient>> {
        self.clients.lock().get(key).cloned()
    }

    /// First client whose key starts with `prefix`, regardless of username.
    pub fn search(&self, prefix: &str) -> Option<Arc<SshClient>> {
        self.clients
            .lock()
            .iter()
            .find(|(key, _)| key.starts_with(prefix))
            .map(|(_, client)| client.clone())
    }

    pub fn add(&self, key: String, client: Arc<SshClient>) {
        self.clients.lock().insert(key, client);
    }

    pub fn remove(&self, key: &str) -> Option<Arc<SshClient>> {
        self.clients.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::ssh::{SshSessionHandle, SshTransport};
    use async_trait::async_trait;

    struct NullTransport;

    #[async_trait]
    impl SshTransport for NullTransport {
        async fn open_session(&self) -> Result<Box<dyn SshSessionHandle>> {
            Err(crate::Error::Ssh("null".into()))
        }

        async fn close(&self) {}
    }

    fn client(username: &str) -> Arc<SshClient> {
        Arc::new(SshClient::new(Box::new(NullTransport), username))
    }

    #[test]
    fn key_embeds_all_four_parts() {
        let key = reuse_key("u1", "a1", "c1", "root");
        assert_eq!(key, "u1|a1|c1|root");
        assert!(key.starts_with(&reuse_prefix("u1", "a1", "c1")));
    }

    #[test]
    fn direct_and_prefix_lookup() {
        let pool = ClientPool::new();
        pool.add(reuse_key("u1", "a1", "c1", "root"), client("root"));

        assert!(pool.get(&reuse_key("u1", "a1", "c1", "root")).is_some());
        assert!(pool.get(&reuse_key("u1", "a1", "c1", "deploy")).is_none());

        let found = pool.search(&reuse_prefix("u1", "a1", "c1")).unwrap();
        assert_eq!(found.username(), "root");
        assert!(pool.search(&reuse_prefix("u1", "a1", "c2")).is_none());
    }

    #[test]
    fn remove_evicts() {
        let pool = ClientPool::new();
        let key = reuse_key("u1", "a1", "c1", "root");
        pool.add(key.clone(), client("root"));
        assert_eq!(pool.len(), 1);
        assert!(pool.remove(&key).is_some());
        assert!(pool.is_empty());
    }
}
