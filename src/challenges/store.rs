use crate::challenge::{challenge_path, fetch_challenge, ChallengeError, ChallengeProvider};
use crate::https_helper::default_client_config;
use crate::KvStore;
use async_trait::async_trait;
use futures_rustls::rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_LOOPBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes proofs in a store the app reads from when answering
/// `/.well-known/acme-challenge/{token}`.
pub struct StoreChallengeProvider<S: KvStore> {
    store: S,
    client_config: Arc<ClientConfig>,
    loopback_timeout: Duration,
}

impl<S: KvStore> StoreChallengeProvider<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            client_config: default_client_config(),
            loopback_timeout: DEFAULT_LOOPBACK_TIMEOUT,
        }
    }
    pub fn loopback_timeout(mut self, timeout: Duration) -> Self {
        self.loopback_timeout = timeout;
        self
    }
    pub fn into_inner(self) -> S {
        self.store
    }
}

#[async_trait]
impl<S: KvStore> ChallengeProvider for StoreChallengeProvider<S> {
    async fn set(&self, domain: &str, token: &str, proof: &str) -> Result<(), ChallengeError> {
        log::debug!("storing challenge {} for {}", token, domain);
        self.store.set(&challenge_path(token), proof).await?;
        Ok(())
    }
    async fn get(&self, _domain: &str, token: &str) -> Result<Option<String>, ChallengeError> {
        Ok(self.store.get(&challenge_path(token)).await?)
    }
    async fn remove(&self, domain: &str, token: &str) -> Result<(), ChallengeError> {
        log::debug!("removing challenge {} for {}", token, domain);
        self.store.delete(&challenge_path(token)).await?;
        Ok(())
    }
    async fn loopback(&self, domain: &str, token: &str) -> Result<String, ChallengeError> {
        fetch_challenge(&self.client_config, domain, token, self.loopback_timeout).await
    }
}
