use async_trait::async_trait;
use thiserror::Error;

/// Minimal string key/value store shared with the app serving the challenges.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Overwrites any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
