use async_trait::async_trait;
use ballot_store::{keys, DedupStore, StoreError};
use ballot_types::{ErrorPattern, VoterHash};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use crate::RedisStoreError;

/// Dedup store on a shared Redis instance.
///
/// Holds a [`ConnectionManager`], which multiplexes one connection and
/// reconnects on failure; each call works on a cheap clone of it.
#[derive(Clone)]
pub struct RedisDedupStore {
    conn: ConnectionManager,
}

impl RedisDedupStore {
    pub async fn connect(url: &str) -> Result<Self, RedisStoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("connected to redis");
        Ok(Self { conn })
    }

    /// Provision hashes into the eligible set. Returns how many were new.
    pub async fn add_eligible(&self, hashes: &[VoterHash]) -> Result<u64, RedisStoreError> {
        if hashes.is_empty() {
            return Ok(0);
        }
        let members: Vec<&str> = hashes.iter().map(VoterHash::as_str).collect();
        let mut conn = self.conn.clone();
        let added: u64 = conn.sadd(keys::VALID_HASHES, members).await?;
        Ok(added)
    }

    async fn add(&self, key: &str, member: &str) -> Result<bool, RedisStoreError> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(key, member).await?;
        match added {
            0 => Ok(false),
            1 => Ok(true),
            reply => Err(RedisStoreError::UnexpectedReply {
                command: "SADD",
                reply,
            }),
        }
    }

    async fn remove(&self, key: &str, member: &str) -> Result<(), RedisStoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.srem(key, member).await?;
        Ok(())
    }

    async fn contains(&self, key: &str, member: &str) -> Result<bool, RedisStoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.sismember(key, member).await?)
    }

    async fn incr(&self, key: &str) -> Result<u64, RedisStoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.incr(key, 1u64).await?)
    }

    async fn counter(&self, key: &str) -> Result<u64, RedisStoreError> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = conn.get(key).await?;
        Ok(value.unwrap_or(0))
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn is_eligible(&self, hash: &VoterHash) -> Result<bool, StoreError> {
        Ok(self.contains(keys::VALID_HASHES, hash.as_str()).await?)
    }

    async fn mark_voted(&self, hash: &VoterHash) -> Result<bool, StoreError> {
        Ok(self.add(keys::VOTED_HASHES, hash.as_str()).await?)
    }

    async fn unmark_voted(&self, hash: &VoterHash) -> Result<(), StoreError> {
        Ok(self.remove(keys::VOTED_HASHES, hash.as_str()).await?)
    }

    async fn has_voted(&self, hash: &VoterHash) -> Result<bool, StoreError> {
        Ok(self.contains(keys::VOTED_HASHES, hash.as_str()).await?)
    }

    async fn increment_duplicate_count(&self, hash: &VoterHash) -> Result<u64, StoreError> {
        Ok(self.incr(&keys::duplicate_count(hash)).await?)
    }

    async fn duplicate_count(&self, hash: &VoterHash) -> Result<u64, StoreError> {
        Ok(self.counter(&keys::duplicate_count(hash)).await?)
    }

    async fn record_error_pattern(&self, pattern: &ErrorPattern) -> Result<bool, StoreError> {
        Ok(self
            .add(keys::ERROR_PATTERNS_SEEN, pattern.as_str())
            .await?)
    }

    async fn forget_error_pattern(&self, pattern: &ErrorPattern) -> Result<(), StoreError> {
        Ok(self
            .remove(keys::ERROR_PATTERNS_SEEN, pattern.as_str())
            .await?)
    }

    async fn increment_error_pattern(&self, pattern: &ErrorPattern) -> Result<u64, StoreError> {
        Ok(self.incr(&keys::error_pattern(pattern)).await?)
    }

    async fn error_pattern_count(&self, pattern: &ErrorPattern) -> Result<u64, StoreError> {
        Ok(self.counter(&keys::error_pattern(pattern)).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;
        Ok(())
    }
}
