//! Cross-instance event claims.
//!
//! A claim is a short-lived key; the first instance to set it forwards the
//! event and everyone else skips it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;

const CLAIM_PREFIX: &str = "fierycms:bridge:claim:";

#[allow(async_fn_in_trait)]
pub trait ClaimStore {
    /// `true` when this caller now owns `digest` for `ttl_ms`.
    async fn claim(&mut self, digest: &str, ttl_ms: u64) -> Result<bool>;
}

/// `SET key 1 NX PX ttl` on the shared Redis.
pub struct RedisClaimStore {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisClaimStore {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self { conn }
    }
}

impl ClaimStore for RedisClaimStore {
    async fn claim(&mut self, digest: &str, ttl_ms: u64) -> Result<bool> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(format!("{}{}", CLAIM_PREFIX, digest))
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms.max(1))
            .query_async(&mut self.conn)
            .await?;
        Ok(reply.is_some())
    }
}

/// Process-local claims, for a single instance or tests.
#[derive(Debug, Default)]
pub struct MemoryClaimStore {
    claims: HashMap<String, Instant>,
}

impl MemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

impl ClaimStore for MemoryClaimStore {
    async fn claim(&mut self, digest: &str, ttl_ms: u64) -> Result<bool> {
        let now = Instant::now();
        self.claims.retain(|_, expires| *expires > now);
        if self.claims.contains_key(digest) {
            return Ok(false);
        }
        self.claims
            .insert(digest.to_string(), now + Duration::from_millis(ttl_ms));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_refused_until_expiry() {
        let mut store = MemoryClaimStore::new();
        tokio_test::block_on(async {
            assert!(store.claim("abc", 60_000).await.unwrap());
            assert!(!store.claim("abc", 60_000).await.unwrap());
            assert!(store.claim("def", 60_000).await.unwrap());
        });
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn expired_claims_are_released() {
        let mut store = MemoryClaimStore::new();
        assert!(store.claim("abc", 0).await.unwrap());
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.claim("abc", 0).await.unwrap());
    }
}
