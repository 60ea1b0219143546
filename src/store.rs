use std::time::Duration;

use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),
    #[error("stored value for key is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Typed wrapper over Redis: namespaced keys, per-key TTL, and the atomic
/// single-use `take_once` primitive that the authorization/code-exchange
/// flow depends on for exactly-once redemption.
///
/// Cloning is cheap — it only clones the inner `redis::Client` handle, the
/// same pattern this codebase's other Redis-backed services use. A fresh
/// multiplexed connection is obtained per call rather than held across
/// `.await` points.
#[derive(Clone)]
pub struct Store {
    client: redis::Client,
}

impl Store {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Liveness check for `/ready`.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    pub async fn put<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(value)?;
        match ttl {
            Some(ttl) => {
                conn.set_ex::<_, _, ()>(key, payload, ttl.as_secs().max(1))
                    .await?
            }
            None => conn.set::<_, _, ()>(key, payload).await?,
        }
        Ok(())
    }

    /// Writes only if `key` is absent. Returns `true` if the write happened.
    pub async fn put_if_absent<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(value)?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(payload).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.exists(key).await?)
    }

    /// Atomically reads and deletes `key` in one round trip via `GETDEL`.
    /// This is what makes concurrent redemption of the same code or state
    /// resolve to exactly one winner with no application-level locking.
    pub async fn take_once<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = redis::cmd("GETDEL").arg(key).query_async(&mut conn).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.sadd::<_, _, ()>(key, member).await?;
        Ok(())
    }

    pub async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.srem::<_, _, ()>(key, member).await?;
        Ok(())
    }

    pub async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.smembers(key).await?)
    }
}

/// Namespaced key builders, one per §4.2 entity. Keeping these in one place
/// avoids ad hoc `format!` calls scattered across services drifting apart.
pub mod keys {
    pub fn state(state: &str) -> String {
        format!("oauth:state:{state}")
    }

    pub fn code(code: &str) -> String {
        format!("oauth:code:{code}")
    }

    pub fn token(jti: &str) -> String {
        format!("oauth:token:{jti}")
    }

    pub fn refresh(token: &str) -> String {
        format!("oauth:refresh:{token}")
    }

    pub fn client(client_id: &str) -> String {
        format!("oauth:client:{client_id}")
    }

    pub fn user_tokens(sub: &str) -> String {
        format!("oauth:user_tokens:{sub}")
    }
}
