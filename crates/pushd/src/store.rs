use crate::error::PushError;
use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::time::{Duration, Instant};

/// Ephemeral key-value storage for single-use reconnect tokens.
///
/// `take` must behave as an atomic delete-on-read: under concurrent
/// redemptions of the same token, at most one caller observes the stored
/// value.
#[async_trait]
pub trait RekeyStore: Send + Sync {
    /// Stores `rooms_json` under `token` with the given time to live.
    async fn put(&self, token: &str, rooms_json: &str, ttl: Duration) -> Result<(), PushError>;

    /// Removes and returns the value stored under `token`, if any.
    async fn take(&self, token: &str) -> Result<Option<String>, PushError>;
}

/// Redis-backed token store. `GETDEL` provides the atomic single-use read.
pub struct RedisRekeyStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisRekeyStore {
    /// Connects to Redis at `url`; keys are namespaced per tenant so
    /// several relays can share one store.
    pub async fn connect(url: &str, tenant: &str) -> Result<Self, PushError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            prefix: format!("{tenant}:push:token:"),
        })
    }

    fn key(&self, token: &str) -> String {
        format!("{}{}", self.prefix, token)
    }
}

#[async_trait]
impl RekeyStore for RedisRekeyStore {
    async fn put(&self, token: &str, rooms_json: &str, ttl: Duration) -> Result<(), PushError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(self.key(token))
            .arg(rooms_json)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn take(&self, token: &str) -> Result<Option<String>, PushError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(self.key(token))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }
}

/// In-memory token store used by tests and single-process setups.
#[derive(Debug, Default)]
pub struct MemoryRekeyStore {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryRekeyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RekeyStore for MemoryRekeyStore {
    async fn put(&self, token: &str, rooms_json: &str, ttl: Duration) -> Result<(), PushError> {
        self.entries
            .insert(token.to_owned(), (rooms_json.to_owned(), Instant::now() + ttl));
        Ok(())
    }

    async fn take(&self, token: &str) -> Result<Option<String>, PushError> {
        // DashMap::remove is the atomic delete-on-read here
        Ok(self
            .entries
            .remove(token)
            .and_then(|(_, (value, expires))| (Instant::now() <= expires).then_some(value)))
    }
}
