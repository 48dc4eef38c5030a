//! Persistence ports (§4.C): the two narrow capabilities the orchestration
//! core requires from its host. Everything upstream of these traits is
//! storage-agnostic; `kv_postgres`/`bus_redis` are reference adapters, not
//! part of the core's contract.

pub mod bus_redis;
pub mod kv_postgres;

use crate::error::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Durable key/value storage keyed by `(namespace, key)`. Reads return the
/// last value written for that key; no multi-key transactions are assumed
/// (§5 — callers achieve atomicity via single-writer discipline, not the
/// store).
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()>;
    async fn delete(&self, namespace: &str, key: &str) -> Result<()>;
    async fn list_by_namespace(&self, namespace: &str) -> Result<Vec<String>>;
}

/// Convenience layer over [`KvStore`] that serializes/deserializes through
/// canonical JSON, used by every component that stores structured records
/// (workflow state, policy history, zombie schedules, ...).
#[async_trait]
pub trait TypedKvStore: KvStore {
    async fn get_json<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<Option<T>> {
        match self.get(namespace, key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize + Sync>(&self, namespace: &str, key: &str, value: &T) -> Result<()> {
        let bytes = crate::crypto::canonical(value)?;
        self.set(namespace, key, bytes).await
    }
}

impl<T: KvStore + ?Sized> TypedKvStore for T {}

/// Push notifications plus a durable, replayable per-`(topic, group_key)`
/// append log (§4.C). `group_key` is typically a `workflowId`; the
/// monitoring publisher (§4.N) also writes to the `"global"` group.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, group_key: &str, event: Vec<u8>) -> Result<()>;
    async fn replay(&self, topic: &str, group_key: &str) -> Result<Vec<Vec<u8>>>;
}

#[async_trait]
pub trait TypedEventBus: EventBus {
    async fn publish_json<T: Serialize + Sync>(&self, topic: &str, group_key: &str, event: &T) -> Result<()> {
        let bytes = crate::crypto::canonical(event)?;
        self.publish(topic, group_key, bytes).await
    }
}

impl<T: EventBus + ?Sized> TypedEventBus for T {}

pub use bus_redis::RedisEventBus;
pub use kv_postgres::PostgresKvStore;
