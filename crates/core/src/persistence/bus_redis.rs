//! Reference [`EventBus`](super::EventBus) adapter backed by Redis,
//! grounded in the job queue's `ConnectionManager` + `AsyncCommands` idiom.
//!
//! Each `(topic, group_key)` pair maps to a Redis list acting as a durable
//! append log (`rpush` to append, `lrange` to replay), and publishing also
//! fans the event out on a pub/sub channel for live subscribers.

use super::EventBus;
use crate::error::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const LOG_TTL_SECONDS: i64 = 86400 * 30;

pub struct RedisEventBus {
    redis: ConnectionManager,
    key_prefix: String,
}

impl RedisEventBus {
    pub fn new(redis: ConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self {
            redis,
            key_prefix: key_prefix.into(),
        }
    }

    fn log_key(&self, topic: &str, group_key: &str) -> String {
        log_key(&self.key_prefix, topic, group_key)
    }

    fn channel(&self, topic: &str) -> String {
        format!("{}:channel:{}", self.key_prefix, topic)
    }
}

fn log_key(prefix: &str, topic: &str, group_key: &str) -> String {
    format!("{}:log:{}:{}", prefix, topic, group_key)
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, topic: &str, group_key: &str, event: Vec<u8>) -> Result<()> {
        let mut conn = self.redis.clone();
        let log_key = self.log_key(topic, group_key);

        conn.rpush::<_, _, ()>(&log_key, &event).await?;
        conn.expire::<_, ()>(&log_key, LOG_TTL_SECONDS).await?;
        conn.publish::<_, _, ()>(self.channel(topic), event).await?;

        Ok(())
    }

    async fn replay(&self, topic: &str, group_key: &str) -> Result<Vec<Vec<u8>>> {
        let mut conn = self.redis.clone();
        let entries: Vec<Vec<u8>> = conn.lrange(self.log_key(topic, group_key), 0, -1).await?;
        Ok(entries)
    }
}
