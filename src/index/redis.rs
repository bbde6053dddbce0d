use super::EventIndex;
use crate::errors::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const READY_QUEUE_KEY: &str = "ready_queue";
const WORKER_QUEUE_KEY: &str = "worker_queue";

/// Redis-backed priority index.
///
/// `ready_queue` is a sorted set (`ZADD`/`ZRANGEBYSCORE`/`ZREM`); the `ZREM`
/// reply carries the removed count that backs the atomic claim. The worker
/// queue is a list pushed at the head (`LPUSH`) and popped at the tail
/// (`RPOP`).
#[derive(Clone)]
pub struct RedisIndex {
    conn: ConnectionManager,
}

impl RedisIndex {
    /// Connect to a Redis endpoint, e.g. `redis://localhost:6379/`.
    ///
    /// The connection manager reconnects on failure, so one index handle can
    /// be shared for the life of the process.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Wrap an existing connection manager.
    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl EventIndex for RedisIndex {
    async fn add_ready(&self, event_id: &str, fire_at: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.zadd(READY_QUEUE_KEY, event_id, fire_at).await?;
        Ok(())
    }

    async fn due_ready(&self, cutoff: i64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrangebyscore(READY_QUEUE_KEY, "-inf", cutoff).await?;
        Ok(members)
    }

    async fn remove_ready(&self, event_id: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.zrem(READY_QUEUE_KEY, event_id).await?;
        Ok(removed)
    }

    async fn ready_score(&self, event_id: &str) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let score: Option<f64> = conn.zscore(READY_QUEUE_KEY, event_id).await?;
        Ok(score.map(|s| s as i64))
    }

    async fn push_work(&self, event_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(WORKER_QUEUE_KEY, event_id).await?;
        Ok(())
    }

    async fn pop_work(&self) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let member: Option<String> = conn.rpop(WORKER_QUEUE_KEY, None).await?;
        Ok(member)
    }
}
