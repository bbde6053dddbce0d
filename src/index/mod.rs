//! Ordered priority index contract.
//!
//! The index carries two keys: `ready_queue`, a sorted set of event ids
//! scored by firing time, and `worker_queue`, a FIFO list of claimed work.
//! The atomic remove-count of [`EventIndex::remove_ready`] is the system's
//! only distributed synchronization primitive: whichever replica's remove
//! reports 1 owns the event.

mod memory;
#[cfg(feature = "redis-index")]
mod redis;

pub use self::memory::MemoryIndex;
#[cfg(feature = "redis-index")]
pub use self::redis::RedisIndex;

use crate::errors::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// The time-ordered ready queue plus the FIFO worker queue.
#[async_trait]
pub trait EventIndex: Send + Sync {
    /// Add an event to the ready queue, scored by its firing time in Unix
    /// seconds. Re-adding an existing member refreshes its score.
    async fn add_ready(&self, event_id: &str, fire_at: i64) -> Result<()>;

    /// Members with score at or below `cutoff`, in ascending score order.
    async fn due_ready(&self, cutoff: i64) -> Result<Vec<String>>;

    /// Atomically remove a member from the ready queue, returning the number
    /// of elements actually removed. A count of 1 is the claim.
    async fn remove_ready(&self, event_id: &str) -> Result<u64>;

    /// The member's current score, or `None` when absent. Used by the
    /// pre-queuer's reconciliation sweep.
    async fn ready_score(&self, event_id: &str) -> Result<Option<i64>>;

    /// Push an event id onto the head of the worker queue.
    async fn push_work(&self, event_id: &str) -> Result<()>;

    /// Pop one event id from the tail of the worker queue, or `None` when
    /// empty. Tail pops against head pushes yield FIFO ordering.
    async fn pop_work(&self) -> Result<Option<String>>;
}

/// Cloneable, type-erased index handle shared across tasks.
pub type DynEventIndex = Arc<dyn EventIndex>;
