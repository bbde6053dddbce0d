//! Durable document store contracts.
//!
//! The pipeline consumes three collections (`schedules`, `events`,
//! `archived_events`) through the traits below. Implement them against a
//! document database to run the scheduler in production; [`MemoryStore`]
//! implements all three in process memory for tests and embedded use.

mod memory;

pub use self::memory::MemoryStore;

use crate::errors::Result;
use crate::model::{Event, NewEvent, Schedule, ScheduleChanges, ScheduleDefinition, StatusEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Page selector for event listings. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(number: u64, limit: u64) -> Self {
        Self {
            number: number.max(1),
            limit: limit.max(1),
        }
    }

    /// Number of records to skip before this page starts.
    pub fn offset(&self) -> u64 {
        (self.number - 1) * self.limit
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 1,
            limit: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Store contracts
// ---------------------------------------------------------------------------

/// The `schedules` collection.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Insert a schedule and return its store-assigned id.
    async fn insert(
        &self,
        definition: ScheduleDefinition,
        created_at: DateTime<Utc>,
    ) -> Result<String>;

    async fn get(&self, id: &str) -> Result<Option<Schedule>>;

    async fn list(&self) -> Result<Vec<Schedule>>;

    /// Apply a partial update. Returns `false` when no schedule matched.
    async fn apply(&self, id: &str, changes: ScheduleChanges) -> Result<bool>;

    /// Delete a schedule. Returns `false` when no schedule matched.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Create the collection's secondary indexes (`last_event_time`).
    async fn ensure_indexes(&self) -> Result<()>;
}

/// The active `events` collection.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert an event and return its store-assigned id.
    ///
    /// Fails with [`ChimeError::DuplicateEvent`](crate::ChimeError) when an
    /// event for the same `(schedule_id, run_time)` already exists.
    async fn insert(&self, event: NewEvent) -> Result<String>;

    async fn get(&self, id: &str) -> Result<Option<Event>>;

    /// Find the event materialized for a specific occurrence instant.
    async fn find_occurrence(
        &self,
        schedule_id: &str,
        run_time: DateTime<Utc>,
    ) -> Result<Option<Event>>;

    /// Append an entry to the event's status log.
    ///
    /// Fails with [`ChimeError::EventNotFound`](crate::ChimeError) when the
    /// event does not exist.
    async fn append_status(&self, id: &str, entry: StatusEntry) -> Result<()>;

    /// Delete one event. Returns `false` when no event matched.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Delete every event belonging to a schedule; returns the count removed.
    async fn delete_for_schedule(&self, schedule_id: &str) -> Result<u64>;

    /// A schedule's pending events, `run_time` descending, paginated.
    async fn pending_for_schedule(&self, schedule_id: &str, page: Page) -> Result<Vec<Event>>;

    /// Events whose current status is `ready_queue` with `run_time` at or
    /// before `cutoff`, ascending. Feeds the pre-queuer's reconciliation
    /// sweep.
    async fn ready_due_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Event>>;

    /// Create the collection's secondary indexes (`run_time`, plus the unique
    /// `(schedule_id, run_time)` constraint).
    async fn ensure_indexes(&self) -> Result<()>;
}

/// The terminal `archived_events` collection.
#[async_trait]
pub trait EventArchive: Send + Sync {
    /// Insert an event into the archive, preserving its id.
    async fn insert(&self, event: Event) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Event>>;

    /// Remove an archived event (the archive compensation path).
    async fn delete(&self, id: &str) -> Result<bool>;

    /// A schedule's archived events, `run_time` descending, paginated.
    async fn history_for_schedule(&self, schedule_id: &str, page: Page) -> Result<Vec<Event>>;
}

/// Cloneable, type-erased store handles shared across tasks.
pub type DynScheduleStore = Arc<dyn ScheduleStore>;
pub type DynEventStore = Arc<dyn EventStore>;
pub type DynEventArchive = Arc<dyn EventArchive>;
