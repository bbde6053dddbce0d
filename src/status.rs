//! Event-state helpers shared by the dispatcher and the worker pool.
//!
//! Archiving is a copy-then-delete across two collections with a compensating
//! delete when the second step fails; during that compensation window an
//! event can transiently exist in both collections, and the archive takes
//! precedence for reads.

use crate::errors::{ChimeError, Result};
use crate::model::{EventStatus, StatusEntry};
use crate::store::{EventArchive, EventStore};

/// Append `{time=now, status, message}` to the event's status log.
pub async fn update_status(
    events: &dyn EventStore,
    event_id: &str,
    status: EventStatus,
    message: impl Into<String>,
) -> Result<()> {
    events
        .append_status(event_id, StatusEntry::now(status, message))
        .await?;
    tracing::debug!(event_id, status = %status, "event status updated");
    Ok(())
}

/// Record a terminal status, then move the event into the archive.
///
/// The event keeps its id across the move. When the delete from the active
/// collection fails, the archive copy is removed again so the event is not
/// duplicated; a failed rollback is logged and the original error returned.
pub async fn update_and_archive(
    events: &dyn EventStore,
    archive: &dyn EventArchive,
    event_id: &str,
    status: EventStatus,
    message: impl Into<String>,
) -> Result<()> {
    update_status(events, event_id, status, message).await?;

    let event = events
        .get(event_id)
        .await?
        .ok_or_else(|| ChimeError::EventNotFound(event_id.to_string()))?;

    archive.insert(event).await?;

    if let Err(err) = events.delete(event_id).await {
        if let Err(rollback_err) = archive.delete(event_id).await {
            tracing::error!(
                event_id,
                error = %err,
                rollback_error = %rollback_err,
                "failed to delete archived event; rollback failed, event exists in both collections"
            );
        }
        return Err(err);
    }

    tracing::info!(event_id, status = %status, "event archived");
    Ok(())
}

/// Record a terminal `error` status and archive. Failures here are logged
/// rather than propagated: this is the last resort on every failure path.
pub async fn record_error_and_archive(
    events: &dyn EventStore,
    archive: &dyn EventArchive,
    event_id: &str,
    message: impl Into<String>,
) {
    if let Err(err) =
        update_and_archive(events, archive, event_id, EventStatus::Error, message).await
    {
        tracing::error!(event_id, error = %err, "failed to record error status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewEvent;
    use crate::store::MemoryStore;
    use chrono::Utc;

    async fn seeded_store() -> (MemoryStore, String) {
        let store = MemoryStore::new();
        let id = EventStore::insert(&store, NewEvent::pre_queued("sched", Utc::now(), Utc::now()))
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn archive_moves_event_between_collections() {
        let (store, id) = seeded_store().await;

        update_and_archive(&store, &store, &id, EventStatus::Completed, "done")
            .await
            .unwrap();

        assert_eq!(store.event_count(), 0);
        let archived = EventArchive::get(&store, &id).await.unwrap().unwrap();
        assert_eq!(archived.id, id);
        assert_eq!(archived.current_status(), Some(EventStatus::Completed));
        assert_eq!(archived.status_log.last().unwrap().message, "done");
    }

    #[tokio::test]
    async fn archive_of_missing_event_fails() {
        let store = MemoryStore::new();
        let err = update_and_archive(&store, &store, "ghost", EventStatus::Error, "boom")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.archived_count(), 0);
    }

    #[tokio::test]
    async fn record_error_and_archive_never_panics_on_missing_event() {
        let store = MemoryStore::new();
        record_error_and_archive(&store, &store, "ghost", "boom").await;
        assert_eq!(store.archived_count(), 0);
    }

    #[tokio::test]
    async fn status_entry_appends_in_order() {
        let (store, id) = seeded_store().await;

        update_status(&store, &id, EventStatus::WorkerQueue, "dispatched")
            .await
            .unwrap();

        let event = EventStore::get(&store, &id).await.unwrap().unwrap();
        let statuses: Vec<EventStatus> =
            event.status_log.iter().map(|entry| entry.status).collect();
        assert_eq!(
            statuses,
            vec![EventStatus::ReadyQueue, EventStatus::WorkerQueue]
        );
    }
}
