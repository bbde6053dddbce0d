//! Schedule service: validated CRUD over schedules plus event listings.
//!
//! This is the layer a REST surface mounts; it owns validation and the
//! delete cascade so transport handlers stay thin.

use crate::errors::{ChimeError, Result};
use crate::model::{Event, Schedule, ScheduleChanges, ScheduleDefinition};
use crate::recurrence;
use crate::store::{DynEventArchive, DynEventStore, DynScheduleStore, Page};
use chrono::Utc;
use url::Url;

/// Validated create/update/delete over schedules, with paginated views of
/// their pending and archived events.
#[derive(Clone)]
pub struct ScheduleService {
    schedules: DynScheduleStore,
    events: DynEventStore,
    archive: DynEventArchive,
}

impl ScheduleService {
    pub fn new(
        schedules: DynScheduleStore,
        events: DynEventStore,
        archive: DynEventArchive,
    ) -> Self {
        Self {
            schedules,
            events,
            archive,
        }
    }

    /// Register a schedule. The rule and callback URL are validated before
    /// anything is written; `created_at` is always stamped server-side.
    pub async fn create(&self, definition: ScheduleDefinition) -> Result<String> {
        validate_name(&definition.name)?;
        recurrence::validate(&definition.rrule)?;
        validate_callback_url(&definition.callback_url)?;

        let id = self.schedules.insert(definition, Utc::now()).await?;
        tracing::info!(schedule_id = %id, "schedule created");
        Ok(id)
    }

    /// Apply a partial update. `id` and `created_at` are immutable; changed
    /// rules and URLs are re-validated.
    pub async fn update(&self, id: &str, changes: ScheduleChanges) -> Result<()> {
        if changes.is_empty() {
            return Err(ChimeError::Validation(
                "no schedule fields to update".to_string(),
            ));
        }
        if let Some(name) = &changes.name {
            validate_name(name)?;
        }
        if let Some(rrule) = &changes.rrule {
            recurrence::validate(rrule)?;
        }
        if let Some(callback_url) = &changes.callback_url {
            validate_callback_url(callback_url)?;
        }

        if !self.schedules.apply(id, changes).await? {
            return Err(ChimeError::ScheduleNotFound(id.to_string()));
        }
        tracing::info!(schedule_id = %id, "schedule updated");
        Ok(())
    }

    /// Delete a schedule and cascade-delete its pending events.
    ///
    /// Ready-queue index entries are deliberately left behind; a later claim
    /// of such an entry finds the event gone and archives it as an error.
    /// Returns the number of pending events removed.
    pub async fn delete(&self, id: &str) -> Result<u64> {
        if !self.schedules.delete(id).await? {
            return Err(ChimeError::ScheduleNotFound(id.to_string()));
        }
        let removed = self.events.delete_for_schedule(id).await?;
        tracing::info!(
            schedule_id = %id,
            events_removed = removed,
            "schedule and associated events deleted"
        );
        Ok(removed)
    }

    pub async fn get(&self, id: &str) -> Result<Schedule> {
        self.schedules
            .get(id)
            .await?
            .ok_or_else(|| ChimeError::ScheduleNotFound(id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Schedule>> {
        self.schedules.list().await
    }

    /// Pending events for a schedule, `run_time` descending.
    pub async fn pending_events(&self, id: &str, page: Page) -> Result<Vec<Event>> {
        self.events.pending_for_schedule(id, page).await
    }

    /// Archived events for a schedule, `run_time` descending.
    pub async fn event_history(&self, id: &str, page: Page) -> Result<Vec<Event>> {
        self.archive.history_for_schedule(id, page).await
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ChimeError::Validation(
            "schedule name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_callback_url(callback_url: &str) -> Result<()> {
    let url = Url::parse(callback_url)?;
    if url.cannot_be_a_base() {
        return Err(ChimeError::InvalidUrl(format!(
            "callback URL must be absolute: {callback_url}"
        )));
    }
    Ok(())
}
