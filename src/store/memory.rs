use super::{EventArchive, EventStore, Page, ScheduleStore};
use crate::errors::{ChimeError, Result};
use crate::model::{
    Event, EventStatus, NewEvent, Schedule, ScheduleChanges, ScheduleDefinition, StatusEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// In-memory document store implementing all three collections.
///
/// Clones share the same underlying state, so one instance can be handed to
/// every pipeline stage. Uniqueness of `(schedule_id, run_time)` is enforced
/// on insert, mirroring the unique index a document database would carry.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    schedules: HashMap<String, Schedule>,
    events: HashMap<String, Event>,
    archived: HashMap<String, Event>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently in the active `events` collection.
    pub fn event_count(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Number of documents currently in `archived_events`.
    pub fn archived_count(&self) -> usize {
        self.inner.lock().archived.len()
    }
}

fn next_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn page_of(mut events: Vec<Event>, page: Page) -> Vec<Event> {
    events.sort_by(|a, b| b.run_time.cmp(&a.run_time));
    events
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect()
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn insert(
        &self,
        definition: ScheduleDefinition,
        created_at: DateTime<Utc>,
    ) -> Result<String> {
        let id = next_id();
        let schedule = Schedule {
            id: id.clone(),
            name: definition.name,
            rrule: definition.rrule,
            callback_url: definition.callback_url,
            method: definition.method,
            headers: definition.headers,
            body: definition.body,
            created_at,
        };
        self.inner.lock().schedules.insert(id.clone(), schedule);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Schedule>> {
        Ok(self.inner.lock().schedules.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> =
            self.inner.lock().schedules.values().cloned().collect();
        schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(schedules)
    }

    async fn apply(&self, id: &str, changes: ScheduleChanges) -> Result<bool> {
        let mut inner = self.inner.lock();
        let Some(schedule) = inner.schedules.get_mut(id) else {
            return Ok(false);
        };
        if let Some(name) = changes.name {
            schedule.name = name;
        }
        if let Some(rrule) = changes.rrule {
            schedule.rrule = rrule;
        }
        if let Some(callback_url) = changes.callback_url {
            schedule.callback_url = callback_url;
        }
        if let Some(method) = changes.method {
            schedule.method = Some(method);
        }
        if let Some(headers) = changes.headers {
            schedule.headers = Some(headers);
        }
        if let Some(body) = changes.body {
            schedule.body = Some(body);
        }
        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.inner.lock().schedules.remove(id).is_some())
    }

    async fn ensure_indexes(&self) -> Result<()> {
        // Lookup maps stand in for the `last_event_time` index.
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert(&self, event: NewEvent) -> Result<String> {
        let mut inner = self.inner.lock();
        let duplicate = inner
            .events
            .values()
            .any(|e| e.schedule_id == event.schedule_id && e.run_time == event.run_time);
        if duplicate {
            return Err(ChimeError::DuplicateEvent {
                schedule_id: event.schedule_id,
                run_time: event.run_time,
            });
        }

        let id = next_id();
        inner.events.insert(
            id.clone(),
            Event {
                id: id.clone(),
                schedule_id: event.schedule_id,
                run_time: event.run_time,
                status_log: event.status_log,
                created_at: event.created_at,
            },
        );
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Event>> {
        Ok(self.inner.lock().events.get(id).cloned())
    }

    async fn find_occurrence(
        &self,
        schedule_id: &str,
        run_time: DateTime<Utc>,
    ) -> Result<Option<Event>> {
        Ok(self
            .inner
            .lock()
            .events
            .values()
            .find(|e| e.schedule_id == schedule_id && e.run_time == run_time)
            .cloned())
    }

    async fn append_status(&self, id: &str, entry: StatusEntry) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(event) = inner.events.get_mut(id) else {
            return Err(ChimeError::EventNotFound(id.to_string()));
        };
        event.status_log.push(entry);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.inner.lock().events.remove(id).is_some())
    }

    async fn delete_for_schedule(&self, schedule_id: &str) -> Result<u64> {
        let mut inner = self.inner.lock();
        let before = inner.events.len();
        inner.events.retain(|_, e| e.schedule_id != schedule_id);
        Ok((before - inner.events.len()) as u64)
    }

    async fn pending_for_schedule(&self, schedule_id: &str, page: Page) -> Result<Vec<Event>> {
        let events: Vec<Event> = self
            .inner
            .lock()
            .events
            .values()
            .filter(|e| e.schedule_id == schedule_id)
            .cloned()
            .collect();
        Ok(page_of(events, page))
    }

    async fn ready_due_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .inner
            .lock()
            .events
            .values()
            .filter(|e| {
                e.run_time <= cutoff && e.current_status() == Some(EventStatus::ReadyQueue)
            })
            .cloned()
            .collect();
        events.sort_by(|a, b| a.run_time.cmp(&b.run_time));
        Ok(events)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        // Uniqueness of (schedule_id, run_time) is checked on every insert.
        Ok(())
    }
}

#[async_trait]
impl EventArchive for MemoryStore {
    async fn insert(&self, event: Event) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.archived.contains_key(&event.id) {
            return Err(ChimeError::Store(format!(
                "event {} is already archived",
                event.id
            )));
        }
        inner.archived.insert(event.id.clone(), event);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Event>> {
        Ok(self.inner.lock().archived.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.inner.lock().archived.remove(id).is_some())
    }

    async fn history_for_schedule(&self, schedule_id: &str, page: Page) -> Result<Vec<Event>> {
        let events: Vec<Event> = self
            .inner
            .lock()
            .archived
            .values()
            .filter(|e| e.schedule_id == schedule_id)
            .cloned()
            .collect();
        Ok(page_of(events, page))
    }
}
