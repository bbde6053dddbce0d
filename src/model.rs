use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Event status
// ---------------------------------------------------------------------------

/// The lifecycle status of an event.
///
/// Statuses are appended to the event's status log, never overwritten; the
/// current status is the last entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Materialized and waiting in the time-ordered ready queue.
    ReadyQueue,
    /// Claimed by a dispatcher and handed to the worker queue.
    WorkerQueue,
    /// Callback delivered; the event is archived.
    Completed,
    /// Delivery or processing failed; the event is archived.
    Error,
}

impl EventStatus {
    /// Returns `true` if this is a terminal status (completed or error).
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Error)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventStatus::ReadyQueue => "ready_queue",
            EventStatus::WorkerQueue => "worker_queue",
            EventStatus::Completed => "completed",
            EventStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

// ---------------------------------------------------------------------------
// Status log entries
// ---------------------------------------------------------------------------

/// A single entry in an event's append-only status log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// When the transition was recorded.
    pub time: DateTime<Utc>,
    /// The status entered.
    pub status: EventStatus,
    /// Human-readable detail about the transition.
    pub message: String,
}

impl StatusEntry {
    /// Create an entry stamped with the current UTC time.
    pub fn now(status: EventStatus, message: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            status,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A single materialized occurrence of a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Opaque unique id assigned by the store.
    pub id: String,
    /// The schedule this occurrence belongs to.
    pub schedule_id: String,
    /// When the event should fire (UTC, whole seconds).
    pub run_time: DateTime<Utc>,
    /// Append-only status log; the last entry is the current status.
    #[serde(rename = "status")]
    pub status_log: Vec<StatusEntry>,
    /// When the event document was created.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// The current status, i.e. the last entry of the status log.
    pub fn current_status(&self) -> Option<EventStatus> {
        self.status_log.last().map(|entry| entry.status)
    }

    /// Returns `true` if any status-log entry carries the given status.
    pub fn has_status(&self, status: EventStatus) -> bool {
        self.status_log.iter().any(|entry| entry.status == status)
    }
}

/// An event about to be inserted; the store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub schedule_id: String,
    pub run_time: DateTime<Utc>,
    #[serde(rename = "status")]
    pub status_log: Vec<StatusEntry>,
    pub created_at: DateTime<Utc>,
}

impl NewEvent {
    /// A freshly materialized occurrence, status `ready_queue`.
    pub fn pre_queued(
        schedule_id: impl Into<String>,
        run_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            run_time,
            status_log: vec![StatusEntry {
                time: now,
                status: EventStatus::ReadyQueue,
                message: "Event pre-queued for ready queue".to_string(),
            }],
            created_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

/// A registered recurrence specification bound to an HTTP callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// Opaque unique id assigned by the store.
    pub id: String,
    /// Display name.
    pub name: String,
    /// RFC-5545 recurrence rule.
    pub rrule: String,
    /// Absolute URL invoked for each occurrence.
    pub callback_url: String,
    /// HTTP method for the callback. Defaults to `GET` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Extra headers sent with the callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    /// Request body sent with the callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// When the schedule was registered.
    pub created_at: DateTime<Utc>,
}

/// User-supplied fields for registering a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub name: String,
    pub rrule: String,
    pub callback_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl ScheduleDefinition {
    pub fn new(
        name: impl Into<String>,
        rrule: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            rrule: rrule.into(),
            callback_url: callback_url.into(),
            method: None,
            headers: None,
            body: None,
        }
    }

    /// Set the HTTP method for the callback.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Add a header sent with every callback for this schedule.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Set the request body sent with every callback for this schedule.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A partial update to a schedule. `id` and `created_at` are immutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl ScheduleChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn rrule(mut self, rrule: impl Into<String>) -> Self {
        self.rrule = Some(rrule.into());
        self
    }

    pub fn callback_url(mut self, callback_url: impl Into<String>) -> Self {
        self.callback_url = Some(callback_url.into());
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns `true` if no field is being changed.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.rrule.is_none()
            && self.callback_url.is_none()
            && self.method.is_none()
            && self.headers.is_none()
            && self.body.is_none()
    }
}
