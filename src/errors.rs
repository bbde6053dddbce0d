use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Main crate error type
// ---------------------------------------------------------------------------

/// Errors produced by the scheduler pipeline and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ChimeError {
    /// Durable document store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Priority index failure.
    #[error("index error: {0}")]
    Index(String),

    /// Callback transport failure (connection, timeout, malformed request).
    #[error("callback error: {0}")]
    Callback(String),

    /// The recurrence rule does not parse or validate.
    #[error("invalid recurrence rule: {0}")]
    InvalidRule(String),

    /// The callback URL is not a valid absolute URL.
    #[error("invalid callback URL: {0}")]
    InvalidUrl(String),

    /// A field-level validation failure (empty name, bad method, ...).
    #[error("{0}")]
    Validation(String),

    /// No schedule exists with the given id.
    #[error("schedule not found: {0}")]
    ScheduleNotFound(String),

    /// No active event exists with the given id.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// An event for this `(schedule_id, run_time)` pair already exists.
    #[error("duplicate event for schedule {schedule_id} at {run_time}")]
    DuplicateEvent {
        schedule_id: String,
        run_time: DateTime<Utc>,
    },

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ChimeError {
    /// Returns `true` if this error reports a missing schedule or event.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ChimeError::ScheduleNotFound(_) | ChimeError::EventNotFound(_)
        )
    }

    /// Returns `true` if this error reports a duplicate occurrence insert.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ChimeError::DuplicateEvent { .. })
    }
}

impl From<reqwest::Error> for ChimeError {
    fn from(err: reqwest::Error) -> Self {
        ChimeError::Callback(err.to_string())
    }
}

impl From<url::ParseError> for ChimeError {
    fn from(err: url::ParseError) -> Self {
        ChimeError::InvalidUrl(err.to_string())
    }
}

impl From<config::ConfigError> for ChimeError {
    fn from(err: config::ConfigError) -> Self {
        ChimeError::Config(err.to_string())
    }
}

#[cfg(feature = "redis-index")]
impl From<redis::RedisError> for ChimeError {
    fn from(err: redis::RedisError) -> Self {
        ChimeError::Index(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Result type alias
// ---------------------------------------------------------------------------

pub type Result<T> = std::result::Result<T, ChimeError>;
