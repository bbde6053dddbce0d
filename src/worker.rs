//! Worker pool: consumes the worker queue, performs HTTP callbacks with
//! bounded retries, and archives each event.

use crate::config::WorkerSettings;
use crate::errors::{ChimeError, Result};
use crate::index::DynEventIndex;
use crate::model::{EventStatus, Schedule};
use crate::status;
use crate::store::{DynEventArchive, DynEventStore, DynScheduleStore};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use url::Url;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`WorkerPool`].
pub struct WorkerPoolBuilder {
    schedules: DynScheduleStore,
    events: DynEventStore,
    archive: DynEventArchive,
    index: DynEventIndex,
    count: usize,
    max_retries: u32,
    retry_delay: Duration,
    idle_delay: Duration,
    grace_period: Duration,
    timeout: Duration,
    http_client: Option<reqwest::Client>,
}

impl WorkerPoolBuilder {
    fn new(
        schedules: DynScheduleStore,
        events: DynEventStore,
        archive: DynEventArchive,
        index: DynEventIndex,
    ) -> Self {
        Self {
            schedules,
            events,
            archive,
            index,
            count: 5,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            idle_delay: Duration::from_secs(1),
            grace_period: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
            http_client: None,
        }
    }

    /// Set the number of concurrent worker tasks.
    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Set the maximum number of callback attempts per event (inclusive).
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Apply `worker.count` and `worker.max_retries` from loaded settings.
    pub fn settings(mut self, settings: &WorkerSettings) -> Self {
        self.count = settings.count;
        self.max_retries = settings.max_retries;
        self
    }

    /// Set the pause between failed callback attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set how long an idle worker sleeps before polling the queue again.
    pub fn idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }

    /// Set the grace period for shutdown (time to wait for in-flight events).
    pub fn grace_period(mut self, period: Duration) -> Self {
        self.grace_period = period;
        self
    }

    /// Set the callback request timeout. Defaults to 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Provide a custom reqwest HTTP client (shared across all workers).
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Build the pool.
    pub fn build(self) -> Result<WorkerPool> {
        if self.count == 0 {
            return Err(ChimeError::Validation(
                "worker count must be greater than zero".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ChimeError::Validation(
                "max retries must be greater than zero".to_string(),
            ));
        }

        let http = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder().timeout(self.timeout).build()?,
        };

        Ok(WorkerPool {
            inner: Arc::new(PoolInner {
                schedules: self.schedules,
                events: self.events,
                archive: self.archive,
                index: self.index,
                http,
                max_retries: self.max_retries,
                retry_delay: self.retry_delay,
                idle_delay: self.idle_delay,
            }),
            count: self.count,
            grace_period: self.grace_period,
        })
    }
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// A pool of N callback workers draining the worker queue.
///
/// # Example
///
/// ```rust,no_run
/// use chime::{MemoryIndex, MemoryStore, WorkerPool};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> chime::Result<()> {
/// let store = MemoryStore::new();
/// let index = Arc::new(MemoryIndex::new());
///
/// let pool = WorkerPool::builder(
///     Arc::new(store.clone()),
///     Arc::new(store.clone()),
///     Arc::new(store),
///     index,
/// )
/// .count(5)
/// .max_retries(3)
/// .build()?;
///
/// pool.start().await?;
/// # Ok(())
/// # }
/// ```
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    count: usize,
    grace_period: Duration,
}

struct PoolInner {
    schedules: DynScheduleStore,
    events: DynEventStore,
    archive: DynEventArchive,
    index: DynEventIndex,
    http: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
    idle_delay: Duration,
}

impl WorkerPool {
    /// Create a new pool builder over the given stores and index.
    pub fn builder(
        schedules: DynScheduleStore,
        events: DynEventStore,
        archive: DynEventArchive,
        index: DynEventIndex,
    ) -> WorkerPoolBuilder {
        WorkerPoolBuilder::new(schedules, events, archive, index)
    }

    /// Number of worker tasks this pool spawns.
    pub fn worker_count(&self) -> usize {
        self.count
    }

    /// Run the pool until Ctrl-C, then shut down gracefully.
    pub async fn start(&self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            let _ = shutdown_tx.send(true);
        });
        self.run_until(shutdown_rx).await
    }

    /// Run the pool until the shutdown signal fires.
    ///
    /// Workers finish their in-flight event and exit at the next dequeue
    /// attempt; whatever is still running when the grace period expires is
    /// aborted.
    pub async fn run_until(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(workers = self.count, "worker pool starting");

        let mut join_set = JoinSet::new();
        for worker_id in 1..=self.count {
            let pool = self.inner.clone();
            let rx = shutdown.clone();
            join_set.spawn(worker_loop(worker_id, pool, rx));
        }

        let mut shutdown_rx = shutdown;
        loop {
            tokio::select! {
                joined = join_set.join_next() => {
                    match joined {
                        None => break,
                        Some(Err(err)) => tracing::error!(error = %err, "worker task panicked"),
                        Some(Ok(())) => {}
                    }
                }
                _ = shutdown_rx.changed() => {
                    self.drain_with_grace(&mut join_set).await;
                    break;
                }
            }
        }

        tracing::info!("worker pool stopped");
        Ok(())
    }

    /// Pop and process a single event. Returns `Ok(false)` when the worker
    /// queue is empty. Useful for embedders draining the queue on their own
    /// cadence and for deterministic tests.
    pub async fn process_next(&self) -> Result<bool> {
        match self.inner.index.pop_work().await? {
            Some(event_id) => {
                self.inner.process_event(0, &event_id).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn drain_with_grace(&self, join_set: &mut JoinSet<()>) {
        let deadline = tokio::time::Instant::now() + self.grace_period;
        loop {
            tokio::select! {
                joined = join_set.join_next() => {
                    match joined {
                        None => return,
                        Some(Err(err)) => {
                            tracing::error!(error = %err, "worker task panicked during shutdown");
                        }
                        Some(Ok(())) => {}
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        remaining = join_set.len(),
                        "grace period expired, aborting remaining workers"
                    );
                    join_set.shutdown().await;
                    return;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

async fn worker_loop(worker_id: usize, pool: Arc<PoolInner>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            tracing::info!(worker_id, "worker stopped by cancellation");
            return;
        }

        match pool.index.pop_work().await {
            Ok(Some(event_id)) => pool.process_event(worker_id, &event_id).await,
            Ok(None) => {
                tracing::trace!(worker_id, "no events in worker queue");
                tokio::select! {
                    _ = tokio::time::sleep(pool.idle_delay) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Err(err) => {
                tracing::error!(
                    worker_id,
                    error = %err,
                    "failed to fetch event from worker queue"
                );
                tokio::select! {
                    _ = tokio::time::sleep(pool.idle_delay) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event processing
// ---------------------------------------------------------------------------

struct CallbackRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<String>,
}

impl PoolInner {
    async fn process_event(&self, worker_id: usize, event_id: &str) {
        let event = match self.events.get(event_id).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::error!(worker_id, event_id, "event not found in store");
                self.record_error(event_id, "Failed to retrieve event: not found")
                    .await;
                return;
            }
            Err(err) => {
                tracing::error!(worker_id, event_id, error = %err, "failed to retrieve event");
                self.record_error(event_id, format!("Failed to retrieve event: {err}"))
                    .await;
                return;
            }
        };

        let schedule = match self.schedules.get(&event.schedule_id).await {
            Ok(Some(schedule)) => schedule,
            Ok(None) => {
                tracing::error!(
                    worker_id,
                    event_id,
                    schedule_id = %event.schedule_id,
                    "schedule not found"
                );
                self.record_error(
                    event_id,
                    format!("Failed to retrieve schedule: {} not found", event.schedule_id),
                )
                .await;
                return;
            }
            Err(err) => {
                tracing::error!(worker_id, event_id, error = %err, "failed to retrieve schedule");
                self.record_error(event_id, format!("Failed to retrieve schedule: {err}"))
                    .await;
                return;
            }
        };

        let request = match build_callback_request(&schedule) {
            Ok(request) => request,
            Err(err) => {
                tracing::error!(worker_id, event_id, error = %err, "invalid callback request");
                self.record_error(event_id, format!("Failed to build callback request: {err}"))
                    .await;
                return;
            }
        };

        self.deliver(worker_id, event_id, request).await;
    }

    /// Attempt the callback up to `max_retries` times. Any HTTP response,
    /// error statuses included, counts as delivered; only transport failures
    /// are retried.
    async fn deliver(&self, worker_id: usize, event_id: &str, request: CallbackRequest) {
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            let mut builder = self
                .http
                .request(request.method.clone(), request.url.clone())
                .headers(request.headers.clone());
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            match builder.send().await {
                Ok(response) => {
                    tracing::info!(
                        worker_id,
                        event_id,
                        http_status = response.status().as_u16(),
                        attempt,
                        "callback delivered, marking event as completed"
                    );
                    if let Err(err) = status::update_and_archive(
                        self.events.as_ref(),
                        self.archive.as_ref(),
                        event_id,
                        EventStatus::Completed,
                        "Event successfully processed",
                    )
                    .await
                    {
                        tracing::error!(
                            worker_id,
                            event_id,
                            error = %err,
                            "failed to mark event as completed"
                        );
                        self.record_error(
                            event_id,
                            format!("Failed to update status to completed: {err}"),
                        )
                        .await;
                    }
                    return;
                }
                Err(err) => {
                    tracing::warn!(
                        worker_id,
                        event_id,
                        attempt,
                        error = %err,
                        "callback attempt failed"
                    );
                    last_error = err.to_string();
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        tracing::error!(
            worker_id,
            event_id,
            error = %last_error,
            "callback failed after max retries"
        );
        self.record_error(
            event_id,
            format!("Callback failed after max retries: {last_error}"),
        )
        .await;
    }

    async fn record_error(&self, event_id: &str, message: impl Into<String>) {
        status::record_error_and_archive(
            self.events.as_ref(),
            self.archive.as_ref(),
            event_id,
            message,
        )
        .await;
    }
}

fn build_callback_request(schedule: &Schedule) -> Result<CallbackRequest> {
    let method = match schedule.method.as_deref().filter(|m| !m.is_empty()) {
        None => Method::GET,
        Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
            .map_err(|_| ChimeError::Validation(format!("invalid HTTP method: {m}")))?,
    };

    let url = Url::parse(&schedule.callback_url)?;

    let mut headers = HeaderMap::new();
    if let Some(map) = &schedule.headers {
        for (key, value) in map {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| ChimeError::Validation(format!("invalid header name: {key}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ChimeError::Validation(format!("invalid value for header {key}")))?;
            headers.insert(name, value);
        }
    }

    Ok(CallbackRequest {
        method,
        url,
        headers,
        body: schedule.body.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn schedule(method: Option<&str>) -> Schedule {
        Schedule {
            id: "sched".into(),
            name: "ping".into(),
            rrule: "FREQ=DAILY".into(),
            callback_url: "http://example.com/cb".into(),
            method: method.map(String::from),
            headers: None,
            body: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn method_defaults_to_get() {
        let request = build_callback_request(&schedule(None)).unwrap();
        assert_eq!(request.method, Method::GET);

        let request = build_callback_request(&schedule(Some(""))).unwrap();
        assert_eq!(request.method, Method::GET);
    }

    #[test]
    fn method_is_case_insensitive() {
        let request = build_callback_request(&schedule(Some("post"))).unwrap();
        assert_eq!(request.method, Method::POST);
    }

    #[test]
    fn relative_callback_url_is_rejected() {
        let mut bad = schedule(None);
        bad.callback_url = "/relative/path".into();
        assert!(matches!(
            build_callback_request(&bad),
            Err(ChimeError::InvalidUrl(_))
        ));
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let mut bad = schedule(None);
        bad.headers = Some(
            [("bad header".to_string(), "v".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(matches!(
            build_callback_request(&bad),
            Err(ChimeError::Validation(_))
        ));
    }
}
