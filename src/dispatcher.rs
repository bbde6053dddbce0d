//! Dispatcher: promotes due events from the ready queue to the worker queue
//! under an atomic claim.

use crate::errors::Result;
use crate::index::DynEventIndex;
use crate::model::EventStatus;
use crate::status;
use crate::store::{DynEventArchive, DynEventStore};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

/// How often due events are promoted.
const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// Default sub-second slack subtracted from the cutoff to smooth clock
/// lead/lag between replicas.
const DEFAULT_SLACK_MS: i64 = 400;

/// Promotes events whose firing time has arrived.
///
/// The atomic remove on the ready queue is the claim: the replica whose
/// remove-count is 1 owns the event and alone appends the `worker_queue`
/// status and pushes the work item. Any number of dispatcher replicas can
/// tick against the same index without further coordination.
pub struct Dispatcher {
    events: DynEventStore,
    archive: DynEventArchive,
    index: DynEventIndex,
    slack: Duration,
}

impl Dispatcher {
    pub fn new(events: DynEventStore, archive: DynEventArchive, index: DynEventIndex) -> Self {
        Self {
            events,
            archive,
            index,
            slack: Duration::milliseconds(DEFAULT_SLACK_MS),
        }
    }

    /// Override the cutoff slack. Zero disables it.
    pub fn with_slack(mut self, slack: std::time::Duration) -> Self {
        self.slack = Duration::milliseconds(slack.as_millis() as i64);
        self
    }

    /// Run the 1-second promotion loop until the shutdown signal fires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("dispatcher starting");
        let mut ticker = tokio::time::interval(TICK_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.tick(Utc::now()).await {
                        tracing::error!(error = %err, "dispatch tick aborted");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("dispatcher stopped");
    }

    /// Promote every event due at `now`; returns how many were pushed to the
    /// worker queue. Per-event failures are isolated: once an event is
    /// claimed, any downstream failure records an `error` status and archives
    /// it rather than dropping it silently.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = (now - self.slack).timestamp();
        let due = self.index.due_ready(cutoff).await?;
        if due.is_empty() {
            tracing::trace!("no due events in ready queue");
            return Ok(0);
        }

        let mut dispatched = 0;
        for event_id in due {
            match self.index.remove_ready(&event_id).await {
                Ok(0) => {
                    tracing::debug!(
                        event_id = %event_id,
                        "event already claimed by another dispatcher, skipping"
                    );
                    continue;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(
                        event_id = %event_id,
                        error = %err,
                        "failed to remove event from ready queue"
                    );
                    status::record_error_and_archive(
                        self.events.as_ref(),
                        self.archive.as_ref(),
                        &event_id,
                        format!("Failed to remove from ready queue: {err}"),
                    )
                    .await;
                    continue;
                }
            }

            if let Err(err) = status::update_status(
                self.events.as_ref(),
                &event_id,
                EventStatus::WorkerQueue,
                "Event dispatched to worker queue",
            )
            .await
            {
                tracing::error!(
                    event_id = %event_id,
                    error = %err,
                    "failed to update event status to worker_queue"
                );
                status::record_error_and_archive(
                    self.events.as_ref(),
                    self.archive.as_ref(),
                    &event_id,
                    format!("Failed to update status to worker_queue: {err}"),
                )
                .await;
                continue;
            }

            if let Err(err) = self.index.push_work(&event_id).await {
                tracing::error!(
                    event_id = %event_id,
                    error = %err,
                    "failed to push event to worker queue"
                );
                status::record_error_and_archive(
                    self.events.as_ref(),
                    self.archive.as_ref(),
                    &event_id,
                    format!("Failed to push to worker queue: {err}"),
                )
                .await;
                continue;
            }

            dispatched += 1;
            tracing::info!(event_id = %event_id, "dispatched event to worker queue");
        }

        Ok(dispatched)
    }
}
