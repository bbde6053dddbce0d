//! Pre-queuer: expands recurrence rules into concrete events inside a rolling
//! window and seeds the time-ordered ready queue.

use crate::config::PrequeuerSettings;
use crate::errors::Result;
use crate::index::DynEventIndex;
use crate::model::NewEvent;
use crate::recurrence;
use crate::store::{DynEventStore, DynScheduleStore};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

/// Periodically materializes upcoming occurrences for every schedule.
///
/// Each tick expands all schedules over `[now, now + window)`, inserts the
/// occurrences that do not exist yet, and registers them in the ready queue
/// scored by firing time. The existence check makes ticks idempotent, so
/// overlapping windows across ticks (and across replicas) never duplicate
/// events.
pub struct Prequeuer {
    schedules: DynScheduleStore,
    events: DynEventStore,
    index: DynEventIndex,
    tick_interval: std::time::Duration,
    window: Duration,
}

/// Counters for one pre-queue tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Events inserted and enqueued this tick.
    pub created: usize,
    /// Occurrences skipped because an event already existed.
    pub skipped: usize,
    /// Schedules skipped because their rule failed to parse.
    pub invalid_schedules: usize,
    /// Leaked events re-registered by the reconciliation sweep.
    pub requeued: usize,
}

impl Prequeuer {
    pub fn new(
        schedules: DynScheduleStore,
        events: DynEventStore,
        index: DynEventIndex,
        settings: &PrequeuerSettings,
    ) -> Self {
        Self {
            schedules,
            events,
            index,
            tick_interval: settings.ticker_interval(),
            window: Duration::seconds(settings.event_timeframe().as_secs() as i64),
        }
    }

    /// Run the periodic loop until the shutdown signal fires. The current
    /// tick is finished before exiting.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            tick_seconds = self.tick_interval.as_secs(),
            window_seconds = self.window.num_seconds(),
            "pre-queuer starting"
        );
        let mut ticker = tokio::time::interval(self.tick_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.tick(Utc::now()).await {
                        tracing::error!(error = %err, "pre-queue tick aborted");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("pre-queuer stopped");
    }

    /// Expand every schedule over `[now, now + window)` and run the
    /// reconciliation sweep. A store-level enumeration failure aborts the
    /// tick; per-schedule and per-occurrence failures are isolated.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        let end = now + self.window;
        let mut summary = TickSummary::default();

        let schedules = self.schedules.list().await?;
        tracing::debug!(
            start = %now,
            end = %end,
            schedules = schedules.len(),
            "generating events for timeframe"
        );

        for schedule in schedules {
            let rule = match recurrence::parse(&schedule.rrule, schedule.created_at) {
                Ok(rule) => rule,
                Err(err) => {
                    tracing::error!(
                        schedule_id = %schedule.id,
                        error = %err,
                        "invalid recurrence rule, skipping schedule"
                    );
                    summary.invalid_schedules += 1;
                    continue;
                }
            };

            for run_time in recurrence::between(rule, now, end) {
                match self.events.find_occurrence(&schedule.id, run_time).await {
                    Ok(Some(_)) => {
                        tracing::debug!(
                            schedule_id = %schedule.id,
                            run_time = %run_time,
                            "event already exists, skipping"
                        );
                        summary.skipped += 1;
                        continue;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::error!(
                            schedule_id = %schedule.id,
                            run_time = %run_time,
                            error = %err,
                            "existence check failed"
                        );
                        continue;
                    }
                }

                let event_id = match self
                    .events
                    .insert(NewEvent::pre_queued(&schedule.id, run_time, now))
                    .await
                {
                    Ok(id) => id,
                    Err(err) if err.is_duplicate() => {
                        // Another replica inserted the same occurrence between
                        // the existence check and our insert.
                        tracing::debug!(
                            schedule_id = %schedule.id,
                            run_time = %run_time,
                            "lost the insert race, skipping"
                        );
                        summary.skipped += 1;
                        continue;
                    }
                    Err(err) => {
                        tracing::error!(
                            schedule_id = %schedule.id,
                            run_time = %run_time,
                            error = %err,
                            "failed to insert event"
                        );
                        continue;
                    }
                };

                if let Err(err) = self.index.add_ready(&event_id, run_time.timestamp()).await {
                    // The event stays in the store; the reconciliation sweep
                    // picks it up on a later tick.
                    tracing::error!(
                        event_id = %event_id,
                        error = %err,
                        "failed to enqueue event in ready queue"
                    );
                    continue;
                }

                summary.created += 1;
                tracing::info!(
                    event_id = %event_id,
                    schedule_id = %schedule.id,
                    run_time = %run_time,
                    "pre-queued event"
                );
            }
        }

        match self.reconcile(end).await {
            Ok(requeued) => summary.requeued = requeued,
            Err(err) => tracing::error!(error = %err, "reconciliation sweep aborted"),
        }

        Ok(summary)
    }

    /// Re-register events that exist in the store with status `ready_queue`
    /// but are missing from the index (an insert whose enqueue failed).
    async fn reconcile(&self, end: DateTime<Utc>) -> Result<usize> {
        let mut requeued = 0;

        for event in self.events.ready_due_before(end).await? {
            match self.index.ready_score(&event.id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    if let Err(err) = self
                        .index
                        .add_ready(&event.id, event.run_time.timestamp())
                        .await
                    {
                        tracing::warn!(
                            event_id = %event.id,
                            error = %err,
                            "failed to re-enqueue leaked event"
                        );
                    } else {
                        requeued += 1;
                        tracing::info!(
                            event_id = %event.id,
                            run_time = %event.run_time,
                            "re-enqueued event missing from ready queue"
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        event_id = %event.id,
                        error = %err,
                        "score lookup failed during reconciliation"
                    );
                }
            }
        }

        Ok(requeued)
    }
}
