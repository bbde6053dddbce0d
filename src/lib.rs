//! # Chime: a persistent, distributed recurring-event scheduler
//!
//! Register schedules as RFC-5545 recurrence rules bound to an HTTP callback;
//! chime materializes each occurrence into a durable event and invokes the
//! callback at its scheduled time, with bounded retries and a full audit
//! trail. Completed and failed events are archived for history queries.
//!
//! Three cooperating stages move events through their lifecycle, and any
//! number of replicas of each stage can run against the same stores:
//!
//! 1. [`Prequeuer`] expands rules into events inside a rolling window and
//!    seeds the time-ordered ready queue.
//! 2. [`Dispatcher`] promotes due events to the worker queue under an atomic
//!    claim, so exactly one replica owns each event.
//! 3. [`WorkerPool`] performs the HTTP callbacks and archives the results.
//!
//! Storage is pluggable: the document store is consumed through the
//! [`store`] traits and the priority index through [`index::EventIndex`].
//! [`MemoryStore`] and [`MemoryIndex`] back tests and embedded use;
//! `RedisIndex` (feature `redis-index`, on by default) runs the index
//! against Redis.
//!
//! ## Registering schedules
//!
//! ```rust,no_run
//! use chime::{MemoryStore, ScheduleDefinition, ScheduleService};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> chime::Result<()> {
//! let store = MemoryStore::new();
//! let service = ScheduleService::new(
//!     Arc::new(store.clone()),
//!     Arc::new(store.clone()),
//!     Arc::new(store),
//! );
//!
//! let id = service
//!     .create(
//!         ScheduleDefinition::new("nightly-report", "FREQ=DAILY", "http://localhost:9000/hook")
//!             .method("POST")
//!             .header("Authorization", "Bearer s3cr3t")
//!             .body(r#"{"report":"nightly"}"#),
//!     )
//!     .await?;
//! println!("registered schedule {id}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Running the pipeline
//!
//! ```rust,no_run
//! use chime::{Dispatcher, MemoryIndex, MemoryStore, Prequeuer, Settings, WorkerPool};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> chime::Result<()> {
//! let settings = Settings::load(None, &[])?;
//! chime::logging::init(&settings.log.level);
//!
//! let store = Arc::new(MemoryStore::new());
//! let index = Arc::new(MemoryIndex::new());
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let prequeuer = Prequeuer::new(
//!     store.clone(),
//!     store.clone(),
//!     index.clone(),
//!     &settings.prequeuer,
//! );
//! let dispatcher = Dispatcher::new(store.clone(), store.clone(), index.clone());
//! let workers = WorkerPool::builder(store.clone(), store.clone(), store.clone(), index)
//!     .settings(&settings.worker)
//!     .build()?;
//!
//! tokio::select! {
//!     _ = prequeuer.run(shutdown_rx.clone()) => {}
//!     _ = dispatcher.run(shutdown_rx.clone()) => {}
//!     result = workers.run_until(shutdown_rx) => { result?; }
//!     _ = tokio::signal::ctrl_c() => { let _ = shutdown_tx.send(true); }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod index;
pub mod logging;
pub mod model;
pub mod prequeuer;
pub mod recurrence;
pub mod schedules;
pub mod status;
pub mod store;
pub mod worker;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use config::Settings;
pub use dispatcher::Dispatcher;
pub use errors::{ChimeError, Result};
#[cfg(feature = "redis-index")]
pub use index::RedisIndex;
pub use index::{DynEventIndex, EventIndex, MemoryIndex};
pub use model::{
    Event, EventStatus, NewEvent, Schedule, ScheduleChanges, ScheduleDefinition, StatusEntry,
};
pub use prequeuer::{Prequeuer, TickSummary};
pub use schedules::ScheduleService;
pub use store::{
    DynEventArchive, DynEventStore, DynScheduleStore, EventArchive, EventStore, MemoryStore, Page,
    ScheduleStore,
};
pub use worker::{WorkerPool, WorkerPoolBuilder};
