#![allow(dead_code)]

use chime::config::PrequeuerSettings;
use chime::{
    Dispatcher, EventStatus, MemoryIndex, MemoryStore, NewEvent, Prequeuer, ScheduleDefinition,
    ScheduleService, StatusEntry, WorkerPool,
};
use chime::{EventIndex, EventStore, ScheduleStore};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Everything the pipeline stages share in a test.
#[derive(Clone)]
pub struct Rig {
    pub store: MemoryStore,
    pub index: Arc<MemoryIndex>,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            index: Arc::new(MemoryIndex::new()),
        }
    }

    pub fn service(&self) -> ScheduleService {
        ScheduleService::new(
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
        )
    }

    pub fn prequeuer(&self, tick_seconds: u64, window_minutes: u64) -> Prequeuer {
        Prequeuer::new(
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            self.index.clone(),
            &PrequeuerSettings {
                ticker_interval_seconds: tick_seconds,
                event_timeframe_minutes: window_minutes,
            },
        )
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            self.index.clone(),
        )
    }

    pub fn worker_pool(&self, count: usize, max_retries: u32) -> WorkerPool {
        WorkerPool::builder(
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            self.index.clone(),
        )
        .count(count)
        .max_retries(max_retries)
        .retry_delay(Duration::from_millis(20))
        .idle_delay(Duration::from_millis(20))
        .grace_period(Duration::from_millis(500))
        .timeout(Duration::from_secs(2))
        .build()
        .expect("worker pool builds")
    }

    /// Register a schedule directly in the store, skipping service validation.
    pub async fn raw_schedule(&self, definition: ScheduleDefinition) -> String {
        ScheduleStore::insert(&self.store, definition, Utc::now())
            .await
            .expect("schedule insert")
    }

    /// Insert an event and place it in the worker queue with a `worker_queue`
    /// status entry, as the dispatcher would.
    pub async fn dispatched_event(&self, schedule_id: &str, run_time: DateTime<Utc>) -> String {
        let event_id = EventStore::insert(
            &self.store,
            NewEvent::pre_queued(schedule_id, run_time, Utc::now()),
        )
        .await
        .expect("event insert");
        self.store
            .append_status(
                &event_id,
                StatusEntry::now(EventStatus::WorkerQueue, "Event dispatched to worker queue"),
            )
            .await
            .expect("status append");
        self.index
            .push_work(&event_id)
            .await
            .expect("worker queue push");
        event_id
    }

    /// Insert an event and place it in the ready queue, as the pre-queuer
    /// would.
    pub async fn ready_event(&self, schedule_id: &str, run_time: DateTime<Utc>) -> String {
        let event_id = EventStore::insert(
            &self.store,
            NewEvent::pre_queued(schedule_id, run_time, Utc::now()),
        )
        .await
        .expect("event insert");
        self.index
            .add_ready(&event_id, run_time.timestamp())
            .await
            .expect("ready queue add");
        event_id
    }
}

/// An RRULE fragment with an explicit DTSTART, e.g. one minute from now.
pub fn rrule_starting_at(start: DateTime<Utc>, rule: &str) -> String {
    format!("DTSTART:{}\nRRULE:{}", start.format("%Y%m%dT%H%M%SZ"), rule)
}

/// A minimal HTTP server that closes the first `fail_first` connections
/// before responding (a transport error for the client) and answers
/// `200 OK` afterwards. Returns the callback URL and the connection counter.
pub async fn flaky_http_server(fail_first: usize) -> (String, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let seen = counter.fetch_add(1, Ordering::SeqCst);
            if seen < fail_first {
                // Close before any byte of response reaches the client.
                drop(socket);
                continue;
            }
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}/callback"), hits)
}

/// Current UTC time truncated to whole seconds.
pub fn now_secs() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).expect("valid timestamp")
}
