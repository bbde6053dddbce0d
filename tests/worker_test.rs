mod common;

use chime::{EventArchive, EventIndex, EventStatus, ScheduleDefinition};
use chrono::Duration;
use common::{flaky_http_server, now_secs, Rig};
use std::sync::atomic::Ordering;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn delivers_callback_and_archives_completed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let rig = Rig::new();
    let schedule_id = rig
        .raw_schedule(ScheduleDefinition::new(
            "daily",
            "FREQ=DAILY;COUNT=1",
            format!("{}/hook", server.uri()),
        ))
        .await;
    let event_id = rig.dispatched_event(&schedule_id, now_secs()).await;

    let pool = rig.worker_pool(1, 3);
    assert!(pool.process_next().await.unwrap());

    // Terminal state: removed from the active collection, archived with a
    // completed entry.
    assert_eq!(rig.store.event_count(), 0);
    let archived = EventArchive::get(&rig.store, &event_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(archived.current_status(), Some(EventStatus::Completed));
    assert!(archived.has_status(EventStatus::ReadyQueue));
    assert!(archived.has_status(EventStatus::WorkerQueue));

    // Queue drained: nothing left to process.
    assert!(!pool.process_next().await.unwrap());
    assert_eq!(rig.store.archived_count(), 1);
}

#[tokio::test]
async fn sends_configured_method_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .and(header("x-token", "abc"))
        .and(body_string("{\"k\":1}"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let rig = Rig::new();
    let schedule_id = rig
        .raw_schedule(
            ScheduleDefinition::new(
                "ingest",
                "FREQ=DAILY",
                format!("{}/ingest", server.uri()),
            )
            .method("POST")
            .header("X-Token", "abc")
            .body("{\"k\":1}"),
        )
        .await;
    rig.dispatched_event(&schedule_id, now_secs()).await;

    rig.worker_pool(1, 3).process_next().await.unwrap();
    assert_eq!(rig.store.archived_count(), 1);
}

#[tokio::test]
async fn http_error_status_still_counts_as_delivered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let rig = Rig::new();
    let schedule_id = rig
        .raw_schedule(ScheduleDefinition::new(
            "daily",
            "FREQ=DAILY",
            format!("{}/hook", server.uri()),
        ))
        .await;
    let event_id = rig.dispatched_event(&schedule_id, now_secs()).await;

    rig.worker_pool(1, 3).process_next().await.unwrap();

    let archived = EventArchive::get(&rig.store, &event_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(archived.current_status(), Some(EventStatus::Completed));
}

#[tokio::test]
async fn transport_failure_retries_then_succeeds() {
    let (url, hits) = flaky_http_server(1).await;

    let rig = Rig::new();
    let schedule_id = rig
        .raw_schedule(ScheduleDefinition::new("retry", "FREQ=DAILY", url))
        .await;
    let event_id = rig.dispatched_event(&schedule_id, now_secs()).await;

    rig.worker_pool(1, 3).process_next().await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 2, "one failure, one success");
    let archived = EventArchive::get(&rig.store, &event_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(archived.current_status(), Some(EventStatus::Completed));
}

#[tokio::test]
async fn exhausted_retries_archive_the_event_as_error() {
    let (url, hits) = flaky_http_server(usize::MAX).await;

    let rig = Rig::new();
    let schedule_id = rig
        .raw_schedule(ScheduleDefinition::new("down", "FREQ=DAILY", url))
        .await;
    let event_id = rig.dispatched_event(&schedule_id, now_secs()).await;

    rig.worker_pool(1, 3).process_next().await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 3, "all attempts consumed");
    let archived = EventArchive::get(&rig.store, &event_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(archived.current_status(), Some(EventStatus::Error));
    let last = archived.status_log.last().unwrap();
    assert!(
        last.message.starts_with("Callback failed after max retries:"),
        "unexpected message: {}",
        last.message
    );
}

#[tokio::test]
async fn missing_schedule_archives_the_event_as_error() {
    let rig = Rig::new();
    let event_id = rig.dispatched_event("deleted-schedule", now_secs()).await;

    rig.worker_pool(1, 3).process_next().await.unwrap();

    let archived = EventArchive::get(&rig.store, &event_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(archived.current_status(), Some(EventStatus::Error));
    assert!(archived
        .status_log
        .last()
        .unwrap()
        .message
        .contains("Failed to retrieve schedule"));
}

#[tokio::test]
async fn missing_event_is_skipped_without_side_effects() {
    let rig = Rig::new();
    rig.index.push_work("ghost").await.unwrap();

    let pool = rig.worker_pool(1, 3);
    assert!(pool.process_next().await.unwrap());

    assert_eq!(rig.store.event_count(), 0);
    assert_eq!(rig.store.archived_count(), 0);
    assert!(!pool.process_next().await.unwrap());
}

#[tokio::test]
async fn pool_drains_queue_and_shuts_down_within_grace() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let rig = Rig::new();
    let schedule_id = rig
        .raw_schedule(ScheduleDefinition::new(
            "burst",
            "FREQ=DAILY",
            format!("{}/hook", server.uri()),
        ))
        .await;
    let now = now_secs();
    for offset in 0..3 {
        rig.dispatched_event(&schedule_id, now + Duration::seconds(offset))
            .await;
    }

    let pool = rig.worker_pool(2, 3);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { pool.run_until(shutdown_rx).await });

    // Give the workers time to drain the queue, then signal shutdown.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        if rig.store.archived_count() == 3 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "workers did not drain the queue in time"
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    shutdown_tx.send(true).unwrap();

    let result = tokio::time::timeout(std::time::Duration::from_secs(2), handle)
        .await
        .expect("pool shut down within the grace period")
        .expect("pool task did not panic");
    assert!(result.is_ok());
    assert_eq!(rig.store.event_count(), 0);
}
