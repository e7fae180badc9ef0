use async_trait::async_trait;
use readmodel_core::{
    EngineConfig, Event, FeedError, FieldValue, FnTransform, ReadModelError, Record, Result, Sink,
    SinkSlot, StreamStatus, Transform, TransformOutput,
};
use readmodel_projector::memory::{sample_event, MemoryConnector, MemoryFeed, MemorySink, StaticLoader};
use readmodel_projector::{EngineContext, ProjectorRegistry, StartStream, StreamRegistry};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    streams: StreamRegistry,
    projectors: Arc<ProjectorRegistry>,
    connector: MemoryConnector,
    sink: MemorySink,
    slot: SinkSlot,
}

fn harness(events: Vec<Event>, config: EngineConfig) -> Harness {
    let connector = MemoryConnector::new(MemoryFeed::new(events));
    let projectors = Arc::new(ProjectorRegistry::new(Arc::new(StaticLoader::new())));
    let sink = MemorySink::new();
    let slot = SinkSlot::new();
    slot.replace(Arc::new(sink.clone()));

    let streams = StreamRegistry::new(EngineContext {
        connector: Arc::new(connector.clone()),
        projectors: projectors.clone(),
        sink: slot.clone(),
        config,
        page_size: 4,
    });

    Harness {
        streams,
        projectors,
        connector,
        sink,
        slot,
    }
}

fn config() -> EngineConfig {
    EngineConfig::default()
        .with_batch_size(2)
        .with_buffer_size(6)
        .with_idle_poll_interval_ms(10)
}

fn order_events() -> Vec<Event> {
    vec![
        sample_event("o-1", "order.created", "2025-01-01T00:10:00Z"),
        sample_event("o-2", "order.created", "2025-01-01T01:20:00Z"),
        sample_event("p-1", "order.paid", "2025-01-01T01:25:00Z"),
        sample_event("o-3", "order.created", "2025-01-01T03:00:00Z"),
        sample_event("o-4", "order.created", "2025-01-01T09:45:00Z"),
        sample_event("p-2", "order.paid", "2025-01-01T10:00:00Z"),
        sample_event("o-5", "order.created", "2025-01-01T23:59:00Z"),
        sample_event("o-6", "order.created", "2025-01-02T06:00:00Z"),
    ]
}

fn flat_projector() -> Arc<dyn Transform> {
    Arc::new(FnTransform(|event: &Event| {
        Ok(TransformOutput::One(
            Record::new()
                .with("event_id", event.event_id.clone())
                .with("event_type", event.event_type.clone())
                .with("valid_time", event.valid_time),
        ))
    }))
}

fn orders_request(target_table: Option<&str>, max_parallelism: Option<usize>) -> StartStream {
    StartStream {
        tenant: "acme".into(),
        data_core: "orders".into(),
        flow_type: "order".into(),
        event_types: vec!["order.created".into()],
        start_date: "2025-01-01".into(),
        end_date: "2025-01-02".into(),
        projector_name: "orderProjector".into(),
        target_table: target_table.map(str::to_string),
        max_parallelism,
        include_sensitive_data: false,
    }
}

async fn finished(h: &Harness, id: &str) -> readmodel_projector::StreamSnapshot {
    tokio::time::timeout(Duration::from_secs(5), h.streams.wait_finished(id))
        .await
        .expect("stream did not finish")
        .unwrap()
}

#[tokio::test]
async fn window_completes_with_one_count_per_event() {
    let h = harness(order_events(), config());
    h.projectors
        .register_transform("orderProjector", flat_projector())
        .unwrap();

    let started = h
        .streams
        .start(orders_request(Some("orders_flat"), Some(5)))
        .unwrap();
    assert_eq!(started.status, StreamStatus::Initializing);
    assert_eq!(started.event_count, 0);

    let done = finished(&h, &started.stream_id).await;
    assert_eq!(done.status, StreamStatus::Completed);
    assert_eq!(done.event_count, 5);
    assert!(done.error.is_none());
    assert!(done.batches_delivered >= 3);
    assert!(done.processed_time_buckets.contains(&"20250101000000".to_string()));

    let rows = h.sink.rows("orders_flat");
    let mut ids: Vec<_> = rows
        .iter()
        .filter_map(|r| match r.get("event_id") {
            Some(FieldValue::Text(id)) => Some(id.clone()),
            _ => None,
        })
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["o-1", "o-2", "o-3", "o-4", "o-5"]);
    assert_eq!(h.connector.connect_count(), 1);
}

#[tokio::test]
async fn window_start_inside_an_hour_excludes_earlier_events() {
    let h = harness(
        vec![
            sample_event("early", "order.created", "2025-01-01T05:10:00Z"),
            sample_event("inside", "order.created", "2025-01-01T05:40:00Z"),
        ],
        config(),
    );
    h.projectors
        .register_transform("orderProjector", flat_projector())
        .unwrap();

    let mut request = orders_request(Some("orders_flat"), None);
    request.start_date = "2025-01-01T05:30:00Z".into();
    let started = h.streams.start(request).unwrap();

    let done = finished(&h, &started.stream_id).await;
    assert_eq!(done.status, StreamStatus::Completed);
    assert_eq!(done.event_count, 1);
    let rows = h.sink.rows("orders_flat");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("event_id"),
        Some(&FieldValue::Text("inside".into()))
    );
}

#[tokio::test]
async fn status_passes_through_running() {
    let h = harness(order_events(), config());
    h.projectors
        .register_transform("orderProjector", flat_projector())
        .unwrap();

    let started = h.streams.start(orders_request(None, None)).unwrap();
    let done = finished(&h, &started.stream_id).await;
    // The feed was contacted, which only happens after RUNNING
    assert!(h.connector.feed().fetch_count() > 0);
    assert_eq!(done.status, StreamStatus::Completed);
    assert_eq!(done.max_parallelism, 100);
}

#[tokio::test]
async fn fan_out_inserts_every_record() {
    let h = harness(order_events(), config());
    h.projectors
        .register_transform(
            "orderProjector",
            Arc::new(FnTransform(|event: &Event| {
                Ok(TransformOutput::Many(
                    (0..3)
                        .map(|line| {
                            Record::new()
                                .with("event_id", event.event_id.clone())
                                .with("line", line as i64)
                        })
                        .collect(),
                ))
            })),
        )
        .unwrap();

    let started = h.streams.start(orders_request(Some("lines"), None)).unwrap();
    let done = finished(&h, &started.stream_id).await;
    assert_eq!(done.status, StreamStatus::Completed);
    assert_eq!(h.sink.rows("lines").len(), 15);
    assert_eq!(done.event_count, 5);
}

#[tokio::test]
async fn partial_insert_failure_is_recorded_and_processing_continues() {
    let connector = MemoryConnector::new(MemoryFeed::new(order_events()));
    let projectors = Arc::new(ProjectorRegistry::new(Arc::new(StaticLoader::new())));
    let sink = MemorySink::new().rejecting(|record| {
        matches!(record.get("event_id"), Some(FieldValue::Text(id)) if id == "o-3")
    });
    let slot = SinkSlot::new();
    slot.replace(Arc::new(sink.clone()));
    let streams = StreamRegistry::new(EngineContext {
        connector: Arc::new(connector),
        projectors: projectors.clone(),
        sink: slot,
        config: config(),
        page_size: 4,
    });
    projectors
        .register_transform("orderProjector", flat_projector())
        .unwrap();

    let started = streams.start(orders_request(Some("orders_flat"), None)).unwrap();
    let done = streams.wait_finished(&started.stream_id).await.unwrap();

    assert_eq!(done.status, StreamStatus::Completed);
    assert_eq!(done.event_count, 4);
    assert_eq!(sink.rows("orders_flat").len(), 4);
    assert!(done.error.unwrap().contains("orders_flat"));
}

#[tokio::test]
async fn transform_failure_is_per_event() {
    let h = harness(order_events(), config());
    h.projectors
        .register_transform(
            "orderProjector",
            Arc::new(FnTransform(|event: &Event| {
                if event.event_id == "o-2" {
                    return Err(ReadModelError::Transform("bad payload".into()));
                }
                Ok(TransformOutput::One(
                    Record::new().with("event_id", event.event_id.clone()),
                ))
            })),
        )
        .unwrap();

    let started = h.streams.start(orders_request(Some("t"), None)).unwrap();
    let done = finished(&h, &started.stream_id).await;
    assert_eq!(done.status, StreamStatus::Completed);
    assert_eq!(done.event_count, 4);
    let error = done.error.unwrap();
    assert!(error.contains("failed to project event o-2"));
    assert!(error.contains("bad payload"));
}

#[tokio::test]
async fn newest_registration_is_used() {
    let h = harness(order_events(), config());
    h.projectors
        .register_transform(
            "orderProjector",
            Arc::new(FnTransform(|_: &Event| {
                Ok(TransformOutput::One(Record::new().with("version", 1)))
            })),
        )
        .unwrap();
    h.projectors
        .register_transform(
            "orderProjector",
            Arc::new(FnTransform(|_: &Event| {
                Ok(TransformOutput::One(Record::new().with("version", 2)))
            })),
        )
        .unwrap();

    let started = h.streams.start(orders_request(Some("v"), None)).unwrap();
    finished(&h, &started.stream_id).await;

    let rows = h.sink.rows("v");
    assert_eq!(rows.len(), 5);
    assert!(rows
        .iter()
        .all(|r| r.get("version") == Some(&FieldValue::Int(2))));
}

#[tokio::test]
async fn dry_run_counts_transforms_without_a_store() {
    let h = harness(order_events(), config());
    h.slot.take();
    h.projectors
        .register_transform("orderProjector", flat_projector())
        .unwrap();

    let started = h.streams.start(orders_request(None, Some(1))).unwrap();
    let done = finished(&h, &started.stream_id).await;
    assert_eq!(done.status, StreamStatus::Completed);
    assert_eq!(done.event_count, 5);
    assert!(done.target_table.is_none());
}

#[tokio::test]
async fn missing_store_fails_the_stream() {
    let h = harness(order_events(), config());
    h.slot.take();
    h.projectors
        .register_transform("orderProjector", flat_projector())
        .unwrap();

    let started = h.streams.start(orders_request(Some("t"), None)).unwrap();
    let done = finished(&h, &started.stream_id).await;
    assert_eq!(done.status, StreamStatus::Error);
    assert_eq!(done.event_count, 0);
    assert!(done.error.unwrap().contains("initialize_store"));
}

#[tokio::test]
async fn closed_store_fails_the_stream() {
    let h = harness(order_events(), config());
    h.sink.close().await.unwrap();
    h.projectors
        .register_transform("orderProjector", flat_projector())
        .unwrap();

    let started = h.streams.start(orders_request(Some("t"), None)).unwrap();
    let done = finished(&h, &started.stream_id).await;
    assert_eq!(done.status, StreamStatus::Error);
    assert!(done.error.unwrap().contains("store unavailable"));
}

#[tokio::test]
async fn auth_failure_fails_the_stream() {
    let h = harness(order_events(), config());
    h.connector.reject_with(FeedError::Auth("invalid token".into()));
    h.projectors
        .register_transform("orderProjector", flat_projector())
        .unwrap();

    let started = h.streams.start(orders_request(Some("t"), None)).unwrap();
    let done = finished(&h, &started.stream_id).await;
    assert_eq!(done.status, StreamStatus::Error);
    assert!(done.error.unwrap().contains("invalid token"));
}

#[tokio::test]
async fn feed_failure_mid_stream_fails_the_stream() {
    let h = harness(order_events(), config());
    h.projectors
        .register_transform("orderProjector", flat_projector())
        .unwrap();
    // First page succeeds, the second pull breaks
    h.connector
        .feed()
        .fail_after(1, FeedError::Transport("connection reset".into()));

    let started = h.streams.start(orders_request(Some("orders_flat"), None)).unwrap();
    let done = finished(&h, &started.stream_id).await;

    assert_eq!(done.status, StreamStatus::Error);
    assert!(done.error.unwrap().contains("connection reset"));
    // Events of the first page were delivered before the failure
    assert_eq!(done.event_count, 3);
    assert_eq!(h.sink.rows("orders_flat").len(), 3);
    assert_eq!(h.connector.feed().fetch_count(), 2);
}

struct Slow(Duration);

#[async_trait]
impl Transform for Slow {
    async fn project(&self, event: &Event) -> Result<TransformOutput> {
        tokio::time::sleep(self.0).await;
        Ok(TransformOutput::One(
            Record::new().with("event_id", event.event_id.clone()),
        ))
    }
}

#[tokio::test]
async fn redelivery_ceiling_fails_the_stream() {
    let config = config()
        .with_ack_timeout_ms(20)
        .with_max_redelivery_count(2);
    let h = harness(order_events(), config);
    h.projectors
        .register_transform("orderProjector", Arc::new(Slow(Duration::from_millis(500))))
        .unwrap();

    let started = h.streams.start(orders_request(Some("t"), None)).unwrap();
    let done = finished(&h, &started.stream_id).await;
    assert_eq!(done.status, StreamStatus::Error);
    assert!(done.error.unwrap().contains("redelivery ceiling"));
}

#[tokio::test]
async fn stop_freezes_the_count() {
    let events: Vec<Event> = (0..200)
        .map(|i| {
            sample_event(
                &format!("o-{:03}", i),
                "order.created",
                &format!("2025-01-01T{:02}:{:02}:00Z", i / 60, i % 60),
            )
        })
        .collect();
    let h = harness(events, config());
    h.projectors
        .register_transform("orderProjector", Arc::new(Slow(Duration::from_millis(5))))
        .unwrap();

    let mut request = orders_request(Some("t"), Some(2));
    request.end_date = "2100-01-01".into();
    let started = h.streams.start(request).unwrap();

    let id = started.stream_id.clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.streams.get(&id).unwrap().event_count == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let stopped = h.streams.stop(&id).unwrap();
    assert_eq!(stopped.status, StreamStatus::Stopped);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let later = h.streams.get(&id).unwrap();
    assert_eq!(later.status, StreamStatus::Stopped);
    assert_eq!(later.event_count, stopped.event_count);

    // Stopping again is a no-op
    assert_eq!(h.streams.stop(&id).unwrap().status, StreamStatus::Stopped);
    h.streams.shutdown().await;
}

#[tokio::test]
async fn unknown_stream_is_not_found() {
    let h = harness(Vec::new(), config());
    assert!(matches!(h.streams.stop("stream-0-0"), Err(ReadModelError::NotFound(_))));
    assert!(matches!(h.streams.get("stream-0-0"), Err(ReadModelError::NotFound(_))));
    assert!(h.streams.list().is_empty());
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let h = harness(Vec::new(), config());

    // Unknown projector
    assert!(matches!(
        h.streams.start(orders_request(None, None)),
        Err(ReadModelError::NotFound(_))
    ));

    h.projectors
        .register_transform("orderProjector", flat_projector())
        .unwrap();

    let mut reversed = orders_request(None, None);
    reversed.start_date = "2025-02-01".into();
    assert!(matches!(
        h.streams.start(reversed),
        Err(ReadModelError::InvalidRequest(_))
    ));

    let mut no_types = orders_request(None, None);
    no_types.event_types.clear();
    assert!(h.streams.start(no_types).is_err());

    assert!(h.streams.start(orders_request(None, Some(0))).is_err());
    assert!(h.streams.list().is_empty());
}

#[tokio::test]
async fn list_is_ordered_and_stop_all_stops_running_streams() {
    let h = harness(Vec::new(), config());
    h.projectors
        .register_transform("orderProjector", flat_projector())
        .unwrap();

    let mut ids = Vec::new();
    for _ in 0..3 {
        let mut request = orders_request(None, None);
        request.end_date = "2100-01-01".into();
        ids.push(h.streams.start(request).unwrap().stream_id);
    }

    let listed: Vec<_> = h.streams.list().into_iter().map(|s| s.stream_id).collect();
    assert_eq!(listed, ids);

    assert_eq!(h.streams.stop_all(), 3);
    assert!(h
        .streams
        .list()
        .iter()
        .all(|s| s.status == StreamStatus::Stopped));
    h.streams.shutdown().await;
}
