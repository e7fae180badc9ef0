//! Per-stream projection pipeline.

use crate::pump::{BatchHandler, DataPump, PumpExit, PumpSettings};
use crate::registry::ProjectorRegistry;
use crate::shutdown::ShutdownHandle;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use readmodel_core::{
    insert_records, observe, EngineConfig, Event, FeedConnector, FeedOptions, FeedState,
    ReadModelError, Result, SinkSlot, SourceSelector, StreamId, StreamStatus, TimeWindow,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;

/// What a stream was asked to do. Immutable once started.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub source: SourceSelector,
    pub window: TimeWindow,
    pub projector_name: String,
    /// `None` runs the stream dry: events are projected but not stored
    pub target_table: Option<String>,
    pub max_parallelism: usize,
    pub include_sensitive_data: bool,
}

/// Mutable progress of a stream.
#[derive(Debug, Clone)]
pub struct StreamProgress {
    pub status: StreamStatus,
    pub event_count: u64,
    pub error: Option<String>,
    pub current_time_bucket: Option<String>,
    pub processed_time_buckets: BTreeSet<String>,
    pub batches_delivered: u64,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Shared, lock-protected progress plus a status broadcast.
pub struct StreamState {
    progress: Mutex<StreamProgress>,
    status_tx: watch::Sender<StreamStatus>,
}

impl StreamState {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(StreamStatus::Initializing);
        Self {
            progress: Mutex::new(StreamProgress {
                status: StreamStatus::Initializing,
                event_count: 0,
                error: None,
                current_time_bucket: None,
                processed_time_buckets: BTreeSet::new(),
                batches_delivered: 0,
                finished_at: None,
            }),
            status_tx,
        }
    }

    pub fn status(&self) -> StreamStatus {
        self.progress.lock().status
    }

    /// Move to `next` if the state machine allows it. Terminal states never change.
    pub fn transition(&self, next: StreamStatus) -> bool {
        let mut progress = self.progress.lock();
        if !progress.status.can_transition_to(next) {
            return false;
        }
        progress.status = next;
        if next.is_terminal() {
            progress.finished_at = Some(Utc::now());
        }
        self.status_tx.send_replace(next);
        true
    }

    /// Count processed events. Ignored once the stream is terminal.
    pub fn add_events(&self, count: u64) -> bool {
        let mut progress = self.progress.lock();
        if progress.status.is_terminal() {
            return false;
        }
        progress.event_count += count;
        true
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.progress.lock().error = Some(message.into());
    }

    fn set_position(&self, state: &FeedState) {
        self.progress.lock().current_time_bucket = Some(state.time_bucket.clone());
    }

    fn batch_delivered<'a>(&self, buckets: impl Iterator<Item = &'a str>) {
        let mut progress = self.progress.lock();
        progress.batches_delivered += 1;
        for bucket in buckets {
            if !progress.processed_time_buckets.contains(bucket) {
                progress.processed_time_buckets.insert(bucket.to_string());
            }
        }
    }

    pub fn progress(&self) -> StreamProgress {
        self.progress.lock().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamStatus> {
        self.status_tx.subscribe()
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

/// Collaborators shared by every stream.
#[derive(Clone)]
pub struct EngineContext {
    pub connector: Arc<dyn FeedConnector>,
    pub projectors: Arc<ProjectorRegistry>,
    pub sink: SinkSlot,
    pub config: EngineConfig,
    pub page_size: usize,
}

/// Projects each event of a batch and writes the results.
struct StreamHandler {
    stream_id: StreamId,
    spec: Arc<StreamSpec>,
    state: Arc<StreamState>,
    projectors: Arc<ProjectorRegistry>,
    sink: SinkSlot,
}

#[async_trait]
impl BatchHandler for StreamHandler {
    async fn handle(&self, batch: &[Event]) -> Result<()> {
        // Resolved per batch so a re-registered projector takes effect
        let transform = self
            .projectors
            .resolve(&self.spec.projector_name)
            .map_err(|e| ReadModelError::Unrecoverable(e.to_string()))?;
        let sink = match &self.spec.target_table {
            Some(_) => Some(self.sink.get()?),
            None => None,
        };

        let mut projected = 0u64;
        let mut failed = 0u64;

        for event in batch {
            let output = match transform.project(event).await {
                Ok(output) => output,
                Err(e) => {
                    failed += 1;
                    let message = format!("failed to project event {} with error: {}", event.event_id, e);
                    tracing::warn!(stream_id = %self.stream_id, event_id = %event.event_id, error = %e, "Projection failed");
                    self.state.record_error(message);
                    continue;
                }
            };

            let (Some(sink), Some(table)) = (&sink, &self.spec.target_table) else {
                // Dry run
                projected += 1;
                self.state.add_events(1);
                continue;
            };

            let records = output.into_records();
            let report = insert_records(sink.as_ref(), table, &records).await?;
            if report.success() && report.succeeded > 0 {
                projected += 1;
                self.state.add_events(1);
            } else {
                failed += 1;
                tracing::warn!(
                    stream_id = %self.stream_id,
                    event_id = %event.event_id,
                    attempted = report.attempted,
                    succeeded = report.succeeded,
                    "Insert failed"
                );
                let message = if report.attempted == 0 {
                    format!("projector returned no records for event {}", event.event_id)
                } else {
                    report.message()
                };
                self.state.record_error(message);
            }
        }

        self.state
            .batch_delivered(batch.iter().map(|e| e.time_bucket.as_str()));
        observe::record_events(projected, failed);

        tracing::debug!(
            stream_id = %self.stream_id,
            events = batch.len(),
            projected,
            failed,
            "Batch acknowledged"
        );
        Ok(())
    }

    fn on_position(&self, state: &FeedState) {
        self.state.set_position(state);
    }
}

/// Drive one stream from `RUNNING` to a terminal status.
pub async fn run_stream(
    ctx: EngineContext,
    stream_id: StreamId,
    spec: Arc<StreamSpec>,
    state: Arc<StreamState>,
    shutdown: ShutdownHandle,
) {
    if !state.transition(StreamStatus::Running) {
        // Stopped before the pipeline got going
        return;
    }

    tracing::info!(
        stream_id = %stream_id,
        tenant = %spec.source.tenant,
        data_core = %spec.source.data_core,
        flow_type = %spec.source.flow_type,
        start = %spec.window.start,
        end = %spec.window.end,
        "Stream running"
    );

    let options = FeedOptions {
        include_sensitive_data: spec.include_sensitive_data,
    };
    let feed = match ctx.connector.connect(&spec.source, options).await {
        Ok(feed) => feed,
        Err(e) => {
            finish(&stream_id, &state, Err(e.into()));
            return;
        }
    };

    let handler = Arc::new(StreamHandler {
        stream_id: stream_id.clone(),
        spec: spec.clone(),
        state: state.clone(),
        projectors: ctx.projectors.clone(),
        sink: ctx.sink.clone(),
    });
    let settings = PumpSettings::from_config(&ctx.config, ctx.page_size, spec.max_parallelism);

    let result = DataPump::new(
        feed,
        handler,
        settings,
        spec.window.clone(),
        shutdown,
    )
    .run()
    .await;

    finish(&stream_id, &state, result);
}

fn finish(stream_id: &StreamId, state: &StreamState, result: Result<PumpExit>) {
    let status = match &result {
        Ok(PumpExit::Completed) => StreamStatus::Completed,
        Ok(PumpExit::Stopped) => StreamStatus::Stopped,
        Err(_) => StreamStatus::Error,
    };

    if let Err(e) = &result {
        state.record_error(e.to_string());
    }

    if state.transition(status) {
        observe::record_stream_finished(status.as_str());
    }

    let progress = state.progress();
    match result {
        Err(e) => tracing::error!(
            stream_id = %stream_id,
            error = %e,
            event_count = progress.event_count,
            "Stream failed"
        ),
        Ok(_) => tracing::info!(
            stream_id = %stream_id,
            status = %progress.status,
            event_count = progress.event_count,
            batches = progress.batches_delivered,
            "Stream finished"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_monotonic() {
        let state = StreamState::new();
        assert!(state.transition(StreamStatus::Running));
        assert!(state.transition(StreamStatus::Stopped));
        assert!(!state.transition(StreamStatus::Completed));
        assert!(!state.transition(StreamStatus::Running));
        assert_eq!(state.status(), StreamStatus::Stopped);
        assert!(state.progress().finished_at.is_some());
    }

    #[test]
    fn counting_stops_at_terminal() {
        let state = StreamState::new();
        state.transition(StreamStatus::Running);
        assert!(state.add_events(2));
        state.transition(StreamStatus::Stopped);
        assert!(!state.add_events(5));
        assert_eq!(state.progress().event_count, 2);
    }

    #[test]
    fn subscribers_see_transitions() {
        let state = StreamState::new();
        let rx = state.subscribe();
        state.transition(StreamStatus::Running);
        assert_eq!(*rx.borrow(), StreamStatus::Running);
    }
}
