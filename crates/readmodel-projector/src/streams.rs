//! Stream registry: start, stop and inspect projection streams.

use crate::engine::{run_stream, EngineContext, StreamSpec, StreamState};
use crate::shutdown::ShutdownHandle;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use readmodel_core::{
    observe, ReadModelError, Result, SourceSelector, StreamId, StreamStatus, TimeWindow,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Parameters of a new stream, as received from a caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartStream {
    pub tenant: String,
    pub data_core: String,
    pub flow_type: String,
    pub event_types: Vec<String>,
    pub start_date: String,
    pub end_date: String,
    pub projector_name: String,
    #[serde(default)]
    pub target_table: Option<String>,
    #[serde(default)]
    pub max_parallelism: Option<usize>,
    #[serde(default)]
    pub include_sensitive_data: bool,
}

/// Full view of a stream. Carries no pipeline handles.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSnapshot {
    pub stream_id: StreamId,
    pub status: StreamStatus,
    pub event_count: u64,
    pub tenant: String,
    pub data_core: String,
    pub flow_type: String,
    pub event_types: Vec<String>,
    pub start_date: String,
    pub end_date: String,
    pub projector_name: String,
    pub target_table: Option<String>,
    pub max_parallelism: usize,
    pub include_sensitive_data: bool,
    pub error: Option<String>,
    pub current_time_bucket: Option<String>,
    pub processed_time_buckets: Vec<String>,
    pub batches_delivered: u64,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// The subset of a snapshot shown when listing streams.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSummary {
    pub stream_id: StreamId,
    pub status: StreamStatus,
    pub event_count: u64,
    pub tenant: String,
    pub data_core: String,
    pub flow_type: String,
    pub event_types: Vec<String>,
    pub projector_name: String,
    pub target_table: Option<String>,
    pub max_parallelism: usize,
    pub include_sensitive_data: bool,
}

impl From<StreamSnapshot> for StreamSummary {
    fn from(s: StreamSnapshot) -> Self {
        Self {
            stream_id: s.stream_id,
            status: s.status,
            event_count: s.event_count,
            tenant: s.tenant,
            data_core: s.data_core,
            flow_type: s.flow_type,
            event_types: s.event_types,
            projector_name: s.projector_name,
            target_table: s.target_table,
            max_parallelism: s.max_parallelism,
            include_sensitive_data: s.include_sensitive_data,
        }
    }
}

struct StreamEntry {
    id: StreamId,
    seq: u64,
    created_at: DateTime<Utc>,
    spec: Arc<StreamSpec>,
    state: Arc<StreamState>,
    shutdown: ShutdownHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamEntry {
    fn snapshot(&self) -> StreamSnapshot {
        let progress = self.state.progress();
        StreamSnapshot {
            stream_id: self.id.clone(),
            status: progress.status,
            event_count: progress.event_count,
            tenant: self.spec.source.tenant.clone(),
            data_core: self.spec.source.data_core.clone(),
            flow_type: self.spec.source.flow_type.clone(),
            event_types: self.spec.source.event_types.clone(),
            start_date: self.spec.window.start_date.clone(),
            end_date: self.spec.window.end_date.clone(),
            projector_name: self.spec.projector_name.clone(),
            target_table: self.spec.target_table.clone(),
            max_parallelism: self.spec.max_parallelism,
            include_sensitive_data: self.spec.include_sensitive_data,
            error: progress.error,
            current_time_bucket: progress.current_time_bucket,
            processed_time_buckets: progress.processed_time_buckets.into_iter().collect(),
            batches_delivered: progress.batches_delivered,
            created_at: self.created_at,
            finished_at: progress.finished_at,
        }
    }
}

/// Process-wide registry of streams. Streams are never removed, so finished
/// ones stay queryable.
pub struct StreamRegistry {
    ctx: EngineContext,
    streams: RwLock<HashMap<StreamId, Arc<StreamEntry>>>,
    next_seq: AtomicU64,
}

impl StreamRegistry {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            streams: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    fn spec_from(&self, request: StartStream) -> Result<StreamSpec> {
        let source = SourceSelector::new(
            request.tenant,
            request.data_core,
            request.flow_type,
            request.event_types,
        )?;
        let window = TimeWindow::parse(&request.start_date, &request.end_date)?;

        let max_parallelism = request
            .max_parallelism
            .unwrap_or(self.ctx.config.default_max_parallelism);
        if max_parallelism == 0 {
            return Err(ReadModelError::InvalidRequest(
                "maxParallelism must be a positive integer".into(),
            ));
        }

        if !self.ctx.projectors.contains(&request.projector_name) {
            return Err(ReadModelError::NotFound(format!(
                "Projector {} not found",
                request.projector_name
            )));
        }

        let target_table = request
            .target_table
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(StreamSpec {
            source,
            window,
            projector_name: request.projector_name,
            target_table,
            max_parallelism,
            include_sensitive_data: request.include_sensitive_data,
        })
    }

    /// Register a stream and launch its pipeline in the background. Returns
    /// as soon as the stream exists, with status `INITIALIZING`.
    pub fn start(&self, request: StartStream) -> Result<StreamSnapshot> {
        let spec = Arc::new(self.spec_from(request)?);

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let created_at = Utc::now();
        let id = format!("stream-{}-{}", created_at.timestamp_millis(), seq);

        let entry = Arc::new(StreamEntry {
            id: id.clone(),
            seq,
            created_at,
            spec: spec.clone(),
            state: Arc::new(StreamState::new()),
            shutdown: ShutdownHandle::new(),
            task: Mutex::new(None),
        });
        let snapshot = entry.snapshot();

        let task = tokio::spawn(run_stream(
            self.ctx.clone(),
            id.clone(),
            spec,
            entry.state.clone(),
            entry.shutdown.clone(),
        ));
        *entry.task.lock() = Some(task);
        self.streams.write().insert(id.clone(), entry);

        observe::set_active_streams(self.active_count());
        tracing::info!(
            stream_id = %id,
            projector = %snapshot.projector_name,
            target_table = ?snapshot.target_table,
            max_parallelism = snapshot.max_parallelism,
            "Stream started"
        );

        Ok(snapshot)
    }

    fn entry(&self, id: &str) -> Result<Arc<StreamEntry>> {
        self.streams
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ReadModelError::NotFound(format!("Stream {} not found", id)))
    }

    /// Stop a stream. Dispatched batches finish but nothing further is
    /// counted once this returns. Stopping a finished stream changes nothing.
    pub fn stop(&self, id: &str) -> Result<StreamSnapshot> {
        let entry = self.entry(id)?;
        if entry.state.status().is_terminal() {
            return Ok(entry.snapshot());
        }
        if entry.task.lock().is_none() {
            return Err(ReadModelError::NotFound(format!(
                "Stream {} has no running pipeline",
                id
            )));
        }

        if entry.state.transition(StreamStatus::Stopped) {
            observe::record_stream_finished(StreamStatus::Stopped.as_str());
            tracing::info!(stream_id = %id, "Stream stopped");
        }
        entry.shutdown.shutdown();
        observe::set_active_streams(self.active_count());

        Ok(entry.snapshot())
    }

    /// Stop every stream that has not finished. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let entries: Vec<Arc<StreamEntry>> = self.streams.read().values().cloned().collect();
        let mut stopped = 0;
        for entry in entries {
            if entry.state.transition(StreamStatus::Stopped) {
                observe::record_stream_finished(StreamStatus::Stopped.as_str());
                stopped += 1;
            }
            entry.shutdown.shutdown();
        }
        observe::set_active_streams(0);
        if stopped > 0 {
            tracing::info!(stopped, "Stopped all streams");
        }
        stopped
    }

    /// Stop every stream and wait for their pipelines to exit.
    pub async fn shutdown(&self) {
        self.stop_all();
        let tasks: Vec<JoinHandle<()>> = self
            .streams
            .read()
            .values()
            .filter_map(|e| e.task.lock().take())
            .collect();
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Stream pipeline ended abnormally");
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<StreamSnapshot> {
        Ok(self.entry(id)?.snapshot())
    }

    /// Every stream, oldest first.
    pub fn list(&self) -> Vec<StreamSummary> {
        let mut entries: Vec<Arc<StreamEntry>> = self.streams.read().values().cloned().collect();
        entries.sort_by_key(|e| e.seq);
        entries.iter().map(|e| e.snapshot().into()).collect()
    }

    /// Wait until the stream reaches a terminal status.
    pub async fn wait_finished(&self, id: &str) -> Result<StreamSnapshot> {
        let entry = self.entry(id)?;
        let mut rx = entry.state.subscribe();
        rx.wait_for(|status| status.is_terminal())
            .await
            .map_err(|e| ReadModelError::Unrecoverable(e.to_string()))?;
        Ok(entry.snapshot())
    }

    fn active_count(&self) -> usize {
        self.streams
            .read()
            .values()
            .filter(|e| !e.state.status().is_terminal())
            .count()
    }
}
