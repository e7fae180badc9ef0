//! In-memory feed, sink and loader.
//!
//! Deterministic collaborators for driving the engine without a network
//! or a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use readmodel_core::{
    time_bucket, Event, EventFeed, EventPage, FeedConnector, FeedError, FeedOptions, FeedState,
    ProjectorLoader, ReadModelError, Record, Result, Row, Sink, SinkError, SourceSelector,
    Transform,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Build an event whose time bucket is derived from `valid_time`.
pub fn sample_event(event_id: &str, event_type: &str, valid_time: &str) -> Event {
    let valid_time: DateTime<Utc> = valid_time
        .parse()
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH);
    Event {
        event_id: event_id.to_string(),
        time_bucket: time_bucket(&valid_time),
        tenant: "acme".to_string(),
        data_core: "orders".to_string(),
        flow_type: "order".to_string(),
        event_type: event_type.to_string(),
        valid_time,
        metadata: serde_json::Value::Null,
        payload: serde_json::json!({ "id": event_id }),
    }
}

#[derive(Default)]
struct FeedInner {
    events: Vec<Event>,
    /// Fetch number that fails, and with what
    failure: Option<(usize, FeedError)>,
    fetches: usize,
}

/// Feed over a fixed, appendable list of events ordered by time bucket and
/// valid time.
///
/// A state whose event id names a known event resumes after it. A time UUID
/// resumes at the first event of the bucket at or after its instant. Any
/// other id resumes at the start of the state's bucket.
#[derive(Clone, Default)]
pub struct MemoryFeed {
    inner: Arc<Mutex<FeedInner>>,
}

impl MemoryFeed {
    pub fn new(events: Vec<Event>) -> Self {
        let feed = Self::default();
        for event in events {
            feed.push(event);
        }
        feed
    }

    pub fn push(&self, event: Event) {
        let mut inner = self.inner.lock();
        inner.events.push(event);
        inner
            .events
            .sort_by(|a, b| (&a.time_bucket, a.valid_time).cmp(&(&b.time_bucket, b.valid_time)));
    }

    /// Let `fetches` more fetches succeed, then fail the one after with `error`.
    pub fn fail_after(&self, fetches: usize, error: FeedError) {
        let mut inner = self.inner.lock();
        let at = inner.fetches + fetches + 1;
        inner.failure = Some((at, error));
    }

    pub fn fetch_count(&self) -> usize {
        self.inner.lock().fetches
    }
}

#[async_trait]
impl EventFeed for MemoryFeed {
    async fn fetch(&self, state: &FeedState, limit: usize) -> std::result::Result<EventPage, FeedError> {
        let mut inner = self.inner.lock();
        inner.fetches += 1;
        if matches!(&inner.failure, Some((at, _)) if *at == inner.fetches) {
            if let Some((_, error)) = inner.failure.take() {
                return Err(error);
            }
        }

        let from = state.resume_instant();
        let resume_at = state
            .event_id
            .as_ref()
            .and_then(|id| inner.events.iter().position(|e| &e.event_id == id))
            .map(|i| i + 1)
            .unwrap_or_else(|| {
                inner
                    .events
                    .iter()
                    .position(|e| {
                        e.time_bucket >= state.time_bucket
                            && from.map_or(true, |instant| e.valid_time >= instant)
                    })
                    .unwrap_or(inner.events.len())
            });

        let events: Vec<Event> = inner.events.iter().skip(resume_at).take(limit).cloned().collect();
        let more = resume_at + events.len() < inner.events.len();
        let next = match (more, events.last()) {
            (true, Some(last)) => Some(FeedState::after(last.time_bucket.clone(), last.event_id.clone())),
            _ => None,
        };
        Ok(EventPage { events, next })
    }
}

/// Connector handing out a shared [`MemoryFeed`], filtered to the
/// requested event types.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    feed: MemoryFeed,
    auth_failure: Arc<Mutex<Option<FeedError>>>,
    connects: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new(feed: MemoryFeed) -> Self {
        Self {
            feed,
            ..Default::default()
        }
    }

    /// Every later connection fails with `error`.
    pub fn reject_with(&self, error: FeedError) {
        *self.auth_failure.lock() = Some(error);
    }

    pub fn feed(&self) -> &MemoryFeed {
        &self.feed
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedConnector for MemoryConnector {
    async fn connect(
        &self,
        source: &SourceSelector,
        _options: FeedOptions,
    ) -> std::result::Result<Box<dyn EventFeed>, FeedError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.auth_failure.lock().clone() {
            return Err(error);
        }
        Ok(Box::new(SelectedFeed {
            feed: self.feed.clone(),
            source: source.clone(),
        }))
    }
}

struct SelectedFeed {
    feed: MemoryFeed,
    source: SourceSelector,
}

#[async_trait]
impl EventFeed for SelectedFeed {
    async fn fetch(&self, state: &FeedState, limit: usize) -> std::result::Result<EventPage, FeedError> {
        let mut page = self.feed.fetch(state, limit).await?;
        page.events.retain(|e| {
            e.flow_type == self.source.flow_type && self.source.accepts(&e.event_type)
        });
        Ok(page)
    }
}

#[derive(Default)]
struct SinkInner {
    tables: HashMap<String, Vec<Record>>,
}

type RejectFn = dyn Fn(&Record) -> bool + Send + Sync;

/// Sink keeping inserted records per table.
#[derive(Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<SinkInner>>,
    closed: Arc<AtomicBool>,
    reject: Option<Arc<RejectFn>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail inserts of records matching `predicate` with a statement error.
    pub fn rejecting(mut self, predicate: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        self.reject = Some(Arc::new(predicate));
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.inner.lock().tables.get(table).cloned().unwrap_or_default()
    }

    fn check_open(&self) -> std::result::Result<(), SinkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("store is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for MemorySink {
    /// Statements are accepted and ignored; tables exist on first insert.
    async fn execute(&self, _sql: &str) -> std::result::Result<(), SinkError> {
        self.check_open()
    }

    async fn insert(&self, table: &str, record: &Record) -> std::result::Result<(), SinkError> {
        self.check_open()?;
        if let Some(reject) = &self.reject {
            if reject(record) {
                return Err(SinkError::Statement(format!("{} rejected the record", table)));
            }
        }
        self.inner
            .lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    /// Returns every row of the table named by the statement's last word.
    async fn query(&self, sql: &str) -> std::result::Result<Vec<Row>, SinkError> {
        self.check_open()?;
        let table = sql.split_whitespace().last().unwrap_or_default();
        Ok(self
            .rows(table)
            .iter()
            .filter_map(|r| r.to_json().as_object().cloned())
            .collect())
    }

    async fn close(&self) -> std::result::Result<(), SinkError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Loader resolving paths from a fixed table of transforms.
#[derive(Clone, Default)]
pub struct StaticLoader {
    transforms: HashMap<PathBuf, Arc<dyn Transform>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<PathBuf>, transform: Arc<dyn Transform>) -> Self {
        self.transforms.insert(path.into(), transform);
        self
    }
}

impl ProjectorLoader for StaticLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Transform>> {
        self.transforms.get(path).cloned().ok_or_else(|| {
            ReadModelError::Load(format!("no projector export found at {}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn feed_pages_in_order() {
        let feed = MemoryFeed::new(vec![
            sample_event("b", "x", "2025-01-01T01:00:00Z"),
            sample_event("a", "x", "2025-01-01T00:00:00Z"),
            sample_event("c", "x", "2025-01-01T02:00:00Z"),
        ]);

        let first = feed.fetch(&FeedState::bucket_start("20250101000000"), 2).await.unwrap();
        let ids: Vec<_> = first.events.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let next = first.next.unwrap();
        let second = feed.fetch(&next, 2).await.unwrap();
        assert_eq!(second.events.len(), 1);
        assert!(second.next.is_none());
    }

    #[tokio::test]
    async fn unknown_event_id_starts_at_bucket() {
        let feed = MemoryFeed::new(vec![
            sample_event("a", "x", "2025-01-01T00:00:00Z"),
            sample_event("b", "x", "2025-01-01T05:00:00Z"),
        ]);
        let page = feed
            .fetch(&FeedState::after("20250101030000", "not-an-event"), 10)
            .await
            .unwrap();
        assert_eq!(page.events[0].event_id, "b");
    }

    #[tokio::test]
    async fn time_state_resumes_at_its_instant() {
        let feed = MemoryFeed::new(vec![
            sample_event("early", "x", "2025-01-01T05:10:00Z"),
            sample_event("inside", "x", "2025-01-01T05:40:00Z"),
        ]);
        let start = "2025-01-01T05:30:00Z".parse().unwrap();
        let page = feed.fetch(&FeedState::from_instant(&start), 10).await.unwrap();
        let ids: Vec<_> = page.events.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["inside"]);
    }

    #[tokio::test]
    async fn scheduled_failure_hits_one_fetch() {
        let feed = MemoryFeed::new(vec![sample_event("a", "x", "2025-01-01T00:00:00Z")]);
        let state = FeedState::bucket_start("20250101000000");
        feed.fail_after(1, FeedError::Transport("reset".into()));

        assert!(feed.fetch(&state, 10).await.is_ok());
        let err = feed.fetch(&state, 10).await.unwrap_err();
        assert_eq!(err, FeedError::Transport("reset".into()));
        assert!(feed.fetch(&state, 10).await.is_ok());
        assert_eq!(feed.fetch_count(), 3);
    }

    #[tokio::test]
    async fn closed_sink_is_unavailable() {
        let sink = MemorySink::new();
        sink.close().await.unwrap();
        let err = sink.insert("t", &Record::new().with("id", 1)).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
    }
}
