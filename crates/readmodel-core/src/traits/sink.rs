use crate::coerce::coerce_record;
use crate::error::{ReadModelError, Result, SinkError};
use crate::types::Record;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// A result row keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// The store projected records land in.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Run a statement that returns no rows (DDL, ad-hoc writes).
    async fn execute(&self, sql: &str) -> std::result::Result<(), SinkError>;

    /// Insert one record into `table`.
    async fn insert(&self, table: &str, record: &Record) -> std::result::Result<(), SinkError>;

    async fn query(&self, sql: &str) -> std::result::Result<Vec<Row>, SinkError>;

    async fn close(&self) -> std::result::Result<(), SinkError> {
        Ok(())
    }
}

/// Process-wide handle to the current store, shared by every stream and by
/// direct query calls. Empty until the store is initialized.
#[derive(Clone, Default)]
pub struct SinkSlot {
    inner: Arc<RwLock<Option<Arc<dyn Sink>>>>,
}

impl SinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Result<Arc<dyn Sink>> {
        self.inner
            .read()
            .clone()
            .ok_or(ReadModelError::NotInitialized)
    }

    /// Install a store, returning the one it replaces.
    pub fn replace(&self, sink: Arc<dyn Sink>) -> Option<Arc<dyn Sink>> {
        self.inner.write().replace(sink)
    }

    pub fn take(&self) -> Option<Arc<dyn Sink>> {
        self.inner.write().take()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.read().is_some()
    }
}

/// Outcome of writing a projector's output, one insert per record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub messages: Vec<String>,
}

impl InsertReport {
    pub fn success(&self) -> bool {
        self.succeeded == self.attempted
    }

    pub fn message(&self) -> String {
        self.messages.join("; ")
    }
}

/// Insert every record independently. A failed record does not prevent the
/// following ones from being attempted; an unavailable store aborts the rest.
pub async fn insert_records(
    sink: &dyn Sink,
    table: &str,
    records: &[Record],
) -> std::result::Result<InsertReport, SinkError> {
    let mut report = InsertReport::default();
    for record in records {
        report.attempted += 1;
        // Surface coercion problems as per-record failures before touching the store
        if let Err(e) = coerce_record(record) {
            report.messages.push(e.to_string());
            continue;
        }
        match sink.insert(table, record).await {
            Ok(()) => {
                report.succeeded += 1;
                report
                    .messages
                    .push(format!("Record inserted into {} successfully", table));
            }
            Err(SinkError::Unavailable(msg)) => return Err(SinkError::Unavailable(msg)),
            Err(e) => report
                .messages
                .push(format!("Failed to insert record into {}: {}", table, e)),
        }
    }
    Ok(report)
}
