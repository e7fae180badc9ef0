use crate::bind::{value_to_json, Bound};
use async_trait::async_trait;
use parking_lot::Mutex;
use readmodel_core::{
    config::StoreConfig,
    error::{ReadModelError, Result, SinkError},
    insert_statement, Record, Row, Sink,
};
use rusqlite::{Connection, OpenFlags};
use std::sync::Arc;
use std::time::Duration;

/// SQLite-backed sink
///
/// One connection shared by every stream and by direct queries. Statements
/// run on the blocking pool; writes from different streams interleave
/// without cross-stream transactions.
pub struct SqliteSink {
    conn: Arc<Mutex<Option<Connection>>>,
    config: StoreConfig,
}

impl SqliteSink {
    /// Open the store described by `config` and verify the connection works.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
            }
            None => Connection::open_in_memory(),
        }
        .map_err(|e| ReadModelError::Sink(SinkError::Unavailable(e.to_string())))?;

        Self::configure_connection(&conn, &config)?;

        // Verify connection is working
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| ReadModelError::Sink(SinkError::Unavailable(e.to_string())))?;

        tracing::info!(
            path = %config
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".to_string()),
            insert_mode = ?config.insert_mode,
            "Store opened"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            config,
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(StoreConfig::in_memory())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn configure_connection(conn: &Connection, cfg: &StoreConfig) -> Result<()> {
        conn.busy_timeout(Duration::from_millis(cfg.busy_timeout_ms))
            .map_err(|e| ReadModelError::Config(e.to_string()))?;

        if cfg.path.is_some() {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| ReadModelError::Config(e.to_string()))?;
        }

        Ok(())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> std::result::Result<T, SinkError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> std::result::Result<T, SinkError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            match guard.as_ref() {
                Some(conn) => f(conn),
                None => Err(SinkError::Unavailable("store is closed".into())),
            }
        })
        .await
        .map_err(|e| SinkError::Unavailable(format!("store worker failed: {}", e)))?
    }
}

fn statement_error(e: rusqlite::Error) -> SinkError {
    SinkError::Statement(e.to_string())
}

#[async_trait]
impl Sink for SqliteSink {
    async fn execute(&self, sql: &str) -> std::result::Result<(), SinkError> {
        let sql = sql.to_string();
        self.with_conn(move |conn| conn.execute_batch(&sql).map_err(statement_error))
            .await
    }

    async fn insert(&self, table: &str, record: &Record) -> std::result::Result<(), SinkError> {
        let stmt = insert_statement(table, record, self.config.insert_mode)
            .map_err(|e| SinkError::Statement(e.to_string()))?;

        self.with_conn(move |conn| {
            let bound: Vec<Bound<'_>> = stmt.params.iter().map(Bound).collect();
            conn.execute(&stmt.sql, rusqlite::params_from_iter(bound.iter()))
                .map_err(statement_error)?;
            Ok(())
        })
        .await
    }

    async fn query(&self, sql: &str) -> std::result::Result<Vec<Row>, SinkError> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(statement_error)?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
            let mut rows = stmt.query([]).map_err(statement_error)?;

            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(statement_error)? {
                let mut map = Row::new();
                for (i, name) in columns.iter().enumerate() {
                    let value = row.get_ref(i).map_err(statement_error)?;
                    map.insert(name.clone(), value_to_json(value));
                }
                out.push(map);
            }
            Ok(out)
        })
        .await
    }

    async fn close(&self) -> std::result::Result<(), SinkError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(conn) = conn.lock().take() {
                conn.close()
                    .map_err(|(_, e)| SinkError::Statement(e.to_string()))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| SinkError::Unavailable(format!("store worker failed: {}", e)))?
    }
}
