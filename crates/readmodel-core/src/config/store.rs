use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How projected records are written into the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InsertMode {
    /// Prepared statement with bound parameters
    #[default]
    Bind,
    /// Values rendered as SQL literals into the statement text
    Literal,
}

/// Configuration for the embedded store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file; `None` keeps the store in memory
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub insert_mode: InsertMode,

    /// How long a statement waits on a locked database
    /// Default: 5000ms
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            insert_mode: InsertMode::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_insert_mode(mut self, mode: InsertMode) -> Self {
        self.insert_mode = mode;
        self
    }
}
