pub mod engine;
pub mod feed;
pub mod store;

pub use engine::EngineConfig;
pub use feed::FeedConfig;
pub use store::{InsertMode, StoreConfig};

use crate::error::{ReadModelError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Process-wide configuration, loadable from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub feed: FeedConfig,
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let config: AppConfig = serde_json::from_slice(&bytes)
            .map_err(|e| ReadModelError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        if self.feed.page_size == 0 {
            return Err(ReadModelError::Config("feed.page_size must be positive".into()));
        }
        Ok(())
    }
}
