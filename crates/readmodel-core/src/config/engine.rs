use crate::error::{ReadModelError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the projection engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrent in-flight batches per stream when the caller gives none
    /// Default: 100
    #[serde(default = "default_max_parallelism")]
    pub default_max_parallelism: usize,

    /// Maximum number of events handed to the projector in one batch
    /// Default: 100
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of events pulled from the feed but not yet acknowledged
    /// Default: 10000
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Delivery attempts per batch before the stream fails
    /// Default: 4
    #[serde(default = "default_max_redelivery_count")]
    pub max_redelivery_count: u32,

    /// Time a batch handler has to acknowledge before redelivery
    /// Default: 10000ms
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Sleep between pulls when the feed returns an empty page with more to come
    /// Default: 250ms
    #[serde(default = "default_idle_poll_interval_ms")]
    pub idle_poll_interval_ms: u64,
}

fn default_max_parallelism() -> usize {
    100
}

fn default_batch_size() -> usize {
    100
}

fn default_buffer_size() -> usize {
    10_000
}

fn default_max_redelivery_count() -> u32 {
    4
}

fn default_ack_timeout_ms() -> u64 {
    10_000
}

fn default_idle_poll_interval_ms() -> u64 {
    250
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_parallelism: default_max_parallelism(),
            batch_size: default_batch_size(),
            buffer_size: default_buffer_size(),
            max_redelivery_count: default_max_redelivery_count(),
            ack_timeout_ms: default_ack_timeout_ms(),
            idle_poll_interval_ms: default_idle_poll_interval_ms(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_max_redelivery_count(mut self, count: u32) -> Self {
        self.max_redelivery_count = count;
        self
    }

    pub fn with_ack_timeout_ms(mut self, ms: u64) -> Self {
        self.ack_timeout_ms = ms;
        self
    }

    pub fn with_idle_poll_interval_ms(mut self, ms: u64) -> Self {
        self.idle_poll_interval_ms = ms;
        self
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_max_parallelism == 0 {
            return Err(ReadModelError::Config(
                "engine.default_max_parallelism must be positive".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ReadModelError::Config("engine.batch_size must be positive".into()));
        }
        if self.buffer_size < self.batch_size {
            return Err(ReadModelError::Config(
                "engine.buffer_size must be at least engine.batch_size".into(),
            ));
        }
        if self.max_redelivery_count == 0 {
            return Err(ReadModelError::Config(
                "engine.max_redelivery_count must be positive".into(),
            ));
        }
        Ok(())
    }
}
