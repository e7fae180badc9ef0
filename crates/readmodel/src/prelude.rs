//! Read Model Prelude
//!
//! ```
//! use readmodel::prelude::*;
//! ```

// Service
pub use crate::{ReadModel, ReadModelBuilder};

// Core types
pub use crate::{
    Event, FeedError, FieldValue, ReadModelError, Record, Result, Row, SinkError, StreamStatus,
    TransformOutput,
};

// Configs
pub use crate::{AppConfig, EngineConfig, FeedConfig, InsertMode, StoreConfig};

// Traits and adapters
pub use crate::{FnTransform, Sink, Transform};

// Streams and projectors
pub use crate::{Credentials, Registration, StartStream, StreamSnapshot, StreamSummary};

// Re-export common external deps
pub use anyhow;
pub use serde::{Deserialize, Serialize};
pub use std::sync::Arc;
pub use tracing;
