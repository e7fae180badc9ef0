//! Read Model: project remote event streams into an embedded SQL store
//!
//! Provides:
//! - **Store**: an embedded SQLite database, in memory or on disk
//! - **Projectors**: user-supplied transforms from event to records
//! - **Streams**: background pipelines pulling a time window of events
//!   through a projector into a table
//!
//! # Quick Start
//!
//! ```no_run
//! use readmodel::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let model = ReadModel::builder()
//!     .with_credentials(Credentials::new(Some("alice".into()), Some("pat".into())))
//!     .build()?;
//!
//! model.initialize_store(None).await?;
//! model.create_table("CREATE TABLE orders_flat (id TEXT, total DOUBLE)").await?;
//! model.register_projector("orderProjector", "./liborders.so".as_ref()).await?;
//! # Ok(())
//! # }
//! ```

pub mod prelude;
pub mod service;

pub use readmodel_core::{
    config::{AppConfig, EngineConfig, FeedConfig, InsertMode, StoreConfig},
    error::{FeedError, ReadModelError, Result, SinkError},
    Event, FieldValue, FnTransform, Record, Row, Sink, StreamStatus, Transform, TransformOutput,
};
pub use readmodel_feed::Credentials;
pub use readmodel_projector::{Registration, StartStream, StreamSnapshot, StreamSummary};
pub use service::{ReadModel, ReadModelBuilder};
