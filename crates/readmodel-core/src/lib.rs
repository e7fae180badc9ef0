//! Read Model Core: traits and types for the local read model
//!
//! This crate defines the abstractions shared by the projection pipeline:
//! - Event feed: cursor-based paged pull keyed by tenant, data core, flow type
//!   and event types
//! - Transform: user-registered projection from an event to one or many records
//! - Sink: the embedded SQL store receiving projected records
//! - Record coercion: projector output to store-ready values
//!
//! Key features:
//! - Timestamp-derived feed state for deterministic restarts
//! - Single error taxonomy separating per-event failures from fatal ones
//! - Serde-backed configuration with defaults

pub mod coerce;
pub mod config;
pub mod error;
pub mod observe;
pub mod traits;
pub mod types;

pub use coerce::{coerce_record, coerce_value, insert_statement, InsertStatement, SqlParam};
pub use config::{AppConfig, EngineConfig, FeedConfig, InsertMode, StoreConfig};
pub use error::{FeedError, ReadModelError, Result, SinkError};
pub use traits::{
    insert_records, BearerTokenProvider, EventFeed, EventPage, FeedConnector, FeedOptions,
    FnTransform, InsertReport, ProjectorLoader, Row, Sink, SinkSlot, Transform,
};
pub use types::{
    parse_instant, time_bucket, time_uuid, time_uuid_instant, Event, FeedState, FieldValue, Record,
    SourceSelector, StreamId, StreamStatus, TimeWindow, TransformOutput,
};
