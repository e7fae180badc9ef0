//! Projection engine for the read model
//!
//! Turns feed events into store rows: a registry of projectors, a data pump
//! with bounded concurrency and redelivery, and a registry of running and
//! finished streams.

pub mod engine;
pub mod loader;
pub mod memory;
pub mod pump;
pub mod registry;
pub mod shutdown;
pub mod streams;

pub use engine::{EngineContext, StreamProgress, StreamSpec, StreamState};
pub use loader::DylibLoader;
pub use pump::{BatchHandler, DataPump, PumpExit, PumpSettings};
pub use registry::{Projector, ProjectorRegistry, Registration};
pub use shutdown::ShutdownHandle;
pub use streams::{StartStream, StreamRegistry, StreamSnapshot, StreamSummary};
