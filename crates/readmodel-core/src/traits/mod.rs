pub mod feed;
pub mod sink;
pub mod transform;

pub use feed::{BearerTokenProvider, EventFeed, EventPage, FeedConnector, FeedOptions};
pub use sink::{insert_records, InsertReport, Row, Sink, SinkSlot};
pub use transform::{FnTransform, ProjectorLoader, Transform};
