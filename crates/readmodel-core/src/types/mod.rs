pub mod cursor;
pub mod event;
pub mod record;
pub mod stream;

pub use cursor::{parse_instant, time_bucket, time_uuid, time_uuid_instant, FeedState};
pub use event::Event;
pub use record::{FieldValue, Record, TransformOutput};
pub use stream::{SourceSelector, StreamId, StreamStatus, TimeWindow};
