//! Timestamp-derived resumption state for the feed.
//!
//! Both parts of the state are pure functions of the instant, so starting a
//! stream twice from the same date requests exactly the same first page.

use crate::error::{ReadModelError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::timestamp::context::NoContext;
use uuid::{Timestamp, Uuid};

const NODE_ID: [u8; 6] = [0; 6];

/// Position in the feed: an hourly time bucket plus the event to resume after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedState {
    pub time_bucket: String,

    /// Deliver only events after this one. `None` means from the start of the bucket.
    pub event_id: Option<String>,
}

impl FeedState {
    pub fn from_instant(instant: &DateTime<Utc>) -> Self {
        Self {
            time_bucket: time_bucket(instant),
            event_id: Some(time_uuid(instant).to_string()),
        }
    }

    pub fn bucket_start(time_bucket: impl Into<String>) -> Self {
        Self {
            time_bucket: time_bucket.into(),
            event_id: None,
        }
    }

    pub fn after(time_bucket: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            time_bucket: time_bucket.into(),
            event_id: Some(event_id.into()),
        }
    }

    /// The instant encoded in the state, when its event id is a time UUID
    /// rather than the id of a delivered event.
    pub fn resume_instant(&self) -> Option<DateTime<Utc>> {
        let id = Uuid::parse_str(self.event_id.as_deref()?).ok()?;
        if id.get_version_num() != 1 {
            return None;
        }
        time_uuid_instant(&id)
    }
}

/// `YYYYMMDDHH0000` in UTC.
pub fn time_bucket(instant: &DateTime<Utc>) -> String {
    instant.format("%Y%m%d%H0000").to_string()
}

/// Time-based UUID (version 1) with a fixed node id and clock sequence.
pub fn time_uuid(instant: &DateTime<Utc>) -> Uuid {
    let seconds = instant.timestamp().max(0) as u64;
    let nanos = instant.timestamp_subsec_nanos();
    Uuid::new_v1(Timestamp::from_unix(NoContext, seconds, nanos), &NODE_ID)
}

/// Inverse of [`time_uuid`], to 100 ns precision.
pub fn time_uuid_instant(id: &Uuid) -> Option<DateTime<Utc>> {
    let (seconds, nanos) = id.get_timestamp()?.to_unix();
    DateTime::from_timestamp(i64::try_from(seconds).ok()?, nanos)
}

/// Parse a caller-supplied date. Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS`
/// and `YYYY-MM-DD`; values without an offset are read as UTC.
pub fn parse_instant(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(ReadModelError::InvalidRequest(format!(
        "'{}' is not a valid date (expected RFC 3339 or YYYY-MM-DD)",
        input
    )))
}
