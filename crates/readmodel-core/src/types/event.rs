use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event delivered by the feed
///
/// The engine only reads `event_id`, `time_bucket` and `valid_time`; the
/// rest is handed to the projector untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,

    pub time_bucket: String,

    #[serde(default)]
    pub tenant: String,

    #[serde(default, alias = "dataCoreId")]
    pub data_core: String,

    pub flow_type: String,

    pub event_type: String,

    pub valid_time: DateTime<Utc>,

    #[serde(default)]
    pub metadata: serde_json::Value,

    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
