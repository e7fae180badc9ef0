//! Request and response shapes of the feed's HTTP API.

use readmodel_core::{Event, FeedOptions, FeedState, SourceSelector};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucketsResponse {
    #[serde(default)]
    pub time_buckets: Vec<String>,
}

/// `{base}/tenants/{tenant}/data-cores/{data_core}/flow-types/{flow_type}/{resource}`
pub fn resource_url(base_url: &str, source: &SourceSelector, resource: &str) -> String {
    format!(
        "{}/tenants/{}/data-cores/{}/flow-types/{}/{}",
        base_url.trim_end_matches('/'),
        source.tenant,
        source.data_core,
        source.flow_type,
        resource
    )
}

pub fn events_query(
    source: &SourceSelector,
    options: FeedOptions,
    state: &FeedState,
    limit: usize,
) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("eventTypes", source.event_types.join(",")),
        ("timeBucket", state.time_bucket.clone()),
        ("pageSize", limit.to_string()),
        ("includeSensitiveData", options.include_sensitive_data.to_string()),
    ];
    if let Some(after) = &state.event_id {
        query.push(("afterEventId", after.clone()));
    }
    query
}

pub fn time_buckets_query(source: &SourceSelector, from: &str) -> Vec<(&'static str, String)> {
    vec![
        ("eventTypes", source.event_types.join(",")),
        ("from", from.to_string()),
    ]
}

/// Where to continue after a page.
///
/// A full page stays in the same bucket after its last event. A short page
/// moves to the earliest known bucket later than the current one; `None`
/// when there is no such bucket yet.
pub fn next_state(
    current: &FeedState,
    page: &[Event],
    limit: usize,
    known_buckets: &[String],
) -> Option<FeedState> {
    if limit > 0 && page.len() >= limit {
        if let Some(last) = page.last() {
            return Some(FeedState::after(current.time_bucket.clone(), last.event_id.clone()));
        }
    }
    known_buckets
        .iter()
        .filter(|b| b.as_str() > current.time_bucket.as_str())
        .min()
        .map(|b| FeedState::bucket_start(b.clone()))
}
