use crate::wire::{self, EventsResponse, TimeBucketsResponse};
use async_trait::async_trait;
use readmodel_core::{
    BearerTokenProvider, EventFeed, EventPage, FeedConfig, FeedConnector, FeedError, FeedOptions,
    FeedState, SourceSelector,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Opens [`HttpEventFeed`]s, obtaining a fresh token for each one.
pub struct HttpConnector {
    config: FeedConfig,
    client: reqwest::Client,
    tokens: Arc<dyn BearerTokenProvider>,
}

impl HttpConnector {
    pub fn new(config: FeedConfig, tokens: Arc<dyn BearerTokenProvider>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            tokens,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }
}

#[async_trait]
impl FeedConnector for HttpConnector {
    async fn connect(
        &self,
        source: &SourceSelector,
        options: FeedOptions,
    ) -> Result<Box<dyn EventFeed>, FeedError> {
        let token = self.tokens.bearer_token().await?;

        tracing::debug!(
            tenant = %source.tenant,
            data_core = %source.data_core,
            flow_type = %source.flow_type,
            "Connected to event feed"
        );

        Ok(Box::new(HttpEventFeed {
            client: self.client.clone(),
            base_url: self.config.base_url.clone(),
            source: source.clone(),
            options,
            token,
        }))
    }
}

/// Feed bound to one source selector and one bearer token.
pub struct HttpEventFeed {
    client: reqwest::Client,
    base_url: String,
    source: SourceSelector,
    options: FeedOptions,
    token: String,
}

impl HttpEventFeed {
    async fn get<T: DeserializeOwned>(
        &self,
        resource: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, FeedError> {
        let url = wire::resource_url(&self.base_url, &self.source, resource);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FeedError::Auth(format!("feed rejected credentials ({})", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Transport(format!("{} returned {}: {}", url, status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| FeedError::Protocol(format!("{}: {}", resource, e)))
    }
}

#[async_trait]
impl EventFeed for HttpEventFeed {
    async fn fetch(&self, state: &FeedState, limit: usize) -> Result<EventPage, FeedError> {
        let query = wire::events_query(&self.source, self.options, state, limit);
        let page: EventsResponse = self.get("events", &query).await?;

        // Only a short page needs the bucket listing to know where to go next
        let known_buckets = if page.events.len() < limit {
            let query = wire::time_buckets_query(&self.source, &state.time_bucket);
            let buckets: TimeBucketsResponse = self.get("time-buckets", &query).await?;
            buckets.time_buckets
        } else {
            Vec::new()
        };

        let next = wire::next_state(state, &page.events, limit, &known_buckets);

        tracing::trace!(
            time_bucket = %state.time_bucket,
            events = page.events.len(),
            next = ?next,
            "Fetched feed page"
        );

        Ok(EventPage {
            events: page.events,
            next,
        })
    }
}
