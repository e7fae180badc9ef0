use crate::error::FeedError;
use crate::types::{Event, FeedState, SourceSelector};
use async_trait::async_trait;

/// One page pulled from the feed.
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    /// Events after the requested state, in feed order
    pub events: Vec<Event>,

    /// Where to continue. `None` means nothing further is available yet.
    pub next: Option<FeedState>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedOptions {
    pub include_sensitive_data: bool,
}

/// Cursor-based paged pull over one source selector.
#[async_trait]
pub trait EventFeed: Send + Sync {
    /// Fetch at most `limit` events strictly after `state`.
    async fn fetch(&self, state: &FeedState, limit: usize) -> Result<EventPage, FeedError>;
}

/// Opens a feed for a stream. Called once per pipeline start, which is where
/// credentials are obtained.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(
        &self,
        source: &SourceSelector,
        options: FeedOptions,
    ) -> Result<Box<dyn EventFeed>, FeedError>;
}

/// Supplies a bearer token for the feed.
#[async_trait]
pub trait BearerTokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, FeedError>;
}
