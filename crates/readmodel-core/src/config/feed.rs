use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the remote event feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the event API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Endpoint exchanging a username and personal access token for a bearer token
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Events requested per page
    /// Default: 500
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Default: 30000ms
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_auth_url() -> String {
    "http://localhost:8080/auth/exchange".to_string()
}

fn default_page_size() -> usize {
    500
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_url: default_auth_url(),
            page_size: default_page_size(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl FeedConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
