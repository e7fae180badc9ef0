use async_trait::async_trait;
use readmodel_core::{BearerTokenProvider, FeedError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Username and personal access token supplied at startup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Credentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pat: Option<String>,
}

impl Credentials {
    pub fn new(username: Option<String>, pat: Option<String>) -> Self {
        Self { username, pat }
    }

    /// At least one of the two must be present for the exchange to make sense.
    pub fn is_empty(&self) -> bool {
        self.username.as_deref().map_or(true, str::is_empty)
            && self.pat.as_deref().map_or(true, str::is_empty)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(alias = "access_token", alias = "token")]
    #[serde(rename = "accessToken")]
    access_token: String,
}

/// Exchanges credentials for a bearer token on every call. Tokens are not cached.
pub struct PatExchange {
    client: reqwest::Client,
    auth_url: String,
    credentials: Credentials,
}

impl PatExchange {
    pub fn new(auth_url: impl Into<String>, credentials: Credentials, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            auth_url: auth_url.into(),
            credentials,
        }
    }
}

#[async_trait]
impl BearerTokenProvider for PatExchange {
    async fn bearer_token(&self) -> Result<String, FeedError> {
        tracing::debug!(auth_url = %self.auth_url, "Exchanging access token");

        let response = self
            .client
            .post(&self.auth_url)
            .json(&self.credentials)
            .send()
            .await
            .map_err(|e| FeedError::Auth(format!("token exchange failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Auth(format!(
                "token exchange rejected ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Auth(format!("malformed token response: {}", e)))?;
        if token.access_token.is_empty() {
            return Err(FeedError::Auth("token exchange returned an empty token".into()));
        }
        Ok(token.access_token)
    }
}

/// A fixed token, for feeds that accept a pre-issued credential.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl BearerTokenProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String, FeedError> {
        Ok(self.0.clone())
    }
}
