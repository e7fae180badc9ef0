//! HTTP event feed for the read model
//!
//! Pulls events page by page for one tenant / data core / flow type and a
//! set of event types, walking hourly time buckets in order. Every
//! connection exchanges the caller's credentials for a fresh bearer token.

pub mod auth;
pub mod client;
pub mod wire;

pub use auth::{Credentials, PatExchange, StaticToken};
pub use client::{HttpConnector, HttpEventFeed};
