//! MCP server for the read model
//!
//! Speaks JSON-RPC 2.0 over newline-delimited stdio and exposes every read
//! model operation as a tool.

pub mod error;
pub mod protocol;
pub mod server;
pub mod tools;

pub use error::McpError;
pub use server::McpServer;
