//! Tool definitions and dispatch.
//!
//! Every tool answers with a JSON text body carrying `success` and a
//! `message` on failure; failures are also flagged with `isError`.

use readmodel::{ReadModel, StartStream};
use serde_json::{json, Value};
use std::path::Path;

use crate::error::McpError;
use crate::protocol::{McpTool, McpToolResult};

pub fn list_tools() -> Vec<McpTool> {
    vec![
        McpTool {
            name: "initialize_store".into(),
            description: "Open the embedded SQL store, in memory or at a file path. Replaces an already open store.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file": { "type": "string", "description": "Database file path; omit for an in-memory store" }
                }
            }),
        },
        McpTool {
            name: "close_store".into(),
            description: "Stop all streams and close the store.".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        McpTool {
            name: "create_table".into(),
            description: "Run a CREATE TABLE (or any other DDL) statement against the store.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sql": { "type": "string", "description": "SQL statement" }
                },
                "required": ["sql"]
            }),
        },
        McpTool {
            name: "register_projector".into(),
            description: "Load a projector from a shared library and register it under a name. Re-registering a name replaces the previous projector.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Projector name" },
                    "path": { "type": "string", "description": "Path to the projector library" }
                },
                "required": ["name", "path"]
            }),
        },
        McpTool {
            name: "start_stream".into(),
            description: "Start projecting a time window of events into a table. Returns immediately; poll get_stream for progress. Omit targetTable for a dry run.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "tenant": { "type": "string" },
                    "dataCore": { "type": "string" },
                    "flowType": { "type": "string" },
                    "eventTypes": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Event types of the same flow type, in order"
                    },
                    "startDate": { "type": "string", "description": "RFC 3339 timestamp or YYYY-MM-DD" },
                    "endDate": { "type": "string", "description": "RFC 3339 timestamp or YYYY-MM-DD" },
                    "projectorName": { "type": "string" },
                    "targetTable": { "type": "string" },
                    "maxParallelism": { "type": "integer", "minimum": 1, "default": 100 },
                    "includeSensitiveData": { "type": "boolean", "default": false }
                },
                "required": ["tenant", "dataCore", "flowType", "eventTypes", "startDate", "endDate", "projectorName"]
            }),
        },
        McpTool {
            name: "stop_stream".into(),
            description: "Stop a running stream. Batches already dispatched finish.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "streamId": { "type": "string" }
                },
                "required": ["streamId"]
            }),
        },
        McpTool {
            name: "stop_all_streams".into(),
            description: "Stop every running stream.".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        McpTool {
            name: "get_stream".into(),
            description: "Get the status and counters of a stream.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "streamId": { "type": "string" }
                },
                "required": ["streamId"]
            }),
        },
        McpTool {
            name: "list_streams".into(),
            description: "List all streams, oldest first.".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        McpTool {
            name: "execute_query".into(),
            description: "Run a SQL query against the store and return the rows.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sql": { "type": "string", "description": "SQL query" }
                },
                "required": ["sql"]
            }),
        },
    ]
}

pub async fn call_tool(name: &str, args: &Value, model: &ReadModel) -> Result<McpToolResult, McpError> {
    match name {
        "initialize_store" => tool_initialize_store(args, model).await,
        "close_store" => tool_close_store(model).await,
        "create_table" => tool_create_table(args, model).await,
        "register_projector" => tool_register_projector(args, model).await,
        "start_stream" => tool_start_stream(args, model),
        "stop_stream" => tool_stop_stream(args, model),
        "stop_all_streams" => tool_stop_all_streams(model),
        "get_stream" => tool_get_stream(args, model),
        "list_streams" => tool_list_streams(model),
        "execute_query" => Ok(tool_execute_query(args, model).await),
        _ => Err(McpError::ToolNotFound(name.to_string())),
    }
}

/// Body returned for any failed tool call.
pub fn failure_body(error: &McpError) -> Value {
    json!({ "success": false, "message": error.to_string() })
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, McpError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| McpError::InvalidRequest(format!("missing '{}' parameter", key)))
}

// ── Tool implementations ──────────────────────────────────

async fn tool_initialize_store(args: &Value, model: &ReadModel) -> Result<McpToolResult, McpError> {
    let file = args.get("file").and_then(|v| v.as_str()).filter(|s| !s.is_empty());
    let message = model.initialize_store(file.map(Path::new)).await?;
    Ok(McpToolResult::json(&json!({ "success": true, "message": message })))
}

async fn tool_close_store(model: &ReadModel) -> Result<McpToolResult, McpError> {
    model.close_store().await?;
    Ok(McpToolResult::json(&json!({ "success": true, "message": "Database closed" })))
}

async fn tool_create_table(args: &Value, model: &ReadModel) -> Result<McpToolResult, McpError> {
    let sql = str_arg(args, "sql")?;
    model.create_table(sql).await?;
    Ok(McpToolResult::json(
        &json!({ "success": true, "message": "Table created successfully" }),
    ))
}

async fn tool_register_projector(args: &Value, model: &ReadModel) -> Result<McpToolResult, McpError> {
    let name = str_arg(args, "name")?;
    let path = str_arg(args, "path")?;
    let registration = model.register_projector(name, Path::new(path)).await?;
    Ok(McpToolResult::json(&json!({
        "success": true,
        "id": registration.id,
        "name": registration.name,
    })))
}

fn tool_start_stream(args: &Value, model: &ReadModel) -> Result<McpToolResult, McpError> {
    let request: StartStream = serde_json::from_value(args.clone())
        .map_err(|e| McpError::InvalidRequest(e.to_string()))?;
    let started = model.start_stream(request)?;
    Ok(McpToolResult::json(&json!({
        "streamId": started.stream_id,
        "status": started.status,
        "eventCount": started.event_count,
    })))
}

fn tool_stop_stream(args: &Value, model: &ReadModel) -> Result<McpToolResult, McpError> {
    let stream_id = str_arg(args, "streamId")?;
    let stopped = model.stop_stream(stream_id)?;
    Ok(McpToolResult::json(&json!({
        "success": true,
        "message": format!("Stream {} stopped", stream_id),
        "status": stopped.status,
        "eventCount": stopped.event_count,
    })))
}

fn tool_stop_all_streams(model: &ReadModel) -> Result<McpToolResult, McpError> {
    let stopped = model.stop_all_streams();
    Ok(McpToolResult::json(&json!({ "success": true, "stopped": stopped })))
}

fn tool_get_stream(args: &Value, model: &ReadModel) -> Result<McpToolResult, McpError> {
    let stream_id = str_arg(args, "streamId")?;
    let snapshot = model.get_stream(stream_id)?;
    Ok(McpToolResult::json(&serde_json::to_value(snapshot)?))
}

fn tool_list_streams(model: &ReadModel) -> Result<McpToolResult, McpError> {
    Ok(McpToolResult::json(&serde_json::to_value(model.list_streams())?))
}

async fn tool_execute_query(args: &Value, model: &ReadModel) -> McpToolResult {
    let result = match str_arg(args, "sql") {
        Ok(sql) => model.execute_query(sql).await.map_err(McpError::from),
        Err(e) => Err(e),
    };
    match result {
        Ok(rows) => McpToolResult::json(&json!({
            "success": true,
            "message": "Query executed successfully",
            "results": rows,
        })),
        Err(e) => McpToolResult::failure(&json!({
            "success": false,
            "message": e.to_string(),
            "results": null,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_are_unique() {
        let tools = list_tools();
        let mut names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), tools.len());
        assert_eq!(tools.len(), 10);
    }

    #[test]
    fn required_fields_are_declared_properties() {
        for tool in list_tools() {
            let properties = tool.input_schema["properties"].as_object().unwrap();
            if let Some(required) = tool.input_schema["required"].as_array() {
                for field in required {
                    assert!(
                        properties.contains_key(field.as_str().unwrap()),
                        "{} requires undeclared {}",
                        tool.name,
                        field
                    );
                }
            }
        }
    }

    #[test]
    fn missing_argument_message() {
        let err = str_arg(&json!({}), "sql").unwrap_err();
        assert_eq!(err.to_string(), "invalid request: missing 'sql' parameter");
    }
}
