use base64::Engine;
use readmodel_core::SqlParam;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

/// Binds a coerced parameter with its native SQLite type.
pub struct Bound<'a>(pub &'a SqlParam);

impl ToSql for Bound<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self.0 {
            SqlParam::Null => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Null)),
            SqlParam::Integer(i) => i.to_sql(),
            SqlParam::Real(f) => f.to_sql(),
            SqlParam::Boolean(b) => b.to_sql(),
            SqlParam::Text(s) => s.to_sql(),
        }
    }
}

/// Convert a column value read back from SQLite into JSON. Blobs become base64 text.
pub fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(bytes) => {
            serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
        ValueRef::Blob(bytes) => {
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
    }
}
