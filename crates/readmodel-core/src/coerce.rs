//! Record coercion
//!
//! Turns projector output into values a SQL store accepts. Every field maps
//! to exactly one [`SqlParam`]; the same parameters back both the
//! prepared-statement path and the literal path.

use crate::config::InsertMode;
use crate::error::{ReadModelError, Result};
use crate::types::{FieldValue, Record};
use chrono::SecondsFormat;

/// A store-ready scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Text(String),
}

// i64::MAX as f64 rounds up to 2^63, which no longer fits
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

pub fn coerce_value(value: &FieldValue) -> SqlParam {
    match value {
        FieldValue::Null => SqlParam::Null,
        FieldValue::Bool(b) => SqlParam::Boolean(*b),
        FieldValue::Int(i) => SqlParam::Integer(*i),
        FieldValue::Float(f) => {
            if !f.is_finite() {
                SqlParam::Text(f.to_string())
            } else if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < I64_UPPER {
                SqlParam::Integer(*f as i64)
            } else {
                SqlParam::Real(*f)
            }
        }
        FieldValue::Text(s) => SqlParam::Text(s.clone()),
        FieldValue::Timestamp(ts) => {
            SqlParam::Text(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        FieldValue::Array(_) => SqlParam::Text(value.to_json().to_string()),
        FieldValue::Json(v) => SqlParam::Text(v.to_string()),
    }
}

/// Coerce every column of a record, preserving column order.
pub fn coerce_record(record: &Record) -> Result<Vec<(String, SqlParam)>> {
    if record.is_empty() {
        return Err(ReadModelError::Transform("record has no columns".into()));
    }
    record
        .iter()
        .map(|(column, value)| {
            if column.trim().is_empty() {
                return Err(ReadModelError::Transform("record has an empty column name".into()));
            }
            Ok((column.to_string(), coerce_value(value)))
        })
        .collect()
}

/// Render a parameter as SQL literal text.
pub fn render_literal(param: &SqlParam) -> String {
    match param {
        SqlParam::Null => "NULL".to_string(),
        SqlParam::Integer(i) => i.to_string(),
        SqlParam::Real(f) => f.to_string(),
        SqlParam::Boolean(true) => "TRUE".to_string(),
        SqlParam::Boolean(false) => "FALSE".to_string(),
        SqlParam::Text(s) => quote_literal(s),
    }
}

pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// A ready-to-run insert. `params` is empty in literal mode.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

pub fn insert_statement(table: &str, record: &Record, mode: InsertMode) -> Result<InsertStatement> {
    if table.trim().is_empty() {
        return Err(ReadModelError::InvalidRequest("target table must not be empty".into()));
    }
    let fields = coerce_record(record)?;
    let columns = fields
        .iter()
        .map(|(c, _)| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(match mode {
        InsertMode::Bind => {
            let placeholders = (1..=fields.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", ");
            InsertStatement {
                sql: format!("INSERT INTO {} ({}) VALUES ({})", table, columns, placeholders),
                params: fields.into_iter().map(|(_, p)| p).collect(),
            }
        }
        InsertMode::Literal => {
            let values = fields
                .iter()
                .map(|(_, p)| render_literal(p))
                .collect::<Vec<_>>()
                .join(", ");
            InsertStatement {
                sql: format!("INSERT INTO {} ({}) VALUES ({})", table, columns, values),
                params: Vec::new(),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn obrien() -> Record {
        Record::new()
            .with("id", 1)
            .with("name", "O'Brien")
            .with("active", true)
            .with("ts", Utc.with_ymd_and_hms(2025, 1, 1, 12, 30, 0).unwrap())
    }

    #[test]
    fn literal_insert_escapes_and_formats() {
        let stmt = insert_statement("people", &obrien(), InsertMode::Literal).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO people (\"id\", \"name\", \"active\", \"ts\") \
             VALUES (1, 'O''Brien', TRUE, '2025-01-01T12:30:00.000Z')"
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn bind_insert_keeps_native_types() {
        let stmt = insert_statement("people", &obrien(), InsertMode::Bind).unwrap();
        assert!(stmt.sql.ends_with("VALUES (?1, ?2, ?3, ?4)"));
        assert_eq!(
            stmt.params,
            vec![
                SqlParam::Integer(1),
                SqlParam::Text("O'Brien".into()),
                SqlParam::Boolean(true),
                SqlParam::Text("2025-01-01T12:30:00.000Z".into()),
            ]
        );
    }

    #[test]
    fn integral_floats_become_integers() {
        assert_eq!(coerce_value(&FieldValue::Float(3.0)), SqlParam::Integer(3));
        assert_eq!(coerce_value(&FieldValue::Float(3.5)), SqlParam::Real(3.5));
        assert_eq!(coerce_value(&FieldValue::Float(1e300)), SqlParam::Real(1e300));
        assert_eq!(
            coerce_value(&FieldValue::Float(f64::NAN)),
            SqlParam::Text("NaN".into())
        );
    }

    #[test]
    fn composite_values_are_stringified() {
        let arr = FieldValue::Array(vec![FieldValue::Int(1), FieldValue::Text("a".into())]);
        assert_eq!(coerce_value(&arr), SqlParam::Text("[1,\"a\"]".into()));
        let obj = FieldValue::Json(serde_json::json!({"k": "v"}));
        assert_eq!(coerce_value(&obj), SqlParam::Text("{\"k\":\"v\"}".into()));
    }

    #[test]
    fn null_renders_bare() {
        let record = Record::new().with("note", FieldValue::Null);
        let stmt = insert_statement("t", &record, InsertMode::Literal).unwrap();
        assert!(stmt.sql.ends_with("VALUES (NULL)"));
    }

    #[test]
    fn empty_records_are_rejected() {
        assert!(insert_statement("t", &Record::new(), InsertMode::Bind).is_err());
        assert!(insert_statement("", &obrien(), InsertMode::Bind).is_err());
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
