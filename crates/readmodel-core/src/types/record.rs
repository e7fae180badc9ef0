use crate::error::{ReadModelError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// A single column value produced by a projector.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<FieldValue>),
    /// Anything without a scalar mapping; written as its JSON text
    Json(Value),
}

impl FieldValue {
    /// Map a JSON value. Integral numbers that fit in `i64` become `Int`,
    /// other finite numbers become `Float`.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if n.is_u64() {
                    FieldValue::Text(n.to_string())
                } else {
                    n.as_f64()
                        .map(FieldValue::Float)
                        .unwrap_or_else(|| FieldValue::Text(n.to_string()))
                }
            }
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => {
                FieldValue::Array(items.into_iter().map(FieldValue::from_json).collect())
            }
            other @ Value::Object(_) => FieldValue::Json(other),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
            FieldValue::Array(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            FieldValue::Json(v) => v.clone(),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Column name to value mapping, kept in the order the projector produced it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Set a column, replacing an earlier value under the same name in place.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn from_json_object(map: serde_json::Map<String, Value>) -> Self {
        Self {
            fields: map
                .into_iter()
                .map(|(k, v)| (k, FieldValue::from_json(v)))
                .collect(),
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// What a projector produced for one event.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutput {
    One(Record),
    /// Fan-out: every record is inserted independently, in order
    Many(Vec<Record>),
}

impl TransformOutput {
    /// Accepts a JSON object or an array of JSON objects.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(TransformOutput::One(Record::from_json_object(map))),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(map) => Ok(Record::from_json_object(map)),
                    other => Err(ReadModelError::Transform(format!(
                        "element {} of projector output is not an object: {}",
                        i, other
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(TransformOutput::Many),
            other => Err(ReadModelError::Transform(format!(
                "projector must return an object or an array of objects, got {}",
                other
            ))),
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            TransformOutput::One(record) => vec![record],
            TransformOutput::Many(records) => records,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            TransformOutput::One(record) => record.to_json(),
            TransformOutput::Many(records) => {
                Value::Array(records.iter().map(Record::to_json).collect())
            }
        }
    }
}

impl From<Record> for TransformOutput {
    fn from(record: Record) -> Self {
        TransformOutput::One(record)
    }
}

impl From<Vec<Record>> for TransformOutput {
    fn from(records: Vec<Record>) -> Self {
        TransformOutput::Many(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_numbers_split_into_int_and_float() {
        assert_eq!(FieldValue::from_json(json!(42)), FieldValue::Int(42));
        assert_eq!(FieldValue::from_json(json!(-7)), FieldValue::Int(-7));
        assert_eq!(FieldValue::from_json(json!(1.25)), FieldValue::Float(1.25));
        assert_eq!(
            FieldValue::from_json(json!(u64::MAX)),
            FieldValue::Text(u64::MAX.to_string())
        );
    }

    #[test]
    fn nested_objects_are_kept_as_json() {
        let v = FieldValue::from_json(json!({"a": 1}));
        assert_eq!(v, FieldValue::Json(json!({"a": 1})));
    }

    #[test]
    fn insert_replaces_existing_column_in_place() {
        let mut record = Record::new().with("id", 1).with("name", "a");
        record.insert("id", 2);
        assert_eq!(record.len(), 2);
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(record.get("id"), Some(&FieldValue::Int(2)));
    }

    #[test]
    fn output_from_array_fans_out() {
        let out = TransformOutput::from_json(json!([{"id": 1}, {"id": 2}, {"id": 3}])).unwrap();
        assert_eq!(out.into_records().len(), 3);
    }

    #[test]
    fn output_rejects_scalars_and_mixed_arrays() {
        assert!(TransformOutput::from_json(json!("nope")).is_err());
        assert!(TransformOutput::from_json(json!([{"id": 1}, 2])).is_err());
    }
}
