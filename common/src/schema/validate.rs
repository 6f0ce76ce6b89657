use crate::model::kind::RecordKind;
use crate::model::record::{FieldType, FieldValue, Record, TIMESTAMP_FIELD};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// What is wrong with a field (or with the payload as a whole).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Problem {
    /// The request body is not a JSON array.
    NotAnArray,
    /// An element of the array is not a JSON object.
    NotAnObject,
    Missing,
    WrongType,
    /// An integer that does not fit in 64 signed bits.
    OutOfRange,
    /// A field the kind does not declare.
    Unexpected,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Problem::NotAnArray => "payload is not an array",
            Problem::NotAnObject => "record is not an object",
            Problem::Missing => "field is missing",
            Problem::WrongType => "field has the wrong type",
            Problem::OutOfRange => "integer is out of range",
            Problem::Unexpected => "field is not part of the record kind",
        };
        f.write_str(text)
    }
}

/// One reason a batch was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Position of the offending record in the batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<FieldType>,
    /// JSON type actually received, for `wrong_type` and `out_of_range`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<String>,
    pub problem: Problem,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(index) = self.index {
            write!(f, "[{index}]")?;
        }
        if let Some(field) = &self.field {
            write!(f, ".{field}")?;
        }
        if self.index.is_some() || self.field.is_some() {
            f.write_str(": ")?;
        }
        write!(f, "{}", self.problem)?;
        match (&self.expected, &self.found) {
            (Some(expected), Some(found)) => write!(f, " (expected {expected}, found {found})"),
            (Some(expected), None) => write!(f, " (expected {expected})"),
            _ => Ok(()),
        }
    }
}

/// A batch failed validation. Carries every violation found, not just the
/// first one.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{} violation(s) in batch for record kind '{kind}'", .violations.len())]
pub struct ValidationError {
    pub kind: String,
    pub violations: Vec<FieldViolation>,
}

/// Validates `payload` against `kind`, defaulting missing timestamps to now.
pub fn validate_batch(kind: &RecordKind, payload: &Value) -> Result<Vec<Record>, ValidationError> {
    validate_batch_at(kind, payload, Utc::now())
}

/// Validates `payload` against `kind`, defaulting missing timestamps to `now`.
///
/// An empty array is valid and yields no records. Any violation rejects the
/// whole batch.
pub fn validate_batch_at(
    kind: &RecordKind,
    payload: &Value,
    now: DateTime<Utc>,
) -> Result<Vec<Record>, ValidationError> {
    let Some(items) = payload.as_array() else {
        return Err(ValidationError {
            kind: kind.name.clone(),
            violations: vec![FieldViolation {
                index: None,
                field: None,
                expected: None,
                found: Some(json_type_name(payload).to_string()),
                problem: Problem::NotAnArray,
            }],
        });
    };

    let default_timestamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
    let mut records = Vec::with_capacity(items.len());
    let mut violations = Vec::new();

    for (index, item) in items.iter().enumerate() {
        match item.as_object() {
            Some(object) => {
                if let Some(record) =
                    validate_record(kind, index, object, &default_timestamp, &mut violations)
                {
                    records.push(record);
                }
            }
            None => violations.push(FieldViolation {
                index: Some(index),
                field: None,
                expected: None,
                found: Some(json_type_name(item).to_string()),
                problem: Problem::NotAnObject,
            }),
        }
    }

    if violations.is_empty() {
        Ok(records)
    } else {
        Err(ValidationError {
            kind: kind.name.clone(),
            violations,
        })
    }
}

fn validate_record(
    kind: &RecordKind,
    index: usize,
    object: &Map<String, Value>,
    default_timestamp: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<Record> {
    let before = violations.len();
    let mut record = Record::new();

    for spec in &kind.fields {
        let violation = |problem, found: Option<&Value>| FieldViolation {
            index: Some(index),
            field: Some(spec.name.clone()),
            expected: Some(spec.field_type),
            found: found.map(|v| json_type_name(v).to_string()),
            problem,
        };
        match object.get(&spec.name) {
            None | Some(Value::Null) => violations.push(violation(Problem::Missing, None)),
            Some(value) => match coerce(spec.field_type, value) {
                Ok(field) => {
                    record.insert(spec.name.clone(), field);
                }
                Err(problem) => violations.push(violation(problem, Some(value))),
            },
        }
    }

    match object.get(TIMESTAMP_FIELD) {
        None | Some(Value::Null) => {
            record.insert(TIMESTAMP_FIELD, FieldValue::String(default_timestamp.to_string()));
        }
        Some(Value::String(ts)) => {
            record.insert(TIMESTAMP_FIELD, FieldValue::String(ts.clone()));
        }
        Some(other) => violations.push(FieldViolation {
            index: Some(index),
            field: Some(TIMESTAMP_FIELD.to_string()),
            expected: Some(FieldType::String),
            found: Some(json_type_name(other).to_string()),
            problem: Problem::WrongType,
        }),
    }

    for name in object.keys() {
        if name != TIMESTAMP_FIELD && kind.field(name).is_none() {
            violations.push(FieldViolation {
                index: Some(index),
                field: Some(name.clone()),
                expected: None,
                found: None,
                problem: Problem::Unexpected,
            });
        }
    }

    (violations.len() == before).then_some(record)
}

fn coerce(field_type: FieldType, value: &Value) -> Result<FieldValue, Problem> {
    match (field_type, value) {
        (FieldType::String, Value::String(s)) => Ok(FieldValue::String(s.clone())),
        (FieldType::Integer, Value::Number(n)) if n.is_i64() => {
            n.as_i64().map(FieldValue::Integer).ok_or(Problem::OutOfRange)
        }
        (FieldType::Integer, Value::Number(n)) if n.is_u64() => Err(Problem::OutOfRange),
        (FieldType::Float, Value::Number(n)) if n.is_f64() => {
            n.as_f64().map(FieldValue::Float).ok_or(Problem::WrongType)
        }
        _ => Err(Problem::WrongType),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    fn kind(name: &str) -> RecordKind {
        SchemaRegistry::builtin().get(name).unwrap().clone()
    }

    #[test]
    fn empty_batch_is_valid() {
        let records = validate_batch(&kind("hsv"), &json!([])).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn hsv_record_gets_default_timestamp() {
        let records = validate_batch_at(
            &kind("hsv"),
            &json!([{ "H": 1.0, "S": 0.5, "V": 0.2, "raw": "x" }]),
            fixed_now(),
        )
        .unwrap();

        let expected: Record = [
            ("raw", FieldValue::String("x".into())),
            ("H", FieldValue::Float(1.0)),
            ("S", FieldValue::Float(0.5)),
            ("V", FieldValue::Float(0.2)),
            (TIMESTAMP_FIELD, FieldValue::String("2024-05-01T12:30:00.000000Z".into())),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
        assert_eq!(records, vec![expected]);
    }

    #[test]
    fn supplied_timestamp_is_kept_verbatim() {
        let records = validate_batch_at(
            &kind("hsv"),
            &json!([{ "H": 1.0, "S": 0.5, "V": 0.2, "raw": "x", "timestamp": "2020-01-01 00:00:00" }]),
            fixed_now(),
        )
        .unwrap();
        assert_eq!(records[0].timestamp(), Some("2020-01-01 00:00:00"));
    }

    #[test]
    fn missing_sensor_rejects_the_whole_batch() {
        let mut complete = Map::new();
        for i in 1..=10 {
            complete.insert(format!("sensor_{i}"), json!(i as f64 + 0.5));
        }
        let mut partial = complete.clone();
        partial.remove("sensor_3");

        let err = validate_batch(
            &kind("sensors10"),
            &Value::Array(vec![Value::Object(complete), Value::Object(partial)]),
        )
        .unwrap_err();

        assert_eq!(err.kind, "sensors10");
        assert_eq!(
            err.violations,
            vec![FieldViolation {
                index: Some(1),
                field: Some("sensor_3".into()),
                expected: Some(FieldType::Float),
                found: None,
                problem: Problem::Missing,
            }]
        );
    }

    #[test]
    fn integer_and_float_are_not_interchangeable() {
        let mut ints = Map::new();
        for i in 1..=9 {
            ints.insert(format!("sensor_{i}"), json!(i));
        }
        ints.insert("sensor_4".into(), json!(4.0));
        let err = validate_batch(&kind("sensors9"), &json!([ints])).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].problem, Problem::WrongType);
        assert_eq!(err.violations[0].found.as_deref(), Some("float"));

        let err = validate_batch(
            &kind("hsv"),
            &json!([{ "H": 1, "S": 0.5, "V": 0.2, "raw": "x" }]),
        )
        .unwrap_err();
        assert_eq!(err.violations[0].field.as_deref(), Some("H"));
        assert_eq!(err.violations[0].found.as_deref(), Some("integer"));
    }

    #[test]
    fn every_violation_is_reported() {
        let err = validate_batch(
            &kind("hsv"),
            &json!([
                { "H": "red", "S": 0.5, "V": 0.2, "raw": "x", "extra": true },
                7,
                { "H": 1.0, "S": null, "V": 0.2, "raw": "x", "timestamp": 5 }
            ]),
        )
        .unwrap_err();

        let summary: Vec<_> = err
            .violations
            .iter()
            .map(|v| (v.index, v.field.as_deref(), v.problem))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Some(0), Some("H"), Problem::WrongType),
                (Some(0), Some("extra"), Problem::Unexpected),
                (Some(1), None, Problem::NotAnObject),
                (Some(2), Some("S"), Problem::Missing),
                (Some(2), Some("timestamp"), Problem::WrongType),
            ]
        );
    }

    #[test]
    fn oversized_integer_is_out_of_range() {
        let err = validate_batch(
            &kind("patient"),
            &json!([{
                "patient_id": "p1", "first_name": "A", "last_name": "B",
                "email": "a@b.c", "date_of_birth": "1990-01-01", "gender": "f",
                "age": u64::MAX
            }]),
        )
        .unwrap_err();
        assert_eq!(err.violations[0].problem, Problem::OutOfRange);
    }

    #[test]
    fn non_array_payload_is_rejected() {
        let err = validate_batch(&kind("hsv"), &json!({ "H": 1.0 })).unwrap_err();
        assert_eq!(err.violations[0].problem, Problem::NotAnArray);
        assert_eq!(err.violations[0].found.as_deref(), Some("object"));
        assert_eq!(err.violations[0].to_string(), "payload is not an array");
    }

    #[test]
    fn violation_display_names_the_field() {
        let violation = FieldViolation {
            index: Some(2),
            field: Some("S".into()),
            expected: Some(FieldType::Float),
            found: Some("string".into()),
            problem: Problem::WrongType,
        };
        assert_eq!(
            violation.to_string(),
            "[2].S: field has the wrong type (expected float, found string)"
        );
    }
}
