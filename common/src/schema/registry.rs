use crate::model::kind::{FieldSpec, RecordKind};
use crate::model::record::{FieldType, ID_FIELD, TIMESTAMP_FIELD};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("record kind name must not be empty")]
    EmptyKindName,
    #[error("record kind '{0}' is already registered")]
    DuplicateKind(String),
    #[error("record kind '{kind}' declares no fields")]
    NoFields { kind: String },
    #[error("record kind '{kind}' has a field with an empty name")]
    EmptyFieldName { kind: String },
    #[error("record kind '{kind}' declares field '{field}' twice")]
    DuplicateField { kind: String, field: String },
    #[error("record kind '{kind}' may not declare reserved field '{field}'")]
    ReservedField { kind: String, field: String },
    #[error("invalid schema definition: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk form of additional record kinds.
///
/// ```json
/// { "kinds": [ { "name": "weather", "fields": [ { "name": "celsius", "type": "float" } ] } ] }
/// ```
#[derive(Debug, Deserialize)]
pub struct SchemaFile {
    pub kinds: Vec<RecordKind>,
}

/// Lookup table from kind name to field schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    kinds: BTreeMap<String, RecordKind>,
}

impl SchemaRegistry {
    /// An empty registry. Most callers want [`SchemaRegistry::builtin`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry preloaded with the kinds every deployment accepts.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for kind in builtin_kinds() {
            // builtin kinds are well-formed and uniquely named
            let name = kind.name.clone();
            registry.kinds.insert(name, kind);
        }
        registry
    }

    pub fn register(&mut self, kind: RecordKind) -> Result<(), SchemaError> {
        check_kind(&kind)?;
        if self.kinds.contains_key(&kind.name) {
            return Err(SchemaError::DuplicateKind(kind.name));
        }
        self.kinds.insert(kind.name.clone(), kind);
        Ok(())
    }

    /// Registers every kind of a [`SchemaFile`] given as JSON text.
    ///
    /// Nothing is registered unless the whole file is valid.
    pub fn extend_from_json(&mut self, json: &str) -> Result<usize, SchemaError> {
        let file: SchemaFile = serde_json::from_str(json)?;
        let mut staged = self.clone();
        for kind in file.kinds.iter().cloned() {
            staged.register(kind)?;
        }
        *self = staged;
        Ok(file.kinds.len())
    }

    pub fn get(&self, name: &str) -> Option<&RecordKind> {
        self.kinds.get(name)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &RecordKind> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

fn check_kind(kind: &RecordKind) -> Result<(), SchemaError> {
    if kind.name.trim().is_empty() {
        return Err(SchemaError::EmptyKindName);
    }
    if kind.fields.is_empty() {
        return Err(SchemaError::NoFields {
            kind: kind.name.clone(),
        });
    }
    let mut seen = HashSet::new();
    for field in &kind.fields {
        if field.name.trim().is_empty() {
            return Err(SchemaError::EmptyFieldName {
                kind: kind.name.clone(),
            });
        }
        if field.name == TIMESTAMP_FIELD || field.name == ID_FIELD {
            return Err(SchemaError::ReservedField {
                kind: kind.name.clone(),
                field: field.name.clone(),
            });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                kind: kind.name.clone(),
                field: field.name.clone(),
            });
        }
    }
    Ok(())
}

fn numbered_sensors(count: usize, field_type: FieldType) -> Vec<FieldSpec> {
    (1..=count)
        .map(|i| FieldSpec::new(format!("sensor_{i}"), field_type))
        .collect()
}

fn builtin_kinds() -> Vec<RecordKind> {
    vec![
        RecordKind::new(
            "hsv",
            vec![
                FieldSpec::new("raw", FieldType::String),
                FieldSpec::new("H", FieldType::Float),
                FieldSpec::new("S", FieldType::Float),
                FieldSpec::new("V", FieldType::Float),
            ],
        ),
        RecordKind::new("sensors10", numbered_sensors(10, FieldType::Float)),
        RecordKind::new("sensors9", numbered_sensors(9, FieldType::Integer)),
        RecordKind::new(
            "patient",
            vec![
                FieldSpec::new("patient_id", FieldType::String),
                FieldSpec::new("first_name", FieldType::String),
                FieldSpec::new("last_name", FieldType::String),
                FieldSpec::new("email", FieldType::String),
                FieldSpec::new("date_of_birth", FieldType::String),
                FieldSpec::new("gender", FieldType::String),
                FieldSpec::new("age", FieldType::Integer),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_kinds_pass_their_own_checks() {
        let registry = SchemaRegistry::builtin();
        assert_eq!(registry.len(), 4);
        for kind in registry.kinds() {
            check_kind(kind).unwrap();
        }
        assert_eq!(registry.get("sensors10").unwrap().fields.len(), 10);
        assert_eq!(
            registry.get("sensors9").unwrap().field("sensor_9").unwrap().field_type,
            FieldType::Integer
        );
    }

    #[test]
    fn extend_from_json_adds_kinds() {
        let mut registry = SchemaRegistry::builtin();
        let added = registry
            .extend_from_json(
                r#"{"kinds":[{"name":"weather","fields":[{"name":"celsius","type":"float"},{"name":"station","type":"string"}]}]}"#,
            )
            .unwrap();
        assert_eq!(added, 1);
        let weather = registry.get("weather").unwrap();
        assert_eq!(weather.field("celsius").unwrap().field_type, FieldType::Float);
    }

    #[test]
    fn extend_from_json_is_all_or_nothing() {
        let mut registry = SchemaRegistry::builtin();
        let err = registry
            .extend_from_json(
                r#"{"kinds":[
                    {"name":"ok","fields":[{"name":"a","type":"integer"}]},
                    {"name":"hsv","fields":[{"name":"a","type":"integer"}]}
                ]}"#,
            )
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateKind(name) if name == "hsv"));
        assert!(registry.get("ok").is_none());
    }

    #[test]
    fn reserved_and_duplicate_fields_are_rejected() {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .register(RecordKind::new(
                "k",
                vec![FieldSpec::new("timestamp", FieldType::String)],
            ))
            .unwrap_err();
        assert!(matches!(err, SchemaError::ReservedField { .. }));

        let err = registry
            .register(RecordKind::new(
                "k",
                vec![
                    FieldSpec::new("a", FieldType::Float),
                    FieldSpec::new("a", FieldType::Integer),
                ],
            ))
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_field_types_fail_to_parse() {
        let err = SchemaRegistry::new()
            .extend_from_json(r#"{"kinds":[{"name":"k","fields":[{"name":"a","type":"bool"}]}]}"#)
            .unwrap_err();
        assert!(matches!(err, SchemaError::Json(_)));
    }
}
