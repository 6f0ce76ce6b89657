use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where a batch is written to or read from: a logical database and a
/// collection inside it.
///
/// Both names are free-form. They are routing metadata only and are not
/// checked against any allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    database: String,
    collection: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("database name must not be empty")]
    EmptyDatabase,
    #[error("collection name must not be empty")]
    EmptyCollection,
}

impl Target {
    pub fn new(
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Result<Self, TargetError> {
        let database = database.into();
        let collection = collection.into();
        if database.trim().is_empty() {
            return Err(TargetError::EmptyDatabase);
        }
        if collection.trim().is_empty() {
            return Err(TargetError::EmptyCollection);
        }
        Ok(Self {
            database,
            collection,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.database, self.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_are_rejected() {
        assert_eq!(Target::new(" ", "c"), Err(TargetError::EmptyDatabase));
        assert_eq!(Target::new("db", ""), Err(TargetError::EmptyCollection));
    }

    #[test]
    fn any_non_empty_name_is_accepted() {
        let target = Target::new("../tenant a", "sensors.v2").unwrap();
        assert_eq!(target.database(), "../tenant a");
        assert_eq!(target.collection(), "sensors.v2");
        assert_eq!(target.to_string(), "../tenant a/sensors.v2");
    }
}
