use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::UnknownMigrationType;

/// Direction of a migration: `do` applies it, `undo` reverts it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "mysql", derive(sqlx::Type))]
#[cfg_attr(feature = "mysql", sqlx(rename_all = "lowercase"))]
pub enum MigrationType {
    #[default]
    Do,
    Undo,
}

impl MigrationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationType::Do => "do",
            MigrationType::Undo => "undo",
        }
    }
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationType {
    type Err = UnknownMigrationType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "do" => Ok(MigrationType::Do),
            "undo" => Ok(MigrationType::Undo),
            other => Err(UnknownMigrationType(other.to_owned())),
        }
    }
}

/// One row of the migration-record table. `id` is assigned by storage and
/// only ever grows; everything else is written once when the record is
/// inserted, except `hash`, which `repair` may rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "mysql", derive(sqlx::FromRow))]
pub struct MigrationRecord {
    pub id: i64,
    pub version: String,
    #[serde(rename = "type")]
    #[cfg_attr(feature = "mysql", sqlx(rename = "type"))]
    pub kind: MigrationType,
    pub title: String,
    pub hash: String,
    pub applied_at: DateTime<Utc>,
    pub applied_by: String,
    /// Wall-clock milliseconds spent executing the migration body.
    pub execution_time: f64,
    /// Set when the body failed after the attempt was already underway.
    pub dirty: bool,
}

/// A migration handed to [`run`](crate::DatabaseEngine::run): identity
/// fields plus the SQL body to execute. Hash computation belongs to the
/// caller; the engine stores whatever it is given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationSource {
    pub version: String,
    #[serde(rename = "type")]
    pub kind: MigrationType,
    pub title: String,
    pub hash: String,
    pub body: String,
}

impl MigrationSource {
    pub fn new(
        version: impl Into<String>,
        kind: MigrationType,
        title: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            kind,
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();

        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();

        self
    }
}

/// Field set for a record about to be inserted; storage picks the id.
#[derive(Debug, Clone)]
pub struct RecordCandidate {
    pub version: String,
    pub kind: MigrationType,
    pub title: String,
    pub hash: String,
    pub applied_at: DateTime<Utc>,
    pub applied_by: String,
    pub execution_time: f64,
    pub dirty: bool,
}

impl RecordCandidate {
    pub fn into_record(self, id: i64) -> MigrationRecord {
        MigrationRecord {
            id,
            version: self.version,
            kind: self.kind,
            title: self.title,
            hash: self.hash,
            applied_at: self.applied_at,
            applied_by: self.applied_by,
            execution_time: self.execution_time,
            dirty: self.dirty,
        }
    }
}

/// Instruction to rewrite the hash of one existing record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRepair {
    pub id: i64,
    pub hash: String,
}

impl RecordRepair {
    pub fn new(id: i64, hash: impl Into<String>) -> Self {
        Self {
            id,
            hash: hash.into(),
        }
    }
}
