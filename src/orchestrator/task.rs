// tablevault/src/orchestrator/task.rs
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::{DbToolError, Result};

pub const DUMP_EXTENSION: &str = "sql";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Dump,
    Load,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Dump => write!(f, "backup"),
            OperationKind::Load => write!(f, "restore"),
        }
    }
}

/// One unit of work: a single table dumped to, or loaded from, one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    id: String,
    kind: OperationKind,
    path: PathBuf,
}

impl Task {
    /// Dumps `table` into `{dir}/{table}.sql`.
    pub fn dump(table: impl Into<String>, dir: &Path) -> Self {
        let id = table.into();
        let path = dump_file_path(dir, &id);
        Self {
            id,
            kind: OperationKind::Dump,
            path,
        }
    }

    /// Loads `table` from `{dir}/{table}.sql`.
    pub fn load(table: impl Into<String>, dir: &Path) -> Self {
        let id = table.into();
        let path = dump_file_path(dir, &id);
        Self {
            id,
            kind: OperationKind::Load,
            path,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn dump_file_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{}.{}", table, DUMP_EXTENSION))
}

/// Rejects table names that cannot safely become a file name.
pub fn validate_table_name(table: &str) -> Result<()> {
    if table.trim().is_empty()
        || table == "."
        || table == ".."
        || table.contains(|c: char| c == '/' || c == '\\' || c == '\0')
    {
        return Err(DbToolError::InvalidTableName(table.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
}

/// Result of one task: the output path on success, the error text on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    id: String,
    status: OutcomeStatus,
    detail: String,
}

impl Outcome {
    pub fn succeeded(id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: OutcomeStatus::Succeeded,
            detail: detail.into(),
        }
    }

    pub fn failed(id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: OutcomeStatus::Failed,
            detail: detail.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }

    pub(crate) fn reassign(mut self, id: &str) -> Self {
        if self.id != id {
            self.id = id.to_string();
        }
        self
    }
}
