use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbToolError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Failed to enumerate {what}: {reason}")]
    Enumeration { what: String, reason: String },

    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("{program} exited with status {status}: {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} produced unexpected output: {output}")]
    UnexpectedOutput { program: String, output: String },

    #[error("Dump file not found: {}", .0.display())]
    MissingDumpFile(PathBuf),

    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),

    #[error("Gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<DbToolError>,
    },

    #[error("Archive operation failed: {0}")]
    Archive(String),

    #[error("Worker failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, DbToolError>;
