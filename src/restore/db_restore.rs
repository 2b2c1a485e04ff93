// tablevault/src/restore/db_restore.rs
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

use crate::config::SessionConfig;
use crate::errors::{DbToolError, Result};
use crate::orchestrator::task::validate_table_name;
use crate::orchestrator::{Outcome, Task};
use crate::utils::database::ConnectionParams;
use crate::utils::find_executable;
use crate::utils::process::ProcessOutput;
use crate::utils::retry::RetryPolicy;

const LOAD_PROGRAM: &str = "mysql";

/// External restore client. Reads one dump file as its standard input.
#[async_trait]
pub trait LoadClient: Send + Sync {
    async fn load(&self, input_file: &Path) -> Result<ProcessOutput>;
}

/// The `mysql` command-line client fed from a dump file.
pub struct MysqlLoadClient {
    executable: PathBuf,
    working_dir: Option<PathBuf>,
    connection: ConnectionParams,
    character_set: String,
}

impl MysqlLoadClient {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let executable = find_executable(LOAD_PROGRAM, config.client_dir.as_deref())?;
        debug!("Found {} executable at: {}", LOAD_PROGRAM, executable.display());
        Ok(Self {
            executable,
            working_dir: config.client_dir.clone(),
            connection: config.connection.clone(),
            character_set: config.character_set.clone(),
        })
    }
}

#[async_trait]
impl LoadClient for MysqlLoadClient {
    async fn load(&self, input_file: &Path) -> Result<ProcessOutput> {
        let file = tokio::fs::File::open(input_file).await?.into_std().await;

        let mut cmd = Command::new(&self.executable);
        cmd.env("MYSQL_PWD", &self.connection.password)
            .arg(format!("--default-character-set={}", self.character_set))
            .arg("-h")
            .arg(&self.connection.host)
            .arg("-P")
            .arg(self.connection.port.to_string())
            .arg("-u")
            .arg(&self.connection.user)
            .arg(&self.connection.database)
            .stdin(Stdio::from(file))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await?;
        Ok(ProcessOutput::from(output))
    }
}

/// Restores one table from its dump file, retrying transient client failures.
pub struct LoadRunner {
    client: Arc<dyn LoadClient>,
    retry: RetryPolicy,
}

impl LoadRunner {
    pub fn new(client: Arc<dyn LoadClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub async fn load_table(&self, restore_dir: &Path, table: &str) -> Outcome {
        self.load(&Task::load(table, restore_dir)).await
    }

    pub async fn load(&self, task: &Task) -> Outcome {
        let table = task.id();
        let path = task.path();
        if let Err(err) = validate_table_name(table) {
            return Outcome::failed(table, err.to_string());
        }

        // A missing file can never succeed, so it is not retried.
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Outcome::failed(table, DbToolError::MissingDumpFile(path.to_path_buf()).to_string()),
        }

        let label = format!("restore {}", table);
        let client = &self.client;
        let result = self
            .retry
            .run(&label, |attempt| async move {
                debug!(table, attempt, "running {}", LOAD_PROGRAM);
                let output = client.load(path).await?;
                if output.success() {
                    Ok::<(), DbToolError>(())
                } else {
                    Err(output.into_command_error(LOAD_PROGRAM))
                }
            })
            .await;

        match result {
            Ok(()) => Outcome::succeeded(table, path.display().to_string()),
            Err(err) => Outcome::failed(table, err.to_string()),
        }
    }
}
