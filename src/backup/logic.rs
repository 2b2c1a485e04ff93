// tablevault/src/backup/logic.rs
use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::archive::ArchiveAdapter;
use super::db_dump::DumpRunner;
use crate::orchestrator::{Report, Task, TaskOrchestrator};
use crate::restore::logic::report_path;
use crate::utils::database::Database;

const DIR_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Result of a finished backup session.
#[derive(Debug)]
pub struct BackupRun {
    pub directory: PathBuf,
    pub report: Report,
}

/// Creates `{backup_root}/{timestamp}` for a new backup set.
pub fn create_backup_dir(backup_root: &Path) -> Result<PathBuf> {
    let timestamp = Local::now().format(DIR_TIMESTAMP_FORMAT).to_string();
    let backup_path = backup_root.join(timestamp);

    fs::create_dir_all(&backup_path).with_context(|| {
        format!(
            "Failed to create backup directory: {}",
            backup_path.display()
        )
    })?;

    info!("📂 Backup directory created at: {}", backup_path.display());
    Ok(backup_path)
}

/// Dumps every table of the configured database into a fresh backup set.
pub struct BackupSession {
    backup_root: PathBuf,
    database: Arc<dyn Database>,
    runner: Arc<DumpRunner>,
    orchestrator: TaskOrchestrator,
    write_report: bool,
}

impl BackupSession {
    pub fn new(
        backup_root: PathBuf,
        database: Arc<dyn Database>,
        runner: Arc<DumpRunner>,
        orchestrator: TaskOrchestrator,
        write_report: bool,
    ) -> Self {
        Self {
            backup_root,
            database,
            runner,
            orchestrator,
            write_report,
        }
    }

    /// Failing to list the tables aborts the session before any directory is
    /// created. Per-table failures only show up in the report.
    pub async fn run(&self) -> Result<BackupRun> {
        info!("Starting backup");
        let tables = self
            .database
            .list_tables()
            .await
            .context("Failed to list tables for backup")?;
        info!("Found {} table(s) to back up", tables.len());

        let directory = create_backup_dir(&self.backup_root)?;
        if tables.is_empty() {
            warn!("Database has no tables, the backup set will be empty");
        }

        let tasks: Vec<Task> = tables
            .iter()
            .map(|table| Task::dump(table.as_str(), &directory))
            .collect();

        info!(
            "Dumping {} table(s) with {} worker(s)",
            tasks.len(),
            self.orchestrator.pool_size()
        );
        let runner = Arc::clone(&self.runner);
        let report = self
            .orchestrator
            .run(tasks, move |task| {
                let runner = Arc::clone(&runner);
                async move { runner.dump(&task).await }
            })
            .await;

        report.log_summary("Backup");
        if self.write_report {
            report
                .write_json("backup", &report_path(&directory, "backup"))
                .context("Failed to write backup report")?;
        }

        Ok(BackupRun { directory, report })
    }

    /// Runs the backup, then archives the set even if some tables failed.
    /// Returns the archive path alongside the report.
    pub async fn run_and_compress(&self, archiver: &ArchiveAdapter) -> Result<(PathBuf, Report)> {
        let BackupRun { directory, report } = self.run().await?;
        if !report.is_success() {
            warn!(
                "Compressing backup set with {} failed table(s)",
                report.failed().len()
            );
        }
        let archive = archiver
            .compress(&directory)
            .await
            .with_context(|| format!("Failed to compress {}", directory.display()))?;
        Ok((archive, report))
    }
}
