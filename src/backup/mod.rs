pub(crate) mod archive;
pub(crate) mod db_dump;
pub(crate) mod logic;

use anyhow::{Context, Result};
use indicatif::MultiProgress;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::orchestrator::{ProgressBarObserver, Report, TaskOrchestrator};
use crate::utils::database::{Database, MySqlDatabase};
use archive::ArchiveAdapter;
use db_dump::{DumpRunner, MysqlDumpClient};
use logic::BackupSession;

fn build_session(app_config: &AppConfig, progress: &MultiProgress) -> Result<BackupSession> {
    let session = &app_config.session;
    let database: Arc<dyn Database> = Arc::new(MySqlDatabase::new(session.connection.clone()));
    let client = MysqlDumpClient::new(session).context("Dump client is not available")?;
    let runner = DumpRunner::new(
        Arc::clone(&database),
        Arc::new(client),
        app_config.connection_retry,
    );
    let orchestrator = TaskOrchestrator::new(
        session.max_workers,
        Arc::new(ProgressBarObserver::new(progress, "backup")),
    )?;

    Ok(BackupSession::new(
        session.backup_dir.clone(),
        database,
        Arc::new(runner),
        orchestrator,
        app_config.write_report,
    ))
}

pub(crate) fn archive_adapter(app_config: &AppConfig) -> Result<ArchiveAdapter> {
    ArchiveAdapter::from_settings(&app_config.archive, app_config.session.client_dir.as_deref())
        .context("Archiver is not available")
}

/// Public entry point for the backup process.
pub async fn run_backup_flow(app_config: &AppConfig, progress: &MultiProgress) -> Result<Report> {
    let run = build_session(app_config, progress)?.run().await?;
    println!("📂 Backup set: {}", run.directory.display());
    Ok(run.report)
}

/// Backup followed by compression of the new backup set.
pub async fn run_backup_and_compress_flow(
    app_config: &AppConfig,
    progress: &MultiProgress,
) -> Result<Report> {
    // Resolve the archiver first so a missing executable fails before any dump.
    let adapter = archive_adapter(app_config)?;
    let (archive, report) = build_session(app_config, progress)?.run_and_compress(&adapter).await?;
    println!("📦 Backup archive: {}", archive.display());
    Ok(report)
}

/// Compresses an existing backup set and removes the directory.
pub async fn compress_backup_set(app_config: &AppConfig, set_dir: &Path) -> Result<PathBuf> {
    let archive = archive_adapter(app_config)?
        .compress(set_dir)
        .await
        .with_context(|| format!("Failed to compress {}", set_dir.display()))?;
    Ok(archive)
}
