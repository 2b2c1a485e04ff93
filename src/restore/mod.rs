pub(crate) mod db_restore;
pub(crate) mod logic;

use anyhow::{Context, Result};
use indicatif::MultiProgress;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backup::archive_adapter;
use crate::config::AppConfig;
use crate::orchestrator::{ProgressBarObserver, Report, TaskOrchestrator};
use db_restore::{LoadRunner, MysqlLoadClient};
use logic::RestoreSession;

pub use logic::{list_archives, list_backup_sets};

fn build_session(app_config: &AppConfig, progress: &MultiProgress) -> Result<RestoreSession> {
    let client = MysqlLoadClient::new(&app_config.session).context("Restore client is not available")?;
    let runner = LoadRunner::new(Arc::new(client), app_config.restore_retry);
    let orchestrator = TaskOrchestrator::new(
        app_config.session.max_workers,
        Arc::new(ProgressBarObserver::new(progress, "restore")),
    )?;
    Ok(RestoreSession::new(
        Arc::new(runner),
        orchestrator,
        app_config.write_report,
    ))
}

/// Public entry point for the restore process.
pub async fn run_restore_flow(
    app_config: &AppConfig,
    restore_dir: &Path,
    progress: &MultiProgress,
) -> Result<Report> {
    build_session(app_config, progress)?
        .run(restore_dir)
        .await
        .with_context(|| format!("Restore from {} failed", restore_dir.display()))
}

/// Extracts `archive` next to itself, then restores the extracted set.
pub async fn run_restore_decompress_flow(
    app_config: &AppConfig,
    archive: &Path,
    progress: &MultiProgress,
) -> Result<Report> {
    let session = build_session(app_config, progress)?;
    let restore_dir = decompress_archive(app_config, archive).await?;
    session
        .run(&restore_dir)
        .await
        .with_context(|| format!("Restore from {} failed", restore_dir.display()))
}

pub async fn decompress_archive(app_config: &AppConfig, archive: &Path) -> Result<PathBuf> {
    let dir = archive_adapter(app_config)?
        .decompress(archive)
        .await
        .with_context(|| format!("Failed to decompress {}", archive.display()))?;
    Ok(dir)
}
