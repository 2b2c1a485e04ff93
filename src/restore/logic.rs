// tablevault/src/restore/logic.rs
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::db_restore::LoadRunner;
use crate::errors::DbToolError;
use crate::orchestrator::task::DUMP_EXTENSION;
use crate::orchestrator::{Report, Task, TaskOrchestrator};

/// Table names of every `*.sql` file directly inside `dir`, sorted.
pub fn discover_dump_files(dir: &Path) -> crate::errors::Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| DbToolError::Enumeration {
        what: format!("dump files in {}", dir.display()),
        reason: e.to_string(),
    })?;

    let mut tables = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(DUMP_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            tables.push(stem.to_string());
        }
    }
    tables.sort();
    Ok(tables)
}

/// Backup set directories under `backup_dir`, oldest first.
pub fn list_backup_sets(backup_dir: &Path) -> crate::errors::Result<Vec<String>> {
    list_entries(backup_dir, |path| path.is_dir())
}

/// Archives with the given extension under `backup_dir`, oldest first.
pub fn list_archives(backup_dir: &Path, extension: &str) -> crate::errors::Result<Vec<String>> {
    let suffix = format!(".{}", extension);
    list_entries(backup_dir, |path| {
        path.is_file()
            && path
                .file_name()
                .map(|n| n.to_string_lossy().ends_with(&suffix))
                .unwrap_or(false)
    })
}

fn list_entries(
    backup_dir: &Path,
    keep: impl Fn(&Path) -> bool,
) -> crate::errors::Result<Vec<String>> {
    let entries = fs::read_dir(backup_dir).map_err(|e| DbToolError::Enumeration {
        what: format!("backup sets in {}", backup_dir.display()),
        reason: e.to_string(),
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if keep(&entry.path()) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Reloads every dump file of one backup set.
pub struct RestoreSession {
    runner: Arc<LoadRunner>,
    orchestrator: TaskOrchestrator,
    write_report: bool,
}

impl RestoreSession {
    pub fn new(runner: Arc<LoadRunner>, orchestrator: TaskOrchestrator, write_report: bool) -> Self {
        Self {
            runner,
            orchestrator,
            write_report,
        }
    }

    /// An empty directory is a no-op and yields an empty report.
    pub async fn run(&self, restore_dir: &Path) -> Result<Report> {
        info!("Starting restore from {}", restore_dir.display());

        let tables = discover_dump_files(restore_dir)
            .context("Failed to list dump files for restore")?;
        if tables.is_empty() {
            info!(
                "No dump files found in '{}', nothing to restore.",
                restore_dir.display()
            );
            return Ok(Report::default());
        }
        info!("Restoring {} table(s) with {} worker(s)", tables.len(), self.orchestrator.pool_size());

        let tasks: Vec<Task> = tables
            .into_iter()
            .map(|table| Task::load(table, restore_dir))
            .collect();

        let runner = Arc::clone(&self.runner);
        let report = self
            .orchestrator
            .run(tasks, move |task| {
                let runner = Arc::clone(&runner);
                async move { runner.load(&task).await }
            })
            .await;

        report.log_summary("Restore");
        if self.write_report {
            report
                .write_json("restore", &report_path(restore_dir, "restore"))
                .context("Failed to write restore report")?;
        }
        Ok(report)
    }
}

/// `{parent}/{name}.{operation}-report.json`, beside the backup set.
pub fn report_path(set_dir: &Path, operation: &str) -> PathBuf {
    let name = set_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup".to_string());
    set_dir.with_file_name(format!("{}.{}-report.json", name, operation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::NoProgress;
    use crate::restore::db_restore::tests::FlakyLoadClient;
    use crate::utils::retry::RetryPolicy;
    use std::time::Duration;

    fn write_set(dir: &Path, tables: &[&str]) -> anyhow::Result<()> {
        fs::create_dir_all(dir)?;
        for table in tables {
            fs::write(dir.join(format!("{}.sql", table)), "SELECT 1;\n")?;
        }
        Ok(())
    }

    fn session(client: Arc<FlakyLoadClient>, write_report: bool) -> anyhow::Result<RestoreSession> {
        let runner = LoadRunner::new(client, RetryPolicy::bounded(3, Duration::from_millis(10)));
        Ok(RestoreSession::new(
            Arc::new(runner),
            TaskOrchestrator::new(2, Arc::new(NoProgress))?,
            write_report,
        ))
    }

    #[test]
    fn test_discover_only_sql_files() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        write_set(root.path(), &["users", "orders"])?;
        fs::write(root.path().join("notes.txt"), "x")?;
        fs::create_dir(root.path().join("nested.sql"))?;

        assert_eq!(discover_dump_files(root.path())?, vec!["orders", "users"]);
        Ok(())
    }

    #[test]
    fn test_discover_in_missing_directory_fails() {
        let err = discover_dump_files(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, DbToolError::Enumeration { .. }));
    }

    #[test]
    fn test_list_backup_sets_and_archives() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        fs::create_dir(root.path().join("20240502_080000"))?;
        fs::create_dir(root.path().join("20240501_080000"))?;
        fs::write(root.path().join("20240430_080000.7z"), "")?;
        fs::write(root.path().join("20240430_080000.backup-report.json"), "{}")?;

        assert_eq!(
            list_backup_sets(root.path())?,
            vec!["20240501_080000", "20240502_080000"]
        );
        assert_eq!(list_archives(root.path(), "7z")?, vec!["20240430_080000.7z"]);
        assert!(list_archives(root.path(), "tar.gz")?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_directory_is_a_noop() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let client = Arc::new(FlakyLoadClient::new(0));

        let report = session(client.clone(), false)?.run(root.path()).await?;

        assert_eq!(report.total(), 0);
        assert!(report.is_success());
        assert_eq!(client.call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_is_repeatable() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let set = root.path().join("20240501_120000");
        write_set(&set, &["users", "orders", "items"])?;
        let client = Arc::new(FlakyLoadClient::new(0));
        let session = session(client.clone(), false)?;

        let first = session.run(&set).await?;
        let second = session.run(&set).await?;

        assert!(first.failed().is_empty());
        assert!(second.failed().is_empty());
        assert_eq!(first.succeeded(), second.succeeded());
        assert_eq!(client.call_count(), 6);
        Ok(())
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_per_table() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let set = root.path().join("20240501_120000");
        write_set(&set, &["users", "orders"])?;
        let client = Arc::new(FlakyLoadClient::new(1));

        let report = session(client.clone(), true)?.run(&set).await?;

        assert_eq!(report.succeeded().len(), 2);
        assert_eq!(client.call_count(), 4);
        assert!(root.path().join("20240501_120000.restore-report.json").is_file());
        Ok(())
    }

    #[test]
    fn test_report_path_is_beside_the_set() {
        assert_eq!(
            report_path(Path::new("/b/20240501_120000"), "backup"),
            Path::new("/b/20240501_120000.backup-report.json")
        );
    }
}
