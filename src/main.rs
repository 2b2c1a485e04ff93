//! Table-by-table MySQL backup and restore tool
//!
//! Provides CLI interface for backup, restore and archive operations

// tablevault/src/main.rs
mod backup;
mod config;
mod errors;
mod orchestrator;
mod restore;
mod utils;

use anyhow::{Context, Result};
use config::AppConfig;
use indicatif::MultiProgress;
use orchestrator::{ProgressLogWriter, Report};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "config.json";

/// Operations offered by the menu, in menu order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Backup,
    Restore,
    BackupCompress,
    RestoreDecompress,
    Compress,
    Decompress,
}

impl Operation {
    fn parse(choice: &str) -> Option<Self> {
        match choice.trim().to_ascii_lowercase().as_str() {
            "1" | "backup" => Some(Operation::Backup),
            "2" | "restore" => Some(Operation::Restore),
            "3" | "backup-compress" => Some(Operation::BackupCompress),
            "4" | "restore-decompress" => Some(Operation::RestoreDecompress),
            "5" | "compress" => Some(Operation::Compress),
            "6" | "decompress" => Some(Operation::Decompress),
            _ => None,
        }
    }
}

enum RunStatus {
    Completed,
    TablesFailed(usize),
    Nothing,
}

impl From<Report> for RunStatus {
    fn from(report: Report) -> Self {
        if report.is_success() {
            RunStatus::Completed
        } else {
            RunStatus::TablesFailed(report.failed().len())
        }
    }
}

/// Main entry point for the backup/restore tool
#[tokio::main]
async fn main() -> ExitCode {
    // Bars and logs share stderr; log lines suspend the bars while printing.
    let progress = MultiProgress::new();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(ProgressLogWriter::new(progress.clone(), std::io::stderr))
        .init();

    match run_app(&progress).await {
        Ok(RunStatus::Completed) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Ok(RunStatus::Nothing) => ExitCode::SUCCESS,
        Ok(RunStatus::TablesFailed(count)) => {
            eprintln!("❌ Operation finished with {} failed table(s).", count);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(progress: &MultiProgress) -> Result<RunStatus> {
    dotenv::dotenv().ok();

    let config_path = PathBuf::from(CONFIG_FILE);
    let app_config = AppConfig::load_from_json(&config_path).with_context(|| {
        format!(
            "Failed to load application configuration from {}",
            config_path.display()
        )
    })?;

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };

    let Some(operation) = Operation::parse(&choice) else {
        println!(
            "❌ Invalid choice {:?}. Please enter a number from 1 to 6 or one of: \
             backup, restore, backup-compress, restore-decompress, compress, decompress.",
            choice
        );
        return Ok(RunStatus::Nothing);
    };

    let backup_dir = app_config.session.backup_dir.clone();
    let archive_ext = app_config.archive.format.extension();

    match operation {
        Operation::Backup => {
            println!("🚀 Starting Backup Process...");
            let report = backup::run_backup_flow(&app_config, progress)
                .await
                .context("Backup process failed")?;
            Ok(report.into())
        }
        Operation::Restore => {
            let Some(set_dir) = select_backup_set(&backup_dir)? else {
                return Ok(RunStatus::Nothing);
            };
            println!("🔄 Starting Restore Process from {}...", set_dir.display());
            let report = restore::run_restore_flow(&app_config, &set_dir, progress)
                .await
                .context("Restore process failed")?;
            Ok(report.into())
        }
        Operation::BackupCompress => {
            println!("🚀 Starting Backup Process with compression...");
            let report = backup::run_backup_and_compress_flow(&app_config, progress)
                .await
                .context("Backup process failed")?;
            Ok(report.into())
        }
        Operation::RestoreDecompress => {
            let Some(archive) = select_archive(&backup_dir, archive_ext)? else {
                return Ok(RunStatus::Nothing);
            };
            println!("🔄 Starting Restore Process from {}...", archive.display());
            let report = restore::run_restore_decompress_flow(&app_config, &archive, progress)
                .await
                .context("Restore process failed")?;
            Ok(report.into())
        }
        Operation::Compress => {
            let Some(set_dir) = select_backup_set(&backup_dir)? else {
                return Ok(RunStatus::Nothing);
            };
            let archive = backup::compress_backup_set(&app_config, &set_dir).await?;
            println!("📦 Backup archive: {}", archive.display());
            Ok(RunStatus::Completed)
        }
        Operation::Decompress => {
            let Some(archive) = select_archive(&backup_dir, archive_ext)? else {
                return Ok(RunStatus::Nothing);
            };
            let dir = restore::decompress_archive(&app_config, &archive).await?;
            println!("📂 Extracted to: {}", dir.display());
            Ok(RunStatus::Completed)
        }
    }
}

/// Prompts user to select an operation
///
/// Returns the user's choice as String
fn prompt_choice() -> Result<String> {
    println!("Select an operation:");
    println!("1. Take Backup (or type 'backup')");
    println!("2. Restore Backup (or type 'restore')");
    println!("3. Take Backup and compress it (or type 'backup-compress')");
    println!("4. Decompress and restore a Backup (or type 'restore-decompress')");
    println!("5. Compress a Backup (or type 'compress')");
    println!("6. Decompress a Backup (or type 'decompress')");
    read_line("Enter your choice: ")
}

fn read_line(prompt: &str) -> Result<String> {
    use std::io::{Write, stdin, stdout};

    print!("{}", prompt);
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin()
        .read_line(&mut input)
        .context("Failed to read user input")?;
    Ok(input.trim().to_string())
}

fn select_backup_set(backup_dir: &Path) -> Result<Option<PathBuf>> {
    let sets = restore::list_backup_sets(backup_dir).context("Failed to list backup sets")?;
    Ok(prompt_select("backup set", &sets)?.map(|name| backup_dir.join(name)))
}

fn select_archive(backup_dir: &Path, extension: &str) -> Result<Option<PathBuf>> {
    let archives =
        restore::list_archives(backup_dir, extension).context("Failed to list backup archives")?;
    Ok(prompt_select("archive", &archives)?.map(|name| backup_dir.join(name)))
}

/// Numbered menu over `candidates`. `None` when there is nothing to pick or
/// the answer matches no candidate.
fn prompt_select(label: &str, candidates: &[String]) -> Result<Option<String>> {
    if candidates.is_empty() {
        println!("❌ No {} found.", label);
        return Ok(None);
    }

    println!("Select a {}:", label);
    for (i, candidate) in candidates.iter().enumerate() {
        println!("{}. {}", i + 1, candidate);
    }
    let input = read_line("Enter your choice: ")?;

    let selected = resolve_selection(&input, candidates);
    if selected.is_none() {
        println!("❌ Invalid {} selection: {:?}", label, input);
    }
    Ok(selected)
}

/// Accepts a 1-based index or an exact name.
fn resolve_selection(input: &str, candidates: &[String]) -> Option<String> {
    let input = input.trim();
    if let Ok(index) = input.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| candidates.get(i))
            .cloned();
    }
    candidates.iter().find(|c| c.as_str() == input).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_choices() {
        assert_eq!(Operation::parse("1"), Some(Operation::Backup));
        assert_eq!(Operation::parse(" restore "), Some(Operation::Restore));
        assert_eq!(Operation::parse("BACKUP-COMPRESS"), Some(Operation::BackupCompress));
        assert_eq!(Operation::parse("4"), Some(Operation::RestoreDecompress));
        assert_eq!(Operation::parse("compress"), Some(Operation::Compress));
        assert_eq!(Operation::parse("6"), Some(Operation::Decompress));
        assert_eq!(Operation::parse(""), None);
        assert_eq!(Operation::parse("7"), None);
        assert_eq!(Operation::parse("sync"), None);
    }

    #[test]
    fn test_resolve_selection() {
        let candidates = vec!["20240501_080000".to_string(), "20240502_080000".to_string()];

        assert_eq!(resolve_selection("2", &candidates).as_deref(), Some("20240502_080000"));
        assert_eq!(
            resolve_selection("20240501_080000", &candidates).as_deref(),
            Some("20240501_080000")
        );
        assert_eq!(resolve_selection("0", &candidates), None);
        assert_eq!(resolve_selection("3", &candidates), None);
        assert_eq!(resolve_selection("latest", &candidates), None);
    }

    #[test]
    fn test_failed_tables_set_failure_status() {
        use orchestrator::{Outcome, ReportBuilder};
        use std::time::Duration;

        assert!(matches!(RunStatus::from(Report::default()), RunStatus::Completed));

        let mut builder = ReportBuilder::default();
        builder.record(Outcome::succeeded("users", "users.sql"));
        builder.record(Outcome::failed("orders", "Access denied"));
        let status = RunStatus::from(builder.seal(Duration::from_secs(1)));
        assert!(matches!(status, RunStatus::TablesFailed(1)));
    }
}
