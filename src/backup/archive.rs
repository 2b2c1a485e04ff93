// tablevault/src/backup/archive.rs
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tar::Builder;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{ArchiveFormat, ArchiveSettings};
use crate::errors::{DbToolError, Result};
use crate::utils::find_executable;
use crate::utils::process::ProcessOutput;

/// External archiver capability.
///
/// Archives hold the *contents* of the source directory, so extracting into
/// a fresh directory reproduces the backup set one level deep.
#[async_trait]
pub trait Archiver: Send + Sync {
    /// File extension of produced archives, without the leading dot.
    fn extension(&self) -> &str;

    async fn archive(&self, dest: &Path, source: &Path, delete_source: bool) -> Result<()>;

    async fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<()>;
}

/// The 7-Zip command line (`7za`).
pub struct SevenZipArchiver {
    executable: PathBuf,
}

impl SevenZipArchiver {
    pub fn new(executable: PathBuf) -> Self {
        Self { executable }
    }

    async fn run(&self, cmd: &mut Command) -> Result<()> {
        let output = ProcessOutput::from(cmd.output().await?);
        if !output.success() {
            return Err(output.into_command_error(&self.executable.display().to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Archiver for SevenZipArchiver {
    fn extension(&self) -> &str {
        "7z"
    }

    async fn archive(&self, dest: &Path, source: &Path, delete_source: bool) -> Result<()> {
        // Run inside the source so entries are stored relative to it.
        let dest = std::path::absolute(dest)?;
        let mut cmd = Command::new(&self.executable);
        cmd.current_dir(source)
            .arg("a")
            .arg("-t7z")
            .arg("-y")
            .arg(&dest)
            .arg("*");
        if delete_source {
            cmd.arg("-sdel");
        }
        self.run(&mut cmd).await
    }

    async fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("x")
            .arg("-y")
            .arg(archive)
            .arg(format!("-o{}", dest_dir.display()));
        self.run(&mut cmd).await
    }
}

/// In-process gzipped tar archives.
pub struct TarGzArchiver;

#[async_trait]
impl Archiver for TarGzArchiver {
    fn extension(&self) -> &str {
        "tar.gz"
    }

    async fn archive(&self, dest: &Path, source: &Path, delete_source: bool) -> Result<()> {
        let (dest, source) = (dest.to_path_buf(), source.to_path_buf());
        tokio::task::spawn_blocking(move || -> Result<()> {
            create_tar_gz_archive(&source, &dest)?;
            if delete_source {
                fs::remove_dir_all(&source)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| DbToolError::Archive(e.to_string()))?
    }

    async fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<()> {
        let (archive, dest_dir) = (archive.to_path_buf(), dest_dir.to_path_buf());
        tokio::task::spawn_blocking(move || extract_tar_gz_archive(&archive, &dest_dir))
            .await
            .map_err(|e| DbToolError::Archive(e.to_string()))?
    }
}

/// Creates a gzipped tar archive of everything inside `source_dir`.
///
/// The paths inside the archive are relative to `source_dir`.
fn create_tar_gz_archive(source_dir: &Path, archive_dest_path: &Path) -> Result<()> {
    let archive_file = File::create(archive_dest_path)?;
    let enc = GzEncoder::new(archive_file, Compression::default());
    let mut tar_builder = Builder::new(enc);

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            DbToolError::Archive(format!("Failed to walk {}: {}", source_dir.display(), e))
        })?;
        let path = entry.path();
        let name = path.strip_prefix(source_dir).map_err(|e| {
            DbToolError::Archive(format!("Failed to strip prefix from {}: {}", path.display(), e))
        })?;

        if name.as_os_str().is_empty() {
            continue;
        }

        if entry.file_type().is_dir() {
            tar_builder.append_dir(name, path)?;
        } else if entry.file_type().is_file() {
            tar_builder.append_path_with_name(path, name)?;
        }
    }

    tar_builder.into_inner()?.finish()?;
    Ok(())
}

fn extract_tar_gz_archive(archive_path: &Path, extract_to_dir: &Path) -> Result<()> {
    let archive_file = File::open(archive_path)?;
    let gz_decoder = flate2::read::GzDecoder::new(archive_file);
    let mut archive = tar::Archive::new(gz_decoder);
    archive.unpack(extract_to_dir)?;
    Ok(())
}

/// Turns a finished backup directory into one archive, and back.
pub struct ArchiveAdapter {
    archiver: Arc<dyn Archiver>,
}

impl ArchiveAdapter {
    pub fn new(archiver: Arc<dyn Archiver>) -> Self {
        Self { archiver }
    }

    /// Builds the adapter for the configured archive format.
    pub fn from_settings(settings: &ArchiveSettings, client_dir: Option<&Path>) -> Result<Self> {
        let archiver: Arc<dyn Archiver> = match settings.format {
            ArchiveFormat::SevenZip => Arc::new(SevenZipArchiver::new(find_executable(
                &settings.executable,
                client_dir,
            )?)),
            ArchiveFormat::TarGz => Arc::new(TarGzArchiver),
        };
        Ok(Self::new(archiver))
    }

    pub fn extension(&self) -> &str {
        self.archiver.extension()
    }

    /// `{parent}/{name}.{ext}` for a source directory `{parent}/{name}`.
    pub fn archive_path_for(&self, source: &Path) -> Result<PathBuf> {
        let name = source
            .file_name()
            .ok_or_else(|| DbToolError::Archive(format!("Invalid source path: {}", source.display())))?;
        let file_name = format!("{}.{}", name.to_string_lossy(), self.extension());
        Ok(source.with_file_name(file_name))
    }

    /// Sibling directory named after the archive with its extension stripped.
    pub fn directory_for(&self, archive: &Path) -> Result<PathBuf> {
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DbToolError::Archive(format!("Invalid archive path: {}", archive.display())))?;
        let suffix = format!(".{}", self.extension());
        let stem = match file_name.strip_suffix(&suffix) {
            Some(stem) => stem.to_string(),
            None => archive
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        if stem.is_empty() {
            return Err(DbToolError::Archive(format!(
                "Cannot derive a directory name from {}",
                archive.display()
            )));
        }
        Ok(archive.with_file_name(stem))
    }

    /// Archives `source` and removes it. Returns the archive path.
    pub async fn compress(&self, source: &Path) -> Result<PathBuf> {
        if !source.is_dir() {
            return Err(DbToolError::Archive(format!(
                "Source for archival is not a directory: {}",
                source.display()
            )));
        }
        let dest = self.archive_path_for(source)?;
        if dest.exists() {
            return Err(DbToolError::Archive(format!(
                "Archive already exists: {}",
                dest.display()
            )));
        }

        info!("Compressing {} to {}, then deleting the source", source.display(), dest.display());
        let started = Instant::now();
        self.archiver.archive(&dest, source, true).await?;

        // Some archivers delete the files but leave the directory behind.
        if source.exists() {
            debug!("Removing leftover source directory {}", source.display());
            tokio::fs::remove_dir_all(source).await?;
        }
        info!(
            "✓ Compressed and deleted in {:.2}s: {}",
            started.elapsed().as_secs_f64(),
            dest.display()
        );
        Ok(dest)
    }

    /// Extracts `archive` next to itself. Returns the extracted directory.
    pub async fn decompress(&self, archive: &Path) -> Result<PathBuf> {
        if !archive.is_file() {
            return Err(DbToolError::Archive(format!(
                "Archive for extraction is not a file: {}",
                archive.display()
            )));
        }
        let dest_dir = self.directory_for(archive)?;
        if dest_dir.exists() && !dest_dir.is_dir() {
            return Err(DbToolError::Archive(format!(
                "Extraction path exists but is not a directory: {}",
                dest_dir.display()
            )));
        }
        tokio::fs::create_dir_all(&dest_dir).await?;

        info!("Extracting {} to {}", archive.display(), dest_dir.display());
        let started = Instant::now();
        self.archiver.extract(archive, &dest_dir).await?;
        info!(
            "✓ Extracted in {:.2}s: {}",
            started.elapsed().as_secs_f64(),
            dest_dir.display()
        );
        Ok(dest_dir)
    }
}
