//! File utilities for safe and robust file operations.
//!
//! Reading tolerates non-UTF-8 input, discovery is deterministic (sorted by
//! file name), and every artifact the pipeline produces is written through
//! [`atomic_write`] so a concurrent reader never observes a partial file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::errors::{Result, SpecLensError};

/// Safe file reading with UTF-8 validation and fallback handling
pub struct FileReader;

impl FileReader {
    /// Read a file to string, handling non-UTF-8 files gracefully
    pub fn read_to_string(file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                let bytes = fs::read(file_path).map_err(|err| {
                    SpecLensError::io(
                        format!("Failed to read file as bytes: {}", file_path.display()),
                        err,
                    )
                })?;
                warn!(
                    "File contained invalid UTF-8, converted with lossy encoding: {}",
                    file_path.display()
                );
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Err(e) => Err(SpecLensError::io(
                format!("Failed to read file: {}", file_path.display()),
                e,
            )),
        }
    }

    /// True if the path has one of `extensions` (compared without the dot,
    /// case-insensitively)
    pub fn has_extension(file_path: &Path, extensions: &[String]) -> bool {
        file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

/// Regular files directly inside `dir` with a configured extension, sorted by
/// file name.
pub fn discover_sources(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SpecLensError::io(
            format!("Not a directory: {}", dir.display()),
            std::io::Error::new(std::io::ErrorKind::NotFound, "directory not found"),
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let message = format!("Failed to list {}", dir.display());
            match e.into_io_error() {
                Some(io) => SpecLensError::io(message, io),
                None => SpecLensError::internal(message),
            }
        })?;
        if entry.file_type().is_file() && FileReader::has_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!(dir = %dir.display(), files = files.len(), "discovered source files");
    Ok(files)
}

/// Write-new-then-rename. The temporary file lives in the target directory so
/// the rename never crosses filesystems.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| {
        SpecLensError::io(format!("Failed to create directory: {}", dir.display()), e)
    })?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
        SpecLensError::io(format!("Failed to create temp file in {}", dir.display()), e)
    })?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| SpecLensError::io(format!("Failed to write {}", path.display()), e))?;
    tmp.persist(path).map_err(|e| {
        SpecLensError::io(format!("Failed to replace {}", path.display()), e.error)
    })?;
    Ok(())
}

/// Append one line to a log file, creating it (and its directory) if needed.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            SpecLensError::io(format!("Failed to create directory: {}", parent.display()), e)
        })?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SpecLensError::io(format!("Failed to open {}", path.display()), e))?;
    writeln!(file, "{line}")
        .map_err(|e| SpecLensError::io(format!("Failed to append to {}", path.display()), e))
}
