//! Database package extraction and result archive packaging.

use super::results::BqrsFilePaths;
use super::sarif::SARIF_FILE_NAME;
use crate::error::AnalysisError;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Metadata file marking the root of an unpacked database.
pub const DATABASE_METADATA_FILE: &str = "codeql-database.yml";

/// Unpack a database package into `dest` and return the database root.
///
/// The root is `dest` itself or the one directory below it that holds the
/// metadata file. Stops between entries once `cancel` fires.
pub fn unzip_database(
    package: &Path,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<PathBuf, AnalysisError> {
    let extraction = |e: &dyn std::fmt::Display| {
        AnalysisError::Extraction(format!("{}: {}", package.display(), e))
    };

    let file = File::open(package).map_err(|e| extraction(&e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| extraction(&e))?;
    fs::create_dir_all(dest).map_err(|e| extraction(&e))?;

    for i in 0..archive.len() {
        if cancel.is_cancelled() {
            debug!("Unpacking {} cancelled after {} entries", package.display(), i);
            return Err(AnalysisError::Cancelled);
        }
        let mut entry = archive.by_index(i).map_err(|e| extraction(&e))?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| extraction(&format!("unsafe entry path '{}'", entry.name())))?;
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| extraction(&e))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| extraction(&e))?;
        }
        let mut out = File::create(&target).map_err(|e| extraction(&e))?;
        io::copy(&mut entry, &mut out).map_err(|e| extraction(&e))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))
                .map_err(|e| extraction(&e))?;
        }
    }

    debug!("Extracted {} entries from {}", archive.len(), package.display());
    find_database_root(dest)
}

/// Locate the directory holding the database metadata file.
fn find_database_root(dest: &Path) -> Result<PathBuf, AnalysisError> {
    let mut roots: Vec<PathBuf> = WalkDir::new(dest)
        .min_depth(1)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == DATABASE_METADATA_FILE)
        .filter_map(|e| e.path().parent().map(Path::to_path_buf))
        .collect();
    roots.sort();

    match roots.as_slice() {
        [root] => Ok(root.clone()),
        [] => Err(AnalysisError::Metadata(format!(
            "no {} found in database package",
            DATABASE_METADATA_FILE
        ))),
        _ => Err(AnalysisError::Extraction(format!(
            "database package holds {} databases, expected one",
            roots.len()
        ))),
    }
}

/// Archive entry name for a relative path, always `/`-separated.
fn entry_name(relative: &Path) -> Result<String, AnalysisError> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            _ => {
                return Err(AnalysisError::Packaging(format!(
                    "refusing non-relative archive path {}",
                    relative.display()
                )))
            }
        }
    }
    Ok(parts.join("/"))
}

fn add_file(
    writer: &mut ZipWriter<File>,
    source: &Path,
    name: &str,
) -> Result<(), AnalysisError> {
    let packaging = |e: &dyn std::fmt::Display| {
        AnalysisError::Packaging(format!("add {} as {}: {}", source.display(), name, e))
    };

    let mut input = File::open(source).map_err(|e| packaging(&e))?;
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file(name, options).map_err(|e| packaging(&e))?;
    io::copy(&mut input, writer).map_err(|e| packaging(&e))?;
    Ok(())
}

/// Write the result archive: the SARIF document (if any) under its fixed
/// name, then every relational file at its layout path.
pub fn write_results_archive(
    dest: &Path,
    sarif: Option<&Path>,
    bqrs: &BqrsFilePaths,
    cancel: &CancellationToken,
) -> Result<(), AnalysisError> {
    let file = File::create(dest)
        .map_err(|e| AnalysisError::Packaging(format!("create {}: {}", dest.display(), e)))?;
    let mut writer = ZipWriter::new(file);

    if let Some(sarif_path) = sarif {
        add_file(&mut writer, sarif_path, SARIF_FILE_NAME)?;
    }

    for (source, relative) in bqrs.entries() {
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        let name = entry_name(relative)?;
        add_file(&mut writer, &source, &name)?;
    }

    writer
        .finish()
        .map_err(|e| AnalysisError::Packaging(format!("finish {}: {}", dest.display(), e)))?;
    Ok(())
}
