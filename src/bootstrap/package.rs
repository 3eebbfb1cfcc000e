//! Builds the deployment archive for the scheduler function.

use std::collections::BTreeSet;
use std::fs::File;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Errors raised while building the deployment archive.
#[derive(Debug, Error)]
pub enum PackageError {
    /// Raised when the source directory or a file in it cannot be read.
    #[error("cannot read function sources under '{path}': {message}")]
    Sources {
        /// Path that was being read.
        path: Utf8PathBuf,
        /// Human-readable description of the failure.
        message: String,
    },
    /// Raised when the source directory holds no files.
    #[error("no files to package under '{path}'")]
    Empty {
        /// Directory that was walked.
        path: Utf8PathBuf,
    },
    /// Raised when a source path is not valid UTF-8.
    #[error("source path is not valid UTF-8: {path}")]
    NonUtf8 {
        /// Lossy rendering of the offending path.
        path: String,
    },
    /// Raised when two source files would archive under the same name.
    ///
    /// Entries are stored flat, so base names must be unique.
    #[error("duplicate file name '{name}' in the function sources")]
    Duplicate {
        /// Base name that appeared twice.
        name: String,
    },
    /// Raised when writing the archive fails.
    #[error("cannot write archive '{path}': {message}")]
    Archive {
        /// Archive that was being written.
        path: Utf8PathBuf,
        /// Human-readable description of the failure.
        message: String,
    },
}

/// Summary of a built archive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageSummary {
    /// Where the archive was written.
    pub path: Utf8PathBuf,
    /// Number of files archived.
    pub files: usize,
}

/// Packages every file under `source_dir` into a deflated zip at
/// `archive_path`, overwriting any existing archive.
///
/// Entries are stored flat under their base names, as the deployed handler
/// expects, so nested source layouts collapse into a single level.
///
/// # Errors
///
/// Returns [`PackageError::Sources`] when the directory cannot be read,
/// [`PackageError::Empty`] when it holds no files,
/// [`PackageError::Duplicate`] when two files share a base name, and
/// [`PackageError::Archive`] when writing the zip fails.
pub fn package_sources(
    source_dir: &Utf8Path,
    archive_path: &Utf8Path,
) -> Result<PackageSummary, PackageError> {
    let entries = collect_entries(source_dir)?;

    let archive_error = |err: &dyn std::fmt::Display| PackageError::Archive {
        path: archive_path.to_owned(),
        message: err.to_string(),
    };
    let file = File::create(archive_path.as_std_path()).map_err(|err| archive_error(&err))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (path, name) in &entries {
        debug!(file = %path, entry = %name, "archiving");
        zip.start_file(name.as_str(), options)
            .map_err(|err| archive_error(&err))?;
        let mut source = File::open(path.as_std_path()).map_err(|err| PackageError::Sources {
            path: path.clone(),
            message: err.to_string(),
        })?;
        io::copy(&mut source, &mut zip).map_err(|err| archive_error(&err))?;
    }
    zip.finish().map_err(|err| archive_error(&err))?;

    info!(archive = %archive_path, files = entries.len(), "packaged function sources");
    Ok(PackageSummary {
        path: archive_path.to_owned(),
        files: entries.len(),
    })
}

/// Walks the source directory and returns `(path, entry name)` pairs in a
/// stable order, rejecting empty directories and clashing base names.
fn collect_entries(source_dir: &Utf8Path) -> Result<Vec<(Utf8PathBuf, String)>, PackageError> {
    let mut seen = BTreeSet::new();
    let mut entries = Vec::new();
    for entry in WalkDir::new(source_dir.as_std_path()).sort_by_file_name() {
        let entry = entry.map_err(|err| PackageError::Sources {
            path: source_dir.to_owned(),
            message: err.to_string(),
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let path = Utf8Path::from_path(entry.path())
            .ok_or_else(|| PackageError::NonUtf8 {
                path: entry.path().display().to_string(),
            })?
            .to_owned();
        let name = path
            .file_name()
            .ok_or_else(|| PackageError::NonUtf8 {
                path: path.to_string(),
            })?
            .to_owned();
        if !seen.insert(name.clone()) {
            return Err(PackageError::Duplicate { name });
        }
        entries.push((path, name));
    }
    if entries.is_empty() {
        return Err(PackageError::Empty {
            path: source_dir.to_owned(),
        });
    }
    Ok(entries)
}
