//! Zip archive capability.
//!
//! [`ArchiveCodec`] is the seam between the pipeline and the compression
//! library: one operation to unpack a downloaded archive into a scratch
//! directory, one to serialise a finished directory tree. [`ZipCodec`] is the
//! production implementation.

use crate::error::{BundleError, Result};
use log::trace;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Trait for unpacking and packing archives, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveCodec {
    /// Extract every entry of `archive` into `dest_dir`.
    ///
    /// Returns the relative paths of the extracted files.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::InvalidArchive`] if the archive is corrupt or
    /// an entry would escape `dest_dir`, or [`BundleError::Io`] on I/O
    /// failures.
    fn extract_all(&self, archive: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>>;

    /// Write every file below `src_dir` into a new archive at `dest`.
    ///
    /// Entry names are relative to `src_dir` itself. Returns the number of
    /// files written.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Io`] if the tree cannot be read or the archive
    /// cannot be written.
    fn pack_directory(&self, src_dir: &Path, dest: &Path) -> Result<usize>;
}

/// Zip implementation of [`ArchiveCodec`].
///
/// Packing is deterministic: files are visited in name order and every entry
/// carries the same timestamp and permissions, so identical trees produce
/// byte-identical archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipCodec;

impl ArchiveCodec for ZipCodec {
    fn extract_all(&self, archive: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
        let file = File::open(archive)
            .map_err(|e| BundleError::io(format!("failed to open {}", archive.display()), e))?;
        let mut zip = ZipArchive::new(file).map_err(|e| invalid_archive(archive, &e))?;
        let mut extracted = Vec::new();

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).map_err(|e| invalid_archive(archive, &e))?;
            let Some(relative) = entry.enclosed_name().filter(|p| is_contained(p)) else {
                return Err(BundleError::InvalidArchive {
                    path: archive.to_path_buf(),
                    reason: format!("entry {:?} escapes the extraction directory", entry.name()),
                });
            };
            let dest_path = dest_dir.join(&relative);

            if entry.is_dir() {
                create_dir(&dest_path)?;
                continue;
            }
            if let Some(parent) = dest_path.parent() {
                create_dir(parent)?;
            }
            let mut out = File::create(&dest_path).map_err(|e| {
                BundleError::io(format!("failed to create {}", dest_path.display()), e)
            })?;
            io::copy(&mut entry, &mut out).map_err(|e| BundleError::InvalidArchive {
                path: archive.to_path_buf(),
                reason: format!("failed to inflate {}: {e}", relative.display()),
            })?;
            trace!("extracted {}", relative.display());
            extracted.push(relative);
        }

        Ok(extracted)
    }

    fn pack_directory(&self, src_dir: &Path, dest: &Path) -> Result<usize> {
        let file = File::create(dest)
            .map_err(|e| BundleError::io(format!("failed to create {}", dest.display()), e))?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);
        let mut count = 0usize;

        for entry in WalkDir::new(src_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| walk_error(src_dir, e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry_name(src_dir, entry.path())?;
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| zip_write_error(dest, &e))?;
            let mut source = File::open(entry.path()).map_err(|e| {
                BundleError::io(format!("failed to read {}", entry.path().display()), e)
            })?;
            io::copy(&mut source, &mut writer)
                .map_err(|e| BundleError::io(format!("failed to write {name}"), e))?;
            trace!("packed {name}");
            count += 1;
        }

        writer.finish().map_err(|e| zip_write_error(dest, &e))?;
        Ok(count)
    }
}

/// Build the archive entry name for `path`: relative to `root`, with `/`
/// separators on every platform.
///
/// # Errors
///
/// Returns [`BundleError::Io`] if `path` is not below `root` or is not
/// valid UTF-8.
pub fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        BundleError::io(
            format!("{} is outside {}", path.display(), root.display()),
            io::Error::from(io::ErrorKind::InvalidInput),
        )
    })?;
    let mut parts = Vec::new();
    for component in relative.components() {
        let Component::Normal(part) = component else {
            continue;
        };
        let part = part.to_str().ok_or_else(|| {
            BundleError::io(
                format!("{} is not valid UTF-8", path.display()),
                io::Error::from(io::ErrorKind::InvalidData),
            )
        })?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// Reject absolute paths and `..` components.
fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|e| BundleError::io(format!("failed to create {}", path.display()), e))
}

fn invalid_archive(path: &Path, err: &zip::result::ZipError) -> BundleError {
    BundleError::InvalidArchive {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn zip_write_error(dest: &Path, err: &zip::result::ZipError) -> BundleError {
    BundleError::io(
        format!("failed to write archive {}", dest.display()),
        io::Error::other(err.to_string()),
    )
}

/// Map a directory traversal failure to a [`BundleError::Io`].
pub(crate) fn walk_error(root: &Path, err: walkdir::Error) -> BundleError {
    let context = format!("failed to walk {}", root.display());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
    BundleError::io(context, source)
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
