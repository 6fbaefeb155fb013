//! Bundle archive packaging.
//!
//! Serialises the finished output tree into one archive whose entries are
//! relative to the output root itself, so unpacking the archive onto an SD
//! card root reproduces the tree exactly. The archive is written to a
//! `.part` sibling first and renamed into place, so a failed run never
//! leaves a truncated archive under the final name.

use crate::archive::{ArchiveCodec, walk_error};
use crate::error::{BundleError, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Default file name of the produced archive.
pub const DEFAULT_ARCHIVE_NAME: &str = "Switch_Atmo_Integration_Pack.zip";

/// Packs an output tree into the distributable archive.
pub struct ArchivePackager<'a> {
    codec: &'a dyn ArchiveCodec,
}

impl<'a> ArchivePackager<'a> {
    /// Create a packager using `codec`.
    #[must_use]
    pub fn new(codec: &'a dyn ArchiveCodec) -> Self {
        Self { codec }
    }

    /// Pack every file below `root` into `archive_path`.
    ///
    /// Returns `archive_path` once the archive is complete.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::EmptyOutputTree`] if `root` holds no files, or
    /// [`BundleError::Io`] if the tree cannot be read or the archive cannot
    /// be written.
    pub fn pack(&self, root: &Path, archive_path: &Path) -> Result<PathBuf> {
        if count_files(root)? == 0 {
            return Err(BundleError::EmptyOutputTree {
                path: root.to_path_buf(),
            });
        }

        let partial = partial_path(archive_path);
        let outcome = self
            .codec
            .pack_directory(root, &partial)
            .and_then(|written| {
                fs::rename(&partial, archive_path).map_err(|e| {
                    BundleError::io(
                        format!("failed to move archive into {}", archive_path.display()),
                        e,
                    )
                })?;
                Ok(written)
            });

        match outcome {
            Ok(written) => {
                debug!("packed {written} file(s) into {}", archive_path.display());
                Ok(archive_path.to_path_buf())
            }
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(&partial) {
                    debug!("no partial archive to remove: {cleanup}");
                }
                Err(err)
            }
        }
    }
}

/// Count regular files below `root`.
fn count_files(root: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if entry.file_type().is_file() {
            count += 1;
        }
    }
    Ok(count)
}

fn partial_path(archive_path: &Path) -> PathBuf {
    let mut name = archive_path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".part");
    archive_path.with_file_name(name)
}
