//! Artefact download and unpacking.
//!
//! The fetcher downloads a resolved asset into the dependency's private
//! scratch directory and, when the dependency asks for it, unpacks the
//! archive and locates the wanted file inside. It never writes outside the
//! scratch directory it is given.

use crate::archive::{ArchiveCodec, walk_error};
use crate::dependency::{Extraction, NameRule};
use crate::error::{BundleError, Result};
use crate::resolver::ResolvedAsset;
use crate::transport::Transport;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Sub-directory of a dependency's scratch space receiving unpacked files.
const UNPACK_DIR: &str = "unpacked";

/// A downloaded artefact ready to be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    /// The file to place, or the root of an unpacked tree.
    pub local_path: PathBuf,
    /// Whether the artefact came out of an archive.
    pub is_archive: bool,
}

/// Downloads and unpacks assets.
pub struct ArtifactFetcher<'a> {
    transport: &'a dyn Transport,
    codec: &'a dyn ArchiveCodec,
}

impl<'a> ArtifactFetcher<'a> {
    /// Create a fetcher using the given transport and archive codec.
    #[must_use]
    pub fn new(transport: &'a dyn Transport, codec: &'a dyn ArchiveCodec) -> Self {
        Self { transport, codec }
    }

    /// Download `asset` into `scratch` and apply `extraction`.
    ///
    /// `scratch` must be private to the dependency being fetched; it is
    /// created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::InvalidAssetName`] if the asset name is not a
    /// plain file name, [`BundleError::Transport`] if the download fails,
    /// [`BundleError::InvalidArchive`] if unpacking fails, and
    /// [`BundleError::AssetNotFoundInArchive`] if no unpacked file matches
    /// the extraction rule.
    pub fn fetch(
        &self,
        asset: &ResolvedAsset,
        extraction: &Extraction,
        scratch: &Path,
    ) -> Result<FetchedArtifact> {
        let file_name = plain_file_name(&asset.display_name)?;
        fs::create_dir_all(scratch)
            .map_err(|e| BundleError::io(format!("failed to create {}", scratch.display()), e))?;

        let download_path = scratch.join(file_name);
        let bytes = self.transport.download(&asset.download_url, &download_path)?;
        debug!("downloaded {file_name} ({bytes} bytes)");

        let unpack_root = scratch.join(UNPACK_DIR);
        match extraction {
            Extraction::None => Ok(FetchedArtifact {
                local_path: download_path,
                is_archive: false,
            }),
            Extraction::Tree => {
                self.unpack(&download_path, &unpack_root)?;
                Ok(FetchedArtifact {
                    local_path: unpack_root,
                    is_archive: true,
                })
            }
            Extraction::Find(rule) => {
                self.unpack(&download_path, &unpack_root)?;
                let found = find_file(&unpack_root, rule)?.ok_or_else(|| {
                    BundleError::AssetNotFoundInArchive {
                        archive: file_name.to_owned(),
                        pattern: rule.to_string(),
                    }
                })?;
                debug!("selected {} from {file_name}", found.display());
                Ok(FetchedArtifact {
                    local_path: found,
                    is_archive: true,
                })
            }
        }
    }

    fn unpack(&self, archive: &Path, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)
            .map_err(|e| BundleError::io(format!("failed to create {}", dest.display()), e))?;
        let files = self.codec.extract_all(archive, dest)?;
        debug!("unpacked {} file(s) from {}", files.len(), archive.display());
        Ok(())
    }
}

/// Find the first file below `root` whose name satisfies `rule`.
///
/// The tree is walked depth-first with entries in name order, so the result
/// is stable for a given tree.
///
/// # Errors
///
/// Returns [`BundleError::Io`] if the tree cannot be read.
pub fn find_file(root: &Path, rule: &NameRule) -> Result<Option<PathBuf>> {
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry
            .file_name()
            .to_str()
            .is_some_and(|name| rule.matches(name))
        {
            return Ok(Some(entry.into_path()));
        }
    }
    Ok(None)
}

/// Accept only names usable as a single path component.
fn plain_file_name(name: &str) -> Result<&str> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if invalid {
        return Err(BundleError::InvalidAssetName {
            name: name.to_owned(),
        });
    }
    Ok(name)
}

#[cfg(test)]
#[path = "fetcher_tests.rs"]
mod tests;
