//! Output tree layout.
//!
//! Every [`Role`] maps to one fixed location in the output tree, which
//! mirrors the root of the target SD card. The planner copies fetched
//! artefacts there and writes the configuration file that enables the
//! overlay menu.

use crate::archive::walk_error;
use crate::dependency::Role;
use crate::error::{BundleError, Result};
use crate::fetcher::FetchedArtifact;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Location of the overlay activation file inside the output tree.
pub const OVERLAY_CONFIG_PATH: &str = "atmosphere/config/system_settings.ini";

/// Contents of the overlay activation file.
pub const OVERLAY_CONFIG: &str = "[tesla]\nenabled = u8\"1\"\n";

/// Where a role's artefact lands in the output tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Merged verbatim into the output root.
    Root,
    /// Copied into `dir`, renamed to `file_name` when one is fixed, else
    /// keeping the artefact's own file name.
    File {
        /// Directory relative to the output root; empty for the root.
        dir: &'static str,
        /// Canonical file name, if the role fixes one.
        file_name: Option<&'static str>,
    },
}

/// Return the fixed placement of `role`.
#[must_use]
pub const fn placement(role: Role) -> Placement {
    match role {
        Role::SigPatches => Placement::Root,
        Role::Bootloader => Placement::File {
            dir: "",
            file_name: Some("fusee.bin"),
        },
        Role::OverlayApp | Role::CompanionApp => Placement::File {
            dir: "tesla/apps",
            file_name: None,
        },
        Role::SideloaderApp => Placement::File {
            dir: "switch/Daybreak",
            file_name: None,
        },
    }
}

/// Places artefacts into the output tree.
#[derive(Debug, Clone)]
pub struct BundleLayoutPlanner {
    output_root: PathBuf,
}

impl BundleLayoutPlanner {
    /// Create a planner writing below `output_root`.
    #[must_use]
    pub fn new(output_root: &Path) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
        }
    }

    /// The root of the output tree.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Return the file `artifact` becomes when placed for `role`, or `None`
    /// when it is an unpacked tree merged into the output root.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Io`] if the artefact path has no file name.
    pub fn destination(&self, artifact: &FetchedArtifact, role: Role) -> Result<Option<PathBuf>> {
        let source = artifact.local_path.as_path();
        let (dir, file_name) = match placement(role) {
            Placement::Root if source.is_dir() => return Ok(None),
            Placement::Root => ("", None),
            Placement::File { dir, file_name } => (dir, file_name),
        };
        let name = match file_name {
            Some(name) => std::ffi::OsStr::new(name),
            None => source.file_name().ok_or_else(|| {
                BundleError::io(
                    format!("{} has no file name", source.display()),
                    std::io::Error::from(std::io::ErrorKind::InvalidInput),
                )
            })?,
        };
        let dest_dir = if dir.is_empty() {
            self.output_root.clone()
        } else {
            self.output_root.join(dir)
        };
        Ok(Some(dest_dir.join(name)))
    }

    /// Copy `artifact` to the location fixed for `role`.
    ///
    /// Missing intermediate directories are created. Returns the path of the
    /// placed file, or the output root for merged trees.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Io`] if a directory cannot be created or a
    /// copy fails.
    pub fn place(&self, artifact: &FetchedArtifact, role: Role) -> Result<PathBuf> {
        let source = artifact.local_path.as_path();
        let Some(dest) = self.destination(artifact, role)? else {
            let copied = copy_tree(source, &self.output_root)?;
            debug!("{role}: merged {copied} file(s) into output root");
            return Ok(self.output_root.clone());
        };
        if let Some(parent) = dest.parent() {
            create_dir(parent)?;
        }
        fs::copy(source, &dest).map_err(|e| {
            BundleError::io(
                format!("failed to copy {} to {}", source.display(), dest.display()),
                e,
            )
        })?;
        Ok(dest)
    }

    /// Write the file that activates the overlay menu.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Io`] if the file cannot be written.
    pub fn write_overlay_config(&self) -> Result<PathBuf> {
        let path = self.output_root.join(OVERLAY_CONFIG_PATH);
        if let Some(parent) = path.parent() {
            create_dir(parent)?;
        }
        fs::write(&path, OVERLAY_CONFIG)
            .map_err(|e| BundleError::io(format!("failed to write {}", path.display()), e))?;
        Ok(path)
    }
}

/// Copy every file below `from` into `to`, preserving relative paths.
///
/// Returns the number of files copied. Symbolic links are skipped.
fn copy_tree(from: &Path, to: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(from).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(from, e))?;
        let relative = entry.path().strip_prefix(from).map_err(|_| {
            BundleError::io(
                format!("{} escaped {}", entry.path().display(), from.display()),
                std::io::Error::from(std::io::ErrorKind::InvalidInput),
            )
        })?;
        let dest = to.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            create_dir(&dest)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &dest).map_err(|e| {
                BundleError::io(
                    format!("failed to copy {} to {}", entry.path().display(), dest.display()),
                    e,
                )
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|e| BundleError::io(format!("failed to create {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn temp_dir() -> TempDir {
        TempDir::new().expect("temp dir creation succeeds")
    }

    fn artefact_file(dir: &Path, name: &str, contents: &[u8]) -> FetchedArtifact {
        let path = dir.join(name);
        fs::write(&path, contents).expect("write artefact");
        FetchedArtifact {
            local_path: path,
            is_archive: false,
        }
    }

    #[rstest]
    #[case::bootloader(Role::Bootloader, "payload.bin", "fusee.bin")]
    #[case::overlay(Role::OverlayApp, "ovlmenu.nro", "tesla/apps/ovlmenu.nro")]
    #[case::companion(Role::CompanionApp, "emuiibo.nro", "tesla/apps/emuiibo.nro")]
    #[case::sideloader(Role::SideloaderApp, "daybreak.nro", "switch/Daybreak/daybreak.nro")]
    fn roles_land_at_canonical_paths(
        temp_dir: TempDir,
        #[case] role: Role,
        #[case] name: &str,
        #[case] expected: &str,
    ) {
        let scratch = temp_dir.path().join("scratch");
        fs::create_dir_all(&scratch).expect("mkdir");
        let output = temp_dir.path().join("SD_ROOT");
        let planner = BundleLayoutPlanner::new(&output);

        let placed = planner
            .place(&artefact_file(&scratch, name, b"bytes"), role)
            .expect("placement succeeds");

        assert_eq!(placed, output.join(expected));
        assert_eq!(fs::read(&placed).expect("read"), b"bytes");
    }

    #[rstest]
    fn sigpatch_tree_is_merged_verbatim(temp_dir: TempDir) {
        let unpacked = temp_dir.path().join("unpacked");
        fs::create_dir_all(unpacked.join("atmosphere/kip_patches/fs_patches")).expect("mkdir");
        fs::write(
            unpacked.join("atmosphere/kip_patches/fs_patches/a.ips"),
            b"ips",
        )
        .expect("write");
        fs::create_dir_all(unpacked.join("bootloader")).expect("mkdir");
        fs::write(unpacked.join("bootloader/patches.ini"), b"ini").expect("write");
        let output = temp_dir.path().join("SD_ROOT");
        let planner = BundleLayoutPlanner::new(&output);
        let artefact = FetchedArtifact {
            local_path: unpacked,
            is_archive: true,
        };

        planner.place(&artefact, Role::SigPatches).expect("merge");

        assert!(output.join("atmosphere/kip_patches/fs_patches/a.ips").is_file());
        assert_eq!(
            fs::read(output.join("bootloader/patches.ini")).expect("read"),
            b"ini"
        );
    }

    #[rstest]
    fn destination_is_planned_without_copying(temp_dir: TempDir) {
        let output = temp_dir.path().join("SD_ROOT");
        let planner = BundleLayoutPlanner::new(&output);
        let tree = FetchedArtifact {
            local_path: temp_dir.path().to_path_buf(),
            is_archive: true,
        };
        let binary = FetchedArtifact {
            local_path: temp_dir.path().join("app.nro"),
            is_archive: false,
        };

        assert_eq!(planner.destination(&tree, Role::SigPatches).expect("plan"), None);
        assert_eq!(
            planner.destination(&binary, Role::OverlayApp).expect("plan"),
            Some(output.join("tesla/apps/app.nro"))
        );
        assert!(!output.exists());
    }

    #[rstest]
    fn overlay_config_enables_tesla(temp_dir: TempDir) {
        let output = temp_dir.path().join("SD_ROOT");
        let planner = BundleLayoutPlanner::new(&output);

        let path = planner.write_overlay_config().expect("write config");

        assert_eq!(path, output.join("atmosphere/config/system_settings.ini"));
        assert_eq!(
            fs::read_to_string(path).expect("read"),
            "[tesla]\nenabled = u8\"1\"\n"
        );
    }

    #[rstest]
    fn copy_failure_is_an_io_error(temp_dir: TempDir) {
        let output = temp_dir.path().join("SD_ROOT");
        let planner = BundleLayoutPlanner::new(&output);
        let missing = FetchedArtifact {
            local_path: temp_dir.path().join("vanished.nro"),
            is_archive: false,
        };

        let err = planner
            .place(&missing, Role::CompanionApp)
            .expect_err("source missing");

        assert!(matches!(err, BundleError::Io { .. }));
    }

    #[test]
    fn only_sigpatches_merge_into_the_root() {
        let merged: Vec<Role> = Role::ALL
            .into_iter()
            .filter(|role| placement(*role) == Placement::Root)
            .collect();
        assert_eq!(merged, vec![Role::SigPatches]);
    }
}
