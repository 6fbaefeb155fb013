//! Scratch and output directories of one pipeline run.
//!
//! Both directories are purged when a run starts, so a crashed earlier run
//! cannot leak into the next one, and removed again when the run ends,
//! whatever its outcome. Only the packaged archive outlives a run.

use crate::dependency::Role;
use crate::error::{BundleError, Result};
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default name of the scratch directory.
pub const SCRATCH_DIR: &str = "temp";

/// Default name of the output tree directory.
pub const OUTPUT_DIR: &str = "SD_ROOT";

/// Which of a dependency's selections is being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The dependency's primary selection.
    Primary,
    /// The dependency's declared fallback.
    Fallback,
}

impl Attempt {
    /// Directory name used for this attempt's scratch space.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

/// The scratch and output directories used by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDirs {
    scratch: PathBuf,
    output: PathBuf,
}

impl WorkingDirs {
    /// Use explicit scratch and output directories.
    #[must_use]
    pub fn new(scratch: PathBuf, output: PathBuf) -> Self {
        Self { scratch, output }
    }

    /// Use the default directory names below `work_dir`.
    ///
    /// # Examples
    ///
    /// ```
    /// use atmo_packer::workdirs::WorkingDirs;
    /// use std::path::Path;
    ///
    /// let dirs = WorkingDirs::in_dir(Path::new("/tmp/build"));
    /// assert_eq!(dirs.scratch(), Path::new("/tmp/build/temp"));
    /// assert_eq!(dirs.output(), Path::new("/tmp/build/SD_ROOT"));
    /// ```
    #[must_use]
    pub fn in_dir(work_dir: &Path) -> Self {
        Self::new(work_dir.join(SCRATCH_DIR), work_dir.join(OUTPUT_DIR))
    }

    /// The scratch directory.
    #[must_use]
    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    /// The output tree directory.
    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// The private scratch directory of one dependency attempt.
    ///
    /// Each role and attempt gets its own directory, so unpacked trees of
    /// different dependencies never share a namespace.
    #[must_use]
    pub fn dependency_scratch(&self, role: Role, attempt: Attempt) -> PathBuf {
        self.scratch.join(role.as_str()).join(attempt.as_str())
    }

    /// Remove leftovers of earlier runs and create both directories empty.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Io`] if a directory cannot be removed or
    /// created.
    pub fn prepare(&self) -> Result<()> {
        self.remove_all()?;
        for dir in [&self.scratch, &self.output] {
            fs::create_dir_all(dir)
                .map_err(|e| BundleError::io(format!("failed to create {}", dir.display()), e))?;
        }
        Ok(())
    }

    /// Remove both directories if they exist.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Io`] if an existing directory cannot be
    /// removed.
    pub fn remove_all(&self) -> Result<()> {
        for dir in [&self.scratch, &self.output] {
            remove_tree(dir)
                .map_err(|e| BundleError::io(format!("failed to remove {}", dir.display()), e))?;
        }
        Ok(())
    }

    /// Return a guard that removes both directories when dropped.
    #[must_use]
    pub fn teardown_guard(&self) -> TeardownGuard {
        TeardownGuard { dirs: self.clone() }
    }
}

/// Removes a run's working directories when it goes out of scope.
///
/// The guard fires on every exit path, including early `?` returns.
#[derive(Debug)]
pub struct TeardownGuard {
    dirs: WorkingDirs,
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        match self.dirs.remove_all() {
            Ok(()) => debug!("removed working directories"),
            Err(err) => warn!("failed to clean up working directories: {err}"),
        }
    }
}

/// Remove `path` recursively; a missing path, or one below a non-directory,
/// has nothing to remove.
fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
            ) =>
        {
            Ok(())
        }
        other => other,
    }
}
