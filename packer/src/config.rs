//! Resolved run configuration.
//!
//! [`PackConfig`] turns parsed CLI arguments into the concrete settings a
//! run needs: working directories, the archive path, credentials and the
//! dependency set.

use crate::cli::Cli;
use crate::dependency::{DependencySpec, default_dependencies};
use crate::error::Result;
use crate::manifest::load_manifest;
use crate::workdirs::WorkingDirs;
use camino::{Utf8Path, Utf8PathBuf};

/// Settings for one bundle build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackConfig {
    /// Scratch and output directories.
    pub dirs: WorkingDirs,
    /// Where the archive is written.
    pub archive_path: Utf8PathBuf,
    /// Optional bearer token for the release feed.
    pub token: Option<String>,
    /// Release feed endpoint.
    pub api_base: String,
    /// Suppress progress output.
    pub quiet: bool,
    /// Dependency manifest, if one replaces the built-in set.
    pub manifest: Option<Utf8PathBuf>,
}

impl PackConfig {
    /// Build the configuration described by `cli`.
    ///
    /// Relative archive paths are resolved against the work directory; an
    /// absolute `--output` is used as given.
    ///
    /// # Examples
    ///
    /// ```
    /// use atmo_packer::cli::Cli;
    /// use atmo_packer::config::PackConfig;
    ///
    /// let cli = Cli {
    ///     work_dir: "/srv/bundle".into(),
    ///     ..Cli::default()
    /// };
    /// let config = PackConfig::from_cli(&cli);
    /// assert_eq!(
    ///     config.archive_path.as_str(),
    ///     "/srv/bundle/Switch_Atmo_Integration_Pack.zip"
    /// );
    /// assert!(config.dirs.output().ends_with("SD_ROOT"));
    /// ```
    #[must_use]
    pub fn from_cli(cli: &Cli) -> Self {
        let work_dir = cli.work_dir.as_path();
        Self {
            dirs: WorkingDirs::in_dir(work_dir.as_std_path()),
            archive_path: archive_path(work_dir, &cli.output),
            token: cli
                .github_token
                .clone()
                .filter(|token| !token.trim().is_empty()),
            api_base: cli.api_base.clone(),
            quiet: cli.quiet,
            manifest: cli.manifest.clone(),
        }
    }

    /// Whether feed requests carry a credential.
    #[must_use]
    pub const fn authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Load the dependencies to build.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BundleError::Manifest`] if the manifest is
    /// invalid, or [`crate::error::BundleError::Io`] if it cannot be read.
    pub fn dependencies(&self) -> Result<Vec<DependencySpec>> {
        match &self.manifest {
            Some(path) => load_manifest(path.as_std_path()),
            None => Ok(default_dependencies()),
        }
    }
}

fn archive_path(work_dir: &Utf8Path, output: &Utf8Path) -> Utf8PathBuf {
    if output.is_absolute() {
        output.to_path_buf()
    } else {
        work_dir.join(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::Role;
    use rstest::rstest;

    #[rstest]
    #[case::relative("/work", "pack.zip", "/work/pack.zip")]
    #[case::nested("/work", "out/pack.zip", "/work/out/pack.zip")]
    #[case::absolute("/work", "/elsewhere/pack.zip", "/elsewhere/pack.zip")]
    fn archive_path_is_resolved_against_work_dir(
        #[case] work_dir: &str,
        #[case] output: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(
            archive_path(Utf8Path::new(work_dir), Utf8Path::new(output)),
            Utf8PathBuf::from(expected)
        );
    }

    #[test]
    fn blank_token_is_ignored() {
        let cli = Cli {
            github_token: Some("   ".to_owned()),
            ..Cli::default()
        };
        assert!(!PackConfig::from_cli(&cli).authenticated());
    }

    #[test]
    fn working_dirs_live_under_work_dir() {
        let cli = Cli {
            work_dir: Utf8PathBuf::from("/work"),
            ..Cli::default()
        };
        let config = PackConfig::from_cli(&cli);
        assert_eq!(config.dirs.scratch(), std::path::Path::new("/work/temp"));
        assert_eq!(config.dirs.output(), std::path::Path::new("/work/SD_ROOT"));
    }

    #[test]
    fn built_in_dependencies_are_used_without_manifest() {
        let config = PackConfig::from_cli(&Cli::default());
        let roles: Vec<Role> = config
            .dependencies()
            .expect("built-in set")
            .iter()
            .map(|d| d.role)
            .collect();
        assert_eq!(roles, Role::ALL.to_vec());
    }

    #[test]
    fn manifest_replaces_built_in_dependencies() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("deps.toml");
        std::fs::write(
            &path,
            "[[dependency]]\nname = \"fusee\"\nrole = \"bootloader\"\n\
             repository = \"Atmosphere-NX/Atmosphere\"\nselect = [{ exact = \"fusee.bin\" }]\n",
        )
        .expect("write manifest");
        let cli = Cli {
            manifest: Some(Utf8PathBuf::try_from(path).expect("utf-8 path")),
            ..Cli::default()
        };

        let dependencies = PackConfig::from_cli(&cli).dependencies().expect("valid manifest");

        assert_eq!(dependencies.len(), 1);
        assert_eq!(dependencies[0].role, Role::Bootloader);
    }
}
