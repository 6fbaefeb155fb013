//! CLI argument definitions for the bundle builder.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint so argument parsing can be tested directly.

use crate::packager::DEFAULT_ARCHIVE_NAME;
use crate::resolver::DEFAULT_API_BASE;
use camino::Utf8PathBuf;
use clap::Parser;

/// Build an Atmosphère SD card bundle from upstream releases.
#[derive(Parser, Debug, Clone)]
#[command(name = "atmo-packer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Build an Atmosphère SD card bundle from upstream releases.\n\n",
    "Each dependency is resolved against the latest release of its upstream ",
    "repository, downloaded, unpacked where needed and copied to its fixed ",
    "location in an SD card tree. The tree is then packed into one zip archive ",
    "that can be extracted directly onto the card root.\n\n",
    "Running without arguments builds the built-in dependency set in the ",
    "current directory.",
))]
#[command(after_help = concat!(
    "DEFAULT DEPENDENCIES:\n",
    "  sigpatches    ITotalJustice/patches        merged into the card root\n",
    "  fusee         Atmosphere-NX/Atmosphere     /fusee.bin\n",
    "  tesla-menu    WerWolv/Tesla-Menu           /tesla/apps/\n",
    "  emuiibo       XorTroll/emuiibo             /tesla/apps/\n",
    "  daybreak      mison20000/daybreak          /switch/Daybreak/\n\n",
    "EXAMPLES:\n",
    "  Build the default bundle:\n",
    "    $ atmo-packer\n\n",
    "  Authenticate to avoid the anonymous rate limit:\n",
    "    $ GITHUB_TOKEN=... atmo-packer\n\n",
    "  Build from a custom dependency manifest:\n",
    "    $ atmo-packer --manifest bundle.toml\n\n",
    "  Preview without downloading:\n",
    "    $ atmo-packer --dry-run",
))]
pub struct Cli {
    /// Directory holding the scratch area, the output tree and the archive.
    #[arg(short = 'C', long, value_name = "DIR", default_value = ".")]
    pub work_dir: Utf8PathBuf,

    /// Archive file name, relative to the work directory.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_ARCHIVE_NAME)]
    pub output: Utf8PathBuf,

    /// TOML dependency manifest replacing the built-in dependency set.
    #[arg(short, long, value_name = "FILE")]
    pub manifest: Option<Utf8PathBuf>,

    /// Bearer token for the release feed.
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Release feed endpoint.
    #[arg(
        long,
        value_name = "URL",
        env = "ATMO_PACKER_API_BASE",
        default_value = DEFAULT_API_BASE
    )]
    pub api_base: String,

    /// Show the dependency plan and exit without downloading.
    #[arg(long)]
    pub dry_run: bool,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, conflicts_with = "verbosity")]
    pub quiet: bool,
}

impl Default for Cli {
    /// Creates a `Cli` with every flag at its documented default.
    ///
    /// # Examples
    ///
    /// ```
    /// use atmo_packer::cli::Cli;
    ///
    /// let cli = Cli::default();
    /// assert_eq!(cli.work_dir.as_str(), ".");
    /// assert!(cli.manifest.is_none());
    /// assert!(!cli.dry_run);
    /// ```
    fn default() -> Self {
        Self {
            work_dir: Utf8PathBuf::from("."),
            output: Utf8PathBuf::from(DEFAULT_ARCHIVE_NAME),
            manifest: None,
            github_token: None,
            api_base: DEFAULT_API_BASE.to_owned(),
            dry_run: false,
            verbosity: 0,
            quiet: false,
        }
    }
}

impl Cli {
    /// Map `-q`/`-v` to the log level used when `RUST_LOG` is unset.
    #[must_use]
    pub const fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbosity {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
