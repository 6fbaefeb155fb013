//! Bundle pipeline orchestration.
//!
//! The orchestrator drives each dependency through resolve, fetch and place,
//! strictly one after another and in role order, then packs the output tree.
//! A dependency whose primary selector matches no asset is retried once with
//! its declared fallback; every other failure aborts the run. Scratch and
//! output directories are removed when the run ends, so an aborted run
//! leaves nothing behind and a successful one leaves only the archive.

use crate::archive::ArchiveCodec;
use crate::dependency::{DependencySpec, Role, Selection, ordered};
use crate::error::{BundleError, ErrorKind, Result, Stage};
use crate::fetcher::{ArtifactFetcher, FetchedArtifact};
use crate::layout::BundleLayoutPlanner;
use crate::output::write_stderr_line;
use crate::packager::ArchivePackager;
use crate::resolver::ReleaseAssetResolver;
use crate::transport::Transport;
use crate::workdirs::{Attempt, WorkingDirs};
use log::{debug, info};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// States of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing has happened yet.
    Init,
    /// Querying the release feed for a dependency.
    Resolving(Role),
    /// Downloading and unpacking a dependency.
    Fetching(Role),
    /// Copying a dependency into the output tree.
    Placing(Role),
    /// Every dependency is in place.
    AllPlaced,
    /// Writing the archive.
    Packaging,
    /// The archive is complete.
    Done,
    /// The run failed.
    Aborted,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::Resolving(role) => write!(f, "resolving({role})"),
            Self::Fetching(role) => write!(f, "fetching({role})"),
            Self::Placing(role) => write!(f, "placing({role})"),
            Self::AllPlaced => f.write_str("all-placed"),
            Self::Packaging => f.write_str("packaging"),
            Self::Done => f.write_str("done"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

/// One dependency as it ended up in the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedDependency {
    /// Dependency name.
    pub name: String,
    /// Role it fills.
    pub role: Role,
    /// Name of the release asset that was downloaded.
    pub asset: String,
    /// Whether the fallback selection was used.
    pub used_fallback: bool,
    /// Destination relative to the output root; empty for merged trees.
    pub destination: String,
}

/// The outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    /// The produced archive.
    pub archive_path: PathBuf,
    /// Dependencies in the order they were placed.
    pub placed: Vec<PlacedDependency>,
}

/// Drives dependencies through resolution, fetching, placement and packing.
pub struct PipelineOrchestrator<'a> {
    resolver: ReleaseAssetResolver<'a>,
    fetcher: ArtifactFetcher<'a>,
    packager: ArchivePackager<'a>,
    layout: BundleLayoutPlanner,
    dirs: WorkingDirs,
    archive_path: PathBuf,
    quiet: bool,
    state: PipelineState,
    occupied: BTreeMap<PathBuf, String>,
}

impl<'a> PipelineOrchestrator<'a> {
    /// Create an orchestrator.
    ///
    /// `transport` and `codec` are the network and archive capabilities;
    /// `dirs` are the run's scratch and output directories and
    /// `archive_path` is where the finished bundle is written.
    #[must_use]
    pub fn new(
        transport: &'a dyn Transport,
        codec: &'a dyn ArchiveCodec,
        api_base: &str,
        dirs: WorkingDirs,
        archive_path: &Path,
    ) -> Self {
        Self {
            resolver: ReleaseAssetResolver::new(transport, api_base),
            fetcher: ArtifactFetcher::new(transport, codec),
            packager: ArchivePackager::new(codec),
            layout: BundleLayoutPlanner::new(dirs.output()),
            dirs,
            archive_path: archive_path.to_path_buf(),
            quiet: false,
            state: PipelineState::Init,
            occupied: BTreeMap::new(),
        }
    }

    /// Suppress progress output.
    #[must_use]
    pub const fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// The state the last run ended in.
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Build the bundle from `dependencies`.
    ///
    /// Dependencies are processed in role order whatever their order in the
    /// slice. Both working directories are purged before the first
    /// dependency and removed before this function returns.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`BundleError`]; failures
    /// raised while processing a dependency are wrapped with the dependency
    /// name and stage.
    pub fn run(
        &mut self,
        dependencies: &[DependencySpec],
        stderr: &mut dyn Write,
    ) -> Result<BuildResult> {
        self.transition(PipelineState::Init);
        let dependencies = ordered(dependencies.to_vec())?;
        let _teardown = self.dirs.teardown_guard();
        self.dirs.prepare()?;
        self.occupied.clear();

        let outcome = self.build(&dependencies, stderr);
        if let Err(err) = &outcome {
            self.transition(PipelineState::Aborted);
            info!("bundle build aborted: {err}");
        }
        outcome
    }

    fn build(
        &mut self,
        dependencies: &[DependencySpec],
        stderr: &mut dyn Write,
    ) -> Result<BuildResult> {
        let total = dependencies.len();
        let mut placed = Vec::with_capacity(total);
        for (index, dependency) in dependencies.iter().enumerate() {
            self.progress(
                stderr,
                format!(
                    "[{}/{total}] {} ({})...",
                    index + 1,
                    dependency.name,
                    dependency.source
                ),
            );
            let result = self.process(dependency, stderr)?;
            self.progress(stderr, format!("  using {}", result.asset));
            placed.push(result);
        }
        self.transition(PipelineState::AllPlaced);

        if dependencies.iter().any(|d| d.role == Role::OverlayApp) {
            let path = self.layout.write_overlay_config()?;
            debug!("wrote overlay configuration to {}", path.display());
        }

        self.transition(PipelineState::Packaging);
        self.progress(
            stderr,
            format!("Packing {}...", self.archive_path.display()),
        );
        let archive_path = self.packager.pack(self.dirs.output(), &self.archive_path)?;
        self.transition(PipelineState::Done);

        Ok(BuildResult {
            archive_path,
            placed,
        })
    }

    /// Process one dependency, retrying once with its fallback when the
    /// primary selector matches no asset.
    fn process(
        &mut self,
        dependency: &DependencySpec,
        stderr: &mut dyn Write,
    ) -> Result<PlacedDependency> {
        match self.attempt(dependency, &dependency.primary, Attempt::Primary) {
            Err(err) if err.kind() == ErrorKind::NotFound => match &dependency.fallback {
                Some(fallback) => {
                    self.progress(stderr, format!("  {err}; trying fallback"));
                    self.attempt(dependency, fallback, Attempt::Fallback)
                }
                None => Err(err),
            },
            other => other,
        }
    }

    fn attempt(
        &mut self,
        dependency: &DependencySpec,
        selection: &Selection,
        attempt: Attempt,
    ) -> Result<PlacedDependency> {
        let name = dependency.name.as_str();
        let role = dependency.role;

        self.transition(PipelineState::Resolving(role));
        let asset = self
            .resolver
            .resolve(&dependency.source, &selection.selector)
            .map_err(|e| e.in_stage(name, role, Stage::Resolving))?;

        self.transition(PipelineState::Fetching(role));
        let scratch = self.dirs.dependency_scratch(role, attempt);
        let artifact = self
            .fetcher
            .fetch(&asset, &selection.extraction, &scratch)
            .map_err(|e| e.in_stage(name, role, Stage::Fetching))?;

        self.transition(PipelineState::Placing(role));
        let placed_at = self
            .claim_destination(&artifact, role, name)
            .and_then(|()| self.layout.place(&artifact, role))
            .map_err(|e| e.in_stage(name, role, Stage::Placing))?;

        Ok(PlacedDependency {
            name: dependency.name.clone(),
            role,
            asset: asset.display_name,
            used_fallback: attempt == Attempt::Fallback,
            destination: relative_destination(self.dirs.output(), &placed_at),
        })
    }

    /// Reserve the file `artifact` will occupy, failing if an earlier
    /// dependency already placed a file there.
    fn claim_destination(
        &mut self,
        artifact: &FetchedArtifact,
        role: Role,
        name: &str,
    ) -> Result<()> {
        let Some(dest) = self.layout.destination(artifact, role)? else {
            return Ok(());
        };
        if let Some(owner) = self.occupied.get(&dest) {
            return Err(BundleError::io(
                format!(
                    "{name} would overwrite {} already placed by {owner}",
                    relative_destination(self.dirs.output(), &dest)
                ),
                std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            ));
        }
        self.occupied.insert(dest, name.to_owned());
        Ok(())
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("pipeline state {} -> {next}", self.state);
        self.state = next;
    }

    fn progress(&self, stderr: &mut dyn Write, message: impl fmt::Display) {
        if !self.quiet {
            write_stderr_line(stderr, message);
        }
    }
}

fn relative_destination(root: &Path, placed_at: &Path) -> String {
    placed_at
        .strip_prefix(root)
        .map(|relative| relative.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
