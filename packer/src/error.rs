//! Error types for the bundle builder.
//!
//! Every failure the pipeline can raise is a [`BundleError`]. Each variant
//! belongs to one [`ErrorKind`], the taxonomy the orchestrator uses to decide
//! between a one-off fallback and an immediate abort. Failures raised while a
//! dependency is being processed are wrapped in [`BundleError::Stage`] so the
//! final message names the dependency and the stage that failed.

use crate::dependency::Role;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building a bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The release feed signalled request throttling.
    #[error(
        "release feed rate limit reached at {url}; wait before retrying or set GITHUB_TOKEN"
    )]
    RateLimited {
        /// The feed URL that was throttled.
        url: String,
    },

    /// No asset of the latest release satisfies the selector.
    #[error("no asset in {origin} matches {selector}")]
    NotFound {
        /// The upstream repository or URL that was searched.
        origin: String,
        /// Human-readable rendering of the selector.
        selector: String,
    },

    /// The archive was extracted but contains no file matching the pattern.
    #[error("no file matching {pattern} found in archive {archive}")]
    AssetNotFoundInArchive {
        /// Name of the extracted archive.
        archive: String,
        /// Human-readable rendering of the name rule.
        pattern: String,
    },

    /// A request against the feed or an asset download failed.
    #[error("request to {url} failed: {reason}")]
    Transport {
        /// The URL that was requested.
        url: String,
        /// Description of the failure.
        reason: String,
    },

    /// The downloaded archive is corrupt or contains unsafe entries.
    #[error("invalid archive {path}: {reason}")]
    InvalidArchive {
        /// Path of the archive on disk.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// An asset name cannot be used as a file name.
    #[error("asset name {name:?} is not a plain file name")]
    InvalidAssetName {
        /// The rejected asset name.
        name: String,
    },

    /// A local filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The output tree holds no files to package.
    #[error("output tree {path} contains no files to package")]
    EmptyOutputTree {
        /// Root of the output tree.
        path: PathBuf,
    },

    /// The dependency manifest could not be loaded.
    #[error("invalid dependency manifest: {reason}")]
    Manifest {
        /// Description of the problem.
        reason: String,
    },

    /// A failure raised while processing one dependency.
    #[error("{dependency} ({role}) failed while {stage}: {source}")]
    Stage {
        /// Name of the dependency being processed.
        dependency: String,
        /// The bundle role of the dependency.
        role: Role,
        /// The pipeline stage that failed.
        stage: Stage,
        /// The underlying failure.
        #[source]
        source: Box<BundleError>,
    },
}

/// The error taxonomy of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Upstream throttling; fatal, never retried.
    RateLimited,
    /// No asset matches; triggers a declared fallback.
    NotFound,
    /// Extraction succeeded but the target file is absent; fatal.
    AssetNotFoundInArchive,
    /// Network failure or bad upstream data; fatal.
    Transport,
    /// Local filesystem failure or invalid local input; fatal.
    Io,
}

/// Pipeline stage in which a dependency failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Querying the release feed.
    Resolving,
    /// Downloading and unpacking the asset.
    Fetching,
    /// Copying the artefact into the output tree.
    Placing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Resolving => "resolving",
            Self::Fetching => "fetching",
            Self::Placing => "placing",
        };
        f.write_str(label)
    }
}

impl BundleError {
    /// Build an [`BundleError::Io`] with a description of the attempted
    /// operation.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Classify this error, looking through [`BundleError::Stage`] wrappers.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AssetNotFoundInArchive { .. } => ErrorKind::AssetNotFoundInArchive,
            Self::Transport { .. } | Self::InvalidArchive { .. } | Self::InvalidAssetName { .. } => {
                ErrorKind::Transport
            }
            Self::Io { .. } | Self::EmptyOutputTree { .. } | Self::Manifest { .. } => {
                ErrorKind::Io
            }
            Self::Stage { source, .. } => source.kind(),
        }
    }

    /// Attach dependency and stage context to this error.
    #[must_use]
    pub fn in_stage(self, dependency: &str, role: Role, stage: Stage) -> Self {
        Self::Stage {
            dependency: dependency.to_owned(),
            role,
            stage,
            source: Box::new(self),
        }
    }
}

/// Result type alias using [`BundleError`].
pub type Result<T> = std::result::Result<T, BundleError>;
