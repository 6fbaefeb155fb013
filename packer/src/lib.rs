//! Atmosphère bundle builder library.
//!
//! This crate resolves a fixed set of upstream dependencies against their
//! latest GitHub releases, downloads and unpacks them, places each artefact
//! at its canonical location in an SD card tree, and packs that tree into a
//! single zip archive. It is used by the `atmo-packer` CLI binary and can be
//! driven programmatically with custom transports for testing.
//!
//! # Modules
//!
//! - [`archive`] - Zip extraction and deterministic packing
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Run configuration resolved from the CLI
//! - [`dependency`] - Dependency specifications, roles and asset selectors
//! - [`error`] - Error types and failure categories
//! - [`fetcher`] - Artefact download and extraction
//! - [`layout`] - Canonical SD card layout and artefact placement
//! - [`manifest`] - TOML dependency manifests
//! - [`output`] - Progress lines, dry-run plans and summaries
//! - [`packager`] - Archive packaging of the output tree
//! - [`pipeline`] - Resolve, fetch, place and pack orchestration
//! - [`resolver`] - Release-feed asset resolution
//! - [`transport`] - HTTP access to the release feed and asset downloads
//! - [`workdirs`] - Scratch and output directory lifecycle

pub mod archive;
pub mod cli;
pub mod config;
pub mod dependency;
pub mod error;
pub mod fetcher;
pub mod layout;
pub mod manifest;
pub mod output;
pub mod packager;
pub mod pipeline;
pub mod resolver;
pub mod transport;
pub mod workdirs;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
