//! Shared test utilities for the bundle builder.
//!
//! [`StubTransport`] serves release documents and asset payloads from
//! memory and records every request it sees, so pipeline tests run without
//! network access. The helpers below build release JSON and zip fixtures.

use crate::error::{BundleError, Result};
use crate::transport::Transport;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// API base used by stubbed feeds.
pub const STUB_API_BASE: &str = "https://api.stub.test";

/// Return the latest-release feed URL for `repository` ("owner/repo").
pub fn release_url(repository: &str) -> String {
    format!("{STUB_API_BASE}/repos/{repository}/releases/latest")
}

/// Return the download URL the stub assigns to an asset.
pub fn asset_url(repository: &str, name: &str) -> String {
    format!("https://downloads.stub.test/{repository}/{name}")
}

/// Build a release document listing the given `(name, download_url)` pairs
/// in order.
pub fn release_json(assets: &[(&str, &str)]) -> String {
    let assets: Vec<serde_json::Value> = assets
        .iter()
        .map(|(name, url)| {
            serde_json::json!({
                "name": name,
                "browser_download_url": url,
            })
        })
        .collect();
    serde_json::json!({ "tag_name": "v1.0.0", "assets": assets }).to_string()
}

/// Build an in-memory zip archive holding `files`.
///
/// # Panics
///
/// Panics if the archive cannot be written.
#[allow(
    clippy::expect_used,
    reason = "fixture builder for tests; an in-memory write failure is a broken test"
)]
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, contents) in files {
        writer.start_file(*name, options).expect("start zip entry");
        writer.write_all(contents).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

#[derive(Debug, Clone)]
enum FeedReply {
    Assets(Vec<String>),
    RateLimited,
    Failure(String),
}

/// A scripted [`Transport`] for tests.
///
/// Each repository is given a feed reply; listed assets are downloadable
/// when a payload was registered for them.
#[derive(Debug, Default)]
pub struct StubTransport {
    feeds: BTreeMap<String, FeedReply>,
    payloads: BTreeMap<String, Vec<u8>>,
    calls: RefCell<Vec<String>>,
}

impl StubTransport {
    /// Create a stub with no feeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// List `name` in the latest release of `repository` and serve
    /// `payload` for it.
    #[must_use]
    pub fn with_asset(mut self, repository: &str, name: &str, payload: &[u8]) -> Self {
        self.payloads
            .insert(asset_url(repository, name), payload.to_vec());
        self.with_listed_asset(repository, name)
    }

    /// List `name` in the latest release of `repository` without serving a
    /// payload; downloading it fails.
    #[must_use]
    pub fn with_listed_asset(mut self, repository: &str, name: &str) -> Self {
        let reply = self
            .feeds
            .entry(repository.to_owned())
            .or_insert_with(|| FeedReply::Assets(Vec::new()));
        if let FeedReply::Assets(names) = reply {
            names.push(name.to_owned());
        }
        self
    }

    /// Give `repository` a latest release with no assets.
    #[must_use]
    pub fn with_empty_release(mut self, repository: &str) -> Self {
        self.feeds
            .insert(repository.to_owned(), FeedReply::Assets(Vec::new()));
        self
    }

    /// Make the feed for `repository` report a rate limit.
    #[must_use]
    pub fn rate_limited(mut self, repository: &str) -> Self {
        self.feeds
            .insert(repository.to_owned(), FeedReply::RateLimited);
        self
    }

    /// Make the feed for `repository` fail with a transport error.
    #[must_use]
    pub fn failing_feed(mut self, repository: &str, reason: &str) -> Self {
        self.feeds
            .insert(repository.to_owned(), FeedReply::Failure(reason.to_owned()));
        self
    }

    /// Every URL requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Number of feed requests made for `repository`.
    pub fn feed_requests(&self, repository: &str) -> usize {
        let url = release_url(repository);
        self.calls.borrow().iter().filter(|c| **c == url).count()
    }

    fn feed_for(&self, url: &str) -> Option<(&str, &FeedReply)> {
        self.feeds
            .iter()
            .find(|(repository, _)| release_url(repository) == url)
            .map(|(repository, reply)| (repository.as_str(), reply))
    }
}

impl Transport for StubTransport {
    fn fetch_json(&self, url: &str) -> Result<String> {
        self.calls.borrow_mut().push(url.to_owned());
        match self.feed_for(url) {
            Some((repository, FeedReply::Assets(names))) => {
                let urls: Vec<String> = names.iter().map(|n| asset_url(repository, n)).collect();
                let pairs: Vec<(&str, &str)> = names
                    .iter()
                    .zip(&urls)
                    .map(|(n, u)| (n.as_str(), u.as_str()))
                    .collect();
                Ok(release_json(&pairs))
            }
            Some((_, FeedReply::RateLimited)) => Err(BundleError::RateLimited {
                url: url.to_owned(),
            }),
            Some((_, FeedReply::Failure(reason))) => Err(BundleError::Transport {
                url: url.to_owned(),
                reason: reason.clone(),
            }),
            None => Err(BundleError::Transport {
                url: url.to_owned(),
                reason: "HTTP 404 Not Found".to_owned(),
            }),
        }
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        self.calls.borrow_mut().push(url.to_owned());
        let payload = self.payloads.get(url).ok_or_else(|| BundleError::Transport {
            url: url.to_owned(),
            reason: "HTTP 404 Not Found".to_owned(),
        })?;
        std::fs::write(dest, payload)
            .map_err(|e| BundleError::io(format!("failed to write {}", dest.display()), e))?;
        Ok(payload.len() as u64)
    }
}

/// Payloads served by [`default_release_stub`].
pub mod payloads {
    /// Contents of the bootloader binary.
    pub const FUSEE: &[u8] = b"fusee payload";
    /// Contents of the overlay menu binary.
    pub const OVERLAY: &[u8] = b"overlay menu payload";
    /// Contents of the companion binary.
    pub const COMPANION: &[u8] = b"companion payload";
    /// Contents of the sideloader binary.
    pub const SIDELOADER: &[u8] = b"sideloader payload";
    /// Contents of the patch file inside the signature patches archive.
    pub const PATCH: &[u8] = b"patch payload";
}

/// A stub serving one plain release for every built-in dependency.
///
/// The signature patches archive holds `atmosphere/exefs_patches/es/1.ips`
/// and `bootloader/patches.ini`; every other dependency is a direct binary.
pub fn default_release_stub() -> StubTransport {
    let patches = zip_bytes(&[
        ("atmosphere/exefs_patches/es/1.ips", payloads::PATCH),
        ("bootloader/patches.ini", b"[patches]\n"),
    ]);
    StubTransport::new()
        .with_asset("ITotalJustice/patches", "patches-v3.zip", &patches)
        .with_asset("Atmosphere-NX/Atmosphere", "fusee.bin", payloads::FUSEE)
        .with_asset("WerWolv/Tesla-Menu", "ovlmenu.nro", payloads::OVERLAY)
        .with_asset("XorTroll/emuiibo", "emuiibo.nro", payloads::COMPANION)
        .with_asset("mison20000/daybreak", "daybreak.nro", payloads::SIDELOADER)
}
