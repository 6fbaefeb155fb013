//! Release asset resolution.
//!
//! Turns a dependency's upstream identity and asset selector into one
//! concrete download: the latest release of the repository is fetched from
//! the feed and the first asset satisfying the selector wins. Upstream asset
//! order is authoritative, so the choice is reproducible for a given release.

use crate::dependency::{AssetSelector, SourceIdentity};
use crate::error::{BundleError, Result};
use crate::transport::Transport;
use log::debug;
use serde::Deserialize;

/// Default release-feed endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// One downloadable asset picked for a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    /// Where the asset is downloaded from.
    pub download_url: String,
    /// The asset's file name; satisfies the selector that produced it.
    pub display_name: String,
    /// The upstream the asset was resolved from.
    pub source: SourceIdentity,
}

/// An asset entry of a release-feed document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    /// Asset file name.
    pub name: String,
    /// Direct download URL.
    pub browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

/// Resolves dependencies against the release feed.
pub struct ReleaseAssetResolver<'a> {
    transport: &'a dyn Transport,
    api_base: String,
}

impl<'a> ReleaseAssetResolver<'a> {
    /// Create a resolver querying `api_base` through `transport`.
    #[must_use]
    pub fn new(transport: &'a dyn Transport, api_base: &str) -> Self {
        Self {
            transport,
            api_base: api_base.trim_end_matches('/').to_owned(),
        }
    }

    /// Return the latest-release feed URL for a repository.
    ///
    /// # Examples
    ///
    /// ```
    /// use atmo_packer::resolver::{ReleaseAssetResolver, DEFAULT_API_BASE};
    /// use atmo_packer::transport::UreqTransport;
    ///
    /// let transport = UreqTransport::new(None);
    /// let resolver = ReleaseAssetResolver::new(&transport, DEFAULT_API_BASE);
    /// assert_eq!(
    ///     resolver.latest_release_url("XorTroll", "emuiibo"),
    ///     "https://api.github.com/repos/XorTroll/emuiibo/releases/latest"
    /// );
    /// ```
    #[must_use]
    pub fn latest_release_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{owner}/{repo}/releases/latest", self.api_base)
    }

    /// Resolve `source` to the first asset satisfying `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::NotFound`] when no asset matches,
    /// [`BundleError::RateLimited`] when the feed throttles the request, and
    /// [`BundleError::Transport`] when the feed cannot be fetched or parsed.
    pub fn resolve(&self, source: &SourceIdentity, selector: &AssetSelector) -> Result<ResolvedAsset> {
        match source {
            SourceIdentity::Repository { owner, repo } => {
                let url = self.latest_release_url(owner, repo);
                let body = self.transport.fetch_json(&url)?;
                let release: Release =
                    serde_json::from_str(&body).map_err(|e| BundleError::Transport {
                        url: url.clone(),
                        reason: format!("malformed release document: {e}"),
                    })?;
                debug!(
                    "{source}: latest release lists {} asset(s)",
                    release.assets.len()
                );
                let asset = select_asset(&release.assets, selector)
                    .ok_or_else(|| not_found(source, selector))?;
                Ok(ResolvedAsset {
                    download_url: asset.browser_download_url.clone(),
                    display_name: asset.name.clone(),
                    source: source.clone(),
                })
            }
            SourceIdentity::Url(url) => {
                let name = url_file_name(url);
                if !selector.accepts(name) {
                    return Err(not_found(source, selector));
                }
                Ok(ResolvedAsset {
                    download_url: url.clone(),
                    display_name: name.to_owned(),
                    source: source.clone(),
                })
            }
        }
    }
}

/// Pick the first asset satisfying `selector`.
///
/// Each selector rule is tried against the full list before the next rule;
/// the list is scanned in upstream order.
#[must_use]
pub fn select_asset<'a>(assets: &'a [ReleaseAsset], selector: &AssetSelector) -> Option<&'a ReleaseAsset> {
    selector.first_match(assets, |asset| asset.name.as_str())
}

/// Return the last path segment of a URL, ignoring query and fragment.
fn url_file_name(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

fn not_found(source: &SourceIdentity, selector: &AssetSelector) -> BundleError {
    BundleError::NotFound {
        origin: source.to_string(),
        selector: selector.to_string(),
    }
}
