//! Declarative dependency table.
//!
//! A bundle is described by a list of [`DependencySpec`] values: where each
//! artefact is published, which release asset to pick, whether that asset
//! must be unpacked, and which [`Role`] it fills in the output tree. The
//! built-in table reproduces the classic Atmosphère integration pack; a TOML
//! manifest can replace it (see [`crate::manifest`]).

use crate::error::{BundleError, Result};
use serde::Deserialize;
use std::fmt;

/// The slot a dependency fills in the output tree.
///
/// Variants are declared in processing order: later roles assume the
/// directories created by earlier ones exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Signature patches bundle, unpacked verbatim at the output root.
    SigPatches,
    /// Bootloader payload (`fusee.bin`).
    Bootloader,
    /// Overlay menu application.
    OverlayApp,
    /// Companion application listed by the overlay menu.
    CompanionApp,
    /// Package sideloader application.
    SideloaderApp,
}

impl Role {
    /// All roles in processing order.
    pub const ALL: [Self; 5] = [
        Self::SigPatches,
        Self::Bootloader,
        Self::OverlayApp,
        Self::CompanionApp,
        Self::SideloaderApp,
    ];

    /// Return the kebab-case identifier used in manifests and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SigPatches => "sig-patches",
            Self::Bootloader => "bootloader",
            Self::OverlayApp => "overlay-app",
            Self::CompanionApp => "companion-app",
            Self::SideloaderApp => "sideloader-app",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A case-sensitive predicate over a file or asset name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameRule {
    /// The name ends with the given text.
    Suffix(String),
    /// The name contains the given text.
    Contains(String),
    /// The name equals the given text.
    Exact(String),
}

impl NameRule {
    /// Shorthand for [`NameRule::Suffix`].
    #[must_use]
    pub fn suffix(value: &str) -> Self {
        Self::Suffix(value.to_owned())
    }

    /// Shorthand for [`NameRule::Contains`].
    #[must_use]
    pub fn contains(value: &str) -> Self {
        Self::Contains(value.to_owned())
    }

    /// Shorthand for [`NameRule::Exact`].
    #[must_use]
    pub fn exact(value: &str) -> Self {
        Self::Exact(value.to_owned())
    }

    /// Return `true` when `name` satisfies this rule.
    ///
    /// # Examples
    ///
    /// ```
    /// use atmo_packer::dependency::NameRule;
    ///
    /// assert!(NameRule::suffix(".zip").matches("patches-v3.zip"));
    /// assert!(!NameRule::suffix(".nro").matches("patches-v3.zip"));
    /// assert!(NameRule::contains("menu").matches("ovlmenu.ovl"));
    /// ```
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Suffix(suffix) => name.ends_with(suffix.as_str()),
            Self::Contains(needle) => name.contains(needle.as_str()),
            Self::Exact(exact) => name == exact,
        }
    }
}

impl fmt::Display for NameRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suffix(value) => write!(f, "suffix {value:?}"),
            Self::Contains(value) => write!(f, "contains {value:?}"),
            Self::Exact(value) => write!(f, "exact {value:?}"),
        }
    }
}

/// An ordered chain of name rules used to pick one release asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSelector {
    rules: Vec<NameRule>,
}

impl AssetSelector {
    /// Build a selector from an ordered list of rules.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Manifest`] if `rules` is empty.
    pub fn new(rules: Vec<NameRule>) -> Result<Self> {
        if rules.is_empty() {
            return Err(BundleError::Manifest {
                reason: "asset selector needs at least one rule".to_owned(),
            });
        }
        Ok(Self { rules })
    }

    /// Build a selector holding a single rule.
    #[must_use]
    pub fn single(rule: NameRule) -> Self {
        Self { rules: vec![rule] }
    }

    /// The rules in the order they are tried.
    #[must_use]
    pub fn rules(&self) -> &[NameRule] {
        &self.rules
    }

    /// Return the first item whose name satisfies the selector.
    ///
    /// Each rule is checked against the whole list before the next rule is
    /// considered, and items are scanned in their given order, so the result
    /// is the earliest item matching the earliest satisfiable rule.
    ///
    /// # Examples
    ///
    /// ```
    /// use atmo_packer::dependency::{AssetSelector, NameRule};
    ///
    /// let selector = AssetSelector::new(vec![
    ///     NameRule::suffix(".nro"),
    ///     NameRule::suffix(".zip"),
    /// ])
    /// .unwrap();
    /// let names = ["app.zip", "app.nro"];
    /// assert_eq!(selector.first_match(&names, |n| *n), Some(&"app.nro"));
    /// ```
    pub fn first_match<'a, T>(&self, items: &'a [T], name: impl Fn(&T) -> &str) -> Option<&'a T> {
        self.rules
            .iter()
            .find_map(|rule| items.iter().find(|item| rule.matches(name(item))))
    }

    /// Return `true` when any rule accepts `name`.
    #[must_use]
    pub fn accepts(&self, name: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(name))
    }
}

impl fmt::Display for AssetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, rule) in self.rules.iter().enumerate() {
            if index > 0 {
                f.write_str(", else ")?;
            }
            write!(f, "{rule}")?;
        }
        Ok(())
    }
}

/// What to do with a downloaded asset before placing it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Extraction {
    /// Use the downloaded file as-is.
    #[default]
    None,
    /// Unpack the archive and use its whole content tree.
    Tree,
    /// Unpack the archive and use the first file matching the rule.
    Find(NameRule),
}

impl Extraction {
    /// Return `true` if the asset must be unpacked.
    #[must_use]
    pub const fn requires_extraction(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for Extraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("use as-is"),
            Self::Tree => f.write_str("unpack whole archive"),
            Self::Find(rule) => write!(f, "unpack and take file with {rule}"),
        }
    }
}

/// One way of obtaining a dependency: a selector plus an extraction mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Which release asset to download.
    pub selector: AssetSelector,
    /// How to turn the asset into the placed artefact.
    pub extraction: Extraction,
}

impl Selection {
    /// Download the asset matching `rule` and use it as-is.
    #[must_use]
    pub fn direct(rule: NameRule) -> Self {
        Self {
            selector: AssetSelector::single(rule),
            extraction: Extraction::None,
        }
    }

    /// Download the asset matching `rule` and unpack it with `extraction`.
    #[must_use]
    pub fn unpacked(rule: NameRule, extraction: Extraction) -> Self {
        Self {
            selector: AssetSelector::single(rule),
            extraction,
        }
    }
}

/// Where a dependency is published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceIdentity {
    /// A GitHub repository whose latest release is queried.
    Repository {
        /// Repository owner.
        owner: String,
        /// Repository name.
        repo: String,
    },
    /// A fixed download URL; the asset name is its last path segment.
    Url(String),
}

impl SourceIdentity {
    /// Parse an `owner/repo` pair.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Manifest`] unless `value` has exactly two
    /// non-empty, slash-separated parts.
    ///
    /// # Examples
    ///
    /// ```
    /// use atmo_packer::dependency::SourceIdentity;
    ///
    /// let source = SourceIdentity::repository("XorTroll/emuiibo").unwrap();
    /// assert_eq!(source.to_string(), "XorTroll/emuiibo");
    /// assert!(SourceIdentity::repository("emuiibo").is_err());
    /// ```
    pub fn repository(value: &str) -> Result<Self> {
        let mut parts = value.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
                Ok(Self::Repository {
                    owner: owner.to_owned(),
                    repo: repo.to_owned(),
                })
            }
            _ => Err(BundleError::Manifest {
                reason: format!("repository {value:?} is not in owner/repo form"),
            }),
        }
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository { owner, repo } => write!(f, "{owner}/{repo}"),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// A single upstream artefact the bundle needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    /// Short display name used in progress and error messages.
    pub name: String,
    /// Where the artefact is published.
    pub source: SourceIdentity,
    /// The preferred way of obtaining the artefact.
    pub primary: Selection,
    /// Tried once, only when the primary selector matches no asset.
    pub fallback: Option<Selection>,
    /// The slot the artefact fills in the output tree.
    pub role: Role,
}

impl DependencySpec {
    fn github(name: &str, owner: &str, repo: &str, role: Role, primary: Selection) -> Self {
        Self {
            name: name.to_owned(),
            source: SourceIdentity::Repository {
                owner: owner.to_owned(),
                repo: repo.to_owned(),
            },
            primary,
            fallback: None,
            role,
        }
    }

    #[must_use]
    fn with_fallback(mut self, fallback: Selection) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// The built-in dependency table, in processing order.
#[must_use]
pub fn default_dependencies() -> Vec<DependencySpec> {
    vec![
        DependencySpec::github(
            "sigpatches",
            "ITotalJustice",
            "patches",
            Role::SigPatches,
            Selection::unpacked(NameRule::suffix(".zip"), Extraction::Tree),
        ),
        DependencySpec::github(
            "fusee",
            "Atmosphere-NX",
            "Atmosphere",
            Role::Bootloader,
            Selection::direct(NameRule::exact("fusee.bin")),
        )
        .with_fallback(Selection::unpacked(
            NameRule::suffix(".zip"),
            Extraction::Find(NameRule::exact("fusee.bin")),
        )),
        DependencySpec::github(
            "tesla-menu",
            "WerWolv",
            "Tesla-Menu",
            Role::OverlayApp,
            Selection::direct(NameRule::suffix(".nro")),
        )
        .with_fallback(Selection::unpacked(
            NameRule::suffix(".zip"),
            Extraction::Find(NameRule::contains("menu")),
        )),
        DependencySpec::github(
            "emuiibo",
            "XorTroll",
            "emuiibo",
            Role::CompanionApp,
            Selection::direct(NameRule::suffix(".nro")),
        )
        .with_fallback(Selection::unpacked(
            NameRule::suffix(".zip"),
            Extraction::Find(NameRule::contains("emuiibo")),
        )),
        DependencySpec::github(
            "daybreak",
            "mison20000",
            "daybreak",
            Role::SideloaderApp,
            Selection::direct(NameRule::suffix(".nro")),
        )
        .with_fallback(Selection::unpacked(
            NameRule::suffix(".zip"),
            Extraction::Find(NameRule::suffix(".nro")),
        )),
    ]
}

/// Sort dependencies into role order and check each role appears once.
///
/// # Errors
///
/// Returns [`BundleError::Manifest`] if the list is empty or two
/// dependencies claim the same role.
pub fn ordered(mut dependencies: Vec<DependencySpec>) -> Result<Vec<DependencySpec>> {
    if dependencies.is_empty() {
        return Err(BundleError::Manifest {
            reason: "no dependencies declared".to_owned(),
        });
    }
    dependencies.sort_by_key(|dependency| dependency.role);
    for pair in dependencies.windows(2) {
        if let [first, second] = pair {
            if first.role == second.role {
                return Err(BundleError::Manifest {
                    reason: format!(
                        "{} and {} both claim role {}",
                        first.name, second.name, first.role
                    ),
                });
            }
        }
    }
    Ok(dependencies)
}
