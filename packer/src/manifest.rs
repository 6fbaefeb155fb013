//! TOML dependency manifests.
//!
//! A manifest replaces the built-in dependency table. Each entry names its
//! role, its upstream source, an ordered selector, and optionally an
//! extraction mode and a single fallback:
//!
//! ```toml
//! [[dependency]]
//! name = "emuiibo"
//! role = "companion-app"
//! repository = "XorTroll/emuiibo"
//! select = [{ suffix = ".nro" }]
//!
//! [dependency.fallback]
//! select = [{ suffix = ".zip" }]
//! extract = { contains = "emuiibo" }
//! ```

use crate::dependency::{
    AssetSelector, DependencySpec, Extraction, NameRule, Role, Selection, SourceIdentity, ordered,
};
use crate::error::{BundleError, Result};
use crate::layout::{Placement, placement};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default, rename = "dependency")]
    dependencies: Vec<RawDependency>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDependency {
    name: String,
    role: Role,
    repository: Option<String>,
    url: Option<String>,
    select: Vec<NameRule>,
    #[serde(default)]
    extract: Option<RawExtract>,
    #[serde(default)]
    fallback: Option<RawSelection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSelection {
    select: Vec<NameRule>,
    #[serde(default)]
    extract: Option<RawExtract>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawExtract {
    Tree,
    Suffix(String),
    Contains(String),
    Exact(String),
}

impl From<Option<RawExtract>> for Extraction {
    fn from(raw: Option<RawExtract>) -> Self {
        match raw {
            None => Self::None,
            Some(RawExtract::Tree) => Self::Tree,
            Some(RawExtract::Suffix(value)) => Self::Find(NameRule::Suffix(value)),
            Some(RawExtract::Contains(value)) => Self::Find(NameRule::Contains(value)),
            Some(RawExtract::Exact(value)) => Self::Find(NameRule::Exact(value)),
        }
    }
}

/// Parse a manifest document into an ordered dependency list.
///
/// # Errors
///
/// Returns [`BundleError::Manifest`] if the document is not valid TOML, an
/// entry names both or neither of `repository` and `url`, a selector is
/// empty, or two entries claim the same role.
///
/// # Examples
///
/// ```
/// use atmo_packer::dependency::Role;
/// use atmo_packer::manifest::parse_manifest;
///
/// let deps = parse_manifest(r#"
///     [[dependency]]
///     name = "daybreak"
///     role = "sideloader-app"
///     repository = "mison20000/daybreak"
///     select = [{ suffix = ".nro" }]
/// "#).unwrap();
/// assert_eq!(deps[0].role, Role::SideloaderApp);
/// ```
pub fn parse_manifest(contents: &str) -> Result<Vec<DependencySpec>> {
    let raw: RawManifest = toml::from_str(contents).map_err(|e| BundleError::Manifest {
        reason: e.to_string(),
    })?;
    let dependencies = raw
        .dependencies
        .into_iter()
        .map(convert_dependency)
        .collect::<Result<Vec<_>>>()?;
    ordered(dependencies)
}

/// Read and parse a manifest file.
///
/// # Errors
///
/// Returns [`BundleError::Io`] if the file cannot be read, or any error
/// from [`parse_manifest`].
pub fn load_manifest(path: &Path) -> Result<Vec<DependencySpec>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| BundleError::io(format!("failed to read manifest {}", path.display()), e))?;
    parse_manifest(&contents)
}

fn convert_dependency(raw: RawDependency) -> Result<DependencySpec> {
    let source = match (raw.repository.as_deref(), raw.url) {
        (Some(repository), None) => SourceIdentity::repository(repository)?,
        (None, Some(url)) => SourceIdentity::Url(url),
        _ => {
            return Err(BundleError::Manifest {
                reason: format!("{} must set exactly one of repository or url", raw.name),
            });
        }
    };
    let primary = convert_selection(raw.select, raw.extract)?;
    let fallback = raw
        .fallback
        .map(|fallback| convert_selection(fallback.select, fallback.extract))
        .transpose()?;
    let merges_tree = std::iter::once(&primary)
        .chain(fallback.as_ref())
        .any(|selection| selection.extraction == Extraction::Tree);
    if merges_tree && placement(raw.role) != Placement::Root {
        return Err(BundleError::Manifest {
            reason: format!(
                "{} extracts a whole tree, but role {} takes a single file",
                raw.name, raw.role
            ),
        });
    }
    Ok(DependencySpec {
        name: raw.name,
        source,
        primary,
        fallback,
        role: raw.role,
    })
}

fn convert_selection(select: Vec<NameRule>, extract: Option<RawExtract>) -> Result<Selection> {
    Ok(Selection {
        selector: AssetSelector::new(select)?,
        extraction: Extraction::from(extract),
    })
}
