//! Console output for the bundle builder.
//!
//! Progress lines go to an injected writer (stderr in production) so tests
//! can capture them; dry-run plans and the final summary are formatted here.

use crate::dependency::DependencySpec;
use crate::layout::{Placement, placement};
use camino::Utf8Path;
use std::fmt::Display;
use std::io::Write;

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort progress output; ignore write failures.
    }
}

/// Format the message printed after a successful build.
#[must_use]
pub fn success_message(count: usize, archive_path: &Utf8Path) -> String {
    let plural = if count == 1 {
        "dependency"
    } else {
        "dependencies"
    };
    format!("Bundle with {count} {plural} written to {archive_path}")
}

/// Describe where a dependency lands in the output tree.
#[must_use]
pub fn destination_label(dependency: &DependencySpec) -> String {
    match placement(dependency.role) {
        Placement::Root => "/ (archive contents, verbatim)".to_owned(),
        Placement::File { dir, file_name } => {
            let name = file_name.unwrap_or("<asset name>");
            if dir.is_empty() {
                format!("/{name}")
            } else {
                format!("/{dir}/{name}")
            }
        }
    }
}

/// Settings and dependencies shown by a dry run.
///
/// # Example
///
/// ```
/// use atmo_packer::dependency::default_dependencies;
/// use atmo_packer::output::DryRunInfo;
/// use camino::Utf8PathBuf;
///
/// let archive = Utf8PathBuf::from("/work/Switch_Atmo_Integration_Pack.zip");
/// let deps = default_dependencies();
/// let info = DryRunInfo {
///     archive_path: &archive,
///     api_base: "https://api.github.com",
///     authenticated: false,
///     dependencies: &deps,
/// };
///
/// let text = info.display_text();
/// assert!(text.contains("Dry run"));
/// assert!(text.contains("XorTroll/emuiibo"));
/// ```
#[derive(Debug)]
pub struct DryRunInfo<'a> {
    /// Where the archive would be written.
    pub archive_path: &'a Utf8Path,
    /// Release-feed endpoint.
    pub api_base: &'a str,
    /// Whether feed requests carry a token.
    pub authenticated: bool,
    /// Dependencies in processing order.
    pub dependencies: &'a [DependencySpec],
}

impl DryRunInfo<'_> {
    /// Format the dry-run information for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        let mut lines = vec![
            "Dry run - nothing will be downloaded or written".to_owned(),
            String::new(),
            format!("Archive: {}", self.archive_path),
            format!("Release feed: {}", self.api_base),
            format!("Authenticated: {}", self.authenticated),
            String::new(),
            "Dependencies:".to_owned(),
        ];

        for (index, dependency) in self.dependencies.iter().enumerate() {
            lines.push(format!(
                "  {}. {} [{}] from {}",
                index + 1,
                dependency.name,
                dependency.role,
                dependency.source
            ));
            lines.push(format!(
                "     select {}; {}",
                dependency.primary.selector, dependency.primary.extraction
            ));
            if let Some(fallback) = &dependency.fallback {
                lines.push(format!(
                    "     fallback {}; {}",
                    fallback.selector, fallback.extraction
                ));
            }
            lines.push(format!("     -> {}", destination_label(dependency)));
        }

        lines.join("\n")
    }
}
