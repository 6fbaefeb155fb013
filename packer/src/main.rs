//! Atmosphère bundle builder CLI entrypoint.
//!
//! This binary resolves the configured dependencies, assembles the SD card
//! tree and writes the bundle archive, reporting progress on stderr.

use atmo_packer::archive::ZipCodec;
use atmo_packer::cli::Cli;
use atmo_packer::config::PackConfig;
use atmo_packer::dependency::{DependencySpec, ordered};
use atmo_packer::error::Result;
use atmo_packer::output::{DryRunInfo, success_message, write_stderr_line};
use atmo_packer::pipeline::PipelineOrchestrator;
use atmo_packer::transport::UreqTransport;
use clap::Parser;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Initialise `env_logger`, letting `RUST_LOG` override the CLI level.
fn init_logging(cli: &Cli) {
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<()> {
    let config = PackConfig::from_cli(cli);
    let dependencies = ordered(config.dependencies()?)?;

    // Dry-run mode: show the plan without network or filesystem access
    if cli.dry_run {
        print_dry_run_info(&config, &dependencies, stderr);
        return Ok(());
    }

    let transport = UreqTransport::new(config.token.clone());
    let codec = ZipCodec;
    let mut orchestrator = PipelineOrchestrator::new(
        &transport,
        &codec,
        &config.api_base,
        config.dirs.clone(),
        config.archive_path.as_std_path(),
    )
    .quiet(config.quiet);

    let build = orchestrator.run(&dependencies, stderr)?;
    if !config.quiet {
        write_stderr_line(stderr, "");
        write_stderr_line(
            stderr,
            success_message(build.placed.len(), &config.archive_path),
        );
    }
    Ok(())
}

fn print_dry_run_info(
    config: &PackConfig,
    dependencies: &[DependencySpec],
    stderr: &mut dyn Write,
) {
    let info = DryRunInfo {
        archive_path: &config.archive_path,
        api_base: &config.api_base,
        authenticated: config.authenticated(),
        dependencies,
    };
    write_stderr_line(stderr, info.display_text());
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atmo_packer::error::BundleError;
    use camino::Utf8PathBuf;

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_error_and_returns_one() {
        let err = BundleError::RateLimited {
            url: "https://api.github.com/repos/XorTroll/emuiibo/releases/latest".to_owned(),
        };

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.starts_with("error: "));
        assert!(stderr_text.contains("rate limit"));
    }

    #[test]
    fn dry_run_lists_plan_without_touching_work_dir() {
        let work_dir = tempfile::TempDir::new().expect("temp dir");
        let cli = Cli {
            work_dir: Utf8PathBuf::try_from(work_dir.path().to_path_buf()).expect("utf-8 path"),
            dry_run: true,
            ..Cli::default()
        };

        let mut stderr = Vec::new();
        run(&cli, &mut stderr).expect("dry run succeeds");

        let text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(text.contains("Dry run"));
        assert!(text.contains("ITotalJustice/patches"));
        let leftovers = std::fs::read_dir(work_dir.path()).expect("read work dir").count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn invalid_manifest_is_reported_before_any_work() {
        let work_dir = tempfile::TempDir::new().expect("temp dir");
        let manifest = work_dir.path().join("deps.toml");
        std::fs::write(&manifest, "[[dependency]]\nname = 1\n").expect("write manifest");
        let cli = Cli {
            work_dir: Utf8PathBuf::try_from(work_dir.path().to_path_buf()).expect("utf-8 path"),
            manifest: Some(Utf8PathBuf::try_from(manifest).expect("utf-8 path")),
            ..Cli::default()
        };

        let err = run(&cli, &mut Vec::new()).expect_err("manifest is invalid");

        assert!(matches!(err, BundleError::Manifest { .. }));
        assert!(!work_dir.path().join("SD_ROOT").exists());
    }
}
