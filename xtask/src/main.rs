use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Crate and binary that become the Lambda's `bootstrap`.
const LAMBDA_CRATE: &str = "orient_lambda";
/// Entry name the `provided.al2023` runtime executes.
const BOOTSTRAP_ENTRY: &str = "bootstrap";

#[derive(Parser)]
#[command(name = "xtask", about = "Packaging and CI for the S3 auto-orient Lambda")]
struct Cli {
    #[command(subcommand)]
    command: Task,
}

#[derive(Subcommand)]
enum Task {
    /// Cross-build orient_lambda and zip it for upload
    Package {
        /// Target triple of the Lambda execution environment
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        /// Ship an unoptimized build
        #[arg(long)]
        debug: bool,
        /// Where `orient_lambda.zip` is written
        #[arg(long, default_value = "dist")]
        out_dir: PathBuf,
    },
    /// Run the checks CI runs
    Ci {
        #[arg(value_enum, default_value_t = CiJob::All)]
        job: CiJob,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CiJob {
    /// rustfmt and clippy
    Lint,
    /// Workspace tests
    Test,
    All,
}

type TaskResult = Result<(), String>;

fn cargo(args: &[&str]) -> TaskResult {
    eprintln!("+ cargo {}", args.join(" "));
    let status = Command::new("cargo")
        .args(args)
        .status()
        .map_err(|error| format!("could not start cargo: {error}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("`cargo {}` exited with {status}", args.join(" ")))
    }
}

/// Fails early when the Lambda target has not been added with rustup. A
/// missing rustup is not fatal; cargo reports the problem itself.
fn check_target(target: &str) -> TaskResult {
    let Ok(output) = Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output()
    else {
        return Ok(());
    };

    let installed = String::from_utf8_lossy(&output.stdout);
    if installed.lines().any(|line| line.trim() == target) {
        Ok(())
    } else {
        Err(format!(
            "rust target `{target}` is missing; run `rustup target add {target}` first"
        ))
    }
}

fn package(target: &str, debug: bool, out_dir: &Path) -> TaskResult {
    check_target(target)?;

    let mut args = vec!["build", "-p", LAMBDA_CRATE, "--bin", LAMBDA_CRATE, "--target", target];
    if !debug {
        args.push("--release");
    }
    cargo(&args)?;

    let profile_dir = if debug { "debug" } else { "release" };
    let binary_path = Path::new("target")
        .join(target)
        .join(profile_dir)
        .join(LAMBDA_CRATE);
    let binary = fs::read(&binary_path)
        .map_err(|error| format!("cannot read {}: {error}", binary_path.display()))?;

    fs::create_dir_all(out_dir)
        .map_err(|error| format!("cannot create {}: {error}", out_dir.display()))?;
    let zip_path = out_dir.join(format!("{LAMBDA_CRATE}.zip"));
    write_bootstrap_zip(&zip_path, &binary)
        .map_err(|error| format!("cannot write {}: {error}", zip_path.display()))?;

    eprintln!(
        "packaged {} ({BOOTSTRAP_ENTRY}, {} bytes, {target})",
        zip_path.display(),
        binary.len()
    );
    Ok(())
}

fn write_bootstrap_zip(zip_path: &Path, binary: &[u8]) -> zip::result::ZipResult<()> {
    let mut zip = ZipWriter::new(fs::File::create(zip_path)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file(BOOTSTRAP_ENTRY, options)?;
    zip.write_all(binary)?;
    zip.finish()?;
    Ok(())
}

fn lint() -> TaskResult {
    cargo(&["fmt", "--all", "--", "--check"])?;
    cargo(&["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])
}

fn test() -> TaskResult {
    cargo(&["test", "-p", "orient_core"])?;
    cargo(&["test", "-p", LAMBDA_CRATE])?;
    cargo(&["test", "-p", "xtask"])
}

fn main() -> ExitCode {
    let result = match Cli::parse().command {
        Task::Package {
            target,
            debug,
            out_dir,
        } => package(&target, debug, &out_dir),
        Task::Ci { job: CiJob::Lint } => lint(),
        Task::Ci { job: CiJob::Test } => test(),
        Task::Ci { job: CiJob::All } => lint().and_then(|()| test()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("xtask: {message}");
            ExitCode::FAILURE
        }
    }
}
