use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use lockscan::config::{Backend, Config};
use lockscan::data::correlator::Correlator;
use lockscan::data::process::ProcFs;
use lockscan::output::{self, OutputFormat};
use lockscan::error::PrivilegeError;
use lockscan::privilege;

/// sysexits.h EX_NOPERM.
const EXIT_NO_PERMISSION: u8 = 77;

#[derive(Parser)]
#[command(
    name = "lockscan",
    about = "Find processes holding immutable files open"
)]
struct Cli {
    /// Directory to search for immutable files
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Skip this path prefix during the search (repeatable; replaces the configured list)
    #[arg(short, long = "exclude", value_name = "PATH")]
    exclude: Vec<PathBuf>,

    /// Do not descend into other filesystems
    #[arg(short = 'x', long)]
    one_file_system: bool,

    /// How to query the immutable attribute
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// procfs mount to read processes from
    #[arg(long, value_name = "PATH")]
    proc_root: Option<PathBuf>,

    /// Config file (default: ~/.config/lockscan/config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Gate before touching anything: an unprivileged run would silently miss
    // most processes.
    if let Err(e) = privilege::require_root() {
        eprintln!("{}", denied_message(&e));
        return ExitCode::from(EXIT_NO_PERMISSION);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn denied_message(e: &PrivilegeError) -> String {
    format!("error: {e}")
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // CLI overrides
    if let Some(root) = cli.root {
        config.scan.root = root;
    }
    if !cli.exclude.is_empty() {
        config.scan.exclude = cli.exclude;
    }
    if cli.one_file_system {
        config.scan.one_file_system = true;
    }
    if let Some(backend) = cli.backend {
        config.scan.backend = backend;
    }
    if let Some(format) = cli.format {
        config.output.format = format;
    }
    if let Some(proc_root) = cli.proc_root {
        config.process.proc_root = proc_root;
    }

    let scanner = config.scan.scanner();
    let procfs = ProcFs::new(&config.process.proc_root);
    let root = config.scan.resolved_root();
    log::debug!(
        "scanning {} with {:?} backend, excluding {:?}",
        root.display(),
        config.scan.backend,
        config.scan.exclude
    );

    let report = Correlator::new(scanner.as_ref(), &procfs, root)
        .run()
        .context("could not determine immutable files")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    output::render(&report, config.output.format, &mut out).context("writing report")?;
    out.flush().context("writing report")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_failure_uses_error_prefix() {
        let msg = denied_message(&PrivilegeError { euid: 1000 });
        assert!(msg.starts_with("error: lockscan requires root privileges"));
        assert!(msg.contains("effective uid is 1000"));
    }
}
