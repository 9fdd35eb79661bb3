//! Headless timing harness for lockscan's two stages.
//!
//! Follows the diagnose.rs pattern: self-contained, drives the library
//! directly. Times the immutable-file scan and the process correlation pass
//! separately and outputs the timing data as text or JSON.
//!
//! Run: sudo ./target/release/bench --iterations 20 --root /etc --json

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use lockscan::config::{Backend, ScanConfig};
use lockscan::data::attrs::filesystem_type;
use lockscan::data::correlator::correlate;
use lockscan::data::process::{ProcFs, ProcessSource};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "bench", about = "Benchmark lockscan scan and correlation stages")]
struct Cli {
    /// Number of timed iterations
    #[arg(short, long, default_value_t = 20)]
    iterations: usize,

    /// Number of warmup iterations (not timed)
    #[arg(short, long, default_value_t = 2)]
    warmup: usize,

    /// Directory to scan
    #[arg(short, long, default_value = "/")]
    root: PathBuf,

    /// Attribute query backend
    #[arg(short, long, value_enum, default_value_t = Backend::Native)]
    backend: Backend,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct BenchResult {
    iterations: usize,
    warmup: usize,
    root: String,
    immutable_files: usize,
    process_count: usize,
    findings: usize,
    scan: Stats,
    correlate: Stats,
    system: SystemMeta,
}

#[derive(Serialize)]
struct Stats {
    timings_us: Vec<f64>,
    min_us: f64,
    max_us: f64,
    mean_us: f64,
    median_us: f64,
    p95_us: f64,
    p99_us: f64,
    stddev_us: f64,
}

#[derive(Serialize)]
struct SystemMeta {
    kernel: String,
    arch: String,
    cpus: usize,
    /// Filesystem the scan root lives on; scan cost depends on it.
    root_fs: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    anyhow::ensure!(cli.iterations > 0, "--iterations must be at least 1");

    let scan_config = ScanConfig {
        root: cli.root.clone(),
        backend: cli.backend,
        ..Default::default()
    };
    let scanner = scan_config.scanner();
    let root = scan_config.resolved_root();
    let procfs = ProcFs::default();

    eprintln!("Running {} warmup iterations on {}...", cli.warmup, root.display());
    for _ in 0..cli.warmup {
        let set = scanner.scan(&root).context("warmup scan")?;
        correlate(&set, &procfs);
    }

    let mut scan_us = Vec::with_capacity(cli.iterations);
    let mut correlate_us = Vec::with_capacity(cli.iterations);
    let mut immutable_files = 0;
    let mut findings = 0;

    for i in 0..cli.iterations {
        let start = Instant::now();
        let set = scanner.scan(&root).context("timed scan")?;
        scan_us.push(start.elapsed().as_secs_f64() * 1_000_000.0);

        let start = Instant::now();
        let (found, _) = correlate(&set, &procfs);
        correlate_us.push(start.elapsed().as_secs_f64() * 1_000_000.0);

        immutable_files = set.len();
        findings = found.len();

        if !cli.json && (i + 1) % 5 == 0 {
            eprintln!(
                "  [{}/{}] scan {:.0} µs, correlate {:.0} µs, {} immutable",
                i + 1,
                cli.iterations,
                scan_us[i],
                correlate_us[i],
                immutable_files
            );
        }
    }

    let result = BenchResult {
        iterations: cli.iterations,
        warmup: cli.warmup,
        root: root.display().to_string(),
        immutable_files,
        process_count: procfs.list_pids().len(),
        findings,
        scan: compute_stats(scan_us),
        correlate: compute_stats(correlate_us),
        system: system_meta(&root),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        eprintln!("\n=== lockscan Benchmark Results ===");
        eprintln!("Iterations: {}", result.iterations);
        eprintln!("Immutable files: {}", result.immutable_files);
        eprintln!("Process count: {}", result.process_count);
        eprintln!("Findings: {}", result.findings);
        eprintln!(
            "Root filesystem: {} (kernel {}, {} cpus)",
            result.system.root_fs, result.system.kernel, result.system.cpus
        );
        print_stats("scan", &result.scan);
        print_stats("correlate", &result.correlate);
    }

    Ok(())
}

fn print_stats(stage: &str, s: &Stats) {
    eprintln!("\n[{stage}]");
    eprintln!("Min:    {:.1} µs", s.min_us);
    eprintln!("Max:    {:.1} µs", s.max_us);
    eprintln!("Mean:   {:.1} µs", s.mean_us);
    eprintln!("Median: {:.1} µs", s.median_us);
    eprintln!("P95:    {:.1} µs", s.p95_us);
    eprintln!("P99:    {:.1} µs", s.p99_us);
    eprintln!("Stddev: {:.1} µs", s.stddev_us);
}

/// Summarise a non-empty set of timings.
fn compute_stats(timings: Vec<f64>) -> Stats {
    let mut sorted = timings.clone();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len() as f64;
    let sum: f64 = sorted.iter().sum();
    let mean = sum / n;

    let variance: f64 = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

    Stats {
        min_us: sorted[0],
        max_us: sorted[sorted.len() - 1],
        mean_us: mean,
        median_us: percentile(&sorted, 50.0),
        p95_us: percentile(&sorted, 95.0),
        p99_us: percentile(&sorted, 99.0),
        stddev_us: variance.sqrt(),
        timings_us: timings,
    }
}

/// Linearly interpolated percentile of ascending samples.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

fn system_meta(root: &Path) -> SystemMeta {
    let kernel = std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());

    SystemMeta {
        kernel,
        arch: std::env::consts::ARCH.to_string(),
        cpus,
        root_fs: filesystem_type(root).unwrap_or_else(|| "unknown".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_over_known_samples() {
        let s = compute_stats(vec![4.0, 1.0, 3.0, 2.0, 5.0]);
        assert_eq!(s.min_us, 1.0);
        assert_eq!(s.max_us, 5.0);
        assert_eq!(s.mean_us, 3.0);
        assert_eq!(s.median_us, 3.0);
        assert!((s.p95_us - 4.8).abs() < 1e-9);
        assert!((s.p99_us - 4.96).abs() < 1e-9);
        assert!((s.stddev_us - 2.0_f64.sqrt()).abs() < 1e-9);
        // Raw timings keep iteration order.
        assert_eq!(s.timings_us, vec![4.0, 1.0, 3.0, 2.0, 5.0]);
    }

    #[test]
    fn single_sample_percentiles() {
        let s = compute_stats(vec![7.5]);
        assert_eq!(s.median_us, 7.5);
        assert_eq!(s.p95_us, 7.5);
        assert_eq!(s.stddev_us, 0.0);
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let sorted = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&sorted, 0.0), 10.0);
        assert_eq!(percentile(&sorted, 50.0), 25.0);
        assert_eq!(percentile(&sorted, 100.0), 40.0);
    }

    #[test]
    fn system_meta_names_root_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let meta = system_meta(&std::fs::canonicalize(dir.path()).unwrap());
        assert_ne!(meta.root_fs, "unknown");
        assert!(meta.cpus >= 1);
    }
}
