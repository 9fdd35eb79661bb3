use std::path::PathBuf;

use lockscan_common::{Finding, ImmutableFileSet};

use super::process::ProcessSource;
use super::scanner::ImmutableSource;
use crate::error::ScanError;

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// The scan succeeded but nothing under the root is immutable.
    /// Processes were not enumerated.
    NoImmutableFiles,
    Completed {
        immutable: ImmutableFileSet,
        /// Process enumeration order, then descriptor order. A file held
        /// through several descriptors appears once per descriptor.
        findings: Vec<Finding>,
        processes_examined: usize,
    },
}

impl Report {
    pub fn findings(&self) -> &[Finding] {
        match self {
            Report::NoImmutableFiles => &[],
            Report::Completed { findings, .. } => findings,
        }
    }
}

/// Orchestrates one snapshot: scan once, then walk every process.
///
/// Strictly sequential. The immutable set is built before any process is
/// looked at and is only read afterwards.
pub struct Correlator<'a> {
    scanner: &'a dyn ImmutableSource,
    processes: &'a dyn ProcessSource,
    root: PathBuf,
}

impl<'a> Correlator<'a> {
    pub fn new(
        scanner: &'a dyn ImmutableSource,
        processes: &'a dyn ProcessSource,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            scanner,
            processes,
            root: root.into(),
        }
    }

    /// Find every process holding an immutable file open.
    ///
    /// A scan failure is returned as-is and no process is inspected.
    pub fn run(&self) -> Result<Report, ScanError> {
        let immutable = self.scanner.scan(&self.root)?;
        if immutable.is_empty() {
            log::debug!("no immutable files under {}", self.root.display());
            return Ok(Report::NoImmutableFiles);
        }
        log::debug!(
            "{} immutable files under {}; inspecting processes",
            immutable.len(),
            self.root.display()
        );

        let (findings, processes_examined) = correlate(&immutable, self.processes);
        Ok(Report::Completed {
            immutable,
            findings,
            processes_examined,
        })
    }
}

/// Intersect every process's open files with `immutable`.
///
/// Returns the findings and how many processes were examined.
pub fn correlate(
    immutable: &ImmutableFileSet,
    processes: &dyn ProcessSource,
) -> (Vec<Finding>, usize) {
    let pids = processes.list_pids();
    let mut findings = Vec::new();

    for &pid in &pids {
        let record = processes.describe(pid);
        for path in record.open_files {
            if immutable.contains(&path) {
                findings.push(Finding {
                    pid,
                    cmdline: record.cmdline.clone(),
                    path,
                });
            }
        }
    }

    (findings, pids.len())
}
