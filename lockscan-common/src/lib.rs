//! Shared data model for lockscan.
//!
//! These types carry the result of one snapshot: the set of immutable files
//! seen by the scanner, the per-process view produced by the enumerator, and
//! the findings the correlator derives from both. Nothing here performs I/O.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Process identifier as it appears in procfs.
pub type Pid = u32;

/// Paths observed with the immutable attribute set at scan time.
///
/// The set is built once through [`FromIterator`] and only exposes read
/// operations afterwards, so it can be handed to the correlation pass (or
/// shared between workers) without further synchronisation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImmutableFileSet {
    paths: BTreeSet<PathBuf>,
}

impl ImmutableFileSet {
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Iterate paths in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }
}

impl FromIterator<PathBuf> for ImmutableFileSet {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

/// What the enumerator could learn about one process.
///
/// Every field is best-effort: a process that exited between listing and
/// inspection, or one we may not look at, yields an empty command line
/// and/or no open files rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: Pid,
    /// Arguments joined with spaces; empty if unreadable.
    pub cmdline: String,
    /// Absolute paths behind the process's descriptors, in descriptor order.
    pub open_files: Vec<PathBuf>,
}

impl ProcessRecord {
    pub fn empty(pid: Pid) -> Self {
        Self {
            pid,
            ..Default::default()
        }
    }
}

/// A live process holding an immutable file open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub pid: Pid,
    pub cmdline: String,
    pub path: PathBuf,
}
