use std::ffi::OsStr;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use lockscan_common::ImmutableFileSet;
use walkdir::WalkDir;

use super::attrs::AttrQuery;
use crate::error::ScanError;

/// Produces the reference set of immutable files under a root.
pub trait ImmutableSource {
    fn scan(&self, root: &Path) -> Result<ImmutableFileSet, ScanError>;
}

/// Which parts of the tree a scan skips.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Path prefixes pruned from the walk (virtual or volatile mounts).
    pub exclude: Vec<PathBuf>,
    /// Do not cross into other filesystems below the root.
    pub one_file_system: bool,
}

impl WalkOptions {
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclude.iter().any(|prefix| path.starts_with(prefix))
    }

    /// The options that apply to a walk starting at `root`.
    ///
    /// Prefixes equal to or above the root are dropped: asking for a subtree
    /// of an excluded mount scans that subtree. Only prefixes strictly below
    /// the root still prune.
    pub fn below(&self, root: &Path) -> WalkOptions {
        WalkOptions {
            exclude: self
                .exclude
                .iter()
                .filter(|prefix| !root.starts_with(prefix))
                .cloned()
                .collect(),
            one_file_system: self.one_file_system,
        }
    }
}

/// Walks the tree itself and asks an [`AttrQuery`] about every regular file.
///
/// Symlinks are never followed or queried: the attribute lives on the
/// target, and the walk reaches the target on its own if it is under root.
pub struct WalkScanner<A> {
    attrs: A,
    options: WalkOptions,
}

impl<A: AttrQuery> WalkScanner<A> {
    pub fn new(attrs: A, options: WalkOptions) -> Self {
        Self { attrs, options }
    }
}

impl<A: AttrQuery> ImmutableSource for WalkScanner<A> {
    fn scan(&self, root: &Path) -> Result<ImmutableFileSet, ScanError> {
        fs::symlink_metadata(root).map_err(|source| ScanError::RootInaccessible {
            path: root.to_path_buf(),
            source,
        })?;
        self.attrs.probe(root)?;

        let options = self.options.below(root);
        let walker = WalkDir::new(root)
            .follow_links(false)
            .same_file_system(options.one_file_system)
            .into_iter()
            .filter_entry(|e| !options.is_excluded(e.path()));

        let mut found = Vec::new();
        let mut visited = 0usize;
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::debug!("walk: skipping entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            visited += 1;

            match self.attrs.is_immutable(entry.path()) {
                Ok(true) if still_present(entry.path()) => found.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => log::debug!("attrs: skipping {}: {e}", entry.path().display()),
            }
        }

        log::debug!(
            "scanned {visited} files under {}, {} immutable",
            root.display(),
            found.len()
        );
        Ok(found.into_iter().collect())
    }
}

/// Runs `lsattr -R` and keeps the entries whose flags include `i`.
pub struct LsattrScanner {
    program: String,
    options: WalkOptions,
}

impl LsattrScanner {
    pub fn new(options: WalkOptions) -> Self {
        Self::with_program("lsattr", options)
    }

    pub fn with_program(program: impl Into<String>, options: WalkOptions) -> Self {
        Self {
            program: program.into(),
            options,
        }
    }
}

impl ImmutableSource for LsattrScanner {
    fn scan(&self, root: &Path) -> Result<ImmutableFileSet, ScanError> {
        fs::symlink_metadata(root).map_err(|source| ScanError::RootInaccessible {
            path: root.to_path_buf(),
            source,
        })?;

        let output = Command::new(&self.program)
            .arg("-R")
            .arg(root)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ScanError::ToolUnavailable {
                program: self.program.clone(),
                source,
            })?;

        // lsattr exits non-zero whenever any single entry could not be read,
        // which is the normal case for a whole-system listing.
        if !output.status.success() {
            if output.stdout.is_empty() {
                return Err(ScanError::ToolFailed {
                    program: self.program.clone(),
                    status: output.status,
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            log::debug!(
                "{} exited with {}; keeping partial listing",
                self.program,
                output.status
            );
        }

        let options = self.options.below(root);
        Ok(parse_listing(&output.stdout)
            .into_iter()
            .filter(|p| !options.is_excluded(p))
            .filter(|p| still_present(p))
            .collect())
    }
}

/// Extract the immutable entries from `lsattr -R` output.
///
/// Entry lines are `<flags> <path>`. Directory headers (`/dir:`) and blank
/// lines are skipped, and so is anything whose first field is not a flag
/// string. Paths are returned with repeated separators collapsed, since
/// lsattr prints `//etc` when asked to list `/`.
pub fn parse_listing(stdout: &[u8]) -> Vec<PathBuf> {
    stdout
        .split(|&b| b == b'\n')
        .filter_map(|line| {
            let sep = line.iter().position(|&b| b == b' ')?;
            let (flags, rest) = (&line[..sep], &line[sep + 1..]);
            if flags.is_empty()
                || rest.is_empty()
                || !flags.iter().all(|b| *b == b'-' || b.is_ascii_alphabetic())
            {
                return None;
            }
            if !flags.contains(&b'i') {
                return None;
            }
            Some(Path::new(OsStr::from_bytes(rest)).components().collect())
        })
        .collect()
}

/// The entry still exists as a regular file or symlink.
fn still_present(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_file() || m.file_type().is_symlink())
        .unwrap_or(false)
}
