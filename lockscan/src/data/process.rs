use std::fs;
use std::path::{Path, PathBuf};

use lockscan_common::{Pid, ProcessRecord};

/// Default procfs mount point.
pub const PROC_ROOT: &str = "/proc";

/// Enumerates live processes and what they have open.
///
/// Implementations never fail for a single process: anything unreadable
/// degrades to missing data so one vanished or protected process cannot
/// abort the run.
pub trait ProcessSource {
    fn list_pids(&self) -> Vec<Pid>;
    fn describe(&self, pid: Pid) -> ProcessRecord;
}

/// Reads process information from a procfs mount.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(PROC_ROOT)
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_cmdline(&self, pid: Pid) -> String {
        match fs::read(self.root.join(pid.to_string()).join("cmdline")) {
            Ok(raw) => String::from_utf8_lossy(&raw)
                .replace('\0', " ")
                .trim()
                .to_string(),
            Err(e) => {
                log::debug!("pid {pid}: cmdline unreadable: {e}");
                String::new()
            }
        }
    }

    fn read_open_files(&self, pid: Pid) -> Vec<PathBuf> {
        let fd_dir = self.root.join(pid.to_string()).join("fd");
        let entries = match fs::read_dir(&fd_dir) {
            Ok(e) => e,
            Err(e) => {
                log::debug!("pid {pid}: fd table unreadable: {e}");
                return Vec::new();
            }
        };

        let mut fds: Vec<(u32, PathBuf)> = entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let fd: u32 = entry.file_name().to_str()?.parse().ok()?;
                // The descriptor may be closed between readdir and readlink.
                let target = fs::read_link(entry.path()).ok()?;
                Some((fd, target))
            })
            .collect();
        fds.sort_by_key(|(fd, _)| *fd);

        // Sockets, pipes and anon inodes resolve to "type:[inode]" rather
        // than a filesystem path.
        fds.into_iter()
            .map(|(_, target)| target)
            .filter(|target| target.is_absolute())
            .collect()
    }
}

impl ProcessSource for ProcFs {
    fn list_pids(&self) -> Vec<Pid> {
        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) => {
                log::debug!("cannot list {}: {e}", self.root.display());
                return Vec::new();
            }
        };

        let mut pids: Vec<Pid> = entries
            .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        pids
    }

    fn describe(&self, pid: Pid) -> ProcessRecord {
        ProcessRecord {
            pid,
            cmdline: self.read_cmdline(pid),
            open_files: self.read_open_files(pid),
        }
    }
}
