use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// The immutable-file scan could not produce a set at all.
///
/// This is distinct from a scan that completed and found nothing: callers
/// must report it as "could not determine" and stop.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan root {path} is not accessible: {source}")]
    RootInaccessible { path: PathBuf, source: io::Error },

    #[error("immutable attribute query is not supported at {path}: {source}")]
    Unsupported { path: PathBuf, source: io::Error },

    #[error("attribute listing tool {program} could not be started: {source}")]
    ToolUnavailable { program: String, source: io::Error },

    #[error("{program} failed ({status}) without listing any entries: {stderr}")]
    ToolFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// The caller lacks the privilege needed to inspect every process.
#[derive(Debug, Error)]
#[error(
    "lockscan requires root privileges to inspect other processes \
     (effective uid is {euid}); please run it as root"
)]
pub struct PrivilegeError {
    pub euid: u32,
}
