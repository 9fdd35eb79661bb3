use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::ScanError;

/// `FS_IMMUTABLE_FL` from `<linux/fs.h>`.
pub const FS_IMMUTABLE_FL: libc::c_long = 0x0000_0010;

// FS_IOC_GETFLAGS is declared as _IOR('f', 1, long).
nix::ioctl_read!(fs_ioc_getflags, b'f', 1, libc::c_long);

/// "Given a path, report whether its immutable flag is set."
pub trait AttrQuery {
    /// Query one entry. Errors are per-entry and the scanner skips them.
    fn is_immutable(&self, path: &Path) -> io::Result<bool>;

    /// Check that the mechanism works at all for `root` before walking it.
    fn probe(&self, _root: &Path) -> Result<(), ScanError> {
        Ok(())
    }
}

/// Native attribute query through the `FS_IOC_GETFLAGS` ioctl.
#[derive(Debug, Clone, Copy, Default)]
pub struct IoctlAttrs;

impl IoctlAttrs {
    fn open(path: &Path) -> io::Result<File> {
        // O_NONBLOCK keeps a FIFO that raced into place from blocking the walk.
        OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOFOLLOW)
            .open(path)
    }

    fn read_flags(file: &File) -> io::Result<libc::c_long> {
        let mut flags: libc::c_long = 0;
        // SAFETY: the descriptor stays open for the duration of the call and
        // `flags` is a valid, writable c_long.
        unsafe { fs_ioc_getflags(file.as_raw_fd(), &mut flags) }?;
        Ok(flags)
    }
}

impl AttrQuery for IoctlAttrs {
    fn is_immutable(&self, path: &Path) -> io::Result<bool> {
        let file = Self::open(path)?;
        match Self::read_flags(&file) {
            Ok(flags) => Ok(has_immutable_flag(flags)),
            // No attribute support on this filesystem means nothing here
            // can carry the flag.
            Err(e) if lacks_attr_support(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn probe(&self, root: &Path) -> Result<(), ScanError> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(root)
            .map_err(|source| ScanError::RootInaccessible {
                path: root.to_path_buf(),
                source,
            })?;

        match Self::read_flags(&file) {
            Ok(_) => Ok(()),
            Err(source) if lacks_attr_support(&source) => Err(ScanError::Unsupported {
                path: root.to_path_buf(),
                source,
            }),
            Err(source) => Err(ScanError::RootInaccessible {
                path: root.to_path_buf(),
                source,
            }),
        }
    }
}

pub fn has_immutable_flag(flags: libc::c_long) -> bool {
    flags & FS_IMMUTABLE_FL != 0
}

fn lacks_attr_support(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENOTTY | libc::EOPNOTSUPP | libc::EINVAL | libc::ENOSYS)
    )
}

/// Mount table of the calling process.
pub const MOUNTS: &str = "/proc/self/mounts";

/// Filesystem type of the mount holding `path`, e.g. `ext4` or `tmpfs`.
pub fn filesystem_type(path: &Path) -> Option<String> {
    let mounts = fs::read_to_string(MOUNTS).ok()?;
    mount_fs_type(&mounts, path).map(str::to_string)
}

/// Pick the deepest mount point containing `path` from a mounts table.
/// Later lines win ties, matching an over-mount.
pub fn mount_fs_type<'a>(mounts: &'a str, path: &Path) -> Option<&'a str> {
    mounts
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(' ');
            let _source = fields.next()?;
            let target = unescape_mount_field(fields.next()?);
            let fstype = fields.next()?;
            Some((target, fstype))
        })
        .filter(|(target, _)| path.starts_with(target))
        .max_by_key(|(target, _)| target.components().count())
        .map(|(_, fstype)| fstype)
}

// The kernel writes space, tab, newline and backslash as octal escapes.
fn unescape_mount_field(field: &str) -> PathBuf {
    PathBuf::from(
        field
            .replace("\\040", " ")
            .replace("\\011", "\t")
            .replace("\\012", "\n")
            .replace("\\134", "\\"),
    )
}
