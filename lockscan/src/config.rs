use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::data::attrs::IoctlAttrs;
use crate::data::process::PROC_ROOT;
use crate::data::scanner::{ImmutableSource, LsattrScanner, WalkOptions, WalkScanner};
use crate::output::OutputFormat;

/// Configuration loaded from ~/.config/lockscan/config.toml.
///
/// Every field has a default, so an absent file or a partial one is fine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Directory the immutable-file walk starts from.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Prefixes skipped during the walk.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<PathBuf>,
    /// Stay on the root's filesystem.
    #[serde(default)]
    pub one_file_system: bool,
    #[serde(default)]
    pub backend: Backend,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            exclude: default_exclude(),
            one_file_system: false,
            backend: Backend::default(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("/")
}

/// Pseudo-filesystems with no attribute support. tmpfs mounts such as /run
/// and /dev/shm carry real immutable flags, so they are walked.
fn default_exclude() -> Vec<PathBuf> {
    ["/proc", "/sys"]
        .into_iter()
        .map(PathBuf::from)
        .collect()
}

/// How the immutable attribute is queried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Walk the tree and issue FS_IOC_GETFLAGS per file.
    #[default]
    Native,
    /// Parse the output of `lsattr -R`.
    Lsattr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfig {
    /// procfs mount to read processes from.
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            proc_root: default_proc_root(),
        }
    }
}

fn default_proc_root() -> PathBuf {
    PathBuf::from(PROC_ROOT)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

impl Config {
    /// Load config from the default path, or return defaults if not found.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load config from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config from {}", path.display()))
    }
}

impl ScanConfig {
    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            exclude: self.exclude.clone(),
            one_file_system: self.one_file_system,
        }
    }

    /// Build the scanner for the configured backend.
    pub fn scanner(&self) -> Box<dyn ImmutableSource> {
        match self.backend {
            Backend::Native => Box::new(WalkScanner::new(IoctlAttrs, self.walk_options())),
            Backend::Lsattr => Box::new(LsattrScanner::new(self.walk_options())),
        }
    }

    /// Root to hand to the scanner.
    ///
    /// Canonicalized so that reported paths compare equal to the resolved
    /// targets procfs gives for open descriptors. A root that cannot be
    /// resolved is passed through untouched and the scan reports it.
    pub fn resolved_root(&self) -> PathBuf {
        fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone())
    }
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("lockscan")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.scan.root, PathBuf::from("/"));
        assert_eq!(config.scan.exclude, default_exclude());
        assert!(!config.scan.one_file_system);
        assert_eq!(config.scan.backend, Backend::Native);
        assert_eq!(config.process.proc_root, PathBuf::from("/proc"));
        assert_eq!(config.output.format, OutputFormat::Text);
    }

    #[test]
    fn default_exclusions_are_only_pseudo_filesystems() {
        assert_eq!(
            ScanConfig::default().exclude,
            vec![PathBuf::from("/proc"), PathBuf::from("/sys")]
        );
        let options = ScanConfig::default().walk_options();
        assert!(!options.is_excluded(Path::new("/run/lock/x")));
        assert!(!options.is_excluded(Path::new("/dev/shm/x")));
        assert!(options.is_excluded(Path::new("/proc/1/fd")));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [scan]
            root = "/srv"
            backend = "lsattr"

            [output]
            format = "jsonl"
            "#,
        )
        .unwrap();

        assert_eq!(config.scan.root, PathBuf::from("/srv"));
        assert_eq!(config.scan.backend, Backend::Lsattr);
        assert_eq!(config.scan.exclude, default_exclude());
        assert_eq!(config.output.format, OutputFormat::Jsonl);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = toml::from_str::<Config>("[scan]\nbackend = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn load_from_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scan\nroot = 1").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing config from"));
    }

    #[test]
    fn resolved_root_follows_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        let link = dir.path().join("link");
        fs::create_dir(&real).unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let scan = ScanConfig {
            root: link,
            ..Default::default()
        };
        assert_eq!(scan.resolved_root(), fs::canonicalize(&real).unwrap());
    }
}
