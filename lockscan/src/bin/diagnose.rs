//! Preflight check for every capability lockscan depends on.
//!
//! Exercises each step independently, printing PASS/FAIL with full error
//! details to stdout, so a failing run of `lockscan` can be traced to the
//! missing piece (privilege, procfs, attribute ioctl, lsattr).
//!
//! Run: sudo ./target/release/diagnose [ROOT]

use std::path::PathBuf;
use std::process::Command;

use lockscan::data::attrs::{filesystem_type, AttrQuery, IoctlAttrs};
use lockscan::data::process::{ProcFs, ProcessSource};
use lockscan::privilege;

fn main() {
    let root = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"));

    let mut tally = Tally::new(5);

    println!("=== lockscan Capability Diagnostic ===\n");

    // ── Step 1: Effective uid ─────────────────────────────────
    tally.step(1, "Effective uid is root");
    let step1 = privilege::require_root()
        .map(|()| "running as root".to_string())
        .map_err(|e| e.to_string());
    tally.record(&step1);

    // ── Step 2: Enumerate procfs ──────────────────────────────
    tally.step(2, "Enumerate /proc");
    let procfs = ProcFs::default();
    let pids = procfs.list_pids();
    let step2 = if pids.is_empty() {
        Err(format!("no pids listed under {}", procfs.root().display()))
    } else {
        Ok(format!("{} processes visible", pids.len()))
    };
    tally.record(&step2);

    // ── Step 3: Describe ourselves ────────────────────────────
    tally.step(3, "Resolve own cmdline and descriptors");
    let me = procfs.describe(std::process::id());
    println!("  cmdline: {:?}", me.cmdline);
    for path in me.open_files.iter().take(10) {
        println!("    open: {}", path.display());
    }
    let step3 = if me.cmdline.is_empty() {
        Err("own cmdline is empty; /proc/<pid>/cmdline unreadable".to_string())
    } else {
        Ok(format!("{} file-backed descriptors", me.open_files.len()))
    };
    tally.record(&step3);

    // Descriptors of other processes are the part that needs privilege.
    let foreign = pids
        .iter()
        .filter(|&&pid| pid != me.pid)
        .map(|&pid| procfs.describe(pid))
        .filter(|rec| !rec.open_files.is_empty())
        .count();
    println!(
        "  other processes with readable descriptors: {foreign}/{}\n",
        pids.len().saturating_sub(1)
    );

    // ── Step 4: FS_IOC_GETFLAGS on root ───────────────────────
    tally.step(4, &format!("FS_IOC_GETFLAGS on {}", root.display()));
    match filesystem_type(&root) {
        Some(fs) => println!("  filesystem: {fs}"),
        None => println!("  filesystem: not found in /proc/self/mounts"),
    }
    let step4 = IoctlAttrs
        .probe(&root)
        .map(|()| "attribute query supported".to_string())
        .map_err(|e| e.to_string());
    tally.record(&step4);

    // ── Step 5: lsattr available ──────────────────────────────
    tally.step(5, "lsattr available (lsattr backend)");
    let step5 = match Command::new("lsattr").arg("-d").arg(&root).output() {
        Ok(out) if out.status.success() => Ok(String::from_utf8_lossy(&out.stdout)
            .trim()
            .to_string()),
        Ok(out) => Err(format!(
            "lsattr exited with {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )),
        Err(e) => Err(format!("cannot run lsattr: {e}")),
    };
    tally.record(&step5);

    std::process::exit(tally.finish());
}

/// Running PASS/FAIL count over the numbered steps.
struct Tally {
    total: u32,
    pass: u32,
    fail: u32,
}

impl Tally {
    fn new(total: u32) -> Self {
        Self {
            total,
            pass: 0,
            fail: 0,
        }
    }

    fn step(&self, n: u32, desc: &str) {
        println!("[Step {n}/{}] {desc}", self.total);
    }

    fn record(&mut self, result: &Result<String, String>) {
        match result {
            Ok(msg) => {
                println!("  ✓ PASS: {msg}\n");
                self.pass += 1;
            }
            Err(msg) => {
                println!("  ✗ FAIL: {msg}\n");
                self.fail += 1;
            }
        }
    }

    /// Print the summary and return the process exit code.
    fn finish(&self) -> i32 {
        let skipped = self.total - self.pass - self.fail;
        println!(
            "=== Summary: {}/{} passed, {} failed{} ===",
            self.pass,
            self.total,
            self.fail,
            if skipped > 0 { format!(", {skipped} not run") } else { String::new() }
        );
        i32::from(self.fail > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_exit_code_reflects_failures() {
        let mut tally = Tally::new(3);
        tally.record(&Ok("fine".to_string()));
        assert_eq!(tally.finish(), 0);

        tally.record(&Err("broken".to_string()));
        assert_eq!((tally.pass, tally.fail), (1, 1));
        assert_eq!(tally.finish(), 1);
    }
}
