use std::borrow::Cow;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::correlator::Report;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable listing.
    #[default]
    Text,
    /// One JSON object per line.
    Jsonl,
}

/// One line of `jsonl` output.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record<'a> {
    ImmutableFile {
        path: Cow<'a, str>,
    },
    Finding {
        pid: u32,
        command: &'a str,
        path: Cow<'a, str>,
    },
    Summary {
        immutable_files: usize,
        findings: usize,
        processes_examined: usize,
    },
}

pub fn render<W: Write>(report: &Report, format: OutputFormat, out: &mut W) -> io::Result<()> {
    match format {
        OutputFormat::Text => render_text(report, out),
        OutputFormat::Jsonl => render_jsonl(report, out),
    }
}

fn render_text<W: Write>(report: &Report, out: &mut W) -> io::Result<()> {
    let Report::Completed {
        immutable,
        findings,
        ..
    } = report
    else {
        return writeln!(out, "No files with the immutable bit set found.");
    };

    writeln!(out, "Immutable files found:")?;
    for path in immutable.iter() {
        writeln!(out, "  {}", path.display())?;
    }
    writeln!(out, "\nSearching for processes using these files...\n")?;

    if findings.is_empty() {
        return writeln!(out, "No processes found using immutable files.");
    }
    writeln!(out, "Processes using immutable files:")?;
    for f in findings {
        writeln!(
            out,
            "PID: {}, Command: {}, File: {}",
            f.pid,
            f.cmdline,
            f.path.display()
        )?;
    }
    Ok(())
}

fn render_jsonl<W: Write>(report: &Report, out: &mut W) -> io::Result<()> {
    let summary = match report {
        Report::NoImmutableFiles => Record::Summary {
            immutable_files: 0,
            findings: 0,
            processes_examined: 0,
        },
        Report::Completed {
            immutable,
            findings,
            processes_examined,
        } => {
            for path in immutable.iter() {
                write_record(out, &Record::ImmutableFile { path: lossy(path) })?;
            }
            for f in findings {
                write_record(
                    out,
                    &Record::Finding {
                        pid: f.pid,
                        command: &f.cmdline,
                        path: lossy(&f.path),
                    },
                )?;
            }
            Record::Summary {
                immutable_files: immutable.len(),
                findings: findings.len(),
                processes_examined: *processes_examined,
            }
        }
    };
    write_record(out, &summary)
}

fn write_record<W: Write>(out: &mut W, record: &Record<'_>) -> io::Result<()> {
    serde_json::to_writer(&mut *out, record)?;
    out.write_all(b"\n")
}

fn lossy(path: &Path) -> Cow<'_, str> {
    path.to_string_lossy()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use lockscan_common::{Finding, ImmutableFileSet};
    use serde_json::Value;

    use super::*;

    fn completed(findings: Vec<Finding>) -> Report {
        let immutable: ImmutableFileSet = ["/var/lock/x", "/etc/lockfile"]
            .into_iter()
            .map(PathBuf::from)
            .collect();
        Report::Completed {
            immutable,
            findings,
            processes_examined: 3,
        }
    }

    fn holder() -> Finding {
        Finding {
            pid: 101,
            cmdline: "daemon --serve".to_string(),
            path: PathBuf::from("/etc/lockfile"),
        }
    }

    fn text(report: &Report) -> String {
        let mut buf = Vec::new();
        render(report, OutputFormat::Text, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn jsonl(report: &Report) -> Vec<Value> {
        let mut buf = Vec::new();
        render(report, OutputFormat::Jsonl, &mut buf).unwrap();
        String::from_utf8(buf)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn text_without_immutable_files() {
        assert_eq!(
            text(&Report::NoImmutableFiles),
            "No files with the immutable bit set found.\n"
        );
    }

    #[test]
    fn text_lists_files_then_findings() {
        let out = text(&completed(vec![holder()]));
        assert_eq!(
            out,
            "Immutable files found:\n\
             \x20 /etc/lockfile\n\
             \x20 /var/lock/x\n\
             \n\
             Searching for processes using these files...\n\
             \n\
             Processes using immutable files:\n\
             PID: 101, Command: daemon --serve, File: /etc/lockfile\n"
        );
    }

    #[test]
    fn text_without_holders() {
        let out = text(&completed(Vec::new()));
        assert!(out.ends_with("No processes found using immutable files.\n"));
        assert!(!out.contains("PID:"));
    }

    #[test]
    fn jsonl_records_are_tagged() {
        let records = jsonl(&completed(vec![holder()]));

        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["type"], "immutable_file");
        assert_eq!(records[0]["path"], "/etc/lockfile");
        assert_eq!(records[2]["type"], "finding");
        assert_eq!(records[2]["pid"], 101);
        assert_eq!(records[2]["command"], "daemon --serve");
        assert_eq!(records[2]["path"], "/etc/lockfile");
        assert_eq!(records[3]["type"], "summary");
        assert_eq!(records[3]["immutable_files"], 2);
        assert_eq!(records[3]["findings"], 1);
        assert_eq!(records[3]["processes_examined"], 3);
    }

    #[test]
    fn jsonl_without_immutable_files_is_just_a_summary() {
        let records = jsonl(&Report::NoImmutableFiles);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["type"], "summary");
        assert_eq!(records[0]["immutable_files"], 0);
    }
}
