//! Violation audit log
//!
//! Every rejected command becomes exactly one line in an append-only file.
//! Command text is escaped so a token cannot break or forge a line.

use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{error, warn};

use super::violation::PolicyViolation;

/// Default number of log lines returned by [`ViolationAuditor::report`]
pub const DEFAULT_RECENT_WINDOW: usize = 10;

const TAIL_CHUNK: u64 = 4096;

/// Overall audit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Clean,
    ViolationsDetected,
}

/// Summary returned by [`ViolationAuditor::report`]
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub total_violations: u64,
    /// Last log lines, oldest first
    pub recent_violations: Vec<String>,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

/// Append-only record of rejected commands.
///
/// The in-memory counter is authoritative for counts; the log file is only
/// tailed to produce the recent window.
pub struct ViolationAuditor {
    log_path: Option<PathBuf>,
    file: Mutex<Option<File>>,
    total: AtomicU64,
    recent_window: usize,
}

impl ViolationAuditor {
    /// Create an auditor appending to `log_path`
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the log
    /// file cannot be opened for appending.
    pub fn new(log_path: &Path, recent_window: usize) -> io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            log_path: Some(log_path.to_path_buf()),
            file: Mutex::new(Some(file)),
            total: AtomicU64::new(0),
            recent_window,
        })
    }

    /// Create an auditor that only counts and traces (no log file)
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            log_path: None,
            file: Mutex::new(None),
            total: AtomicU64::new(0),
            recent_window: DEFAULT_RECENT_WINDOW,
        }
    }

    #[must_use]
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Number of violations recorded by this instance
    #[must_use]
    pub fn total_violations(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Record a violation. Returns its number in this auditor's log.
    pub fn record(&self, violation: &PolicyViolation) -> u64 {
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let number = self.total.fetch_add(1, Ordering::SeqCst) + 1;

        error!(
            violation = number,
            command = %violation.command,
            patterns = ?violation.patterns(),
            "CRITICAL VIOLATION: forbidden docker command blocked"
        );

        if let Some(file) = file.as_mut() {
            let line = format_line(number, violation);
            if let Err(e) = file.write_all(line.as_bytes()).and_then(|()| file.flush()) {
                warn!(error = %e, "Failed to write violation to audit log");
            }
        }
        number
    }

    /// Summary of recorded violations.
    ///
    /// Counts come from memory; only the tail of the log is read.
    #[must_use]
    pub fn report(&self) -> AuditReport {
        self.report_with_window(self.recent_window)
    }

    /// Same as [`report`](Self::report) with an explicit recent window
    #[must_use]
    pub fn report_with_window(&self, window: usize) -> AuditReport {
        let total_violations = self.total_violations();
        let recent_violations = match &self.log_path {
            Some(path) if window > 0 => tail_lines(path, window).unwrap_or_else(|e| {
                warn!(error = %e, path = %path.display(), "Failed to read audit log tail");
                Vec::new()
            }),
            _ => Vec::new(),
        };

        AuditReport {
            total_violations,
            recent_violations,
            status: if total_violations == 0 {
                AuditStatus::Clean
            } else {
                AuditStatus::ViolationsDetected
            },
            log_path: self.log_path.clone(),
        }
    }
}

/// Render one audit log line (newline-terminated)
fn format_line(number: u64, violation: &PolicyViolation) -> String {
    format!(
        "{} - CRITICAL VIOLATION - VIOLATION #{number} | Command: {} | Violations: {}\n",
        violation.timestamp.format("%Y-%m-%d %H:%M:%S,%3f"),
        escape_control(&violation.command),
        escape_control(&violation.details_summary())
    )
}

/// Escape control characters (`\n` becomes the two characters `\` `n`)
fn escape_control(text: &str) -> Cow<'_, str> {
    if !text.chars().any(char::is_control) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if c.is_control() {
            escaped.extend(c.escape_default());
        } else {
            escaped.push(c);
        }
    }
    Cow::Owned(escaped)
}

/// Read the last `n` non-empty lines of a file without reading all of it
fn tail_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    let mut file = File::open(path)?;
    let len = file.seek(SeekFrom::End(0))?;

    let mut buf: Vec<u8> = Vec::new();
    let mut pos = len;
    loop {
        let newlines = buf.iter().filter(|&&b| b == b'\n').count();
        if pos == 0 || newlines > n {
            break;
        }
        let step = TAIL_CHUNK.min(pos);
        pos -= step;
        file.seek(SeekFrom::Start(pos))?;
        let mut chunk = vec![0u8; usize::try_from(step).unwrap_or(usize::MAX)];
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&buf);
        buf = chunk;
    }

    let text = String::from_utf8_lossy(&buf);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    // The first line may be cut mid-way when we stopped before the file start
    let skip_partial = usize::from(pos > 0 && lines.len() > n);
    let lines = &lines[skip_partial..];
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].iter().map(|l| (*l).to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::ViolationDetail;
    use tempfile::TempDir;

    fn violation(command: &str, seq: u64) -> PolicyViolation {
        PolicyViolation::new(
            command,
            vec![ViolationDetail {
                pattern: "short-force".to_string(),
                description: "Isolated short force flag (-f)".to_string(),
                token: "-f".to_string(),
                offset: 10,
            }],
            seq,
        )
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("logs").join("violations.log");
        let auditor = ViolationAuditor::new(&path, 5).unwrap();
        assert!(path.exists());
        assert_eq!(auditor.log_path(), Some(path.as_path()));
    }

    #[test]
    fn test_record_writes_line_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("violations.log");
        let auditor = ViolationAuditor::new(&path, 5).unwrap();

        let n = auditor.record(&violation("docker rm -f c1", 1));
        assert_eq!(n, 1);

        let content = std::fs::read_to_string(&path).unwrap();
        let line = content.lines().next().unwrap();
        assert!(line.contains(" - CRITICAL VIOLATION - VIOLATION #1 | Command: docker rm -f c1 | Violations: "));
        assert!(line.contains("short-force"));
        // YYYY-MM-DD HH:MM:SS,mmm
        let ts = &line[..23];
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], " ");
        assert_eq!(&ts[19..20], ",");
    }

    #[test]
    fn test_embedded_newlines_stay_on_one_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("violations.log");
        let auditor = ViolationAuditor::new(&path, 10).unwrap();

        let forged = "docker rm -f c1\n2026-01-01 00:00:00,000 - CRITICAL VIOLATION - VIOLATION #99 \
                      | Command: forged | Violations: x\r\x1b[2K";
        auditor.record(&violation(forged, 1));
        auditor.record(&violation("docker rm -f c2", 2));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("VIOLATION #1 | Command: docker rm -f c1\\n2026-01-01"));
        assert!(lines[0].contains("\\r\\u{1b}[2K"));
        assert!(lines[1].contains("VIOLATION #2"));

        let recent = auditor.report().recent_violations;
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().all(|l| !l.starts_with("2026-01-01")));
    }

    #[test]
    fn test_escape_control_leaves_plain_text_borrowed() {
        assert!(matches!(escape_control("docker rm -f c1"), Cow::Borrowed(_)));
        assert_eq!(escape_control("a\tb\nc"), "a\\tb\\nc");
    }

    #[test]
    fn test_report_counts_and_status() {
        let dir = TempDir::new().unwrap();
        let auditor = ViolationAuditor::new(&dir.path().join("v.log"), 2).unwrap();

        let report = auditor.report();
        assert_eq!(report.total_violations, 0);
        assert_eq!(report.status, AuditStatus::Clean);
        assert!(report.recent_violations.is_empty());

        for i in 1..=3 {
            auditor.record(&violation(&format!("docker rm -f c{i}"), i));
        }

        let report = auditor.report();
        assert_eq!(report.total_violations, 3);
        assert_eq!(report.status, AuditStatus::ViolationsDetected);
        assert_eq!(report.recent_violations.len(), 2);
        assert!(report.recent_violations[0].contains("VIOLATION #2"));
        assert!(report.recent_violations[1].contains("VIOLATION #3"));
    }

    #[test]
    fn test_instances_are_isolated() {
        let dir = TempDir::new().unwrap();
        let a = ViolationAuditor::new(&dir.path().join("a.log"), 10).unwrap();
        let b = ViolationAuditor::new(&dir.path().join("b.log"), 10).unwrap();

        a.record(&violation("docker rm -f x", 1));
        a.record(&violation("docker rm -f y", 2));
        b.record(&violation("docker rmi -f z", 1));

        assert_eq!(a.total_violations(), 2);
        assert_eq!(b.total_violations(), 1);
        assert_eq!(b.report().recent_violations.len(), 1);
        assert!(b.report().recent_violations[0].contains("docker rmi -f z"));
    }

    #[test]
    fn test_in_memory_auditor() {
        let auditor = ViolationAuditor::in_memory();
        auditor.record(&violation("docker rm -f c1", 1));
        let report = auditor.report();
        assert_eq!(report.total_violations, 1);
        assert!(report.recent_violations.is_empty());
        assert!(report.log_path.is_none());
    }

    #[test]
    fn test_tail_spans_multiple_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.log");
        let auditor = ViolationAuditor::new(&path, 3).unwrap();
        let long_name = "c".repeat(600);
        for i in 1..=40 {
            auditor.record(&violation(&format!("docker rm -f {long_name}{i}"), i));
        }
        let recent = auditor.report().recent_violations;
        assert_eq!(recent.len(), 3);
        assert!(recent[0].contains("VIOLATION #38"));
        assert!(recent[2].contains("VIOLATION #40"));
    }

    #[test]
    fn test_counter_is_per_process_not_per_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.log");
        {
            let first = ViolationAuditor::new(&path, 10).unwrap();
            first.record(&violation("docker rm -f a", 1));
        }
        let second = ViolationAuditor::new(&path, 10).unwrap();
        assert_eq!(second.total_violations(), 0);
        // The log persists across instances
        assert_eq!(second.report().recent_violations.len(), 1);
    }

    #[test]
    fn test_report_serialization() {
        let auditor = ViolationAuditor::in_memory();
        let json = serde_json::to_string(&auditor.report()).unwrap();
        assert!(json.contains("\"status\":\"clean\""));
        assert!(!json.contains("log_path"));
    }
}
