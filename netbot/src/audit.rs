//! Append-only audit streams
//!
//! Three files, one line per event:
//!
//! ```text
//! 2024-03-01 10:12:44,017 - StatLog - INFO - Analysis: .ac - UserID: 42
//! 2024-03-01 10:13:02,511 - SolverLog - ERROR - UserID: 42 - Netlist error: R1 1 0  /  .ac  /
//! 2024-03-01 10:14:40,003 - OtherLog - ERROR - transport failure: ...
//! ```
//!
//! The stat stream is parsed back for usage summaries and for the broadcast
//! recipient list.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Local;
use tracing::{error, info};

use crate::netlist::AnalysisKind;
use crate::session::UserId;

/// Visible separator replacing newlines of a failed netlist.
pub const NEWLINE_SEPARATOR: &str = "  /  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStream {
    Stat,
    SolverError,
    OtherError,
}

impl AuditStream {
    pub const ALL: [AuditStream; 3] = [
        AuditStream::Stat,
        AuditStream::SolverError,
        AuditStream::OtherError,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            AuditStream::Stat => "stat.log",
            AuditStream::SolverError => "solver-error.log",
            AuditStream::OtherError => "other-error.log",
        }
    }

    fn logger(self) -> &'static str {
        match self {
            AuditStream::Stat => "StatLog",
            AuditStream::SolverError => "SolverLog",
            AuditStream::OtherError => "OtherLog",
        }
    }

    fn level(self) -> &'static str {
        match self {
            AuditStream::Stat => "INFO",
            _ => "ERROR",
        }
    }
}

/// One completed analysis, as read back from the stat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatEvent {
    pub timestamp: String,
    pub kind: AnalysisKind,
    pub user: UserId,
}

impl StatEvent {
    fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim_end().split(" - ").collect();
        if fields.len() < 5 {
            return None;
        }
        let kind = fields[3].strip_prefix("Analysis: ")?.parse().ok()?;
        let user = fields[4].strip_prefix("UserID: ")?.trim().parse().ok()?;
        Some(StatEvent {
            timestamp: fields[0].to_string(),
            kind,
            user: UserId(user),
        })
    }
}

pub struct AuditLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    /// Open (and create when missing) the three streams under `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        for stream in AuditStream::ALL {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(stream.file_name()))?;
        }
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self, stream: AuditStream) -> PathBuf {
        self.dir.join(stream.file_name())
    }

    pub fn record_stat(&self, kind: AnalysisKind, user: UserId) -> io::Result<()> {
        info!(analysis = %kind, user_id = user.0, "analysis completed");
        self.append(
            AuditStream::Stat,
            &format!("Analysis: {} - UserID: {}", kind, user),
        )
    }

    pub fn record_failure(&self, user: UserId, raw_netlist: &str) -> io::Result<()> {
        let flattened = raw_netlist.replace('\n', NEWLINE_SEPARATOR);
        error!(user_id = user.0, "netlist failed to solve");
        self.append(
            AuditStream::SolverError,
            &format!("UserID: {} - Netlist error: {}", user, flattened),
        )
    }

    pub fn record_other(&self, description: &str) -> io::Result<()> {
        error!(%description, "uncaught error");
        self.append(
            AuditStream::OtherError,
            &description.replace('\n', NEWLINE_SEPARATOR),
        )
    }

    fn append(&self, stream: AuditStream, message: &str) -> io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(stream))?;
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S,%3f");
        writeln!(
            file,
            "{} - {} - {} - {}",
            timestamp,
            stream.logger(),
            stream.level(),
            message
        )
    }

    pub fn line_count(&self, stream: AuditStream) -> io::Result<usize> {
        let file = File::open(self.path(stream))?;
        Ok(BufReader::new(file).lines().count())
    }

    /// Every parseable stat line; malformed lines are skipped.
    pub fn stat_events(&self) -> io::Result<Vec<StatEvent>> {
        read_stat_events(&self.path(AuditStream::Stat))
    }
}

pub fn read_stat_events(path: &Path) -> io::Result<Vec<StatEvent>> {
    let file = File::open(path)?;
    let mut events = Vec::new();
    for line in BufReader::new(file).lines() {
        if let Some(event) = StatEvent::parse(&line?) {
            events.push(event);
        }
    }
    Ok(events)
}

/// Usage summary over the stat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSummary {
    pub users: usize,
    pub analyses: usize,
    pub per_kind: Vec<(AnalysisKind, usize)>,
}

impl StatsSummary {
    /// Administrators' own analyses are excluded.
    pub fn from_events(events: &[StatEvent], excluded: &[UserId]) -> Self {
        let counted: Vec<&StatEvent> = events
            .iter()
            .filter(|e| !excluded.contains(&e.user))
            .collect();
        let users: BTreeSet<UserId> = counted.iter().map(|e| e.user).collect();
        let per_kind = AnalysisKind::ALL
            .iter()
            .map(|k| (*k, counted.iter().filter(|e| e.kind == *k).count()))
            .collect();
        Self {
            users: users.len(),
            analyses: counted.len(),
            per_kind,
        }
    }

    pub fn percentage(&self, kind: AnalysisKind) -> f64 {
        if self.analyses == 0 {
            return 0.0;
        }
        let n = self
            .per_kind
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(0, |(_, n)| *n);
        n as f64 / self.analyses as f64 * 100.0
    }

    pub fn to_markdown(&self) -> String {
        let mut mex = format!("*# of Users*: {}\n", self.users);
        mex.push_str(&format!("*# of Analyses*: {}\n", self.analyses));
        for (kind, _) in &self.per_kind {
            mex.push_str(&format!("    *{}*: {:.2} %\n", kind, self.percentage(*kind)));
        }
        mex
    }
}

/// Distinct users appearing in the stat stream.
pub fn distinct_users(events: &[StatEvent]) -> BTreeSet<UserId> {
    events.iter().map(|e| e.user).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_all_streams() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path().join("logs")).unwrap();
        for stream in AuditStream::ALL {
            assert!(log.path(stream).exists());
            assert_eq!(log.line_count(stream).unwrap(), 0);
        }
    }

    #[test]
    fn test_stat_line_format_roundtrips() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        log.record_stat(AnalysisKind::FrequencySweep, UserId(42)).unwrap();

        let text = fs::read_to_string(log.path(AuditStream::Stat)).unwrap();
        assert!(text.contains(" - StatLog - INFO - Analysis: .ac - UserID: 42\n"));

        let events = log.stat_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AnalysisKind::FrequencySweep);
        assert_eq!(events[0].user, UserId(42));
    }

    #[test]
    fn test_failure_flattens_newlines() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        log.record_failure(UserId(7), "R1 1 0 1\n.ac bogus\n").unwrap();

        let text = fs::read_to_string(log.path(AuditStream::SolverError)).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("SolverLog - ERROR - UserID: 7 - Netlist error: R1 1 0 1  /  .ac bogus  /  "));
        // streams are disjoint
        assert_eq!(log.line_count(AuditStream::Stat).unwrap(), 0);
        assert_eq!(log.line_count(AuditStream::OtherError).unwrap(), 0);
    }

    #[test]
    fn test_summary_excludes_admins() {
        let ev = |kind, user| StatEvent {
            timestamp: String::new(),
            kind,
            user: UserId(user),
        };
        let events = vec![
            ev(AnalysisKind::OperatingPoint, 1),
            ev(AnalysisKind::OperatingPoint, 2),
            ev(AnalysisKind::TimeDomain, 2),
            ev(AnalysisKind::FrequencySweep, 1),
            ev(AnalysisKind::FrequencySweep, 99),
        ];
        let s = StatsSummary::from_events(&events, &[UserId(99)]);
        assert_eq!(s.users, 2);
        assert_eq!(s.analyses, 4);
        let md = s.to_markdown();
        assert!(md.contains("*# of Users*: 2\n"));
        assert!(md.contains("*.op*: 50.00 %"));
        assert!(md.contains("*.ac*: 25.00 %"));
        assert!(md.contains("*.tran*: 25.00 %"));
    }

    #[test]
    fn test_empty_summary_has_no_nan() {
        let s = StatsSummary::from_events(&[], &[]);
        assert!(s.to_markdown().contains("*.op*: 0.00 %"));
    }

    #[test]
    fn test_malformed_stat_lines_skipped() {
        assert!(StatEvent::parse("garbage").is_none());
        assert!(StatEvent::parse("t - StatLog - INFO - Analysis: .noise - UserID: 1").is_none());
        let e = StatEvent::parse("t - StatLog - INFO - Analysis: .tran - UserID: 5").unwrap();
        assert_eq!(e.kind, AnalysisKind::TimeDomain);
    }
}
