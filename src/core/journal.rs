//! Append-only, daily-rotated, newline-delimited JSON journal.
//!
//! Follows the rotation/locking idiom of this codebase's own rotating logger
//! (lock a sibling `.lock` file for the duration of an append, never hold it
//! across anything but the write itself) while the file-naming and retention
//! semantics come directly from the original Python log manager this
//! component distills: one file per calendar date named
//! `health_monitor_YYYYMMDD.log`.

use crate::core::types::{JournalRecord, StatusChange, TransitionEvent};
use crate::error::JournalError;
use chrono::{Local, NaiveDate};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "health_monitor_";
const FILE_SUFFIX: &str = ".log";

pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{}{FILE_SUFFIX}", date.format("%Y%m%d")))
    }

    /// Append one transition/lifecycle event to today's file. Errors are the
    /// caller's to log-and-count; they never abort the scheduler (§7).
    pub fn append(&self, event: &TransitionEvent) -> Result<(), JournalError> {
        let record = JournalRecord::from(event);
        self.append_record(event.observed_at.date_naive(), &record)
    }

    /// Append a lifecycle record carrying a bare status literal (`"running"`,
    /// `"shutdown"`, `"config_reloaded"`, ...) rather than a `from->to` pair,
    /// per §6 ("status_change is either `<from>-><to>` or a bare state literal").
    pub fn append_lifecycle(
        &self,
        target_name: &str,
        target_type: crate::core::types::TargetType,
        status: &str,
        details: impl Into<String>,
    ) -> Result<(), JournalError> {
        let now = Local::now();
        let record = JournalRecord {
            timestamp: now.to_rfc3339(),
            target_name: target_name.to_string(),
            target_type: target_type.to_string(),
            status_change: status.to_string(),
            details: details.into(),
        };
        self.append_record(now.date_naive(), &record)
    }

    /// Append a record directly; used by tests and by callers that already
    /// have a `JournalRecord` (e.g. re-exporting a historical entry).
    pub fn append_record(
        &self,
        date: NaiveDate,
        record: &JournalRecord,
    ) -> Result<(), JournalError> {
        let path = self.path_for(date);
        let line = serde_json::to_string(record)?;

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)?;
        lock_file.lock_exclusive()?;

        let result = (|| -> Result<(), std::io::Error> {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            writeln!(file, "{line}")?;
            file.flush()
        })();

        let _ = lock_file.unlock();
        result.map_err(JournalError::Io)
    }

    /// All entries for one calendar date, in file order. Malformed lines are
    /// skipped, not fatal.
    pub fn entries_for_date(&self, date: NaiveDate) -> Vec<JournalRecord> {
        read_log_file(&self.path_for(date))
    }

    /// Entries for the last `days` calendar days (today inclusive), newest
    /// first after a stable sort by timestamp.
    pub fn recent_entries(&self, days: u32) -> Vec<JournalRecord> {
        let today = Local::now().date_naive();
        let mut all = Vec::new();
        for offset in 0..days {
            let date = today - chrono::Duration::days(offset as i64);
            all.extend(self.entries_for_date(date));
        }
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        all
    }

    /// Delete journal files whose date-from-filename is older than
    /// `retention_days`. Files whose name doesn't parse as a date are left
    /// alone, per §4.6.
    pub fn compact(&self, retention_days: i64) -> std::io::Result<Vec<PathBuf>> {
        let cutoff = Local::now().date_naive() - chrono::Duration::days(retention_days);
        let mut removed = Vec::new();

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(e),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let Some(date) = parse_date_from_filename(&path) else {
                continue;
            };
            if date < cutoff {
                std::fs::remove_file(&path)?;
                removed.push(path);
            }
        }
        Ok(removed)
    }
}

fn parse_date_from_filename(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(stem, "%Y%m%d").ok()
}

fn read_log_file(path: &Path) -> Vec<JournalRecord> {
    let Ok(file) = std::fs::File::open(path) else {
        return Vec::new();
    };
    let reader = std::io::BufReader::new(file);
    reader
        .lines()
        .map_while(Result::ok)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(&line).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TargetType;
    use tempfile::tempdir;

    fn event(name: &str, from: &str, to: &str) -> TransitionEvent {
        TransitionEvent {
            observed_at: Local::now(),
            target_name: name.to_string(),
            target_type: TargetType::Website,
            change: StatusChange::Transition {
                from: from.to_string(),
                to: to.to_string(),
            },
            detail: "Response time: 0.10s".to_string(),
        }
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path()).unwrap();
        journal.append(&event("A", "unknown", "up")).unwrap();

        let entries = journal.entries_for_date(Local::now().date_naive());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status_change, "unknown->up");
        assert_eq!(entries[0].target_name, "A");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path()).unwrap();
        journal.append(&event("A", "unknown", "up")).unwrap();

        let path = journal.path_for(Local::now().date_naive());
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not valid json").unwrap();

        let entries = journal.entries_for_date(Local::now().date_naive());
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn compaction_removes_only_old_dated_files_and_leaves_unparseable_names() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path()).unwrap();

        let today = Local::now().date_naive();
        let recent = today - chrono::Duration::days(29);
        let stale = today - chrono::Duration::days(31);

        std::fs::write(journal.path_for(today), "").unwrap();
        std::fs::write(journal.path_for(recent), "").unwrap();
        std::fs::write(journal.path_for(stale), "").unwrap();
        std::fs::write(dir.path().join("not_a_log_file.txt"), "").unwrap();

        let removed = journal.compact(30).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(journal.path_for(today).exists());
        assert!(journal.path_for(recent).exists());
        assert!(!journal.path_for(stale).exists());
        assert!(dir.path().join("not_a_log_file.txt").exists());
    }

    #[test]
    fn recent_entries_are_newest_first() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path()).unwrap();
        journal.append(&event("A", "unknown", "up")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        journal.append(&event("A", "up", "down")).unwrap();

        let entries = journal.recent_entries(1);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status_change, "up->down");
        assert_eq!(entries[1].status_change, "unknown->up");
    }
}
