//! Lane logs as files under `logs/`, one `<lane>.log` per lane.
//!
//! Each line is `[<RFC 3339 timestamp>] <message>`. Every line also goes to
//! `tracing` with the lane as a field, so the console shows the same story.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use courtlot_core::{LaneLogs, ProtocolLog, TracingLog};
use tracing::{error, info, warn};

pub struct FileLogs {
    dir: PathBuf,
}

impl FileLogs {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_of(&self, lane: &str) -> PathBuf {
        self.dir.join(format!("{}.log", file_stem(lane)))
    }

    fn create(&self, lane: &str) -> std::io::Result<File> {
        fs::create_dir_all(&self.dir)?;
        File::create(self.path_of(lane))
    }
}

impl LaneLogs for FileLogs {
    /// Truncates any earlier log of the same lane. Falls back to a
    /// console-only log if the file cannot be created.
    fn open(&self, name: &str) -> Arc<dyn ProtocolLog> {
        match self.create(name) {
            Ok(file) => Arc::new(FileLog {
                lane: name.to_string(),
                path: self.path_of(name),
                file: Mutex::new(file),
            }),
            Err(e) => {
                warn!(lane = name, dir = %self.dir.display(), error = %e, "lane log file unavailable");
                Arc::new(TracingLog::new(name))
            }
        }
    }
}

struct FileLog {
    lane: String,
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLog {
    fn append(&self, message: &str) {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = format!("[{stamp}] {message}\n");
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!(path = %self.path.display(), error = %e, "lane log write failed");
        }
    }
}

impl ProtocolLog for FileLog {
    fn info(&self, message: &str) {
        info!(lane = %self.lane, "{message}");
        self.append(message);
    }

    fn warn(&self, message: &str) {
        warn!(lane = %self.lane, "{message}");
        self.append(message);
    }

    fn error(&self, message: &str) {
        error!(lane = %self.lane, "{message}");
        self.append(message);
    }
}

/// Lane names carry court names; keep them but drop path separators.
fn file_stem(lane: &str) -> String {
    lane.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_timestamped_and_reopen_truncates() {
        let tmp = tempfile::tempdir().unwrap();
        let logs = FileLogs::new(tmp.path().join("logs"));

        let log = logs.open("11-3日比谷公園_9");
        log.info("logged in");
        log.error("timed out");
        let text = fs::read_to_string(logs.path_of("11-3日比谷公園_9")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] logged in"));
        assert!(lines[1].contains("Z] timed out"));

        logs.open("11-3日比谷公園_9");
        let text = fs::read_to_string(logs.path_of("11-3日比谷公園_9")).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn separators_do_not_escape_the_log_dir() {
        let logs = FileLogs::new("/tmp/logs");
        assert_eq!(logs.path_of("a/b:c"), PathBuf::from("/tmp/logs/a_b_c.log"));
    }

    #[test]
    fn unwritable_dir_falls_back_to_console() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, "").unwrap();
        let logs = FileLogs::new(blocker.join("logs"));
        let log = logs.open("lane");
        log.info("still works");
        assert!(!blocker.join("logs").exists());
    }
}
