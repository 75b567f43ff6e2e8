//! Log capture
//!
//! Collects an import's output while it runs. The whole log is uploaded when
//! the job finishes; heartbeats carry only the last few lines.

use std::sync::{Arc, Mutex, MutexGuard};

/// Lines sent with each heartbeat
pub const HEARTBEAT_TAIL_LINES: usize = 5;

/// Shared, append-only record of an import's output
#[derive(Clone, Default)]
pub struct LogCapture {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    fn lines(&self) -> MutexGuard<'_, Vec<String>> {
        // A writer that panicked mid-push leaves whole lines behind
        self.lines.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends one line of output, splitting embedded newlines
    pub fn push_line(&self, line: impl AsRef<str>) {
        let mut lines = self.lines();
        for part in line.as_ref().split('\n') {
            lines.push(part.trim_end_matches('\r').to_string());
        }
    }

    /// The last `count` lines joined with newlines
    pub fn tail(&self, count: usize) -> String {
        let lines = self.lines();
        let start = lines.len().saturating_sub(count);
        lines[start..].join("\n")
    }

    /// The full log
    pub fn contents(&self) -> String {
        let lines = self.lines();
        let mut out = lines.join("\n");
        if !lines.is_empty() {
            out.push('\n');
        }
        out
    }

    pub fn len(&self) -> usize {
        self.lines().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_last_lines() {
        let log = LogCapture::new();
        for i in 1..=8 {
            log.push_line(format!("line {}", i));
        }

        assert_eq!(
            log.tail(HEARTBEAT_TAIL_LINES),
            "line 4\nline 5\nline 6\nline 7\nline 8"
        );
        assert_eq!(log.len(), 8);
    }

    #[test]
    fn test_short_log_tail_is_everything() {
        let log = LogCapture::new();
        log.push_line("only line");
        assert_eq!(log.tail(HEARTBEAT_TAIL_LINES), "only line");
    }

    #[test]
    fn test_embedded_newlines_are_split() {
        let log = LogCapture::new();
        log.push_line("first\r\nsecond");
        assert_eq!(log.len(), 2);
        assert_eq!(log.contents(), "first\nsecond\n");
    }

    #[test]
    fn test_empty_capture() {
        let log = LogCapture::new();
        assert!(log.is_empty());
        assert_eq!(log.tail(5), "");
        assert_eq!(log.contents(), "");
    }

    #[test]
    fn test_clones_share_lines() {
        let log = LogCapture::new();
        let writer = log.clone();
        writer.push_line("from a clone");
        assert_eq!(log.contents(), "from a clone\n");
    }
}
