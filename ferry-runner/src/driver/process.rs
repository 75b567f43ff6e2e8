//! Subprocess steps
//!
//! Drivers are sequences of external commands. Each runs in the job's
//! working directory with stdout and stderr captured line by line. A step
//! carries output rules: a line containing a rule's needle refines how the
//! step's exit is reported.

use ferry_core::domain::result::ResultStatus;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::service::LogCapture;

/// Maps output containing `needle` to `status`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRule {
    pub needle: &'static str,
    pub status: ResultStatus,
}

/// One external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub program: String,
    pub args: Vec<OsString>,
    /// Checked in order when the step exits non-zero
    pub on_failure: Vec<OutputRule>,
    /// Checked in order when the step exits zero
    pub on_success: Vec<OutputRule>,
}

impl Step {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(|a| a.as_ref().to_os_string()).collect(),
            on_failure: Vec::new(),
            on_success: Vec::new(),
        }
    }

    /// Reports a failing exit as `status` if the output contained `needle`
    pub fn failing_as(mut self, needle: &'static str, status: ResultStatus) -> Self {
        self.on_failure.push(OutputRule { needle, status });
        self
    }

    /// Reports a clean exit as `status` if the output contained `needle`
    pub fn succeeding_as(mut self, needle: &'static str, status: ResultStatus) -> Self {
        self.on_success.push(OutputRule { needle, status });
        self
    }

    fn needles(&self) -> Vec<&'static str> {
        self.on_failure
            .iter()
            .chain(&self.on_success)
            .map(|rule| rule.needle)
            .collect()
    }
}

fn classify(rules: &[OutputRule], seen: &[&'static str]) -> Option<ResultStatus> {
    rules
        .iter()
        .find(|rule| seen.contains(&rule.needle))
        .map(|rule| rule.status)
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs `steps` in order, stopping at the first one that fails
///
/// A failing step reports its first matching failure rule, or FAILURE. When
/// every step succeeds the result is the status of the last success rule
/// that matched, or SUCCESS. A step killed by a signal reports KILLED. The
/// child is killed if this future is dropped.
pub async fn run_steps(steps: &[Step], work_dir: &Path, log: &LogCapture) -> ResultStatus {
    let mut result = ResultStatus::Success;

    for step in steps {
        log.push_line(format!("$ {}", step));
        debug!("Running {}", step);

        let (status, seen) = match run_step(step, work_dir, log).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Failed to start {}: {}", step.program, e);
                log.push_line(format!("failed to start {}: {}", step.program, e));
                return ResultStatus::Failure;
            }
        };

        match status.code() {
            Some(0) => {
                if let Some(refined) = classify(&step.on_success, &seen) {
                    debug!("{} finished as {}", step.program, refined);
                    result = refined;
                }
            }
            Some(code) => {
                log.push_line(format!("{} exited with code {}", step.program, code));
                return classify(&step.on_failure, &seen).unwrap_or(ResultStatus::Failure);
            }
            None => {
                log.push_line(format!("{} was killed", step.program));
                return ResultStatus::Killed;
            }
        }
    }

    result
}

async fn run_step(
    step: &Step,
    work_dir: &Path,
    log: &LogCapture,
) -> std::io::Result<(ExitStatus, Vec<&'static str>)> {
    let mut child = Command::new(&step.program)
        .args(&step.args)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let needles = step.needles();

    let (mut seen, from_stderr, status) = tokio::join!(
        pump(stdout, log, &needles),
        pump(stderr, log, &needles),
        child.wait()
    );
    seen.extend(from_stderr);
    Ok((status?, seen))
}

/// Copies lines into the log, returning the needles they contained
async fn pump<R: AsyncRead + Unpin>(
    reader: Option<R>,
    log: &LogCapture,
    needles: &[&'static str],
) -> Vec<&'static str> {
    let mut seen = Vec::new();
    let Some(reader) = reader else {
        return seen;
    };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        for needle in needles {
            if !seen.contains(needle) && line.contains(needle) {
                seen.push(*needle);
            }
        }
        log.push_line(line);
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Step {
        Step::new("sh", ["-c", script])
    }

    #[tokio::test]
    async fn test_output_is_captured() {
        let log = LogCapture::new();
        let status = run_steps(
            &[sh("echo fetching; echo warning >&2")],
            &std::env::temp_dir(),
            &log,
        )
        .await;

        assert_eq!(status, ResultStatus::Success);
        let contents = log.contents();
        assert!(contents.contains("$ sh -c echo fetching"));
        assert!(contents.contains("fetching\n"));
        assert!(contents.contains("warning\n"));
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_steps() {
        let log = LogCapture::new();
        let status = run_steps(
            &[sh("exit 3"), sh("echo never")],
            &std::env::temp_dir(),
            &log,
        )
        .await;

        assert_eq!(status, ResultStatus::Failure);
        assert!(log.contents().contains("sh exited with code 3"));
        assert!(!log.contents().contains("\nnever\n"));
    }

    #[tokio::test]
    async fn test_failure_rules_refine_the_status() {
        let fetch = sh("echo 'fatal: repository not found' >&2; exit 128")
            .failing_as("connection refused", ResultStatus::FailureInvalid)
            .failing_as("repository not found", ResultStatus::FailureRemoteBroken);

        let log = LogCapture::new();
        let status = run_steps(&[fetch], &std::env::temp_dir(), &log).await;
        assert_eq!(status, ResultStatus::FailureRemoteBroken);
        assert!(log.contents().contains("sh exited with code 128"));
    }

    #[tokio::test]
    async fn test_first_matching_failure_rule_wins() {
        let fetch = sh("echo 'not a branch'; echo 'unsupported'; exit 1")
            .failing_as("unsupported", ResultStatus::FailureUnsupportedFeature)
            .failing_as("not a branch", ResultStatus::FailureInvalid);

        let status = run_steps(&[fetch], &std::env::temp_dir(), &LogCapture::new()).await;
        assert_eq!(status, ResultStatus::FailureUnsupportedFeature);
    }

    #[tokio::test]
    async fn test_success_rules_ignored_on_failure() {
        let push = sh("echo 'up-to-date'; exit 1")
            .succeeding_as("up-to-date", ResultStatus::SuccessNochange);

        let status = run_steps(&[push], &std::env::temp_dir(), &LogCapture::new()).await;
        assert_eq!(status, ResultStatus::Failure);
    }

    #[tokio::test]
    async fn test_success_rule_marks_unchanged() {
        let steps = [
            sh("echo fetched"),
            sh("echo 'Everything up-to-date' >&2")
                .succeeding_as("Everything up-to-date", ResultStatus::SuccessNochange),
        ];

        let status = run_steps(&steps, &std::env::temp_dir(), &LogCapture::new()).await;
        assert_eq!(status, ResultStatus::SuccessNochange);
    }

    #[tokio::test]
    async fn test_unmatched_success_rule_is_plain_success() {
        let push = sh("echo 'pushed 3 revisions'")
            .succeeding_as("No new revisions", ResultStatus::SuccessNochange);

        let status = run_steps(&[push], &std::env::temp_dir(), &LogCapture::new()).await;
        assert_eq!(status, ResultStatus::Success);
    }

    #[tokio::test]
    async fn test_missing_program_is_failure() {
        let log = LogCapture::new();
        let status = run_steps(
            &[Step::new("ferry-no-such-program", ["--help"])],
            &std::env::temp_dir(),
            &log,
        )
        .await;

        assert_eq!(status, ResultStatus::Failure);
        assert!(log.contents().contains("failed to start ferry-no-such-program"));
    }

    #[tokio::test]
    async fn test_signalled_step_is_killed() {
        let log = LogCapture::new();
        let status = run_steps(&[sh("kill -9 $$")], &std::env::temp_dir(), &log).await;
        assert_eq!(status, ResultStatus::Killed);
    }

    #[test]
    fn test_step_display() {
        let step = Step::new("git", ["clone", "--mirror", "https://example.org/w.git"]);
        assert_eq!(step.to_string(), "git clone --mirror https://example.org/w.git");
    }
}
