//! Test stage
//!
//! Writes the generated module into a scratch directory and runs pytest on
//! it. The scratch directory is removed when the run ends.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::stages::{StageError, TestReport, TestRunner, tail};

/// File name pytest collects the candidate from
const CANDIDATE_FILE: &str = "test_candidate.py";

/// Pytest output kept on a report
pub const MAX_OUTPUT_CHARS: usize = 4_000;

/// Runs generated code under `python -m pytest`
pub struct PytestRunner {
    python_bin: String,
    timeout: Duration,
}

impl PytestRunner {
    pub fn new(python_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python_bin: python_bin.into(),
            timeout,
        }
    }
}

#[async_trait]
impl TestRunner for PytestRunner {
    async fn run(&self, code: &str) -> Result<TestReport, StageError> {
        if code.trim().is_empty() {
            return Err(StageError::non_retryable("no code to test"));
        }

        let workdir = tempfile::tempdir()
            .map_err(|e| StageError::transient(format!("failed to create scratch dir: {}", e)))?;
        let candidate = workdir.path().join(CANDIDATE_FILE);
        tokio::fs::write(&candidate, code)
            .await
            .map_err(|e| StageError::transient(format!("failed to write candidate: {}", e)))?;

        debug!(
            "Running pytest on {} with {}",
            candidate.display(),
            self.python_bin
        );

        let started = Instant::now();
        let child = Command::new(&self.python_bin)
            .args(["-m", "pytest", "-q", "-p", "no:cacheprovider", CANDIDATE_FILE])
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    StageError::non_retryable(format!("{} not found", self.python_bin))
                }
                _ => StageError::transient(format!("failed to start {}: {}", self.python_bin, e)),
            })?;

        // Dropping the future on timeout kills the child
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output
                .map_err(|e| StageError::transient(format!("pytest did not finish: {}", e)))?,
            Err(_) => {
                return Err(StageError::transient(format!(
                    "pytest timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };
        let duration = started.elapsed();

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        let output_text = tail(combined.trim_end(), MAX_OUTPUT_CHARS).to_string();

        let exit_code = output.status.code();
        debug!(
            "pytest exited with {:?} after {}ms",
            exit_code,
            duration.as_millis()
        );

        classify_exit(exit_code, output_text, duration)
    }
}

/// Maps a pytest exit code onto a report or a stage error
///
/// 0 passed, 1 tests failed, 4 usage error, 5 nothing collected.
fn classify_exit(
    exit_code: Option<i32>,
    output: String,
    duration: Duration,
) -> Result<TestReport, StageError> {
    match exit_code {
        Some(0) => Ok(TestReport {
            passed: true,
            output,
            duration,
        }),
        Some(1) => Ok(TestReport {
            passed: false,
            output,
            duration,
        }),
        Some(4) => Err(StageError::non_retryable(format!(
            "pytest usage error: {}",
            output
        ))),
        Some(5) => Err(StageError::non_retryable(
            "generated code contains no tests",
        )),
        Some(code) => Err(StageError::transient(format!(
            "pytest exited with code {}: {}",
            code, output
        ))),
        None => Err(StageError::transient("pytest was killed by a signal")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        let d = Duration::from_millis(5);

        assert!(classify_exit(Some(0), String::new(), d).unwrap().passed);
        assert!(!classify_exit(Some(1), String::new(), d).unwrap().passed);
        assert!(!classify_exit(Some(4), String::new(), d).unwrap_err().is_retryable());
        assert!(!classify_exit(Some(5), String::new(), d).unwrap_err().is_retryable());
        assert!(classify_exit(Some(2), String::new(), d).unwrap_err().is_retryable());
        assert!(classify_exit(None, String::new(), d).unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_zero_exit_passes() {
        let runner = PytestRunner::new("/bin/true", Duration::from_secs(10));
        let report = runner.run("def test_ok():\n    assert True\n").await.unwrap();
        assert!(report.passed);
    }

    #[tokio::test]
    async fn test_exit_one_is_failed_run() {
        let runner = PytestRunner::new("/bin/false", Duration::from_secs(10));
        let report = runner.run("def test_ok():\n    assert True\n").await.unwrap();
        assert!(!report.passed);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_not_retryable() {
        let runner = PytestRunner::new("/nonexistent/python3", Duration::from_secs(10));
        let err = runner.run("x = 1").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_code_is_not_retryable() {
        let runner = PytestRunner::new("/bin/true", Duration::from_secs(10));
        assert!(!runner.run("  \n").await.unwrap_err().is_retryable());
    }
}
