//! Stage executors
//!
//! The external collaborators driven by the pipeline:
//! - Search: keyword → reference snippets
//! - Generate: task + context → code, with token usage
//! - Test: code → pass/fail with pytest output
//! - Notify: fire-and-forget delivery of job outcomes and reports
//!
//! Each one is a trait so the coordinator can be exercised with scripted
//! fakes.

pub mod generate;
pub mod notify;
pub mod search;
pub mod test_runner;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use generate::OpenAiGenerator;
pub use notify::{LogNotifier, Notification, Notifier, NotifyError, SlackNotifier};
pub use search::DuckDuckGoSearch;
pub use test_runner::PytestRunner;

/// Failure of a single stage invocation
///
/// The variant decides whether the retry controller may try again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// Network hiccups, timeouts, rate limits, flaky runs
    #[error("{0}")]
    Transient(String),

    /// Input that can never succeed; remaining attempts are skipped
    #[error("{0}")]
    NonRetryable(String),
}

impl StageError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self::NonRetryable(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classifies an HTTP error status returned by a stage backend
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 500));

        if status.is_server_error()
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
        {
            Self::Transient(message)
        } else {
            Self::NonRetryable(message)
        }
    }

    /// Classifies a transport-level reqwest error
    pub fn from_request(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::NonRetryable(format!("invalid request: {}", err))
        } else {
            Self::Transient(format!("request failed: {}", err))
        }
    }
}

/// Output of the search stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub keyword: String,
    pub snippets: Vec<String>,
    pub sources: Vec<String>,
}

/// Token usage reported by the code generator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Output of the generate stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCode {
    pub code: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// Output of one test run
#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub passed: bool,
    pub output: String,
    pub duration: Duration,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, keyword: &str) -> Result<SearchResults, StageError>;
}

#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, task: &str, context: &str) -> Result<GeneratedCode, StageError>;
}

#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, code: &str) -> Result<TestReport, StageError>;
}

impl SearchResults {
    /// Snippets joined into one block of text
    pub fn combined_text(&self) -> String {
        self.snippets.join("\n")
    }
}

/// Keeps at most `max_chars` characters, appending an ellipsis when cut
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => {
            let keep = text[..cut]
                .char_indices()
                .nth(max_chars.saturating_sub(1))
                .map(|(index, _)| index)
                .unwrap_or(cut);
            format!("{}…", &text[..keep])
        }
    }
}

/// Keeps the last `max_chars` characters
pub fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((start, _)) => &text[start..],
        None => text,
    }
}
