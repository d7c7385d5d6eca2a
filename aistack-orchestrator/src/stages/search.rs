//! Search stage
//!
//! Looks the keyword up with the DuckDuckGo instant answer API and turns the
//! hits into generation context.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::stages::{SearchProvider, SearchResults, StageError, truncate};

/// Upper bound of the context handed to the generator
pub const MAX_CONTEXT_CHARS: usize = 8_000;

/// DuckDuckGo instant answer client
pub struct DuckDuckGoSearch {
    api_base: String,
    client: Client,
}

impl DuckDuckGoSearch {
    pub fn new(api_base: impl Into<String>) -> Result<Self, reqwest::Error> {
        let api_base = api_base.into();
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            client: Client::builder().timeout(Duration::from_secs(10)).build()?,
        })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, keyword: &str) -> Result<SearchResults, StageError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(StageError::non_retryable("search keyword is empty"));
        }

        let url = format!("{}/", self.api_base);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", keyword),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(StageError::from_request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(status, &body));
        }

        // The API answers with `application/x-javascript`, so parse the text
        let body = response.text().await.map_err(StageError::from_request)?;
        let answer: InstantAnswer = serde_json::from_str(&body)
            .map_err(|e| StageError::transient(format!("unparseable search response: {}", e)))?;

        let results = answer.into_results(keyword);
        debug!(
            "Search for '{}' returned {} snippet(s)",
            keyword,
            results.snippets.len()
        );

        Ok(results)
    }
}

/// Normalises search output into generation context
///
/// Collapses whitespace and caps the length at `max_chars`.
pub fn build_context(results: &SearchResults, max_chars: usize) -> String {
    if results.snippets.is_empty() {
        return format!("[No result for '{}']", results.keyword);
    }

    let collapsed = results
        .combined_text()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    truncate(&collapsed, max_chars)
}

// =============================================================================
// API Response Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstantAnswer {
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    answer: serde_json::Value,
    definition: String,
    #[serde(rename = "DefinitionURL")]
    definition_url: String,
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RelatedTopic {
    text: Option<String>,
    #[serde(rename = "FirstURL")]
    first_url: Option<String>,
    /// Present on topic groups instead of `text`
    topics: Vec<RelatedTopic>,
}

impl InstantAnswer {
    fn into_results(self, keyword: &str) -> SearchResults {
        let mut results = SearchResults {
            keyword: keyword.to_string(),
            ..SearchResults::default()
        };

        push_hit(&mut results, self.abstract_text, self.abstract_url);
        // `Answer` is a string for most queries and an object for calculators
        if let serde_json::Value::String(answer) = self.answer {
            push_hit(&mut results, answer, String::new());
        }
        push_hit(&mut results, self.definition, self.definition_url);

        // Depth-first, in document order
        let mut pending: Vec<RelatedTopic> = self.related_topics.into_iter().rev().collect();
        while let Some(topic) = pending.pop() {
            pending.extend(topic.topics.into_iter().rev());
            push_hit(
                &mut results,
                topic.text.unwrap_or_default(),
                topic.first_url.unwrap_or_default(),
            );
        }

        results
    }
}

fn push_hit(results: &mut SearchResults, text: String, url: String) {
    if !text.trim().is_empty() {
        results.snippets.push(text);
    }
    if !url.is_empty() && !results.sources.contains(&url) {
        results.sources.push(url);
    }
}
