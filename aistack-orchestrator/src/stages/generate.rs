//! Generate stage
//!
//! Asks an OpenAI-compatible chat-completions endpoint for a Python module
//! that solves the task and carries its own pytest tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stages::{CodeGenerator, GeneratedCode, StageError, TokenUsage};

const SYSTEM_PROMPT: &str = "You are a senior Python engineer. \
Reply with exactly one fenced ```python``` block and no commentary. \
The block must contain a production-ready implementation of the task, \
following PEP 8, together with pytest test functions named test_* that \
exercise it. Functions must return their results rather than print them.";

/// Chat-completions code generator
pub struct OpenAiGenerator {
    api_base: String,
    api_key: Option<String>,
    model: String,
    client: Client,
}

impl OpenAiGenerator {
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let api_base = api_base.into();
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            client: Client::builder().timeout(Duration::from_secs(120)).build()?,
        })
    }
}

#[async_trait]
impl CodeGenerator for OpenAiGenerator {
    async fn generate(&self, task: &str, context: &str) -> Result<GeneratedCode, StageError> {
        let Some(api_key) = &self.api_key else {
            return Err(StageError::non_retryable("OPENAI_API_KEY is not configured"));
        };

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(task, context),
                },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(StageError::from_request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(status, &body));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| StageError::transient(format!("unparseable completion: {}", e)))?;

        let generated = read_completion(completion, &self.model)?;
        debug!(
            "Generated {} characters of code with {}",
            generated.code.len(),
            generated.model
        );
        Ok(generated)
    }
}

/// Turns a completion into stage output
///
/// Backends that omit `model` are billed as the configured model.
fn read_completion(
    completion: ChatResponse,
    configured_model: &str,
) -> Result<GeneratedCode, StageError> {
    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();

    let code = extract_code(&content);
    if code.is_empty() {
        return Err(StageError::transient("model returned an empty completion"));
    }

    let model = if completion.model.trim().is_empty() {
        configured_model.to_string()
    } else {
        completion.model
    };

    Ok(GeneratedCode {
        code,
        model,
        usage: completion.usage.map(|usage| TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        }),
    })
}

/// User message for the generator
pub fn build_prompt(task: &str, context: &str) -> String {
    let mut prompt = task.trim().to_string();
    if !context.is_empty() {
        prompt.push_str("\n\nContext:\n");
        prompt.push_str(context);
    }
    prompt
}

/// Pulls the body out of the first ```python (or bare ```) fence
///
/// Unfenced text is returned trimmed.
pub fn extract_code(content: &str) -> String {
    let Some(open) = content.find("```") else {
        return content.trim().to_string();
    };

    let after_fence = &content[open + 3..];
    // Skip the info string (`python`, `py`, ...) up to the end of the line
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
    let body = &after_fence[body_start..];

    match body.find("```") {
        Some(close) => body[..close].trim().to_string(),
        None => body.trim().to_string(),
    }
}

// =============================================================================
// API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_python_fence() {
        let content = "Here you go:\n```python\ndef f():\n    return 1\n```\nThanks";
        assert_eq!(extract_code(content), "def f():\n    return 1");
    }

    #[test]
    fn test_extract_bare_fence() {
        assert_eq!(extract_code("```\nx = 1\n```"), "x = 1");
    }

    #[test]
    fn test_extract_unfenced() {
        assert_eq!(extract_code("  x = 1\n"), "x = 1");
    }

    #[test]
    fn test_extract_unterminated_fence() {
        assert_eq!(extract_code("```python\nx = 1\n"), "x = 1");
    }

    #[test]
    fn test_build_prompt_appends_context() {
        assert_eq!(build_prompt(" sum ", ""), "sum");
        assert_eq!(
            build_prompt("sum CSV column", "pandas docs"),
            "sum CSV column\n\nContext:\npandas docs"
        );
    }

    #[test]
    fn test_parses_completion_with_usage() {
        let body = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "```python\nx = 1\n```"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160}
        }"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.model, "gpt-4o-mini");
        assert_eq!(response.usage.unwrap().completion_tokens, 40);
    }

    #[test]
    fn test_missing_model_falls_back_to_configured() {
        let body = r#"{
            "choices": [{"message": {"content": "```python\nx = 1\n```"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();

        let generated = read_completion(response, "gpt-4o-mini").unwrap();
        assert_eq!(generated.model, "gpt-4o-mini");
        assert_eq!(generated.code, "x = 1");
        assert_eq!(
            generated.usage,
            Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            })
        );
    }

    #[test]
    fn test_reported_model_is_kept() {
        let body = r#"{
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{"message": {"content": "x = 1"}}]
        }"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();

        let generated = read_completion(response, "gpt-4o").unwrap();
        assert_eq!(generated.model, "gpt-4o-mini-2024-07-18");
        assert!(generated.usage.is_none());
    }

    #[test]
    fn test_empty_completion_is_transient() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        let err = read_completion(response, "gpt-4o-mini").unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_not_retryable() {
        let generator = OpenAiGenerator::new("http://127.0.0.1:9", None, "gpt-4o-mini").unwrap();
        let err = generator.generate("task", "").await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
