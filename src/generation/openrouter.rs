use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{single_fragment, spawn_fragment_stream, LineEvent};
use crate::error::{Result, ScholaragError};

const API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Hosted chat-completion API (OpenRouter).
///
/// A missing API key degrades to a descriptive answer string rather than
/// failing the process or the connection.
#[derive(Debug)]
pub struct OpenRouterGenerator {
    client: Client,
    api_key: Option<String>,
    api_key_env: String,
    model: String,
    site_url: String,
    site_name: String,
}

impl OpenRouterGenerator {
    pub fn new(
        api_key: Option<String>,
        api_key_env: String,
        model: String,
        site_url: String,
        site_name: String,
    ) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            api_key,
            api_key_env,
            model,
            site_url,
            site_name,
        }
    }

    fn missing_key_message(&self) -> String {
        format!("Error: {} not set.", self.api_key_env)
    }

    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let Some(api_key) = &self.api_key else {
            return Ok(self.missing_key_message());
        };

        let response = self
            .send(api_key, prompt, false)
            .await?
            .json::<ChatResponse>()
            .await
            .map_err(|e| ScholaragError::Generation(format!("Failed to parse response: {}", e)))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok(content)
    }

    pub async fn complete_streaming(&self, prompt: &str) -> Result<mpsc::Receiver<Result<String>>> {
        let Some(api_key) = &self.api_key else {
            return Ok(single_fragment(self.missing_key_message()));
        };

        let response = self.send(api_key, prompt, true).await?;
        Ok(spawn_fragment_stream(response, parse_sse_line))
    }

    async fn send(&self, api_key: &str, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
            stream,
        };

        let response = self
            .client
            .post(API_URL)
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.site_url)
            .header("X-Title", &self.site_name)
            .json(&request)
            .send()
            .await
            .map_err(|e| ScholaragError::Generation(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(ScholaragError::Generation(format!(
                "OpenRouter API error {}: {}",
                status, body
            )));
        }

        Ok(response)
    }
}

/// Parse one server-sent-events line from the streaming response.
///
/// Only `data:` lines matter; `data: [DONE]` terminates the stream; anything
/// unparseable (comments, keep-alives) is skipped.
fn parse_sse_line(line: &str) -> LineEvent {
    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return LineEvent::Skip;
    };
    if data == "[DONE]" {
        return LineEvent::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .unwrap_or_default();
            if content.is_empty() {
                LineEvent::Skip
            } else {
                LineEvent::Fragment(content)
            }
        }
        Err(_) => LineEvent::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyless_generator() -> OpenRouterGenerator {
        OpenRouterGenerator::new(
            None,
            "OPENROUTER_API_KEY".to_string(),
            "some/model".to_string(),
            String::new(),
            String::new(),
        )
    }

    #[tokio::test]
    async fn test_missing_key_complete_returns_message() {
        let answer = keyless_generator().complete("hi").await.unwrap();
        assert_eq!(answer, "Error: OPENROUTER_API_KEY not set.");
    }

    #[tokio::test]
    async fn test_missing_key_streaming_yields_single_fragment() {
        let mut rx = keyless_generator().complete_streaming("hi").await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap().unwrap(),
            "Error: OPENROUTER_API_KEY not set."
        );
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_parse_sse_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert!(matches!(parse_sse_line(line), LineEvent::Fragment(f) if f == "Hello"));
    }

    #[test]
    fn test_parse_sse_done() {
        assert!(matches!(parse_sse_line("data: [DONE]"), LineEvent::Done));
    }

    #[test]
    fn test_parse_sse_empty_delta_skipped() {
        let line = r#"data: {"choices":[{"delta":{}}]}"#;
        assert!(matches!(parse_sse_line(line), LineEvent::Skip));
    }

    #[test]
    fn test_parse_sse_non_data_lines_skipped() {
        assert!(matches!(parse_sse_line(": keep-alive"), LineEvent::Skip));
        assert!(matches!(parse_sse_line(""), LineEvent::Skip));
        assert!(matches!(parse_sse_line("event: message"), LineEvent::Skip));
    }

    #[test]
    fn test_parse_sse_malformed_json_skipped() {
        assert!(matches!(parse_sse_line("data: {broken"), LineEvent::Skip));
    }
}
