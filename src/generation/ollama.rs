use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{spawn_fragment_stream, LineEvent};
use crate::error::{Result, ScholaragError};

/// Bound on any single generation request, streaming or not.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// One `/api/generate` response object; in streaming mode one arrives per
/// line until `done`.
#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// Local model server reached over plain HTTP (Ollama).
#[derive(Debug)]
pub struct OllamaGenerator {
    client: Client,
    api_url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(api_url: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            api_url,
            model,
        }
    }

    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .send(prompt, false)
            .await?
            .json::<GenerateChunk>()
            .await
            .map_err(|e| ScholaragError::Generation(format!("Failed to parse response: {}", e)))?;
        Ok(response.response.trim().to_string())
    }

    pub async fn complete_streaming(&self, prompt: &str) -> Result<mpsc::Receiver<Result<String>>> {
        let response = self.send(prompt, true).await?;
        Ok(spawn_fragment_stream(response, parse_ndjson_line))
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream,
        };

        let response = self
            .client
            .post(&self.api_url)
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
                "Ollama API error {}: {}",
                status, body
            )));
        }

        Ok(response)
    }
}

/// Parse one newline-delimited JSON line from the streaming response.
/// Malformed lines and empty fragments are skipped.
fn parse_ndjson_line(line: &str) -> LineEvent {
    if line.is_empty() {
        return LineEvent::Skip;
    }
    match serde_json::from_str::<GenerateChunk>(line) {
        Ok(chunk) => {
            if chunk.done && chunk.response.is_empty() {
                LineEvent::Done
            } else if chunk.response.is_empty() {
                LineEvent::Skip
            } else {
                LineEvent::Fragment(chunk.response)
            }
        }
        Err(_) => LineEvent::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fragment_line() {
        let event = parse_ndjson_line(r#"{"response": "The ", "done": false}"#);
        assert!(matches!(event, LineEvent::Fragment(f) if f == "The "));
    }

    #[test]
    fn test_parse_done_line() {
        let event = parse_ndjson_line(r#"{"response": "", "done": true}"#);
        assert!(matches!(event, LineEvent::Done));
    }

    #[test]
    fn test_final_fragment_with_done_still_emitted() {
        let event = parse_ndjson_line(r#"{"response": "end.", "done": true}"#);
        assert!(matches!(event, LineEvent::Fragment(f) if f == "end."));
    }

    #[test]
    fn test_parse_malformed_line_skipped() {
        assert!(matches!(parse_ndjson_line("{broken"), LineEvent::Skip));
        assert!(matches!(parse_ndjson_line(""), LineEvent::Skip));
    }

    #[test]
    fn test_parse_empty_fragment_skipped() {
        let event = parse_ndjson_line(r#"{"response": "", "done": false}"#);
        assert!(matches!(event, LineEvent::Skip));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_generation_error() {
        let generator =
            OllamaGenerator::new("http://127.0.0.1:9/api/generate".to_string(), "gemma:2b".to_string());
        let err = generator.complete("hi").await.unwrap_err();
        assert!(matches!(err, ScholaragError::Generation(_)));
    }
}
