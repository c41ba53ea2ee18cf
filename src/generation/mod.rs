//! Answer generation: two provider backends behind one capability interface.
//!
//! The provider is selected once at startup from configuration; there is no
//! per-call dispatch. Both backends expose the same contract: a whole-answer
//! `complete` and a `complete_streaming` that yields provider-defined text
//! fragments over a channel. Fragment boundaries carry no meaning — callers
//! must not assume they align with words or sentences.

mod ollama;
mod openrouter;

pub use ollama::OllamaGenerator;
pub use openrouter::OpenRouterGenerator;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::config::GenerationConfig;
use crate::error::{Result, ScholaragError};

const ANSWER_PROMPT: &str = "You are a research assistant answering questions about scientific papers.\n\
Use ONLY the context below to answer. If the context does not contain the answer, say so.\n\
Cite paper titles when relevant. Current date: {date}\n\n\
Context:\n{context}\n\n\
Question: {query}\n\n\
Answer:";

/// Render the answer prompt from assembled context and the user query.
pub fn render_prompt(context: &str, query: &str) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    ANSWER_PROMPT
        .replace("{date}", &now)
        .replace("{context}", context)
        .replace("{query}", query)
}

/// The configured generation backend.
#[derive(Debug)]
pub enum Generator {
    Ollama(OllamaGenerator),
    OpenRouter(OpenRouterGenerator),
}

impl Generator {
    /// Build the provider selected in config. An unknown provider name is a
    /// startup configuration error, not a per-request failure.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        match config.provider.as_str() {
            "ollama" => Ok(Self::Ollama(OllamaGenerator::new(
                config.ollama.api_url.clone(),
                config.ollama.model.clone(),
            ))),
            "openrouter" => {
                let settings = &config.openrouter;
                // A missing key is not fatal here: the call path degrades to a
                // descriptive answer instead of crashing the connection.
                let api_key = std::env::var(&settings.api_key_env).ok();
                Ok(Self::OpenRouter(OpenRouterGenerator::new(
                    api_key,
                    settings.api_key_env.clone(),
                    settings.model.clone(),
                    settings.site_url.clone(),
                    settings.site_name.clone(),
                )))
            }
            other => Err(ScholaragError::Config(format!(
                "Unknown generation provider: {} (expected \"ollama\" or \"openrouter\")",
                other
            ))),
        }
    }

    /// Generate the whole answer at once.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        match self {
            Self::Ollama(g) => g.complete(prompt).await,
            Self::OpenRouter(g) => g.complete(prompt).await,
        }
    }

    /// Generate the answer as a sequence of text fragments.
    ///
    /// A provider failure after streaming has begun arrives as a final `Err`
    /// item. Dropping the receiver cancels the underlying provider read.
    pub async fn complete_streaming(&self, prompt: &str) -> Result<mpsc::Receiver<Result<String>>> {
        match self {
            Self::Ollama(g) => g.complete_streaming(prompt).await,
            Self::OpenRouter(g) => g.complete_streaming(prompt).await,
        }
    }
}

/// What one wire line contributes to the fragment stream.
pub(crate) enum LineEvent {
    Fragment(String),
    /// Keep-alives, empty fragments, malformed lines: skipped, never fatal.
    Skip,
    Done,
}

/// A receiver that yields exactly one fragment, for degraded answers
/// (e.g. missing credentials).
pub(crate) fn single_fragment(message: String) -> mpsc::Receiver<Result<String>> {
    let (tx, rx) = mpsc::channel(1);
    let _ = tx.try_send(Ok(message));
    rx
}

/// Forward a line-delimited HTTP response body as a fragment stream.
///
/// Splits the body on newlines, feeds each line to `parse`, and sends
/// fragments to the returned receiver. A mid-stream read failure (including
/// the request timeout) is delivered as a final `Err` item so the session can
/// still terminate cleanly with an error frame. The read task stops when the
/// body ends, when `parse` reports `Done`, or when the receiver is dropped.
pub(crate) fn spawn_fragment_stream(
    response: reqwest::Response,
    parse: fn(&str) -> LineEvent,
) -> mpsc::Receiver<Result<String>> {
    let (tx, rx) = mpsc::channel::<Result<String>>(32);

    tokio::spawn(async move {
        let mut body = response.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();

        'read: while let Some(item) = body.next().await {
            let bytes = match item {
                Ok(b) => b,
                Err(e) => {
                    log::warn!("Generation stream read failed: {}", e);
                    let _ = tx
                        .send(Err(ScholaragError::Generation(format!(
                            "stream read failed: {}",
                            e
                        ))))
                        .await;
                    return;
                }
            };
            buf.extend_from_slice(&bytes);

            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                match parse(line.trim()) {
                    LineEvent::Fragment(fragment) => {
                        if tx.send(Ok(fragment)).await.is_err() {
                            // client gone; stop reading from the provider
                            break 'read;
                        }
                    }
                    LineEvent::Skip => {}
                    LineEvent::Done => break 'read,
                }
            }
        }

        // trailing unterminated line
        if !buf.is_empty() {
            let line = String::from_utf8_lossy(&buf);
            if let LineEvent::Fragment(fragment) = parse(line.trim()) {
                let _ = tx.send(Ok(fragment)).await;
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_prompt_substitutes() {
        let prompt = render_prompt("CTX-BODY", "what is attention?");
        assert!(prompt.contains("CTX-BODY"));
        assert!(prompt.contains("what is attention?"));
        assert!(!prompt.contains("{context}"));
        assert!(!prompt.contains("{query}"));
        assert!(!prompt.contains("{date}"));
    }

    #[test]
    fn test_from_config_ollama() {
        let config = GenerationConfig::default();
        assert!(matches!(
            Generator::from_config(&config),
            Ok(Generator::Ollama(_))
        ));
    }

    #[test]
    fn test_from_config_unknown_provider() {
        let config = GenerationConfig {
            provider: "gpt-from-scratch".to_string(),
            ..GenerationConfig::default()
        };
        let err = Generator::from_config(&config).unwrap_err();
        assert!(matches!(err, ScholaragError::Config(_)));
        assert!(err.to_string().contains("gpt-from-scratch"));
    }

    #[tokio::test]
    async fn test_single_fragment() {
        let mut rx = single_fragment("only message".to_string());
        assert_eq!(rx.recv().await.unwrap().unwrap(), "only message");
        assert!(rx.recv().await.is_none());
    }
}
