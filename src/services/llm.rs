//! Streaming text generation.

use crate::error::{Result, VoxbotError};
use crate::pipeline::history::ConversationTurn;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Lazy, finite sequence of reply fragments.
pub type TokenStream = Box<dyn Iterator<Item = Result<String>> + Send>;

/// Trait for streaming chat completion.
pub trait LanguageModel: Send + Sync {
    /// Start generating a reply to `history`, with `system_prompt` prepended.
    fn stream_completion(
        &self,
        history: &[ConversationTurn],
        system_prompt: &str,
    ) -> Result<TokenStream>;

    fn model_name(&self) -> &str;
}

impl<T: LanguageModel> LanguageModel for Arc<T> {
    fn stream_completion(
        &self,
        history: &[ConversationTurn],
        system_prompt: &str,
    ) -> Result<TokenStream> {
        (**self).stream_completion(history, system_prompt)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Messages sent to the model: the system prompt (when non-empty) then the history.
pub fn build_messages(history: &[ConversationTurn], system_prompt: &str) -> Vec<ConversationTurn> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if !system_prompt.trim().is_empty() {
        messages.push(ConversationTurn::system(system_prompt));
    }
    messages.extend_from_slice(history);
    messages
}

/// Mock language model for testing
///
/// Replies are consumed in order; once exhausted the last reply repeats.
#[derive(Clone)]
pub struct MockLanguageModel {
    replies: Arc<Mutex<Vec<Vec<String>>>>,
    token_delay: Duration,
    should_fail: bool,
    requests: Arc<Mutex<Vec<Vec<ConversationTurn>>>>,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(Vec::new())),
            token_delay: Duration::ZERO,
            should_fail: false,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a reply streamed as the given tokens.
    pub fn with_reply(self, tokens: &[&str]) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tokens.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Sleep before yielding each token.
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Fail every request.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Message lists received so far, system prompt included.
    pub fn requests(&self) -> Vec<Vec<ConversationTurn>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageModel for MockLanguageModel {
    fn stream_completion(
        &self,
        history: &[ConversationTurn],
        system_prompt: &str,
    ) -> Result<TokenStream> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(build_messages(history, system_prompt));

        if self.should_fail {
            return Err(VoxbotError::LanguageModel {
                message: "mock generation failure".to_string(),
            });
        }

        let tokens = {
            let mut replies = self.replies.lock().unwrap_or_else(PoisonError::into_inner);
            match replies.len() {
                0 => Vec::new(),
                1 => replies[0].clone(),
                _ => replies.remove(0),
            }
        };
        let delay = self.token_delay;
        Ok(Box::new(tokens.into_iter().map(move |token| {
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            Ok(token)
        })))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(feature = "http")]
pub use openrouter::OpenRouterClient;

/// One parsed server-sent-events line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    Token(String),
    Done,
    /// Comments, keep-alives, empty deltas and malformed payloads.
    Skip,
}

/// Parse one line of an OpenAI-compatible streaming response.
pub fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data: ") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    let Ok(chunk) = serde_json::from_str::<serde_json::Value>(data) else {
        tracing::debug!(line = data, "skipping malformed stream chunk");
        return SseLine::Skip;
    };
    match chunk
        .pointer("/choices/0/delta/content")
        .and_then(|content| content.as_str())
    {
        Some(content) if !content.is_empty() => SseLine::Token(content.to_string()),
        _ => SseLine::Skip,
    }
}

#[cfg(feature = "http")]
mod openrouter {
    use super::{LanguageModel, SseLine, TokenStream, build_messages, parse_sse_line};
    use crate::config::OpenRouterConfig;
    use crate::error::{Result, VoxbotError};
    use crate::pipeline::history::ConversationTurn;
    use crate::services::pool::ConnectionPool;
    use serde::Serialize;
    use std::io::{BufRead, BufReader, Lines};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Serialize)]
    struct ChatRequest<'a> {
        model: &'a str,
        messages: &'a [ConversationTurn],
        stream: bool,
        temperature: f32,
        max_tokens: u32,
    }

    /// OpenRouter (OpenAI-compatible) chat completions client.
    pub struct OpenRouterClient {
        pool: Arc<ConnectionPool>,
        config: OpenRouterConfig,
        model: String,
    }

    impl OpenRouterClient {
        pub fn new(pool: Arc<ConnectionPool>, config: OpenRouterConfig, model: &str) -> Self {
            Self {
                pool,
                config,
                model: model.to_string(),
            }
        }
    }

    impl LanguageModel for OpenRouterClient {
        fn stream_completion(
            &self,
            history: &[ConversationTurn],
            system_prompt: &str,
        ) -> Result<TokenStream> {
            let api_key = self
                .config
                .api_key
                .as_deref()
                .ok_or_else(|| VoxbotError::LanguageModel {
                    message: "OpenRouter API key is not configured".to_string(),
                })?;
            let messages = build_messages(history, system_prompt);
            let body = serde_json::to_vec(&ChatRequest {
                model: &self.model,
                messages: &messages,
                stream: true,
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            })?;

            let url = format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            );
            tracing::debug!(model = %self.model, messages = messages.len(), "requesting completion");
            let response = self
                .pool
                .client()?
                .post(&url)
                .bearer_auth(api_key)
                .header("Content-Type", "application/json")
                .timeout(Duration::from_secs(self.config.timeout_secs))
                .body(body)
                .send()?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().unwrap_or_default();
                return Err(VoxbotError::LanguageModel {
                    message: format!("status {}: {}", status, detail),
                });
            }

            Ok(Box::new(SseTokens {
                lines: BufReader::new(response).lines(),
                done: false,
            }))
        }

        fn model_name(&self) -> &str {
            &self.model
        }
    }

    struct SseTokens<R> {
        lines: Lines<BufReader<R>>,
        done: bool,
    }

    impl<R: std::io::Read> Iterator for SseTokens<R> {
        type Item = Result<String>;

        fn next(&mut self) -> Option<Self::Item> {
            if self.done {
                return None;
            }
            loop {
                match self.lines.next()? {
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e.into()));
                    }
                    Ok(line) => match parse_sse_line(&line) {
                        SseLine::Token(token) => return Some(Ok(token)),
                        SseLine::Done => {
                            self.done = true;
                            return None;
                        }
                        SseLine::Skip => continue,
                    },
                }
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_token_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Token("Hello".to_string()));
    }

    #[test]
    fn parse_done_line() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
    }

    #[test]
    fn parse_skips_noise() {
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(parse_sse_line(": OPENROUTER PROCESSING"), SseLine::Skip);
        assert_eq!(parse_sse_line("data: {not json"), SseLine::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Skip
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            SseLine::Skip
        );
        assert_eq!(parse_sse_line(r#"data: {"choices":[]}"#), SseLine::Skip);
    }

    #[test]
    fn messages_prepend_system_prompt() {
        let history = vec![ConversationTurn::user("hi")];
        let messages = build_messages(&history, "be brief");
        assert_eq!(
            messages,
            vec![ConversationTurn::system("be brief"), ConversationTurn::user("hi")]
        );
        assert_eq!(build_messages(&history, "  ").len(), 1);
    }

    #[test]
    fn mock_streams_replies_in_order() {
        let model = MockLanguageModel::new()
            .with_reply(&["One", "."])
            .with_reply(&["Two", "."]);
        let first: Vec<String> = model
            .stream_completion(&[], "sys")
            .unwrap()
            .map(|t| t.unwrap())
            .collect();
        let second: Vec<String> = model
            .stream_completion(&[], "sys")
            .unwrap()
            .map(|t| t.unwrap())
            .collect();
        let third: Vec<String> = model
            .stream_completion(&[], "sys")
            .unwrap()
            .map(|t| t.unwrap())
            .collect();
        assert_eq!(first, vec!["One", "."]);
        assert_eq!(second, vec!["Two", "."]);
        assert_eq!(third, vec!["Two", "."]);
        assert_eq!(model.requests().len(), 3);
        assert_eq!(model.requests()[0][0], ConversationTurn::system("sys"));
    }

    #[test]
    fn mock_failure() {
        let model = MockLanguageModel::new().with_failure();
        assert!(model.stream_completion(&[], "").is_err());
    }
}
