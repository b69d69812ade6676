//! `OpenAI` Chat Completions API driver.
//!
//! Requests are always streamed. [`ChatCompletionsDriver::stream_text`]
//! exposes the raw text deltas; [`TextGenerator::generate`] folds them into
//! one reply string.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use tracing::{debug, instrument};

use super::provider::AuthScheme;
use super::{GenerationError, LlmSettings, Message, TextGenerator};

/// Boxed stream of assistant text deltas.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

const MAX_ERROR_BODY: usize = 512;

/// Driver for the `OpenAI` Chat Completions API.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .field("provider", &self.settings.provider)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    fn request_body(&self, messages: &[Message]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "stream": true,
            "messages": messages,
        });
        if self.settings.provider.sends_model_in_body() {
            body["model"] = serde_json::Value::String(self.settings.model.clone());
        }
        body
    }

    /// Send the request and stream assistant text deltas.
    pub async fn stream_text(&self, messages: &[Message]) -> Result<TextStream, GenerationError> {
        let url = self.settings.provider.build_chat_url(&self.settings.base_url);
        let body = self.request_body(messages);

        let mut rb = self.http.post(&url).json(&body);
        if let Some(k) = &self.settings.api_key {
            rb = match self.settings.provider.auth_scheme() {
                AuthScheme::Bearer => rb.bearer_auth(k),
                AuthScheme::ApiKeyHeader => rb.header("api-key", k),
            };
        }

        let resp = rb.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            truncate_in_place(&mut body, MAX_ERROR_BODY);
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let byte_stream = resp.bytes_stream();

        let out = async_stream::try_stream! {
            let mut buf = Vec::<u8>::new();

            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                buf.extend_from_slice(&chunk);

                while let Some((pos, delim)) = find_frame_end(&buf) {
                    let frame = buf.drain(..pos + delim).collect::<Vec<_>>();
                    let text = String::from_utf8_lossy(&frame);

                    for data in sse_data_lines(&text) {
                        if data == "[DONE]" {
                            continue;
                        }
                        let v: serde_json::Value = serde_json::from_str(data)?;
                        if let Some(delta) = content_delta(&v) {
                            yield delta.to_string();
                        }
                    }
                }
            }
        };

        Ok(boxed(out))
    }
}

fn boxed<S>(stream: S) -> TextStream
where
    S: Stream<Item = Result<String, GenerationError>> + Send + 'static,
{
    Box::pin(stream)
}

#[async_trait::async_trait]
impl TextGenerator for ChatCompletionsDriver {
    #[instrument(skip(self, messages), fields(message_count = messages.len(), model = %self.settings.model))]
    async fn generate(&self, messages: &[Message]) -> Result<String, GenerationError> {
        let mut stream = self.stream_text(messages).await?;
        let mut reply = String::new();
        while let Some(delta) = stream.next().await {
            reply.push_str(&delta?);
        }

        if reply.trim().is_empty() {
            return Err(GenerationError::EmptyReply);
        }
        debug!(reply_len = reply.len(), "Generation complete");
        Ok(reply)
    }
}

/// Position and length of the first SSE frame delimiter, `\n\n` or
/// `\r\n\r\n`.
fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Payloads of the `data:` lines in one SSE frame.
fn sse_data_lines(frame: &str) -> impl Iterator<Item = &str> {
    frame.lines().filter_map(|line| {
        line.trim()
            .strip_prefix("data:")
            .map(str::trim)
    })
}

/// Non-empty assistant text carried by a streamed chunk.
fn content_delta(chunk: &serde_json::Value) -> Option<&str> {
    chunk["choices"][0]["delta"]
        .get("content")
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
}

fn truncate_in_place(s: &mut String, max_len: usize) {
    if s.len() > max_len {
        let cut = (0..=max_len).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0);
        s.truncate(cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Provider;

    fn settings(provider: Provider) -> LlmSettings {
        LlmSettings {
            base_url: "https://example.test".to_string(),
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            provider,
        }
    }

    #[test]
    fn test_find_frame_end() {
        assert_eq!(find_frame_end(b"data: x\n\ndata: y"), Some((7, 2)));
        assert_eq!(find_frame_end(b"data: x\n"), None);
    }

    #[test]
    fn test_find_frame_end_crlf() {
        assert_eq!(find_frame_end(b"data: x\r\n\r\ndata: y"), Some((7, 4)));
        assert_eq!(find_frame_end(b"data: x\r\n"), None);
        // earliest delimiter wins when both styles are buffered
        assert_eq!(find_frame_end(b"data: a\r\n\r\ndata: b\n\n"), Some((7, 4)));

        let frame = "data: {\"a\":1}\r\n\r\n";
        let lines: Vec<&str> = sse_data_lines(frame).collect();
        assert_eq!(lines, vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_sse_data_lines_skips_comments() {
        let frame = ": keep-alive\ndata: {\"a\":1}\n\n";
        let lines: Vec<&str> = sse_data_lines(frame).collect();
        assert_eq!(lines, vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_content_delta() {
        let chunk = serde_json::json!({"choices": [{"delta": {"content": "Hi"}}]});
        assert_eq!(content_delta(&chunk), Some("Hi"));

        let role_only = serde_json::json!({"choices": [{"delta": {"role": "assistant"}}]});
        assert_eq!(content_delta(&role_only), None);

        let empty = serde_json::json!({"choices": [{"delta": {"content": ""}}]});
        assert_eq!(content_delta(&empty), None);
    }

    #[test]
    fn test_request_body_model_field() {
        let messages = vec![Message::system("sys"), Message::user("hi")];

        let driver = ChatCompletionsDriver::new(settings(Provider::OpenAI));
        let body = driver.request_body(&messages);
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["messages"][1]["content"], "hi");

        let azure = ChatCompletionsDriver::new(settings(Provider::AzureOpenAI {
            deployment_name: "d".to_string(),
            api_version: "v".to_string(),
        }));
        assert!(azure.request_body(&messages).get("model").is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let mut s = "héllo".to_string();
        truncate_in_place(&mut s, 2);
        assert_eq!(s, "h");
    }
}
