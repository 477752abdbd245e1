use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use futures::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::mem;
use std::pin::Pin;
use std::time::Duration;

use crate::relay::provider::{
    ChatMessage, CompletionProvider, CompletionRequest, ProviderError, TokenChunks,
};

pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Clone)]
pub struct GroqClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct GroqRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GroqStreamChunk {
    #[serde(default)]
    choices: Vec<GroqStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct GroqStreamChoice {
    #[serde(default)]
    delta: GroqDelta,
}

#[derive(Debug, Default, Deserialize)]
struct GroqDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroqErrorResponse {
    error: GroqErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GroqErrorDetail {
    message: String,
}

impl GroqClient {
    pub fn new(
        api_key: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn parse_error_response(status: reqwest::StatusCode, body: &str) -> ProviderError {
        let message = serde_json::from_str::<GroqErrorResponse>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.chars().take(200).collect());

        ProviderError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl CompletionProvider for GroqClient {
    fn name(&self) -> &'static str {
        "groq"
    }

    // Streaming requests are never retried: the caller may already hold partial output.
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<TokenChunks, ProviderError> {
        let body = GroqRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!("Groq API returned {}: {}", status, text);
            return Err(Self::parse_error_response(status, &text));
        }

        Ok(token_stream(response.bytes_stream()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Buffers partial lines across network chunks and yields complete SSE events.
/// Bytes are kept raw until a full line arrives so multi-byte characters split
/// between chunks decode intact.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Parses whatever is left once the byte stream ends.
    pub fn flush(&mut self) -> Vec<SseEvent> {
        let remaining = mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&remaining))
            .into_iter()
            .collect()
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    Some(SseEvent::Data(data.to_string()))
}

/// Extracts the delta text from one `data:` payload. `Ok(None)` for
/// metadata-only chunks.
pub fn parse_chunk(data: &str) -> Result<Option<String>, ProviderError> {
    let chunk: GroqStreamChunk =
        serde_json::from_str(data).map_err(|e| ProviderError::Decode(e.to_string()))?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

struct StreamState<S> {
    bytes: Pin<Box<S>>,
    parser: SseLineBuffer,
    pending: VecDeque<Result<String, ProviderError>>,
    finished: bool,
}

impl<S> StreamState<S> {
    fn queue(&mut self, events: Vec<SseEvent>) {
        for event in events {
            if self.finished {
                break;
            }
            match event {
                SseEvent::Done => self.finished = true,
                SseEvent::Data(data) => match parse_chunk(&data) {
                    Ok(Some(text)) => self.pending.push_back(Ok(text)),
                    Ok(None) => {}
                    Err(e) => {
                        self.pending.push_back(Err(e));
                        self.finished = true;
                    }
                },
            }
        }
    }
}

fn token_stream<S, B>(bytes: S) -> TokenChunks
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = StreamState {
        bytes: Box::pin(bytes),
        parser: SseLineBuffer::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.parser.feed(chunk.as_ref());
                    state.queue(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(ProviderError::Stream(e.to_string())), state));
                }
                None => {
                    let events = state.parser.flush();
                    state.queue(events);
                    state.finished = true;
                }
            }
        }
    }))
}
