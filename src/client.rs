//! Streaming chat-completion client for OpenAI-compatible endpoints.
//!
//! One call per file: the request is sent with `stream: true`, every content
//! delta is appended to a local buffer and handed to a [`FragmentObserver`],
//! and the finished buffer goes through [`extract_code_block`].

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::fence::extract_code_block;
use crate::prompt::user_message;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Stop sequence: a closing fence followed by a line break.
const STOP_SEQUENCE: &str = "```\n";
const DONE_SENTINEL: &str = "[DONE]";
const ERROR_BODY_LIMIT: usize = 160;

/// Receives streamed text fragments in arrival order.
pub trait FragmentObserver {
    /// Called once for every non-empty fragment.
    fn on_fragment(&mut self, fragment: &str);

    /// Called after the last fragment of a response.
    fn on_finish(&mut self) {}
}

impl<F: FnMut(&str)> FragmentObserver for F {
    fn on_fragment(&mut self, fragment: &str) {
        self(fragment);
    }
}

/// Observer that drops every fragment.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl FragmentObserver for Silent {
    fn on_fragment(&mut self, _fragment: &str) {}
}

/// Echoes fragments to a writer one complete line at a time.
///
/// Fragments are buffered until one containing a newline arrives, then the
/// whole buffer is written. [`FragmentObserver::on_finish`] flushes the
/// remainder and terminates it with a newline.
#[derive(Debug)]
pub struct LineEcho<W: Write> {
    line: String,
    out: W,
}

impl<W: Write> LineEcho<W> {
    /// Creates an echo writing to `out`.
    #[must_use]
    pub const fn new(out: W) -> Self {
        Self {
            line: String::new(),
            out,
        }
    }

    /// Consumes the echo and returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self) {
        if self.line.is_empty() {
            return;
        }
        if let Err(e) = self
            .out
            .write_all(self.line.as_bytes())
            .and_then(|()| self.out.flush())
        {
            debug!("Token echo failed: {e}");
        }
        self.line.clear();
    }
}

impl<W: Write> FragmentObserver for LineEcho<W> {
    fn on_fragment(&mut self, fragment: &str) {
        self.line.push_str(fragment);
        if fragment.contains('\n') {
            self.emit();
        }
    }

    fn on_finish(&mut self) {
        if !self.line.is_empty() && !self.line.ends_with('\n') {
            self.line.push('\n');
        }
        self.emit();
    }
}

/// Everything needed to rewrite one file.
#[derive(Debug, Clone)]
pub struct RewriteRequest {
    relative_path: PathBuf,
    source: String,
    language: String,
    system_prompt: String,
}

impl RewriteRequest {
    /// Creates a request for the file at `relative_path`.
    #[must_use]
    pub fn new(
        relative_path: impl Into<PathBuf>,
        source: impl Into<String>,
        language: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            relative_path: relative_path.into(),
            source: source.into(),
            language: language.into(),
            system_prompt: system_prompt.into(),
        }
    }

    /// Path relative to the root directory, used as a display label.
    #[must_use]
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Original source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Human-readable language name.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Lowercased language name used as the fence tag.
    #[must_use]
    pub fn language_tag(&self) -> String {
        self.language.to_lowercase()
    }

    /// System instruction for the model.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFragment {
    /// Text delta, possibly empty.
    Text(String),
    /// End-of-stream marker.
    Done,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct RewriteClient {
    http: Client,
    config: ConnectionConfig,
}

impl RewriteClient {
    /// Creates a client for the given connection settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to configure HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Returns the connection settings.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Streams a rewrite of `request` and returns the extracted code.
    ///
    /// Every non-empty fragment is passed to `observer` as it arrives.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the endpoint cannot be reached
    /// - [`Error::Api`] on a non-success HTTP status
    /// - [`Error::Stream`] if the event stream breaks or cannot be decoded
    /// - [`Error::Extraction`] if the response has no block for the language
    pub async fn rewrite(
        &self,
        request: &RewriteRequest,
        observer: &mut dyn FragmentObserver,
    ) -> Result<String> {
        let url = self.config.completions_url();
        let tag = request.language_tag();
        let label = request.relative_path().display().to_string();

        let payload = ChatCompletionsRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system_prompt().to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_message(&label, &tag, request.source()),
                },
            ],
            stream: true,
            stop: [STOP_SEQUENCE],
        };

        debug!("POST {} (model {}) for {}", url, self.config.model, label);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::connection(&url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.map_or_else(
                |_| "(failed to read error response body)".to_string(),
                |text| truncate_for_message(&text, ERROR_BODY_LIMIT),
            );
            return Err(Error::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let fragments = response.bytes_stream().eventsource().map(|event| {
            let event = event.map_err(|e| Error::stream(e.to_string()))?;
            trace!("SSE event {:?}: {}", event.event, event.data);
            parse_event_data(&event.data)
        });

        let text = collect_fragments(std::pin::pin!(fragments), observer).await?;
        extract_code_block(&text, &tag)
    }
}

/// Accumulates text fragments until the stream ends or yields [`StreamFragment::Done`].
///
/// Non-empty fragments are appended in arrival order and forwarded to
/// `observer`; `on_finish` is called once the stream is exhausted.
///
/// # Errors
///
/// Returns the first error produced by the stream.
pub async fn collect_fragments<S>(
    mut fragments: S,
    observer: &mut dyn FragmentObserver,
) -> Result<String>
where
    S: Stream<Item = Result<StreamFragment>> + Unpin,
{
    let mut accumulated = String::new();

    while let Some(fragment) = fragments.next().await {
        match fragment? {
            StreamFragment::Text(text) if text.is_empty() => {}
            StreamFragment::Text(text) => {
                accumulated.push_str(&text);
                observer.on_fragment(&text);
            }
            StreamFragment::Done => break,
        }
    }

    observer.on_finish();
    Ok(accumulated)
}

/// Decodes the `data:` payload of one OpenAI stream event.
fn parse_event_data(data: &str) -> Result<StreamFragment> {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Ok(StreamFragment::Done);
    }
    if data.is_empty() {
        return Ok(StreamFragment::Text(String::new()));
    }

    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| Error::stream(format!("undecodable chunk: {e}")))?;

    Ok(StreamFragment::Text(
        chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .unwrap_or_default(),
    ))
}

fn truncate_for_message(message: &str, max_chars: usize) -> String {
    let mut output: String = message.chars().take(max_chars).collect();
    if message.chars().nth(max_chars).is_some() {
        output.push_str("...");
    }
    output
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: [ChatMessage; 2],
    stream: bool,
    stop: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
