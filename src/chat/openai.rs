use crate::chat::message::{ChatMessage, ChatMessagePart, Role};
use crate::chat::stream::{CompletionBackend, CompletionRequest};
use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Blocking client for an OpenAI-compatible `/chat/completions` endpoint
/// using server-sent events.
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    system_prompt: Option<String>,
}

impl OpenAiBackend {
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Option<Duration>,
        system_prompt: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("snip_chat completion client")
            .build()
            .context("build completion http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
            system_prompt: system_prompt.filter(|prompt| !prompt.trim().is_empty()),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(json!({"role": "system", "content": prompt}));
        }
        messages.extend(request.messages.iter().map(wire_message));
        json!({
            "model": request.model,
            "messages": messages,
            "stream": request.stream,
        })
    }
}

impl CompletionBackend for OpenAiBackend {
    fn stream_completion(
        &self,
        request: &CompletionRequest,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<()> {
        let body = serde_json::to_vec(&self.request_body(request))
            .context("serialize completion request")?;
        let mut builder = self
            .client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .with_context(|| format!("send completion request to {}", self.endpoint()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("completion request failed with {status}: {}", body.trim());
        }

        let reader = BufReader::new(response);
        for line in reader.lines() {
            let line = line.context("read completion stream")?;
            match parse_sse_line(&line) {
                SseLine::Chunk(text) => on_chunk(&text),
                SseLine::Done => return Ok(()),
                SseLine::Skip => {}
                SseLine::Error(message) => bail!("completion stream error: {message}"),
            }
        }
        Ok(())
    }
}

fn wire_message(message: &ChatMessage) -> Value {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    if message.role == Role::Assistant {
        return json!({"role": role, "content": message.text()});
    }
    let content: Vec<Value> = message
        .parts
        .iter()
        .map(|part| match part {
            ChatMessagePart::Text { text } => json!({"type": "text", "text": text}),
            ChatMessagePart::Image(image) => json!({
                "type": "image_url",
                "image_url": {"url": image.data_url()},
            }),
        })
        .collect();
    json!({"role": role, "content": content})
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    Chunk(String),
    Done,
    Skip,
    Error(String),
}

/// Interprets one line of an event stream body.
pub fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim_end_matches('\r').strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        return SseLine::Skip;
    }
    if data == "[DONE]" {
        return SseLine::Done;
    }
    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(err) => return SseLine::Error(format!("malformed event: {err}")),
    };
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return SseLine::Error(message);
    }
    match value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        Some(text) if !text.is_empty() => SseLine::Chunk(text.to_string()),
        _ => SseLine::Skip,
    }
}
