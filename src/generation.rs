//! Generation service clients.
//!
//! - **[`OllamaClient`]**: `POST /api/chat` on a local Ollama server, with
//!   `format: "json"` when structured output is requested. Reachability is
//!   checked with `GET /api/tags`.
//! - **[`OpenAIChatClient`]**: any OpenAI-compatible `/v1/chat/completions`
//!   endpoint, with `response_format: json_object` for structured output.
//!
//! Calls are not retried. A timeout or connection failure surfaces as a
//! [`GenerationError`] immediately so the caller can fall back.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use coverage_harness_core::generation::{GenerationError, GenerationRequest, GenerationService};

use crate::config::GenerationConfig;
use crate::embedding::DEFAULT_OLLAMA_URL;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

fn chat_messages(request: &GenerationRequest) -> Vec<Value> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": request.prompt}));
    messages
}

fn transport_error(e: reqwest::Error, url: &str, timeout_secs: u64) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout(timeout_secs)
    } else {
        GenerationError::Unreachable {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

async fn post_chat(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    timeout_secs: u64,
) -> Result<Value, GenerationError> {
    let mut request = client.post(url).json(body);
    if let Some(token) = bearer {
        request = request.header("Authorization", format!("Bearer {}", token));
    }

    let response = request
        .send()
        .await
        .map_err(|e| transport_error(e, url, timeout_secs))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GenerationError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| GenerationError::Malformed(e.to_string()))
}

// ============ Ollama ============

pub struct OllamaClient {
    model: String,
    base_url: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(model: impl Into<String>, base_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Request body for Ollama's `/api/chat`.
pub fn ollama_chat_body(model: &str, request: &GenerationRequest) -> Value {
    let mut body = json!({
        "model": model,
        "messages": chat_messages(request),
        "stream": false,
        "options": {"temperature": request.temperature},
    });
    if request.json_mode {
        body["format"] = json!("json");
    }
    body
}

fn ollama_content(reply: &Value) -> Result<String, GenerationError> {
    reply
        .pointer("/message/content")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| GenerationError::Malformed("missing message.content".to_string()))
}

#[async_trait]
impl GenerationService for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ollama_chat_body(&self.model, request);
        let reply = post_chat(&self.client, &url, None, &body, self.timeout_secs).await?;
        ollama_content(&reply)
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAIChatClient {
    model: String,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OpenAIChatClient {
    pub fn new(
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout_secs,
            client,
        })
    }
}

/// Request body for `/v1/chat/completions`.
pub fn openai_chat_body(model: &str, request: &GenerationRequest) -> Value {
    let mut body = json!({
        "model": model,
        "messages": chat_messages(request),
        "temperature": request.temperature,
    });
    if request.json_mode {
        body["response_format"] = json!({"type": "json_object"});
    }
    body
}

fn openai_content(reply: &Value) -> Result<String, GenerationError> {
    reply
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| GenerationError::Malformed("missing choices[0].message.content".to_string()))
}

#[async_trait]
impl GenerationService for OpenAIChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = openai_chat_body(&self.model, request);
        let reply = post_chat(
            &self.client,
            &url,
            Some(&self.api_key),
            &body,
            self.timeout_secs,
        )
        .await?;
        openai_content(&reply)
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/v1/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Create the configured [`GenerationService`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerationService>> {
    match config.provider.as_str() {
        "ollama" => {
            let url = config.url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
            Ok(Arc::new(OllamaClient::new(
                &config.model,
                url,
                config.timeout_secs,
            )?))
        }
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
            let url = config.url.as_deref().unwrap_or(DEFAULT_OPENAI_URL);
            Ok(Arc::new(OpenAIChatClient::new(
                &config.model,
                url,
                api_key,
                config.timeout_secs,
            )?))
        }
        other => Err(anyhow!("Unknown generation provider: {}", other)),
    }
}
