//! Generation service abstraction.
//!
//! The generation service is a text-in/text-out collaborator. Its output
//! shape is never trusted: query expansion and answer normalization both
//! treat a failed or malformed response as an expected outcome.

use async_trait::async_trait;
use thiserror::Error;

/// A single prompt sent to the generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    /// Ask the service to constrain its output to JSON.
    pub json_mode: bool,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: 0.2,
            json_mode: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Failure talking to the generation service.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation service unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },
    #[error("generation request timed out after {0}s")]
    Timeout(u64),
    #[error("generation service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed generation response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Model identifier reported in verdict metadata.
    fn model_name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Cheap reachability check.
    async fn is_available(&self) -> bool {
        true
    }
}
