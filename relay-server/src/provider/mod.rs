//! Model provider abstraction.
//!
//! The relay sends one instruction per turn, built from the cached graph
//! context and the user's prompt, optionally with an inline image. Providers
//! return the generated text.

mod bedrock;
mod sigv4;

pub use bedrock::{BedrockAuth, BedrockProvider};
pub use sigv4::{sign_request, AwsCredentials, SignedHeaders, SigningError};

use crate::image::InlineImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Output cap for every generation.
pub const MAX_OUTPUT_TOKENS: u32 = 512;

/// Sampling temperature for every generation.
pub const TEMPERATURE: f32 = 0.7;

// ============================================================================
// Provider Trait
// ============================================================================

/// Unified interface for text-generation backends.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Model identifier used for every request.
    fn model(&self) -> &str;

    /// Generate a reply for one turn.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    pub fn new(provider: &str, model: &str, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}

// ============================================================================
// Request/Response Types
// ============================================================================

/// One generation turn.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Graph context for the session's child
    pub context: String,
    /// User prompt, as received
    pub prompt: String,
    /// Image attached to the prompt
    pub image: Option<InlineImage>,
}

impl GenerationRequest {
    pub fn text(context: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(image);
        self
    }

    /// Instruction text sent to the model.
    pub fn instruction(&self) -> String {
        build_instruction(&self.context, &self.prompt)
    }
}

/// Generated reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Provider name
    pub provider: String,
    /// Model used
    pub model: String,
    /// Response text
    pub content: String,
    /// Token usage
    pub usage: TokenUsage,
    /// Stop reason reported by the model
    pub finish_reason: Option<String>,
    /// Response latency in milliseconds
    pub latency_ms: u64,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

/// Combine graph context and prompt into the model instruction.
pub fn build_instruction(context: &str, prompt: &str) -> String {
    format!(
        "Context: {context}\nInstruction: {prompt}\n\
         Respond in 4\u{2013}6 sentences, empathetic tone, parent-friendly."
    )
}
