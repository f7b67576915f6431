//! Amazon Bedrock provider for Nova models (`messages-v1` schema).

use super::sigv4::{self, sign_request, AwsCredentials};
use super::{
    GenerationRequest, GenerationResponse, ModelProvider, ProviderError, TokenUsage,
    MAX_OUTPUT_TOKENS, TEMPERATURE,
};
use async_trait::async_trait;
use relay_common::config::Config;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const SIGNING_SERVICE: &str = "bedrock";

/// How requests to the runtime are authenticated.
#[derive(Debug, Clone)]
pub enum BedrockAuth {
    /// Bedrock API key sent as a bearer token.
    Bearer(String),
    /// SigV4 with static credentials.
    SigV4(AwsCredentials),
    /// Nothing configured. Every call fails until credentials are provided.
    Missing,
}

impl BedrockAuth {
    /// Pick the auth mode from secrets. A bearer token wins over key pairs.
    pub fn from_config(config: &Config) -> Self {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        let secrets = &config.secrets;

        if let Some(token) = non_empty(&secrets.bedrock_bearer_token) {
            return Self::Bearer(token);
        }

        match (
            non_empty(&secrets.aws_access_key_id),
            non_empty(&secrets.aws_secret_access_key),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Self::SigV4(AwsCredentials {
                access_key_id,
                secret_access_key,
                session_token: non_empty(&secrets.aws_session_token),
            }),
            _ => Self::Missing,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Bearer(_) => "bearer",
            Self::SigV4(_) => "sigv4",
            Self::Missing => "none",
        }
    }
}

/// Bedrock runtime provider.
pub struct BedrockProvider {
    client: reqwest::Client,
    endpoint: String,
    region: String,
    model_id: String,
    auth: BedrockAuth,
}

impl BedrockProvider {
    /// Create a provider against an explicit runtime endpoint.
    pub fn new(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        model_id: impl Into<String>,
        auth: BedrockAuth,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            region: region.into(),
            model_id: model_id.into(),
            auth,
        }
    }

    /// Build from relay configuration.
    pub fn from_config(config: &Config) -> Self {
        let auth = BedrockAuth::from_config(config);
        if matches!(auth, BedrockAuth::Missing) {
            tracing::warn!("No Bedrock credentials configured; model calls will fail");
        }
        tracing::info!(
            region = %config.bedrock.region,
            model = %config.bedrock.model_id,
            auth = auth.kind(),
            "Bedrock provider configured"
        );

        Self::new(
            config.bedrock.endpoint_url(),
            config.bedrock.region.clone(),
            config.bedrock.model_id.clone(),
            auth,
            Duration::from_secs(config.bedrock.timeout_secs),
        )
    }

    /// Invoke URL. The model id is percent-encoded as one path segment.
    pub fn invoke_url(&self) -> String {
        format!(
            "{}/model/{}/invoke",
            self.endpoint,
            sigv4::uri_encode(&self.model_id)
        )
    }

    fn error(&self, message: impl Into<String>) -> ProviderError {
        ProviderError::new("bedrock", &self.model_id, message)
    }

    fn build_body(request: &GenerationRequest) -> NovaRequest {
        let mut content = Vec::with_capacity(2);
        if let Some(ref image) = request.image {
            content.push(NovaContent::Image {
                image: NovaImage {
                    format: image.format.as_str(),
                    source: NovaImageSource {
                        bytes: image.to_base64(),
                    },
                },
            });
        }
        content.push(NovaContent::Text {
            text: request.instruction(),
        });

        NovaRequest {
            schema_version: "messages-v1",
            messages: vec![NovaMessage {
                role: "user",
                content,
            }],
            inference_config: InferenceConfig {
                max_tokens: MAX_OUTPUT_TOKENS,
                temperature: TEMPERATURE,
            },
        }
    }
}

#[async_trait]
impl ModelProvider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock"
    }

    fn model(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let start = Instant::now();
        let url = self.invoke_url();
        let body = serde_json::to_vec(&Self::build_body(&request))
            .map_err(|e| self.error(format!("Failed to encode request: {e}")))?;

        let mut builder = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");

        builder = match &self.auth {
            BedrockAuth::Bearer(token) => builder.bearer_auth(token),
            BedrockAuth::SigV4(credentials) => {
                let parsed = url::Url::parse(&url)
                    .map_err(|e| self.error(format!("Invalid endpoint: {e}")))?;
                let signed = sign_request(
                    "POST",
                    &parsed,
                    &body,
                    credentials,
                    &self.region,
                    SIGNING_SERVICE,
                    chrono::Utc::now(),
                )
                .map_err(|e| self.error(format!("Failed to sign request: {e}")))?;

                let mut signed_builder = builder
                    .header(AUTHORIZATION, signed.authorization)
                    .header("x-amz-date", signed.amz_date);
                if let Some(token) = signed.security_token {
                    signed_builder = signed_builder.header("x-amz-security-token", token);
                }
                signed_builder
            }
            BedrockAuth::Missing => {
                return Err(self.error("No AWS credentials configured"));
            }
        };

        let response = builder
            .body(body)
            .send()
            .await
            .map_err(|e| self.error(format!("Request failed: {e}")))?;

        let status = response.status();
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<BedrockErrorBody>(&text)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or(text);
            return Err(self
                .error(format!("API error: {message}"))
                .with_status(status.as_u16()));
        }

        let nova: NovaResponse = response
            .json()
            .await
            .map_err(|e| self.error(format!("Failed to parse response: {e}")))?;

        let content = nova
            .output
            .message
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(self.error("Response contained no text"));
        }

        let usage = nova
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
                total_tokens: u.total_tokens.unwrap_or(u.input_tokens + u.output_tokens),
            })
            .unwrap_or_default();

        tracing::debug!(
            model = %self.model_id,
            latency_ms,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Bedrock invocation completed"
        );

        Ok(GenerationResponse {
            provider: "bedrock".into(),
            model: self.model_id.clone(),
            content,
            usage,
            finish_reason: nova.stop_reason,
            latency_ms,
        })
    }
}

// ============================================================================
// Nova API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NovaRequest {
    schema_version: &'static str,
    messages: Vec<NovaMessage>,
    inference_config: InferenceConfig,
}

#[derive(Debug, Serialize)]
struct NovaMessage {
    role: &'static str,
    content: Vec<NovaContent>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum NovaContent {
    Text { text: String },
    Image { image: NovaImage },
}

#[derive(Debug, Serialize)]
struct NovaImage {
    format: &'static str,
    source: NovaImageSource,
}

#[derive(Debug, Serialize)]
struct NovaImageSource {
    bytes: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InferenceConfig {
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NovaResponse {
    output: NovaOutput,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<NovaUsage>,
}

#[derive(Debug, Deserialize)]
struct NovaOutput {
    message: NovaOutputMessage,
}

#[derive(Debug, Deserialize)]
struct NovaOutputMessage {
    #[serde(default)]
    content: Vec<NovaOutputBlock>,
}

#[derive(Debug, Deserialize)]
struct NovaOutputBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NovaUsage {
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
    #[serde(default)]
    total_tokens: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BedrockErrorBody {
    #[serde(default, alias = "Message")]
    message: Option<String>,
}
