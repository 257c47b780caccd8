use super::{AnalysisRequest, ModelTransport, TransportError};
use crate::error::{Result, ReviewError};
use crate::settings::ReviewSettings;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicTransport {
    http: Client,
    url: String,
    api_key: String,
    model: String,
}

impl AnthropicTransport {
    pub fn new(settings: &ReviewSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(ReviewError::Configuration(format!(
                "Anthropic API key must be provided via {}",
                ReviewSettings::API_KEY_ENV
            )));
        }
        let url = format!("{}/v1/messages", settings.endpoint.trim_end_matches('/'));
        let http = Client::builder()
            .user_agent(concat!("contract-lens/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| {
                ReviewError::Configuration(format!("failed to build Anthropic HTTP client: {err}"))
            })?;
        Ok(Self {
            http,
            url,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl ModelTransport for AnthropicTransport {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &AnalysisRequest) -> Result<String, TransportError> {
        let payload = AnthropicRequest {
            model: &self.model,
            system: &request.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: &request.user,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                TransportError::RateLimited {
                    status: status.as_u16(),
                    body,
                }
            } else {
                TransportError::Status {
                    status: status.as_u16(),
                    body,
                }
            });
        }

        let message: AnthropicResponse = response
            .json()
            .await
            .map_err(|err| {
                TransportError::Unexpected(format!("failed to parse Anthropic response: {err}"))
            })?;
        if let Some(usage) = &message.usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "anthropic usage"
            );
        }
        message
            .content
            .into_iter()
            .find_map(|part| part.text)
            .ok_or_else(|| {
                TransportError::Unexpected("Anthropic response missing text content".into())
            })
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    _type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}
