mod analyzer;
mod anthropic;
mod retry;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use analyzer::{AnalysisClient, CostEstimate, Pricing, ASSUMED_OUTPUT_TOKENS, TOKEN_CEILING};
pub use anthropic::AnthropicTransport;
pub use retry::{RetryFailure, RetryPolicy};

/// One request to the remote model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// How a transport failure should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Quota exhaustion; retrying inside the same window rarely helps.
    RateLimited,
    /// Network failures and non-success API statuses.
    Transient,
    /// Anything the client does not know how to interpret.
    Unexpected,
}

/// Failures reported by a [`ModelTransport`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("rate limited (HTTP {status}): {body}")]
    RateLimited { status: u16, body: String },
    #[error("API error (HTTP {status}): {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Network(String),
    #[error("{0}")]
    Unexpected(String),
}

impl TransportError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::RateLimited { .. } => FailureClass::RateLimited,
            Self::Status { .. } | Self::Network(_) => FailureClass::Transient,
            Self::Unexpected(_) => FailureClass::Unexpected,
        }
    }
}

/// Single request/response exchange with a language model.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Provider identifier shown in reports (e.g. `anthropic`).
    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    /// Send the request and return the plain text answer.
    async fn complete(&self, request: &AnalysisRequest) -> Result<String, TransportError>;
}
