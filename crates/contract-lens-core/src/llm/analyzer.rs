use serde::Serialize;
use tracing::{error, info, instrument};

use super::{AnalysisRequest, AnthropicTransport, FailureClass, ModelTransport, RetryPolicy};
use crate::error::{Result, ReviewError};
use crate::guidelines::GuidelineBundle;
use crate::prompt::{build_system_prompt, build_user_prompt, estimate_tokens_for};
use crate::settings::ReviewSettings;

/// Requests whose combined estimate exceeds this are rejected before any call.
pub const TOKEN_CEILING: usize = 100_000;
/// Output budget requested from the model and assumed by cost estimates.
pub const ASSUMED_OUTPUT_TOKENS: usize = 4_000;
const TEMPERATURE: f32 = 0.1;

/// Per-million-token prices in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_million: 3.00,
            output_per_million: 15.00,
        }
    }
}

/// Pre-flight estimate of what one analysis will cost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
    pub usd: f64,
    /// `usd` converted into `currency` with the configured exchange rate.
    pub converted: f64,
    pub currency: String,
    pub provider: String,
}

/// Sends contract analyses to a model under a retry policy.
pub struct AnalysisClient {
    transport: Box<dyn ModelTransport>,
    retry: RetryPolicy,
    pricing: Pricing,
    currency: String,
    exchange_rate: f64,
}

impl AnalysisClient {
    /// Build a client talking to the Anthropic messages API.
    pub fn from_settings(settings: &ReviewSettings) -> Result<Self> {
        let transport = AnthropicTransport::new(settings)?;
        Ok(Self::new(Box::new(transport), settings))
    }

    pub fn new(transport: Box<dyn ModelTransport>, settings: &ReviewSettings) -> Self {
        Self {
            transport,
            retry: RetryPolicy::with_max_attempts(settings.max_retries),
            pricing: Pricing::default(),
            currency: settings.currency.clone(),
            exchange_rate: settings.exchange_rate,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn provider(&self) -> &str {
        self.transport.provider()
    }

    pub fn model(&self) -> &str {
        self.transport.model()
    }

    /// Analyze the contract against the guideline bundle and return the model's markdown.
    #[instrument(skip_all, fields(provider = self.provider(), model = self.model()))]
    pub async fn analyze(&self, contract_text: &str, bundle: &GuidelineBundle) -> Result<String> {
        let estimated = estimate_tokens_for(&[
            contract_text,
            &bundle.negotiation,
            &bundle.risk,
            &bundle.advanced_knowledge,
        ]);
        if estimated > TOKEN_CEILING {
            error!(estimated, limit = TOKEN_CEILING, "contract exceeds token ceiling");
            return Err(ReviewError::TooLarge {
                estimated,
                limit: TOKEN_CEILING,
            });
        }

        let request = AnalysisRequest {
            system: build_system_prompt(
                &bundle.negotiation,
                &bundle.risk,
                &bundle.advanced_knowledge,
                &bundle.red_flags,
            ),
            user: build_user_prompt(contract_text),
            max_tokens: ASSUMED_OUTPUT_TOKENS as u32,
            temperature: TEMPERATURE,
        };
        info!(estimated_tokens = estimated, "sending contract for analysis");

        let transport = self.transport.as_ref();
        let request = &request;
        let outcome = self
            .retry
            .run(move |_attempt| transport.complete(request))
            .await;

        match outcome {
            Ok(text) => {
                info!(chars = text.chars().count(), "analysis complete");
                Ok(text)
            }
            Err(failure) => {
                error!(attempts = failure.attempts, error = %failure.error, "analysis failed");
                Err(match failure.error.class() {
                    FailureClass::RateLimited => ReviewError::RateLimited(failure.error),
                    FailureClass::Unexpected => ReviewError::UnexpectedResponse(failure.error),
                    FailureClass::Transient => ReviewError::Api {
                        attempts: failure.attempts,
                        source: failure.error,
                    },
                })
            }
        }
    }

    /// Estimate the cost of analysing `contract_text` with `guideline_text` as grounding.
    ///
    /// Pure computation: no network access and no state change.
    pub fn estimate_cost(&self, contract_text: &str, guideline_text: &str) -> CostEstimate {
        let input_tokens = estimate_tokens_for(&[contract_text, guideline_text]);
        let output_tokens = ASSUMED_OUTPUT_TOKENS;
        let usd = input_tokens as f64 / 1_000_000.0 * self.pricing.input_per_million
            + output_tokens as f64 / 1_000_000.0 * self.pricing.output_per_million;
        CostEstimate {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            usd,
            converted: usd * self.exchange_rate,
            currency: self.currency.clone(),
            provider: self.provider().to_string(),
        }
    }
}
