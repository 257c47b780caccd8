use std::collections::HashMap;

use crate::error::{Result, ReviewError};

pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_CURRENCY: &str = "KRW";
const DEFAULT_EXCHANGE_RATE: f64 = 1300.0;
const API_KEY_PREFIX: &str = "sk-ant-";

/// Immutable runtime configuration resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSettings {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Secondary currency used when displaying cost estimates.
    pub currency: String,
    /// Units of `currency` per US dollar.
    pub exchange_rate: f64,
}

impl ReviewSettings {
    pub const API_KEY_ENV: &'static str = "CONTRACT_LENS_API_KEY";
    pub const FALLBACK_API_KEY_ENV: &'static str = "ANTHROPIC_API_KEY";
    pub const ENDPOINT_ENV: &'static str = "CONTRACT_LENS_ENDPOINT";
    pub const MODEL_ENV: &'static str = "CONTRACT_LENS_MODEL";
    pub const TIMEOUT_ENV: &'static str = "CONTRACT_LENS_TIMEOUT_SECS";
    pub const RETRIES_ENV: &'static str = "CONTRACT_LENS_MAX_RETRIES";
    pub const CURRENCY_ENV: &'static str = "CONTRACT_LENS_CURRENCY";
    pub const EXCHANGE_RATE_ENV: &'static str = "CONTRACT_LENS_EXCHANGE_RATE";

    /// Load settings from environment variables.
    ///
    /// * `CONTRACT_LENS_API_KEY`: Anthropic API key (required, falls back to `ANTHROPIC_API_KEY`).
    /// * `CONTRACT_LENS_MODEL`: Model identifier.
    /// * `CONTRACT_LENS_EXCHANGE_RATE`: Conversion rate for the secondary currency.
    pub fn from_env() -> Result<Self> {
        Self::from_map(&std::env::vars().collect())
    }

    /// Load settings from an arbitrary key/value map using the environment variable names.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        let lookup = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = lookup(Self::API_KEY_ENV)
            .or_else(|| lookup(Self::FALLBACK_API_KEY_ENV))
            .ok_or_else(|| {
                ReviewError::Configuration(format!(
                    "API key is not set; export {} (or {})",
                    Self::API_KEY_ENV,
                    Self::FALLBACK_API_KEY_ENV
                ))
            })?;
        if !api_key.starts_with(API_KEY_PREFIX) {
            return Err(ReviewError::Configuration(format!(
                "invalid Anthropic API key: expected it to start with `{API_KEY_PREFIX}`"
            )));
        }

        let timeout_secs = parse_or(
            lookup(Self::TIMEOUT_ENV),
            Self::TIMEOUT_ENV,
            DEFAULT_TIMEOUT_SECS,
        )?;
        let max_retries = parse_or(
            lookup(Self::RETRIES_ENV),
            Self::RETRIES_ENV,
            DEFAULT_MAX_RETRIES,
        )?;
        let exchange_rate = parse_or(
            lookup(Self::EXCHANGE_RATE_ENV),
            Self::EXCHANGE_RATE_ENV,
            DEFAULT_EXCHANGE_RATE,
        )?;
        if !exchange_rate.is_finite() || exchange_rate <= 0.0 {
            return Err(ReviewError::Configuration(format!(
                "{} must be a positive number (got {exchange_rate})",
                Self::EXCHANGE_RATE_ENV
            )));
        }

        Ok(Self {
            api_key,
            endpoint: lookup(Self::ENDPOINT_ENV).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: lookup(Self::MODEL_ENV).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout_secs,
            max_retries,
            currency: lookup(Self::CURRENCY_ENV)
                .map(|c| c.to_uppercase())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            exchange_rate,
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| {
            ReviewError::Configuration(format!("{key} has an invalid value `{raw}`"))
        }),
    }
}
