use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod file_repository;

/// How damaging a red-flag clause is for the signing party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A known risky contract pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedFlag {
    /// Phrase to look for in the contract text.
    pub keyword: String,
    pub severity: Severity,
    /// Why the clause is risky; shown to the model verbatim.
    pub reason: String,
}

impl RedFlag {
    pub fn new(
        keyword: impl Into<String>,
        severity: Severity,
        reason: impl Into<String>,
    ) -> Result<Self, GuidelineError> {
        let flag = Self {
            keyword: keyword.into(),
            severity,
            reason: reason.into(),
        };
        flag.validate()?;
        Ok(flag)
    }

    pub fn validate(&self) -> Result<(), GuidelineError> {
        if self.keyword.trim().is_empty() {
            return Err(GuidelineError::InvalidRedFlag {
                reason: "red flag keyword must not be blank".into(),
            });
        }
        Ok(())
    }
}

/// Grounding documents supplied with every analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuidelineBundle {
    pub negotiation: String,
    pub risk: String,
    /// Optional extended knowledge base; empty when not provided.
    pub advanced_knowledge: String,
    pub red_flags: Vec<RedFlag>,
}

impl GuidelineBundle {
    /// Free-text guideline documents concatenated in prompt order.
    pub fn guideline_text(&self) -> String {
        [
            self.negotiation.as_str(),
            self.risk.as_str(),
            self.advanced_knowledge.as_str(),
        ]
        .concat()
    }

    pub fn has_advanced_knowledge(&self) -> bool {
        !self.advanced_knowledge.trim().is_empty()
    }
}

/// Failures while loading the guideline bundle.
#[derive(Debug, Error)]
pub enum GuidelineError {
    #[error("guideline file not found: {}", path.display())]
    Missing { path: PathBuf },
    #[error("failed to read guideline file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("red flag file {} is malformed: {source}", path.display())]
    MalformedRedFlags {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid red flag: {reason}")]
    InvalidRedFlag { reason: String },
}

/// Source of the guideline bundle so files, embedded defaults or fixtures can be swapped.
#[async_trait]
pub trait GuidelineRepository: Send + Sync {
    async fn load_bundle(&self) -> Result<GuidelineBundle, GuidelineError>;
}
