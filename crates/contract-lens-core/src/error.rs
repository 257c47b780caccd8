use std::path::PathBuf;

use thiserror::Error;

use crate::guidelines::GuidelineError;
use crate::llm::TransportError;

/// Errors surfaced by the review pipeline.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("contract file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error(
        "could not extract text from {}: {reason} \
         (the PDF is likely image-only, scanned or protected)",
        path.display()
    )]
    Extraction { path: PathBuf, reason: String },

    #[error(
        "contract is too large: estimated {estimated} tokens exceeds the {limit} token limit; \
         split the document and retry"
    )]
    TooLarge { estimated: usize, limit: usize },

    #[error("model API rate limit reached, check your usage quota: {0}")]
    RateLimited(#[source] TransportError),

    #[error("model API failed after {attempts} attempt(s): {source}")]
    Api {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("unexpected model response: {0}")]
    UnexpectedResponse(#[source] TransportError),

    #[error(transparent)]
    Guidelines(#[from] GuidelineError),

    #[error("no review reports found in {}", .0.display())]
    NoReports(PathBuf),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ReviewError> = std::result::Result<T, E>;
