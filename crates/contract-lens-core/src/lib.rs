pub mod document;
pub mod error;
pub mod guidelines;
pub mod llm;
pub mod prompt;
pub mod report;
pub mod scan;
pub mod settings;
pub mod validation;

pub use document::{DocumentInfo, FileCheck, PdfReader, TextStrategy};
pub use error::{Result, ReviewError};
pub use guidelines::{
    file_repository::FileGuidelineRepository, GuidelineBundle, GuidelineError,
    GuidelineRepository, RedFlag, Severity,
};
pub use llm::{
    AnalysisClient, AnalysisRequest, CostEstimate, ModelTransport, RetryPolicy, TransportError,
};
pub use report::{AnalysisInfo, ReportMetadata, ReportRenderer};
pub use scan::{scan_red_flags, KeywordHit};
pub use settings::ReviewSettings;
pub use validation::{HeadingValidator, ResponseCheck, ResponseValidator};
