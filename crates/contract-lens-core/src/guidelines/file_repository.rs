use std::{
    fs, io,
    path::{Path, PathBuf},
};

use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::{debug, info};

use super::{GuidelineBundle, GuidelineError, GuidelineRepository, RedFlag};

pub const NEGOTIATION_FILE: &str = "guideline_negotiation.txt";
pub const RISK_FILE: &str = "guideline_risk.txt";
pub const ADVANCED_KNOWLEDGE_FILE: &str = "gpts_advanced_knowledge.txt";
pub const RED_FLAGS_FILE: &str = "redflags.json";

/// Loads the guideline bundle from text and JSON files located under a base directory.
pub struct FileGuidelineRepository {
    base_path: PathBuf,
    cache: OnceCell<GuidelineBundle>,
}

impl FileGuidelineRepository {
    /// Create a repository rooted at the given directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            cache: OnceCell::new(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn read_required(&self, name: &str) -> Result<String, GuidelineError> {
        let path = self.base_path.join(name);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(GuidelineError::Missing { path })
            }
            Err(source) => Err(GuidelineError::Read { path, source }),
        }
    }

    fn read_optional(&self, name: &str) -> Result<String, GuidelineError> {
        match self.read_required(name) {
            Err(GuidelineError::Missing { path }) => {
                debug!(path = %path.display(), "optional guideline file absent");
                Ok(String::new())
            }
            other => other,
        }
    }

    fn load_red_flags(&self) -> Result<Vec<RedFlag>, GuidelineError> {
        let raw = self.read_required(RED_FLAGS_FILE)?;
        let file: RedFlagFile =
            serde_json::from_str(&raw).map_err(|source| GuidelineError::MalformedRedFlags {
                path: self.base_path.join(RED_FLAGS_FILE),
                source,
            })?;
        for flag in &file.red_flags {
            flag.validate()?;
        }
        Ok(file.red_flags)
    }

    fn load_uncached(&self) -> Result<GuidelineBundle, GuidelineError> {
        let bundle = GuidelineBundle {
            negotiation: self.read_required(NEGOTIATION_FILE)?,
            risk: self.read_required(RISK_FILE)?,
            advanced_knowledge: self.read_optional(ADVANCED_KNOWLEDGE_FILE)?,
            red_flags: self.load_red_flags()?,
        };
        info!(
            dir = %self.base_path.display(),
            red_flags = bundle.red_flags.len(),
            advanced_knowledge = bundle.has_advanced_knowledge(),
            "guideline bundle loaded"
        );
        Ok(bundle)
    }
}

#[async_trait::async_trait]
impl GuidelineRepository for FileGuidelineRepository {
    async fn load_bundle(&self) -> Result<GuidelineBundle, GuidelineError> {
        let bundle = self.cache.get_or_try_init(|| self.load_uncached())?;
        Ok(bundle.clone())
    }
}

#[derive(Deserialize)]
struct RedFlagFile {
    #[serde(alias = "redflags")]
    red_flags: Vec<RedFlag>,
}
