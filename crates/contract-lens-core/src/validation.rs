use crate::prompt::REQUIRED_SECTIONS;

/// Responses shorter than this (after trimming) are rejected.
pub const MIN_RESPONSE_CHARS: usize = 100;

/// Advisory verdict on the shape of a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCheck {
    pub valid: bool,
    pub message: String,
    pub missing_sections: Vec<String>,
}

/// Decides whether a model response has the expected shape.
///
/// Implementations must not fail; callers may continue after a negative check.
pub trait ResponseValidator: Send + Sync {
    fn validate(&self, response: &str) -> ResponseCheck;
}

/// Checks for a minimum length and the presence of required section headings.
#[derive(Debug, Clone)]
pub struct HeadingValidator {
    required: Vec<String>,
    min_chars: usize,
}

impl Default for HeadingValidator {
    fn default() -> Self {
        Self::new(REQUIRED_SECTIONS.iter().map(|s| s.to_string()), MIN_RESPONSE_CHARS)
    }
}

impl HeadingValidator {
    pub fn new(required: impl IntoIterator<Item = String>, min_chars: usize) -> Self {
        Self {
            required: required.into_iter().collect(),
            min_chars,
        }
    }
}

impl ResponseValidator for HeadingValidator {
    fn validate(&self, response: &str) -> ResponseCheck {
        if response.trim().chars().count() < self.min_chars {
            return ResponseCheck {
                valid: false,
                message: format!("response is too short (under {} characters)", self.min_chars),
                missing_sections: Vec::new(),
            };
        }

        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|section| !response.contains(section.as_str()))
            .cloned()
            .collect();
        if missing.is_empty() {
            ResponseCheck {
                valid: true,
                message: "response contains all required sections".into(),
                missing_sections: missing,
            }
        } else {
            ResponseCheck {
                valid: false,
                message: format!("missing required sections: {}", missing.join(", ")),
                missing_sections: missing,
            }
        }
    }
}
