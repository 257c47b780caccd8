use aho_corasick::{AhoCorasick, MatchKind};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::guidelines::{RedFlag, Severity};

/// A red flag whose keyword occurs literally in the contract text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordHit {
    pub keyword: String,
    pub severity: Severity,
    pub occurrences: usize,
    /// Byte offset of the first occurrence.
    pub first_offset: usize,
}

/// Case-insensitive literal search for red-flag keywords.
///
/// Hits are ordered by severity (most severe first), then by first occurrence.
#[instrument(skip_all, fields(flags = flags.len(), text_len = text.len()))]
pub fn scan_red_flags(text: &str, flags: &[RedFlag]) -> Vec<KeywordHit> {
    let patterns: Vec<&str> = flags.iter().map(|flag| flag.keyword.trim()).collect();
    if patterns.is_empty() || text.is_empty() {
        return Vec::new();
    }
    let automaton = match AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostLongest)
        .build(&patterns)
    {
        Ok(automaton) => automaton,
        Err(err) => {
            debug!(error = %err, "red flag automaton could not be built; skipping pre-scan");
            return Vec::new();
        }
    };

    let mut hits: Vec<Option<KeywordHit>> = vec![None; flags.len()];
    for found in automaton.find_iter(text) {
        let idx = found.pattern().as_usize();
        let flag = &flags[idx];
        hits[idx]
            .get_or_insert_with(|| KeywordHit {
                keyword: flag.keyword.trim().to_string(),
                severity: flag.severity,
                occurrences: 0,
                first_offset: found.start(),
            })
            .occurrences += 1;
    }

    let mut hits: Vec<KeywordHit> = hits.into_iter().flatten().collect();
    hits.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(a.first_offset.cmp(&b.first_offset))
    });
    debug!(matched = hits.len(), "red flag pre-scan complete");
    hits
}
