use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::document::DocumentInfo;
use crate::error::{Result, ReviewError};
use crate::llm::CostEstimate;
use crate::scan::KeywordHit;

pub const REPORT_PREFIX: &str = "contract_review";
pub const SUMMARY_PREFIX: &str = "review_summary";
pub const MAX_NAME_CHARS: usize = 50;
pub const ILLEGAL_FILENAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
/// Header line carrying the original contract name; parsed back by [`ReportRenderer::summarize`].
pub const FILENAME_MARKER: &str = "**Filename**:";

const FILE_TIMESTAMP: &str = "%Y%m%d_%H%M%S";
const DISPLAY_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";
const FALLBACK_NAME: &str = "contract";

pub const DISCLAIMER_FOOTER: &str = "---

## How to Use This Report

### Disclaimer
1. This review was produced automatically by a language model and is not legal advice.
2. Have a qualified lawyer review any contract with significant financial or rights exposure.
3. Findings are based on the supplied guidelines; real-world interpretation may differ.

### Next Steps
1. Address every **critical risk (🔴)** first and decide on a response.
2. Prepare counter-proposals for **unfavourable clauses (🟡)**.
3. Ask the counterparty to clarify items marked **needs clarification (🔵)**.
4. Renegotiate following the priorities in the negotiation strategy.

---

*Report generated by contract-lens*";

static REPORT_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^{REPORT_PREFIX}_(.+)_(\d{{8}}_\d{{6}})\.md$"))
        .expect("report filename pattern is valid")
});

/// Model and input facts recorded in the report header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisInfo {
    pub provider: String,
    pub model: String,
    pub text_length: usize,
}

/// Optional header blocks; each absent field simply omits its block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportMetadata {
    pub document: Option<DocumentInfo>,
    pub cost: Option<CostEstimate>,
    pub analysis: Option<AnalysisInfo>,
    pub keyword_hits: Vec<KeywordHit>,
}

/// Make a contract name safe to embed in a file name.
///
/// Strips trailing `.pdf` extensions, replaces filesystem-illegal characters
/// with `_` and truncates to [`MAX_NAME_CHARS`] characters. Idempotent.
pub fn sanitize_contract_name(name: &str) -> String {
    let replaced: String = strip_pdf_suffix(name)
        .chars()
        .map(|c| if ILLEGAL_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .take(MAX_NAME_CHARS)
        .collect();
    let cleaned = strip_pdf_suffix(&replaced);
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

fn strip_pdf_suffix(mut name: &str) -> &str {
    while name.len() >= 4
        && name.is_char_boundary(name.len() - 4)
        && name[name.len() - 4..].eq_ignore_ascii_case(".pdf")
    {
        name = &name[..name.len() - 4];
    }
    name
}

/// Trim the model output, collapse doubled rules and runs of blank lines.
pub fn clean_analysis(analysis: &str) -> String {
    let collapsed = analysis.trim().replace("---\n---", "---");
    let mut lines = Vec::new();
    let mut prev_blank = false;
    for line in collapsed.lines() {
        let blank = line.trim().is_empty();
        if blank && prev_blank {
            continue;
        }
        lines.push(if blank { "" } else { line });
        prev_blank = blank;
    }
    lines.join("\n")
}

/// Writes review reports and summaries under an output directory.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    output_dir: PathBuf,
}

impl ReportRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render and persist a report, returning its path.
    pub fn render(
        &self,
        analysis: &str,
        contract_name: &str,
        metadata: &ReportMetadata,
    ) -> Result<PathBuf> {
        self.render_at(analysis, contract_name, metadata, Local::now())
    }

    pub fn render_at(
        &self,
        analysis: &str,
        contract_name: &str,
        metadata: &ReportMetadata,
        now: DateTime<Local>,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let file_name = format!(
            "{REPORT_PREFIX}_{}_{}.md",
            sanitize_contract_name(contract_name),
            now.format(FILE_TIMESTAMP)
        );
        let path = self.output_dir.join(file_name);
        let content = build_report(analysis, contract_name, metadata, now);
        write_file(&path, &content)?;
        info!(path = %path.display(), "report written");
        Ok(path)
    }

    /// Aggregate every report in `self.output_dir` into a summary document.
    ///
    /// Written to `output` when given, otherwise next to the reports.
    pub fn summarize(&self, output: Option<&Path>) -> Result<PathBuf> {
        self.summarize_at(output, Local::now())
    }

    pub fn summarize_at(&self, output: Option<&Path>, now: DateTime<Local>) -> Result<PathBuf> {
        let mut reports: Vec<(String, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.output_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&format!("{REPORT_PREFIX}_")) && name.ends_with(".md") {
                reports.push((name, entry.path()));
            }
        }
        if reports.is_empty() {
            return Err(ReviewError::NoReports(self.output_dir.clone()));
        }
        reports.sort();

        let path = match output {
            Some(path) => path.to_path_buf(),
            None => self
                .output_dir
                .join(format!("{SUMMARY_PREFIX}_{}.md", now.format(FILE_TIMESTAMP))),
        };
        let content = build_summary(&reports, now);
        write_file(&path, &content)?;
        info!(path = %path.display(), reports = reports.len(), "summary written");
        Ok(path)
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(content.as_bytes())?;
    writer.flush()?;
    Ok(())
}

fn build_report(
    analysis: &str,
    contract_name: &str,
    metadata: &ReportMetadata,
    now: DateTime<Local>,
) -> String {
    format!(
        "{}\n\n{}\n\n{}",
        build_header(contract_name, metadata, now),
        clean_analysis(analysis),
        DISCLAIMER_FOOTER
    )
}

fn build_header(contract_name: &str, metadata: &ReportMetadata, now: DateTime<Local>) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "# Contract Review Report\n\n## Reviewed Contract\n{FILENAME_MARKER} {contract_name}\n\
**Generated**: {}\n**System**: contract-lens v{}\n\n---",
        now.format(DISPLAY_TIMESTAMP),
        env!("CARGO_PKG_VERSION")
    );

    if let Some(document) = &metadata.document {
        let _ = write!(
            out,
            "\n\n## Document\n- **File size**: {:.1} MB\n- **Pages**: {}",
            document.size_mb(),
            document.page_count
        );
    }

    if let Some(cost) = &metadata.cost {
        let _ = write!(
            out,
            "\n\n## Estimated Cost\n- **Tokens**: {}\n\
             - **Cost**: ${:.4} (about {:.0} {})\n- **Provider**: {}",
            group_thousands(cost.total_tokens),
            cost.usd,
            cost.converted,
            cost.currency,
            cost.provider
        );
    }

    if let Some(analysis) = &metadata.analysis {
        let _ = write!(
            out,
            "\n\n## Analysis\n- **Provider**: {}\n- **Model**: {}\n\
             - **Extracted text**: {} characters",
            analysis.provider,
            analysis.model,
            group_thousands(analysis.text_length)
        );
    }

    if !metadata.keyword_hits.is_empty() {
        out.push_str("\n\n## Red Flag Keyword Matches");
        for hit in &metadata.keyword_hits {
            let _ = write!(
                out,
                "\n- `{}` [{}]: {} occurrence(s)",
                hit.keyword, hit.severity, hit.occurrences
            );
        }
    }

    out.push_str("\n\n---");
    out
}

fn build_summary(reports: &[(String, PathBuf)], now: DateTime<Local>) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "# Contract Review Summary\n\n**Generated**: {}\n**Reports**: {}\n\n---\n\n\
         ## Reviewed Contracts\n\n",
        now.format(DISPLAY_TIMESTAMP),
        reports.len()
    );

    for (idx, (file_name, path)) in reports.iter().enumerate() {
        let contract_name = contract_name_from_report(path);
        let size_kb = fs::metadata(path).map(|m| m.len()).unwrap_or(0) as f64 / 1024.0;
        let _ = write!(
            out,
            "{}. **{}**\n   - Report file: `{}`\n   - Size: {:.1} KB\n\n",
            idx + 1,
            contract_name,
            file_name,
            size_kb
        );
    }

    out.push_str(
        "---

## Recommendations

1. **Review the critical risks (🔴) of every contract first**
2. **Standardise responses to unfavourable clauses that recur across contracts**
3. **Consult a specialist on industry-specific risks**

---

*This summary was generated from the individual reports; see each report for details.*",
    );
    out
}

/// Displayed contract name of a report: the header marker line, else the file name.
pub fn contract_name_from_report(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(content) => {
            if let Some(name) = content
                .lines()
                .find_map(|line| line.split_once(FILENAME_MARKER).map(|(_, rest)| rest.trim()))
                .filter(|name| !name.is_empty())
            {
                return name.to_string();
            }
        }
        Err(err) => warn!(path = %path.display(), error = %err, "cannot read report"),
    }

    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| REPORT_FILE.captures(name))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
