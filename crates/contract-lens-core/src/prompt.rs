//! Prompt construction for contract analysis.
//!
//! Everything here is a pure function of its inputs so prompts can be
//! inspected, estimated and snapshot-tested without touching the network.

use std::fmt::Write;

use crate::guidelines::RedFlag;

/// Rough characters-per-token ratio used for pre-flight gating only.
pub const CHARS_PER_TOKEN: usize = 4;

pub const NEGOTIATION_MARKER: &str = "## Negotiation Strategy Guideline";
pub const RISK_MARKER: &str = "## Risk Management Guideline";
pub const ADVANCED_MARKER: &str = "## Advanced Knowledge Base";
pub const RED_FLAGS_MARKER: &str = "## Red Flag Keywords";
pub const OUTPUT_FORMAT_MARKER: &str = "## Required Output Format";

/// Headings the model is instructed to emit, in order.
pub const REQUIRED_SECTIONS: [&str; 3] = [
    "Overall Assessment",
    "Critical Risks",
    "Negotiation Strategy",
];

const ROLE: &str = "You are a contract review specialist who protects independent creators \
and influencers in brand partnership agreements. Review the contract strictly against the \
guidelines below. Quote the clause you are discussing, classify its risk, and never invent \
clauses that are not in the contract.";

const EMPTY_SECTION: &str = "(none provided)";

/// Estimate the token count of `text`.
///
/// Deterministic and monotonic in the character count; not billing-grade.
pub fn estimate_tokens(text: &str) -> usize {
    estimate_tokens_for(&[text])
}

/// Estimate the token count of the concatenation of `parts`.
pub fn estimate_tokens_for(parts: &[&str]) -> usize {
    let chars: usize = parts.iter().map(|part| part.chars().count()).sum();
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Serialize the red-flag list into one compact line per entry.
pub fn format_red_flags(flags: &[RedFlag]) -> String {
    let mut out = String::new();
    for flag in flags {
        let _ = writeln!(out, "- {} [{}]: {}", flag.keyword, flag.severity, flag.reason);
    }
    out
}

/// Build the system instruction from the guideline documents and red flags.
pub fn build_system_prompt(
    negotiation: &str,
    risk: &str,
    advanced_knowledge: &str,
    red_flags: &[RedFlag],
) -> String {
    let red_flags = format_red_flags(red_flags);
    let mut prompt = String::with_capacity(
        ROLE.len()
            + negotiation.len()
            + risk.len()
            + advanced_knowledge.len()
            + red_flags.len()
            + 1024,
    );

    prompt.push_str(ROLE);
    prompt.push_str("\n\n");
    push_section(&mut prompt, NEGOTIATION_MARKER, negotiation);
    push_section(&mut prompt, RISK_MARKER, risk);
    push_section(&mut prompt, ADVANCED_MARKER, advanced_knowledge);
    push_section(&mut prompt, RED_FLAGS_MARKER, &red_flags);

    prompt.push_str(OUTPUT_FORMAT_MARKER);
    prompt.push_str("\nAnswer in markdown with exactly these top-level sections:\n");
    let _ = writeln!(
        prompt,
        "### 1. {}\nA short verdict on whether the contract is safe to sign as written.",
        REQUIRED_SECTIONS[0]
    );
    let _ = writeln!(
        prompt,
        "### 2. {}\nEvery risky clause, grouped as critical (🔴), unfavourable (🟡) \
         and needs clarification (🔵).",
        REQUIRED_SECTIONS[1]
    );
    let _ = writeln!(
        prompt,
        "### 3. {}\nPrioritised counter-proposals with suggested replacement wording.",
        REQUIRED_SECTIONS[2]
    );
    prompt
}

/// Wrap the extracted contract text with the analysis instruction.
pub fn build_user_prompt(contract_text: &str) -> String {
    format!(
        "Review the following contract. Apply the red flag list and guidelines from your \
instructions and follow the required output format.\n\n<contract>\n{}\n</contract>\n\n\
Produce the full review now.",
        contract_text.trim()
    )
}

fn push_section(prompt: &mut String, marker: &str, body: &str) {
    let body = body.trim();
    prompt.push_str(marker);
    prompt.push('\n');
    prompt.push_str(if body.is_empty() { EMPTY_SECTION } else { body });
    prompt.push_str("\n\n");
}
