//! Normalizer — turns raw model output into a `ProposalResponse`.
//!
//! Extraction is best-effort by design: proposals are free-form prose, so a
//! missing title, budget, or timeline is a field left unset, never an error.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::llm_client::Completion;
use crate::proposal::models::{GenerationMetadata, ProposalRequest, ProposalResponse};

/// Builds the normalized, metadata-annotated response from a completion.
/// `processing_time` spans the Generating phase, retries included.
pub fn normalize(
    request: &ProposalRequest,
    completion: &Completion,
    processing_time: Duration,
) -> ProposalResponse {
    let content = completion.text.trim().to_string();

    ProposalResponse {
        id: Uuid::new_v4(),
        title: derive_title(&content)
            .unwrap_or_else(|| format!("Proposal for {}", request.job_title.trim())),
        key_points: extract_key_points(&content),
        estimated_budget: extract_labelled_estimate(&content, "budget"),
        estimated_timeline: extract_labelled_estimate(&content, "timeline"),
        content,
        created_at: Utc::now(),
        metadata: GenerationMetadata {
            model: completion.model.clone(),
            tokens_used: completion.tokens_used,
            processing_time_ms: processing_time.as_millis() as u64,
        },
    }
}

/// First markdown heading, or the first non-empty line when it is short
/// enough to plausibly be a title.
fn derive_title(content: &str) -> Option<String> {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(heading) = line.strip_prefix('#') {
            let heading = heading.trim_start_matches('#').trim();
            if !heading.is_empty() {
                return Some(heading.to_string());
            }
            continue;
        }
        if line.len() <= 80 && !line.ends_with(['.', ':']) {
            return Some(line.to_string());
        }
        return None;
    }
    None
}

/// Ordered bullet and numbered-list items, kept in document order.
fn extract_key_points(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| strip_list_marker(line.trim()))
        .filter(|point| !point.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some(rest.trim());
    }
    // Numbered items: "1. point" / "12) point"
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest.trim());
        }
    }
    None
}

/// Finds a line mentioning `label` with a value after a colon, e.g.
/// "Estimated Budget: $2,000 - $3,000". Case-insensitive on the label.
fn extract_labelled_estimate(content: &str, label: &str) -> Option<String> {
    for line in content.lines() {
        let line = line.trim().trim_start_matches(['-', '*', '#']).trim();
        let lower = line.to_lowercase();
        if !lower.contains(label) {
            continue;
        }
        if let Some(colon) = line.find(':') {
            let value = line[colon + 1..].trim().trim_matches('*').trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}
