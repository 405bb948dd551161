//! Turns raw model text into a JSON value.
//!
//! Each stage is a pure `&str -> String` transform that leaves its input
//! alone when its pattern is absent. [`repair_json_text`] runs them in order:
//! fence stripping, payload extraction, comment removal, trailing-comma
//! repair.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PlanError;
use crate::plan::records::{records_from_payload, PlanBatch};
use crate::utils::text::truncate_for_log;

const FENCE: &str = "```";

/// A whole string literal, or a comma followed by a closing bracket. String
/// literals are matched first so commas inside them are never touched.
static STRING_OR_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)"(?:[^"\\]|\\.)*"|,(\s*[}\]])"#).expect("trailing comma pattern")
});

/// Drops an opening fence line (```` ```json ````) and everything from the
/// last fence marker onward.
pub fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with(FENCE) {
        return text.to_string();
    }

    let body = match trimmed.find('\n') {
        Some(index) => &trimmed[index + 1..],
        None => &trimmed[FENCE.len()..],
    };
    let body = match body.rfind(FENCE) {
        Some(index) => &body[..index],
        None => body,
    };
    body.to_string()
}

/// Slices from the first `{` to the last `}` to shed prose around the payload.
pub fn extract_payload(text: &str) -> String {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => text[start..=end].to_string(),
        _ => text.to_string(),
    }
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with("//")
        || line.starts_with('#')
        || line.starts_with("/*")
        || line.starts_with("*/")
        || line.starts_with('*')
}

/// Removes blank lines and lines that open with a line or block comment marker.
pub fn strip_comments(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !is_comment_line(trimmed)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Removes a comma that directly precedes `}` or `]`, whitespace allowed.
/// String contents pass through unchanged.
pub fn repair_trailing_commas(text: &str) -> String {
    STRING_OR_TRAILING_COMMA
        .replace_all(text, |caps: &Captures| match caps.get(1) {
            Some(closing) => closing.as_str().to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

pub fn repair_json_text(raw: &str) -> String {
    let text = strip_fences(raw);
    let text = extract_payload(&text);
    let text = strip_comments(&text);
    repair_trailing_commas(&text)
}

pub fn parse_repaired(raw: &str) -> Result<Value, PlanError> {
    let extracted = extract_payload(&strip_fences(raw));
    if let Ok(value) = serde_json::from_str::<Value>(&extracted) {
        return Ok(value);
    }

    let cleaned = repair_json_text(raw);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => {
            if cleaned != raw.trim() {
                debug!(
                    raw_len = raw.len(),
                    cleaned_len = cleaned.len(),
                    "Repaired model output before parsing"
                );
            }
            Ok(value)
        }
        Err(err) => {
            warn!(
                "Model output is not valid JSON after repair: {} (cleaned={})",
                err,
                truncate_for_log(&cleaned, 500)
            );
            Err(PlanError::MalformedResponse {
                raw: raw.to_string(),
                cleaned,
                reason: err.to_string(),
            })
        }
    }
}

/// Full normalization of a text backend response into validated records.
pub fn normalize_plans(raw: &str) -> Result<PlanBatch, PlanError> {
    let value = parse_repaired(raw)?;
    records_from_payload(value, raw)
}
