//! Response normalisation: raw model text → [`ExtractedFields`].
//!
//! Models often wrap JSON in a ```` ```json ```` fence even when told not to,
//! so the fence is stripped first. Parsing is best-effort: anything that is
//! not a JSON object yields the all-empty record, flagged as
//! [`ParseStatus::Fallback`] so callers can tell it apart from a resume that
//! genuinely had nothing to extract.
//!
//! Field coercion is lenient but lossless for arrays. Every element of
//! `skills` and `work_experience` is kept in order, duplicates and blanks
//! included. Numeric scalars become strings, a comma-separated `skills`
//! string is split, and non-object work entries are kept as notes.

use crate::record::{ExtractedFields, ParseStatus, WorkExperience, WorkExperienceEntry};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

static RE_LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_+-]*[ \t]*(?:\r?\n)?").unwrap());

static RE_TRAILING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:\r?\n)?```\s*$").unwrap());

/// Strip a leading ```` ```lang ```` line and a trailing ```` ``` ````.
///
/// Surrounding whitespace is trimmed both outside and inside the fence, so
/// `strip_code_fence(fence(x)) == x.trim()`. Text without fences is returned
/// trimmed but otherwise unchanged.
pub fn strip_code_fence(raw: &str) -> &str {
    let s = raw.trim();
    let start = RE_LEADING_FENCE.find(s).map_or(0, |m| m.end());
    let s = &s[start..];
    let end = RE_TRAILING_FENCE.find(s).map_or(s.len(), |m| m.start());
    s[..end].trim()
}

/// Parse raw model text into fields, never failing.
pub fn normalize_response(raw: &str) -> (ExtractedFields, ParseStatus) {
    let cleaned = strip_code_fence(raw);

    let value: Value = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(e) => return fallback(format!("invalid JSON: {e}")),
    };

    let Value::Object(obj) = value else {
        return fallback(format!("expected a JSON object, got {}", kind(&value)));
    };

    (fields_from_object(&obj), ParseStatus::Parsed)
}

fn fallback(reason: String) -> (ExtractedFields, ParseStatus) {
    warn!("Model response unusable, substituting empty record: {}", reason);
    (ExtractedFields::default(), ParseStatus::Fallback { reason })
}

fn fields_from_object(obj: &Map<String, Value>) -> ExtractedFields {
    ExtractedFields {
        name: obj.get("name").map(scalar_text).unwrap_or_default(),
        email: obj.get("email").map(scalar_text).unwrap_or_default(),
        phone: obj.get("phone").map(scalar_text).unwrap_or_default(),
        skills: obj.get("skills").map(skill_list).unwrap_or_default(),
        work_experience: obj
            .get("work_experience")
            .map(work_entries)
            .unwrap_or_default(),
    }
}

/// Render a JSON scalar as plain text; null becomes empty.
fn scalar_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(scalar_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => v.to_string(),
    }
}

/// Text of one array element, kept verbatim when it is a string.
fn element_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => scalar_text(other),
    }
}

fn skill_list(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items.iter().map(element_text).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn work_entries(v: &Value) -> Vec<WorkExperienceEntry> {
    let Value::Array(items) = v else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| match item {
            Value::Object(job) => WorkExperienceEntry::Role(WorkExperience {
                company: job.get("company").map(scalar_text).unwrap_or_default(),
                title: job.get("title").map(scalar_text).unwrap_or_default(),
                years: job.get("years").map(scalar_text).unwrap_or_default(),
            }),
            Value::String(s) => WorkExperienceEntry::Note(s.clone()),
            other => WorkExperienceEntry::Note(other.to_string()),
        })
        .collect()
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
