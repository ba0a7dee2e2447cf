//! Response normalization: raw model output → ordered [`Step`] sequence.
//!
//! The producer is asked for a JSON array of `{label, description}` objects
//! but may return anything. Normalization never fails. It tries a strict
//! JSON reading first and otherwise synthesizes one step per non-blank
//! line, with the trimmed line as the step `label` and an empty
//! `description`.

use serde_json::Value;
use tracing::debug;

use crate::types::Step;

/// Which reading of the raw text produced the steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// The text was a JSON array (or `{"steps": [...]}` envelope) of step objects.
    StrictParsed(Vec<Step>),
    /// The text was split into one step per non-blank line.
    HeuristicParsed(Vec<Step>),
}

impl Normalized {
    pub fn steps(&self) -> &[Step] {
        match self {
            Self::StrictParsed(steps) | Self::HeuristicParsed(steps) => steps,
        }
    }

    pub fn into_steps(self) -> Vec<Step> {
        match self {
            Self::StrictParsed(steps) | Self::HeuristicParsed(steps) => steps,
        }
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::StrictParsed(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::StrictParsed(_) => "strict",
            Self::HeuristicParsed(_) => "heuristic",
        }
    }
}

/// Normalize raw text into steps.
pub fn normalize(raw: &str) -> Vec<Step> {
    normalize_tagged(raw).into_steps()
}

/// Normalize raw text, reporting which path ran.
pub fn normalize_tagged(raw: &str) -> Normalized {
    let trimmed = raw.trim();

    if let Some(steps) = parse_strict(trimmed) {
        debug!(steps = steps.len(), "Strict JSON step list");
        return Normalized::StrictParsed(steps);
    }

    if let Some(steps) = strip_code_fence(trimmed).and_then(parse_strict) {
        debug!(steps = steps.len(), "Strict JSON step list inside code fence");
        return Normalized::StrictParsed(steps);
    }

    let steps = parse_lines(raw);
    debug!(steps = steps.len(), "Line-based step synthesis");
    Normalized::HeuristicParsed(steps)
}

fn parse_strict(text: &str) -> Option<Vec<Step>> {
    let value: Value = serde_json::from_str(text).ok()?;
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("steps") {
            Some(Value::Array(entries)) => entries,
            _ => return None,
        },
        _ => return None,
    };

    if entries.is_empty() {
        return Some(Vec::new());
    }

    let total = entries.len();
    let steps: Vec<Step> = entries.iter().filter_map(step_from_entry).collect();

    if steps.is_empty() {
        // Not an array of step objects at all.
        return None;
    }
    if steps.len() < total {
        debug!(skipped = total - steps.len(), "Skipped undecodable step entries");
    }
    Some(steps)
}

/// Decode one array entry. Only a missing or non-string label disqualifies
/// it; any description value is kept as text.
fn step_from_entry(entry: &Value) -> Option<Step> {
    let object = entry.as_object()?;
    let label = ["label", "title"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))?;
    let description = ["description", "content"]
        .iter()
        .find_map(|key| object.get(*key).filter(|v| !v.is_null()))
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();
    Some(Step::new(label, description))
}

/// Body of a text that is exactly one Markdown code fence.
fn strip_code_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    let body_start = rest.find('\n')?;
    let info = &rest[..body_start];
    if !info.trim().chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let body = rest[body_start + 1..].strip_suffix("```")?;
    if body.contains("```") {
        return None;
    }
    Some(body.trim())
}

fn parse_lines(raw: &str) -> Vec<Step> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| Step::new(line, ""))
        .collect()
}
