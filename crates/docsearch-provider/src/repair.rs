//! Recovering structured data from generative-model output.
//!
//! Each stage is a plain function so it can be tested and reused alone:
//! strip markdown code fences, blank out control characters, then scan for
//! the outermost bracketed value. Anything that still fails to parse yields
//! no passages rather than an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// One passage the relevance provider reported for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPassage {
    pub text: String,
    pub score: f32,
    pub explanation: String,
    pub source: String,
}

pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```JSON", "").replace("```", "").trim().to_string()
}

/// Control characters are invalid inside JSON strings; models emit raw newlines there.
pub fn strip_control_chars(text: &str) -> String {
    text.chars().map(|c| if c.is_control() { ' ' } else { c }).collect()
}

/// The first complete `open ... close` value in `text`, skipping brackets inside strings.
pub fn outermost(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Run every stage and parse the outermost `open/close` value.
pub fn repair_json(raw: &str, open: char, close: char) -> Option<Value> {
    let cleaned = strip_control_chars(&strip_code_fences(raw));
    if let Ok(v) = serde_json::from_str::<Value>(&cleaned) {
        let matches_shape = match open {
            '[' => v.is_array(),
            '{' => v.is_object(),
            _ => true,
        };
        if matches_shape {
            return Some(v);
        }
    }
    serde_json::from_str(outermost(&cleaned, open, close)?).ok()
}

fn as_score(v: Option<&Value>) -> f32 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0) as f32,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn as_text(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Passages from a provider answer; malformed answers give an empty list.
pub fn parse_passages(raw: &str) -> Vec<ModelPassage> {
    let Some(Value::Array(items)) = repair_json(raw, '[', ']') else {
        warn!("Could not recover a JSON array from provider output ({} chars)", raw.len());
        return vec![];
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|o| ModelPassage {
            text: as_text(o.get("text")),
            score: as_score(o.get("score")),
            explanation: as_text(o.get("explanation")),
            source: as_text(o.get("source")),
        })
        .collect()
}
