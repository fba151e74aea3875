//! Job-description extraction: prompt template and output normalization.
//!
//! Models frequently wrap JSON in Markdown code fences, so the reply is
//! fence-stripped before parsing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

const FENCE: &str = "```";

/// Fields requested from the model. Also the fallback body when the reply
/// cannot be parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    pub job_title: String,
    pub company: String,
    pub technologies: Vec<String>,
    pub seniority: String,
    pub summary: String,
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// The fixed extraction instruction with the job-description text embedded.
pub fn build_prompt(text: &str, max_chars: usize) -> String {
    format!(
        "Extract the following details from the job description text. \
         Output in JSON:\n\n\
         - job_title\n\
         - company\n\
         - technologies\n\
         - seniority\n\
         - summary\n\n\
         TEXT:\n{}\n",
        truncate_chars(text, max_chars)
    )
}

/// Strip a surrounding Markdown code fence, with or without a language tag.
///
/// Only a fence opening a line counts, so backticks inside a JSON string
/// are left alone. The closing fence is the last one in the reply. Text
/// outside the fence is dropped. Unfenced input is returned trimmed.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let open = if trimmed.starts_with(FENCE) {
        0
    } else {
        match trimmed.find("\n```") {
            Some(newline) => newline + 1,
            None => return trimmed,
        }
    };

    let mut body = &trimmed[open + FENCE.len()..];

    // Language tag: the rest of the opening line, when it is a bare word.
    if let Some(newline) = body.find('\n') {
        let tag = body[..newline].trim();
        if tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            body = &body[newline + 1..];
        }
    } else {
        body = body.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    }

    match body.rfind(FENCE) {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Slice from the first `{` to the last `}`, for replies with prose around the object.
fn outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Parse the model's reply into a JSON object.
///
/// Tries the reply as-is, then with its code fence stripped, then the
/// outermost `{...}` of the stripped and the original text. The first
/// candidate that parses wins; the error reported is from the fenced body.
pub fn parse_extraction(raw: &str) -> Result<Map<String, Value>> {
    let trimmed = raw.trim();
    let stripped = strip_code_fences(raw);

    let parsed = serde_json::from_str::<Value>(trimmed).or_else(|_| {
        serde_json::from_str::<Value>(stripped).or_else(|stripped_err| {
            [outer_object(stripped), outer_object(trimmed)]
                .into_iter()
                .flatten()
                .find_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
                .ok_or(stripped_err)
        })
    });

    match parsed {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::Extraction(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(Error::Extraction(format!("invalid JSON: {}", e))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
