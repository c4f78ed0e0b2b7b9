//! Lenient JSON extraction from model output.

use serde::de::DeserializeOwned;

use super::client::LlmError;

/// Parse the first JSON object in `text`.
///
/// Models wrap JSON in code fences or add prose around it; both are
/// tolerated.
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let trimmed = strip_code_fence(text.trim());

    if let Ok(value) = serde_json::from_str::<T>(trimmed) {
        return Ok(value);
    }

    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| LlmError::Json(format!("{}: {}", e, truncate(text, 200)))),
        _ => Err(LlmError::Json(format!(
            "no JSON object in response: {}",
            truncate(text, 200)
        ))),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
