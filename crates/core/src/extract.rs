//! Best-effort extraction of a JSON object from free-form model output.
//!
//! Chat models are asked for strict JSON but routinely wrap it in prose or
//! markdown fences. This scanner finds the first balanced `{...}` substring
//! that actually parses. It is a pure function so it can be fuzzed without
//! any network in the loop.

use serde_json::Value;

/// Find the first valid JSON object embedded in `text`.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    // Fast path: the whole payload is the object.
    if text.starts_with('{') && text.ends_with('}') {
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    // Scan each '{' for a balanced snippet; move on when one doesn't parse.
    let opens: Vec<usize> = text
        .char_indices()
        .filter(|&(_, c)| c == '{')
        .map(|(i, _)| i)
        .collect();

    for &start in &opens {
        let mut depth = 0usize;
        for (offset, c) in text[start..].char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let end = start + offset + c.len_utf8();
                        if let Ok(value) = serde_json::from_str::<Value>(&text[start..end]) {
                            if value.is_object() {
                                return Some(value);
                            }
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    None
}
