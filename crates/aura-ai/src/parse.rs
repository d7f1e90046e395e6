//! Parsing helpers for model responses.
//!
//! The model is asked for strict JSON or a single emoji, but responses
//! arrive wrapped in prose and code fences often enough that the callers
//! pattern-match instead of deserializing the raw text.

/// Extract the first balanced `{...}` block from `text`.
///
/// Braces inside JSON strings are honored, so a description containing
/// `"}"` does not end the block early.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the first emoji-like glyph: the first non-ASCII character.
pub fn extract_emoji(text: &str) -> Option<String> {
    text.chars().find(|c| !c.is_ascii()).map(|c| c.to_string())
}

/// Clamp a raw model score into the valid 1-20 range.
pub fn clamp_score(raw: i64) -> u8 {
    raw.clamp(1, 20) as u8
}

/// Derive a default score from a 0-100 weighting percentage.
pub fn weight_to_score(weight: u8) -> u8 {
    (weight / 5).clamp(1, 20)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fenced_response() {
        let text = "Here you go:\n```json\n{\"speed_score\": 12, \"subtasks\": []}\n```";
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"speed_score": 12, "subtasks": []}"#)
        );
    }

    #[test]
    fn test_extract_json_nested_and_braces_in_strings() {
        let text = r#"{"a": {"b": "has a } brace"}, "c": 1} trailing"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"a": {"b": "has a } brace"}, "c": 1}"#)
        );
    }

    #[test]
    fn test_extract_json_none_when_unbalanced() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{\"open\": 1"), None);
    }

    #[test]
    fn test_extract_emoji() {
        assert_eq!(extract_emoji("Sure! 🚀 here"), Some("🚀".to_string()));
        assert_eq!(extract_emoji("plain ascii"), None);
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(-3), 1);
        assert_eq!(clamp_score(0), 1);
        assert_eq!(clamp_score(12), 12);
        assert_eq!(clamp_score(99), 20);
    }

    #[test]
    fn test_weight_to_score() {
        assert_eq!(weight_to_score(0), 1);
        assert_eq!(weight_to_score(50), 10);
        assert_eq!(weight_to_score(100), 20);
    }
}
