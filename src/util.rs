//! Shared text helpers.

/// Extract the outermost JSON object from text that may contain other content.
///
/// Brace counting skips braces inside JSON string literals, so generated code
/// carried in a string field cannot unbalance the scan.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
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
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Cut `text` to at most `max_chars` characters, appending `marker` when anything was dropped.
pub fn truncate_with_marker(text: &str, max_chars: usize, marker: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], marker),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object_simple() {
        let text = r#"{"key": "value"}"#;
        assert_eq!(extract_json_object(text), Some(r#"{"key": "value"}"#));
    }

    #[test]
    fn test_extract_json_object_with_prefix_and_suffix() {
        let text = r#"Here is the JSON: {"key": "value"} and some more text"#;
        assert_eq!(extract_json_object(text), Some(r#"{"key": "value"}"#));
    }

    #[test]
    fn test_extract_json_object_nested() {
        let text = r#"{"outer": {"inner": "value"}}"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"outer": {"inner": "value"}}"#)
        );
    }

    #[test]
    fn test_extract_json_object_ignores_braces_in_strings() {
        let text = r#"```json
{"code": "fn main() { println!(\"}\"); }", "n": 1}
```"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"code": "fn main() { println!(\"}\"); }", "n": 1}"#)
        );
    }

    #[test]
    fn test_extract_json_object_no_json() {
        assert_eq!(extract_json_object("No JSON here"), None);
    }

    #[test]
    fn test_extract_json_object_unclosed() {
        assert_eq!(extract_json_object(r#"{"key": "value""#), None);
    }

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_with_marker("abc", 3, "..."), "abc");
        assert_eq!(truncate_with_marker("", 0, "..."), "");
    }

    #[test]
    fn test_truncate_appends_marker() {
        assert_eq!(truncate_with_marker("abcdef", 3, "[cut]"), "abc[cut]");
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        let text = "ééééé";
        assert_eq!(truncate_with_marker(text, 2, "~"), "éé~");
    }
}
