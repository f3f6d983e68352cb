//! Extraction of the first balanced JSON object from free-form model output.
//!
//! Completion responses routinely wrap the requested JSON in prose or a
//! markdown code fence. Every stage that parses a completion goes through
//! [`extract_json`] instead of hand-rolling its own scan.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonExtractError {
    #[error("no JSON object found in response")]
    NoObject,

    #[error("unbalanced JSON object in response")]
    Unbalanced,

    #[error("extracted text is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Scan `text` for the first balanced `{...}` object and parse it.
///
/// The scan is string-aware: braces inside JSON string literals (including
/// escaped quotes) do not affect nesting depth.
pub fn extract_json(text: &str) -> Result<Value, JsonExtractError> {
    let bytes = text.as_bytes();
    let start = text.find('{').ok_or(JsonExtractError::NoObject)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + 1];
                    return Ok(serde_json::from_str(candidate)?);
                }
            }
            _ => {}
        }
    }
    Err(JsonExtractError::Unbalanced)
}

/// Like [`extract_json`], then deserialize into a concrete type.
pub fn extract_json_as<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, JsonExtractError> {
    let value = extract_json(text)?;
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_plain_object() {
        let value = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn extracts_from_markdown_fence() {
        let text = "Here you go:\n```json\n{\"queries\": [{\"query\": \"acme news\"}]}\n```\nLet me know!";
        let value = extract_json(text).unwrap();
        assert_eq!(value["queries"][0]["query"], "acme news");
    }

    #[test]
    fn handles_braces_inside_strings() {
        let text = r#"prefix {"note": "a } inside \" and {", "n": 2} suffix"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn nested_objects_balance() {
        let text = r#"{"outer": {"inner": {"deep": true}}}"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["outer"]["inner"]["deep"], true);
    }

    #[test]
    fn no_object_is_an_error() {
        assert!(matches!(
            extract_json("just prose, no json here"),
            Err(JsonExtractError::NoObject)
        ));
    }

    #[test]
    fn unterminated_object_is_an_error() {
        assert!(matches!(
            extract_json(r#"{"a": 1"#),
            Err(JsonExtractError::Unbalanced)
        ));
    }

    #[test]
    fn extracts_into_typed_struct() {
        #[derive(serde::Deserialize)]
        struct Decision {
            action: String,
            confidence: u8,
        }
        let d: Decision =
            extract_json_as("thinking... {\"action\": \"done\", \"confidence\": 95}").unwrap();
        assert_eq!(d.action, "done");
        assert_eq!(d.confidence, 95);
    }
}
