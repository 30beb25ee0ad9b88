//! Lenient parsing of structured model output.

use serde_json::Value;

/// Strip Markdown code fences and parse the remainder as JSON.
///
/// Models frequently wrap JSON in ```json fences. Anything that still fails to
/// parse yields `None`; callers treat that as "no structured result".
pub fn parse_model_json(text: &str) -> Option<Value> {
    let clean = text
        .replace("```json\n", "")
        .replace("\n```", "")
        .replace("```", "");
    let clean = clean.trim();
    if clean.is_empty() {
        return None;
    }
    match serde_json::from_str(clean) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("⚠️ Model JSON parse failed: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let v = parse_model_json(r#"{"subject": "Hi"}"#).unwrap();
        assert_eq!(v["subject"], "Hi");
    }

    #[test]
    fn test_fenced_json() {
        let text = "```json\n{\"subject\": \"Congrats\", \"body\": \"...\"}\n```";
        let v = parse_model_json(text).unwrap();
        assert_eq!(v["subject"], "Congrats");
    }

    #[test]
    fn test_bare_fence() {
        let v = parse_model_json("```{\"a\": 1}```").unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn test_garbage_is_none() {
        assert!(parse_model_json("Sure! Here is your email:").is_none());
        assert!(parse_model_json("").is_none());
    }
}
