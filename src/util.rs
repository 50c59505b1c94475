//! Shared utility functions for the agentflow crate.

/// Serde helpers for `Duration` fields stored as whole milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Shorten `text` to at most `max` characters, appending an ellipsis when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

/// Render a step output for humans: bare strings as-is, `content`/`result` fields
/// lifted out of objects, anything else as pretty JSON.
pub fn render_output(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(content)) = map.get("content") {
                return content.clone();
            }
            if let Some(result) = map.get("result")
                && !result.is_object()
            {
                return match result {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
            }
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_long_text() {
        assert_eq!(truncate("abcdefghij", 6), "abc...");
    }

    #[test]
    fn test_render_output_prefers_content() {
        let value = json!({"content": "final answer", "model": "offline"});
        assert_eq!(render_output(&value), "final answer");
    }

    #[test]
    fn test_render_output_lifts_scalar_result() {
        let value = json!({"expression": "2 + 3", "result": 5.0});
        assert_eq!(render_output(&value), "5.0");
    }

    #[test]
    fn test_render_output_falls_back_to_json() {
        let value = json!({"words": 3});
        assert!(render_output(&value).contains("\"words\": 3"));
    }

    #[test]
    fn test_duration_ms_roundtrip_through_toml_value() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Holder {
            #[serde(with = "duration_ms")]
            timeout: std::time::Duration,
        }
        let parsed: Holder = serde_json::from_str(r#"{"timeout": 250}"#).unwrap();
        assert_eq!(parsed.timeout, std::time::Duration::from_millis(250));
    }
}
