//! Tool result post-processing.
//!
//! Tool outputs sometimes arrive as escaped JSON, either as a JSON string
//! wrapping an object or as an object whose `output` field is itself an
//! escaped JSON object. One level is unwrapped and the value is
//! re-serialized with key order preserved. The unwrap is a fixed point:
//! applying it twice equals applying it once.

use serde_json::Value;

/// Unwrap one level of escaped JSON, preserving key order.
pub fn process_tool_result(result: &str) -> String {
    if result.trim().is_empty() {
        return result.to_string();
    }

    let parsed: Value = match serde_json::from_str(result) {
        Ok(value) => value,
        Err(_) => return result.to_string(),
    };

    match parsed {
        Value::Object(mut map) => {
            let unwrapped = match map.get("output") {
                Some(Value::String(output)) => serde_json::from_str::<Value>(output)
                    .ok()
                    .filter(Value::is_object),
                _ => None,
            };
            if let Some(inner) = unwrapped {
                map.insert("output".to_string(), inner);
            }
            serde_json::to_string(&Value::Object(map)).unwrap_or_else(|_| result.to_string())
        }
        Value::String(inner) => match serde_json::from_str::<Value>(&inner) {
            Ok(value) if value.is_object() => {
                serde_json::to_string(&value).unwrap_or(inner)
            }
            _ => inner,
        },
        other => serde_json::to_string(&other).unwrap_or_else(|_| result.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(process_tool_result("hits:3"), "hits:3");
        assert_eq!(process_tool_result(""), "");
        assert_eq!(process_tool_result("  "), "  ");
    }

    #[test]
    fn escaped_output_field_unwraps_one_level() {
        let raw = r#"{"output":"{\"a\":1,\"b\":2}"}"#;
        assert_eq!(process_tool_result(raw), r#"{"output":{"a":1,"b":2}}"#);
    }

    #[test]
    fn output_key_order_is_preserved() {
        let raw = r#"{"z":1,"output":"{\"b\":2,\"a\":1}","m":3}"#;
        assert_eq!(
            process_tool_result(raw),
            r#"{"z":1,"output":{"b":2,"a":1},"m":3}"#
        );
    }

    #[test]
    fn non_object_output_field_stays_wrapped() {
        let raw = r#"{"output":"plain text"}"#;
        assert_eq!(process_tool_result(raw), r#"{"output":"plain text"}"#);
        let raw_list = r#"{"output":"[1,2]"}"#;
        assert_eq!(process_tool_result(raw_list), r#"{"output":"[1,2]"}"#);
    }

    #[test]
    fn json_string_wrapping_an_object_unwraps() {
        let raw = r#""{\"message\":\"ok\"}""#;
        assert_eq!(process_tool_result(raw), r#"{"message":"ok"}"#);
    }

    #[test]
    fn json_string_wrapping_plain_text_unquotes() {
        assert_eq!(process_tool_result(r#""hello""#), "hello");
    }

    #[test]
    fn unwrap_is_a_fixed_point() {
        let inputs = [
            r#"{"output":"{\"a\":1}"}"#,
            r#""{\"message\":\"ok\"}""#,
            r#"{"plain":true}"#,
            "not json at all",
            r#""hello""#,
            // Doubly-escaped stays singly-unwrapped.
            r#"{"output":"{\"inner\":\"{\\\"deep\\\":1}\"}"}"#,
        ];
        for input in inputs {
            let once = process_tool_result(input);
            let twice = process_tool_result(&once);
            assert_eq!(once, twice, "not a fixed point for {input}");
        }
    }

    #[test]
    fn double_nesting_unwraps_only_one_level() {
        let raw = r#"{"output":"{\"inner\":\"{\\\"deep\\\":1}\"}"}"#;
        let once = process_tool_result(raw);
        assert!(once.contains(r#"{\"deep\":1}"#), "inner escape kept: {once}");
    }
}
