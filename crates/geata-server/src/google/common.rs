//! Shared utilities for the Google API modules

use serde_json::Value;

/// Extract an array field from a JSON response, empty when missing.
///
/// Google APIs return lists under varying field names ("items", "messages",
/// "labels", "files").
pub fn extract_array(response: &Value, field: &str) -> Vec<Value> {
    response
        .get(field)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Fetch a named header value from a Gmail payload header list.
pub fn header_value<'a>(headers: &'a [Value], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| {
            h.get("name")
                .and_then(|v| v.as_str())
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|h| h.get("value"))
        .and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_array_present() {
        let response = json!({"items": [1, 2, 3]});
        assert_eq!(extract_array(&response, "items").len(), 3);
    }

    #[test]
    fn test_extract_array_missing() {
        let response = json!({});
        assert!(extract_array(&response, "items").is_empty());
    }

    #[test]
    fn test_header_value_case_insensitive() {
        let headers = vec![json!({"name": "Subject", "value": "Weekly sync"})];
        assert_eq!(header_value(&headers, "subject"), Some("Weekly sync"));
        assert_eq!(header_value(&headers, "From"), None);
    }
}
