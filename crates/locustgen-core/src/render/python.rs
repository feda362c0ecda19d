//! Python literal rendering for values embedded in generated scripts.

use std::collections::BTreeMap;

use serde_json::Value;

/// A double-quoted Python string literal.
///
/// JSON string escaping is a subset of Python's, so the JSON encoding of the
/// string is reused as is.
pub fn py_str(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// A Python expression equivalent to `value`: `null`/`true`/`false` become
/// `None`/`True`/`False`, objects become dicts in key order.
pub fn py_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => py_str(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(py_literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", py_str(k), py_literal(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

/// A one-line dict of string pairs.
pub fn py_str_dict(map: &BTreeMap<String, String>) -> String {
    let entries: Vec<String> = map
        .iter()
        .map(|(k, v)| format!("{}: {}", py_str(k), py_str(v)))
        .collect();
    format!("{{{}}}", entries.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_literal_escapes_quotes_and_backslashes() {
        assert_eq!(py_str(r#"say "hi" \o/"#), r#""say \"hi\" \\o/""#);
        assert_eq!(py_str("line\nbreak"), r#""line\nbreak""#);
    }

    #[test]
    fn json_keywords_become_python_keywords() {
        let value = json!({"a": null, "b": true, "c": false, "d": [1, 2.5, "x"]});
        assert_eq!(
            py_literal(&value),
            r#"{"a": None, "b": True, "c": False, "d": [1, 2.5, "x"]}"#
        );
    }

    #[test]
    fn empty_containers_render_as_python_empties() {
        assert_eq!(py_literal(&json!({})), "{}");
        assert_eq!(py_literal(&json!([])), "[]");
        assert_eq!(py_str_dict(&BTreeMap::new()), "{}");
    }
}
