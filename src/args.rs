//! String-to-typed-value argument codec.
//!
//! Command-line and compose inputs arrive as raw strings; the broker wants
//! typed values. Each string is classified through a fixed, ordered list of
//! parse attempts -- the order is the contract, because it determines
//! precedence (`"true"` becomes a boolean before it could fall through to a
//! string, a quoted `'123'` stays a string and never becomes an integer):
//!
//! 1. single- or double-quoted literal (quotes stripped)
//! 2. `:=`-prefixed file reference, replaced by the file's contents
//! 3. integer
//! 4. float
//! 5. boolean
//! 6. JSON object or array (arrays of objects included)
//! 7. raw string
//!
//! Every step is pure except the file-reference lookup, which is only
//! attempted when the caller enables it.

use std::collections::BTreeMap;

use base64::Engine as _;
use serde_json::Value;

use crate::error::Error;
use crate::session::{Dict, List};

/// Splits a `path:=value`-style file reference. Returns the path portion
/// when the marker is present.
pub fn file_ref_path(arg: &str) -> Option<&str> {
    arg.split_once(":=").map(|(_, path)| path)
}

/// Converts raw positional argument strings into typed values.
///
/// When `check_file` is set, `:=`-prefixed entries are replaced by the
/// referenced file's contents; a failed read is the only error this
/// function can produce.
pub fn to_positional(args: &[String], check_file: bool) -> Result<List, Error> {
    args.iter()
        .map(|value| classify(value, check_file))
        .collect()
}

/// Converts raw `key=value` keyword argument strings into a typed mapping.
///
/// The same per-value classification as [`to_positional`] applies. Keys are
/// accepted in sorted order so the produced mapping is deterministic.
pub fn to_keyword(kwargs: &BTreeMap<String, String>, check_file: bool) -> Result<Dict, Error> {
    let mut out = Dict::new();
    for (key, value) in kwargs {
        out.insert(key.clone(), classify(value, check_file)?);
    }
    Ok(out)
}

/// Classifies one raw string into a typed value; see the module docs for
/// the precedence order.
fn classify(value: &str, check_file: bool) -> Result<Value, Error> {
    if let Some(stripped) = strip_quotes(value) {
        return Ok(Value::String(stripped.to_string()));
    }
    if check_file {
        if let Some(path) = file_ref_path(value) {
            let bytes = std::fs::read(path).map_err(|source| Error::FileRead {
                path: path.to_string(),
                source,
            })?;
            return Ok(file_bytes_value(bytes));
        }
    }
    if let Ok(number) = value.parse::<i64>() {
        return Ok(Value::from(number));
    }
    if let Ok(float) = value.parse::<f64>() {
        return Ok(Value::from(float));
    }
    if let Ok(boolean) = value.parse::<bool>() {
        return Ok(Value::from(boolean));
    }
    if let Ok(json) = serde_json::from_str::<Value>(value) {
        // Only object and array shapes count as JSON input; scalar JSON
        // (`null`, quoted strings) was already handled above or stays raw.
        if json.is_object() || json.is_array() {
            return Ok(json);
        }
    }
    Ok(Value::String(value.to_string()))
}

/// Strips matching single or double quotes from a literal.
fn strip_quotes(value: &str) -> Option<&str> {
    for quote in ['\'', '"'] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return Some(&value[1..value.len() - 1]);
        }
    }
    None
}

/// Represents file contents as a value: UTF-8 text stays text, anything
/// else is base64-encoded so raw bytes survive JSON serializers.
fn file_bytes_value(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(text) => Value::String(text),
        Err(err) => Value::String(
            base64::engine::general_purpose::STANDARD.encode(err.into_bytes()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn positional(values: &[&str], check_file: bool) -> List {
        let owned: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        to_positional(&owned, check_file).unwrap()
    }

    #[test]
    fn test_classification_precedence() {
        let list = positional(
            &[
                "string",
                "1",
                "1.1",
                "true",
                "\"123\"",
                "'123'",
                "\"true\"",
                r#"["group_1","group_2", 1.1, true]"#,
                r#"{"firstKey":"value", "secondKey":2.1}"#,
            ],
            false,
        );

        assert_eq!(list[0], Value::from("string"));
        assert_eq!(list[1], Value::from(1));
        assert_eq!(list[2], Value::from(1.1));
        assert_eq!(list[3], Value::from(true));
        // Quoted literals stay strings regardless of content.
        assert_eq!(list[4], Value::from("123"));
        assert_eq!(list[5], Value::from("123"));
        assert_eq!(list[6], Value::from("true"));
        assert_eq!(
            list[7],
            serde_json::json!(["group_1", "group_2", 1.1, true])
        );
        assert_eq!(
            list[8],
            serde_json::json!({"firstKey": "value", "secondKey": 2.1})
        );
    }

    #[test]
    fn test_array_of_objects() {
        let raw = r#"[{"firstKey":"value", "secondKey":2.1}, {"firstKey":"value", "secondKey":2.1}]"#;
        let list = positional(&[raw], false);
        let expected = serde_json::json!([
            {"firstKey": "value", "secondKey": 2.1},
            {"firstKey": "value", "secondKey": 2.1}
        ]);
        assert_eq!(list[0], expected);
    }

    #[test]
    fn test_file_ref_disabled_stays_raw() {
        let list = positional(&[":=/foo/bar"], false);
        assert_eq!(list[0], Value::from(":=/foo/bar"));
    }

    #[test]
    fn test_file_ref_replaced_by_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "payload from file").unwrap();

        let arg = format!(":={}", file.path().display());
        let list = positional(&[&arg], true);
        assert_eq!(list[0], Value::from("payload from file"));
    }

    #[test]
    fn test_file_ref_non_utf8_contents_base64_encoded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xff, 0xfe, 0xfd]).unwrap();

        let arg = format!(":={}", file.path().display());
        let list = positional(&[&arg], true);
        assert_eq!(list[0], Value::from("//79"));
    }

    #[test]
    fn test_file_ref_missing_file_is_error() {
        let owned = vec![":=/definitely/not/a/file".to_string()];
        let err = to_positional(&owned, true).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }

    #[test]
    fn test_file_ref_path() {
        assert_eq!(file_ref_path("foo"), None);
        assert_eq!(file_ref_path(":=/foo/bar"), Some("/foo/bar"));
    }

    #[test]
    fn test_keyword_classification() {
        let mut kwargs = BTreeMap::new();
        kwargs.insert("string".to_string(), "string".to_string());
        kwargs.insert("int".to_string(), "1".to_string());
        kwargs.insert("float".to_string(), "1.1".to_string());
        kwargs.insert("bool".to_string(), "true".to_string());
        kwargs.insert("stringBool".to_string(), "\"true\"".to_string());
        kwargs.insert(
            "json".to_string(),
            r#"{"firstKey":"value", "secondKey":2.2}"#.to_string(),
        );

        let dict = to_keyword(&kwargs, false).unwrap();
        assert_eq!(dict["string"], Value::from("string"));
        assert_eq!(dict["int"], Value::from(1));
        assert_eq!(dict["float"], Value::from(1.1));
        assert_eq!(dict["bool"], Value::from(true));
        assert_eq!(dict["stringBool"], Value::from("true"));
        assert_eq!(
            dict["json"],
            serde_json::json!({"firstKey": "value", "secondKey": 2.2})
        );
    }

    #[test]
    fn test_scalar_json_stays_raw_string() {
        let list = positional(&["null"], false);
        assert_eq!(list[0], Value::from("null"));
    }
}
