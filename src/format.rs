//! Stable text layouts for received payloads.
//!
//! Two layouts exist: an indented multi-line form used when logging
//! invocations, events, and call results, and a compact single-line form
//! for streaming progress output. Both are pure functions of the payload
//! and are pinned byte-for-byte by tests -- downstream tooling greps this
//! output, so the shape is a contract.

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::error::Error;
use crate::session::{Dict, List};

/// Serializes a value as JSON indented with four spaces, no trailing
/// newline.
fn pretty_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    // serde_json always produces valid UTF-8.
    Ok(String::from_utf8(buf).unwrap_or_default())
}

/// Serializes a value as JSON indented with four spaces, with a trailing
/// newline.
pub fn encode_to_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let mut out = pretty_json(value)?;
    out.push('\n');
    Ok(out)
}

/// Formats payload details, args, and kwargs in the indented layout.
///
/// The layout is: an optional `details:<json>` line, then `args:` with the
/// indented list only when non-empty, then `kwargs:` with the indented map
/// only when non-empty. When all three are empty/absent the output is the
/// literal `args: []\nkwargs: {}`.
pub fn args_kwargs(args: &List, kwargs: &Dict, details: Option<&Dict>) -> Result<String, Error> {
    let mut out = String::new();
    if let Some(details) = details {
        out.push_str("details:");
        out.push_str(&pretty_json(details)?);
        out.push('\n');
    }
    if !args.is_empty() {
        out.push_str("args:\n");
        out.push_str(&pretty_json(args)?);
    }
    if !kwargs.is_empty() {
        out.push_str("kwargs:\n");
        out.push_str(&pretty_json(kwargs)?);
    }
    if args.is_empty() && kwargs.is_empty() && details.is_none() {
        out.push_str("args: []\nkwargs: {}");
    }
    Ok(out)
}

/// Formats args and kwargs in the compact single-line layout used for
/// streaming progress: `args: <json>` and/or `kwargs: <json>`, or the
/// literal `args: [] kwargs: {}` when both are empty.
pub fn progress_args_kwargs(args: &List, kwargs: &Dict) -> Result<String, Error> {
    let mut out = String::new();
    if !args.is_empty() {
        out.push_str("args: ");
        out.push_str(&serde_json::to_string(args)?);
    }
    if !kwargs.is_empty() {
        out.push_str("kwargs: ");
        out.push_str(&serde_json::to_string(kwargs)?);
    }
    if args.is_empty() && kwargs.is_empty() {
        out.push_str("args: [] kwargs: {}");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn sample_args() -> List {
        vec![json!("test"), json!(1), json!(true), json!("1.0")]
    }

    fn sample_kwargs() -> Dict {
        let mut dict = Dict::new();
        dict.insert("key".into(), json!("value"));
        dict.insert("key2".into(), json!(1));
        dict.insert("key3".into(), json!(false));
        dict
    }

    #[test]
    fn test_args_only() {
        let out = args_kwargs(&sample_args(), &Dict::new(), None).unwrap();
        assert_eq!(
            out,
            "args:\n[\n    \"test\",\n    1,\n    true,\n    \"1.0\"\n]"
        );
    }

    #[test]
    fn test_kwargs_only() {
        let out = args_kwargs(&Vec::new(), &sample_kwargs(), None).unwrap();
        assert_eq!(
            out,
            "kwargs:\n{\n    \"key\": \"value\",\n    \"key2\": 1,\n    \"key3\": false\n}"
        );
    }

    #[test]
    fn test_args_and_kwargs_concatenate() {
        let out = args_kwargs(&sample_args(), &sample_kwargs(), None).unwrap();
        assert_eq!(
            out,
            "args:\n[\n    \"test\",\n    1,\n    true,\n    \"1.0\"\n]\
             kwargs:\n{\n    \"key\": \"value\",\n    \"key2\": 1,\n    \"key3\": false\n}"
        );
    }

    #[test]
    fn test_details_precede_args() {
        let mut details = Dict::new();
        details.insert("details".into(), json!("broker details"));
        let out = args_kwargs(&sample_args(), &Dict::new(), Some(&details)).unwrap();
        assert_eq!(
            out,
            "details:{\n    \"details\": \"broker details\"\n}\n\
             args:\n[\n    \"test\",\n    1,\n    true,\n    \"1.0\"\n]"
        );
    }

    #[test]
    fn test_details_only() {
        let mut details = Dict::new();
        details.insert("details".into(), json!("broker details"));
        let out = args_kwargs(&Vec::new(), &Dict::new(), Some(&details)).unwrap();
        assert_eq!(out, "details:{\n    \"details\": \"broker details\"\n}\n");
    }

    #[test]
    fn test_all_empty_is_literal_placeholder() {
        let out = args_kwargs(&Vec::new(), &Dict::new(), None).unwrap();
        assert_eq!(out, "args: []\nkwargs: {}");
    }

    #[test]
    fn test_progress_args_only() {
        let out = progress_args_kwargs(&sample_args(), &Dict::new()).unwrap();
        assert_eq!(out, "args: [\"test\",1,true,\"1.0\"]");
    }

    #[test]
    fn test_progress_kwargs_only() {
        let out = progress_args_kwargs(&Vec::new(), &sample_kwargs()).unwrap();
        assert_eq!(out, "kwargs: {\"key\":\"value\",\"key2\":1,\"key3\":false}");
    }

    #[test]
    fn test_progress_both() {
        let out = progress_args_kwargs(&sample_args(), &sample_kwargs()).unwrap();
        assert_eq!(
            out,
            "args: [\"test\",1,true,\"1.0\"]kwargs: {\"key\":\"value\",\"key2\":1,\"key3\":false}"
        );
    }

    #[test]
    fn test_progress_both_empty() {
        let out = progress_args_kwargs(&Vec::new(), &Dict::new()).unwrap();
        assert_eq!(out, "args: [] kwargs: {}");
    }

    #[test]
    fn test_encode_to_json_trailing_newline() {
        let value: Value = json!(["hello", 1, true, "bar"]);
        let out = encode_to_json(&value).unwrap();
        assert_eq!(out, "[\n    \"hello\",\n    1,\n    true,\n    \"bar\"\n]\n");
    }
}
