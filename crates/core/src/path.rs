//! Dotted/indexed path navigation over JSON documents.
//!
//! A path is a sequence of dot-separated tokens. Each token is a field name (`code`), a
//! field name followed by an index (`coding[0]`) or a bare index (`[0]`). Wildcards, filter
//! predicates and recursive descent are not supported.
//!
//! Resolution never fails loudly: any shape mismatch, out-of-range index or malformed token
//! yields `None`. A present JSON `null` resolves to `Some(&Value::Null)`, which callers use
//! to tell "explicitly null" apart from "absent".

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Field(&'a str),
    Index(usize),
}

/// Resolve `path` against `value`.
///
/// Returns `None` when the path is empty/blank, malformed, or does not lead to a value.
pub fn resolve<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let segments = parse(path)?;

    let mut current = value;
    for segment in segments {
        current = match (segment, current) {
            (Segment::Field(name), Value::Object(map)) => map.get(name)?,
            (Segment::Index(index), Value::Array(items)) => items.get(index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve `path` and return the value only if it is a string.
pub fn resolve_str<'v>(value: &'v Value, path: &str) -> Option<&'v str> {
    resolve(value, path).and_then(Value::as_str)
}

/// First dot-separated token of `path`, used as a prefix for flattened keys.
pub fn first_segment(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

fn parse(path: &str) -> Option<Vec<Segment<'_>>> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }

    let mut segments = Vec::new();
    for token in path.split('.') {
        parse_token(token, &mut segments)?;
    }
    Some(segments)
}

fn parse_token<'a>(token: &'a str, segments: &mut Vec<Segment<'a>>) -> Option<()> {
    let (name, mut rest) = match token.find('[') {
        Some(pos) => token.split_at(pos),
        None => (token, ""),
    };

    if name.is_empty() && rest.is_empty() {
        return None;
    }
    if !name.is_empty() {
        segments.push(Segment::Field(name));
    }

    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        let index = inner[..close].parse::<usize>().ok()?;
        segments.push(Segment::Index(index));
        rest = &inner[close + 1..];
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_path_and_null_root_are_absent() {
        assert_eq!(resolve(&json!({}), ""), None);
        assert_eq!(resolve(&json!({"a": 1}), "   "), None);
        assert_eq!(resolve(&Value::Null, "a.b"), None);
    }

    #[test]
    fn resolves_fields_and_indexes() {
        let doc = json!({"a": [{"b": 1}], "c": {"d": "x"}});
        assert_eq!(resolve(&doc, "a[0].b"), Some(&json!(1)));
        assert_eq!(resolve(&doc, "c.d"), Some(&json!("x")));
        assert_eq!(resolve(&doc["a"], "[0].b"), Some(&json!(1)));
    }

    #[test]
    fn mismatches_are_absent_not_errors() {
        let doc = json!({"a": [{"b": 1}], "s": "text"});
        assert_eq!(resolve(&doc, "a[3].b"), None);
        assert_eq!(resolve(&doc, "s.inner"), None);
        assert_eq!(resolve(&doc, "a.b"), None);
        assert_eq!(resolve(&doc, "missing.b"), None);
        assert_eq!(resolve(&doc, "s[0]"), None);
    }

    #[test]
    fn malformed_tokens_are_absent() {
        let doc = json!({"a": [1, 2]});
        assert_eq!(resolve(&doc, "a[x]"), None);
        assert_eq!(resolve(&doc, "a[0"), None);
        assert_eq!(resolve(&doc, "a..b"), None);
        assert_eq!(resolve(&doc, "a[-1]"), None);
    }

    #[test]
    fn explicit_null_is_present() {
        let doc = json!({"a": null});
        assert_eq!(resolve(&doc, "a"), Some(&Value::Null));
    }

    #[test]
    fn first_segment_takes_leading_token() {
        assert_eq!(first_segment("code.coding"), "code");
        assert_eq!(first_segment("valueQuantity"), "valueQuantity");
    }
}
