//! URL-fragment ⇄ state synchronization.
//!
//! Inbound: the whole fragment parses into a key/value map that overwrites
//! the `url` namespace. Outbound: the mounted `w-url` annotation nodes name
//! which keys belong in the URL; the namespace is filtered to them,
//! serialized (query form for scalar maps, URL-encoded JSON for nested
//! ones, keys sorted either way), and written back only when the result
//! differs from the current fragment.

use crate::value::Value;
use crate::vdom::VNode;
use std::collections::BTreeSet;

/// Union of annotation key lists discovered in a rendered tree: one list of
/// persistent keys, one of transient keys.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UrlAnnotations {
    pub include: BTreeSet<String>,
    pub transient: BTreeSet<String>,
}

pub fn collect_annotations(roots: &[VNode]) -> UrlAnnotations {
    let mut annotations = UrlAnnotations::default();
    for root in roots {
        root.visit_elements(&mut |element| {
            if element.tag != "w-url" {
                return;
            }
            for (prop, target) in [
                ("data-url-include", &mut annotations.include),
                ("data-url-transient", &mut annotations.transient),
            ] {
                if let Some(keys) = element.prop_text(prop) {
                    for key in keys.split(',') {
                        let key = key.trim();
                        if !key.is_empty() {
                            target.insert(key.to_string());
                        }
                    }
                }
            }
        });
    }
    annotations
}

/// Parses a fragment into the full `url` namespace value. Segments are
/// `#`-separated; each is either a query-string form (values arrive as
/// text) or a URL-encoded JSON object (values keep their types). Unknown
/// combinations merge left to right.
pub fn parse_fragment(fragment: &str) -> Value {
    let mut entries = indexmap::IndexMap::new();
    let body = fragment.strip_prefix('#').unwrap_or(fragment);
    for segment in body.split('#') {
        if segment.is_empty() {
            continue;
        }
        let decoded = percent_decode(segment);
        if decoded.trim_start().starts_with('{') {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&decoded) {
                if let Value::Object(fields) = Value::from_json(&json) {
                    for (key, value) in fields.iter() {
                        entries.insert(key.clone(), value.clone());
                    }
                }
            }
            continue;
        }
        for pair in segment.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            entries.insert(
                percent_decode(key),
                Value::text(percent_decode(value)),
            );
        }
    }
    Value::Object(std::rc::Rc::new(entries))
}

/// Serializes the outbound fragment: one segment per non-empty key list
/// (include first, then transient), joined with `#` and prefixed with a
/// single `#`. Returns the empty string when nothing is included.
pub fn serialize_fragment(namespace: &Value, annotations: &UrlAnnotations) -> String {
    let mut segments = Vec::new();
    for keys in [&annotations.include, &annotations.transient] {
        if let Some(segment) = serialize_segment(namespace, keys) {
            segments.push(segment);
        }
    }
    if segments.is_empty() {
        String::new()
    } else {
        format!("#{}", segments.join("#"))
    }
}

fn serialize_segment(namespace: &Value, keys: &BTreeSet<String>) -> Option<String> {
    let mut selected: Vec<(&String, &Value)> = Vec::new();
    if let Value::Object(fields) = namespace {
        // BTreeSet iteration gives the sorted key order directly.
        for key in keys {
            if let Some(value) = fields.get(key) {
                if !value.is_null() {
                    selected.push((key, value));
                }
            }
        }
    }
    if selected.is_empty() {
        return None;
    }

    let scalar_only = selected
        .iter()
        .all(|(_, value)| !matches!(value, Value::List(_) | Value::Object(_)));

    if scalar_only {
        Some(
            selected
                .iter()
                .map(|(key, value)| {
                    format!(
                        "{}={}",
                        percent_encode(key),
                        percent_encode(&value.to_text())
                    )
                })
                .collect::<Vec<_>>()
                .join("&"),
        )
    } else {
        // serde_json maps are sorted, which keeps the JSON form stable.
        let mut object = serde_json::Map::new();
        for (key, value) in selected {
            object.insert(key.clone(), value.to_json());
        }
        Some(percent_encode(
            &serde_json::Value::Object(object).to_string(),
        ))
    }
}

fn percent_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 3 <= bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            if let Ok(byte) = u8::from_str_radix(&text[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(include: &[&str], transient: &[&str]) -> UrlAnnotations {
        UrlAnnotations {
            include: include.iter().map(|k| k.to_string()).collect(),
            transient: transient.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn scalar_round_trip_sorted() {
        let namespace = Value::object([
            ("tab", Value::text("settings")),
            ("count", Value::text("3")),
        ]);
        let fragment = serialize_fragment(&namespace, &annotations(&["tab", "count"], &[]));
        assert_eq!(fragment, "#count=3&tab=settings");
        let parsed = parse_fragment(&fragment);
        assert_eq!(parsed.get("tab"), Some(&Value::text("settings")));
        assert_eq!(parsed.get("count"), Some(&Value::text("3")));
    }

    #[test]
    fn keys_outside_the_lists_are_dropped() {
        let namespace = Value::object([
            ("tab", Value::text("settings")),
            ("count", Value::text("3")),
        ]);
        let fragment = serialize_fragment(&namespace, &annotations(&["tab"], &[]));
        assert_eq!(fragment, "#tab=settings");
    }

    #[test]
    fn nested_values_use_the_json_form() {
        let namespace = Value::object([(
            "filters",
            Value::object([("active", Value::Bool(true))]),
        )]);
        let fragment = serialize_fragment(&namespace, &annotations(&["filters"], &[]));
        assert!(fragment.starts_with("#%7B"), "got {fragment}");
        let parsed = parse_fragment(&fragment);
        assert_eq!(
            parsed.get("filters").and_then(|f| f.get("active")),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn include_and_transient_segments_concatenate() {
        let namespace = Value::object([
            ("tab", Value::text("a")),
            ("scroll", Value::text("40")),
        ]);
        let fragment =
            serialize_fragment(&namespace, &annotations(&["tab"], &["scroll"]));
        assert_eq!(fragment, "#tab=a#scroll=40");
        let parsed = parse_fragment(&fragment);
        assert_eq!(parsed.get("scroll"), Some(&Value::text("40")));
    }

    #[test]
    fn reserved_characters_escape_and_return() {
        let namespace = Value::object([("q", Value::text("a=b&c #d"))]);
        let fragment = serialize_fragment(&namespace, &annotations(&["q"], &[]));
        let parsed = parse_fragment(&fragment);
        assert_eq!(parsed.get("q"), Some(&Value::text("a=b&c #d")));
    }

    #[test]
    fn empty_lists_produce_an_empty_fragment() {
        let namespace = Value::object([("tab", Value::text("a"))]);
        assert_eq!(serialize_fragment(&namespace, &annotations(&[], &[])), "");
    }
}
