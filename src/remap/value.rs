//! Structured values carried by widgets, customizer settings and option trees

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use std::fmt;

/// A recursive value whose shape survives remapping unchanged
///
/// Mapping key order, number lexemes and string escapes are kept exactly as
/// decoded, so a tree that contains no references re-encodes to the same
/// bytes it came from (insignificant whitespace aside).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueTree {
    Null,
    Bool(bool),
    /// Number kept as its original lexeme
    Number(String),
    String(String),
    /// A string whose source spelling differs from the canonical escaping,
    /// such as `"https:\/\/x.test"`. `raw` is the literal including quotes.
    Escaped { text: String, raw: String },
    Sequence(Vec<ValueTree>),
    Mapping(Vec<(String, ValueTree)>),
}

impl ValueTree {
    pub fn string(s: impl Into<String>) -> Self {
        ValueTree::String(s.into())
    }

    pub fn number(n: impl ToString) -> Self {
        ValueTree::Number(n.to_string())
    }

    /// Decode a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let raw: &RawValue = serde_json::from_str(json)?;
        decode(raw)
    }

    /// Compact JSON encoding
    pub fn to_json_string(&self) -> String {
        let mut out = String::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut String) {
        match self {
            ValueTree::Null => out.push_str("null"),
            ValueTree::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            ValueTree::Number(raw) if is_json_number(raw) => out.push_str(raw),
            ValueTree::Number(raw) => quote_into(raw, out),
            ValueTree::String(s) => quote_into(s, out),
            ValueTree::Escaped { raw, .. } => out.push_str(raw),
            ValueTree::Sequence(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.encode_into(out);
                }
                out.push(']');
            }
            ValueTree::Mapping(entries) => {
                out.push('{');
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    quote_into(key, out);
                    out.push(':');
                    value.encode_into(out);
                }
                out.push('}');
            }
        }
    }

    /// Look up a direct child of a mapping
    pub fn get(&self, key: &str) -> Option<&ValueTree> {
        match self {
            ValueTree::Mapping(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ValueTree::String(s) | ValueTree::Escaped { text: s, .. } => Some(s),
            _ => None,
        }
    }

    /// Integer value of a number or a numeric string
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ValueTree::Number(raw) => raw.parse().ok(),
            _ => match self.as_str() {
                Some(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.parse().ok(),
                _ => None,
            },
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, ValueTree::Sequence(_) | ValueTree::Mapping(_))
    }

    /// Number of scalar leaves in the tree
    pub fn leaf_count(&self) -> usize {
        match self {
            ValueTree::Sequence(items) => items.iter().map(|v| v.leaf_count()).sum(),
            ValueTree::Mapping(entries) => entries.iter().map(|(_, v)| v.leaf_count()).sum(),
            _ => 1,
        }
    }
}

/// Build a tree from one raw JSON value, keeping each scalar's source text
fn decode(raw: &RawValue) -> Result<ValueTree, serde_json::Error> {
    let text = raw.get();
    match text.as_bytes().first() {
        Some(b'{') => {
            let RawEntries(entries) = serde_json::from_str::<RawEntries<'_>>(text)?;
            entries
                .into_iter()
                .map(|(key, value)| Ok((key, decode(value)?)))
                .collect::<Result<Vec<_>, _>>()
                .map(ValueTree::Mapping)
        }
        Some(b'[') => {
            let items: Vec<&RawValue> = serde_json::from_str(text)?;
            items
                .into_iter()
                .map(decode)
                .collect::<Result<Vec<_>, _>>()
                .map(ValueTree::Sequence)
        }
        Some(b'"') => {
            let value: String = serde_json::from_str(text)?;
            let mut canonical = String::with_capacity(text.len());
            quote_into(&value, &mut canonical);
            if canonical == text {
                Ok(ValueTree::String(value))
            } else {
                Ok(ValueTree::Escaped {
                    text: value,
                    raw: text.to_string(),
                })
            }
        }
        Some(b't') => Ok(ValueTree::Bool(true)),
        Some(b'f') => Ok(ValueTree::Bool(false)),
        Some(b'n') => Ok(ValueTree::Null),
        _ => Ok(ValueTree::Number(text.to_string())),
    }
}

/// `-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?`
fn is_json_number(raw: &str) -> bool {
    let digits = |s: &str| s.bytes().take_while(u8::is_ascii_digit).count();
    let rest = raw.strip_prefix('-').unwrap_or(raw);
    let int = digits(rest);
    if int == 0 || (int > 1 && rest.starts_with('0')) {
        return false;
    }
    let mut rest = &rest[int..];
    if let Some(frac) = rest.strip_prefix('.') {
        let n = digits(frac);
        if n == 0 {
            return false;
        }
        rest = &frac[n..];
    }
    if let Some(exp) = rest.strip_prefix(['e', 'E']) {
        let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
        let n = digits(exp);
        if n == 0 {
            return false;
        }
        rest = &exp[n..];
    }
    rest.is_empty()
}

/// Canonical JSON string literal: only quotes, backslashes and control
/// characters are escaped
fn quote_into(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Object members in document order, values left undecoded
struct RawEntries<'a>(Vec<(String, &'a RawValue)>);

impl<'de> Deserialize<'de> for RawEntries<'de> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawEntries<'de>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some(entry) = map.next_entry::<String, &'de RawValue>()? {
                    entries.push(entry);
                }
                Ok(RawEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

// Snapshots embed the tree as raw JSON so lexemes survive a save and reload.
impl Serialize for ValueTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = RawValue::from_string(self.to_json_string()).map_err(serde::ser::Error::custom)?;
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ValueTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        decode(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_keeps_order_and_lexemes() {
        let json = r#"{"zeta":1.50,"alpha":[1,2e3,"x"],"mid":{"b":null,"a":true}}"#;
        let tree = ValueTree::from_json_str(json).unwrap();
        assert_eq!(tree.to_json_string(), json);

        match &tree {
            ValueTree::Mapping(entries) => {
                let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
            }
            other => panic!("expected mapping, got {:?}", other),
        }
    }

    #[test]
    fn test_exponents_and_escapes_survive() {
        let json = r#"{"a":1e3,"n":1E5,"m":-2.5e-3,"url":"https:\/\/x.test\/","name":"café","e":"caf\u00e9","q":"say \"hi\""}"#;
        let tree = ValueTree::from_json_str(json).unwrap();
        assert_eq!(tree.to_json_string(), json);

        assert_eq!(tree.get("url").and_then(|v| v.as_str()), Some("https://x.test/"));
        assert_eq!(tree.get("name").and_then(|v| v.as_str()), Some("café"));
        assert_eq!(tree.get("e").and_then(|v| v.as_str()), Some("café"));
        // canonical spelling needs no raw copy
        assert_eq!(tree.get("q"), Some(&ValueTree::string("say \"hi\"")));
    }

    #[test]
    fn test_number_lexemes_checked_on_encode() {
        for ok in ["0", "-0", "12", "1.50", "1e400", "2E-3", "123456789012345678901234567890"] {
            assert!(is_json_number(ok), "{}", ok);
        }
        for bad in ["", "-", "01", "1.", ".5", "+1", "1e", "NaN", "0x10"] {
            assert!(!is_json_number(bad), "{}", bad);
        }
        // a lexeme that is not JSON is written as a string
        assert_eq!(ValueTree::Number("INF".into()).to_json_string(), r#""INF""#);
    }

    #[test]
    fn test_whitespace_is_dropped() {
        let tree = ValueTree::from_json_str(" { \"a\" : [ 1 , 2 ] }\n").unwrap();
        assert_eq!(tree.to_json_string(), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(ValueTree::from_json_str(r#"{"a":}"#).is_err());
        assert!(ValueTree::from_json_str("").is_err());
    }

    #[test]
    fn test_snapshot_serde_keeps_lexemes() {
        let tree = ValueTree::from_json_str(r#"[1e3,"a\/b"]"#).unwrap();
        let saved = serde_json::to_string(&vec![tree.clone()]).unwrap();
        assert_eq!(saved, r#"[[1e3,"a\/b"]]"#);
        let loaded: Vec<ValueTree> = serde_json::from_str(&saved).unwrap();
        assert_eq!(loaded, vec![tree]);
    }

    #[test]
    fn test_as_u64() {
        assert_eq!(ValueTree::number(42).as_u64(), Some(42));
        assert_eq!(ValueTree::string("42").as_u64(), Some(42));
        assert_eq!(ValueTree::string(" 42").as_u64(), None);
        assert_eq!(ValueTree::string("").as_u64(), None);
        assert_eq!(ValueTree::Number("1.5".into()).as_u64(), None);
    }

    #[test]
    fn test_get_and_leaf_count() {
        let tree = ValueTree::from_json_str(r#"{"a":{"b":[1,2,3]},"c":"d"}"#).unwrap();
        assert_eq!(tree.get("c").and_then(|v| v.as_str()), Some("d"));
        assert!(tree.get("missing").is_none());
        assert_eq!(tree.leaf_count(), 4);
    }
}
