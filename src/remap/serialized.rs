//! PHP `serialize()` payloads embedded in string values
//!
//! Post meta and theme settings in exported bundles frequently store arrays
//! as PHP-serialized strings. Only arrays of scalars and nested arrays are
//! understood; objects and references are left opaque and never decoded.

use super::value::ValueTree;

/// Whether `raw` looks like a serialized array worth decoding
pub fn looks_serialized(raw: &str) -> bool {
    let raw = raw.trim_end();
    raw.starts_with("a:") && raw.ends_with('}')
}

/// Decode a serialized array, returning `None` for anything not fully understood
pub fn decode(raw: &str) -> Option<ValueTree> {
    let mut decoder = Decoder {
        input: raw.as_bytes(),
        pos: 0,
    };
    let value = decoder.value()?;
    if decoder.pos != decoder.input.len() {
        return None;
    }
    match value {
        ValueTree::Mapping(_) => Some(value),
        _ => None,
    }
}

/// Encode a tree produced by [`decode`]
pub fn encode(tree: &ValueTree) -> String {
    let mut out = String::new();
    encode_into(tree, &mut out);
    out
}

fn encode_into(tree: &ValueTree, out: &mut String) {
    match tree {
        ValueTree::Null => out.push_str("N;"),
        ValueTree::Bool(b) => out.push_str(if *b { "b:1;" } else { "b:0;" }),
        ValueTree::Number(raw) => {
            if raw.parse::<i64>().is_ok() {
                out.push_str(&format!("i:{};", raw));
            } else {
                out.push_str(&format!("d:{};", raw));
            }
        }
        ValueTree::String(s) | ValueTree::Escaped { text: s, .. } => encode_string(s, out),
        ValueTree::Sequence(items) => {
            out.push_str(&format!("a:{}:{{", items.len()));
            for (index, item) in items.iter().enumerate() {
                out.push_str(&format!("i:{};", index));
                encode_into(item, out);
            }
            out.push('}');
        }
        ValueTree::Mapping(entries) => {
            out.push_str(&format!("a:{}:{{", entries.len()));
            for (key, value) in entries {
                if is_integer_key(key) {
                    out.push_str(&format!("i:{};", key));
                } else {
                    encode_string(key, out);
                }
                encode_into(value, out);
            }
            out.push('}');
        }
    }
}

fn encode_string(s: &str, out: &mut String) {
    out.push_str(&format!("s:{}:\"{}\";", s.len(), s));
}

/// PHP casts canonical decimal integer keys to integers
fn is_integer_key(key: &str) -> bool {
    match key.parse::<i64>() {
        Ok(n) => n.to_string() == key,
        Err(_) => false,
    }
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn value(&mut self) -> Option<ValueTree> {
        let tag = *self.input.get(self.pos)?;
        match tag {
            b'N' => {
                self.expect(b"N;")?;
                Some(ValueTree::Null)
            }
            b'b' => {
                self.expect(b"b:")?;
                let raw = self.until(b';')?;
                match raw {
                    "0" => Some(ValueTree::Bool(false)),
                    "1" => Some(ValueTree::Bool(true)),
                    _ => None,
                }
            }
            b'i' => {
                self.expect(b"i:")?;
                let raw = self.until(b';')?;
                raw.parse::<i64>().ok()?;
                Some(ValueTree::Number(raw.to_string()))
            }
            b'd' => {
                self.expect(b"d:")?;
                let raw = self.until(b';')?;
                if raw.parse::<i64>().is_ok() {
                    // keep the float tag on re-encode
                    Some(ValueTree::Number(format!("{}.0", raw)))
                } else {
                    Some(ValueTree::Number(raw.to_string()))
                }
            }
            b's' => {
                let s = self.string()?;
                self.expect(b";")?;
                Some(ValueTree::String(s))
            }
            b'a' => {
                self.expect(b"a:")?;
                let count: usize = self.until(b':')?.parse().ok()?;
                self.expect(b"{")?;
                let mut entries = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let key = match self.input.get(self.pos)? {
                        b'i' => {
                            self.expect(b"i:")?;
                            let raw = self.until(b';')?;
                            raw.parse::<i64>().ok()?;
                            raw.to_string()
                        }
                        b's' => {
                            let s = self.string()?;
                            self.expect(b";")?;
                            s
                        }
                        _ => return None,
                    };
                    let value = self.value()?;
                    entries.push((key, value));
                }
                self.expect(b"}")?;
                Some(ValueTree::Mapping(entries))
            }
            _ => None,
        }
    }

    /// `s:<len>:"<bytes>"` without the trailing `;`
    fn string(&mut self) -> Option<String> {
        self.expect(b"s:")?;
        let len: usize = self.until(b':')?.parse().ok()?;
        self.expect(b"\"")?;
        let end = self.pos.checked_add(len)?;
        let bytes = self.input.get(self.pos..end)?;
        let s = std::str::from_utf8(bytes).ok()?.to_string();
        self.pos = end;
        self.expect(b"\"")?;
        Some(s)
    }

    fn expect(&mut self, token: &[u8]) -> Option<()> {
        if self.input.get(self.pos..self.pos + token.len())? == token {
            self.pos += token.len();
            Some(())
        } else {
            None
        }
    }

    fn until(&mut self, delimiter: u8) -> Option<&'a str> {
        let rest = self.input.get(self.pos..)?;
        let offset = rest.iter().position(|&b| b == delimiter)?;
        let raw = std::str::from_utf8(&rest[..offset]).ok()?;
        self.pos += offset + 1;
        Some(raw)
    }
}
