//! Metadata for objects and properties.
//!
//! Metadata is an ordered set of unique string keys mapped to string values.
//! Lookup ignores order; serialization preserves insertion order.

use smallvec::SmallVec;
use std::fmt;

/// Ordered, unique key/value string pairs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct MetaData {
    entries: SmallVec<[(String, String); 4]>,
}

impl MetaData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. An overwritten key keeps its original position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        for (k, v) in &mut self.entries {
            if *k == key {
                *v = value;
                return;
            }
        }
        self.entries.push((key, value));
    }

    /// Value for `key`, or the empty string when absent.
    pub fn get(&self, key: &str) -> &str {
        self.try_get(key).unwrap_or("")
    }

    pub fn try_get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy every pair of `other` whose key is not present here.
    pub fn append_only_unique(&mut self, other: &MetaData) {
        for (k, v) in other.iter() {
            if !self.contains(k) {
                self.entries.push((k.to_string(), v.to_string()));
            }
        }
    }

    /// Text form: `key=value;key2=value2`.
    pub fn serialize(&self) -> String {
        let mut result = String::new();
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                result.push(';');
            }
            escape_into(&mut result, k);
            result.push('=');
            escape_into(&mut result, v);
        }
        result
    }

    /// Parse the text form. Pairs without an `=` are skipped; an empty key
    /// is kept, as `set` accepts one.
    pub fn deserialize(s: &str) -> Self {
        let mut meta = Self::new();
        for part in split_unescaped(s, b';') {
            if let Some(eq_pos) = find_unescaped(part, b'=') {
                meta.set(unescape(&part[..eq_pos]), unescape(&part[eq_pos + 1..]));
            }
        }
        meta
    }

    pub const SCHEMA_KEY: &'static str = "schema";
    pub const SCHEMA_BASE_KEY: &'static str = "schemaBaseType";
    pub const INTERPRETATION_KEY: &'static str = "interpretation";
    /// Layering directive: drop this name from the merged level.
    pub const PRUNE_KEY: &'static str = "prune";
    /// Layering directive: discard earlier contributors for this name.
    pub const REPLACE_KEY: &'static str = "replace";

    pub fn schema(&self) -> &str {
        self.get(Self::SCHEMA_KEY)
    }

    pub fn set_schema(&mut self, schema: &str) {
        self.set(Self::SCHEMA_KEY, schema);
    }

    pub fn schema_base(&self) -> &str {
        self.get(Self::SCHEMA_BASE_KEY)
    }

    pub fn set_schema_base(&mut self, base: &str) {
        self.set(Self::SCHEMA_BASE_KEY, base);
    }

    pub fn interpretation(&self) -> &str {
        self.get(Self::INTERPRETATION_KEY)
    }

    pub fn matches_schema(&self, title: &str) -> bool {
        self.try_get(Self::SCHEMA_KEY) == Some(title)
    }

    pub fn is_prune(&self) -> bool {
        self.get(Self::PRUNE_KEY) == "1"
    }

    pub fn is_replace(&self) -> bool {
        self.get(Self::REPLACE_KEY) == "1"
    }
}

impl fmt::Debug for MetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MetaData {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut meta = Self::new();
        for (k, v) in iter {
            meta.set(k, v);
        }
        meta
    }
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        if matches!(c, '\\' | ';' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
}

fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('\\', Some(&next)) if matches!(next, '\\' | ';' | '=') => {
                result.push(next);
                chars.next();
            }
            _ => result.push(c),
        }
    }
    result
}

/// True if the byte at `i` is preceded by an odd run of backslashes.
fn is_escaped(bytes: &[u8], i: usize) -> bool {
    bytes[..i].iter().rev().take_while(|&&b| b == b'\\').count() % 2 == 1
}

fn find_unescaped(s: &str, ch: u8) -> Option<usize> {
    let bytes = s.as_bytes();
    (0..bytes.len()).find(|&i| bytes[i] == ch && !is_escaped(bytes, i))
}

fn split_unescaped(s: &str, ch: u8) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    for i in 0..bytes.len() {
        if bytes[i] == ch && !is_escaped(bytes, i) {
            parts.push(&s[start..i]);
            start = i + 1;
        }
    }
    if start < s.len() {
        parts.push(&s[start..]);
    }
    parts
}
