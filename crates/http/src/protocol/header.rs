use bytes::{BufMut, BytesMut};

/// Ordered header entries with case-insensitive keys.
///
/// Every key maps to the values seen for it, in insertion order. The spelling a key was first
/// inserted with is the one written to the wire, all lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderEntries {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderEntries {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// The first value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    /// The last value of `key`.
    pub fn get_last(&self, key: &str) -> Option<&str> {
        self.get_all(key).last().map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        match self.position(key) {
            Some(index) => &self.entries[index].1,
            None => &[],
        }
    }

    /// Adds a value after the existing values of `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        match self.position(&key) {
            Some(index) => self.entries[index].1.push(value.into()),
            None => self.entries.push((key, vec![value.into()])),
        }
    }

    /// Replaces all values of `key` with a single value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        match self.position(&key) {
            Some(index) => self.entries[index].1 = vec![value.into()],
            None => self.entries.push((key, vec![value.into()])),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.position(key).map(|index| self.entries.remove(index).1)
    }

    /// Every `(key, value)` pair in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(key, values)| values.iter().map(move |value| (key.as_str(), value.as_str())))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Whether any comma separated element of any value of `key` equals `token`, ignoring case.
    pub fn contains_token(&self, key: &str, token: &str) -> bool {
        self.get_all(key).iter().flat_map(|value| value.split(',')).any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    pub(crate) fn extend(&mut self, other: HeaderEntries) {
        for (key, values) in other.entries {
            for value in values {
                self.append(key.as_str(), value);
            }
        }
    }

    /// Writes every `key: value` line followed by the blank line ending the header.
    pub(crate) fn write_to(&self, dst: &mut BytesMut) {
        for (key, value) in self.iter() {
            dst.reserve(key.len() + value.len() + 4);
            dst.put_slice(key.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
    }
}
