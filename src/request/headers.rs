//! Ordered multi-map for request headers.
//!
//! Names match case-insensitively; the casing of the first occurrence is
//! what gets stored and iterated. Values for one name keep their arrival
//! order. Duplicate occurrences of a name append to that name's value
//! sequence rather than creating a second key.

#[derive(Debug, Clone)]
struct HeaderEntry {
    name: String,
    values: Vec<String>,
}

/// Case-aware ordered multi-value header store.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<HeaderEntry>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Append a value under `name`, creating the key on first sight.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(name) {
            Some(i) => self.entries[i].values.push(value),
            None => self.entries.push(HeaderEntry {
                name: name.to_string(),
                values: vec![value],
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// First value recorded under `name`, if any.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|i| self.entries[i].values.first())
            .map(String::as_str)
    }

    /// All values recorded under `name`, in arrival order.
    pub fn all(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(i) => &self.entries[i].values,
            None => &[],
        }
    }

    /// Iterate names (first-seen casing) with their value sequences, in
    /// name insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.values.as_slice()))
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_lookup() {
        let mut headers = HeaderMap::new();
        headers.append("Host", "example.com");
        assert!(headers.contains("Host"));
        assert_eq!(headers.first("Host"), Some("example.com"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Length", "42");
        assert!(headers.contains("content-length"));
        assert_eq!(headers.first("CONTENT-LENGTH"), Some("42"));
    }

    #[test]
    fn test_first_seen_casing_is_preserved() {
        let mut headers = HeaderMap::new();
        headers.append("x-custom", "a");
        headers.append("X-Custom", "b");
        assert_eq!(headers.len(), 1);
        let (name, values) = headers.iter().next().unwrap();
        assert_eq!(name, "x-custom");
        assert_eq!(values, ["a", "b"]);
    }

    #[test]
    fn test_value_sequence_preserves_arrival_order() {
        let mut headers = HeaderMap::new();
        headers.append("Cookie", "first=1");
        headers.append("Cookie", "second=2");
        headers.append("Cookie", "third=3");
        assert_eq!(headers.all("Cookie"), ["first=1", "second=2", "third=3"]);
        assert_eq!(headers.first("Cookie"), Some("first=1"));
    }

    #[test]
    fn test_missing_name() {
        let headers = HeaderMap::new();
        assert!(!headers.contains("Host"));
        assert!(headers.first("Host").is_none());
        assert!(headers.all("Host").is_empty());
        assert!(headers.is_empty());
    }
}
