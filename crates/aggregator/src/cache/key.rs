//! Cache key construction

use std::fmt;

/// Namespaced cache key built from a prefix and ordered parameter segments
///
/// Segments are percent-encoded, so a `:` inside a parameter can never shift
/// the boundary between two segments and two distinct parameter tuples always
/// map to distinct keys.
///
/// ```
/// use catalog_gateway_aggregator::cache::CacheKey;
///
/// let key = CacheKey::new("douban:search").segment("a:b").segment("");
/// assert_eq!(key.as_str(), "douban:search:a%3Ab:");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Start a key under a fixed namespace; the namespace is used verbatim
    pub fn new(namespace: &str) -> Self {
        Self(namespace.to_string())
    }

    pub fn segment(mut self, value: impl fmt::Display) -> Self {
        self.0.push(':');
        self.0.push_str(&urlencoding::encode(&value.to_string()));
        self
    }

    /// Append an optional parameter; `None` becomes an empty segment
    pub fn optional(self, value: Option<impl fmt::Display>) -> Self {
        match value {
            Some(value) => self.segment(value),
            None => self.segment(""),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Glob matching every key in this key's namespace
    pub fn pattern(&self) -> String {
        format!("{}:*", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
