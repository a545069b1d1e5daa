//! Instance tags
//!
//! Tags on a request are an unordered map, but they are always submitted to
//! the provider in ascending key order so tagging calls are deterministic.

use std::collections::HashMap;

/// A single key/value tag applied to an instance
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for Tag {
    fn from((key, value): (K, V)) -> Self {
        Self::new(key, value)
    }
}

/// Build the tag list for a tagging call, sorted by key.
pub fn sorted_tags(tags: &HashMap<String, String>) -> Vec<Tag> {
    let mut sorted: Vec<Tag> = tags
        .iter()
        .map(|(k, v)| Tag::new(k.as_str(), v.as_str()))
        .collect();
    sorted.sort_unstable_by(|a, b| a.key.cmp(&b.key));
    sorted
}
