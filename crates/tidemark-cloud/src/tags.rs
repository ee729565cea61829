//! Tag-based identity matching
//!
//! Backend-assigned names are length and charset restricted, so they cannot
//! carry a logical name reliably. Ownership and identity are tracked through
//! tags instead.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag key holding a resource's logical name
pub const NAME_TAG: &str = "Name";

/// Owned tag set, keyed by tag key
pub type Tags = BTreeMap<String, String>;

/// A single key/value tag as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
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

/// Returns true iff every owned (key, value) pair is present in `candidate`.
///
/// This is a subset test: the candidate may carry any number of extra tags.
pub fn matches_tags(owned: &Tags, candidate: &[Tag]) -> bool {
    owned.iter().all(|(key, value)| {
        candidate
            .iter()
            .any(|tag| tag.key == *key && tag.value == *value)
    })
}

/// Look up the value of `key` in a backend tag list
pub fn tag_value<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.key == key)
        .map(|tag| tag.value.as_str())
}

/// Convert a backend tag list into an owned map (last value wins)
pub fn to_tag_map(tags: &[Tag]) -> Tags {
    tags.iter()
        .map(|tag| (tag.key.clone(), tag.value.clone()))
        .collect()
}

/// Convert an owned map into a backend tag list
pub fn to_tag_list(tags: &Tags) -> Vec<Tag> {
    tags.iter().map(|(k, v)| Tag::new(k, v)).collect()
}
