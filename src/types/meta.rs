//! Resource type identity

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator between the segments of a resource type key
pub const KEY_SEPARATOR: &str = "::";

/// Category assigned when a resource type does not declare one
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Identity of a resource type.
///
/// The canonical key is `"{group}::{version}::{kind}"`, e.g. `core::v1::Pod`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    pub group: String,
    pub version: String,
    pub kind: String,

    /// Free-text description shown to users
    #[serde(default)]
    pub description: String,

    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl ResourceMeta {
    /// Create a new resource meta in the default category
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            description: String::new(),
            category: default_category(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Canonical `group::version::kind` key
    pub fn key(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.group,
            self.version,
            self.kind,
            sep = KEY_SEPARATOR
        )
    }

    /// Parse a canonical key into a meta with no description
    pub fn from_key(key: &str) -> Result<Self> {
        let segments: Vec<&str> = key.split(KEY_SEPARATOR).collect();
        match segments.as_slice() {
            [group, version, kind]
                if !group.is_empty() && !version.is_empty() && !kind.is_empty() =>
            {
                Ok(Self::new(*group, *version, *kind))
            }
            _ => Err(Error::InvalidResourceKey(key.to_string())),
        }
    }
}

impl fmt::Display for ResourceMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for ResourceMeta {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_key(s)
    }
}

/// Check whether a selector pattern matches a resource type key.
///
/// A bare `*` matches every key. Otherwise the pattern must have the same
/// number of segments as the key, and each `*` segment matches anything.
pub fn selector_matches(pattern: &str, key: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let pattern_segments: Vec<&str> = pattern.split(KEY_SEPARATOR).collect();
    let key_segments: Vec<&str> = key.split(KEY_SEPARATOR).collect();
    if pattern_segments.len() != key_segments.len() {
        return false;
    }

    pattern_segments
        .iter()
        .zip(key_segments.iter())
        .all(|(p, k)| *p == "*" || p == k)
}
