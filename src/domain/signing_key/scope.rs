//! Permission scope sets

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Set of lower-cased permission tags a key is valid for.
///
/// An empty scope is a wildcard: a key carrying it matches any requested
/// scope. Tags are only lower-cased; a blank tag is a real member and never
/// widens the scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Scope(BTreeSet<String>);

impl Scope {
    /// Scope that matches everything
    pub fn wildcard() -> Self {
        Self::default()
    }

    /// Build a scope from any list of tags, normalizing each one
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            tags.into_iter()
                .map(|tag| tag.as_ref().to_lowercase())
                .collect(),
        )
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(&tag.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// True when at least one tag is shared
    pub fn intersects(&self, other: &Scope) -> bool {
        !self.0.is_disjoint(&other.0)
    }

    /// True when every tag of `other` is present in this scope
    pub fn contains_all(&self, other: &Scope) -> bool {
        other.0.is_subset(&self.0)
    }

    /// Whether a key carrying this scope may be used for `requested`
    pub fn permits(&self, requested: &Scope) -> bool {
        self.is_wildcard() || self.intersects(requested)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl From<&str> for Scope {
    fn from(tag: &str) -> Self {
        Self::new([tag])
    }
}

impl From<String> for Scope {
    fn from(tag: String) -> Self {
        Self::new([tag])
    }
}

impl From<Vec<String>> for Scope {
    fn from(tags: Vec<String>) -> Self {
        Self::new(tags)
    }
}

impl From<Vec<&str>> for Scope {
    fn from(tags: Vec<&str>) -> Self {
        Self::new(tags)
    }
}

impl From<&[&str]> for Scope {
    fn from(tags: &[&str]) -> Self {
        Self::new(tags)
    }
}

impl<const N: usize> From<[&str; N]> for Scope {
    fn from(tags: [&str; N]) -> Self {
        Self::new(tags)
    }
}

impl From<Scope> for Vec<String> {
    fn from(scope: Scope) -> Self {
        scope.0.into_iter().collect()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            return write!(f, "*");
        }

        let joined: Vec<&str> = self.iter().collect();
        write!(f, "{}", joined.join(","))
    }
}
