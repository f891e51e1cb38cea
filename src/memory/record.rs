//! Memory record data types
//!
//! A memory is a short fact about the user plus the context it came from,
//! filed under one of a fixed set of categories. Records are addressed by
//! `(user_id, category, id)` inside the `memories` realm.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Realm segment that prefixes every memory namespace
pub const MEMORY_REALM: &str = "memories";

/// Fixed category set a memory can be filed under
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Preferences, hobbies, relationships, interests
    #[default]
    Personal,
    /// Work, skills, achievements
    Professional,
    /// Anything that fits neither of the above
    Other,
}

impl Category {
    /// Every category, in declaration order
    pub const ALL: [Category; 3] = [Category::Personal, Category::Professional, Category::Other];

    /// Lowercase name used in namespaces and prompts
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Personal => "personal",
            Category::Professional => "professional",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    /// Exact, case-sensitive match against the lowercase names.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "personal" => Ok(Category::Personal),
            "professional" => Ok(Category::Professional),
            "other" => Ok(Category::Other),
            _ => Err(Error::Validation(format!(
                "unknown memory category '{}' (expected personal, professional or other)",
                s
            ))),
        }
    }
}

/// Fully-qualified namespace `(memories, user_id, category)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    /// Owner of the memories in this namespace
    pub user_id: String,
    /// Category partition
    pub category: Category,
}

impl Namespace {
    /// Build a namespace for a user and category
    pub fn new(user_id: impl Into<String>, category: Category) -> Self {
        Self {
            user_id: user_id.into(),
            category,
        }
    }

    /// Namespace as its tuple segments
    pub fn segments(&self) -> [&str; 3] {
        [MEMORY_REALM, &self.user_id, self.category.as_str()]
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", MEMORY_REALM, self.user_id, self.category)
    }
}

/// Prefix used to scope a search
///
/// `(user_id)` aggregates across every category; `(user_id, category)`
/// is an exact partition lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePrefix {
    /// Owner to scope to
    pub user_id: String,
    /// Category to scope to, or all categories when `None`
    pub category: Option<Category>,
}

impl NamespacePrefix {
    /// All categories for a user
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            category: None,
        }
    }

    /// A single category for a user
    pub fn category(user_id: impl Into<String>, category: Category) -> Self {
        Self {
            user_id: user_id.into(),
            category: Some(category),
        }
    }

    /// Whether a namespace falls under this prefix
    pub fn matches(&self, namespace: &Namespace) -> bool {
        namespace.user_id == self.user_id
            && self.category.map_or(true, |c| c == namespace.category)
    }
}

/// Payload written to the store for a memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryValue {
    /// The fact itself, e.g. "works as a data scientist"
    pub content: String,
    /// Where or why the fact came up
    pub context: String,
}

/// A stored memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Stable identifier, unchanged across updates
    pub id: String,
    /// Namespace the record lives in
    pub namespace: Namespace,
    /// Stored payload
    pub value: MemoryValue,
}

impl MemoryRecord {
    /// Category partition of this record
    pub fn category(&self) -> Category {
        self.namespace.category
    }

    /// Memory content
    pub fn content(&self) -> &str {
        &self.value.content
    }

    /// Memory context
    pub fn context(&self) -> &str {
        &self.value.context
    }
}
