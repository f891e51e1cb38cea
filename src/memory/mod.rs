//! Memory system
//!
//! Records, the namespaced store contract, and the categorizer that picks a
//! record's partition.

pub mod categorizer;
pub mod record;
pub mod store;

pub use categorizer::{Categorizer, ClassificationError, FALLBACK_CATEGORY};
pub use record::{Category, MemoryRecord, MemoryValue, Namespace, NamespacePrefix, MEMORY_REALM};
pub use store::{InMemoryStore, MemoryStore};
