//! Node keys
//!
//! Tree edges are stored as keys, never as references. A key is stable for the
//! lifetime of a logical node, including across copy-on-write clones into a
//! pending draft.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Key of the singleton root element.
pub const ROOT_KEY: &str = "root";

/// Opaque node identifier
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(Arc<str>);

impl NodeKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    pub fn root() -> Self {
        Self::new(ROOT_KEY)
    }

    pub fn is_root(&self) -> bool {
        &*self.0 == ROOT_KEY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for NodeKey {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

/// Per-editor key source.
///
/// Keys are never reused within one generator, so a key removed in one
/// transaction cannot be confused with a node created in a later one.
#[derive(Debug, Clone, Default)]
pub struct KeyGenerator {
    next: u64,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume after the highest numeric key already present (e.g. after
    /// swapping in a state produced by another generator).
    pub fn starting_after(last: u64) -> Self {
        Self { next: last }
    }

    pub fn generate(&mut self) -> NodeKey {
        self.next += 1;
        NodeKey::from(self.next.to_string())
    }

    pub fn observe(&mut self, key: &NodeKey) {
        if let Ok(n) = key.as_str().parse::<u64>() {
            self.next = self.next.max(n);
        }
    }
}
