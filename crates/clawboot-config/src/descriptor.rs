//! Declarative JSON config descriptors
//!
//! A descriptor is one JSON object per integration, mounted into the config
//! directory. Fields are looked up through an ordered list of alias paths,
//! first non-blank string wins.

use serde_json::{Map, Value};
use std::path::Path;

/// Object keys from the descriptor root to a field.
///
/// Each segment is a literal key, so `&["user.name"]` addresses a top-level
/// key containing a dot while `&["user", "name"]` addresses a nested one.
pub type FieldPath<'a> = &'a [&'a str];

/// A parsed JSON object descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    root: Map<String, Value>,
}

impl Descriptor {
    /// Load a descriptor from disk.
    ///
    /// Absent, unreadable and malformed files all yield `None`; a descriptor
    /// whose top level is not an object is treated as malformed.
    pub fn load(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("No descriptor at {:?}: {}", path, e);
                return None;
            }
        };

        let descriptor = Self::parse(&content);
        if descriptor.is_none() {
            tracing::debug!("Ignoring malformed descriptor at {:?}", path);
        }
        descriptor
    }

    /// Parse descriptor JSON text
    pub fn parse(content: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(content).ok()? {
            Value::Object(root) => Some(Self { root }),
            _ => None,
        }
    }

    /// Resolve the first candidate path holding a non-blank string.
    ///
    /// The returned value is trimmed. Missing keys, non-string values and
    /// whitespace-only strings fall through to the next candidate.
    pub fn lookup(&self, candidates: &[FieldPath<'_>]) -> Option<String> {
        candidates.iter().find_map(|path| {
            let trimmed = self.get(path)?.as_str()?.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
    }

    fn get(&self, path: FieldPath<'_>) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.root.get(*first)?, |value, key| value.as_object()?.get(*key))
    }
}
