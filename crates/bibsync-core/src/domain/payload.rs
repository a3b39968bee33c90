//! Tagged variant types for remote payload quirks
//!
//! The remote API has two encoding quirks that would otherwise leak dynamic
//! typing into the domain model. Both are modelled here, once, at the
//! boundary:
//!
//! - a parent reference that is either the JSON boolean `false` (top-level
//!   object) or a string key ([`ParentRef`]);
//! - fields that are either a single value or a list of values
//!   ([`OneOrMany`]), re-serialized canonically as a list.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use super::newtypes::ObjectKey;

// ============================================================================
// ParentRef
// ============================================================================

/// A parent reference: `false` on the wire means "top-level"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    /// The object has no parent
    TopLevel,
    /// The object is a child of the referenced key
    Key(ObjectKey),
}

impl ParentRef {
    /// Returns the parent key, if any
    #[must_use]
    pub fn key(&self) -> Option<&ObjectKey> {
        match self {
            ParentRef::TopLevel => None,
            ParentRef::Key(key) => Some(key),
        }
    }

    /// Returns true for top-level objects
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        matches!(self, ParentRef::TopLevel)
    }
}

impl Serialize for ParentRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParentRef::TopLevel => serializer.serialize_bool(false),
            ParentRef::Key(key) => serializer.serialize_str(key.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for ParentRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Flag(bool),
            Key(String),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Flag(false) => Ok(ParentRef::TopLevel),
            Wire::Flag(true) => Err(de::Error::custom(
                "parent reference must be false or a key, got true",
            )),
            Wire::Key(s) => ObjectKey::new(s)
                .map(ParentRef::Key)
                .map_err(|e| de::Error::custom(e.to_string())),
        }
    }
}

// ============================================================================
// OneOrMany
// ============================================================================

/// A field that arrives as either a single value or a list of values
///
/// Decodes both shapes into a `Vec`-backed wrapper and always re-serializes
/// as a list, so local round-trips are canonical.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OneOrMany<T>(Vec<T>);

impl<T> OneOrMany<T> {
    /// Wraps an explicit list
    #[must_use]
    pub fn many(values: Vec<T>) -> Self {
        Self(values)
    }

    /// Wraps a single value
    #[must_use]
    pub fn one(value: T) -> Self {
        Self(vec![value])
    }

    /// Returns the values as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    /// Consumes the wrapper, returning the values
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.0
    }

    /// Returns the number of values
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no values are present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        Self(values)
    }
}

impl<T: Serialize> Serialize for OneOrMany<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for value in &self.0 {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for OneOrMany<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire<T> {
            Many(Vec<T>),
            One(T),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Many(values) => OneOrMany(values),
            Wire::One(value) => OneOrMany(vec![value]),
        })
    }
}
