//! # Snapshot Decoding
//!
//! Shared helpers that turn one level of the remote union tree into a typed
//! variant. Structural problems become [`DecodeError`]s, which the view
//! layer renders as the illegal-state fallback. Unknown-but-well-formed
//! variants are not errors: they decode to the `Unrecognized` arm of the
//! typed enum and are logged by whichever consumer matches on them.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use ith_core::{classify, UnionShape, Variant};

/// Structural error in the remote holder snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A required union level is missing or not an object.
    #[error("{union}: no active variant")]
    NoActiveVariant {
        /// The union being decoded.
        union: &'static str,
    },

    /// A union level has zero or several populated keys.
    #[error("{union}: expected a single-entry union, found keys {keys:?}")]
    Ambiguous {
        /// The union being decoded.
        union: &'static str,
        /// Keys present on the object.
        keys: Vec<String>,
    },

    /// The payload of a recognized variant has an unexpected shape.
    #[error("{union}::{tag}: invalid payload: {message}")]
    Payload {
        /// The union being decoded.
        union: &'static str,
        /// The active tag.
        tag: &'static str,
        /// Deserializer message.
        message: String,
    },

    /// The snapshot envelope itself could not be deserialized.
    #[error("invalid holder snapshot: {0}")]
    Snapshot(String),
}

/// One decoded union level.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Level<'a> {
    Known(Variant<'a>),
    Unrecognized(&'a str),
}

/// Decode one union level.
pub(crate) fn level<'a>(
    union: &'static str,
    value: Option<&'a Value>,
    tags: &[&'static str],
) -> Result<Level<'a>, DecodeError> {
    match classify(value, tags) {
        UnionShape::Active(variant) => Ok(Level::Known(variant)),
        UnionShape::Unrecognized { tag, .. } => Ok(Level::Unrecognized(tag)),
        UnionShape::Absent => Err(DecodeError::NoActiveVariant { union }),
        UnionShape::Ambiguous { keys } => Err(DecodeError::Ambiguous {
            union,
            keys: keys.into_iter().map(str::to_string).collect(),
        }),
    }
}

/// Decode an optional union level: a missing or null value is `None`.
pub(crate) fn optional_level<'a>(
    union: &'static str,
    value: Option<&'a Value>,
    tags: &[&'static str],
) -> Result<Option<Level<'a>>, DecodeError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => level(union, Some(v), tags).map(Some),
    }
}

/// Deserialize the payload of a recognized variant.
pub(crate) fn payload<T: DeserializeOwned>(
    union: &'static str,
    variant: &Variant<'_>,
) -> Result<T, DecodeError> {
    T::deserialize(variant.payload).map_err(|e| DecodeError::Payload {
        union,
        tag: variant.tag,
        message: e.to_string(),
    })
}

/// Field of a recognized variant's payload.
pub(crate) fn field<'a>(variant: &Variant<'a>, name: &str) -> Option<&'a Value> {
    variant.payload.get(name)
}
