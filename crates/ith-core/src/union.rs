//! # Union Navigator
//!
//! The holder state is a tree of single-entry tagged unions: every level is
//! an object with exactly one populated key naming the active variant, whose
//! value is that variant's payload.
//!
//! ```text
//! {"Holding": {"sub_state": {"FetchAssets": {"fetch_assets_state": {...}}}}}
//! ```
//!
//! [`active_variant`] inspects one level. Callers recurse on the returned
//! payload to drill into sub-states. Absence is not an error: many call
//! sites read "no active variant" as "not yet in this phase".
//!
//! ## Forward Compatibility
//!
//! The remote authority may ship new variants before the client is updated.
//! [`classify`] reports such a level as [`UnionShape::Unrecognized`], and
//! every consumer match ends in a catch-all that calls
//! [`log_unexpected_variant`] and degrades to a safe fallback. The log line
//! uses the dedicated target [`UNEXPECTED_VARIANT_TARGET`] so it can be
//! filtered and counted separately from ordinary warnings.

use serde_json::Value;

/// Tracing target of the unexpected-variant diagnostic.
pub const UNEXPECTED_VARIANT_TARGET: &str = "unexpected_variant";

/// The active variant of one union level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variant<'a> {
    /// The recognized tag.
    pub tag: &'static str,
    /// The variant payload (`Value::Null` for unit variants).
    pub payload: &'a Value,
}

/// A union type with a closed set of known tags.
pub trait TaggedUnion {
    /// Union name used in diagnostics.
    const NAME: &'static str;
    /// Every tag this client version recognizes.
    const TAGS: &'static [&'static str];
}

/// Shape of a value expected to be a single-entry union.
#[derive(Debug, Clone, PartialEq)]
pub enum UnionShape<'a> {
    /// The value is missing, null, or not an object.
    Absent,
    /// Exactly one legal tag is populated.
    Active(Variant<'a>),
    /// No legal tag is populated and the object has exactly one key: a
    /// variant this client does not know yet.
    Unrecognized {
        /// The unknown key.
        tag: &'a str,
        /// Its payload.
        payload: &'a Value,
    },
    /// Zero keys, several legal tags, or several unknown keys.
    Ambiguous {
        /// Every key present on the object.
        keys: Vec<&'a str>,
    },
}

/// Extract the active variant of a union level.
///
/// Returns `Some` only if `value` is an object on which exactly one own key
/// is also a member of `tags`. Total and side-effect free.
pub fn active_variant<'a>(value: Option<&'a Value>, tags: &[&'static str]) -> Option<Variant<'a>> {
    let object = value?.as_object()?;
    let mut found: Option<Variant<'a>> = None;
    for (key, payload) in object {
        if let Some(tag) = tags.iter().copied().find(|t| *t == key.as_str()) {
            if found.is_some() {
                return None;
            }
            found = Some(Variant { tag, payload });
        }
    }
    found
}

/// Extract the active variant of a [`TaggedUnion`] level.
pub fn navigate<U: TaggedUnion>(value: Option<&Value>) -> Option<Variant<'_>> {
    active_variant(value, U::TAGS)
}

/// Classify a union level, distinguishing unknown variants from garbage.
pub fn classify<'a>(value: Option<&'a Value>, tags: &[&'static str]) -> UnionShape<'a> {
    let Some(object) = value.and_then(Value::as_object) else {
        return UnionShape::Absent;
    };
    if let Some(variant) = active_variant(value, tags) {
        return UnionShape::Active(variant);
    }
    let keys: Vec<&'a str> = object.keys().map(String::as_str).collect();
    let legal = keys
        .iter()
        .filter(|k| tags.iter().any(|t| *t == **k))
        .count();
    if let ([tag], 0) = (keys.as_slice(), legal) {
        let tag: &'a str = *tag;
        if let Some(payload) = object.get(tag) {
            return UnionShape::Unrecognized { tag, payload };
        }
    }
    UnionShape::Ambiguous { keys }
}

/// Emit the structured unexpected-variant diagnostic.
pub fn log_unexpected_variant(union: &str, tag: &str) {
    tracing::warn!(
        target: UNEXPECTED_VARIANT_TARGET,
        union = %union,
        variant = %tag,
        "unexpected variant; degrading to fallback"
    );
}
