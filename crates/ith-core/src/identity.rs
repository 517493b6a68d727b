//! # Principal Newtype
//!
//! Textual principals identify the contract owner, buyers, controllers and
//! the caller. The textual form is lowercase base32 in dash-separated groups
//! of five characters, the last group being one to five characters long.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum length of a textual principal (29 bytes, base32, with dashes).
const MAX_PRINCIPAL_TEXT_LEN: usize = 63;

/// Textual form of the anonymous principal.
const ANONYMOUS_TEXT: &str = "2vxsx-fae";

/// A validated textual principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    /// Parse a textual principal.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPrincipal`] if the text is empty, too
    /// long, contains characters outside the base32 alphabet, or has
    /// malformed dash grouping.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        if text.is_empty() || text.len() > MAX_PRINCIPAL_TEXT_LEN {
            return Err(CoreError::InvalidPrincipal(text.to_string()));
        }
        let groups: Vec<&str> = text.split('-').collect();
        let last = groups.len() - 1;
        for (i, group) in groups.iter().enumerate() {
            let len_ok = if i == last {
                (1..=5).contains(&group.len())
            } else {
                group.len() == 5
            };
            let alphabet_ok = group
                .bytes()
                .all(|b| b.is_ascii_lowercase() || (b'2'..=b'7').contains(&b));
            if !len_ok || !alphabet_ok {
                return Err(CoreError::InvalidPrincipal(text.to_string()));
            }
        }
        Ok(Self(text.to_string()))
    }

    /// The anonymous principal (unauthenticated callers).
    pub fn anonymous() -> Self {
        Self(ANONYMOUS_TEXT.to_string())
    }

    /// Whether this is the anonymous principal.
    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_TEXT
    }

    /// Access the textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Principal {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Principal {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Principal> for String {
    fn from(value: Principal) -> Self {
        value.0
    }
}
