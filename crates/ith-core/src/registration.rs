//! # Authn-Method Registration Ids
//!
//! Releasing an identity back to its owner starts with the owner's device
//! entering registration mode. The device shows a pairing link of the form
//! `https://id.ai/pair#aBcDe`; the five alphanumeric characters of the
//! fragment are the registration id handed to `startReleaseIdentity`.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CoreError;

/// Length of a registration id.
const REGISTRATION_ID_LEN: usize = 5;

/// Path of the pairing link.
const PAIR_PATH: &str = "/pair";

/// A validated registration id: exactly five ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegistrationId(String);

impl RegistrationId {
    /// Validate a bare registration id.
    pub fn new(code: &str) -> Result<Self, CoreError> {
        if is_registration_code(code) {
            Ok(Self(code.to_string()))
        } else {
            Err(CoreError::InvalidRegistrationId(code.to_string()))
        }
    }

    /// Accept either a bare code or a pairing link.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let trimmed = input.trim();
        if is_registration_code(trimmed) {
            return Ok(Self(trimmed.to_string()));
        }
        extract_registration_id(trimmed)
            .ok_or_else(|| CoreError::InvalidRegistrationId(input.to_string()))
    }

    /// Access the code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RegistrationId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<RegistrationId> for String {
    fn from(value: RegistrationId) -> Self {
        value.0
    }
}

/// Extract the registration id from a pairing link.
///
/// The link must be `https`, have exactly the `/pair` path, no query, and a
/// fragment of exactly five ASCII alphanumerics.
pub fn extract_registration_id(input: &str) -> Option<RegistrationId> {
    let url = Url::parse(input).ok()?;
    if url.scheme() != "https" || url.host_str().is_none() {
        return None;
    }
    if url.path() != PAIR_PATH || url.query().is_some() {
        return None;
    }
    let fragment = url.fragment()?;
    is_registration_code(fragment).then(|| RegistrationId(fragment.to_string()))
}

fn is_registration_code(s: &str) -> bool {
    s.len() == REGISTRATION_ID_LEN && s.bytes().all(|b| b.is_ascii_alphanumeric())
}
