//! # Release Phase
//!
//! Custody returns to a device-held passkey: the contract puts the identity
//! into authn-method registration mode for the registration id shown on the
//! owner's (or buyer's) device, confirms the new method, checks that it
//! really grants access, and finally deletes its own authn method.
//!
//! ```text
//! StartRelease → EnterAuthnMethodRegistrationMode → EnsureOrphanedRegistrationExited
//!   → WaitingAuthnMethodRegistration → ConfirmAuthnMethodRegistration
//!   → CheckingAccessFromOwnerAuthnMethod → DeleteHolderAuthnMethod (success)
//!
//! absorbing: DangerousToLoseIdentity | IdentityAPIChanged | ReleaseFailed
//! ```

use serde::Deserialize;
use serde_json::Value;

use ith_core::{Principal, TaggedUnion, TimestampMillis};

use crate::decode::{self, DecodeError, Level};
use crate::holder::{ProgressStep, RestartAction};
use crate::holding::UnsellableReason;

/// Reason a release attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseError {
    /// The stored registration id became structurally invalid; the restart
    /// must carry a corrected one.
    AuthnMethodRegistrationModeEnterInvalidRegistrationId {
        /// Remote diagnostic.
        error: String,
    },
    /// The registration mode window closed.
    AuthnMethodRegistrationExpired,
    /// The owner's new authn method does not grant access.
    AuthnMethodCheckFailed,
    Unrecognized(String),
}

impl TaggedUnion for ReleaseError {
    const NAME: &'static str = "ReleaseError";
    const TAGS: &'static [&'static str] = &[
        "AuthnMethodRegistrationModeEnterInvalidRegistrationId",
        "AuthnMethodRegistrationExpired",
        "AuthnMethodCheckFailed",
    ];
}

#[derive(Deserialize)]
struct InvalidRegistrationIdPayload {
    #[serde(default)]
    error: String,
}

impl ReleaseError {
    fn decode(value: Option<&Value>) -> Result<Self, DecodeError> {
        Ok(match decode::level(Self::NAME, value, Self::TAGS)? {
            Level::Unrecognized(tag) => Self::Unrecognized(tag.to_string()),
            Level::Known(v) => match v.tag {
                "AuthnMethodRegistrationModeEnterInvalidRegistrationId" => {
                    let p: InvalidRegistrationIdPayload = if v.payload.is_null() {
                        InvalidRegistrationIdPayload {
                            error: String::new(),
                        }
                    } else {
                        decode::payload(Self::NAME, &v)?
                    };
                    Self::AuthnMethodRegistrationModeEnterInvalidRegistrationId { error: p.error }
                }
                "AuthnMethodRegistrationExpired" => Self::AuthnMethodRegistrationExpired,
                "AuthnMethodCheckFailed" => Self::AuthnMethodCheckFailed,
                other => Self::Unrecognized(other.to_string()),
            },
        })
    }

    /// Whether a restart must carry a user-supplied registration id.
    pub fn requires_registration_id(&self) -> bool {
        matches!(
            self,
            Self::AuthnMethodRegistrationModeEnterInvalidRegistrationId { .. }
        )
    }
}

/// Release sub-state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseState {
    StartRelease,
    EnterAuthnMethodRegistrationMode {
        /// Registration id as stored remotely. Not validated here: a
        /// malformed id surfaces as `ReleaseFailed` from the remote side.
        registration_id: String,
    },
    EnsureOrphanedRegistrationExited,
    WaitingAuthnMethodRegistration {
        expiration: TimestampMillis,
    },
    ConfirmAuthnMethodRegistration {
        expiration: TimestampMillis,
    },
    CheckingAccessFromOwnerAuthnMethod,
    /// Terminal success.
    DeleteHolderAuthnMethod,
    DangerousToLoseIdentity,
    IdentityApiChanged,
    ReleaseFailed {
        error: ReleaseError,
    },
    Unrecognized(String),
}

impl TaggedUnion for ReleaseState {
    const NAME: &'static str = "ReleaseState";
    const TAGS: &'static [&'static str] = &[
        "StartRelease",
        "EnterAuthnMethodRegistrationMode",
        "EnsureOrphanedRegistrationExited",
        "WaitingAuthnMethodRegistration",
        "ConfirmAuthnMethodRegistration",
        "CheckingAccessFromOwnerAuthnMethod",
        "DeleteHolderAuthnMethod",
        "DangerousToLoseIdentity",
        "IdentityAPIChanged",
        "ReleaseFailed",
    ];
}

#[derive(Deserialize)]
struct RegistrationModePayload {
    registration_id: String,
}

#[derive(Deserialize)]
struct ExpirationPayload {
    expiration: TimestampMillis,
}

impl ReleaseState {
    /// Decode the `sub_state` of the `Release` holder state.
    pub fn decode(value: Option<&Value>) -> Result<Self, DecodeError> {
        let v = match decode::level(Self::NAME, value, Self::TAGS)? {
            Level::Unrecognized(tag) => return Ok(Self::Unrecognized(tag.to_string())),
            Level::Known(v) => v,
        };
        Ok(match v.tag {
            "StartRelease" => Self::StartRelease,
            "EnterAuthnMethodRegistrationMode" => {
                let p: RegistrationModePayload = decode::payload(Self::NAME, &v)?;
                Self::EnterAuthnMethodRegistrationMode {
                    registration_id: p.registration_id,
                }
            }
            "EnsureOrphanedRegistrationExited" => Self::EnsureOrphanedRegistrationExited,
            "WaitingAuthnMethodRegistration" => {
                let p: ExpirationPayload = decode::payload(Self::NAME, &v)?;
                Self::WaitingAuthnMethodRegistration {
                    expiration: p.expiration,
                }
            }
            "ConfirmAuthnMethodRegistration" => {
                let p: ExpirationPayload = decode::payload(Self::NAME, &v)?;
                Self::ConfirmAuthnMethodRegistration {
                    expiration: p.expiration,
                }
            }
            "CheckingAccessFromOwnerAuthnMethod" => Self::CheckingAccessFromOwnerAuthnMethod,
            "DeleteHolderAuthnMethod" => Self::DeleteHolderAuthnMethod,
            "DangerousToLoseIdentity" => Self::DangerousToLoseIdentity,
            "IdentityAPIChanged" => Self::IdentityApiChanged,
            "ReleaseFailed" => Self::ReleaseFailed {
                error: ReleaseError::decode(decode::field(&v, "error"))?,
            },
            other => Self::Unrecognized(other.to_string()),
        })
    }

    /// Variant name for logs and display.
    pub fn name(&self) -> &str {
        match self {
            Self::StartRelease => "StartRelease",
            Self::EnterAuthnMethodRegistrationMode { .. } => "EnterAuthnMethodRegistrationMode",
            Self::EnsureOrphanedRegistrationExited => "EnsureOrphanedRegistrationExited",
            Self::WaitingAuthnMethodRegistration { .. } => "WaitingAuthnMethodRegistration",
            Self::ConfirmAuthnMethodRegistration { .. } => "ConfirmAuthnMethodRegistration",
            Self::CheckingAccessFromOwnerAuthnMethod => "CheckingAccessFromOwnerAuthnMethod",
            Self::DeleteHolderAuthnMethod => "DeleteHolderAuthnMethod",
            Self::DangerousToLoseIdentity => "DangerousToLoseIdentity",
            Self::IdentityApiChanged => "IdentityAPIChanged",
            Self::ReleaseFailed { .. } => "ReleaseFailed",
            Self::Unrecognized(tag) => tag,
        }
    }

    /// Progress step for display. The absorbing branches hide progress.
    pub fn step(&self) -> Option<ProgressStep> {
        match self {
            Self::StartRelease
            | Self::EnterAuthnMethodRegistrationMode { .. }
            | Self::EnsureOrphanedRegistrationExited => Some(ProgressStep::One),
            Self::WaitingAuthnMethodRegistration { .. }
            | Self::ConfirmAuthnMethodRegistration { .. } => Some(ProgressStep::Two),
            Self::CheckingAccessFromOwnerAuthnMethod | Self::DeleteHolderAuthnMethod => {
                Some(ProgressStep::Three)
            }
            Self::DangerousToLoseIdentity
            | Self::IdentityApiChanged
            | Self::ReleaseFailed { .. } => None,
            Self::Unrecognized(tag) => {
                ith_core::log_unexpected_variant(Self::NAME, tag);
                None
            }
        }
    }

    /// Deadline of the current registration window, if one is running.
    pub fn expiration(&self) -> Option<TimestampMillis> {
        match self {
            Self::WaitingAuthnMethodRegistration { expiration }
            | Self::ConfirmAuthnMethodRegistration { expiration } => Some(*expiration),
            _ => None,
        }
    }

    /// The explicit restart edge out of `ReleaseFailed`.
    pub fn restart(&self) -> Option<RestartAction> {
        match self {
            Self::ReleaseFailed { error } => Some(RestartAction::RestartRelease {
                requires_registration_id: error.requires_registration_id(),
            }),
            _ => None,
        }
    }
}

/// What started the release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseInitiation {
    /// The owner asked for the identity back.
    Manual {
        unsellable_reason: Option<UnsellableReason>,
    },
    /// The contract detected it could lose the identity and gave it back.
    DangerousToLoseIdentity,
    /// A sale deal was accepted; the identity goes to the buyer.
    Sold { buyer: Principal, price: u64 },
    Unrecognized(String),
}

impl TaggedUnion for ReleaseInitiation {
    const NAME: &'static str = "ReleaseInitiation";
    const TAGS: &'static [&'static str] = &["Manual", "DangerousToLoseIdentity", "Sold"];
}

#[derive(Deserialize)]
struct SoldPayload {
    buyer: Principal,
    price: u64,
}

impl ReleaseInitiation {
    /// Decode the `release_initiation` of the `Release` holder state.
    pub fn decode(value: Option<&Value>) -> Result<Self, DecodeError> {
        Ok(match decode::level(Self::NAME, value, Self::TAGS)? {
            Level::Unrecognized(tag) => Self::Unrecognized(tag.to_string()),
            Level::Known(v) => match v.tag {
                "Manual" => Self::Manual {
                    unsellable_reason: UnsellableReason::decode_optional(decode::field(
                        &v,
                        "unsellable_reason",
                    ))?,
                },
                "DangerousToLoseIdentity" => Self::DangerousToLoseIdentity,
                "Sold" => {
                    let p: SoldPayload = decode::payload(Self::NAME, &v)?;
                    Self::Sold {
                        buyer: p.buyer,
                        price: p.price,
                    }
                }
                other => Self::Unrecognized(other.to_string()),
            },
        })
    }
}

/// Outcome of a completed release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The identity went back to its owner.
    ReturnedToOwner,
    /// The identity went to the buyer.
    TransferredToBuyer { buyer: Principal, price: u64 },
}

/// Outcome of a release sitting in `DeleteHolderAuthnMethod`.
///
/// Returns `None` for any other sub-state. Reaching the terminal state
/// without a recognized initiation should not happen; it is logged and left
/// to the generic fallback.
pub fn release_outcome(
    sub_state: &ReleaseState,
    initiation: &ReleaseInitiation,
) -> Option<ReleaseOutcome> {
    if *sub_state != ReleaseState::DeleteHolderAuthnMethod {
        return None;
    }
    match initiation {
        ReleaseInitiation::Manual { .. } | ReleaseInitiation::DangerousToLoseIdentity => {
            Some(ReleaseOutcome::ReturnedToOwner)
        }
        ReleaseInitiation::Sold { buyer, price } => Some(ReleaseOutcome::TransferredToBuyer {
            buyer: buyer.clone(),
            price: *price,
        }),
        ReleaseInitiation::Unrecognized(tag) => {
            ith_core::log_unexpected_variant(ReleaseInitiation::NAME, tag);
            tracing::error!(
                sub_state = sub_state.name(),
                "illegal state: release completed without a recognized initiation"
            );
            None
        }
    }
}
