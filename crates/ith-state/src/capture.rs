//! # Capture Phase
//!
//! The identity is brought under contract custody: the contract creates its
//! own key, registers itself as an authn method of the identity, then strips
//! every other authn method.
//!
//! ```text
//! StartCapture → CreateEcdsaKey → RegisterAuthnMethodSession
//!   → NeedConfirmAuthnMethodSessionRegistration → ExitAndRegisterHolderAuthnMethod
//!   → GetHolderContractPrincipal → ObtainingIdentityAuthnMethods
//!   → DeletingIdentityAuthnMethods → [NeedDeleteProtectedIdentityAuthnMethod]
//!   → FinishCapture
//!
//! any step ──▶ CaptureFailed (absorbing; explicit restart only)
//! ```

use serde::Deserialize;
use serde_json::Value;

use ith_core::{TaggedUnion, TimestampMillis};

use crate::decode::{self, DecodeError, Level};
use crate::holder::{ProgressStep, RestartAction};

/// Capture sub-state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    StartCapture,
    CreateEcdsaKey,
    RegisterAuthnMethodSession,
    /// The owner must confirm the session registration on their device.
    NeedConfirmAuthnMethodSessionRegistration {
        /// Code the owner types into the identity provider.
        confirmation_code: String,
        /// When the registration session closes.
        expiration: TimestampMillis,
    },
    ExitAndRegisterHolderAuthnMethod,
    GetHolderContractPrincipal,
    ObtainingIdentityAuthnMethods,
    DeletingIdentityAuthnMethods,
    /// A protected authn method cannot be removed by the contract; the owner
    /// must delete it manually and report back.
    NeedDeleteProtectedIdentityAuthnMethod {
        /// Public key of the protected method, as reported remotely.
        public_key: String,
    },
    FinishCapture,
    /// Absorbing error state of this attempt.
    CaptureFailed {
        /// Why the attempt failed.
        error: CaptureError,
    },
    /// A variant this client does not know.
    Unrecognized(String),
}

impl TaggedUnion for CaptureState {
    const NAME: &'static str = "CaptureState";
    const TAGS: &'static [&'static str] = &[
        "StartCapture",
        "CreateEcdsaKey",
        "RegisterAuthnMethodSession",
        "NeedConfirmAuthnMethodSessionRegistration",
        "ExitAndRegisterHolderAuthnMethod",
        "GetHolderContractPrincipal",
        "ObtainingIdentityAuthnMethods",
        "DeletingIdentityAuthnMethods",
        "NeedDeleteProtectedIdentityAuthnMethod",
        "FinishCapture",
        "CaptureFailed",
    ];
}

/// Reason a capture attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The session registration window closed before confirmation.
    SessionRegistrationModeExpired,
    /// The identity was not in registration mode when the contract tried
    /// to register.
    SessionRegistrationModeOff,
    /// The session registration was already confirmed by someone else.
    SessionRegistrationAlreadyConfirmed,
    /// The identity provider changed its interface.
    IdentityApiChanged,
    /// A variant this client does not know.
    Unrecognized(String),
}

impl TaggedUnion for CaptureError {
    const NAME: &'static str = "CaptureError";
    const TAGS: &'static [&'static str] = &[
        "SessionRegistrationModeExpired",
        "SessionRegistrationModeOff",
        "SessionRegistrationAlreadyConfirmed",
        "IdentityAPIChanged",
    ];
}

impl CaptureError {
    fn decode(value: Option<&Value>) -> Result<Self, DecodeError> {
        Ok(match decode::level(Self::NAME, value, Self::TAGS)? {
            Level::Unrecognized(tag) => Self::Unrecognized(tag.to_string()),
            Level::Known(v) => match v.tag {
                "SessionRegistrationModeExpired" => Self::SessionRegistrationModeExpired,
                "SessionRegistrationModeOff" => Self::SessionRegistrationModeOff,
                "SessionRegistrationAlreadyConfirmed" => Self::SessionRegistrationAlreadyConfirmed,
                "IdentityAPIChanged" => Self::IdentityApiChanged,
                other => Self::Unrecognized(other.to_string()),
            },
        })
    }
}

#[derive(Deserialize)]
struct NeedConfirmPayload {
    confirmation_code: String,
    expiration: TimestampMillis,
}

#[derive(Deserialize)]
struct NeedDeleteProtectedPayload {
    public_key: String,
}

impl CaptureState {
    /// Decode the `sub_state` of the `Capture` holder state.
    pub fn decode(value: Option<&Value>) -> Result<Self, DecodeError> {
        let v = match decode::level(Self::NAME, value, Self::TAGS)? {
            Level::Unrecognized(tag) => return Ok(Self::Unrecognized(tag.to_string())),
            Level::Known(v) => v,
        };
        Ok(match v.tag {
            "StartCapture" => Self::StartCapture,
            "CreateEcdsaKey" => Self::CreateEcdsaKey,
            "RegisterAuthnMethodSession" => Self::RegisterAuthnMethodSession,
            "NeedConfirmAuthnMethodSessionRegistration" => {
                let p: NeedConfirmPayload = decode::payload(Self::NAME, &v)?;
                Self::NeedConfirmAuthnMethodSessionRegistration {
                    confirmation_code: p.confirmation_code,
                    expiration: p.expiration,
                }
            }
            "ExitAndRegisterHolderAuthnMethod" => Self::ExitAndRegisterHolderAuthnMethod,
            "GetHolderContractPrincipal" => Self::GetHolderContractPrincipal,
            "ObtainingIdentityAuthnMethods" => Self::ObtainingIdentityAuthnMethods,
            "DeletingIdentityAuthnMethods" => Self::DeletingIdentityAuthnMethods,
            "NeedDeleteProtectedIdentityAuthnMethod" => {
                let p: NeedDeleteProtectedPayload = decode::payload(Self::NAME, &v)?;
                Self::NeedDeleteProtectedIdentityAuthnMethod {
                    public_key: p.public_key,
                }
            }
            "FinishCapture" => Self::FinishCapture,
            "CaptureFailed" => Self::CaptureFailed {
                error: CaptureError::decode(decode::field(&v, "error"))?,
            },
            other => Self::Unrecognized(other.to_string()),
        })
    }

    /// Variant name for logs and display.
    pub fn name(&self) -> &str {
        match self {
            Self::StartCapture => "StartCapture",
            Self::CreateEcdsaKey => "CreateEcdsaKey",
            Self::RegisterAuthnMethodSession => "RegisterAuthnMethodSession",
            Self::NeedConfirmAuthnMethodSessionRegistration { .. } => {
                "NeedConfirmAuthnMethodSessionRegistration"
            }
            Self::ExitAndRegisterHolderAuthnMethod => "ExitAndRegisterHolderAuthnMethod",
            Self::GetHolderContractPrincipal => "GetHolderContractPrincipal",
            Self::ObtainingIdentityAuthnMethods => "ObtainingIdentityAuthnMethods",
            Self::DeletingIdentityAuthnMethods => "DeletingIdentityAuthnMethods",
            Self::NeedDeleteProtectedIdentityAuthnMethod { .. } => {
                "NeedDeleteProtectedIdentityAuthnMethod"
            }
            Self::FinishCapture => "FinishCapture",
            Self::CaptureFailed { .. } => "CaptureFailed",
            Self::Unrecognized(tag) => tag,
        }
    }

    /// Progress step for display. `None` hides the progress indicator.
    pub fn step(&self) -> Option<ProgressStep> {
        match self {
            Self::StartCapture | Self::CreateEcdsaKey | Self::RegisterAuthnMethodSession => {
                Some(ProgressStep::One)
            }
            Self::NeedConfirmAuthnMethodSessionRegistration { .. }
            | Self::ExitAndRegisterHolderAuthnMethod => Some(ProgressStep::Two),
            Self::GetHolderContractPrincipal
            | Self::ObtainingIdentityAuthnMethods
            | Self::DeletingIdentityAuthnMethods
            | Self::NeedDeleteProtectedIdentityAuthnMethod { .. }
            | Self::FinishCapture => Some(ProgressStep::Three),
            Self::CaptureFailed { .. } => None,
            Self::Unrecognized(tag) => {
                ith_core::log_unexpected_variant(Self::NAME, tag);
                None
            }
        }
    }

    /// Whether this is the absorbing error state.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::CaptureFailed { .. })
    }

    /// The explicit restart edge out of the error state.
    pub fn restart(&self) -> Option<RestartAction> {
        self.is_failed().then_some(RestartAction::RestartCapture)
    }
}
