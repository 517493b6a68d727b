//! # Client Error Taxonomy
//!
//! Remote calls settle in one of three ways: success, a structured error
//! returned by the holder contract ([`HolderApiError`]), or a failure of the
//! call itself ([`TransportError`]). The last two form [`CallError`].
//!
//! Structured errors are classified per action:
//!
//! - **stale view**: the client acted on an outdated snapshot. The session
//!   re-fetches and reports [`ActionError::StaleView`].
//! - **transient delegation**: the automatic processor stays pending on the
//!   same action.
//! - **user-facing**: surfaced as a [`UserMessage`].
//!
//! Transport errors are retryable and never fatal.

use serde::Serialize;
use thiserror::Error;

use ith_state::{DecodeError, Denial, HolderAction};

/// Failure of a remote call before a structured response was obtained.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be delivered or the reply was lost.
    #[error("network failure: {0}")]
    Network(String),
    /// The call did not settle in time.
    #[error("call timed out")]
    Timeout,
    /// The identity provider has no usable session.
    #[error("caller is not authenticated")]
    Unauthenticated,
    /// The reply could not be decoded.
    #[error("malformed reply: {0}")]
    Malformed(String),
}

/// Structured error returned by the holder contract.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HolderApiError {
    #[error("holder is in the wrong state for this call")]
    HolderWrongState,
    #[error("holder is locked by another operation")]
    HolderLocked,
    #[error("caller is not authorized")]
    Unauthorized,
    #[error("offer does not match the current deal")]
    OfferMismatch,
    #[error("price does not match the listed price")]
    PriceMismatch,
    #[error("offer was removed")]
    OfferRemoved,
    #[error("certificate expires too soon to trade")]
    CertificateExpirationImminent,
    #[error("quarantine window is still active")]
    QuarantineActive,
    #[error("delegation not yet available")]
    DelegationNotYetAvailable,
    #[error("delegation does not match the pending request")]
    DelegationMismatch,
    #[error("registration id rejected: {reason}")]
    InvalidRegistrationId { reason: String },
    #[error("internal contract error: {reason}")]
    InternalError { reason: String },
    /// An error variant this client does not know, by tag.
    #[error("unrecognized contract error {0}")]
    Unrecognized(String),
}

impl HolderApiError {
    /// The client acted on an outdated snapshot; re-fetching resolves it.
    pub fn is_stale_view(&self) -> bool {
        matches!(
            self,
            Self::HolderWrongState | Self::HolderLocked | Self::Unauthorized
        )
    }

    /// The delegation is not usable yet; the same action is retried.
    pub fn is_transient_delegation(&self) -> bool {
        matches!(self, Self::DelegationNotYetAvailable | Self::DelegationMismatch)
    }
}

/// Failure of a remote call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("contract error: {0}")]
    Api(#[from] HolderApiError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Failure of `fetch_holder`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Call(#[from] CallError),
    #[error("fetched snapshot is malformed: {0}")]
    Decode(#[from] DecodeError),
    /// The session was torn down while the fetch was in flight.
    #[error("fetch discarded after session teardown")]
    Cancelled,
}

/// Failure of a user-invoked action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("{action} is not permitted: {denial}")]
    NotPermitted { action: HolderAction, denial: Denial },
    #[error("{action} acted on an outdated holder state: {error}")]
    StaleView {
        action: HolderAction,
        error: HolderApiError,
    },
    #[error("{action} was rejected: {error}")]
    Rejected {
        action: HolderAction,
        error: HolderApiError,
    },
    #[error("{action} could not reach the contract: {error}")]
    Transport {
        action: HolderAction,
        error: TransportError,
    },
    #[error("invalid input for {action}: {reason}")]
    InvalidInput {
        action: HolderAction,
        reason: String,
    },
    #[error("{action} discarded after session teardown")]
    Cancelled { action: HolderAction },
}

impl ActionError {
    pub(crate) fn from_call(action: HolderAction, error: CallError) -> Self {
        match error {
            CallError::Api(error) if error.is_stale_view() => Self::StaleView { action, error },
            CallError::Api(error) => Self::Rejected { action, error },
            CallError::Transport(error) => Self::Transport { action, error },
        }
    }

    /// The action this error belongs to.
    pub fn action(&self) -> HolderAction {
        match self {
            Self::NotPermitted { action, .. }
            | Self::StaleView { action, .. }
            | Self::Rejected { action, .. }
            | Self::Transport { action, .. }
            | Self::InvalidInput { action, .. }
            | Self::Cancelled { action } => *action,
        }
    }

    /// Message shown to the user. The raw error is attached only when
    /// `debug` is set.
    pub fn user_message(&self, debug: bool) -> UserMessage {
        let text = match self {
            Self::NotPermitted { .. } => "This action is not available right now.",
            Self::StaleView { .. } => "The contract state changed. Please review and try again.",
            Self::Rejected { error, .. } => match error {
                HolderApiError::OfferMismatch | HolderApiError::OfferRemoved => {
                    "The offer is no longer valid."
                }
                HolderApiError::PriceMismatch => "The price has changed.",
                HolderApiError::CertificateExpirationImminent => {
                    "The contract certificate expires too soon to trade."
                }
                HolderApiError::QuarantineActive => "Trading opens after the quarantine period.",
                HolderApiError::InvalidRegistrationId { .. } => "The registration code is invalid.",
                _ => "The contract rejected the request.",
            },
            Self::Transport { .. } => "Could not reach the contract. Please try again.",
            Self::InvalidInput { .. } => "Please check the entered values.",
            Self::Cancelled { .. } => "The request was cancelled.",
        };
        UserMessage {
            text: text.to_string(),
            debug: debug.then(|| self.to_string()),
        }
    }
}

/// User-visible rendering of an [`ActionError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserMessage {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,
}

/// What the UI shows for automatic processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingIndicator {
    Idle,
    Processing,
    Retrying,
}
