//! # Holder Snapshot and Top-Level State
//!
//! `HolderInformation` is the envelope returned by `fetchHolderInformation`.
//! Its `state` field is kept as the raw union tree and decoded on demand
//! into [`HolderState`], so a snapshot carrying variants this client does
//! not understand can still be stored, versioned and displayed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ith_core::{Principal, TaggedUnion, TimestampMillis};

use crate::capture::CaptureState;
use crate::decode::{self, DecodeError, Level};
use crate::holding::{HoldingState, UnsellableReason};
use crate::release::{ReleaseInitiation, ReleaseState};

/// Remote holder snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderInformation {
    /// The contract owner, once activated.
    #[serde(default)]
    pub owner: Option<Principal>,
    /// Remote update counter.
    pub update_version: u64,
    /// Raw lifecycle state union.
    pub state: Value,
    /// Next instant at which the remote authority processes the holder.
    #[serde(default)]
    pub schedule_processing: Option<TimestampMillis>,
    /// Expiration of the contract certificate.
    #[serde(default)]
    pub certificate_expiration: Option<TimestampMillis>,
    /// The identity under contract.
    #[serde(default)]
    pub identity_number: Option<u64>,
    /// Additional contract controllers.
    #[serde(default)]
    pub controllers: Vec<Principal>,
}

impl HolderInformation {
    /// Decode a snapshot from an already decoded structured value.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        serde_json::from_value(value).map_err(|e| DecodeError::Snapshot(e.to_string()))
    }

    /// Decode the lifecycle state.
    pub fn decode_state(&self) -> Result<HolderState, DecodeError> {
        HolderState::decode(Some(&self.state))
    }
}

/// Progress step shown by the phase progress indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProgressStep {
    One = 1,
    Two = 2,
    Three = 3,
}

impl ProgressStep {
    /// Numeric step (1-based).
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Explicit edge out of a phase's absorbing error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RestartAction {
    /// Re-invoke `startCaptureIdentity` after `CaptureFailed`.
    RestartCapture,
    /// Re-invoke `restartReleaseIdentity` after `ReleaseFailed`.
    RestartRelease {
        /// A corrected registration id must accompany the restart.
        requires_registration_id: bool,
    },
    /// `Unsellable` can only move on by releasing the identity.
    StartRelease,
}

/// Coarse lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    WaitingActivation,
    WaitingStartCapture,
    Capture,
    Holding,
    Release,
    Closed,
    Unknown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::WaitingActivation => "waiting_activation",
            Self::WaitingStartCapture => "waiting_start_capture",
            Self::Capture => "capture",
            Self::Holding => "holding",
            Self::Release => "release",
            Self::Closed => "closed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Top-level holder state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HolderState {
    WaitingActivation,
    WaitingStartCapture,
    Capture {
        sub_state: CaptureState,
    },
    Holding {
        sub_state: HoldingState,
    },
    Release {
        sub_state: ReleaseState,
        release_initiation: ReleaseInitiation,
    },
    Closed {
        unsellable_reason: Option<UnsellableReason>,
    },
    Unrecognized(String),
}

impl TaggedUnion for HolderState {
    const NAME: &'static str = "HolderState";
    const TAGS: &'static [&'static str] = &[
        "WaitingActivation",
        "WaitingStartCapture",
        "Capture",
        "Holding",
        "Release",
        "Closed",
    ];
}

impl HolderState {
    /// Decode the top-level state union and every nested level below it.
    pub fn decode(value: Option<&Value>) -> Result<Self, DecodeError> {
        let v = match decode::level(Self::NAME, value, Self::TAGS)? {
            Level::Unrecognized(tag) => return Ok(Self::Unrecognized(tag.to_string())),
            Level::Known(v) => v,
        };
        Ok(match v.tag {
            "WaitingActivation" => Self::WaitingActivation,
            "WaitingStartCapture" => Self::WaitingStartCapture,
            "Capture" => Self::Capture {
                sub_state: CaptureState::decode(decode::field(&v, "sub_state"))?,
            },
            "Holding" => Self::Holding {
                sub_state: HoldingState::decode(decode::field(&v, "sub_state"))?,
            },
            "Release" => Self::Release {
                sub_state: ReleaseState::decode(decode::field(&v, "sub_state"))?,
                release_initiation: ReleaseInitiation::decode(decode::field(
                    &v,
                    "release_initiation",
                ))?,
            },
            "Closed" => Self::Closed {
                unsellable_reason: UnsellableReason::decode_optional(decode::field(
                    &v,
                    "unsellable_reason",
                ))?,
            },
            other => Self::Unrecognized(other.to_string()),
        })
    }

    /// Coarse phase.
    pub fn phase(&self) -> Phase {
        match self {
            Self::WaitingActivation => Phase::WaitingActivation,
            Self::WaitingStartCapture => Phase::WaitingStartCapture,
            Self::Capture { .. } => Phase::Capture,
            Self::Holding { .. } => Phase::Holding,
            Self::Release { .. } => Phase::Release,
            Self::Closed { .. } => Phase::Closed,
            Self::Unrecognized(_) => Phase::Unknown,
        }
    }

    /// Progress step of the active phase.
    pub fn step(&self) -> Option<ProgressStep> {
        match self {
            Self::Capture { sub_state } => sub_state.step(),
            Self::Holding { sub_state } => sub_state.step(),
            Self::Release { sub_state, .. } => sub_state.step(),
            Self::WaitingActivation | Self::WaitingStartCapture | Self::Closed { .. } => None,
            Self::Unrecognized(tag) => {
                ith_core::log_unexpected_variant(Self::NAME, tag);
                None
            }
        }
    }

    /// The explicit restart edge, if the active phase sits in its error state.
    pub fn restart(&self) -> Option<RestartAction> {
        match self {
            Self::Capture { sub_state } => sub_state.restart(),
            Self::Holding { sub_state } => sub_state.restart(),
            Self::Release { sub_state, .. } => sub_state.restart(),
            _ => None,
        }
    }

    /// Holding sub-state, if in the Holding phase.
    pub fn holding(&self) -> Option<&HoldingState> {
        match self {
            Self::Holding { sub_state } => Some(sub_state),
            _ => None,
        }
    }

    /// Capture sub-state, if in the Capture phase.
    pub fn capture(&self) -> Option<&CaptureState> {
        match self {
            Self::Capture { sub_state } => Some(sub_state),
            _ => None,
        }
    }

    /// Release sub-state, if in the Release phase.
    pub fn release(&self) -> Option<&ReleaseState> {
        match self {
            Self::Release { sub_state, .. } => Some(sub_state),
            _ => None,
        }
    }

    /// Human-readable path of the active variants, e.g.
    /// `Holding/FetchAssets`.
    pub fn describe(&self) -> String {
        match self {
            Self::WaitingActivation => "WaitingActivation".to_string(),
            Self::WaitingStartCapture => "WaitingStartCapture".to_string(),
            Self::Capture { sub_state } => format!("Capture/{}", sub_state.name()),
            Self::Holding { sub_state } => format!("Holding/{}", sub_state.name()),
            Self::Release { sub_state, .. } => format!("Release/{}", sub_state.name()),
            Self::Closed { .. } => "Closed".to_string(),
            Self::Unrecognized(tag) => tag.clone(),
        }
    }
}
