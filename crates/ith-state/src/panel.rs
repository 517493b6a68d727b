//! # Next-Step Selection
//!
//! Maps a [`HolderView`] to the [`Panel`] a front end renders. Every
//! lifecycle state has exactly one panel:
//!
//! - progress phases carry their [`ProgressStep`],
//! - terminal failures name the restart they offer,
//! - an unloaded view shows `Loading` and an illegal one `Fallback`.
//!
//! Variants this client does not recognize are logged and rendered as
//! `Fallback`.

use serde::Serialize;

use ith_core::TaggedUnion;

use crate::capture::CaptureState;
use crate::holder::{HolderState, ProgressStep, RestartAction};
use crate::holding::HoldingState;
use crate::release::{ReleaseOutcome, ReleaseState};
use crate::sale::SaleStatus;
use crate::view::HolderView;

/// Panel to render for the current holder view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "panel", rename_all = "snake_case")]
pub enum Panel {
    /// Nothing fetched yet.
    Loading,
    /// Illegal or unrecognized state.
    Fallback,
    WaitingActivation,
    WaitingStartCapture,
    CaptureProgress { step: Option<ProgressStep> },
    ConfirmHolderRegistration,
    DeleteProtectedAuthnMethod,
    CaptureFailed,
    PreparingAssets { step: Option<ProgressStep> },
    Hold { sale: SaleStatus },
    Unsellable,
    CancellingSaleDeal,
    ReleaseProgress { step: Option<ProgressStep> },
    ConfirmOwnerRegistration,
    ReleaseFailed { requires_registration_id: bool },
    DangerousToLoseIdentity,
    IdentityApiChanged,
    ReleaseComplete { outcome: ReleaseOutcomeKind },
    Closed,
}

/// Serializable form of [`ReleaseOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcomeKind {
    ReturnedToOwner,
    TransferredToBuyer,
}

/// The panel that matches `view`.
pub fn next_step(view: &HolderView) -> Panel {
    let state = match view {
        HolderView::Unloaded => return Panel::Loading,
        HolderView::Illegal { .. } => return Panel::Fallback,
        HolderView::Loaded(loaded) => &loaded.state,
    };
    match state {
        HolderState::WaitingActivation => Panel::WaitingActivation,
        HolderState::WaitingStartCapture => Panel::WaitingStartCapture,
        HolderState::Capture { sub_state } => match sub_state {
            CaptureState::NeedConfirmAuthnMethodSessionRegistration { .. } => {
                Panel::ConfirmHolderRegistration
            }
            CaptureState::NeedDeleteProtectedIdentityAuthnMethod { .. } => {
                Panel::DeleteProtectedAuthnMethod
            }
            CaptureState::CaptureFailed { .. } => Panel::CaptureFailed,
            CaptureState::Unrecognized(tag) => {
                ith_core::log_unexpected_variant(CaptureState::NAME, tag);
                Panel::Fallback
            }
            other => Panel::CaptureProgress { step: other.step() },
        },
        HolderState::Holding { sub_state } => match sub_state {
            HoldingState::Hold { .. } => Panel::Hold {
                sale: view.sale_status(),
            },
            HoldingState::Unsellable { .. } => Panel::Unsellable,
            HoldingState::CancelSaleDeal { .. } => Panel::CancellingSaleDeal,
            HoldingState::Unrecognized(tag) => {
                ith_core::log_unexpected_variant(HoldingState::NAME, tag);
                Panel::Fallback
            }
            other => Panel::PreparingAssets { step: other.step() },
        },
        HolderState::Release { sub_state, .. } => match sub_state {
            ReleaseState::ConfirmAuthnMethodRegistration { .. } => {
                Panel::ConfirmOwnerRegistration
            }
            ReleaseState::ReleaseFailed { .. } => match sub_state.restart() {
                Some(RestartAction::RestartRelease {
                    requires_registration_id,
                }) => Panel::ReleaseFailed {
                    requires_registration_id,
                },
                _ => Panel::ReleaseFailed {
                    requires_registration_id: false,
                },
            },
            ReleaseState::DangerousToLoseIdentity => Panel::DangerousToLoseIdentity,
            ReleaseState::IdentityApiChanged => Panel::IdentityApiChanged,
            ReleaseState::DeleteHolderAuthnMethod => match view.release_outcome() {
                Some(ReleaseOutcome::ReturnedToOwner) => Panel::ReleaseComplete {
                    outcome: ReleaseOutcomeKind::ReturnedToOwner,
                },
                Some(ReleaseOutcome::TransferredToBuyer { .. }) => Panel::ReleaseComplete {
                    outcome: ReleaseOutcomeKind::TransferredToBuyer,
                },
                None => Panel::Fallback,
            },
            ReleaseState::Unrecognized(tag) => {
                ith_core::log_unexpected_variant(ReleaseState::NAME, tag);
                Panel::Fallback
            }
            other => Panel::ReleaseProgress { step: other.step() },
        },
        HolderState::Closed { .. } => Panel::Closed,
        HolderState::Unrecognized(tag) => {
            ith_core::log_unexpected_variant(HolderState::NAME, tag);
            Panel::Fallback
        }
    }
}
