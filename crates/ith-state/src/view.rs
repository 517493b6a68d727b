//! # Holder View
//!
//! A decoded, read-only view of the latest snapshot plus the temporal facts
//! derived from it (certificate status, quarantine). Views are cheap to
//! build and are rebuilt from the stored snapshot on every evaluation.
//!
//! Three shapes exist: not yet fetched, decoded, and illegal. An illegal view
//! keeps the raw snapshot so the fallback panel can still show its version,
//! but every permission evaluates to `false` on it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ith_core::{Principal, TimestampMillis};

use crate::capture::CaptureState;
use crate::decode::DecodeError;
use crate::holder::{HolderInformation, HolderState, Phase, ProgressStep, RestartAction};
use crate::holding::{GetDelegationRequest, HoldingState};
use crate::release::{release_outcome, ReleaseOutcome, ReleaseState};
use crate::sale::{SaleDealState, SaleStatus};

/// Who is looking at the holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    /// The contract owner.
    Owner,
    /// An authenticated principal that is not the owner.
    Guest,
    /// Not authenticated.
    Anonymous,
}

impl CallerRole {
    /// Resolve the role of `caller` against the snapshot owner.
    pub fn resolve(caller: Option<&Principal>, owner: Option<&Principal>) -> Self {
        match caller {
            None => Self::Anonymous,
            Some(c) if c.is_anonymous() => Self::Anonymous,
            Some(c) if Some(c) == owner => Self::Owner,
            Some(_) => Self::Guest,
        }
    }
}

impl std::fmt::Display for CallerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Owner => "owner",
            Self::Guest => "guest",
            Self::Anonymous => "anonymous",
        };
        f.write_str(s)
    }
}

/// Sellability of the contract certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Valid,
    Expired,
    Unsellable,
}

impl CertificateStatus {
    /// Whether sale actions may be offered.
    pub fn is_sellable(self) -> bool {
        self == Self::Valid
    }
}

/// A decoded snapshot.
#[derive(Debug, Clone)]
pub struct LoadedHolder {
    /// The raw snapshot.
    pub info: Arc<HolderInformation>,
    /// The decoded lifecycle state.
    pub state: HolderState,
}

/// Read-only view of the holder.
#[derive(Debug, Clone)]
pub enum HolderView {
    /// Nothing fetched yet.
    Unloaded,
    /// A well-formed snapshot.
    Loaded(LoadedHolder),
    /// The snapshot violates the union invariants.
    Illegal {
        info: Arc<HolderInformation>,
        error: DecodeError,
    },
}

impl HolderView {
    /// Build a view from the stored snapshot.
    pub fn from_snapshot(snapshot: Option<Arc<HolderInformation>>) -> Self {
        let Some(info) = snapshot else {
            return Self::Unloaded;
        };
        match info.decode_state() {
            Ok(state) => Self::Loaded(LoadedHolder { info, state }),
            Err(error) => {
                tracing::error!(
                    update_version = info.update_version,
                    %error,
                    "illegal holder state; rendering fallback"
                );
                Self::Illegal { info, error }
            }
        }
    }

    /// Whether a well-formed snapshot is available.
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// The decoded state.
    pub fn state(&self) -> Option<&HolderState> {
        match self {
            Self::Loaded(l) => Some(&l.state),
            _ => None,
        }
    }

    /// The raw snapshot, legal or not.
    pub fn info(&self) -> Option<&Arc<HolderInformation>> {
        match self {
            Self::Loaded(l) => Some(&l.info),
            Self::Illegal { info, .. } => Some(info),
            Self::Unloaded => None,
        }
    }

    /// The contract owner.
    pub fn owner(&self) -> Option<&Principal> {
        self.info().and_then(|i| i.owner.as_ref())
    }

    /// Role of `caller` for this holder.
    pub fn role_of(&self, caller: Option<&Principal>) -> CallerRole {
        CallerRole::resolve(caller, self.owner())
    }

    /// Coarse phase (`Unknown` unless loaded).
    pub fn phase(&self) -> Phase {
        self.state().map_or(Phase::Unknown, HolderState::phase)
    }

    /// Progress step of the active phase.
    pub fn step(&self) -> Option<ProgressStep> {
        self.state().and_then(HolderState::step)
    }

    /// Restart edge of the active phase.
    pub fn restart(&self) -> Option<RestartAction> {
        self.state().and_then(HolderState::restart)
    }

    /// Capture sub-state.
    pub fn capture(&self) -> Option<&CaptureState> {
        self.state().and_then(HolderState::capture)
    }

    /// Holding sub-state.
    pub fn holding(&self) -> Option<&HoldingState> {
        self.state().and_then(HolderState::holding)
    }

    /// Release sub-state.
    pub fn release(&self) -> Option<&ReleaseState> {
        self.state().and_then(HolderState::release)
    }

    /// Sale deal of a directly active `Hold`.
    pub fn sale_deal(&self) -> Option<&SaleDealState> {
        self.holding().and_then(HoldingState::active_sale_deal)
    }

    /// Coarse sale status.
    pub fn sale_status(&self) -> SaleStatus {
        SaleStatus::of(self.sale_deal())
    }

    /// Presigned delegation read awaited by the contract.
    pub fn pending_delegation_request(&self) -> Option<&GetDelegationRequest> {
        self.holding()
            .and_then(HoldingState::pending_delegation_request)
    }

    /// Scheduled remote processing instant.
    pub fn schedule_processing(&self) -> Option<TimestampMillis> {
        self.info().and_then(|i| i.schedule_processing)
    }

    /// Certificate status at `now`.
    pub fn certificate_status(&self, now: TimestampMillis) -> CertificateStatus {
        let unsellable = match self.state() {
            Some(HolderState::Holding {
                sub_state: HoldingState::Unsellable { .. },
            })
            | Some(HolderState::Closed { .. }) => true,
            _ => false,
        };
        if unsellable {
            return CertificateStatus::Unsellable;
        }
        match self.info().and_then(|i| i.certificate_expiration) {
            Some(expiration) if now >= expiration => CertificateStatus::Expired,
            _ => CertificateStatus::Valid,
        }
    }

    /// Whether the quarantine window is still open at `now`.
    pub fn quarantine_active(&self, now: TimestampMillis) -> bool {
        self.holding()
            .and_then(HoldingState::quarantine)
            .is_some_and(|end| now < end)
    }

    /// Outcome of a completed release.
    pub fn release_outcome(&self) -> Option<ReleaseOutcome> {
        match self.state() {
            Some(HolderState::Release {
                sub_state,
                release_initiation,
            }) => release_outcome(sub_state, release_initiation),
            _ => None,
        }
    }

    /// Whether a guest or anonymous observer watches another party's
    /// in-progress capture or asset preparation.
    pub fn observer_progress_phase(&self) -> Option<ObserverPhase> {
        match self.state()? {
            HolderState::WaitingStartCapture => Some(ObserverPhase::WaitingStartCapture),
            HolderState::Capture { .. } => Some(ObserverPhase::Capture),
            HolderState::Holding { sub_state } if sub_state.is_preparing() => {
                Some(ObserverPhase::PreparingAssets)
            }
            _ => None,
        }
    }
}

/// In-progress phases a passive observer polls faster (or slower) for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverPhase {
    /// Waiting on the owner to begin.
    WaitingStartCapture,
    /// Capture running.
    Capture,
    /// Assets being fetched, checked or validated.
    PreparingAssets,
}
