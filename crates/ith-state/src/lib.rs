//! # ith-state — Holder Lifecycle State Machines
//!
//! Decodes the remote holder snapshot into typed phase and sub-phase values
//! and derives everything the client needs from them: progress steps,
//! restart edges, certificate and quarantine facts, the panel to render,
//! and the permission table.
//!
//! ## Phases
//!
//! ```text
//! WaitingActivation → WaitingStartCapture → Capture → Holding → Release → Closed
//! ```
//!
//! Each phase has its own sub-state union (`capture.rs`, `holding.rs`,
//! `release.rs`), with the sale deal layered inside `Hold` (`sale.rs`).
//! Every typed union carries an `Unrecognized` arm so that a variant added
//! remotely before this client was updated degrades to a logged fallback
//! instead of a decode failure.
//!
//! ## Crate Policy
//!
//! - The client never mutates holder state locally. It requests a
//!   transition and re-fetches.
//! - Everything here is synchronous and side-effect free apart from
//!   diagnostics.

pub mod capture;
pub mod decode;
pub mod holder;
pub mod holding;
pub mod panel;
pub mod permission;
pub mod release;
pub mod sale;
pub mod view;

pub use capture::{CaptureError, CaptureState};
pub use decode::DecodeError;
pub use holder::{HolderInformation, HolderState, Phase, ProgressStep, RestartAction};
pub use holding::{
    CheckAssetsState, FetchAssetsState, FetchNnsAssetsState, GetDelegationRequest, HoldingState,
    ObtainDelegationState, UnsellableReason,
};
pub use panel::{next_step, Panel, ReleaseOutcomeKind};
pub use permission::{ActionFlags, Denial, HolderAction, Permissions};
pub use release::{release_outcome, ReleaseError, ReleaseInitiation, ReleaseOutcome, ReleaseState};
pub use sale::{BuyerOffer, SaleDealState, SaleOffer, SaleStatus};
pub use view::{CallerRole, CertificateStatus, HolderView, LoadedHolder, ObserverPhase};
