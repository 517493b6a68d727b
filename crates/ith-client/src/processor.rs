//! # Automatic Processor
//!
//! Advances the holder without user input while it waits on the client
//! during asset fetching.
//!
//! ## Actions
//!
//! - `PassDelegateToBackend`: the contract sits in
//!   `Holding/FetchAssets/ObtainDelegationState/GetDelegationWaiting`. The
//!   processor runs the presigned read and hands the reply to
//!   `receive_delegation`.
//! - `RetryPrepareDelegation`: a previous attempt failed locally. After the
//!   cooldown the processor asks the contract to prepare a new request.
//!
//! ## State
//!
//! ```text
//! Idle ──detect──▶ InFlight ──settle──▶ Idle
//!                     │                  ▲
//!                     └──retry──▶ Pending┘
//! ```
//!
//! At most one action is in flight. Detections while in flight are
//! ignored; after settling the processor re-evaluates the latest snapshot.
//! Transport failures are retried indefinitely and surface only through
//! [`ProcessingIndicator::Retrying`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use ith_core::TimestampMillis;
use ith_state::{FetchAssetsState, GetDelegationRequest, HolderView, HoldingState};

use crate::channel::PresignedQueryExecutor;
use crate::error::{CallError, ProcessingIndicator};
use crate::session::HolderSession;
use crate::task::TaskGuard;

/// An action the processor performs on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomaticAction {
    PassDelegateToBackend,
    RetryPrepareDelegation,
}

impl std::fmt::Display for AutomaticAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PassDelegateToBackend => f.write_str("pass_delegate_to_backend"),
            Self::RetryPrepareDelegation => f.write_str("retry_prepare_delegation"),
        }
    }
}

/// Processor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Idle,
    /// Detected but waiting (cooldown or transient retry).
    Pending(AutomaticAction),
    InFlight(AutomaticAction),
}

/// Result of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to do.
    Idle,
    /// Another evaluation owns the in-flight action.
    AlreadyInFlight,
    /// The retry is held back until the cooldown elapses.
    CoolingDown { remaining: Duration },
    /// The action settled and a re-fetch was requested.
    Completed(AutomaticAction),
    /// The action stays pending and will be retried.
    Retrying(AutomaticAction),
    /// The session was torn down while the action ran.
    Discarded,
}

#[derive(Debug)]
struct ProcessorInner {
    state: ProcessorState,
    /// When the last local preparation error happened.
    last_error: Option<TimestampMillis>,
}

enum Planned {
    Pass(GetDelegationRequest),
    Retry,
}

/// Which automatic action the view calls for, given the local error marker.
pub fn detect(view: &HolderView, has_local_error: bool) -> Option<AutomaticAction> {
    let obtaining = matches!(
        view.holding()?,
        HoldingState::FetchAssets {
            fetch_assets_state: FetchAssetsState::ObtainDelegationState(_),
            ..
        }
    );
    if !obtaining {
        return None;
    }
    if has_local_error {
        return Some(AutomaticAction::RetryPrepareDelegation);
    }
    view.pending_delegation_request()
        .map(|_| AutomaticAction::PassDelegateToBackend)
}

/// Drives automatic actions for one session.
pub struct AutomaticProcessor {
    session: HolderSession,
    presigned: Arc<dyn PresignedQueryExecutor>,
    inner: Mutex<ProcessorInner>,
}

impl std::fmt::Debug for AutomaticProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomaticProcessor")
            .field("session", &self.session.id())
            .field("inner", &*self.inner.lock())
            .finish_non_exhaustive()
    }
}

impl AutomaticProcessor {
    pub fn new(session: HolderSession, presigned: Arc<dyn PresignedQueryExecutor>) -> Self {
        Self {
            session,
            presigned,
            inner: Mutex::new(ProcessorInner {
                state: ProcessorState::Idle,
                last_error: None,
            }),
        }
    }

    pub fn state(&self) -> ProcessorState {
        self.inner.lock().state
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.state(), ProcessorState::InFlight(_))
    }

    /// What the UI shows for automatic processing.
    pub fn indicator(&self) -> ProcessingIndicator {
        match self.state() {
            ProcessorState::Idle => ProcessingIndicator::Idle,
            ProcessorState::InFlight(_) => ProcessingIndicator::Processing,
            ProcessorState::Pending(_) => ProcessingIndicator::Retrying,
        }
    }

    /// Evaluate the latest snapshot and run the detected action, if any.
    pub async fn tick(&self) -> TickOutcome {
        let epoch = self.session.epoch();
        let (action, planned) = {
            let mut inner = self.inner.lock();
            if let ProcessorState::InFlight(action) = inner.state {
                tracing::debug!(session = %self.session.id(), %action, "automatic action in flight; ignoring detection");
                return TickOutcome::AlreadyInFlight;
            }
            let view = self.session.view();
            let Some(action) = detect(&view, inner.last_error.is_some()) else {
                inner.state = ProcessorState::Idle;
                inner.last_error = None;
                return TickOutcome::Idle;
            };
            let planned = match action {
                AutomaticAction::PassDelegateToBackend => {
                    match view.pending_delegation_request() {
                        Some(request) => Planned::Pass(request.clone()),
                        None => return TickOutcome::Idle,
                    }
                }
                AutomaticAction::RetryPrepareDelegation => {
                    let cooldown = self.session.config().prepare_delegation_cooldown;
                    let now = self.session.now();
                    let ready_at = inner
                        .last_error
                        .map_or(now, |at| at.saturating_add(cooldown));
                    if now < ready_at {
                        inner.state = ProcessorState::Pending(action);
                        return TickOutcome::CoolingDown {
                            remaining: ready_at.saturating_since(now),
                        };
                    }
                    Planned::Retry
                }
            };
            inner.state = ProcessorState::InFlight(action);
            (action, planned)
        };

        tracing::debug!(session = %self.session.id(), %action, "running automatic action");
        let outcome = match planned {
            Planned::Pass(request) => self.pass_delegate(request).await,
            Planned::Retry => self.retry_prepare().await,
        };
        let outcome = if self.session.epoch() != epoch {
            TickOutcome::Discarded
        } else {
            outcome
        };

        let mut inner = self.inner.lock();
        inner.state = match outcome {
            TickOutcome::Retrying(action) => ProcessorState::Pending(action),
            _ => ProcessorState::Idle,
        };
        outcome
    }

    async fn pass_delegate(&self, request: GetDelegationRequest) -> TickOutcome {
        let action = AutomaticAction::PassDelegateToBackend;
        let delegation = match self.presigned.execute(&request).await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(session = %self.session.id(), %error, "presigned delegation query failed");
                self.mark_error();
                return TickOutcome::Retrying(action);
            }
        };
        match self.session.channel().receive_delegation(delegation).await {
            Ok(()) => {
                self.refetch().await;
                TickOutcome::Completed(action)
            }
            Err(CallError::Api(error)) if error.is_transient_delegation() => {
                tracing::debug!(session = %self.session.id(), %error, "delegation not accepted yet");
                TickOutcome::Retrying(action)
            }
            Err(CallError::Api(error)) => {
                tracing::warn!(session = %self.session.id(), %error, "delegation rejected; forcing re-fetch");
                self.inner.lock().last_error = None;
                self.refetch().await;
                TickOutcome::Completed(action)
            }
            Err(CallError::Transport(error)) => {
                tracing::warn!(session = %self.session.id(), %error, "receive_delegation transport failure");
                self.mark_error();
                TickOutcome::Retrying(action)
            }
        }
    }

    async fn retry_prepare(&self) -> TickOutcome {
        let action = AutomaticAction::RetryPrepareDelegation;
        match self.session.channel().retry_prepare_delegation().await {
            Ok(()) => {
                self.inner.lock().last_error = None;
                self.refetch().await;
                TickOutcome::Completed(action)
            }
            Err(error) => {
                tracing::warn!(session = %self.session.id(), %error, "retry_prepare_delegation failed");
                self.mark_error();
                TickOutcome::Retrying(action)
            }
        }
    }

    fn mark_error(&self) {
        self.inner.lock().last_error = Some(self.session.now());
    }

    async fn refetch(&self) {
        if let Err(error) = self.session.fetch_holder().await {
            tracing::debug!(session = %self.session.id(), %error, "re-fetch after automatic action failed");
        }
    }

    /// Run the processor until the guard is dropped.
    pub fn spawn(self: Arc<Self>) -> TaskGuard {
        let mut updates = self.session.subscribe();
        let retry_delay = self.session.config().transient_retry_delay;
        TaskGuard::new(tokio::spawn(async move {
            loop {
                let wait = match self.tick().await {
                    TickOutcome::Retrying(_) => Some(retry_delay),
                    TickOutcome::CoolingDown { remaining } => Some(remaining),
                    TickOutcome::Idle
                    | TickOutcome::AlreadyInFlight
                    | TickOutcome::Completed(_)
                    | TickOutcome::Discarded => None,
                };
                let changed = match wait {
                    Some(delay) => tokio::select! {
                        _ = tokio::time::sleep(delay) => Ok(()),
                        changed = updates.changed() => changed,
                    },
                    None => updates.changed().await,
                };
                if changed.is_err() {
                    break;
                }
            }
        }))
    }
}
