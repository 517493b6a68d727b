//! # ith-client — Holder Client Runtime
//!
//! Async coordination around the pure state machines of `ith-state`.
//!
//! ## Components
//!
//! - [`HolderSession`]: owns the [`SnapshotStore`], fetches the holder
//!   single-flight, and gates and invokes user actions.
//! - [`AutomaticProcessor`]: passes delegations to the contract and retries
//!   delegation preparation without user input.
//! - [`AutoRefresh`]: re-fetches on a schedule derived from the snapshot.
//!
//! Remote collaborators are injected as traits ([`HolderChannel`],
//! [`IdentityProvider`], [`PresignedQueryExecutor`], `ith_core::Clock`).
//!
//! ## Concurrency
//!
//! Shared state sits behind `parking_lot` locks that are never held across
//! an `.await`. Background loops are owned by [`TaskGuard`]s and stop when
//! the guard is dropped.

pub mod channel;
pub mod config;
pub mod error;
pub mod flight;
pub mod processor;
pub mod queue;
pub mod refresh;
pub mod session;
pub mod store;
pub mod task;

pub use channel::{HolderChannel, IdentityProvider, PresignedQueryExecutor, StaticIdentity};
pub use config::{ClientConfig, ConfigError};
pub use error::{
    ActionError, CallError, FetchError, HolderApiError, ProcessingIndicator, TransportError,
    UserMessage,
};
pub use flight::SingleFlight;
pub use processor::{detect, AutomaticAction, AutomaticProcessor, ProcessorState, TickOutcome};
pub use queue::OrderedQueue;
pub use refresh::{next_delay, AutoRefresh};
pub use session::HolderSession;
pub use store::{Snapshot, SnapshotStore};
pub use task::TaskGuard;
