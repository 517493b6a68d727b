//! # ith-core — Foundational Types for the Holder Client
//!
//! Leaf crate of the workspace. Everything here is pure and synchronous:
//! no runtime, no remote calls, no shared state.
//!
//! ## Contents
//!
//! 1. **Union navigation** (`union.rs`). The remote holder state arrives as a
//!    tree of single-entry tagged unions. [`active_variant`] extracts the one
//!    populated variant of a union level; callers recurse on the payload.
//!
//! 2. **Clamped timer arithmetic** (`temporal.rs`). Every countdown and delay
//!    is computed as `target - now` clamped to `[0, MAX_TIMER_DELAY]`, so a
//!    skewed client clock or a corrupt remote timestamp cannot produce a
//!    negative or absurd delay.
//!
//! 3. **Domain newtypes** (`identity.rs`, `registration.rs`). `Principal` and
//!    `RegistrationId` have validated constructors. No bare strings for
//!    identifiers.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `ith-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod registration;
pub mod temporal;
pub mod union;

// Re-export primary types for ergonomic imports.
pub use error::CoreError;
pub use identity::Principal;
pub use registration::{extract_registration_id, RegistrationId};
pub use temporal::{
    millis_to_time, remaining, remaining_bounded, Clock, ManualClock, RemainingTime, SystemClock,
    TimestampMillis, MAX_TIMER_DELAY,
};
pub use union::{
    active_variant, classify, log_unexpected_variant, navigate, TaggedUnion, UnionShape, Variant,
    UNEXPECTED_VARIANT_TARGET,
};
