//! # ith-cli — Holder Client Command-Line Interface
//!
//! Offline tooling around the holder state machines.
//!
//! ## Subcommands
//!
//! - `inspect`: decode a holder snapshot and print phase, step, derived
//!   facts, allowed actions, the automatic action and the next refresh delay
//! - `registration-id`: extract the registration id from a pairing link
//! - `countdown`: render the clamped time left until a timestamp
//!
//! ## Crate Policy
//!
//! - Argument parsing lives next to each handler.
//! - Handlers delegate to the library crates. No state logic here.

pub mod countdown;
pub mod inspect;
pub mod registration;
