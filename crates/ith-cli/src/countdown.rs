//! # Countdown Subcommand
//!
//! Renders `target - now` clamped to the timer bounds as `mm:ss`.

use clap::Args;

use ith_core::{millis_to_time, remaining, Clock, SystemClock, TimestampMillis};

/// Arguments for the countdown subcommand.
#[derive(Args, Debug)]
pub struct CountdownArgs {
    /// Target instant in Unix milliseconds.
    #[arg(long)]
    pub target: u64,

    /// Current instant in Unix milliseconds. Defaults to the system clock.
    #[arg(long)]
    pub now: Option<u64>,
}

/// Countdown text for `target` as seen at `now`.
pub fn render(target: TimestampMillis, now: TimestampMillis) -> String {
    let left = remaining(target, now);
    let millis = u64::try_from(left.as_millis()).unwrap_or(u64::MAX);
    millis_to_time(millis).to_string()
}

pub fn run(args: &CountdownArgs) -> anyhow::Result<()> {
    let now = args
        .now
        .map_or_else(|| SystemClock.now(), TimestampMillis::from_millis);
    println!("{}", render(TimestampMillis::from_millis(args.target), now));
    Ok(())
}
