//! # Auto-Refresh Scheduler
//!
//! Decides when the session re-fetches the holder.
//!
//! - No refresh is scheduled while a fetch or an automatic action is in
//!   flight.
//! - A scheduled remote processing instant asks for a fetch shortly after
//!   it, once the remote side has settled.
//! - A guest or anonymous observer of another party's capture or asset
//!   preparation polls at a phase-specific interval.
//! - The shortest applicable signal wins. Without any signal the default
//!   interval applies.

use std::sync::Arc;
use std::time::Duration;

use ith_core::{remaining_bounded, TimestampMillis};
use ith_state::{CallerRole, HolderView, ObserverPhase};

use crate::config::ClientConfig;
use crate::processor::AutomaticProcessor;
use crate::session::HolderSession;
use crate::task::TaskGuard;

/// Delay until the next refresh, `None` while busy.
pub fn next_delay(
    view: &HolderView,
    role: CallerRole,
    now: TimestampMillis,
    busy: bool,
    config: &ClientConfig,
) -> Option<Duration> {
    if busy {
        return None;
    }
    let scheduled = view
        .schedule_processing()
        .map(|at| remaining_bounded(at, now, config.max_timer_delay) + config.settle_delay);
    let observing = match role {
        CallerRole::Owner => None,
        CallerRole::Guest | CallerRole::Anonymous => {
            view.observer_progress_phase().map(|phase| match phase {
                ObserverPhase::WaitingStartCapture => config.observe_waiting_start_capture,
                ObserverPhase::Capture => config.observe_capture,
                ObserverPhase::PreparingAssets => config.observe_preparing_assets,
            })
        }
    };
    let delay = match (scheduled, observing) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => config.refresh_interval,
    };
    Some(delay.min(config.max_timer_delay))
}

/// Background refresher of one session.
#[derive(Debug)]
pub struct AutoRefresh;

impl AutoRefresh {
    /// Keep the session fresh until the guard is dropped.
    ///
    /// A snapshot replacement restarts the countdown. While busy the loop
    /// re-evaluates on the next replacement or after the default interval.
    pub fn spawn(session: HolderSession, processor: Option<Arc<AutomaticProcessor>>) -> TaskGuard {
        let mut updates = session.subscribe();
        TaskGuard::new(tokio::spawn(async move {
            loop {
                let busy = session.is_fetching()
                    || processor.as_ref().is_some_and(|p| p.is_in_flight());
                let view = session.view();
                let role = view.role_of(session.caller().as_ref());
                let delay = next_delay(&view, role, session.now(), busy, session.config());

                let (wait, fetch) = match delay {
                    Some(delay) => (delay, true),
                    None => (session.config().refresh_interval, false),
                };
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        if fetch {
                            tracing::trace!(session = %session.id(), ?wait, "auto-refresh");
                            if let Err(error) = session.fetch_holder().await {
                                tracing::debug!(session = %session.id(), %error, "auto-refresh fetch failed");
                            }
                        }
                    }
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ith_state::HolderInformation;
    use serde_json::{json, Value};

    fn view(state: Value, scheduled: Option<u64>) -> HolderView {
        let info = HolderInformation::from_value(json!({
            "owner": "aaaaa-aa",
            "update_version": 1,
            "state": state,
            "schedule_processing": scheduled
        }))
        .unwrap();
        HolderView::from_snapshot(Some(Arc::new(info)))
    }

    const NOW: TimestampMillis = TimestampMillis(100_000);

    #[test]
    fn busy_suspends_refresh() {
        let v = view(json!({"WaitingActivation": null}), None);
        let cfg = ClientConfig::default();
        assert_eq!(next_delay(&v, CallerRole::Owner, NOW, true, &cfg), None);
    }

    #[test]
    fn default_interval_without_signals() {
        let v = view(json!({"Holding": {"sub_state": {"Hold": {}}}}), None);
        let cfg = ClientConfig::default();
        assert_eq!(
            next_delay(&v, CallerRole::Guest, NOW, false, &cfg),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            next_delay(&HolderView::Unloaded, CallerRole::Anonymous, NOW, false, &cfg),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn scheduled_processing_adds_settle_delay() {
        let cfg = ClientConfig::default();
        let soon = view(json!({"WaitingActivation": null}), Some(NOW.0 + 10_000));
        assert_eq!(
            next_delay(&soon, CallerRole::Owner, NOW, false, &cfg),
            Some(Duration::from_secs(13))
        );
        let past = view(json!({"WaitingActivation": null}), Some(NOW.0 - 10_000));
        assert_eq!(
            next_delay(&past, CallerRole::Owner, NOW, false, &cfg),
            Some(Duration::from_secs(3))
        );
        let far = view(json!({"WaitingActivation": null}), Some(u64::MAX));
        assert_eq!(
            next_delay(&far, CallerRole::Owner, NOW, false, &cfg),
            Some(cfg.max_timer_delay)
        );
    }

    #[test]
    fn observers_poll_by_phase() {
        let cfg = ClientConfig::default();
        let waiting = view(json!({"WaitingStartCapture": null}), None);
        assert_eq!(
            next_delay(&waiting, CallerRole::Guest, NOW, false, &cfg),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            next_delay(&waiting, CallerRole::Owner, NOW, false, &cfg),
            Some(Duration::from_secs(5))
        );
        let capture = view(json!({"Capture": {"sub_state": {"StartCapture": null}}}), None);
        assert_eq!(
            next_delay(&capture, CallerRole::Anonymous, NOW, false, &cfg),
            Some(Duration::from_secs(3))
        );
        let preparing = view(json!({"Holding": {"sub_state": {"StartHolding": null}}}), None);
        assert_eq!(
            next_delay(&preparing, CallerRole::Guest, NOW, false, &cfg),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn shortest_signal_wins() {
        let cfg = ClientConfig::default();
        let v = view(
            json!({"WaitingStartCapture": null}),
            Some(NOW.0 + 1_000),
        );
        assert_eq!(
            next_delay(&v, CallerRole::Guest, NOW, false, &cfg),
            Some(Duration::from_secs(4))
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn delay_is_bounded(scheduled in any::<u64>(), now in any::<u64>()) {
                let cfg = ClientConfig::default();
                let v = view(json!({"WaitingActivation": null}), Some(scheduled));
                let delay = next_delay(&v, CallerRole::Owner, TimestampMillis(now), false, &cfg);
                let delay = delay.unwrap_or_default();
                prop_assert!(delay <= cfg.max_timer_delay);
                prop_assert!(delay >= cfg.settle_delay);
            }
        }
    }
}
