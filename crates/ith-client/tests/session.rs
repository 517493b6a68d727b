mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Notify;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

use common::{clock, principal, session, snapshot, CountingLayer, FakeChannel, GUEST, OWNER};
use ith_client::{ActionError, CallError, FetchError, HolderApiError, TransportError};
use ith_core::RegistrationId;
use ith_state::{Denial, HolderAction, Phase};

fn listed() -> serde_json::Value {
    json!({"Holding": {"sub_state": {"Hold": {
        "quarantine": null,
        "sale_deal_state": {"Trading": {
            "sale_offer": {"price": 1000},
            "buyer_offers": [{"buyer": GUEST, "price": 900, "time": 1}]
        }}
    }}}})
}

#[tokio::test]
async fn guest_is_stopped_before_any_remote_call() {
    let layer = CountingLayer::new(Level::INFO, Some("not owner"));
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(layer.clone()));

    let channel = FakeChannel::with_state(json!({"WaitingStartCapture": null}));
    let s = session(channel.clone(), GUEST, clock());
    s.fetch_holder().await.unwrap();

    let err = s.start_capture().await.unwrap_err();
    assert_eq!(
        err,
        ActionError::NotPermitted {
            action: HolderAction::StartCapture,
            denial: Denial::NotOwner
        }
    );
    assert!(s.start_release().await.is_err());
    assert!(channel.calls().is_empty());
    assert_eq!(layer.count(), 2);
}

#[tokio::test]
async fn unloaded_session_permits_nothing() {
    let channel = FakeChannel::with_state(json!({"WaitingStartCapture": null}));
    let s = session(channel.clone(), OWNER, clock());
    let err = s.start_capture().await.unwrap_err();
    assert!(matches!(
        err,
        ActionError::NotPermitted {
            denial: Denial::NotLoaded,
            ..
        }
    ));
    assert_eq!(channel.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn accepted_action_refetches() {
    let channel = FakeChannel::with_state(json!({"WaitingStartCapture": null}));
    let s = session(channel.clone(), OWNER, clock());
    s.fetch_holder().await.unwrap();
    channel.set_snapshot(snapshot(
        2,
        json!({"Capture": {"sub_state": {"StartCapture": null}}}),
    ));

    s.start_capture().await.unwrap();
    assert_eq!(channel.calls(), vec!["start_capture_identity"]);
    assert_eq!(channel.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(s.view().phase(), Phase::Capture);
}

#[tokio::test]
async fn stale_view_rejection_refetches() {
    let channel = FakeChannel::with_state(json!({"WaitingStartCapture": null}));
    channel
        .action_replies
        .lock()
        .push_back(Err(CallError::Api(HolderApiError::HolderWrongState)));
    let s = session(channel.clone(), OWNER, clock());
    s.fetch_holder().await.unwrap();

    let err = s.start_capture().await.unwrap_err();
    assert!(matches!(err, ActionError::StaleView { .. }));
    assert_eq!(channel.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn user_facing_rejection_does_not_refetch() {
    let channel = FakeChannel::with_state(listed());
    channel
        .action_replies
        .lock()
        .push_back(Err(CallError::Api(HolderApiError::PriceMismatch)));
    let s = session(channel.clone(), GUEST, clock());
    s.fetch_holder().await.unwrap();

    let err = s.buy_now(1000).await.unwrap_err();
    assert_eq!(
        err,
        ActionError::Rejected {
            action: HolderAction::AcceptSellerOffer,
            error: HolderApiError::PriceMismatch
        }
    );
    assert_eq!(err.user_message(false).text, "The price has changed.");
    assert_eq!(channel.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transport_failure_is_reported() {
    let channel = FakeChannel::with_state(listed());
    channel
        .action_replies
        .lock()
        .push_back(Err(TransportError::Timeout.into()));
    let s = session(channel.clone(), OWNER, clock());
    s.fetch_holder().await.unwrap();

    let err = s.cancel_sale_intention().await.unwrap_err();
    assert!(matches!(err, ActionError::Transport { .. }));
    assert_eq!(channel.calls(), vec!["cancel_sale_intention"]);
}

#[tokio::test]
async fn accept_buyer_offer_checks_standing_offer() {
    let channel = FakeChannel::with_state(listed());
    let s = session(channel.clone(), OWNER, clock());
    s.fetch_holder().await.unwrap();

    let err = s.accept_buyer_offer(principal(GUEST), 1).await.unwrap_err();
    assert!(matches!(err, ActionError::InvalidInput { .. }));
    s.accept_buyer_offer(principal(GUEST), 900).await.unwrap();
    assert_eq!(channel.calls(), vec!["accept_buyer_offer"]);
}

#[tokio::test]
async fn restart_release_requires_corrected_registration_id() {
    let channel = FakeChannel::with_state(json!({"Release": {
        "sub_state": {"ReleaseFailed": {"error": {
            "AuthnMethodRegistrationModeEnterInvalidRegistrationId": {"error": "unknown id"}
        }}},
        "release_initiation": {"Manual": {}}
    }}));
    let s = session(channel.clone(), OWNER, clock());
    s.fetch_holder().await.unwrap();

    let err = s.restart_release(None).await.unwrap_err();
    assert!(matches!(
        err,
        ActionError::NotPermitted {
            denial: Denial::RegistrationIdRequired,
            ..
        }
    ));
    let id = RegistrationId::parse("https://id.ai/pair#aBcDe").unwrap();
    s.restart_release(Some(id)).await.unwrap();
    assert_eq!(channel.calls(), vec!["restart_release_identity"]);
}

#[tokio::test]
async fn concurrent_fetches_share_one_call() {
    let channel = FakeChannel::with_state(json!({"WaitingActivation": null}));
    let gate = Arc::new(Notify::new());
    *channel.fetch_gate.lock() = Some(gate.clone());
    let s = session(channel.clone(), OWNER, clock());

    let (a, b, ()) = tokio::join!(s.fetch_holder(), s.fetch_holder(), async {
        gate.notify_one()
    });
    assert_eq!(a.unwrap().update_version, 1);
    assert_eq!(b.unwrap().update_version, 1);
    assert_eq!(channel.fetches.load(Ordering::SeqCst), 1);
    assert!(!s.is_fetching());
}

#[tokio::test]
async fn fetch_in_flight_across_teardown_is_discarded() {
    let channel = FakeChannel::with_state(json!({"WaitingActivation": null}));
    let gate = Arc::new(Notify::new());
    *channel.fetch_gate.lock() = Some(gate.clone());
    let s = session(channel.clone(), OWNER, clock());

    let (result, ()) = tokio::join!(s.fetch_holder(), async {
        s.teardown();
        gate.notify_one();
    });
    assert_eq!(result.unwrap_err(), FetchError::Cancelled);
    assert!(s.snapshot().is_none());
    assert_eq!(s.epoch(), 1);
}

#[tokio::test]
async fn fetch_after_teardown_starts_fresh() {
    let channel = FakeChannel::with_state(json!({"WaitingActivation": null}));
    let gate = Arc::new(Notify::new());
    *channel.fetch_gate.lock() = Some(gate.clone());
    let s = session(channel.clone(), OWNER, clock());

    let stale = tokio::spawn({
        let s = s.clone();
        async move { s.fetch_holder().await }
    });
    while channel.fetches.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    s.teardown();
    *channel.fetch_gate.lock() = None;
    channel.set_snapshot(snapshot(2, json!({"WaitingStartCapture": null})));

    let fresh = s.fetch_holder().await.unwrap();
    assert_eq!(fresh.update_version, 2);
    assert_eq!(s.view().phase(), Phase::WaitingStartCapture);

    gate.notify_one();
    assert_eq!(stale.await.unwrap().unwrap_err(), FetchError::Cancelled);
    assert_eq!(s.snapshot().map(|i| i.update_version), Some(2));
    assert_eq!(channel.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_bids_at_different_prices_each_reach_the_contract() {
    let channel = FakeChannel::with_state(listed());
    let s = session(channel.clone(), GUEST, clock());
    s.fetch_holder().await.unwrap();
    let gate = Arc::new(Notify::new());
    *channel.fetch_gate.lock() = Some(gate.clone());

    let (a, b, ()) = tokio::join!(s.set_buyer_offer(950), s.set_buyer_offer(970), async {
        tokio::task::yield_now().await;
        gate.notify_one();
    });
    assert_eq!(a, Ok(()));
    assert_eq!(b, Ok(()));
    assert_eq!(*channel.bids.lock(), vec![950, 970]);
    assert_eq!(channel.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn identical_concurrent_bids_share_one_call() {
    let channel = FakeChannel::with_state(listed());
    let s = session(channel.clone(), GUEST, clock());
    s.fetch_holder().await.unwrap();
    let gate = Arc::new(Notify::new());
    *channel.fetch_gate.lock() = Some(gate.clone());

    let (a, b, ()) = tokio::join!(s.set_buyer_offer(950), s.set_buyer_offer(950), async {
        tokio::task::yield_now().await;
        gate.notify_one();
    });
    assert_eq!(a, Ok(()));
    assert_eq!(b, Ok(()));
    assert_eq!(*channel.bids.lock(), vec![950]);
}

#[tokio::test]
async fn malformed_snapshot_is_a_fetch_error() {
    let channel = FakeChannel::with_state(json!({"WaitingActivation": null}));
    channel.set_snapshot(json!({"state": {}}));
    let s = session(channel.clone(), OWNER, clock());
    assert!(matches!(
        s.fetch_holder().await,
        Err(FetchError::Decode(_))
    ));
    assert!(!s.view().is_loaded());
}
