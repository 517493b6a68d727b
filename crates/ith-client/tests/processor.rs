mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Notify;

use common::{clock, delegation_waiting, session, snapshot, FakeChannel, FakePresigned, OWNER};
use ith_client::{
    AutomaticAction, AutomaticProcessor, CallError, HolderApiError, ProcessingIndicator,
    ProcessorState, TickOutcome, TransportError,
};

#[tokio::test]
async fn detections_while_in_flight_issue_one_query() {
    let channel = FakeChannel::with_state(delegation_waiting());
    let s = session(channel.clone(), OWNER, clock());
    s.fetch_holder().await.unwrap();

    let gate = Arc::new(Notify::new());
    let presigned = Arc::new(FakePresigned {
        gate: Some(gate.clone()),
        ..FakePresigned::default()
    });
    let processor = AutomaticProcessor::new(s.clone(), presigned.clone());

    let (first, second, ()) = tokio::join!(processor.tick(), processor.tick(), async {
        gate.notify_one()
    });
    assert_eq!(
        first,
        TickOutcome::Completed(AutomaticAction::PassDelegateToBackend)
    );
    assert_eq!(second, TickOutcome::AlreadyInFlight);
    assert_eq!(presigned.executions.load(Ordering::SeqCst), 1);
    assert_eq!(channel.calls(), vec!["receive_delegation"]);
    assert_eq!(processor.state(), ProcessorState::Idle);
}

#[tokio::test]
async fn nothing_to_do_outside_delegation_wait() {
    let channel = FakeChannel::with_state(json!({"Holding": {"sub_state": {"Hold": {}}}}));
    let s = session(channel.clone(), OWNER, clock());
    s.fetch_holder().await.unwrap();
    let processor = AutomaticProcessor::new(s, Arc::new(FakePresigned::default()));
    assert_eq!(processor.tick().await, TickOutcome::Idle);
    assert_eq!(processor.indicator(), ProcessingIndicator::Idle);
}

#[tokio::test]
async fn failed_query_retries_preparation_after_cooldown() {
    let channel = FakeChannel::with_state(delegation_waiting());
    let clock = clock();
    let s = session(channel.clone(), OWNER, clock.clone());
    s.fetch_holder().await.unwrap();

    let presigned = Arc::new(FakePresigned::default());
    presigned
        .replies
        .lock()
        .push_back(Err(TransportError::Network("reset".into())));
    let processor = AutomaticProcessor::new(s, presigned.clone());

    assert_eq!(
        processor.tick().await,
        TickOutcome::Retrying(AutomaticAction::PassDelegateToBackend)
    );
    assert_eq!(processor.indicator(), ProcessingIndicator::Retrying);

    assert_eq!(
        processor.tick().await,
        TickOutcome::CoolingDown {
            remaining: Duration::from_secs(15)
        }
    );
    clock.advance(Duration::from_secs(10));
    assert_eq!(
        processor.tick().await,
        TickOutcome::CoolingDown {
            remaining: Duration::from_secs(5)
        }
    );
    assert!(channel.calls().is_empty());

    clock.advance(Duration::from_secs(5));
    assert_eq!(
        processor.tick().await,
        TickOutcome::Completed(AutomaticAction::RetryPrepareDelegation)
    );
    assert_eq!(channel.calls(), vec!["retry_prepare_delegation"]);
    assert_eq!(processor.indicator(), ProcessingIndicator::Idle);
}

#[tokio::test]
async fn failed_retry_restarts_cooldown() {
    let channel = FakeChannel::with_state(delegation_waiting());
    let clock = clock();
    let s = session(channel.clone(), OWNER, clock.clone());
    s.fetch_holder().await.unwrap();

    let presigned = Arc::new(FakePresigned::default());
    presigned.replies.lock().push_back(Err(TransportError::Timeout));
    channel
        .action_replies
        .lock()
        .push_back(Err(TransportError::Timeout.into()));
    let processor = AutomaticProcessor::new(s, presigned);

    processor.tick().await;
    clock.advance(Duration::from_secs(15));
    assert_eq!(
        processor.tick().await,
        TickOutcome::Retrying(AutomaticAction::RetryPrepareDelegation)
    );
    assert_eq!(
        processor.tick().await,
        TickOutcome::CoolingDown {
            remaining: Duration::from_secs(15)
        }
    );
}

#[tokio::test]
async fn transient_delegation_error_stays_on_same_action() {
    let channel = FakeChannel::with_state(delegation_waiting());
    channel
        .receive_replies
        .lock()
        .push_back(Err(CallError::Api(HolderApiError::DelegationNotYetAvailable)));
    let s = session(channel.clone(), OWNER, clock());
    s.fetch_holder().await.unwrap();
    let presigned = Arc::new(FakePresigned::default());
    let processor = AutomaticProcessor::new(s, presigned.clone());

    assert_eq!(
        processor.tick().await,
        TickOutcome::Retrying(AutomaticAction::PassDelegateToBackend)
    );
    assert_eq!(
        processor.state(),
        ProcessorState::Pending(AutomaticAction::PassDelegateToBackend)
    );
    assert_eq!(
        processor.tick().await,
        TickOutcome::Completed(AutomaticAction::PassDelegateToBackend)
    );
    assert_eq!(presigned.executions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn other_contract_error_forces_refetch() {
    let channel = FakeChannel::with_state(delegation_waiting());
    channel
        .receive_replies
        .lock()
        .push_back(Err(CallError::Api(HolderApiError::HolderWrongState)));
    let s = session(channel.clone(), OWNER, clock());
    s.fetch_holder().await.unwrap();
    let processor = AutomaticProcessor::new(s, Arc::new(FakePresigned::default()));

    assert_eq!(
        processor.tick().await,
        TickOutcome::Completed(AutomaticAction::PassDelegateToBackend)
    );
    assert_eq!(channel.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn error_marker_is_dropped_once_the_holder_moves_on() {
    let channel = FakeChannel::with_state(delegation_waiting());
    let s = session(channel.clone(), OWNER, clock());
    s.fetch_holder().await.unwrap();
    let presigned = Arc::new(FakePresigned::default());
    presigned.replies.lock().push_back(Err(TransportError::Timeout));
    let processor = AutomaticProcessor::new(s.clone(), presigned);
    processor.tick().await;

    channel.set_snapshot(snapshot(2, json!({"Holding": {"sub_state": {"Hold": {}}}})));
    s.fetch_holder().await.unwrap();
    assert_eq!(processor.tick().await, TickOutcome::Idle);
    assert_eq!(processor.state(), ProcessorState::Idle);
}
