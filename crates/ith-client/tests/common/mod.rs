//! In-memory collaborators for session and processor tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use ith_client::{
    CallError, ClientConfig, HolderChannel, HolderSession, PresignedQueryExecutor, StaticIdentity,
    TransportError,
};
use ith_core::{ManualClock, Principal, RegistrationId, TimestampMillis};
use ith_state::GetDelegationRequest;

pub const OWNER: &str = "aaaaa-aa";
pub const GUEST: &str = "2ibo7-dia";

/// Holder contract double: serves a scripted snapshot and records calls.
#[derive(Default)]
pub struct FakeChannel {
    pub snapshot: Mutex<Value>,
    pub calls: Mutex<Vec<&'static str>>,
    pub bids: Mutex<Vec<u64>>,
    pub fetches: AtomicUsize,
    pub fetch_gate: Mutex<Option<Arc<Notify>>>,
    pub receive_replies: Mutex<VecDeque<Result<(), CallError>>>,
    /// Snapshot served once a delegation has been accepted.
    pub on_receive: Mutex<Option<Value>>,
    pub action_replies: Mutex<VecDeque<Result<(), CallError>>>,
}

impl FakeChannel {
    pub fn with_state(state: Value) -> Arc<Self> {
        let channel = Self::default();
        *channel.snapshot.lock() = snapshot(1, state);
        Arc::new(channel)
    }

    pub fn set_snapshot(&self, value: Value) {
        *self.snapshot.lock() = value;
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    fn record(&self, name: &'static str) -> Result<(), CallError> {
        self.calls.lock().push(name);
        self.action_replies.lock().pop_front().unwrap_or(Ok(()))
    }
}

pub fn snapshot(version: u64, state: Value) -> Value {
    json!({
        "owner": OWNER,
        "update_version": version,
        "state": state,
        "certificate_expiration": 10_000_000
    })
}

pub fn hold() -> Value {
    json!({"Holding": {"sub_state": {"Hold": {"quarantine": null, "sale_deal_state": null}}}})
}

pub fn delegation_waiting() -> Value {
    json!({"Holding": {"sub_state": {"FetchAssets": {
        "fetch_assets_state": {"ObtainDelegationState": {"sub_state": {
            "GetDelegationWaiting": {"get_delegation_request": {
                "canister_id": "aaaaa-aa",
                "envelope": [1, 2, 3],
                "expiration": null
            }}
        }}},
        "wrap_holding_state": {"StartHolding": null}
    }}}})
}

#[async_trait]
impl HolderChannel for FakeChannel {
    async fn fetch_holder_information(&self) -> Result<Value, CallError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let gate = self.fetch_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.snapshot.lock().clone())
    }
    async fn start_capture_identity(&self) -> Result<(), CallError> {
        self.record("start_capture_identity")
    }
    async fn confirm_holder_authn_method_registration(&self) -> Result<(), CallError> {
        self.record("confirm_holder_authn_method_registration")
    }
    async fn protected_authn_method_deleted(&self) -> Result<(), CallError> {
        self.record("protected_authn_method_deleted")
    }
    async fn set_sale_intention(&self) -> Result<(), CallError> {
        self.record("set_sale_intention")
    }
    async fn set_sale_offer(&self, _price: u64) -> Result<(), CallError> {
        self.record("set_sale_offer")
    }
    async fn change_sale_intention(&self) -> Result<(), CallError> {
        self.record("change_sale_intention")
    }
    async fn cancel_sale_intention(&self) -> Result<(), CallError> {
        self.record("cancel_sale_intention")
    }
    async fn accept_buyer_offer(&self, _buyer: &Principal, _price: u64) -> Result<(), CallError> {
        self.record("accept_buyer_offer")
    }
    async fn set_buyer_offer(&self, price: u64) -> Result<(), CallError> {
        self.bids.lock().push(price);
        self.record("set_buyer_offer")
    }
    async fn accept_seller_offer(&self, _price: u64) -> Result<(), CallError> {
        self.record("accept_seller_offer")
    }
    async fn cancel_buyer_offer(&self) -> Result<(), CallError> {
        self.record("cancel_buyer_offer")
    }
    async fn start_release_identity(&self) -> Result<(), CallError> {
        self.record("start_release_identity")
    }
    async fn confirm_owner_authn_method_registration(&self) -> Result<(), CallError> {
        self.record("confirm_owner_authn_method_registration")
    }
    async fn restart_release_identity(
        &self,
        _registration_id: Option<&RegistrationId>,
    ) -> Result<(), CallError> {
        self.record("restart_release_identity")
    }
    async fn delete_holder_authn_method(&self) -> Result<(), CallError> {
        self.record("delete_holder_authn_method")
    }
    async fn add_contract_controller(&self, _controller: &Principal) -> Result<(), CallError> {
        self.record("add_contract_controller")
    }
    async fn receive_delegation(&self, _delegation: Vec<u8>) -> Result<(), CallError> {
        self.calls.lock().push("receive_delegation");
        let reply = self.receive_replies.lock().pop_front().unwrap_or(Ok(()));
        if reply.is_ok() {
            if let Some(next) = self.on_receive.lock().take() {
                self.set_snapshot(next);
            }
        }
        reply
    }
    async fn retry_prepare_delegation(&self) -> Result<(), CallError> {
        self.record("retry_prepare_delegation")
    }
}

/// Presigned query double, optionally blocked until released.
#[derive(Default)]
pub struct FakePresigned {
    pub executions: AtomicUsize,
    pub gate: Option<Arc<Notify>>,
    pub replies: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
}

#[async_trait]
impl PresignedQueryExecutor for FakePresigned {
    async fn execute(&self, _request: &GetDelegationRequest) -> Result<Vec<u8>, TransportError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.replies.lock().pop_front().unwrap_or(Ok(vec![9, 9]))
    }
}

pub fn principal(text: &str) -> Principal {
    Principal::parse(text).unwrap()
}

pub fn session(
    channel: Arc<FakeChannel>,
    caller: &str,
    clock: Arc<ManualClock>,
) -> HolderSession {
    HolderSession::new(
        channel,
        Arc::new(StaticIdentity(Some(principal(caller)))),
        clock,
        ClientConfig::default(),
    )
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(TimestampMillis(1_000)))
}

/// Counts events at one level, optionally filtered by message text.
#[derive(Clone)]
pub struct CountingLayer {
    level: Level,
    needle: Option<&'static str>,
    pub count: Arc<AtomicUsize>,
}

impl CountingLayer {
    pub fn new(level: Level, needle: Option<&'static str>) -> Self {
        Self {
            level,
            needle,
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for CountingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != self.level {
            return;
        }
        if let Some(needle) = self.needle {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            if !visitor.0.contains(needle) {
                return;
            }
        }
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
