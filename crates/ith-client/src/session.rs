//! # Holder Session
//!
//! One session tracks one holder for one caller. It owns the snapshot
//! store and coordinates every remote call:
//!
//! - `fetch_holder` is single-flight. Concurrent refreshers share one call.
//! - User actions are gated by the permission evaluator before any remote
//!   call is made, then run single-flight per action.
//! - Sale-deal actions also pass through an ordered queue so their remote
//!   calls never interleave.
//! - Successful actions and stale-view rejections trigger a re-fetch.
//!
//! Teardown bumps the session epoch. Results of calls that were in flight
//! across a teardown are discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use uuid::Uuid;

use ith_core::{Clock, Principal, RegistrationId, TimestampMillis};
use ith_state::{
    ActionFlags, CallerRole, Denial, HolderAction, HolderInformation, HolderView, Permissions,
};

use crate::channel::{HolderChannel, IdentityProvider};
use crate::config::ClientConfig;
use crate::error::{ActionError, CallError, FetchError};
use crate::flight::SingleFlight;
use crate::queue::OrderedQueue;
use crate::store::{Snapshot, SnapshotStore};

const FETCH_HOLDER: &str = "fetch_holder";

/// Arguments that distinguish one invocation of an action from another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ActionArgs {
    None,
    Price(u64),
    BuyerOffer { buyer: Principal, price: u64 },
    Controller(Principal),
    RegistrationId(Option<RegistrationId>),
}

/// Single-flight identity of a user action.
type ActionKey = (HolderAction, ActionArgs);

type RemoteCall = Box<dyn FnOnce(Arc<dyn HolderChannel>) -> BoxFuture<'static, Result<(), CallError>> + Send>;

struct Inner {
    id: Uuid,
    channel: Arc<dyn HolderChannel>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    config: ClientConfig,
    store: SnapshotStore,
    fetches: SingleFlight<&'static str, Result<Arc<HolderInformation>, FetchError>>,
    actions: SingleFlight<ActionKey, Result<(), ActionError>>,
    sale_queue: OrderedQueue,
    epoch: AtomicU64,
}

/// Cheaply cloneable handle to a holder session.
#[derive(Clone)]
pub struct HolderSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HolderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HolderSession")
            .field("id", &self.inner.id)
            .field("epoch", &self.epoch())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl HolderSession {
    pub fn new(
        channel: Arc<dyn HolderChannel>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        config: ClientConfig,
    ) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(session = %id, "holder session created");
        Self {
            inner: Arc::new(Inner {
                id,
                channel,
                identity,
                clock,
                config,
                store: SnapshotStore::new(),
                fetches: SingleFlight::new(),
                actions: SingleFlight::new(),
                sale_queue: OrderedQueue::new(),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    // ── accessors ────────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn channel(&self) -> Arc<dyn HolderChannel> {
        Arc::clone(&self.inner.channel)
    }

    pub fn now(&self) -> TimestampMillis {
        self.inner.clock.now()
    }

    pub fn caller(&self) -> Option<Principal> {
        self.inner.identity.caller()
    }

    /// Current teardown epoch.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// Decoded view of the stored snapshot.
    pub fn view(&self) -> HolderView {
        self.inner.store.view()
    }

    /// The stored snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.store.current()
    }

    /// Subscribe to snapshot replacements.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.store.subscribe()
    }

    /// Role of the current caller on the stored snapshot.
    pub fn role(&self) -> CallerRole {
        self.view().role_of(self.caller().as_ref())
    }

    /// Whether a holder fetch is in flight.
    pub fn is_fetching(&self) -> bool {
        self.inner.fetches.is_in_flight(&FETCH_HOLDER)
    }

    /// Actions currently permitted for the caller.
    pub fn allowed_actions(&self, flags: ActionFlags) -> Vec<HolderAction> {
        let view = self.view();
        let caller = self.caller();
        Permissions::new(&view, caller.as_ref(), self.now()).allowed_actions(self.flags(flags))
    }

    // ── fetch ────────────────────────────────────────────────────────

    /// Fetch the holder snapshot and store it.
    pub async fn fetch_holder(&self) -> Result<Arc<HolderInformation>, FetchError> {
        let inner = Arc::clone(&self.inner);
        let epoch = self.epoch();
        self.inner
            .fetches
            .run(FETCH_HOLDER, move || async move {
                let result = fetch_once(&inner, epoch).await;
                if let Err(error) = &result {
                    tracing::warn!(session = %inner.id, %error, "holder fetch failed");
                }
                result
            })
            .await
    }

    /// Drop the stored snapshot and discard in-flight results.
    ///
    /// Calls made after teardown never join an operation started before it.
    pub fn teardown(&self) {
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.fetches.forget_all();
        self.inner.actions.forget_all();
        self.inner.store.clear();
        tracing::info!(session = %self.inner.id, epoch, "holder session torn down");
    }

    // ── capture ──────────────────────────────────────────────────────

    /// Begin capturing the identity into the contract.
    pub async fn start_capture(&self) -> Result<(), ActionError> {
        self.invoke(HolderAction::StartCapture, ActionArgs::None, ActionFlags::default(), |c| {
            async move { c.start_capture_identity().await }.boxed()
        })
        .await
    }

    /// Leave `CaptureFailed` by starting capture again.
    pub async fn restart_capture(&self) -> Result<(), ActionError> {
        self.invoke(HolderAction::RestartCapture, ActionArgs::None, ActionFlags::default(), |c| {
            async move { c.start_capture_identity().await }.boxed()
        })
        .await
    }

    /// Confirm the holder passkey registration. Requires the agreement
    /// checkbox.
    pub async fn confirm_holder_authn_method_registration(
        &self,
        agreement_checked: bool,
    ) -> Result<(), ActionError> {
        let flags = ActionFlags {
            agreement_checked,
            ..ActionFlags::default()
        };
        self.invoke(
            HolderAction::ConfirmHolderAuthnMethodRegistration,
            ActionArgs::None,
            flags,
            |c| async move { c.confirm_holder_authn_method_registration().await }.boxed(),
        )
        .await
    }

    /// Report that the protected authentication method was deleted.
    pub async fn protected_authn_method_deleted(&self) -> Result<(), ActionError> {
        self.invoke(
            HolderAction::ProtectedAuthnMethodDeleted,
            ActionArgs::None,
            ActionFlags::default(),
            |c| async move { c.protected_authn_method_deleted().await }.boxed(),
        )
        .await
    }

    // ── sale deal ────────────────────────────────────────────────────

    /// Declare the intention to sell.
    pub async fn set_sale_intention(&self) -> Result<(), ActionError> {
        self.invoke(HolderAction::SetSaleIntention, ActionArgs::None, ActionFlags::default(), |c| {
            async move { c.set_sale_intention().await }.boxed()
        })
        .await
    }

    /// List the identity at `price`.
    pub async fn set_sale_offer(&self, price: u64) -> Result<(), ActionError> {
        let action = HolderAction::SetSaleOffer;
        require_price(action, price)?;
        self.invoke(action, ActionArgs::Price(price), ActionFlags::default(), move |c| {
            async move { c.set_sale_offer(price).await }.boxed()
        })
        .await
    }

    /// Return to pricing, withdrawing a listing.
    pub async fn change_sale_intention(&self) -> Result<(), ActionError> {
        self.invoke(HolderAction::ChangeSaleIntention, ActionArgs::None, ActionFlags::default(), |c| {
            async move { c.change_sale_intention().await }.boxed()
        })
        .await
    }

    pub async fn cancel_sale_intention(&self) -> Result<(), ActionError> {
        self.invoke(HolderAction::CancelSaleIntention, ActionArgs::None, ActionFlags::default(), |c| {
            async move { c.cancel_sale_intention().await }.boxed()
        })
        .await
    }

    /// Accept the standing bid of `buyer`. The price must match that bid.
    pub async fn accept_buyer_offer(&self, buyer: Principal, price: u64) -> Result<(), ActionError> {
        let action = HolderAction::AcceptBuyerOffer;
        let known = self
            .view()
            .sale_deal()
            .and_then(|deal| deal.offer_of(&buyer).map(|o| o.price));
        if known != Some(price) {
            return Err(ActionError::InvalidInput {
                action,
                reason: format!("no standing offer of {price} from {buyer}"),
            });
        }
        let args = ActionArgs::BuyerOffer {
            buyer: buyer.clone(),
            price,
        };
        self.invoke(action, args, ActionFlags::default(), move |c| {
            async move { c.accept_buyer_offer(&buyer, price).await }.boxed()
        })
        .await
    }

    /// Place or replace the caller's bid.
    pub async fn set_buyer_offer(&self, price: u64) -> Result<(), ActionError> {
        let action = HolderAction::SetBuyerOffer;
        require_price(action, price)?;
        self.invoke(action, ActionArgs::Price(price), ActionFlags::default(), move |c| {
            async move { c.set_buyer_offer(price).await }.boxed()
        })
        .await
    }

    /// Buy at the listed price.
    pub async fn buy_now(&self, price: u64) -> Result<(), ActionError> {
        let action = HolderAction::AcceptSellerOffer;
        require_price(action, price)?;
        self.invoke(action, ActionArgs::Price(price), ActionFlags::default(), move |c| {
            async move { c.accept_seller_offer(price).await }.boxed()
        })
        .await
    }

    pub async fn cancel_buyer_offer(&self) -> Result<(), ActionError> {
        self.invoke(HolderAction::CancelBuyerOffer, ActionArgs::None, ActionFlags::default(), |c| {
            async move { c.cancel_buyer_offer().await }.boxed()
        })
        .await
    }

    // ── release ──────────────────────────────────────────────────────

    /// Begin returning the identity to a device-held passkey.
    pub async fn start_release(&self) -> Result<(), ActionError> {
        self.invoke(HolderAction::StartRelease, ActionArgs::None, ActionFlags::default(), |c| {
            async move { c.start_release_identity().await }.boxed()
        })
        .await
    }

    pub async fn confirm_owner_authn_method_registration(&self) -> Result<(), ActionError> {
        self.invoke(
            HolderAction::ConfirmOwnerAuthnMethodRegistration,
            ActionArgs::None,
            ActionFlags::default(),
            |c| async move { c.confirm_owner_authn_method_registration().await }.boxed(),
        )
        .await
    }

    /// Leave `ReleaseFailed`. A corrected registration id is required after
    /// an invalid-registration-id failure.
    pub async fn restart_release(
        &self,
        registration_id: Option<RegistrationId>,
    ) -> Result<(), ActionError> {
        let flags = ActionFlags {
            has_registration_id: registration_id.is_some(),
            ..ActionFlags::default()
        };
        let args = ActionArgs::RegistrationId(registration_id.clone());
        self.invoke(HolderAction::RestartRelease, args, flags, move |c| {
            async move { c.restart_release_identity(registration_id.as_ref()).await }.boxed()
        })
        .await
    }

    /// Remove the contract's own authentication method once the owner's
    /// passkey has access.
    pub async fn delete_holder_authn_method(&self) -> Result<(), ActionError> {
        self.invoke(
            HolderAction::DeleteHolderAuthnMethod,
            ActionArgs::None,
            ActionFlags::default(),
            |c| async move { c.delete_holder_authn_method().await }.boxed(),
        )
        .await
    }

    pub async fn add_contract_controller(&self, controller: Principal) -> Result<(), ActionError> {
        let args = ActionArgs::Controller(controller.clone());
        self.invoke(
            HolderAction::AddContractController,
            args,
            ActionFlags::default(),
            move |c| async move { c.add_contract_controller(&controller).await }.boxed(),
        )
        .await
    }

    // ── plumbing ─────────────────────────────────────────────────────

    fn flags(&self, flags: ActionFlags) -> ActionFlags {
        ActionFlags {
            allow_anonymous: flags.allow_anonymous || self.inner.config.allow_anonymous_buyers,
            ..flags
        }
    }

    /// Gate, run and settle one user action.
    ///
    /// Concurrent calls share a result only when both the action and its
    /// arguments match.
    async fn invoke<F>(
        &self,
        action: HolderAction,
        args: ActionArgs,
        flags: ActionFlags,
        call: F,
    ) -> Result<(), ActionError>
    where
        F: FnOnce(Arc<dyn HolderChannel>) -> BoxFuture<'static, Result<(), CallError>> + Send + 'static,
    {
        let view = self.view();
        let caller = self.caller();
        let permissions = Permissions::new(&view, caller.as_ref(), self.now());
        if let Err(denial) = permissions.check(action, self.flags(flags)) {
            if denial == Denial::NotOwner {
                tracing::info!(
                    session = %self.inner.id,
                    %action,
                    role = %permissions.role(),
                    "caller is not owner; skipping remote call"
                );
            } else {
                tracing::debug!(session = %self.inner.id, %action, %denial, "action not permitted");
            }
            return Err(ActionError::NotPermitted { action, denial });
        }

        let inner = Arc::clone(&self.inner);
        let call: RemoteCall = Box::new(call);
        self.inner
            .actions
            .run((action, args), move || settle(inner, action, call))
            .await
    }
}

async fn fetch_once(inner: &Inner, epoch: u64) -> Result<Arc<HolderInformation>, FetchError> {
    let value = inner.channel.fetch_holder_information().await?;
    let info = HolderInformation::from_value(value)?;
    if inner.epoch.load(Ordering::SeqCst) != epoch {
        tracing::debug!(session = %inner.id, "discarding fetch result after teardown");
        return Err(FetchError::Cancelled);
    }
    let version = info.update_version;
    let stored = inner.store.replace(info);
    tracing::trace!(session = %inner.id, update_version = version, "holder snapshot stored");
    Ok(stored)
}

async fn refetch(inner: &Arc<Inner>) {
    let epoch = inner.epoch.load(Ordering::SeqCst);
    let task_inner = Arc::clone(inner);
    let result = inner
        .fetches
        .run(FETCH_HOLDER, move || async move {
            fetch_once(&task_inner, epoch).await
        })
        .await;
    if let Err(error) = result {
        tracing::warn!(session = %inner.id, %error, "re-fetch after action failed");
    }
}

async fn settle(inner: Arc<Inner>, action: HolderAction, call: RemoteCall) -> Result<(), ActionError> {
    let epoch = inner.epoch.load(Ordering::SeqCst);
    let channel = Arc::clone(&inner.channel);
    tracing::debug!(session = %inner.id, %action, "invoking remote call");
    let result = if action.is_sale_deal() {
        tracing::trace!(
            session = %inner.id,
            %action,
            queued = inner.sale_queue.waiting(),
            "waiting for sale-deal turn"
        );
        inner.sale_queue.run(|| call(channel)).await
    } else {
        call(channel).await
    };

    if inner.epoch.load(Ordering::SeqCst) != epoch {
        tracing::debug!(session = %inner.id, %action, "discarding action result after teardown");
        return Err(ActionError::Cancelled { action });
    }

    match result {
        Ok(()) => {
            tracing::info!(session = %inner.id, %action, "action accepted");
            refetch(&inner).await;
            Ok(())
        }
        Err(error) => {
            let error = ActionError::from_call(action, error);
            match &error {
                ActionError::StaleView { .. } => {
                    tracing::info!(session = %inner.id, %action, %error, "stale holder view; re-fetching");
                    refetch(&inner).await;
                }
                ActionError::Transport { .. } => {
                    tracing::warn!(session = %inner.id, %action, %error, "action transport failure");
                }
                _ => {
                    tracing::info!(session = %inner.id, %action, %error, "action rejected");
                }
            }
            Err(error)
        }
    }
}

fn require_price(action: HolderAction, price: u64) -> Result<(), ActionError> {
    if price == 0 {
        return Err(ActionError::InvalidInput {
            action,
            reason: "price must be positive".to_string(),
        });
    }
    Ok(())
}
