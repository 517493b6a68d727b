//! # Permission Evaluator
//!
//! Pure predicates deciding whether an action is currently legal, from the
//! caller's role, the decoded holder state, and the client clock.
//!
//! ## Policy
//!
//! - Every predicate is `false` on an unloaded or illegal view.
//! - Owner-only actions are denied with [`Denial::NotOwner`] before anything
//!   else about the state is inspected.
//! - Unknown sub-state variants are logged through the unexpected-variant
//!   diagnostic and deny with [`Denial::UnrecognizedState`].
//! - Timers never block: an expired verification code still allows the
//!   confirmation attempt. The remote authority has the final word.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ith_core::{Principal, TaggedUnion, TimestampMillis};

use crate::capture::CaptureState;
use crate::holder::{HolderState, RestartAction};
use crate::holding::HoldingState;
use crate::release::ReleaseState;
use crate::sale::{SaleDealState, SaleStatus};
use crate::view::{CallerRole, HolderView};

/// A user-invoked holder action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderAction {
    StartCapture,
    RestartCapture,
    ConfirmHolderAuthnMethodRegistration,
    ProtectedAuthnMethodDeleted,
    SetSaleIntention,
    SetSaleOffer,
    ChangeSaleIntention,
    CancelSaleIntention,
    AcceptBuyerOffer,
    SetBuyerOffer,
    /// Buy at the listed price.
    AcceptSellerOffer,
    CancelBuyerOffer,
    StartRelease,
    ConfirmOwnerAuthnMethodRegistration,
    RestartRelease,
    DeleteHolderAuthnMethod,
    AddContractController,
}

impl HolderAction {
    /// Every action, in display order.
    pub const ALL: [HolderAction; 17] = [
        Self::StartCapture,
        Self::RestartCapture,
        Self::ConfirmHolderAuthnMethodRegistration,
        Self::ProtectedAuthnMethodDeleted,
        Self::SetSaleIntention,
        Self::SetSaleOffer,
        Self::ChangeSaleIntention,
        Self::CancelSaleIntention,
        Self::AcceptBuyerOffer,
        Self::SetBuyerOffer,
        Self::AcceptSellerOffer,
        Self::CancelBuyerOffer,
        Self::StartRelease,
        Self::ConfirmOwnerAuthnMethodRegistration,
        Self::RestartRelease,
        Self::DeleteHolderAuthnMethod,
        Self::AddContractController,
    ];

    /// Name of the remote call the action issues.
    pub fn call_name(self) -> &'static str {
        match self {
            Self::StartCapture | Self::RestartCapture => "startCaptureIdentity",
            Self::ConfirmHolderAuthnMethodRegistration => "confirmHolderAuthnMethodRegistration",
            Self::ProtectedAuthnMethodDeleted => "protectedAuthnMethodDeleted",
            Self::SetSaleIntention => "setSaleIntention",
            Self::SetSaleOffer => "setSaleOffer",
            Self::ChangeSaleIntention => "changeSaleIntention",
            Self::CancelSaleIntention => "cancelSaleIntention",
            Self::AcceptBuyerOffer => "acceptBuyerOffer",
            Self::SetBuyerOffer => "setBuyerOffer",
            Self::AcceptSellerOffer => "acceptSellerOffer",
            Self::CancelBuyerOffer => "cancelBuyerOffer",
            Self::StartRelease => "startReleaseIdentity",
            Self::ConfirmOwnerAuthnMethodRegistration => "confirmOwnerAuthnMethodRegistration",
            Self::RestartRelease => "restartReleaseIdentity",
            Self::DeleteHolderAuthnMethod => "deleteHolderAuthnMethod",
            Self::AddContractController => "addContractController",
        }
    }

    /// Whether only the owner may invoke the action.
    pub fn owner_only(self) -> bool {
        !matches!(
            self,
            Self::SetBuyerOffer | Self::AcceptSellerOffer | Self::CancelBuyerOffer
        )
    }

    /// Whether the action belongs to the sale-deal class whose remote calls
    /// are serialized through the ordered queue.
    pub fn is_sale_deal(self) -> bool {
        matches!(
            self,
            Self::SetSaleIntention
                | Self::SetSaleOffer
                | Self::ChangeSaleIntention
                | Self::CancelSaleIntention
                | Self::AcceptBuyerOffer
                | Self::SetBuyerOffer
                | Self::AcceptSellerOffer
                | Self::CancelBuyerOffer
        )
    }
}

impl std::fmt::Display for HolderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.call_name())
    }
}

/// Why an action is not currently permitted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    #[error("holder not loaded")]
    NotLoaded,
    #[error("caller is not the owner")]
    NotOwner,
    #[error("caller is not an eligible buyer")]
    NotGuest,
    #[error("action not available in state {state}")]
    WrongState { state: String },
    #[error("holder state not recognized by this client")]
    UnrecognizedState,
    #[error("certificate is not sellable")]
    CertificateNotSellable,
    #[error("quarantine window is active")]
    QuarantineActive,
    #[error("user agreement not confirmed")]
    AgreementMissing,
    #[error("a corrected registration id is required")]
    RegistrationIdRequired,
    #[error("no listed price to buy at")]
    NoSaleOffer,
    #[error("caller has no standing offer")]
    NoOwnOffer,
}

/// Caller-supplied inputs that gate some actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionFlags {
    /// The user-agreement checkbox is set.
    pub agreement_checked: bool,
    /// Anonymous callers count as guests for buyer actions.
    pub allow_anonymous: bool,
    /// A registration id accompanies the request.
    pub has_registration_id: bool,
}

/// Permission evaluation for one caller at one instant.
#[derive(Debug, Clone, Copy)]
pub struct Permissions<'a> {
    view: &'a HolderView,
    caller: Option<&'a Principal>,
    role: CallerRole,
    now: TimestampMillis,
}

impl<'a> Permissions<'a> {
    /// Evaluate permissions of `caller` on `view` at `now`.
    pub fn new(view: &'a HolderView, caller: Option<&'a Principal>, now: TimestampMillis) -> Self {
        Self {
            view,
            caller,
            role: view.role_of(caller),
            now,
        }
    }

    /// The resolved caller role.
    pub fn role(&self) -> CallerRole {
        self.role
    }

    /// Decide whether `action` is permitted.
    pub fn check(&self, action: HolderAction, flags: ActionFlags) -> Result<(), Denial> {
        let state = self.view.state().ok_or(Denial::NotLoaded)?;
        if action.owner_only() {
            if self.role != CallerRole::Owner {
                return Err(Denial::NotOwner);
            }
        } else {
            self.require_buyer(action, flags)?;
        }

        match action {
            HolderAction::StartCapture => match state {
                HolderState::WaitingStartCapture => Ok(()),
                other => Err(wrong_state(other)),
            },
            HolderAction::RestartCapture => match self.capture()? {
                CaptureState::CaptureFailed { .. } => Ok(()),
                other => Err(Denial::WrongState {
                    state: other.name().to_string(),
                }),
            },
            HolderAction::ConfirmHolderAuthnMethodRegistration => match self.capture()? {
                CaptureState::NeedConfirmAuthnMethodSessionRegistration { .. } => {
                    if flags.agreement_checked {
                        Ok(())
                    } else {
                        Err(Denial::AgreementMissing)
                    }
                }
                other => Err(Denial::WrongState {
                    state: other.name().to_string(),
                }),
            },
            HolderAction::ProtectedAuthnMethodDeleted => match self.capture()? {
                CaptureState::NeedDeleteProtectedIdentityAuthnMethod { .. } => Ok(()),
                other => Err(Denial::WrongState {
                    state: other.name().to_string(),
                }),
            },
            HolderAction::SetSaleIntention => {
                let holding = self.holding()?;
                match holding {
                    HoldingState::Hold {
                        sale_deal_state: None,
                        ..
                    } => self.require_sellable(),
                    other => Err(Denial::WrongState {
                        state: other.name().to_string(),
                    }),
                }
            }
            HolderAction::SetSaleOffer => {
                self.require_sale_status(&[SaleStatus::Intention])?;
                self.require_sellable()
            }
            HolderAction::ChangeSaleIntention => {
                self.require_sale_status(&[SaleStatus::Intention, SaleStatus::Listed])?;
                self.require_sellable()
            }
            HolderAction::CancelSaleIntention => {
                self.require_sale_status(&[SaleStatus::Listed])?;
                self.require_sellable()
            }
            HolderAction::AcceptBuyerOffer => self.require_sale_status(&[SaleStatus::Listed]),
            HolderAction::SetBuyerOffer => self.require_buyable(),
            HolderAction::AcceptSellerOffer => {
                self.require_buyable()?;
                match self.view.sale_deal() {
                    Some(SaleDealState::Trading {
                        sale_offer: Some(_),
                        ..
                    }) => Ok(()),
                    _ => Err(Denial::NoSaleOffer),
                }
            }
            HolderAction::CancelBuyerOffer => {
                self.require_sale_status(&[SaleStatus::Listed])?;
                let has_offer = match (self.view.sale_deal(), self.caller) {
                    (Some(deal), Some(caller)) => deal.offer_of(caller).is_some(),
                    _ => false,
                };
                if has_offer {
                    Ok(())
                } else {
                    Err(Denial::NoOwnOffer)
                }
            }
            HolderAction::StartRelease => {
                let holding = self.holding()?;
                if holding.permits_release() {
                    Ok(())
                } else {
                    Err(Denial::WrongState {
                        state: holding.name().to_string(),
                    })
                }
            }
            HolderAction::ConfirmOwnerAuthnMethodRegistration => match self.release()? {
                ReleaseState::ConfirmAuthnMethodRegistration { .. } => Ok(()),
                other => Err(Denial::WrongState {
                    state: other.name().to_string(),
                }),
            },
            HolderAction::RestartRelease => match self.release()?.restart() {
                Some(RestartAction::RestartRelease {
                    requires_registration_id,
                }) => {
                    if requires_registration_id && !flags.has_registration_id {
                        Err(Denial::RegistrationIdRequired)
                    } else {
                        Ok(())
                    }
                }
                _ => Err(wrong_state(state)),
            },
            HolderAction::DeleteHolderAuthnMethod => match self.release()? {
                ReleaseState::CheckingAccessFromOwnerAuthnMethod => Ok(()),
                other => Err(Denial::WrongState {
                    state: other.name().to_string(),
                }),
            },
            HolderAction::AddContractController => match state {
                HolderState::Closed { .. } => Err(wrong_state(state)),
                HolderState::Unrecognized(tag) => {
                    ith_core::log_unexpected_variant(HolderState::NAME, tag);
                    Err(Denial::UnrecognizedState)
                }
                _ => Ok(()),
            },
        }
    }

    /// Boolean form of [`Permissions::check`].
    pub fn allows(&self, action: HolderAction, flags: ActionFlags) -> bool {
        self.check(action, flags).is_ok()
    }

    /// Every action permitted with `flags`.
    pub fn allowed_actions(&self, flags: ActionFlags) -> Vec<HolderAction> {
        HolderAction::ALL
            .into_iter()
            .filter(|a| self.allows(*a, flags))
            .collect()
    }

    // ── per-action predicates ────────────────────────────────────────
    //
    // Thin wrappers over `check` for callers that render one control each.

    /// Owner, holder in `WaitingStartCapture`.
    pub fn can_start_capture(&self) -> bool {
        self.allows(HolderAction::StartCapture, ActionFlags::default())
    }

    /// Owner, capture sitting in `CaptureFailed`.
    pub fn can_restart_capture(&self) -> bool {
        self.allows(HolderAction::RestartCapture, ActionFlags::default())
    }

    /// Requires the user-agreement checkbox; an expired verification-code
    /// timer does not block.
    pub fn can_confirm_holder_authn_method_registration(&self, agreement_checked: bool) -> bool {
        self.allows(
            HolderAction::ConfirmHolderAuthnMethodRegistration,
            ActionFlags {
                agreement_checked,
                ..ActionFlags::default()
            },
        )
    }

    /// Owner, capture waiting for the protected method to be removed.
    pub fn can_mark_protected_authn_method_deleted(&self) -> bool {
        self.allows(HolderAction::ProtectedAuthnMethodDeleted, ActionFlags::default())
    }

    /// Owner, `Hold` without a sale deal, sellable certificate.
    pub fn can_set_sale_intention(&self) -> bool {
        self.allows(HolderAction::SetSaleIntention, ActionFlags::default())
    }

    pub fn can_set_sale_offer(&self) -> bool {
        self.allows(HolderAction::SetSaleOffer, ActionFlags::default())
    }

    /// Owner, sale in intention or listed, sellable certificate.
    pub fn can_change_sale_intention(&self) -> bool {
        self.allows(HolderAction::ChangeSaleIntention, ActionFlags::default())
    }

    pub fn can_cancel_sale_intention(&self) -> bool {
        self.allows(HolderAction::CancelSaleIntention, ActionFlags::default())
    }

    /// Owner, sale listed. Certificate status is not consulted.
    pub fn can_accept_buyer_offer(&self) -> bool {
        self.allows(HolderAction::AcceptBuyerOffer, ActionFlags::default())
    }

    /// Non-owner on a listed, sellable holder outside quarantine.
    /// Anonymous callers need `allow_anonymous`.
    pub fn can_set_buyer_offer(&self, allow_anonymous: bool) -> bool {
        self.allows(
            HolderAction::SetBuyerOffer,
            ActionFlags {
                allow_anonymous,
                ..ActionFlags::default()
            },
        )
    }

    /// As [`Self::can_set_buyer_offer`], and the owner has set a price.
    pub fn can_buy_now(&self, allow_anonymous: bool) -> bool {
        self.allows(
            HolderAction::AcceptSellerOffer,
            ActionFlags {
                allow_anonymous,
                ..ActionFlags::default()
            },
        )
    }

    /// Authenticated guest holding a standing bid.
    pub fn can_cancel_buyer_offer(&self) -> bool {
        self.allows(HolderAction::CancelBuyerOffer, ActionFlags::default())
    }

    /// Owner, holding sub-state that permits release.
    pub fn can_start_release(&self) -> bool {
        self.allows(HolderAction::StartRelease, ActionFlags::default())
    }

    pub fn can_confirm_owner_authn_method_registration(&self) -> bool {
        self.allows(
            HolderAction::ConfirmOwnerAuthnMethodRegistration,
            ActionFlags::default(),
        )
    }

    /// Owner, release in `ReleaseFailed`. An invalid-registration-id
    /// failure also needs a corrected id.
    pub fn can_restart_release(&self, has_registration_id: bool) -> bool {
        self.allows(
            HolderAction::RestartRelease,
            ActionFlags {
                has_registration_id,
                ..ActionFlags::default()
            },
        )
    }

    pub fn can_delete_holder_authn_method(&self) -> bool {
        self.allows(HolderAction::DeleteHolderAuthnMethod, ActionFlags::default())
    }

    /// Owner of a loaded holder that is not closed.
    pub fn can_add_contract_controller(&self) -> bool {
        self.allows(HolderAction::AddContractController, ActionFlags::default())
    }

    // ── helpers ──────────────────────────────────────────────────────

    fn require_buyer(&self, action: HolderAction, flags: ActionFlags) -> Result<(), Denial> {
        match self.role {
            CallerRole::Guest => Ok(()),
            CallerRole::Anonymous
                if flags.allow_anonymous && action != HolderAction::CancelBuyerOffer =>
            {
                Ok(())
            }
            CallerRole::Owner | CallerRole::Anonymous => Err(Denial::NotGuest),
        }
    }

    fn capture(&self) -> Result<&'a CaptureState, Denial> {
        match self.view.capture() {
            Some(CaptureState::Unrecognized(tag)) => {
                ith_core::log_unexpected_variant(CaptureState::NAME, tag);
                Err(Denial::UnrecognizedState)
            }
            Some(sub_state) => Ok(sub_state),
            None => Err(self.wrong_phase()),
        }
    }

    fn holding(&self) -> Result<&'a HoldingState, Denial> {
        match self.view.holding() {
            Some(HoldingState::Unrecognized(tag)) => {
                ith_core::log_unexpected_variant(HoldingState::NAME, tag);
                Err(Denial::UnrecognizedState)
            }
            Some(sub_state) => Ok(sub_state),
            None => Err(self.wrong_phase()),
        }
    }

    fn release(&self) -> Result<&'a ReleaseState, Denial> {
        match self.view.release() {
            Some(ReleaseState::Unrecognized(tag)) => {
                ith_core::log_unexpected_variant(ReleaseState::NAME, tag);
                Err(Denial::UnrecognizedState)
            }
            Some(sub_state) => Ok(sub_state),
            None => Err(self.wrong_phase()),
        }
    }

    fn wrong_phase(&self) -> Denial {
        match self.view.state() {
            Some(HolderState::Unrecognized(tag)) => {
                ith_core::log_unexpected_variant(HolderState::NAME, tag);
                Denial::UnrecognizedState
            }
            Some(state) => wrong_state(state),
            None => Denial::NotLoaded,
        }
    }

    fn require_sale_status(&self, accepted: &[SaleStatus]) -> Result<(), Denial> {
        let holding = self.holding()?;
        match self.view.sale_status() {
            SaleStatus::Unknown => Err(Denial::UnrecognizedState),
            status if accepted.contains(&status) => Ok(()),
            _ => Err(Denial::WrongState {
                state: match holding.active_sale_deal() {
                    Some(deal) => format!("{}/{}", holding.name(), deal.name()),
                    None => holding.name().to_string(),
                },
            }),
        }
    }

    fn require_sellable(&self) -> Result<(), Denial> {
        if self.view.certificate_status(self.now).is_sellable() {
            Ok(())
        } else {
            Err(Denial::CertificateNotSellable)
        }
    }

    fn require_buyable(&self) -> Result<(), Denial> {
        self.require_sale_status(&[SaleStatus::Listed])?;
        self.require_sellable()?;
        if self.view.quarantine_active(self.now) {
            return Err(Denial::QuarantineActive);
        }
        Ok(())
    }
}

fn wrong_state(state: &HolderState) -> Denial {
    Denial::WrongState {
        state: state.describe(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holder::HolderInformation;
    use serde_json::{json, Value};
    use std::sync::Arc;

    const OWNER: &str = "aaaaa-aa";
    const GUEST: &str = "2ibo7-dia";

    fn view(state: Value) -> HolderView {
        let info = HolderInformation::from_value(json!({
            "owner": OWNER,
            "update_version": 3,
            "state": state,
            "certificate_expiration": 1_000_000
        }))
        .unwrap();
        HolderView::from_snapshot(Some(Arc::new(info)))
    }

    fn holding(sub_state: Value) -> HolderView {
        view(json!({"Holding": {"sub_state": sub_state}}))
    }

    fn hold(deal: Value, quarantine: Value) -> HolderView {
        holding(json!({"Hold": {"quarantine": quarantine, "sale_deal_state": deal}}))
    }

    fn listed() -> Value {
        json!({"Trading": {
            "sale_offer": {"price": 1000},
            "buyer_offers": [{"buyer": GUEST, "price": 900, "time": 1}]
        }})
    }

    fn p(text: &str) -> Principal {
        Principal::parse(text).unwrap()
    }

    const NOW: TimestampMillis = TimestampMillis(10);

    #[test]
    fn start_capture_requires_owner_and_waiting_state() {
        let v = view(json!({"WaitingStartCapture": null}));
        let owner = p(OWNER);
        let guest = p(GUEST);
        assert!(Permissions::new(&v, Some(&owner), NOW).can_start_capture());
        assert_eq!(
            Permissions::new(&v, Some(&guest), NOW)
                .check(HolderAction::StartCapture, ActionFlags::default()),
            Err(Denial::NotOwner)
        );
        let capture = view(json!({"Capture": {"sub_state": {"StartCapture": null}}}));
        assert!(!Permissions::new(&capture, Some(&owner), NOW).can_start_capture());
    }

    #[test]
    fn unloaded_view_denies_everything() {
        let v = HolderView::Unloaded;
        let owner = p(OWNER);
        let perms = Permissions::new(&v, Some(&owner), NOW);
        assert!(perms.allowed_actions(ActionFlags::default()).is_empty());
        assert_eq!(
            perms.check(HolderAction::StartCapture, ActionFlags::default()),
            Err(Denial::NotLoaded)
        );
    }

    #[test]
    fn confirm_registration_needs_agreement_not_live_timer() {
        // Expiration already passed relative to NOW.
        let v = view(json!({"Capture": {"sub_state": {
            "NeedConfirmAuthnMethodSessionRegistration": {"confirmation_code": "1", "expiration": 1}
        }}}));
        let owner = p(OWNER);
        let perms = Permissions::new(&v, Some(&owner), NOW);
        assert!(!perms.can_confirm_holder_authn_method_registration(false));
        assert!(perms.can_confirm_holder_authn_method_registration(true));
    }

    #[test]
    fn accept_buyer_offer_only_while_trading() {
        let owner = p(OWNER);
        let trading = hold(listed(), Value::Null);
        assert!(Permissions::new(&trading, Some(&owner), NOW).can_accept_buyer_offer());
        let waiting = hold(json!({"WaitingSellOffer": null}), Value::Null);
        assert!(!Permissions::new(&waiting, Some(&owner), NOW).can_accept_buyer_offer());
        let accepted = hold(json!({"Accept": {"buyer": GUEST, "price": 1}}), Value::Null);
        assert!(!Permissions::new(&accepted, Some(&owner), NOW).can_accept_buyer_offer());
    }

    #[test]
    fn change_and_cancel_sale_intention() {
        let owner = p(OWNER);
        let waiting = hold(json!({"WaitingSellOffer": null}), Value::Null);
        let perms = Permissions::new(&waiting, Some(&owner), NOW);
        assert!(perms.can_change_sale_intention());
        assert!(!perms.can_cancel_sale_intention());
        assert!(perms.can_set_sale_offer());

        let trading = hold(listed(), Value::Null);
        let perms = Permissions::new(&trading, Some(&owner), NOW);
        assert!(perms.can_change_sale_intention());
        assert!(perms.can_cancel_sale_intention());

        // Expired certificate blocks both.
        let late = TimestampMillis(2_000_000);
        let perms = Permissions::new(&trading, Some(&owner), late);
        assert!(!perms.can_change_sale_intention());
        assert!(!perms.can_cancel_sale_intention());
    }

    #[test]
    fn buyer_actions_respect_quarantine_and_anonymous_flag() {
        let guest = p(GUEST);
        let anon = Principal::anonymous();
        let trading = hold(listed(), json!(100));
        let perms = Permissions::new(&trading, Some(&guest), NOW);
        assert_eq!(
            perms.check(HolderAction::SetBuyerOffer, ActionFlags::default()),
            Err(Denial::QuarantineActive)
        );
        let after = TimestampMillis(100);
        let perms = Permissions::new(&trading, Some(&guest), after);
        assert!(perms.can_set_buyer_offer(false));
        assert!(perms.can_buy_now(false));
        assert!(perms.can_cancel_buyer_offer());

        let perms = Permissions::new(&trading, Some(&anon), after);
        assert!(!perms.can_set_buyer_offer(false));
        assert!(perms.can_set_buyer_offer(true));
        assert!(!perms.can_cancel_buyer_offer());

        let owner = p(OWNER);
        let perms = Permissions::new(&trading, Some(&owner), after);
        assert!(!perms.can_set_buyer_offer(true));
    }

    #[test]
    fn buy_now_requires_listed_price() {
        let guest = p(GUEST);
        let bids_only = hold(json!({"Trading": {"buyer_offers": []}}), Value::Null);
        let perms = Permissions::new(&bids_only, Some(&guest), NOW);
        assert!(perms.can_set_buyer_offer(false));
        assert!(!perms.can_buy_now(false));
    }

    #[test]
    fn start_release_follows_holding_state() {
        let owner = p(OWNER);
        let cases = [
            (json!({"StartHolding": null}), true),
            (json!({"Unsellable": {"reason": {"ApproveOnAccount": null}}}), true),
            (json!({"Hold": {"sale_deal_state": null}}), true),
            (json!({"Hold": {"sale_deal_state": {"WaitingSellOffer": null}}}), true),
            (json!({"Hold": {"sale_deal_state": listed()}}), false),
            (
                json!({"CheckAssets": {
                    "sub_state": {"StartCheckAssets": null},
                    "wrap_holding_state": {"StartHolding": null}
                }}),
                false,
            ),
            (
                json!({"CancelSaleDeal": {
                    "sale_deal_state": null,
                    "wrap_holding_state": {"Hold": {}}
                }}),
                false,
            ),
            (
                json!({"ValidateAssets": {"wrap_holding_state": {"StartHolding": null}}}),
                true,
            ),
        ];
        for (sub_state, expected) in cases {
            let v = holding(sub_state.clone());
            assert_eq!(
                Permissions::new(&v, Some(&owner), NOW).can_start_release(),
                expected,
                "{sub_state}"
            );
        }
    }

    #[test]
    fn unknown_holding_variant_denies() {
        let owner = p(OWNER);
        let v = holding(json!({"Staking": {}}));
        assert_eq!(
            Permissions::new(&v, Some(&owner), NOW)
                .check(HolderAction::StartRelease, ActionFlags::default()),
            Err(Denial::UnrecognizedState)
        );
    }

    #[test]
    fn restart_release_with_invalid_registration_id() {
        let owner = p(OWNER);
        let v = view(json!({"Release": {
            "sub_state": {"ReleaseFailed": {"error": {
                "AuthnMethodRegistrationModeEnterInvalidRegistrationId": {"error": "x"}
            }}},
            "release_initiation": {"Manual": {}}
        }}));
        let perms = Permissions::new(&v, Some(&owner), NOW);
        assert!(!perms.can_restart_release(false));
        assert!(perms.can_restart_release(true));
    }

    #[test]
    fn release_actions_follow_sub_state() {
        let owner = p(OWNER);
        let confirm = view(json!({"Release": {
            "sub_state": {"ConfirmAuthnMethodRegistration": {"expiration": 5}},
            "release_initiation": {"Manual": {}}
        }}));
        let perms = Permissions::new(&confirm, Some(&owner), NOW);
        assert!(perms.can_confirm_owner_authn_method_registration());
        assert!(!perms.can_delete_holder_authn_method());

        let checking = view(json!({"Release": {
            "sub_state": {"CheckingAccessFromOwnerAuthnMethod": null},
            "release_initiation": {"DangerousToLoseIdentity": null}
        }}));
        let perms = Permissions::new(&checking, Some(&owner), NOW);
        assert!(perms.can_delete_holder_authn_method());
    }

    #[test]
    fn allowed_actions_for_owner_in_hold() {
        let owner = p(OWNER);
        let v = hold(Value::Null, Value::Null);
        let actions = Permissions::new(&v, Some(&owner), NOW).allowed_actions(ActionFlags::default());
        assert_eq!(
            actions,
            vec![
                HolderAction::SetSaleIntention,
                HolderAction::StartRelease,
                HolderAction::AddContractController
            ]
        );
    }

    #[test]
    fn closed_holder_rejects_controllers() {
        let owner = p(OWNER);
        let v = view(json!({"Closed": null}));
        assert!(!Permissions::new(&v, Some(&owner), NOW).can_add_contract_controller());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn states() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(json!({"WaitingActivation": null})),
                Just(json!({"WaitingStartCapture": null})),
                Just(json!({"Capture": {"sub_state": {"CaptureFailed": {"error": {"Internal": null}}}}})),
                Just(json!({"Holding": {"sub_state": {"StartHolding": null}}})),
                Just(json!({"Holding": {"sub_state": {"Hold": {"sale_deal_state": null}}}})),
                Just(json!({"Holding": {"sub_state": {"Hold": {"sale_deal_state": listed()}}}})),
                Just(json!({"Closed": null})),
            ]
        }

        proptest! {
            #[test]
            fn guests_never_get_owner_only_actions(state in states(), now in 0u64..2_000_000) {
                let guest = p(GUEST);
                let v = view(state);
                let perms = Permissions::new(&v, Some(&guest), TimestampMillis(now));
                let flags = ActionFlags { agreement_checked: true, allow_anonymous: true, has_registration_id: true };
                for action in perms.allowed_actions(flags) {
                    prop_assert!(!action.owner_only(), "{action} allowed for guest");
                }
            }
        }
    }
}
