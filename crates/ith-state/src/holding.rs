//! # Holding Phase
//!
//! The contract holds the identity. Before it can be sold, the contract
//! inventories the identity's assets (neurons, accounts) and checks that no
//! account carries an approval that would let the previous owner drain it.
//!
//! ```text
//! StartHolding → FetchAssets → CheckAssets → ValidateAssets → Hold
//!                                                              │
//!                                     Unsellable ◀─────────────┤
//!                                     CancelSaleDeal ◀─────────┘
//! ```
//!
//! `FetchAssets`, `CheckAssets`, `ValidateAssets` and `CancelSaleDeal` wrap
//! the holding state they will return to (`wrap_holding_state`), so asset
//! refreshes can run while an identity is already on sale.
//!
//! ## Delegation
//!
//! Fetching assets requires a delegation for the identity. The contract
//! prepares it, but only a client can submit the presigned `get_delegation`
//! read. While the remote state sits in
//! `FetchAssets → ObtainDelegationState → GetDelegationWaiting`, the client's
//! automatic processor is expected to perform that read and hand the result
//! back through `receiveDelegation`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ith_core::{Principal, TaggedUnion, TimestampMillis};

use crate::decode::{self, DecodeError, Level};
use crate::holder::{ProgressStep, RestartAction};
use crate::sale::SaleDealState;

// ─── Delegation ──────────────────────────────────────────────────────

/// A presigned read the client must submit on the contract's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetDelegationRequest {
    /// Canister that answers the read.
    pub canister_id: Principal,
    /// Opaque signed request envelope.
    pub envelope: Vec<u8>,
    /// When the presigned envelope stops being accepted.
    #[serde(default)]
    pub expiration: Option<TimestampMillis>,
}

/// Sub-state of obtaining a delegation for the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObtainDelegationState {
    StartObtainDelegation,
    /// Waiting for a client to pass the delegation through.
    GetDelegationWaiting {
        get_delegation_request: GetDelegationRequest,
    },
    CheckingAccessFromDelegation,
    Unrecognized(String),
}

impl TaggedUnion for ObtainDelegationState {
    const NAME: &'static str = "ObtainDelegationState";
    const TAGS: &'static [&'static str] = &[
        "StartObtainDelegation",
        "GetDelegationWaiting",
        "CheckingAccessFromDelegation",
    ];
}

#[derive(Deserialize)]
struct GetDelegationWaitingPayload {
    get_delegation_request: GetDelegationRequest,
}

impl ObtainDelegationState {
    fn decode(value: Option<&Value>) -> Result<Self, DecodeError> {
        Ok(match decode::level(Self::NAME, value, Self::TAGS)? {
            Level::Unrecognized(tag) => Self::Unrecognized(tag.to_string()),
            Level::Known(v) => match v.tag {
                "StartObtainDelegation" => Self::StartObtainDelegation,
                "GetDelegationWaiting" => {
                    let p: GetDelegationWaitingPayload = decode::payload(Self::NAME, &v)?;
                    Self::GetDelegationWaiting {
                        get_delegation_request: p.get_delegation_request,
                    }
                }
                "CheckingAccessFromDelegation" => Self::CheckingAccessFromDelegation,
                other => Self::Unrecognized(other.to_string()),
            },
        })
    }
}

// ─── NNS assets ──────────────────────────────────────────────────────

/// Sub-state of inventorying neurons and accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchNnsAssetsState {
    GetNeuronsIds,
    GetNeuronsInformation,
    DeletingNeuronsHotkeys,
    GetAccountsInformation,
    GetAccountsBalances,
    Unrecognized(String),
}

impl TaggedUnion for FetchNnsAssetsState {
    const NAME: &'static str = "FetchNnsAssetsState";
    const TAGS: &'static [&'static str] = &[
        "GetNeuronsIds",
        "GetNeuronsInformation",
        "DeletingNeuronsHotkeys",
        "GetAccountsInformation",
        "GetAccountsBalances",
    ];
}

impl FetchNnsAssetsState {
    fn decode(value: Option<&Value>) -> Result<Self, DecodeError> {
        Ok(match decode::level(Self::NAME, value, Self::TAGS)? {
            Level::Unrecognized(tag) => Self::Unrecognized(tag.to_string()),
            Level::Known(v) => match v.tag {
                "GetNeuronsIds" => Self::GetNeuronsIds,
                "GetNeuronsInformation" => Self::GetNeuronsInformation,
                "DeletingNeuronsHotkeys" => Self::DeletingNeuronsHotkeys,
                "GetAccountsInformation" => Self::GetAccountsInformation,
                "GetAccountsBalances" => Self::GetAccountsBalances,
                other => Self::Unrecognized(other.to_string()),
            },
        })
    }
}

/// Sub-state of `FetchAssets`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAssetsState {
    ObtainDelegationState(ObtainDelegationState),
    FetchNnsAssetsState(FetchNnsAssetsState),
    FinishFetchAssets,
    Unrecognized(String),
}

impl TaggedUnion for FetchAssetsState {
    const NAME: &'static str = "FetchAssetsState";
    const TAGS: &'static [&'static str] = &[
        "ObtainDelegationState",
        "FetchNnsAssetsState",
        "FinishFetchAssets",
    ];
}

impl FetchAssetsState {
    fn decode(value: Option<&Value>) -> Result<Self, DecodeError> {
        Ok(match decode::level(Self::NAME, value, Self::TAGS)? {
            Level::Unrecognized(tag) => Self::Unrecognized(tag.to_string()),
            Level::Known(v) => match v.tag {
                "ObtainDelegationState" => Self::ObtainDelegationState(
                    ObtainDelegationState::decode(decode::field(&v, "sub_state"))?,
                ),
                "FetchNnsAssetsState" => Self::FetchNnsAssetsState(FetchNnsAssetsState::decode(
                    decode::field(&v, "sub_state"),
                )?),
                "FinishFetchAssets" => Self::FinishFetchAssets,
                other => Self::Unrecognized(other.to_string()),
            },
        })
    }
}

// ─── Asset checks ────────────────────────────────────────────────────

/// Sub-state of `CheckAssets`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckAssetsState {
    StartCheckAssets,
    CheckAccountsForNoApprovePrepare,
    CheckAccountsForNoApproveSequential,
    FinishCheckAssets,
    Unrecognized(String),
}

impl TaggedUnion for CheckAssetsState {
    const NAME: &'static str = "CheckAssetsState";
    const TAGS: &'static [&'static str] = &[
        "StartCheckAssets",
        "CheckAccountsForNoApprovePrepare",
        "CheckAccountsForNoApproveSequential",
        "FinishCheckAssets",
    ];
}

impl CheckAssetsState {
    fn decode(value: Option<&Value>) -> Result<Self, DecodeError> {
        Ok(match decode::level(Self::NAME, value, Self::TAGS)? {
            Level::Unrecognized(tag) => Self::Unrecognized(tag.to_string()),
            Level::Known(v) => match v.tag {
                "StartCheckAssets" => Self::StartCheckAssets,
                "CheckAccountsForNoApprovePrepare" => Self::CheckAccountsForNoApprovePrepare,
                "CheckAccountsForNoApproveSequential" => Self::CheckAccountsForNoApproveSequential,
                "FinishCheckAssets" => Self::FinishCheckAssets,
                other => Self::Unrecognized(other.to_string()),
            },
        })
    }
}

// ─── Unsellable ──────────────────────────────────────────────────────

/// Why a held identity cannot be sold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsellableReason {
    /// An account of the identity carries an ICRC-2 approval.
    ApproveOnAccount,
    /// The contract certificate expired.
    CertificateExpired,
    /// Asset validation rejected the identity.
    ValidationFailed,
    Unrecognized(String),
}

impl TaggedUnion for UnsellableReason {
    const NAME: &'static str = "UnsellableReason";
    const TAGS: &'static [&'static str] =
        &["ApproveOnAccount", "CertificateExpired", "ValidationFailed"];
}

impl UnsellableReason {
    pub(crate) fn decode(value: Option<&Value>) -> Result<Self, DecodeError> {
        Ok(match decode::level(Self::NAME, value, Self::TAGS)? {
            Level::Unrecognized(tag) => Self::Unrecognized(tag.to_string()),
            Level::Known(v) => match v.tag {
                "ApproveOnAccount" => Self::ApproveOnAccount,
                "CertificateExpired" => Self::CertificateExpired,
                "ValidationFailed" => Self::ValidationFailed,
                other => Self::Unrecognized(other.to_string()),
            },
        })
    }

    pub(crate) fn decode_optional(value: Option<&Value>) -> Result<Option<Self>, DecodeError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(v) => Self::decode(Some(v)).map(Some),
        }
    }
}

// ─── Holding state ───────────────────────────────────────────────────

/// Holding sub-state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldingState {
    StartHolding,
    FetchAssets {
        fetch_assets_state: FetchAssetsState,
        wrap_holding_state: Box<HoldingState>,
    },
    CheckAssets {
        check_assets_state: CheckAssetsState,
        wrap_holding_state: Box<HoldingState>,
    },
    ValidateAssets {
        wrap_holding_state: Box<HoldingState>,
    },
    /// The identity is held and may be on sale.
    Hold {
        /// End of the quarantine window, if one is set.
        quarantine: Option<TimestampMillis>,
        /// Sale deal layered on top of holding.
        sale_deal_state: Option<SaleDealState>,
    },
    /// Absorbing: the identity cannot be sold; only release remains.
    Unsellable {
        reason: UnsellableReason,
    },
    CancelSaleDeal {
        sale_deal_state: Option<SaleDealState>,
        wrap_holding_state: Box<HoldingState>,
    },
    Unrecognized(String),
}

impl TaggedUnion for HoldingState {
    const NAME: &'static str = "HoldingState";
    const TAGS: &'static [&'static str] = &[
        "StartHolding",
        "FetchAssets",
        "CheckAssets",
        "ValidateAssets",
        "Hold",
        "Unsellable",
        "CancelSaleDeal",
    ];
}

#[derive(Deserialize)]
struct HoldPayload {
    #[serde(default)]
    quarantine: Option<TimestampMillis>,
}

impl HoldingState {
    /// Decode the `sub_state` of the `Holding` holder state.
    pub fn decode(value: Option<&Value>) -> Result<Self, DecodeError> {
        let v = match decode::level(Self::NAME, value, Self::TAGS)? {
            Level::Unrecognized(tag) => return Ok(Self::Unrecognized(tag.to_string())),
            Level::Known(v) => v,
        };
        let wrapped = || -> Result<Box<HoldingState>, DecodeError> {
            Ok(Box::new(Self::decode(decode::field(&v, "wrap_holding_state"))?))
        };
        Ok(match v.tag {
            "StartHolding" => Self::StartHolding,
            "FetchAssets" => Self::FetchAssets {
                fetch_assets_state: FetchAssetsState::decode(decode::field(
                    &v,
                    "fetch_assets_state",
                ))?,
                wrap_holding_state: wrapped()?,
            },
            "CheckAssets" => Self::CheckAssets {
                check_assets_state: CheckAssetsState::decode(decode::field(&v, "sub_state"))?,
                wrap_holding_state: wrapped()?,
            },
            "ValidateAssets" => Self::ValidateAssets {
                wrap_holding_state: wrapped()?,
            },
            "Hold" => {
                let p: HoldPayload = decode::payload(Self::NAME, &v)?;
                Self::Hold {
                    quarantine: p.quarantine,
                    sale_deal_state: SaleDealState::decode_optional(decode::field(
                        &v,
                        "sale_deal_state",
                    ))?,
                }
            }
            "Unsellable" => Self::Unsellable {
                reason: UnsellableReason::decode(decode::field(&v, "reason"))?,
            },
            "CancelSaleDeal" => Self::CancelSaleDeal {
                sale_deal_state: SaleDealState::decode_optional(decode::field(
                    &v,
                    "sale_deal_state",
                ))?,
                wrap_holding_state: wrapped()?,
            },
            other => Self::Unrecognized(other.to_string()),
        })
    }

    /// Variant name for logs and display.
    pub fn name(&self) -> &str {
        match self {
            Self::StartHolding => "StartHolding",
            Self::FetchAssets { .. } => "FetchAssets",
            Self::CheckAssets { .. } => "CheckAssets",
            Self::ValidateAssets { .. } => "ValidateAssets",
            Self::Hold { .. } => "Hold",
            Self::Unsellable { .. } => "Unsellable",
            Self::CancelSaleDeal { .. } => "CancelSaleDeal",
            Self::Unrecognized(tag) => tag,
        }
    }

    /// Progress step while the contract prepares the identity for sale.
    pub fn step(&self) -> Option<ProgressStep> {
        match self {
            Self::StartHolding => Some(ProgressStep::One),
            Self::FetchAssets {
                fetch_assets_state, ..
            } => match fetch_assets_state {
                FetchAssetsState::ObtainDelegationState(_) => Some(ProgressStep::One),
                FetchAssetsState::FetchNnsAssetsState(_) | FetchAssetsState::FinishFetchAssets => {
                    Some(ProgressStep::Two)
                }
                FetchAssetsState::Unrecognized(tag) => {
                    ith_core::log_unexpected_variant(FetchAssetsState::NAME, tag);
                    None
                }
            },
            Self::CheckAssets { .. } | Self::ValidateAssets { .. } => Some(ProgressStep::Three),
            Self::Hold { .. } | Self::Unsellable { .. } | Self::CancelSaleDeal { .. } => None,
            Self::Unrecognized(tag) => {
                ith_core::log_unexpected_variant(Self::NAME, tag);
                None
            }
        }
    }

    /// Whether the contract is preparing the identity (assets being
    /// fetched, checked or validated).
    pub fn is_preparing(&self) -> bool {
        matches!(
            self,
            Self::StartHolding
                | Self::FetchAssets { .. }
                | Self::CheckAssets { .. }
                | Self::ValidateAssets { .. }
        )
    }

    /// The sale deal of a directly active `Hold`.
    ///
    /// Sale actions are only offered while the holder sits in `Hold`
    /// itself, not while a wrapping asset refresh is running.
    pub fn active_sale_deal(&self) -> Option<&SaleDealState> {
        match self {
            Self::Hold {
                sale_deal_state, ..
            } => sale_deal_state.as_ref(),
            _ => None,
        }
    }

    /// End of the quarantine window of a directly active `Hold`.
    pub fn quarantine(&self) -> Option<TimestampMillis> {
        match self {
            Self::Hold { quarantine, .. } => *quarantine,
            _ => None,
        }
    }

    /// The presigned delegation read the contract is waiting for.
    pub fn pending_delegation_request(&self) -> Option<&GetDelegationRequest> {
        match self {
            Self::FetchAssets {
                fetch_assets_state:
                    FetchAssetsState::ObtainDelegationState(
                        ObtainDelegationState::GetDelegationWaiting {
                            get_delegation_request,
                        },
                    ),
                ..
            } => Some(get_delegation_request),
            _ => None,
        }
    }

    /// Whether the holding state allows the owner to start a release.
    ///
    /// Wrapping states delegate to the state they wrap. An unknown variant
    /// is logged and does not permit.
    pub fn permits_release(&self) -> bool {
        match self {
            Self::StartHolding | Self::Unsellable { .. } => true,
            Self::Hold {
                sale_deal_state, ..
            } => matches!(sale_deal_state, None | Some(SaleDealState::WaitingSellOffer)),
            Self::FetchAssets {
                wrap_holding_state, ..
            }
            | Self::ValidateAssets { wrap_holding_state } => wrap_holding_state.permits_release(),
            Self::CheckAssets { .. } | Self::CancelSaleDeal { .. } => false,
            Self::Unrecognized(tag) => {
                ith_core::log_unexpected_variant(Self::NAME, tag);
                false
            }
        }
    }

    /// The explicit edge out of `Unsellable`.
    pub fn restart(&self) -> Option<RestartAction> {
        matches!(self, Self::Unsellable { .. }).then_some(RestartAction::StartRelease)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hold(deal: Value) -> Value {
        json!({"Hold": {"quarantine": null, "sale_deal_state": deal}})
    }

    #[test]
    fn decodes_nested_delegation_request() {
        let v = json!({"FetchAssets": {
            "fetch_assets_state": {"ObtainDelegationState": {"sub_state": {
                "GetDelegationWaiting": {"get_delegation_request": {
                    "canister_id": "rdmx6-jaaaa-aaaaa-aaadq-cai",
                    "envelope": [1, 2, 3],
                    "expiration": 99
                }}
            }}},
            "wrap_holding_state": {"StartHolding": null}
        }});
        let state = HoldingState::decode(Some(&v)).unwrap();
        let req = state.pending_delegation_request().unwrap();
        assert_eq!(req.envelope, vec![1, 2, 3]);
        assert_eq!(req.expiration, Some(TimestampMillis(99)));
        assert_eq!(state.step(), Some(ProgressStep::One));
        assert!(state.permits_release());
    }

    #[test]
    fn release_permission_follows_wrapped_state() {
        let listed = hold(json!({"Trading": {"sale_offer": {"price": 1}, "buyer_offers": []}}));
        let validate = json!({"ValidateAssets": {"wrap_holding_state": listed}});
        let state = HoldingState::decode(Some(&validate)).unwrap();
        assert!(!state.permits_release());

        let intention = hold(json!({"WaitingSellOffer": null}));
        let fetch = json!({"FetchAssets": {
            "fetch_assets_state": {"FinishFetchAssets": null},
            "wrap_holding_state": intention
        }});
        let state = HoldingState::decode(Some(&fetch)).unwrap();
        assert!(state.permits_release());
        assert_eq!(state.step(), Some(ProgressStep::Two));
        assert!(state.active_sale_deal().is_none());
    }

    #[test]
    fn check_assets_and_cancel_never_permit_release() {
        let check = json!({"CheckAssets": {
            "sub_state": {"CheckAccountsForNoApproveSequential": null},
            "wrap_holding_state": {"StartHolding": null}
        }});
        assert!(!HoldingState::decode(Some(&check)).unwrap().permits_release());

        let cancel = json!({"CancelSaleDeal": {
            "sale_deal_state": null,
            "wrap_holding_state": {"StartHolding": null}
        }});
        assert!(!HoldingState::decode(Some(&cancel)).unwrap().permits_release());
    }

    #[test]
    fn unsellable_permits_release_and_restarts_into_it() {
        let v = json!({"Unsellable": {"reason": {"ApproveOnAccount": null}}});
        let state = HoldingState::decode(Some(&v)).unwrap();
        assert!(state.permits_release());
        assert_eq!(state.restart(), Some(RestartAction::StartRelease));
        assert_eq!(state.step(), None);
    }

    #[test]
    fn missing_wrapped_state_is_decode_error() {
        let v = json!({"ValidateAssets": {}});
        assert_eq!(
            HoldingState::decode(Some(&v)).unwrap_err(),
            DecodeError::NoActiveVariant {
                union: HoldingState::NAME
            }
        );
    }

    #[test]
    fn unknown_nns_sub_state_is_tolerated() {
        let v = json!({"FetchAssets": {
            "fetch_assets_state": {"FetchNnsAssetsState": {"sub_state": {"GetSnsTokens": null}}},
            "wrap_holding_state": {"StartHolding": null}
        }});
        let state = HoldingState::decode(Some(&v)).unwrap();
        assert_eq!(state.step(), Some(ProgressStep::Two));
        assert!(matches!(
            state,
            HoldingState::FetchAssets {
                fetch_assets_state: FetchAssetsState::FetchNnsAssetsState(
                    FetchNnsAssetsState::Unrecognized(ref tag)
                ),
                ..
            } if tag == "GetSnsTokens"
        ));
    }
}
