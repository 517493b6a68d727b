//! # Sale Deal Sub-Protocol
//!
//! Layered on top of the `Hold` holding state. The owner declares an
//! intention to sell, then lists with a price; guests bid or buy at the
//! listed price; an accepted deal moves the holder into Release.
//!
//! ```text
//! (no deal) ──setSaleIntention──▶ WaitingSellOffer ──setSaleOffer──▶ Trading
//!                                                                    │
//!                              acceptBuyerOffer / acceptSellerOffer ─┘
//!                                                                    ▼
//!                                                                  Accept
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ith_core::{Principal, TaggedUnion, TimestampMillis};

use crate::decode::{self, DecodeError, Level};

/// The owner's listed price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleOffer {
    /// Price in e8s.
    pub price: u64,
}

/// A standing bid from a buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerOffer {
    /// The bidding principal.
    pub buyer: Principal,
    /// Offered price in e8s.
    pub price: u64,
    /// When the offer was placed.
    pub time: TimestampMillis,
}

/// State of the sale deal within `Hold`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleDealState {
    /// Intention declared, no price yet.
    WaitingSellOffer,
    /// Listed: buyers may bid or buy at the listed price.
    Trading {
        /// Listed price, if the owner set one.
        sale_offer: Option<SaleOffer>,
        /// Standing buyer bids.
        buyer_offers: Vec<BuyerOffer>,
    },
    /// A buyer and a price were agreed.
    Accept {
        /// The buyer.
        buyer: Principal,
        /// Agreed price in e8s.
        price: u64,
    },
    /// A variant this client does not know.
    Unrecognized(String),
}

impl TaggedUnion for SaleDealState {
    const NAME: &'static str = "SaleDealState";
    const TAGS: &'static [&'static str] = &["WaitingSellOffer", "Trading", "Accept"];
}

#[derive(Deserialize)]
struct TradingPayload {
    #[serde(default)]
    sale_offer: Option<SaleOffer>,
    #[serde(default)]
    buyer_offers: Vec<BuyerOffer>,
}

#[derive(Deserialize)]
struct AcceptPayload {
    buyer: Principal,
    price: u64,
}

impl SaleDealState {
    /// Decode an optional sale deal state (`null` or missing is `None`).
    pub fn decode_optional(value: Option<&Value>) -> Result<Option<Self>, DecodeError> {
        let Some(level) = decode::optional_level(Self::NAME, value, Self::TAGS)? else {
            return Ok(None);
        };
        let state = match level {
            Level::Unrecognized(tag) => Self::Unrecognized(tag.to_string()),
            Level::Known(v) => match v.tag {
                "WaitingSellOffer" => Self::WaitingSellOffer,
                "Trading" => {
                    let p: TradingPayload = decode::payload(Self::NAME, &v)?;
                    Self::Trading {
                        sale_offer: p.sale_offer,
                        buyer_offers: p.buyer_offers,
                    }
                }
                "Accept" => {
                    let p: AcceptPayload = decode::payload(Self::NAME, &v)?;
                    Self::Accept {
                        buyer: p.buyer,
                        price: p.price,
                    }
                }
                other => Self::Unrecognized(other.to_string()),
            },
        };
        Ok(Some(state))
    }

    /// Variant name for logs and display.
    pub fn name(&self) -> &str {
        match self {
            Self::WaitingSellOffer => "WaitingSellOffer",
            Self::Trading { .. } => "Trading",
            Self::Accept { .. } => "Accept",
            Self::Unrecognized(tag) => tag,
        }
    }

    /// The standing offer of `buyer`, if any.
    pub fn offer_of(&self, buyer: &Principal) -> Option<&BuyerOffer> {
        match self {
            Self::Trading { buyer_offers, .. } => buyer_offers.iter().find(|o| &o.buyer == buyer),
            _ => None,
        }
    }

    /// The highest standing bid.
    pub fn best_offer(&self) -> Option<&BuyerOffer> {
        match self {
            Self::Trading { buyer_offers, .. } => buyer_offers.iter().max_by_key(|o| o.price),
            _ => None,
        }
    }
}

/// Coarse sale status derived from the optional deal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// No sale deal.
    NotForSale,
    /// `WaitingSellOffer`.
    Intention,
    /// `Trading`.
    Listed,
    /// `Accept`.
    Accepted,
    /// Unrecognized deal variant.
    Unknown,
}

impl SaleStatus {
    /// Derive the status of an optional deal state.
    pub fn of(deal: Option<&SaleDealState>) -> Self {
        match deal {
            None => Self::NotForSale,
            Some(SaleDealState::WaitingSellOffer) => Self::Intention,
            Some(SaleDealState::Trading { .. }) => Self::Listed,
            Some(SaleDealState::Accept { .. }) => Self::Accepted,
            Some(SaleDealState::Unrecognized(tag)) => {
                ith_core::log_unexpected_variant(SaleDealState::NAME, tag);
                Self::Unknown
            }
        }
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotForSale => "not_for_sale",
            Self::Intention => "intention",
            Self::Listed => "listed",
            Self::Accepted => "accepted",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}
