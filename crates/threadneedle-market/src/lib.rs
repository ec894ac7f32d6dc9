//! Markets for the Threadneedle simulation.
//!
//! Every market is a continuous double auction over one product. Buyers and
//! sellers rest interest in an [`OrderBook`] under price-time priority, and
//! each incoming order clears against the opposite side at a single agreed
//! price. Money moves only through [`BankingSystem::pay`], so every trade
//! leaves every bank's books balanced.
//!
//! # Modules
//!
//! - [`book`] -- The [`OrderBook`] and resting [`Order`]s.
//! - [`lot`] -- A perishable [`Lot`] of goods.
//! - [`goods`] -- The goods [`Market`]: derived bid/ask, sale, purchase and
//!   lot expiry.
//! - [`labour`] -- The [`LabourMarket`]: workers list a desired salary,
//!   employers hire at it.
//! - [`shares`] -- The [`StockMarket`] for one bank's shares; trades update
//!   the bank's shareholder register.
//!
//! # Illiquidity is not an error
//!
//! A quote with nothing behind it is [`Quote::NoLiquidity`]; a sale that
//! finds no buyer is a [`goods::SaleReport`] with `price: None`.
//! [`MarketError`] is reserved for bad arguments and failed postings.
//!
//! [`BankingSystem::pay`]: threadneedle_bank::BankingSystem::pay

pub mod book;
pub mod goods;
pub mod labour;
pub mod lot;
pub mod shares;

pub use book::{Order, OrderBook};
pub use goods::{BuyReport, ExpiryReport, Market, MarketSettings, SaleReport};
pub use labour::{Hire, LabourMarket};
pub use lot::Lot;
pub use shares::{ShareTrade, StockMarket};

use serde::{Deserialize, Serialize};
use threadneedle_bank::BankError;
use threadneedle_types::{AgentId, ContextError, MarketId, Money, OrderId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by market operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    /// Market settings failed validation.
    #[error("invalid market settings: {reason}")]
    InvalidSettings {
        /// What is wrong.
        reason: String,
    },

    /// A lot of the wrong product was offered.
    #[error("market {market} trades {expected}, not {found}")]
    WrongProduct {
        /// Market offered to.
        market: MarketId,
        /// Product the market trades.
        expected: String,
        /// Product offered.
        found: String,
    },

    /// A lot exceeds the market's maximum lot size.
    #[error("lot of {quantity} exceeds max lot {max_lot}")]
    LotTooLarge {
        /// Units offered.
        quantity: u64,
        /// Largest lot accepted.
        max_lot: u64,
    },

    /// Zero units.
    #[error("quantity must be positive")]
    ZeroQuantity,

    /// A limit price that is not positive.
    #[error("invalid price: {0}")]
    InvalidPrice(Money),

    /// The order id is not resting in this book.
    #[error("unknown order: {0}")]
    UnknownOrder(OrderId),

    /// An agent offered more shares than it holds.
    #[error("{holder} holds {held} shares, offered {requested}")]
    InsufficientShares {
        /// Offering agent.
        holder: AgentId,
        /// Shares held and not already on offer.
        held: u64,
        /// Shares offered.
        requested: u64,
    },

    /// A settlement posting failed in a way the market cannot absorb.
    #[error("settlement failed: {0}")]
    Bank(#[from] BankError),

    /// Order id allocation failed.
    #[error("context error: {0}")]
    Context(#[from] ContextError),
}

// ---------------------------------------------------------------------------
// Prices and quotes
// ---------------------------------------------------------------------------

/// A derived bid or ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quote {
    /// The price at which the market would trade.
    Price(Money),
    /// No resting interest on that side.
    NoLiquidity,
}

impl Quote {
    /// The quoted price, if any.
    pub const fn price(self) -> Option<Money> {
        match self {
            Self::Price(p) => Some(p),
            Self::NoLiquidity => None,
        }
    }

    /// Whether a price is quoted.
    pub const fn is_liquid(self) -> bool {
        matches!(self, Self::Price(_))
    }
}

impl std::fmt::Display for Quote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Price(p) => write!(f, "{p}"),
            Self::NoLiquidity => f.write_str("no liquidity"),
        }
    }
}

/// Price condition on an incoming order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPrice {
    /// Trade only at this price or better; any remainder rests at it.
    Limit(Money),
    /// Take whatever the market offers; a buy remainder is dropped, a sell
    /// remainder rests at the lot's unit cost.
    Market,
}

impl OrderPrice {
    /// Reject non-positive limits.
    pub fn validate(self) -> Result<Self, MarketError> {
        match self {
            Self::Limit(p) if p <= Money::ZERO => Err(MarketError::InvalidPrice(p)),
            other => Ok(other),
        }
    }
}

/// Whether a settlement error cancels just the order or aborts the step.
fn absorb(err: BankError) -> Result<BankError, MarketError> {
    if err.is_fatal() {
        Err(MarketError::Bank(err))
    } else {
        Ok(err)
    }
}
