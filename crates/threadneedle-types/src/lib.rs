//! Shared type definitions for the Threadneedle economy simulation.
//!
//! This crate is the single source of truth for the identifiers, enums and
//! small records that flow between the ledger, bank, market and engine
//! crates.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe numeric wrappers for every entity identifier
//! - [`enums`] -- Enumeration types (ledger type, loan kind, risk weighting)
//! - [`structs`] -- Ledger references, account references, posting records
//! - [`context`] -- The explicit simulation context (step, RNG, id counters)
//!
//! All monetary quantities use [`Money`], a fixed-point [`Decimal`]. There is
//! no floating point anywhere on a balance sheet.
//!
//! [`Decimal`]: rust_decimal::Decimal

pub mod context;
pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use context::{ContextError, IdAllocator, SimContext, DEFAULT_SEED};
pub use enums::{LedgerType, LoanKind, MarketKind, PeriodUnit, RiskWeighting};
pub use ids::{AccountId, AgentId, BankId, LoanId, LotId, MarketId, OrderId};
pub use structs::{AccountRef, LedgerRef, Posting};

/// Monetary amount. Balances, prices and rates are all fixed-point decimals.
pub type Money = rust_decimal::Decimal;
