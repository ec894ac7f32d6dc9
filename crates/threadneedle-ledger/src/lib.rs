//! Double-entry bookkeeping for the Threadneedle simulation.
//!
//! Every bank keeps a [`GeneralLedger`]: a set of named [`Ledger`]s split
//! into assets, liabilities and equity. Money only moves through
//! [`GeneralLedger::transfer`], which posts one debit and one matching
//! credit, so the accounting identity
//!
//! ```text
//! total_assets == total_liabilities + total_equity
//! ```
//!
//! holds after every posting. The identity is re-checked from scratch at the
//! end of every step by [`balance::verify_identity`].
//!
//! # Modules
//!
//! - [`ledger`] -- A single named [`Ledger`] with a cached total.
//! - [`general`] -- The [`GeneralLedger`] and its journal.
//! - [`account`] -- Customer [`Account`]s with per-step flow counters.
//! - [`transaction`] -- The [`TransactionBuilder`] for validated postings.
//! - [`balance`] -- Accounting identity verification and anomaly reports.
//!
//! # Sign convention
//!
//! | Ledger type | Debit | Credit |
//! |-------------|-------|--------|
//! | Asset | increases | decreases |
//! | Liability | decreases | increases |
//! | Equity | decreases | increases |
//!
//! # Usage
//!
//! ```
//! use threadneedle_ledger::{GeneralLedger, Ledger};
//! use threadneedle_ledger::balance::BalanceResult;
//! use threadneedle_types::{AccountId, BankId, LedgerRef, LedgerType};
//! use rust_decimal::Decimal;
//!
//! let mut gl = GeneralLedger::new(BankId(1));
//! gl.add_ledger(Ledger::new("reserves", LedgerType::Asset)).ok();
//! gl.add_ledger(Ledger::new("deposits", LedgerType::Liability)).ok();
//!
//! let house = AccountId(1);
//! let customer = AccountId(2);
//! gl.transfer(
//!     &LedgerRef::new("reserves", house),
//!     &LedgerRef::new("deposits", customer),
//!     Decimal::new(100, 0),
//!     "print money",
//!     1,
//! )
//! .ok();
//!
//! assert_eq!(gl.total_assets(), gl.total_liabilities() + gl.total_equity());
//! assert!(matches!(gl.verify(1), BalanceResult::Balanced));
//! ```

pub mod account;
pub mod balance;
pub mod general;
pub mod ledger;
pub mod transaction;

// Re-export primary types at crate root.
pub use account::Account;
pub use balance::BalanceResult;
pub use general::GeneralLedger;
pub use ledger::Ledger;
pub use transaction::TransactionBuilder;

use threadneedle_types::{AccountId, BankId, Money};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when posting to a ledger.
///
/// [`LedgerError::InsufficientFunds`] is an ordinary outcome the caller is
/// expected to handle. [`LedgerError::UnknownLedger`] and
/// [`LedgerError::NegativeBalance`] indicate a broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Posting amount must be non-zero.
    #[error("posting amount must be non-zero")]
    ZeroAmount,

    /// Posting amount must not be negative.
    #[error("posting amount must be positive, got {amount}")]
    NegativeAmount {
        /// The invalid amount.
        amount: Money,
    },

    /// A required field was not set on the builder.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Debit and credit legs name the same balance.
    #[error("posting debits and credits the same balance: {ledger}/{account}")]
    SelfTransfer {
        /// Ledger named by both legs.
        ledger: String,
        /// Account named by both legs.
        account: AccountId,
    },

    /// The posting would take a balance below zero.
    #[error(
        "insufficient funds in {ledger}/{account}: balance {balance}, requested {requested}"
    )]
    InsufficientFunds {
        /// Ledger holding the balance.
        ledger: String,
        /// Account whose balance is short.
        account: AccountId,
        /// Balance before the posting.
        balance: Money,
        /// Amount the posting tried to remove.
        requested: Money,
    },

    /// No ledger of that name exists in the general ledger.
    #[error("unknown ledger {ledger} in general ledger of {bank}")]
    UnknownLedger {
        /// The name that failed to resolve.
        ledger: String,
        /// Owner of the general ledger.
        bank: BankId,
    },

    /// A ledger with that name is already registered.
    #[error("ledger {0} already exists")]
    DuplicateLedger(String),

    /// A balance that must never be negative is negative.
    #[error("negative balance {balance} in {ledger}/{account}")]
    NegativeBalance {
        /// Ledger holding the balance.
        ledger: String,
        /// Offending account.
        account: AccountId,
        /// The negative balance.
        balance: Money,
    },

    /// An internal error that should not occur in normal operation.
    #[error("internal ledger error: {0}")]
    Internal(&'static str),

    /// Decimal arithmetic overflowed.
    #[error("arithmetic overflow in ledger {0}")]
    Overflow(String),
}

impl LedgerError {
    /// Whether this error signals a broken bookkeeping invariant rather than
    /// an ordinary refusal.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownLedger { .. }
                | Self::NegativeBalance { .. }
                | Self::Overflow(_)
                | Self::Internal(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// An accounting identity violation detected during verification.
///
/// Produced by [`balance::verify_identity`]. The step engine treats any
/// anomaly as fatal to the step and attaches the report to its state dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAnomaly {
    /// Step at which the anomaly was detected.
    pub step: u64,
    /// Bank whose books are broken.
    pub bank: BankId,
    /// Recomputed total of asset ledgers.
    pub assets: Money,
    /// Recomputed total of liability ledgers.
    pub liabilities: Money,
    /// Recomputed total of equity ledgers.
    pub equity: Money,
    /// Every individual problem found.
    pub issues: Vec<String>,
    /// Human-readable summary.
    pub message: String,
}

impl core::fmt::Display for LedgerAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)?;
        for issue in &self.issues {
            write!(f, "\n  - {issue}")?;
        }
        Ok(())
    }
}
