//! Banks, loans and the central bank for the Threadneedle simulation.
//!
//! # Modules
//!
//! - [`loan`] -- The [`Loan`] state machine and its repayment schedule.
//! - [`policy`] -- Pure capital and reserve adequacy predicates.
//! - [`register`] -- The shareholder register used to route dividends.
//! - [`bank`] -- A commercial [`Bank`]: accounts, lending, servicing.
//! - [`central`] -- The [`CentralBank`]: base rate, system policy, and
//!   reserve lending to commercial banks.
//! - [`system`] -- The [`BankingSystem`]: every bank plus cross-bank
//!   settlement through reserves.
//!
//! # Refusals are not errors
//!
//! A declined loan comes back as [`LoanDecision::Refused`] carrying a
//! [`LoanRefusal`]; nothing is posted. [`BankError`] is reserved for
//! faults: unknown ids, failed postings and broken invariants.

pub mod bank;
pub mod central;
pub mod loan;
pub mod policy;
pub mod register;
pub mod system;

pub use bank::{Bank, BankSettings, DefaultPolicy, LoanRequest, ServiceReport};
pub use central::CentralBank;
pub use loan::{Loan, LoanState, LoanTerms, PaymentSplit, PeriodOutcome};
pub use policy::{BookFigures, Constraints, Policy};
pub use register::{Holding, ShareRegister};
pub use system::BankingSystem;

use rust_decimal::Decimal;
use threadneedle_ledger::LedgerError;
use threadneedle_types::{AccountId, AgentId, BankId, ContextError, LoanId, Money, RiskWeighting};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by bank operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BankError {
    /// No bank with this id.
    #[error("unknown bank {0}")]
    UnknownBank(BankId),

    /// No account with this id at the addressed bank.
    #[error("unknown account {0}")]
    UnknownAccount(AccountId),

    /// No active loan with this id.
    #[error("unknown loan {0}")]
    UnknownLoan(LoanId),

    /// The loan is not owed by the account that tried to pay it.
    #[error("loan {loan} is not owed by account {account}")]
    NotBorrower {
        /// The loan.
        loan: LoanId,
        /// The account that tried to pay.
        account: AccountId,
    },

    /// Amount must be strictly positive.
    #[error("amount must be positive, got {0}")]
    InvalidAmount(Money),

    /// The bank is restricted and refuses new business.
    #[error("bank {0} is restricted and accepts no new business")]
    Restricted(BankId),

    /// The paying bank cannot cover a cross-bank settlement from reserves.
    #[error("bank {bank} reserve shortfall: has {reserves}, needs {required}")]
    ReserveShortfall {
        /// The paying bank, now restricted.
        bank: BankId,
        /// Reserves on hand.
        reserves: Money,
        /// Amount the settlement required.
        required: Money,
    },

    /// Not enough authorised shares remain.
    #[error("only {available} authorised shares remain, {requested} requested")]
    SharesNotAuthorised {
        /// Shares requested.
        requested: u64,
        /// Shares still available.
        available: u64,
    },

    /// A holder tried to transfer more shares than held.
    #[error("{holder} holds {held} shares, cannot transfer {requested}")]
    InsufficientShares {
        /// The holder.
        holder: AgentId,
        /// Shares held.
        held: u64,
        /// Shares requested.
        requested: u64,
    },

    /// A posting failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Id allocation or step bookkeeping failed.
    #[error("context error: {0}")]
    Context(#[from] ContextError),
}

impl BankError {
    /// Whether the error signals a broken invariant that must abort the
    /// step, as opposed to an ordinary failure the caller can handle.
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Ledger(e) => e.is_fatal(),
            Self::Context(_) => true,
            _ => false,
        }
    }

    /// Whether the error is a plain shortage of deposit funds.
    pub const fn is_insufficient_funds(&self) -> bool {
        matches!(self, Self::Ledger(LedgerError::InsufficientFunds { .. }))
    }
}

// ---------------------------------------------------------------------------
// Loan decisions
// ---------------------------------------------------------------------------

/// Why a loan request was declined.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoanRefusal {
    /// Lending would push equity below the required share of risk-weighted
    /// assets.
    #[error("capital constraint: ratio after loan {ratio_after:?}, required {required_pct}%")]
    CapitalConstraint {
        /// Equity / risk-weighted assets after the loan.
        ratio_after: Option<Decimal>,
        /// Required percentage.
        required_pct: Decimal,
    },

    /// Lending would push reserves below the required share of deposits.
    #[error("reserve constraint: ratio after loan {ratio_after:?}, required {required_pct}%")]
    ReserveConstraint {
        /// Reserves / deposits after the loan.
        ratio_after: Option<Decimal>,
        /// Required percentage.
        required_pct: Decimal,
    },

    /// The borrower already has a loan outstanding in this bucket.
    #[error("account already has loan {existing} in bucket {bucket:?}")]
    DuplicateBucket {
        /// The bucket requested.
        bucket: RiskWeighting,
        /// The loan already there.
        existing: LoanId,
    },

    /// The lender is restricted.
    #[error("lender {0} is restricted")]
    Restricted(BankId),

    /// The requested terms are unusable.
    #[error("invalid loan terms: {reason}")]
    InvalidTerms {
        /// What is wrong.
        reason: String,
    },
}

/// Outcome of a loan request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoanDecision {
    /// The loan was issued and the principal disbursed.
    Approved(LoanId),
    /// Declined; nothing was posted.
    Refused(LoanRefusal),
}

impl LoanDecision {
    /// The issued loan, if approved.
    pub const fn loan(&self) -> Option<LoanId> {
        match self {
            Self::Approved(id) => Some(*id),
            Self::Refused(_) => None,
        }
    }
}
