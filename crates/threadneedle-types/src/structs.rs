//! Small records shared between the ledger, bank and market crates.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, BankId};
use crate::Money;

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Address of one balance inside a bank's general ledger: the named ledger
/// (e.g. `"deposits"`) and the account id within it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedgerRef {
    /// Name of the ledger within the general ledger.
    pub ledger: String,
    /// Account within that ledger.
    pub account: AccountId,
}

impl LedgerRef {
    /// Build a reference from a ledger name and account id.
    pub fn new(ledger: impl Into<String>, account: AccountId) -> Self {
        Self {
            ledger: ledger.into(),
            account,
        }
    }
}

impl fmt::Display for LedgerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ledger, self.account)
    }
}

/// Address of a customer account anywhere in the banking system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountRef {
    /// Bank holding the account.
    pub bank: BankId,
    /// Account id at that bank.
    pub account: AccountId,
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bank, self.account)
    }
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// One balanced posting in a general ledger's journal.
///
/// `from` is the debited leg and `to` the credited leg. The amount is always
/// strictly positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Monotonic sequence number within the owning general ledger.
    pub seq: u64,
    /// Simulation step at which the posting was made.
    pub step: u64,
    /// Debited leg.
    pub from: LedgerRef,
    /// Credited leg.
    pub to: LedgerRef,
    /// Amount moved.
    pub amount: Money,
    /// Free-text description.
    pub memo: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_ref_display() {
        let r = LedgerRef::new("deposits", AccountId(3));
        assert_eq!(r.to_string(), "deposits/ACC-3");
    }

    #[test]
    fn account_ref_orders_by_bank_first() {
        let a = AccountRef {
            bank: BankId(1),
            account: AccountId(9),
        };
        let b = AccountRef {
            bank: BankId(2),
            account: AccountId(1),
        };
        assert!(a < b);
    }
}
