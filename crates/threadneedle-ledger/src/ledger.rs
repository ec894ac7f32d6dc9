//! A single named ledger: one balance per account plus a cached total.
//!
//! # Design
//!
//! - **Cached total**: [`Ledger::total`] is O(1). The cache is updated on
//!   every posting and can be recomputed from scratch for verification.
//! - **No negative balances** unless the ledger is created with
//!   [`Ledger::allowing_negative`] (retained earnings absorb write-offs).
//! - **Precision**: all balances are [`Money`] -- no floating point.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use threadneedle_types::{AccountId, LedgerType, Money};

use crate::LedgerError;

/// Persisted form of a [`Ledger`]. The total is not stored; it is rebuilt
/// on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerState {
    name: String,
    ledger_type: LedgerType,
    #[serde(default)]
    allow_negative: bool,
    balances: BTreeMap<AccountId, Money>,
}

/// One named bucket of a general ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LedgerState", into = "LedgerState")]
pub struct Ledger {
    name: String,
    ledger_type: LedgerType,
    allow_negative: bool,
    balances: BTreeMap<AccountId, Money>,
    total: Money,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new(name: impl Into<String>, ledger_type: LedgerType) -> Self {
        Self {
            name: name.into(),
            ledger_type,
            allow_negative: false,
            balances: BTreeMap::new(),
            total: Money::ZERO,
        }
    }

    /// Permit balances in this ledger to go below zero.
    #[must_use]
    pub const fn allowing_negative(mut self) -> Self {
        self.allow_negative = true;
        self
    }

    /// Ledger name, e.g. `"deposits"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Balance sheet side of this ledger.
    pub const fn ledger_type(&self) -> LedgerType {
        self.ledger_type
    }

    /// Whether balances may be negative.
    pub const fn allows_negative(&self) -> bool {
        self.allow_negative
    }

    /// Sum of all balances, read from the cache.
    pub const fn total(&self) -> Money {
        self.total
    }

    /// Balance of one account; zero if the account has never been posted to.
    pub fn balance(&self, account: AccountId) -> Money {
        self.balances.get(&account).copied().unwrap_or(Money::ZERO)
    }

    /// Whether the account has an entry in this ledger.
    pub fn contains(&self, account: AccountId) -> bool {
        self.balances.contains_key(&account)
    }

    /// Iterate over `(account, balance)` pairs in account order.
    pub fn balances(&self) -> impl Iterator<Item = (AccountId, Money)> + '_ {
        self.balances.iter().map(|(k, v)| (*k, *v))
    }

    /// Number of accounts with an entry.
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    /// Whether no account has an entry.
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// Create a zero balance for `account` if absent.
    pub fn open(&mut self, account: AccountId) {
        self.balances.entry(account).or_insert(Money::ZERO);
    }

    /// Remove an account whose balance is zero. Returns `false` and keeps
    /// the entry if the balance is non-zero.
    pub fn close(&mut self, account: AccountId) -> bool {
        if self.balance(account).is_zero() {
            self.balances.remove(&account);
            true
        } else {
            false
        }
    }

    /// Signed change a debit of `amount` makes to a balance in this ledger.
    pub fn debit_delta(&self, amount: Money) -> Money {
        match self.ledger_type {
            LedgerType::Asset => amount,
            LedgerType::Liability | LedgerType::Equity => -amount,
        }
    }

    /// Signed change a credit of `amount` makes to a balance in this ledger.
    pub fn credit_delta(&self, amount: Money) -> Money {
        -self.debit_delta(amount)
    }

    /// Compute the balance and total that applying `delta` to `account`
    /// would produce, without changing anything.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientFunds`] if the balance would go negative in
    /// a ledger that forbids it, [`LedgerError::Overflow`] on overflow.
    pub fn check(&self, account: AccountId, delta: Money) -> Result<(Money, Money), LedgerError> {
        let balance = self.balance(account);
        let new_balance = balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::Overflow(self.name.clone()))?;
        if new_balance.is_sign_negative() && !new_balance.is_zero() && !self.allow_negative {
            return Err(LedgerError::InsufficientFunds {
                ledger: self.name.clone(),
                account,
                balance,
                requested: delta.abs(),
            });
        }
        let new_total = self
            .total
            .checked_add(delta)
            .ok_or_else(|| LedgerError::Overflow(self.name.clone()))?;
        Ok((new_balance, new_total))
    }

    /// Apply a signed change to one balance and the cached total.
    ///
    /// # Errors
    ///
    /// Same as [`Ledger::check`]; on error nothing is changed.
    pub fn apply(&mut self, account: AccountId, delta: Money) -> Result<Money, LedgerError> {
        let (new_balance, new_total) = self.check(account, delta)?;
        self.balances.insert(account, new_balance);
        self.total = new_total;
        Ok(new_balance)
    }

    /// Sum the balances from scratch, ignoring the cache.
    pub fn recompute_total(&self) -> Option<Money> {
        self.balances
            .values()
            .try_fold(Money::ZERO, |acc, b| acc.checked_add(*b))
    }

    /// Accounts whose balances are negative in a ledger that forbids it.
    pub fn negative_balances(&self) -> Vec<(AccountId, Money)> {
        if self.allow_negative {
            return Vec::new();
        }
        self.balances
            .iter()
            .filter(|(_, b)| b.is_sign_negative() && !b.is_zero())
            .map(|(a, b)| (*a, *b))
            .collect()
    }
}

impl From<LedgerState> for Ledger {
    fn from(state: LedgerState) -> Self {
        let mut ledger = Self {
            name: state.name,
            ledger_type: state.ledger_type,
            allow_negative: state.allow_negative,
            balances: state.balances,
            total: Money::ZERO,
        };
        // An overflowing total is left at zero; verification reports it.
        ledger.total = ledger.recompute_total().unwrap_or(Money::ZERO);
        ledger
    }
}

impl From<Ledger> for LedgerState {
    fn from(ledger: Ledger) -> Self {
        Self {
            name: ledger.name,
            ledger_type: ledger.ledger_type,
            allow_negative: ledger.allow_negative,
            balances: ledger.balances,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn deposits() -> Ledger {
        Ledger::new("deposits", LedgerType::Liability)
    }

    #[test]
    fn new_ledger_is_empty() {
        let l = deposits();
        assert!(l.is_empty());
        assert_eq!(l.total(), Money::ZERO);
        assert_eq!(l.balance(AccountId(1)), Money::ZERO);
    }

    #[test]
    fn apply_updates_balance_and_total() {
        let mut l = deposits();
        assert!(l.apply(AccountId(1), dec!(50)).is_ok());
        assert!(l.apply(AccountId(2), dec!(25.5)).is_ok());
        assert_eq!(l.balance(AccountId(1)), dec!(50));
        assert_eq!(l.total(), dec!(75.5));
        assert_eq!(l.recompute_total(), Some(dec!(75.5)));
    }

    #[test]
    fn overdraft_rejected_without_change() {
        let mut l = deposits();
        assert!(l.apply(AccountId(1), dec!(10)).is_ok());
        let result = l.apply(AccountId(1), dec!(-11));
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientFunds { requested, .. }) if requested == dec!(11)
        ));
        assert_eq!(l.balance(AccountId(1)), dec!(10));
        assert_eq!(l.total(), dec!(10));
    }

    #[test]
    fn negative_allowed_when_configured() {
        let mut l = Ledger::new("retained_earnings", LedgerType::Equity).allowing_negative();
        assert!(l.apply(AccountId(1), dec!(-30)).is_ok());
        assert_eq!(l.total(), dec!(-30));
        assert!(l.negative_balances().is_empty());
    }

    #[test]
    fn debit_and_credit_signs_follow_side() {
        let assets = Ledger::new("reserves", LedgerType::Asset);
        let liabilities = deposits();
        assert_eq!(assets.debit_delta(dec!(5)), dec!(5));
        assert_eq!(assets.credit_delta(dec!(5)), dec!(-5));
        assert_eq!(liabilities.debit_delta(dec!(5)), dec!(-5));
        assert_eq!(liabilities.credit_delta(dec!(5)), dec!(5));
    }

    #[test]
    fn close_only_removes_zero_balances() {
        let mut l = deposits();
        l.open(AccountId(1));
        assert!(l.apply(AccountId(2), dec!(1)).is_ok());
        assert!(l.close(AccountId(1)));
        assert!(!l.close(AccountId(2)));
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn deserialize_rebuilds_total() {
        let mut l = deposits();
        assert!(l.apply(AccountId(1), dec!(40)).is_ok());
        assert!(l.apply(AccountId(2), dec!(2)).is_ok());
        let json = serde_json::to_string(&l).ok();
        assert!(json.is_some());
        let restored: Option<Ledger> = json.and_then(|j| serde_json::from_str(&j).ok());
        assert_eq!(restored.map(|r| r.total()), Some(dec!(42)));
    }
}
