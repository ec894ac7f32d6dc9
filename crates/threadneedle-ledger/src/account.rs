//! Customer accounts.
//!
//! An [`Account`] is the bank-side record for one agent: who owns it, which
//! bank holds it, what flowed in and out during the current step, and which
//! debts are outstanding against it. The deposit balance itself lives in the
//! holding bank's `deposits` ledger, never on the account.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use threadneedle_types::{AccountId, AccountRef, AgentId, BankId, LoanId, Money, RiskWeighting};

/// Bank-side record of one agent's deposit account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account id, unique across banks.
    pub id: AccountId,
    /// Agent that owns the account.
    pub owner: AgentId,
    /// Bank that holds the account.
    pub bank: BankId,
    incoming: Money,
    outgoing: Money,
    /// One outstanding loan per risk bucket.
    loans: BTreeMap<RiskWeighting, LoanId>,
    /// Generic amounts owed to other accounts outside any loan contract.
    #[serde(with = "debt_list")]
    debts: BTreeMap<AccountRef, Money>,
}

impl Account {
    /// Create an account with no flows and no debts.
    pub const fn new(id: AccountId, owner: AgentId, bank: BankId) -> Self {
        Self {
            id,
            owner,
            bank,
            incoming: Money::ZERO,
            outgoing: Money::ZERO,
            loans: BTreeMap::new(),
            debts: BTreeMap::new(),
        }
    }

    /// System-wide address of this account.
    pub const fn address(&self) -> AccountRef {
        AccountRef {
            bank: self.bank,
            account: self.id,
        }
    }

    /// Money received during the current step.
    pub const fn incoming(&self) -> Money {
        self.incoming
    }

    /// Money paid out during the current step.
    pub const fn outgoing(&self) -> Money {
        self.outgoing
    }

    /// Count `amount` as received this step.
    pub fn record_incoming(&mut self, amount: Money) {
        self.incoming = self.incoming.saturating_add(amount);
    }

    /// Count `amount` as paid out this step.
    pub fn record_outgoing(&mut self, amount: Money) {
        self.outgoing = self.outgoing.saturating_add(amount);
    }

    /// Zero the per-step flow counters. Called at the step barrier.
    pub const fn reset_flows(&mut self) {
        self.incoming = Money::ZERO;
        self.outgoing = Money::ZERO;
    }

    // -----------------------------------------------------------------------
    // Loans
    // -----------------------------------------------------------------------

    /// Loan outstanding in `bucket`, if any.
    pub fn loan_in(&self, bucket: RiskWeighting) -> Option<LoanId> {
        self.loans.get(&bucket).copied()
    }

    /// Whether a loan is already outstanding in `bucket`.
    pub fn has_loan_in(&self, bucket: RiskWeighting) -> bool {
        self.loans.contains_key(&bucket)
    }

    /// Record a newly issued loan. Returns `false` if the bucket was taken.
    pub fn attach_loan(&mut self, bucket: RiskWeighting, loan: LoanId) -> bool {
        if self.loans.contains_key(&bucket) {
            return false;
        }
        self.loans.insert(bucket, loan);
        true
    }

    /// Forget a closed loan. Returns `true` if it was attached.
    pub fn detach_loan(&mut self, loan: LoanId) -> bool {
        let before = self.loans.len();
        self.loans.retain(|_, id| *id != loan);
        self.loans.len() != before
    }

    /// Outstanding loans by bucket.
    pub fn loans(&self) -> impl Iterator<Item = (RiskWeighting, LoanId)> + '_ {
        self.loans.iter().map(|(k, v)| (*k, *v))
    }

    // -----------------------------------------------------------------------
    // Generic debts
    // -----------------------------------------------------------------------

    /// Add `amount` to what this account owes `creditor`.
    pub fn add_debt(&mut self, creditor: AccountRef, amount: Money) {
        let owed = self.debts.entry(creditor).or_insert(Money::ZERO);
        *owed = owed.saturating_add(amount);
    }

    /// Reduce the debt to `creditor` by up to `amount`. Returns the amount
    /// actually settled.
    pub fn settle_debt(&mut self, creditor: AccountRef, amount: Money) -> Money {
        let Some(owed) = self.debts.get_mut(&creditor) else {
            return Money::ZERO;
        };
        let settled = amount.min(*owed);
        *owed = owed.saturating_sub(settled);
        if owed.is_zero() {
            self.debts.remove(&creditor);
        }
        settled
    }

    /// What this account owes `creditor`.
    pub fn debt_to(&self, creditor: AccountRef) -> Money {
        self.debts.get(&creditor).copied().unwrap_or(Money::ZERO)
    }

    /// Sum of all generic debts.
    pub fn total_debts(&self) -> Money {
        self.debts
            .values()
            .fold(Money::ZERO, |acc, d| acc.saturating_add(*d))
    }

    /// Generic debts by creditor.
    pub fn debts(&self) -> impl Iterator<Item = (AccountRef, Money)> + '_ {
        self.debts.iter().map(|(k, v)| (*k, *v))
    }
}

/// Debts keyed by a struct cannot be JSON object keys; persist them as a
/// list of pairs.
mod debt_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use threadneedle_types::{AccountRef, Money};

    pub fn serialize<S: Serializer>(
        debts: &BTreeMap<AccountRef, Money>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        s.collect_seq(debts.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<AccountRef, Money>, D::Error> {
        let pairs: Vec<(AccountRef, Money)> = Vec::deserialize(d)?;
        Ok(pairs.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn account() -> Account {
        Account::new(AccountId(5), AgentId(1), BankId(2))
    }

    #[test]
    fn flows_accumulate_and_reset() {
        let mut a = account();
        a.record_incoming(dec!(10));
        a.record_incoming(dec!(5));
        a.record_outgoing(dec!(3));
        assert_eq!(a.incoming(), dec!(15));
        assert_eq!(a.outgoing(), dec!(3));
        a.reset_flows();
        assert_eq!(a.incoming(), Money::ZERO);
        assert_eq!(a.outgoing(), Money::ZERO);
    }

    #[test]
    fn one_loan_per_bucket() {
        let mut a = account();
        assert!(a.attach_loan(RiskWeighting::Personal, LoanId(1)));
        assert!(!a.attach_loan(RiskWeighting::Personal, LoanId(2)));
        assert!(a.attach_loan(RiskWeighting::Mortgage, LoanId(3)));
        assert_eq!(a.loan_in(RiskWeighting::Personal), Some(LoanId(1)));
        assert!(a.detach_loan(LoanId(1)));
        assert!(!a.has_loan_in(RiskWeighting::Personal));
        assert!(!a.detach_loan(LoanId(1)));
    }

    #[test]
    fn debts_settle_partially() {
        let mut a = account();
        let creditor = AccountRef {
            bank: BankId(2),
            account: AccountId(9),
        };
        a.add_debt(creditor, dec!(30));
        assert_eq!(a.settle_debt(creditor, dec!(10)), dec!(10));
        assert_eq!(a.debt_to(creditor), dec!(20));
        assert_eq!(a.settle_debt(creditor, dec!(50)), dec!(20));
        assert_eq!(a.total_debts(), Money::ZERO);
        assert_eq!(a.debts().count(), 0);
    }

    #[test]
    fn debts_survive_json() {
        let mut a = account();
        let creditor = AccountRef {
            bank: BankId(3),
            account: AccountId(8),
        };
        a.add_debt(creditor, dec!(12.5));
        assert!(a.attach_loan(RiskWeighting::Business, LoanId(4)));
        let back: Option<Account> = serde_json::to_string(&a)
            .ok()
            .and_then(|j| serde_json::from_str(&j).ok());
        assert_eq!(back, Some(a));
    }

    #[test]
    fn address_points_at_holding_bank() {
        let a = account();
        assert_eq!(a.address().bank, BankId(2));
        assert_eq!(a.address().account, AccountId(5));
    }
}
