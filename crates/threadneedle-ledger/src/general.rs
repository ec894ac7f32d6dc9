//! A bank's general ledger: asset, liability and equity ledgers plus an
//! append-only journal of postings.
//!
//! [`GeneralLedger::transfer`] is the only way balances change. It resolves
//! both legs and checks both balances before touching anything, so a failed
//! transfer posts nothing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use threadneedle_types::{AccountId, BankId, LedgerRef, LedgerType, Money, Posting};

use crate::balance::{verify_identity, BalanceResult};
use crate::{Ledger, LedgerError, TransactionBuilder};

/// Asset, liability and equity ledgers of one bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralLedger {
    owner: BankId,
    assets: BTreeMap<String, Ledger>,
    liabilities: BTreeMap<String, Ledger>,
    equities: BTreeMap<String, Ledger>,
    /// Postings are history, not state: a restored ledger starts with an
    /// empty journal.
    #[serde(skip)]
    journal: Vec<Posting>,
    #[serde(default)]
    next_seq: u64,
}

impl GeneralLedger {
    /// Create an empty general ledger owned by `owner`.
    pub const fn new(owner: BankId) -> Self {
        Self {
            owner,
            assets: BTreeMap::new(),
            liabilities: BTreeMap::new(),
            equities: BTreeMap::new(),
            journal: Vec::new(),
            next_seq: 0,
        }
    }

    /// Bank that owns these books.
    pub const fn owner(&self) -> BankId {
        self.owner
    }

    /// Register a ledger under its own name on the side given by its type.
    ///
    /// # Errors
    ///
    /// [`LedgerError::DuplicateLedger`] if the name is already used on any
    /// side.
    pub fn add_ledger(&mut self, ledger: Ledger) -> Result<(), LedgerError> {
        if self.ledger(ledger.name()).is_some() {
            return Err(LedgerError::DuplicateLedger(ledger.name().to_owned()));
        }
        let side = match ledger.ledger_type() {
            LedgerType::Asset => &mut self.assets,
            LedgerType::Liability => &mut self.liabilities,
            LedgerType::Equity => &mut self.equities,
        };
        side.insert(ledger.name().to_owned(), ledger);
        Ok(())
    }

    /// Look up a ledger by name on any side.
    pub fn ledger(&self, name: &str) -> Option<&Ledger> {
        self.assets
            .get(name)
            .or_else(|| self.liabilities.get(name))
            .or_else(|| self.equities.get(name))
    }

    fn ledger_mut(&mut self, name: &str) -> Option<&mut Ledger> {
        if let Some(l) = self.assets.get_mut(name) {
            return Some(l);
        }
        if let Some(l) = self.liabilities.get_mut(name) {
            return Some(l);
        }
        self.equities.get_mut(name)
    }

    fn resolve(&self, name: &str) -> Result<&Ledger, LedgerError> {
        self.ledger(name).ok_or_else(|| LedgerError::UnknownLedger {
            ledger: name.to_owned(),
            bank: self.owner,
        })
    }

    /// Create a zero balance for `at` if absent.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownLedger`] if the ledger does not exist.
    pub fn open(&mut self, at: &LedgerRef) -> Result<(), LedgerError> {
        let owner = self.owner;
        self.ledger_mut(&at.ledger)
            .ok_or_else(|| LedgerError::UnknownLedger {
                ledger: at.ledger.clone(),
                bank: owner,
            })?
            .open(at.account);
        Ok(())
    }

    /// Balance at `at`; zero for an account never posted to.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownLedger`] if the ledger does not exist.
    pub fn balance(&self, at: &LedgerRef) -> Result<Money, LedgerError> {
        Ok(self.resolve(&at.ledger)?.balance(at.account))
    }

    /// Cached total of one ledger.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownLedger`] if the ledger does not exist.
    pub fn ledger_total(&self, name: &str) -> Result<Money, LedgerError> {
        Ok(self.resolve(name)?.total())
    }

    /// Post a balanced debit/credit pair: debit `from`, credit `to`.
    ///
    /// Both ledgers are resolved and both new balances computed before
    /// either is written. On any error nothing is posted.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownLedger`] if either leg does not resolve,
    /// [`LedgerError::InsufficientFunds`] if a leg would go negative, and
    /// any validation error from [`TransactionBuilder::build`].
    pub fn transfer(
        &mut self,
        from: &LedgerRef,
        to: &LedgerRef,
        amount: Money,
        memo: &str,
        step: u64,
    ) -> Result<&Posting, LedgerError> {
        let posting = TransactionBuilder::new(self.next_seq, step)
            .from(from.clone())
            .to(to.clone())
            .amount(amount)
            .memo(memo)
            .build()?;

        let debit_ledger = self.resolve(&from.ledger)?;
        let credit_ledger = self.resolve(&to.ledger)?;
        let debit_delta = debit_ledger.debit_delta(amount);
        let credit_delta = credit_ledger.credit_delta(amount);
        // Legs name different balances (enforced by the builder), so each
        // can be checked on its own.
        debit_ledger.check(from.account, debit_delta)?;
        credit_ledger.check(to.account, credit_delta)?;

        self.apply_leg(&from.ledger, from.account, debit_delta)?;
        self.apply_leg(&to.ledger, to.account, credit_delta)?;

        trace!(
            bank = %self.owner,
            seq = posting.seq,
            from = %posting.from,
            to = %posting.to,
            amount = %posting.amount,
            memo = %posting.memo,
            "posting"
        );

        self.next_seq = self.next_seq.saturating_add(1);
        self.journal.push(posting);
        self.journal
            .last()
            .ok_or(LedgerError::Internal("journal empty after append"))
    }

    fn apply_leg(
        &mut self,
        name: &str,
        account: AccountId,
        delta: Money,
    ) -> Result<(), LedgerError> {
        let owner = self.owner;
        self.ledger_mut(name)
            .ok_or_else(|| LedgerError::UnknownLedger {
                ledger: name.to_owned(),
                bank: owner,
            })?
            .apply(account, delta)?;
        Ok(())
    }

    /// Sum of all asset ledger totals.
    pub fn total_assets(&self) -> Money {
        side_total(&self.assets)
    }

    /// Sum of all liability ledger totals.
    pub fn total_liabilities(&self) -> Money {
        side_total(&self.liabilities)
    }

    /// Sum of all equity ledger totals.
    pub fn total_equity(&self) -> Money {
        side_total(&self.equities)
    }

    /// Ledgers on one side of the balance sheet, in name order.
    pub fn side(&self, ledger_type: LedgerType) -> impl Iterator<Item = &Ledger> {
        match ledger_type {
            LedgerType::Asset => self.assets.values(),
            LedgerType::Liability => self.liabilities.values(),
            LedgerType::Equity => self.equities.values(),
        }
    }

    /// All postings made since this ledger was created or restored.
    pub fn journal(&self) -> &[Posting] {
        &self.journal
    }

    /// Postings made at `step`.
    pub fn postings_for_step(&self, step: u64) -> Vec<&Posting> {
        self.journal.iter().filter(|p| p.step == step).collect()
    }

    /// Sequence number the next posting will receive.
    pub const fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Check the accounting identity and every cached total.
    pub fn verify(&self, step: u64) -> BalanceResult {
        verify_identity(self, step)
    }
}

fn side_total(side: &BTreeMap<String, Ledger>) -> Money {
    side.values()
        .fold(Money::ZERO, |acc, l| acc.saturating_add(l.total()))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    const HOUSE: AccountId = AccountId(1);
    const ALICE: AccountId = AccountId(2);
    const BOB: AccountId = AccountId(3);

    fn books() -> GeneralLedger {
        let mut gl = GeneralLedger::new(BankId(9));
        for l in [
            Ledger::new("reserves", LedgerType::Asset),
            Ledger::new("loans", LedgerType::Asset),
            Ledger::new("deposits", LedgerType::Liability),
            Ledger::new("capital", LedgerType::Equity),
            Ledger::new("retained_earnings", LedgerType::Equity).allowing_negative(),
        ] {
            assert!(gl.add_ledger(l).is_ok());
        }
        gl
    }

    fn r(name: &str, account: AccountId) -> LedgerRef {
        LedgerRef::new(name, account)
    }

    fn identity_holds(gl: &GeneralLedger) -> bool {
        gl.total_assets() == gl.total_liabilities() + gl.total_equity()
    }

    #[test]
    fn print_money_grows_both_sides() {
        let mut gl = books();
        assert!(gl.transfer(&r("reserves", HOUSE), &r("deposits", ALICE), dec!(100), "print", 1).is_ok());
        assert!(gl.transfer(&r("reserves", HOUSE), &r("deposits", ALICE), dec!(100), "print", 1).is_ok());
        assert_eq!(gl.ledger_total("reserves").ok(), Some(dec!(200)));
        assert_eq!(gl.balance(&r("deposits", ALICE)).ok(), Some(dec!(200)));
        assert_eq!(gl.journal().len(), 2);
        assert!(identity_holds(&gl));
    }

    #[test]
    fn unknown_ledger_posts_nothing() {
        let mut gl = books();
        let result = gl.transfer(&r("reserves", HOUSE), &r("nowhere", ALICE), dec!(5), "bad", 1);
        assert!(matches!(result, Err(LedgerError::UnknownLedger { .. })));
        assert_eq!(gl.total_assets(), Money::ZERO);
        assert!(gl.journal().is_empty());
    }

    #[test]
    fn insufficient_funds_posts_nothing() {
        let mut gl = books();
        assert!(gl.transfer(&r("reserves", HOUSE), &r("deposits", ALICE), dec!(10), "seed", 1).is_ok());
        let result = gl.transfer(&r("deposits", ALICE), &r("deposits", BOB), dec!(11), "pay", 1);
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(gl.balance(&r("deposits", ALICE)).ok(), Some(dec!(10)));
        assert_eq!(gl.balance(&r("deposits", BOB)).ok(), Some(Money::ZERO));
        assert_eq!(gl.journal().len(), 1);
    }

    #[test]
    fn transfer_within_one_ledger_keeps_total() {
        let mut gl = books();
        assert!(gl.transfer(&r("reserves", HOUSE), &r("deposits", ALICE), dec!(10), "seed", 1).is_ok());
        assert!(gl.transfer(&r("deposits", ALICE), &r("deposits", BOB), dec!(4), "pay", 1).is_ok());
        assert_eq!(gl.ledger_total("deposits").ok(), Some(dec!(10)));
        assert_eq!(gl.balance(&r("deposits", BOB)).ok(), Some(dec!(4)));
        assert!(identity_holds(&gl));
    }

    #[test]
    fn write_off_may_drive_retained_earnings_negative() {
        let mut gl = books();
        assert!(gl.transfer(&r("loans", ALICE), &r("deposits", ALICE), dec!(50), "loan", 1).is_ok());
        assert!(gl.transfer(&r("retained_earnings", HOUSE), &r("loans", ALICE), dec!(50), "write-off", 2).is_ok());
        assert_eq!(gl.total_equity(), dec!(-50));
        assert!(identity_holds(&gl));
    }

    #[test]
    fn duplicate_ledger_rejected() {
        let mut gl = books();
        let result = gl.add_ledger(Ledger::new("deposits", LedgerType::Asset));
        assert!(matches!(result, Err(LedgerError::DuplicateLedger(_))));
    }

    #[test]
    fn postings_for_step_filters() {
        let mut gl = books();
        assert!(gl.transfer(&r("reserves", HOUSE), &r("deposits", ALICE), dec!(1), "a", 1).is_ok());
        assert!(gl.transfer(&r("reserves", HOUSE), &r("deposits", ALICE), dec!(1), "b", 2).is_ok());
        assert_eq!(gl.postings_for_step(2).len(), 1);
        assert_eq!(gl.next_seq(), 2);
    }

    #[test]
    fn serde_round_trip_drops_journal_keeps_balances() {
        let mut gl = books();
        assert!(gl.transfer(&r("reserves", HOUSE), &r("deposits", ALICE), dec!(30), "seed", 1).is_ok());
        let restored: Option<GeneralLedger> = serde_json::to_string(&gl)
            .ok()
            .and_then(|j| serde_json::from_str(&j).ok());
        assert!(restored.is_some());
        if let Some(back) = restored {
            assert!(back.journal().is_empty());
            assert_eq!(back.total_assets(), dec!(30));
            assert_eq!(back.next_seq(), 1);
            assert!(identity_holds(&back));
        }
    }
}
