//! The central bank.
//!
//! Holds the system [`Policy`] (base rate, reserve and capital thresholds,
//! enforcement toggles) and lends reserves to commercial banks.
//!
//! The central bank keeps its own books:
//!
//! | Ledger | Side | Keyed by |
//! |--------|------|----------|
//! | `interbank_loans` | asset | borrowing bank's house account |
//! | `reserves_received` | asset | central bank house account |
//! | `reserves_issued` | liability | borrowing bank's house account |
//! | `interest_income` | equity | central bank house account |
//! | `retained_earnings` | equity | central bank house account |
//!
//! Issuing a loan creates reserves at the borrower and a matching claim
//! here. Repayments come back as received reserves.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use threadneedle_ledger::{BalanceResult, GeneralLedger, Ledger};
use threadneedle_types::{
    AccountId, AccountRef, BankId, LedgerRef, LedgerType, LoanId, LoanKind, Money, RiskWeighting,
    SimContext,
};

use crate::bank::{ledgers, Bank, ServiceReport};
use crate::loan::{Loan, LoanTerms, PaymentSplit, PeriodOutcome};
use crate::policy::Policy;
use crate::{BankError, LoanDecision, LoanRefusal};

const INTERBANK_LOANS: &str = "interbank_loans";
const RESERVES_RECEIVED: &str = "reserves_received";
const RESERVES_ISSUED: &str = "reserves_issued";

/// The system's central bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CentralBank {
    /// Central bank id.
    pub id: BankId,
    /// Display name.
    pub name: String,
    house: AccountId,
    policy: Policy,
    gl: GeneralLedger,
    loans: BTreeMap<LoanId, Loan>,
}

impl CentralBank {
    /// Create a central bank with the given policy.
    ///
    /// # Errors
    ///
    /// [`BankError::Context`] if ids cannot be issued.
    pub fn new(ctx: &mut SimContext, name: &str, policy: Policy) -> Result<Self, BankError> {
        let id: BankId = ctx.issue()?;
        let house: AccountId = ctx.issue()?;
        let mut gl = GeneralLedger::new(id);
        gl.add_ledger(Ledger::new(INTERBANK_LOANS, LedgerType::Asset))?;
        gl.add_ledger(Ledger::new(RESERVES_RECEIVED, LedgerType::Asset))?;
        gl.add_ledger(Ledger::new(RESERVES_ISSUED, LedgerType::Liability))?;
        gl.add_ledger(Ledger::new(ledgers::INTEREST_INCOME, LedgerType::Equity))?;
        gl.add_ledger(
            Ledger::new(ledgers::RETAINED_EARNINGS, LedgerType::Equity).allowing_negative(),
        )?;
        Ok(Self {
            id,
            name: name.to_owned(),
            house,
            policy,
            gl,
            loans: BTreeMap::new(),
        })
    }

    /// Current policy.
    pub const fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Mutable policy.
    pub const fn policy_mut(&mut self) -> &mut Policy {
        &mut self.policy
    }

    /// Current annual base rate in percent.
    pub const fn base_rate(&self) -> Decimal {
        self.policy.base_rate
    }

    /// Set the annual base rate in percent.
    pub fn set_base_rate(&mut self, rate: Decimal) {
        info!(old = %self.policy.base_rate, new = %rate, "base rate changed");
        self.policy.base_rate = rate;
    }

    /// The central bank's books.
    pub const fn books(&self) -> &GeneralLedger {
        &self.gl
    }

    /// Outstanding interbank loans.
    pub fn loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values()
    }

    /// Check the accounting identity of the central bank's books.
    pub fn verify(&self, step: u64) -> BalanceResult {
        self.gl.verify(step)
    }

    /// Lend `amount` of new reserves to `bank` for the policy's interbank
    /// term at the base rate.
    ///
    /// Refused if the bank is restricted or constrained, already owes the
    /// central bank, or the amount is not positive.
    ///
    /// # Errors
    ///
    /// Only id allocation and fatal ledger errors.
    pub fn lend(
        &mut self,
        ctx: &mut SimContext,
        bank: &mut Bank,
        amount: Money,
    ) -> Result<LoanDecision, BankError> {
        if let Some(refusal) = self.screen(bank, amount) {
            warn!(bank = %bank.id, amount = %amount, reason = %refusal, "interbank loan refused");
            return Ok(LoanDecision::Refused(refusal));
        }

        let id: LoanId = ctx.issue()?;
        let borrower = AccountRef {
            bank: bank.id,
            account: bank.house(),
        };
        let terms = LoanTerms {
            principal: amount,
            annual_rate: self.policy.base_rate,
            duration: self.policy.interbank_duration,
            period: self.policy.interbank_period,
            kind: LoanKind::Compound,
            weighting: RiskWeighting::Interbank,
        };
        let step = ctx.step();

        self.gl.transfer(
            &LedgerRef::new(INTERBANK_LOANS, bank.house()),
            &LedgerRef::new(RESERVES_ISSUED, bank.house()),
            amount,
            "interbank loan",
            step,
        )?;
        bank.post(
            &LedgerRef::new(ledgers::RESERVES, bank.house()),
            &LedgerRef::new(ledgers::INTERBANK, bank.house()),
            amount,
            "central bank loan",
            step,
        )?;

        info!(bank = %bank.id, loan = %id, amount = %amount, "interbank loan issued");
        self.loans.insert(id, Loan::new(id, borrower, self.id, terms, step));
        Ok(LoanDecision::Approved(id))
    }

    fn screen(&self, bank: &mut Bank, amount: Money) -> Option<LoanRefusal> {
        if bank.is_restricted() {
            return Some(LoanRefusal::Restricted(bank.id));
        }
        if amount <= Money::ZERO {
            return Some(LoanRefusal::InvalidTerms {
                reason: format!("amount must be positive, got {amount}"),
            });
        }
        if self.policy.interbank_duration == 0 {
            return Some(LoanRefusal::InvalidTerms {
                reason: "interbank duration is zero".to_owned(),
            });
        }
        if let Some(existing) = self.loans.values().find(|l| l.borrower.bank == bank.id) {
            return Some(LoanRefusal::DuplicateBucket {
                bucket: RiskWeighting::Interbank,
                existing: existing.id,
            });
        }
        let constraints = bank.refresh_constraints(&self.policy);
        let figures = bank.figures();
        if constraints.capital {
            return Some(LoanRefusal::CapitalConstraint {
                ratio_after: figures.capital_ratio(),
                required_pct: self.policy.capital_pct,
            });
        }
        if constraints.reserve {
            return Some(LoanRefusal::ReserveConstraint {
                ratio_after: figures.reserve_ratio(),
                required_pct: self.policy.reserve_pct,
            });
        }
        None
    }

    /// Service interbank loans due at `step`, collecting from each
    /// borrower's reserves. A bank that cannot meet its payment in full is
    /// restricted.
    ///
    /// # Errors
    ///
    /// Only fatal ledger errors.
    pub fn service(
        &mut self,
        step: u64,
        banks: &mut BTreeMap<BankId, Bank>,
    ) -> Result<ServiceReport, BankError> {
        let mut report = ServiceReport::default();
        let due: Vec<LoanId> = self
            .loans
            .values()
            .filter(|l| l.is_due(step))
            .map(|l| l.id)
            .collect();

        for id in due {
            let Some(mut loan) = self.loans.get(&id).cloned() else {
                continue;
            };
            let Some(bank) = banks.get_mut(&loan.borrower.bank) else {
                continue;
            };
            loan.accrue_interest();
            let required = loan.minimum_payment();
            let offered = required.min(bank.reserves());
            let split = loan.apply_payment(offered);
            self.collect(step, bank, split)?;
            report.interest = report.interest.saturating_add(split.interest);
            report.capital = report.capital.saturating_add(split.capital);
            if split.total() < required {
                report.shortfalls = report.shortfalls.saturating_add(1);
                bank.restrict("missed central bank repayment");
            }

            let outcome = loan.end_period(split.total(), required, false);
            let house = loan.borrower.account;
            self.loans.insert(id, loan);
            match outcome {
                PeriodOutcome::Continuing { capitalised } => {
                    self.capitalise(step, bank, house, capitalised)?;
                    report.capitalised = report.capitalised.saturating_add(capitalised);
                }
                PeriodOutcome::Repaid => {
                    self.loans.remove(&id);
                    report.repaid.push(id);
                    info!(bank = %bank.id, loan = %id, "interbank loan repaid");
                }
                PeriodOutcome::Defaulted {
                    write_off,
                    capitalised,
                } => {
                    self.capitalise(step, bank, house, capitalised)?;
                    report.capitalised = report.capitalised.saturating_add(capitalised);
                    self.forgive(step, bank, house, write_off)?;
                    self.loans.remove(&id);
                    report.defaulted.push((id, write_off));
                    warn!(
                        bank = %bank.id,
                        loan = %id,
                        write_off = %write_off,
                        "interbank loan defaulted"
                    );
                }
            }
        }
        Ok(report)
    }

    /// Post a repayment on both sets of books.
    fn collect(
        &mut self,
        step: u64,
        bank: &mut Bank,
        split: PaymentSplit,
    ) -> Result<(), BankError> {
        let house = bank.house();
        let reserves = LedgerRef::new(ledgers::RESERVES, house);
        let received = LedgerRef::new(RESERVES_RECEIVED, self.house);
        if split.interest > Money::ZERO {
            bank.post(
                &LedgerRef::new(ledgers::RETAINED_EARNINGS, house),
                &reserves,
                split.interest,
                "interbank interest",
                step,
            )?;
            self.gl.transfer(
                &received,
                &LedgerRef::new(ledgers::INTEREST_INCOME, self.house),
                split.interest,
                "interbank interest",
                step,
            )?;
        }
        if split.capital > Money::ZERO {
            bank.post(
                &LedgerRef::new(ledgers::INTERBANK, house),
                &reserves,
                split.capital,
                "interbank capital",
                step,
            )?;
            self.gl.transfer(
                &received,
                &LedgerRef::new(INTERBANK_LOANS, house),
                split.capital,
                "interbank capital",
                step,
            )?;
        }
        Ok(())
    }

    /// Add unpaid interest to the loan on both sets of books.
    fn capitalise(
        &mut self,
        step: u64,
        bank: &mut Bank,
        house: AccountId,
        amount: Money,
    ) -> Result<(), BankError> {
        if amount <= Money::ZERO {
            return Ok(());
        }
        bank.post(
            &LedgerRef::new(ledgers::RETAINED_EARNINGS, house),
            &LedgerRef::new(ledgers::INTERBANK, house),
            amount,
            "capitalised interbank interest",
            step,
        )?;
        self.gl.transfer(
            &LedgerRef::new(INTERBANK_LOANS, house),
            &LedgerRef::new(ledgers::INTEREST_INCOME, self.house),
            amount,
            "capitalised interbank interest",
            step,
        )?;
        Ok(())
    }

    /// Write off a defaulted loan here and release the borrower from it.
    fn forgive(
        &mut self,
        step: u64,
        bank: &mut Bank,
        house: AccountId,
        amount: Money,
    ) -> Result<(), BankError> {
        if amount <= Money::ZERO {
            return Ok(());
        }
        self.gl.transfer(
            &LedgerRef::new(ledgers::RETAINED_EARNINGS, self.house),
            &LedgerRef::new(INTERBANK_LOANS, house),
            amount,
            "interbank write-off",
            step,
        )?;
        bank.post(
            &LedgerRef::new(ledgers::INTERBANK, house),
            &LedgerRef::new(ledgers::RETAINED_EARNINGS, house),
            amount,
            "interbank debt forgiven",
            step,
        )?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;
    use threadneedle_types::{AgentId, PeriodUnit};

    use super::*;
    use crate::bank::BankSettings;

    fn setup() -> (SimContext, CentralBank, BTreeMap<BankId, Bank>, BankId) {
        let mut ctx = SimContext::new(3);
        let policy = Policy {
            interbank_duration: 2,
            interbank_period: PeriodUnit::Month,
            ..Policy::default()
        };
        let central = CentralBank::new(&mut ctx, "Central", policy).unwrap();
        let mut bank = Bank::new(&mut ctx, BankSettings::default()).unwrap();
        let acct = bank.open_account(&mut ctx, AgentId(9)).unwrap();
        bank.print_money(1, acct, dec!(100), "seed").unwrap();
        let id = bank.id;
        let mut banks = BTreeMap::new();
        banks.insert(id, bank);
        (ctx, central, banks, id)
    }

    fn identity(bank: &Bank, central: &CentralBank) -> bool {
        bank.verify(0).is_balanced() && central.verify(0).is_balanced()
    }

    #[test]
    fn lending_creates_reserves_and_matching_claim() {
        let (mut ctx, mut central, mut banks, id) = setup();
        let bank = banks.get_mut(&id).unwrap();
        let decision = central.lend(&mut ctx, bank, dec!(50)).unwrap();
        assert!(decision.loan().is_some());
        assert_eq!(bank.reserves(), dec!(150));
        assert_eq!(bank.ledger_total(ledgers::INTERBANK), dec!(50));
        assert_eq!(central.books().ledger_total(INTERBANK_LOANS).ok(), Some(dec!(50)));
        assert!(identity(bank, &central));
    }

    #[test]
    fn second_interbank_loan_refused() {
        let (mut ctx, mut central, mut banks, id) = setup();
        let bank = banks.get_mut(&id).unwrap();
        central.lend(&mut ctx, bank, dec!(10)).unwrap();
        let again = central.lend(&mut ctx, bank, dec!(10)).unwrap();
        assert!(matches!(again, LoanDecision::Refused(LoanRefusal::DuplicateBucket { .. })));
    }

    #[test]
    fn restricted_bank_cannot_borrow() {
        let (mut ctx, mut central, mut banks, id) = setup();
        let bank = banks.get_mut(&id).unwrap();
        bank.restrict("test");
        let d = central.lend(&mut ctx, bank, dec!(10)).unwrap();
        assert!(matches!(d, LoanDecision::Refused(LoanRefusal::Restricted(_))));
    }

    #[test]
    fn interbank_loan_is_repaid_from_reserves() {
        let (mut ctx, mut central, mut banks, id) = setup();
        central.lend(&mut ctx, banks.get_mut(&id).unwrap(), dec!(50)).unwrap();
        let mut report = ServiceReport::default();
        for step in 2..=61 {
            report.merge(central.service(step, &mut banks).unwrap());
        }
        assert_eq!(report.repaid.len(), 1);
        assert_eq!(central.loans().count(), 0);
        let bank = banks.get(&id).unwrap();
        assert_eq!(bank.ledger_total(ledgers::INTERBANK), Money::ZERO);
        assert!(!bank.is_restricted());
        assert!(central.books().ledger_total(ledgers::INTEREST_INCOME).unwrap() > Money::ZERO);
        assert!(identity(bank, &central));
    }
}
