//! A commercial bank.
//!
//! The bank owns a [`GeneralLedger`] with a fixed chart of accounts (see
//! [`ledgers`]), the customer [`Account`]s it holds, the [`Loan`]s it has
//! issued and its [`ShareRegister`].
//!
//! # Postings
//!
//! | Operation | Debit | Credit |
//! |-----------|-------|--------|
//! | Print money | reserves | deposits |
//! | Disburse loan | loans | deposits |
//! | Interest payment | deposits | interest income |
//! | Capital repayment | deposits | loans |
//! | Capitalise interest | loans | interest income |
//! | Write off | retained earnings | loans |
//! | Sell capital | deposits | capital |
//! | Close earnings | interest income | retained earnings |
//!
//! Every check that can refuse an operation runs before the first posting.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use threadneedle_ledger::{Account, BalanceResult, GeneralLedger, Ledger, LedgerAnomaly};
use threadneedle_types::{
    AccountId, AccountRef, AgentId, BankId, LedgerRef, LedgerType, LoanId, LoanKind, Money,
    PeriodUnit, RiskWeighting, SimContext,
};

use crate::loan::{Loan, LoanTerms, PaymentSplit, PeriodOutcome};
use crate::policy::{meets_capital, meets_reserve, BookFigures, Constraints, Policy};
use crate::register::ShareRegister;
use crate::{BankError, LoanDecision, LoanRefusal};

/// Names of the ledgers every bank keeps.
pub mod ledgers {
    /// Asset: reserves held against deposits.
    pub const RESERVES: &str = "reserves";
    /// Asset: capital outstanding on loans to customers.
    pub const LOANS: &str = "loans";
    /// Liability: customer deposits.
    pub const DEPOSITS: &str = "deposits";
    /// Liability: reserves borrowed from the central bank.
    pub const INTERBANK: &str = "interbank_borrowing";
    /// Equity: paid-in share capital.
    pub const CAPITAL: &str = "capital";
    /// Equity: interest earned since earnings were last closed.
    pub const INTEREST_INCOME: &str = "interest_income";
    /// Equity: accumulated earnings less write-offs and dividends. May go
    /// negative.
    pub const RETAINED_EARNINGS: &str = "retained_earnings";
}

// ---------------------------------------------------------------------------
// Settings and requests
// ---------------------------------------------------------------------------

/// What happens when a scheduled loan payment is not met in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPolicy {
    /// Shortfalls stay in arrears (capitalised for compound loans); write
    /// off only when the final period passes with capital outstanding.
    #[default]
    AtMaturity,
    /// Write off as soon as a due payment is missed.
    OnMissedPayment,
}

/// Construction parameters for a [`Bank`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankSettings {
    /// Display name.
    pub name: String,
    /// Margin over the base rate, in annual percentage points.
    pub interest_rate_delta: Decimal,
    /// Price of one share.
    pub share_price: Money,
    /// Shares the bank may issue at creation.
    pub authorised_shares: u64,
    /// Missed payment handling.
    pub default_policy: DefaultPolicy,
}

impl Default for BankSettings {
    fn default() -> Self {
        Self {
            name: "Bank".to_owned(),
            interest_rate_delta: Decimal::ONE,
            share_price: Decimal::TEN,
            authorised_shares: 10_000,
            default_policy: DefaultPolicy::AtMaturity,
        }
    }
}

/// Parameters of a loan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanRequest {
    /// Borrowing account; must be held at the lending bank.
    pub account: AccountId,
    /// Principal.
    pub amount: Money,
    /// Number of periods.
    pub duration: u32,
    /// Length of one period.
    pub period: PeriodUnit,
    /// Risk category and bucket.
    pub weighting: RiskWeighting,
    /// Interest convention.
    pub kind: LoanKind,
}

/// What one round of automatic servicing did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceReport {
    /// Interest collected.
    pub interest: Money,
    /// Capital collected.
    pub capital: Money,
    /// Interest added to outstanding capital.
    pub capitalised: Money,
    /// Loans closed by repayment.
    pub repaid: Vec<LoanId>,
    /// Loans written off, with the amount.
    pub defaulted: Vec<(LoanId, Money)>,
    /// Periods where less than the minimum payment was collected.
    pub shortfalls: u32,
}

impl ServiceReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.interest = self.interest.saturating_add(other.interest);
        self.capital = self.capital.saturating_add(other.capital);
        self.capitalised = self.capitalised.saturating_add(other.capitalised);
        self.repaid.extend(other.repaid);
        self.defaulted.extend(other.defaulted);
        self.shortfalls = self.shortfalls.saturating_add(other.shortfalls);
    }

    /// Total written off.
    pub fn written_off(&self) -> Money {
        self.defaulted
            .iter()
            .fold(Money::ZERO, |acc, (_, m)| acc.saturating_add(*m))
    }
}

// ---------------------------------------------------------------------------
// Bank
// ---------------------------------------------------------------------------

/// A commercial bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    /// Bank id.
    pub id: BankId,
    /// Display name.
    pub name: String,
    /// Account id the bank uses for its own balances.
    house: AccountId,
    gl: GeneralLedger,
    accounts: BTreeMap<AccountId, Account>,
    loans: BTreeMap<LoanId, Loan>,
    interest_rate_delta: Decimal,
    share_price: Money,
    register: ShareRegister,
    default_policy: DefaultPolicy,
    constraints: Constraints,
    restricted: bool,
}

impl Bank {
    /// Create a bank with an empty balance sheet.
    ///
    /// # Errors
    ///
    /// [`BankError::Context`] if ids cannot be issued.
    pub fn new(ctx: &mut SimContext, settings: BankSettings) -> Result<Self, BankError> {
        let id: BankId = ctx.issue()?;
        let house: AccountId = ctx.issue()?;
        Self::with_ids(id, house, settings)
    }

    /// Create a bank with given ids.
    ///
    /// # Errors
    ///
    /// [`BankError::Ledger`] if the chart of accounts cannot be built.
    pub fn with_ids(
        id: BankId,
        house: AccountId,
        settings: BankSettings,
    ) -> Result<Self, BankError> {
        let mut gl = GeneralLedger::new(id);
        gl.add_ledger(Ledger::new(ledgers::RESERVES, LedgerType::Asset))?;
        gl.add_ledger(Ledger::new(ledgers::LOANS, LedgerType::Asset))?;
        gl.add_ledger(Ledger::new(ledgers::DEPOSITS, LedgerType::Liability))?;
        gl.add_ledger(Ledger::new(ledgers::INTERBANK, LedgerType::Liability))?;
        gl.add_ledger(Ledger::new(ledgers::CAPITAL, LedgerType::Equity))?;
        gl.add_ledger(Ledger::new(ledgers::INTEREST_INCOME, LedgerType::Equity))?;
        gl.add_ledger(
            Ledger::new(ledgers::RETAINED_EARNINGS, LedgerType::Equity).allowing_negative(),
        )?;
        Ok(Self {
            id,
            name: settings.name,
            house,
            gl,
            accounts: BTreeMap::new(),
            loans: BTreeMap::new(),
            interest_rate_delta: settings.interest_rate_delta,
            share_price: settings.share_price,
            register: ShareRegister::new(settings.authorised_shares),
            default_policy: settings.default_policy,
            constraints: Constraints::default(),
            restricted: false,
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The bank's own account id.
    pub const fn house(&self) -> AccountId {
        self.house
    }

    /// The general ledger.
    pub const fn books(&self) -> &GeneralLedger {
        &self.gl
    }

    /// Customer account by id.
    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    /// Mutable customer account by id.
    pub fn account_mut(&mut self, id: AccountId) -> Option<&mut Account> {
        self.accounts.get_mut(&id)
    }

    /// All customer accounts.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    /// Active loan by id.
    pub fn loan(&self, id: LoanId) -> Option<&Loan> {
        self.loans.get(&id)
    }

    /// All active loans.
    pub fn loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values()
    }

    /// Current share price.
    pub const fn share_price(&self) -> Money {
        self.share_price
    }

    /// Set the share price.
    pub const fn set_share_price(&mut self, price: Money) {
        self.share_price = price;
    }

    /// Margin over the base rate.
    pub const fn interest_rate_delta(&self) -> Decimal {
        self.interest_rate_delta
    }

    /// Shareholder register.
    pub const fn register(&self) -> &ShareRegister {
        &self.register
    }

    /// Mutable shareholder register.
    pub const fn register_mut(&mut self) -> &mut ShareRegister {
        &mut self.register
    }

    /// Missed payment handling.
    pub const fn default_policy(&self) -> DefaultPolicy {
        self.default_policy
    }

    /// Constraints as of the last [`Bank::refresh_constraints`].
    pub const fn constraints(&self) -> Constraints {
        self.constraints
    }

    /// Whether the bank is in terminal wind-down.
    pub const fn is_restricted(&self) -> bool {
        self.restricted
    }

    /// Deposit balance of a customer account.
    pub fn deposit(&self, account: AccountId) -> Money {
        self.gl
            .ledger(ledgers::DEPOSITS)
            .map_or(Money::ZERO, |l| l.balance(account))
    }

    /// Reserves on hand.
    pub fn reserves(&self) -> Money {
        self.ledger_total(ledgers::RESERVES)
    }

    /// Cached total of one of the bank's ledgers; zero if unknown.
    pub fn ledger_total(&self, name: &str) -> Money {
        self.gl.ledger_total(name).unwrap_or(Money::ZERO)
    }

    /// Sum of all asset ledgers.
    pub fn total_assets(&self) -> Money {
        self.gl.total_assets()
    }

    /// Sum of all liability ledgers.
    pub fn total_liabilities(&self) -> Money {
        self.gl.total_liabilities()
    }

    /// Sum of all equity ledgers.
    pub fn total_equity(&self) -> Money {
        self.gl.total_equity()
    }

    /// Outstanding capital of every active loan times its risk weight.
    pub fn risk_weighted_assets(&self) -> Money {
        self.loans
            .values()
            .fold(Money::ZERO, |acc, l| acc.saturating_add(l.risk_weighted()))
    }

    /// The figures the adequacy predicates read.
    pub fn figures(&self) -> BookFigures {
        BookFigures {
            reserves: self.reserves(),
            deposits: self.ledger_total(ledgers::DEPOSITS),
            equity: self.total_equity(),
            risk_weighted: self.risk_weighted_assets(),
        }
    }

    /// Annual rate offered for `weighting`: base rate plus the bank's margin
    /// plus the category premium.
    pub fn request_interest_rate(&self, policy: &Policy, weighting: RiskWeighting) -> Decimal {
        policy
            .base_rate
            .saturating_add(self.interest_rate_delta)
            .saturating_add(weighting.premium())
    }

    // -----------------------------------------------------------------------
    // Postings
    // -----------------------------------------------------------------------

    fn at(&self, ledger: &str) -> LedgerRef {
        LedgerRef::new(ledger, self.house)
    }

    pub(crate) fn post(
        &mut self,
        from: &LedgerRef,
        to: &LedgerRef,
        amount: Money,
        memo: &str,
        step: u64,
    ) -> Result<(), BankError> {
        self.gl.transfer(from, to, amount, memo, step)?;
        Ok(())
    }

    fn require_account(&self, id: AccountId) -> Result<(), BankError> {
        if self.accounts.contains_key(&id) {
            Ok(())
        } else {
            Err(BankError::UnknownAccount(id))
        }
    }

    fn note_incoming(&mut self, id: AccountId, amount: Money) {
        if let Some(a) = self.accounts.get_mut(&id) {
            a.record_incoming(amount);
        }
    }

    fn note_outgoing(&mut self, id: AccountId, amount: Money) {
        if let Some(a) = self.accounts.get_mut(&id) {
            a.record_outgoing(amount);
        }
    }

    /// Open a deposit account for `owner`.
    ///
    /// # Errors
    ///
    /// [`BankError::Restricted`] if the bank is restricted,
    /// [`BankError::Context`] if no id can be issued.
    pub fn open_account(
        &mut self,
        ctx: &mut SimContext,
        owner: AgentId,
    ) -> Result<AccountId, BankError> {
        let id: AccountId = ctx.issue()?;
        self.adopt_account(Account::new(id, owner, self.id))?;
        Ok(id)
    }

    /// Register an account created elsewhere (e.g. by a restored snapshot).
    ///
    /// # Errors
    ///
    /// [`BankError::Restricted`] if the bank is restricted.
    pub fn adopt_account(&mut self, account: Account) -> Result<(), BankError> {
        if self.restricted {
            return Err(BankError::Restricted(self.id));
        }
        let mut account = account;
        account.bank = self.id;
        let id = account.id;
        self.gl.open(&LedgerRef::new(ledgers::DEPOSITS, id))?;
        debug!(bank = %self.id, account = %id, owner = %account.owner, "account opened");
        self.accounts.insert(id, account);
        Ok(())
    }

    /// Create new money: credit `account`'s deposit and the bank's reserves
    /// by `amount`. Repeated calls are separate postings.
    ///
    /// # Errors
    ///
    /// [`BankError::InvalidAmount`], [`BankError::UnknownAccount`], or
    /// [`BankError::Restricted`] since a restricted bank takes no new
    /// deposits.
    pub fn print_money(
        &mut self,
        step: u64,
        account: AccountId,
        amount: Money,
        memo: &str,
    ) -> Result<(), BankError> {
        if amount <= Money::ZERO {
            return Err(BankError::InvalidAmount(amount));
        }
        self.require_account(account)?;
        if self.restricted {
            return Err(BankError::Restricted(self.id));
        }
        let from = self.at(ledgers::RESERVES);
        self.post(&from, &LedgerRef::new(ledgers::DEPOSITS, account), amount, memo, step)?;
        self.note_incoming(account, amount);
        info!(bank = %self.id, account = %account, amount = %amount, memo, "money printed");
        Ok(())
    }

    /// Move deposit money between two accounts held at this bank.
    ///
    /// # Errors
    ///
    /// [`BankError::UnknownAccount`], or a ledger error if the payer is
    /// short.
    pub fn transfer_internal(
        &mut self,
        step: u64,
        from: AccountId,
        to: AccountId,
        amount: Money,
        memo: &str,
    ) -> Result<(), BankError> {
        if amount <= Money::ZERO {
            return Err(BankError::InvalidAmount(amount));
        }
        self.require_account(from)?;
        self.require_account(to)?;
        self.post(
            &LedgerRef::new(ledgers::DEPOSITS, from),
            &LedgerRef::new(ledgers::DEPOSITS, to),
            amount,
            memo,
            step,
        )?;
        self.note_outgoing(from, amount);
        self.note_incoming(to, amount);
        Ok(())
    }

    /// Pay `amount` out of a customer deposit to another bank: the deposit
    /// and the bank's reserves both shrink.
    pub(crate) fn send_out(
        &mut self,
        step: u64,
        from: AccountId,
        amount: Money,
        memo: &str,
    ) -> Result<(), BankError> {
        self.require_account(from)?;
        let to = self.at(ledgers::RESERVES);
        self.post(&LedgerRef::new(ledgers::DEPOSITS, from), &to, amount, memo, step)?;
        self.note_outgoing(from, amount);
        Ok(())
    }

    /// Receive `amount` from another bank into a customer deposit: the
    /// deposit and the bank's reserves both grow.
    pub(crate) fn receive_in(
        &mut self,
        step: u64,
        to: AccountId,
        amount: Money,
        memo: &str,
    ) -> Result<(), BankError> {
        self.require_account(to)?;
        let from = self.at(ledgers::RESERVES);
        self.post(&from, &LedgerRef::new(ledgers::DEPOSITS, to), amount, memo, step)?;
        self.note_incoming(to, amount);
        Ok(())
    }

    /// Pay `amount` from a house ledger (capital or earnings) to a customer
    /// deposit at this bank.
    pub(crate) fn pay_from_house(
        &mut self,
        step: u64,
        ledger: &str,
        to: AccountId,
        amount: Money,
        memo: &str,
    ) -> Result<(), BankError> {
        self.require_account(to)?;
        let from = self.at(ledger);
        self.post(&from, &LedgerRef::new(ledgers::DEPOSITS, to), amount, memo, step)?;
        self.note_incoming(to, amount);
        Ok(())
    }

    /// Pay `amount` from a house ledger to another bank through reserves.
    pub(crate) fn pay_from_house_out(
        &mut self,
        step: u64,
        ledger: &str,
        amount: Money,
        memo: &str,
    ) -> Result<(), BankError> {
        let from = self.at(ledger);
        let to = self.at(ledgers::RESERVES);
        self.post(&from, &to, amount, memo, step)
    }

    /// Receive `amount` into a house ledger, paid from a customer deposit
    /// here (`Some`) or from another bank through reserves (`None`).
    pub(crate) fn receive_into_house(
        &mut self,
        step: u64,
        ledger: &str,
        payer: Option<AccountId>,
        amount: Money,
        memo: &str,
    ) -> Result<(), BankError> {
        let from = match payer {
            Some(account) => {
                self.require_account(account)?;
                LedgerRef::new(ledgers::DEPOSITS, account)
            }
            None => self.at(ledgers::RESERVES),
        };
        let to = self.at(ledger);
        self.post(&from, &to, amount, memo, step)?;
        if let Some(account) = payer {
            self.note_outgoing(account, amount);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Constraints
    // -----------------------------------------------------------------------

    /// Re-evaluate the adequacy predicates against current books.
    pub fn refresh_constraints(&mut self, policy: &Policy) -> Constraints {
        let now = Constraints::evaluate(&self.figures(), policy);
        if now != self.constraints {
            info!(
                bank = %self.id,
                reserve = now.reserve,
                capital = now.capital,
                "bank constraint state changed"
            );
        }
        self.constraints = now;
        now
    }

    /// Enter terminal wind-down. Idempotent.
    pub fn restrict(&mut self, reason: &str) {
        if !self.restricted {
            warn!(bank = %self.id, name = %self.name, reason, "bank restricted");
        }
        self.restricted = true;
    }

    // -----------------------------------------------------------------------
    // Lending
    // -----------------------------------------------------------------------

    /// Decide on and, if approved, disburse a loan.
    ///
    /// Every refusal check runs against the books as they would be after
    /// disbursement, and before anything is posted.
    ///
    /// # Errors
    ///
    /// [`BankError::UnknownAccount`] if the borrower has no account here.
    /// Refusals are not errors; see [`LoanDecision::Refused`].
    pub fn request_loan(
        &mut self,
        ctx: &mut SimContext,
        policy: &Policy,
        req: LoanRequest,
    ) -> Result<LoanDecision, BankError> {
        let account = self
            .accounts
            .get(&req.account)
            .ok_or(BankError::UnknownAccount(req.account))?;

        if let Some(refusal) = self.screen(policy, account, &req) {
            warn!(
                bank = %self.id,
                account = %req.account,
                amount = %req.amount,
                reason = %refusal,
                "loan refused"
            );
            return Ok(LoanDecision::Refused(refusal));
        }

        let id: LoanId = ctx.issue()?;
        let terms = LoanTerms {
            principal: req.amount,
            annual_rate: self.request_interest_rate(policy, req.weighting),
            duration: req.duration,
            period: req.period,
            kind: req.kind,
            weighting: req.weighting,
        };
        let borrower = AccountRef {
            bank: self.id,
            account: req.account,
        };
        let loan = Loan::new(id, borrower, self.id, terms, ctx.step());

        self.post(
            &LedgerRef::new(ledgers::LOANS, req.account),
            &LedgerRef::new(ledgers::DEPOSITS, req.account),
            req.amount,
            "loan disbursement",
            ctx.step(),
        )?;
        if let Some(a) = self.accounts.get_mut(&req.account) {
            a.attach_loan(req.weighting, id);
            a.record_incoming(req.amount);
        }
        info!(
            bank = %self.id,
            loan = %id,
            account = %req.account,
            amount = %req.amount,
            rate = %terms.annual_rate,
            duration = req.duration,
            "loan issued"
        );
        self.loans.insert(id, loan);
        Ok(LoanDecision::Approved(id))
    }

    fn screen(
        &self,
        policy: &Policy,
        account: &Account,
        req: &LoanRequest,
    ) -> Option<LoanRefusal> {
        if self.restricted {
            return Some(LoanRefusal::Restricted(self.id));
        }
        if req.amount <= Money::ZERO {
            return Some(LoanRefusal::InvalidTerms {
                reason: format!("principal must be positive, got {}", req.amount),
            });
        }
        if req.duration == 0 {
            return Some(LoanRefusal::InvalidTerms {
                reason: "duration must be at least one period".to_owned(),
            });
        }
        if let Some(existing) = account.loan_in(req.weighting) {
            return Some(LoanRefusal::DuplicateBucket {
                bucket: req.weighting,
                existing,
            });
        }
        let after = self.figures().after_loan(req.amount, req.weighting.weight());
        if policy.enforce_capital && !meets_capital(&after, policy.capital_pct) {
            return Some(LoanRefusal::CapitalConstraint {
                ratio_after: after.capital_ratio(),
                required_pct: policy.capital_pct,
            });
        }
        if policy.enforce_reserve && !meets_reserve(&after, policy.reserve_pct) {
            return Some(LoanRefusal::ReserveConstraint {
                ratio_after: after.reserve_ratio(),
                required_pct: policy.reserve_pct,
            });
        }
        None
    }

    /// Post a payment split against a loan's borrower deposit.
    fn post_payment(
        &mut self,
        step: u64,
        loan: &Loan,
        split: PaymentSplit,
    ) -> Result<(), BankError> {
        let deposit = LedgerRef::new(ledgers::DEPOSITS, loan.borrower.account);
        if split.interest > Money::ZERO {
            let income = self.at(ledgers::INTEREST_INCOME);
            self.post(&deposit, &income, split.interest, "loan interest", step)?;
        }
        if split.capital > Money::ZERO {
            let loans = LedgerRef::new(ledgers::LOANS, loan.borrower.account);
            self.post(&deposit, &loans, split.capital, "loan capital", step)?;
        }
        self.note_outgoing(loan.borrower.account, split.total());
        Ok(())
    }

    fn close_loan(&mut self, id: LoanId) -> Option<Loan> {
        let loan = self.loans.remove(&id)?;
        if let Some(a) = self.accounts.get_mut(&loan.borrower.account) {
            a.detach_loan(id);
        }
        Some(loan)
    }

    /// Pay `amount` towards a loan from the borrower's deposit: interest due
    /// first, then capital. The loan closes when nothing is outstanding.
    ///
    /// # Errors
    ///
    /// [`BankError::UnknownLoan`], [`BankError::NotBorrower`],
    /// [`BankError::InvalidAmount`], or an insufficient funds ledger error
    /// if the deposit cannot cover `amount`. Nothing is posted on error.
    pub fn pay_loan(
        &mut self,
        step: u64,
        account: AccountId,
        loan_id: LoanId,
        amount: Money,
    ) -> Result<PaymentSplit, BankError> {
        if amount <= Money::ZERO {
            return Err(BankError::InvalidAmount(amount));
        }
        let loan = self.loans.get(&loan_id).ok_or(BankError::UnknownLoan(loan_id))?;
        if loan.borrower.account != account {
            return Err(BankError::NotBorrower {
                loan: loan_id,
                account,
            });
        }
        let balance = self.deposit(account);
        if balance < amount {
            return Err(threadneedle_ledger::LedgerError::InsufficientFunds {
                ledger: ledgers::DEPOSITS.to_owned(),
                account,
                balance,
                requested: amount,
            }
            .into());
        }

        let mut updated = loan.clone();
        let split = updated.apply_payment(amount);
        self.post_payment(step, &updated, split)?;
        let repaid = !updated.is_active();
        self.loans.insert(loan_id, updated);
        if repaid {
            self.close_loan(loan_id);
            info!(bank = %self.id, loan = %loan_id, "loan repaid early");
        }
        Ok(split)
    }

    /// Service every loan whose period closes at `step`: accrue interest,
    /// collect up to the minimum payment from the borrower's deposit, close
    /// the period, and write off defaults against retained earnings.
    ///
    /// # Errors
    ///
    /// Only fatal ledger errors; a borrower who cannot pay is a shortfall,
    /// not an error.
    pub fn service_loans(&mut self, step: u64) -> Result<ServiceReport, BankError> {
        let mut report = ServiceReport::default();
        let due: Vec<LoanId> = self
            .loans
            .values()
            .filter(|l| l.is_due(step))
            .map(|l| l.id)
            .collect();
        let default_on_shortfall = self.default_policy == DefaultPolicy::OnMissedPayment;

        for id in due {
            let Some(mut loan) = self.loans.get(&id).cloned() else {
                continue;
            };
            loan.accrue_interest();
            let required = loan.minimum_payment();
            let available = self.deposit(loan.borrower.account);
            let offered = required.min(available);
            let split = loan.apply_payment(offered);
            self.post_payment(step, &loan, split)?;
            report.interest = report.interest.saturating_add(split.interest);
            report.capital = report.capital.saturating_add(split.capital);
            if split.total() < required {
                report.shortfalls = report.shortfalls.saturating_add(1);
                debug!(
                    bank = %self.id,
                    loan = %id,
                    required = %required,
                    paid = %split.total(),
                    "loan payment short"
                );
            }

            let outcome = loan.end_period(split.total(), required, default_on_shortfall);
            let account = loan.borrower.account;
            self.loans.insert(id, loan);
            match outcome {
                PeriodOutcome::Continuing { capitalised } => {
                    self.capitalise(step, account, capitalised)?;
                    report.capitalised = report.capitalised.saturating_add(capitalised);
                }
                PeriodOutcome::Repaid => {
                    self.close_loan(id);
                    report.repaid.push(id);
                    debug!(bank = %self.id, loan = %id, "loan repaid");
                }
                PeriodOutcome::Defaulted {
                    write_off,
                    capitalised,
                } => {
                    self.capitalise(step, account, capitalised)?;
                    report.capitalised = report.capitalised.saturating_add(capitalised);
                    self.write_off(step, account, write_off)?;
                    self.close_loan(id);
                    report.defaulted.push((id, write_off));
                    warn!(
                        bank = %self.id,
                        loan = %id,
                        account = %account,
                        write_off = %write_off,
                        "loan defaulted"
                    );
                }
            }
        }
        Ok(report)
    }

    fn capitalise(
        &mut self,
        step: u64,
        account: AccountId,
        amount: Money,
    ) -> Result<(), BankError> {
        if amount <= Money::ZERO {
            return Ok(());
        }
        let income = self.at(ledgers::INTEREST_INCOME);
        self.post(
            &LedgerRef::new(ledgers::LOANS, account),
            &income,
            amount,
            "capitalised interest",
            step,
        )
    }

    fn write_off(
        &mut self,
        step: u64,
        account: AccountId,
        amount: Money,
    ) -> Result<(), BankError> {
        if amount <= Money::ZERO {
            return Ok(());
        }
        let earnings = self.at(ledgers::RETAINED_EARNINGS);
        self.post(
            &earnings,
            &LedgerRef::new(ledgers::LOANS, account),
            amount,
            "loan write-off",
            step,
        )
    }

    // -----------------------------------------------------------------------
    // Earnings
    // -----------------------------------------------------------------------

    /// Move accumulated interest income into retained earnings. Returns the
    /// amount moved.
    ///
    /// # Errors
    ///
    /// Only fatal ledger errors.
    pub fn close_earnings(&mut self, step: u64) -> Result<Money, BankError> {
        let income = self.ledger_total(ledgers::INTEREST_INCOME);
        if income <= Money::ZERO {
            return Ok(Money::ZERO);
        }
        let from = self.at(ledgers::INTEREST_INCOME);
        let to = self.at(ledgers::RETAINED_EARNINGS);
        self.post(&from, &to, income, "close earnings", step)?;
        debug!(bank = %self.id, amount = %income, "earnings closed");
        Ok(income)
    }

    /// Retained earnings available for dividends (never negative).
    pub fn distributable(&self) -> Money {
        self.ledger_total(ledgers::RETAINED_EARNINGS).max(Money::ZERO)
    }

    // -----------------------------------------------------------------------
    // Housekeeping
    // -----------------------------------------------------------------------

    /// Zero every account's per-step flow counters.
    pub fn reset_flows(&mut self) {
        for a in self.accounts.values_mut() {
            a.reset_flows();
        }
    }

    /// Verify the accounting identity and that the loans ledger agrees with
    /// the loan book.
    pub fn verify(&self, step: u64) -> BalanceResult {
        let result = self.gl.verify(step);
        if !result.is_balanced() {
            return result;
        }

        let mut book: BTreeMap<AccountId, Money> = BTreeMap::new();
        for loan in self.loans.values() {
            let entry = book.entry(loan.borrower.account).or_insert(Money::ZERO);
            *entry = entry.saturating_add(loan.outstanding());
        }
        let mut issues = Vec::new();
        if let Some(ledger) = self.gl.ledger(ledgers::LOANS) {
            for (account, balance) in ledger.balances() {
                let expected = book.remove(&account).unwrap_or(Money::ZERO);
                if balance != expected {
                    issues.push(format!(
                        "loans ledger shows {balance} for {account}, loan book {expected}"
                    ));
                }
            }
        }
        for (account, expected) in book {
            issues.push(format!("loan book shows {expected} for {account} with no ledger entry"));
        }

        if issues.is_empty() {
            BalanceResult::Balanced
        } else {
            let count = issues.len();
            BalanceResult::Anomaly(LedgerAnomaly {
                step,
                bank: self.id,
                assets: self.total_assets(),
                liabilities: self.total_liabilities(),
                equity: self.total_equity(),
                issues,
                message: format!(
                    "LEDGER_ANOMALY at step {step}: {count} loan book mismatch(es) at {}",
                    self.id
                ),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn setup() -> (SimContext, Bank, AccountId) {
        let mut ctx = SimContext::new(1);
        let mut bank = Bank::new(&mut ctx, BankSettings::default()).unwrap();
        let acct = bank.open_account(&mut ctx, AgentId(100)).unwrap();
        (ctx, bank, acct)
    }

    fn relaxed() -> Policy {
        Policy {
            enforce_capital: false,
            enforce_reserve: false,
            ..Policy::default()
        }
    }

    fn request(account: AccountId, amount: Money) -> LoanRequest {
        LoanRequest {
            account,
            amount,
            duration: 12,
            period: PeriodUnit::Month,
            weighting: RiskWeighting::Personal,
            kind: LoanKind::Compound,
        }
    }

    fn balanced(bank: &Bank) -> bool {
        bank.total_assets() == bank.total_liabilities() + bank.total_equity()
            && bank.verify(0).is_balanced()
    }

    #[test]
    fn print_money_twice_adds_two_hundred() {
        let (_, mut bank, acct) = setup();
        bank.print_money(1, acct, dec!(100), "grant").unwrap();
        bank.print_money(1, acct, dec!(100), "grant").unwrap();
        assert_eq!(bank.deposit(acct), dec!(200));
        assert_eq!(bank.reserves(), dec!(200));
        assert_eq!(bank.books().journal().len(), 2);
        assert!(balanced(&bank));
    }

    #[test]
    fn interest_rate_stacks_base_margin_and_premium() {
        let (_, bank, _) = setup();
        let rate = bank.request_interest_rate(&Policy::default(), RiskWeighting::Construction);
        // 5 base + 1 margin + 3 premium.
        assert_eq!(rate, dec!(9));
    }

    #[test]
    fn approved_loan_disburses_into_deposit() {
        let (mut ctx, mut bank, acct) = setup();
        let decision = bank.request_loan(&mut ctx, &relaxed(), request(acct, dec!(500))).unwrap();
        let id = decision.loan().unwrap();
        assert_eq!(bank.deposit(acct), dec!(500));
        assert_eq!(bank.ledger_total(ledgers::LOANS), dec!(500));
        assert_eq!(bank.account(acct).unwrap().loan_in(RiskWeighting::Personal), Some(id));
        assert!(balanced(&bank));
    }

    #[test]
    fn second_loan_in_same_bucket_refused_without_postings() {
        let (mut ctx, mut bank, acct) = setup();
        bank.request_loan(&mut ctx, &relaxed(), request(acct, dec!(100))).unwrap();
        let before = bank.books().journal().len();
        let decision = bank.request_loan(&mut ctx, &relaxed(), request(acct, dec!(100))).unwrap();
        assert!(matches!(decision, LoanDecision::Refused(LoanRefusal::DuplicateBucket { .. })));
        assert_eq!(bank.books().journal().len(), before);
    }

    #[test]
    fn capital_check_runs_before_disbursement() {
        let (mut ctx, mut bank, acct) = setup();
        let policy = Policy {
            enforce_reserve: false,
            ..Policy::default()
        };
        // No equity at all: any risk-weighted loan breaches 8%.
        let decision = bank.request_loan(&mut ctx, &policy, request(acct, dec!(100))).unwrap();
        assert!(matches!(decision, LoanDecision::Refused(LoanRefusal::CapitalConstraint { .. })));
        assert!(bank.books().journal().is_empty());
        assert_eq!(bank.loans().count(), 0);
    }

    #[test]
    fn reserve_threshold_is_checked_after_disbursement() {
        let (mut ctx, mut bank, acct) = setup();
        let policy = Policy {
            enforce_capital: false,
            ..Policy::default()
        };
        // 100 reserves against 1000 deposits: exactly 10%.
        bank.print_money(1, acct, dec!(100), "seed").unwrap();
        let other = bank.open_account(&mut ctx, AgentId(101)).unwrap();
        bank.post(
            &LedgerRef::new(ledgers::LOANS, other),
            &LedgerRef::new(ledgers::DEPOSITS, other),
            dec!(900),
            "setup",
            1,
        )
        .unwrap();
        assert!(meets_reserve(&bank.figures(), dec!(10)));
        let before = bank.books().journal().len();

        let decision = bank.request_loan(&mut ctx, &policy, request(acct, dec!(1))).unwrap();
        assert!(matches!(decision, LoanDecision::Refused(LoanRefusal::ReserveConstraint { .. })));
        assert_eq!(bank.books().journal().len(), before);
    }

    #[test]
    fn restricted_bank_refuses_loans_and_deposits() {
        let (mut ctx, mut bank, acct) = setup();
        bank.restrict("test");
        let decision = bank.request_loan(&mut ctx, &relaxed(), request(acct, dec!(10))).unwrap();
        assert!(matches!(decision, LoanDecision::Refused(LoanRefusal::Restricted(_))));
        assert!(matches!(bank.print_money(1, acct, dec!(1), "x"), Err(BankError::Restricted(_))));
        assert!(matches!(bank.open_account(&mut ctx, AgentId(5)), Err(BankError::Restricted(_))));
    }

    #[test]
    fn restricted_bank_keeps_servicing_its_loans() {
        let (mut ctx, mut bank, acct) = setup();
        let id = bank
            .request_loan(&mut ctx, &relaxed(), request(acct, dec!(1000)))
            .unwrap()
            .loan()
            .unwrap();
        bank.print_money(1, acct, dec!(200), "salary").unwrap();
        bank.restrict("missed settlement");
        let outstanding = bank.loan(id).unwrap().outstanding();

        let due = bank.loan(id).unwrap().next_due();
        let report = bank.service_loans(due).unwrap();
        assert!(report.interest > Money::ZERO);
        assert!(report.capital > Money::ZERO);
        assert_eq!(report.shortfalls, 0);
        assert_eq!(bank.loan(id).unwrap().outstanding(), outstanding - report.capital);
        assert_eq!(bank.ledger_total(ledgers::INTEREST_INCOME), report.interest);
        assert!(bank.is_restricted());
        assert!(balanced(&bank));

        // Early repayment is still accepted.
        let rest = bank.loan(id).unwrap().outstanding();
        bank.pay_loan(due, acct, id, rest).unwrap();
        assert!(bank.loan(id).is_none());
        assert!(balanced(&bank));
    }

    #[test]
    fn pay_loan_in_full_closes_it() {
        let (mut ctx, mut bank, acct) = setup();
        let id = bank
            .request_loan(&mut ctx, &relaxed(), request(acct, dec!(300)))
            .unwrap()
            .loan()
            .unwrap();
        let split = bank.pay_loan(2, acct, id, dec!(300)).unwrap();
        assert_eq!(split.capital, dec!(300));
        assert!(bank.loan(id).is_none());
        assert!(!bank.account(acct).unwrap().has_loan_in(RiskWeighting::Personal));
        assert!(balanced(&bank));
    }

    #[test]
    fn pay_loan_without_funds_posts_nothing() {
        let (mut ctx, mut bank, acct) = setup();
        let id = bank
            .request_loan(&mut ctx, &relaxed(), request(acct, dec!(50)))
            .unwrap()
            .loan()
            .unwrap();
        let before = bank.books().journal().len();
        let err = bank.pay_loan(2, acct, id, dec!(51)).unwrap_err();
        assert!(err.is_insufficient_funds());
        assert_eq!(bank.books().journal().len(), before);
    }

    #[test]
    fn unserviced_simple_loan_writes_off_outstanding_against_equity() {
        let (mut ctx, mut bank, acct) = setup();
        let req = LoanRequest {
            duration: 1,
            kind: LoanKind::Simple,
            ..request(acct, dec!(100))
        };
        let id = bank.request_loan(&mut ctx, &relaxed(), req).unwrap().loan().unwrap();
        // Borrower spends everything.
        let shop = bank.open_account(&mut ctx, AgentId(200)).unwrap();
        bank.transfer_internal(1, acct, shop, dec!(100), "spent").unwrap();
        let equity_before = bank.total_equity();

        let due = bank.loan(id).unwrap().next_due();
        let report = bank.service_loans(due).unwrap();
        assert_eq!(report.defaulted, vec![(id, dec!(100))]);
        assert_eq!(bank.total_equity(), equity_before - dec!(100));
        assert!(bank.loan(id).is_none());
        assert!(!bank.account(acct).unwrap().has_loan_in(RiskWeighting::Personal));
        assert!(balanced(&bank));
    }

    #[test]
    fn scheduled_servicing_repays_compound_loan() {
        let (mut ctx, mut bank, acct) = setup();
        let id = bank
            .request_loan(&mut ctx, &relaxed(), request(acct, dec!(1000)))
            .unwrap()
            .loan()
            .unwrap();
        // Enough extra deposit to cover all interest.
        bank.print_money(1, acct, dec!(200), "salary").unwrap();
        let mut repaid = false;
        for step in 2..=400 {
            let report = bank.service_loans(step).unwrap();
            assert!(balanced(&bank));
            if report.repaid.contains(&id) {
                repaid = true;
                break;
            }
        }
        assert!(repaid);
        assert_eq!(bank.ledger_total(ledgers::LOANS), Money::ZERO);
        assert!(bank.ledger_total(ledgers::INTEREST_INCOME) > Money::ZERO);
    }

    #[test]
    fn missed_payment_policy_writes_off_on_first_shortfall() {
        let mut ctx = SimContext::new(1);
        let settings = BankSettings {
            default_policy: DefaultPolicy::OnMissedPayment,
            ..BankSettings::default()
        };
        let mut bank = Bank::new(&mut ctx, settings).unwrap();
        let acct = bank.open_account(&mut ctx, AgentId(1)).unwrap();
        let id = bank
            .request_loan(&mut ctx, &relaxed(), request(acct, dec!(100)))
            .unwrap()
            .loan()
            .unwrap();
        let shop = bank.open_account(&mut ctx, AgentId(2)).unwrap();
        bank.transfer_internal(1, acct, shop, dec!(99), "spent").unwrap();
        let due = bank.loan(id).unwrap().next_due();
        let report = bank.service_loans(due).unwrap();
        assert_eq!(report.shortfalls, 1);
        assert_eq!(report.defaulted.len(), 1);
        assert!(balanced(&bank));
    }

    #[test]
    fn close_earnings_moves_income() {
        let (mut ctx, mut bank, acct) = setup();
        let id = bank
            .request_loan(&mut ctx, &relaxed(), request(acct, dec!(1000)))
            .unwrap()
            .loan()
            .unwrap();
        let due = bank.loan(id).unwrap().next_due();
        bank.service_loans(due).unwrap();
        let income = bank.ledger_total(ledgers::INTEREST_INCOME);
        assert!(income > Money::ZERO);
        assert_eq!(bank.close_earnings(due).unwrap(), income);
        assert_eq!(bank.distributable(), income);
        assert!(balanced(&bank));
    }

    #[test]
    fn constraint_flags_track_books() {
        let (_, mut bank, acct) = setup();
        bank.post(
            &LedgerRef::new(ledgers::LOANS, acct),
            &LedgerRef::new(ledgers::DEPOSITS, acct),
            dec!(100),
            "setup",
            1,
        )
        .unwrap();
        let c = bank.refresh_constraints(&Policy::default());
        assert!(c.reserve);
        assert_eq!(bank.constraints(), c);
    }
}
