//! The banking system: every commercial bank plus the central bank.
//!
//! Agents address accounts with an [`AccountRef`]. A payment between two
//! accounts at the same bank is a single deposit-to-deposit posting. A
//! payment across banks shrinks the payer's deposit and its bank's
//! reserves, then grows the payee's deposit and its bank's reserves. If the
//! paying bank cannot cover the settlement from reserves it has failed a
//! contractual obligation and is restricted.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use threadneedle_ledger::{Account, BalanceResult, LedgerAnomaly, LedgerError};
use threadneedle_types::{
    AccountId, AccountRef, AgentId, BankId, LoanId, Money, RiskWeighting, SimContext,
};

use crate::bank::{ledgers, Bank, BankSettings, LoanRequest, ServiceReport};
use crate::central::CentralBank;
use crate::loan::PaymentSplit;
use crate::policy::Policy;
use crate::{BankError, LoanDecision};

/// All banks in one economy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankingSystem {
    central: CentralBank,
    banks: BTreeMap<BankId, Bank>,
    directory: BTreeMap<AccountId, BankId>,
}

impl BankingSystem {
    /// A system with only a central bank.
    pub const fn new(central: CentralBank) -> Self {
        Self {
            central,
            banks: BTreeMap::new(),
            directory: BTreeMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Banks
    // -----------------------------------------------------------------------

    /// The central bank.
    pub const fn central(&self) -> &CentralBank {
        &self.central
    }

    /// Mutable central bank.
    pub const fn central_mut(&mut self) -> &mut CentralBank {
        &mut self.central
    }

    /// Current system policy.
    pub const fn policy(&self) -> &Policy {
        self.central.policy()
    }

    /// Create and register a commercial bank.
    ///
    /// # Errors
    ///
    /// [`BankError::Context`] if ids cannot be issued.
    pub fn create_bank(
        &mut self,
        ctx: &mut SimContext,
        settings: BankSettings,
    ) -> Result<BankId, BankError> {
        let bank = Bank::new(ctx, settings)?;
        Ok(self.add_bank(bank))
    }

    /// Register an existing bank and index its accounts.
    pub fn add_bank(&mut self, bank: Bank) -> BankId {
        let id = bank.id;
        for a in bank.accounts() {
            self.directory.insert(a.id, id);
        }
        info!(bank = %id, name = %bank.name, "bank registered");
        self.banks.insert(id, bank);
        id
    }

    /// Bank by id.
    pub fn bank(&self, id: BankId) -> Option<&Bank> {
        self.banks.get(&id)
    }

    /// Mutable bank by id.
    pub fn bank_mut(&mut self, id: BankId) -> Option<&mut Bank> {
        self.banks.get_mut(&id)
    }

    /// Bank by display name.
    pub fn bank_by_name(&self, name: &str) -> Option<&Bank> {
        self.banks.values().find(|b| b.name == name)
    }

    /// All commercial banks in id order.
    pub fn banks(&self) -> impl Iterator<Item = &Bank> {
        self.banks.values()
    }

    fn get(&self, id: BankId) -> Result<&Bank, BankError> {
        self.banks.get(&id).ok_or(BankError::UnknownBank(id))
    }

    fn get_mut(&mut self, id: BankId) -> Result<&mut Bank, BankError> {
        self.banks.get_mut(&id).ok_or(BankError::UnknownBank(id))
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    /// Open an account for `owner` at `bank`.
    ///
    /// # Errors
    ///
    /// [`BankError::UnknownBank`], or [`BankError::Restricted`] if the bank
    /// takes no new deposits.
    pub fn open_account(
        &mut self,
        ctx: &mut SimContext,
        bank: BankId,
        owner: AgentId,
    ) -> Result<AccountRef, BankError> {
        let account = self.get_mut(bank)?.open_account(ctx, owner)?;
        self.directory.insert(account, bank);
        Ok(AccountRef { bank, account })
    }

    /// Register a restored account with its bank.
    ///
    /// # Errors
    ///
    /// [`BankError::UnknownBank`] or [`BankError::Restricted`].
    pub fn adopt_account(&mut self, account: Account) -> Result<AccountRef, BankError> {
        let address = account.address();
        self.get_mut(address.bank)?.adopt_account(account)?;
        self.directory.insert(address.account, address.bank);
        Ok(address)
    }

    /// Find which bank holds `account`.
    pub fn locate(&self, account: AccountId) -> Option<AccountRef> {
        self.directory
            .get(&account)
            .map(|bank| AccountRef { bank: *bank, account })
    }

    /// The bank-side record of an account.
    pub fn account(&self, at: AccountRef) -> Option<&Account> {
        self.banks.get(&at.bank)?.account(at.account)
    }

    /// Deposit balance of an account; zero if unknown.
    pub fn deposit(&self, at: AccountRef) -> Money {
        self.banks
            .get(&at.bank)
            .map_or(Money::ZERO, |b| b.deposit(at.account))
    }

    fn require(&self, at: AccountRef) -> Result<(), BankError> {
        if self.account(at).is_some() {
            Ok(())
        } else {
            Err(BankError::UnknownAccount(at.account))
        }
    }

    // -----------------------------------------------------------------------
    // Money movement
    // -----------------------------------------------------------------------

    /// Create `amount` of new money in `account`.
    ///
    /// # Errors
    ///
    /// See [`Bank::print_money`].
    pub fn print_money(
        &mut self,
        step: u64,
        account: AccountRef,
        amount: Money,
        memo: &str,
    ) -> Result<(), BankError> {
        self.get_mut(account.bank)?
            .print_money(step, account.account, amount, memo)
    }

    /// Pay `amount` from one account to another, settling through reserves
    /// when they are held at different banks.
    ///
    /// # Errors
    ///
    /// Unknown banks or accounts, an insufficient funds ledger error if the
    /// payer is short (nothing posted), or [`BankError::ReserveShortfall`]
    /// if the paying bank cannot settle (the bank is restricted, nothing
    /// posted).
    pub fn pay(
        &mut self,
        step: u64,
        from: AccountRef,
        to: AccountRef,
        amount: Money,
        memo: &str,
    ) -> Result<(), BankError> {
        if amount <= Money::ZERO {
            return Err(BankError::InvalidAmount(amount));
        }
        if from.bank == to.bank {
            return self
                .get_mut(from.bank)?
                .transfer_internal(step, from.account, to.account, amount, memo);
        }

        self.require(from)?;
        self.require(to)?;
        let payer = self.get(from.bank)?;
        let balance = payer.deposit(from.account);
        if balance < amount {
            return Err(LedgerError::InsufficientFunds {
                ledger: ledgers::DEPOSITS.to_owned(),
                account: from.account,
                balance,
                requested: amount,
            }
            .into());
        }
        self.settle_out(from.bank, amount)?;

        self.get_mut(from.bank)?
            .send_out(step, from.account, amount, memo)?;
        self.get_mut(to.bank)?
            .receive_in(step, to.account, amount, memo)?;
        debug!(from = %from, to = %to, amount = %amount, memo, "cross-bank payment");
        Ok(())
    }

    /// Check that `bank` can pay `amount` out of reserves; restrict it if
    /// not.
    fn settle_out(&mut self, bank: BankId, amount: Money) -> Result<(), BankError> {
        let payer = self.get_mut(bank)?;
        let reserves = payer.reserves();
        if reserves < amount {
            payer.restrict("reserve shortfall on settlement");
            return Err(BankError::ReserveShortfall {
                bank,
                reserves,
                required: amount,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lending
    // -----------------------------------------------------------------------

    /// Annual rate `bank` offers for `weighting`.
    ///
    /// # Errors
    ///
    /// [`BankError::UnknownBank`].
    pub fn request_interest_rate(
        &self,
        bank: BankId,
        weighting: RiskWeighting,
    ) -> Result<Decimal, BankError> {
        Ok(self
            .get(bank)?
            .request_interest_rate(self.central.policy(), weighting))
    }

    /// Ask the bank holding `req.account` for a loan.
    ///
    /// # Errors
    ///
    /// See [`Bank::request_loan`].
    pub fn request_loan(
        &mut self,
        ctx: &mut SimContext,
        bank: BankId,
        req: LoanRequest,
    ) -> Result<LoanDecision, BankError> {
        let policy = *self.central.policy();
        self.get_mut(bank)?.request_loan(ctx, &policy, req)
    }

    /// Pay towards a loan from the borrower's deposit.
    ///
    /// # Errors
    ///
    /// See [`Bank::pay_loan`].
    pub fn pay_loan(
        &mut self,
        step: u64,
        account: AccountRef,
        loan: LoanId,
        amount: Money,
    ) -> Result<PaymentSplit, BankError> {
        self.get_mut(account.bank)?
            .pay_loan(step, account.account, loan, amount)
    }

    /// Borrow reserves for `bank` from the central bank.
    ///
    /// # Errors
    ///
    /// See [`CentralBank::lend`].
    pub fn borrow_from_central(
        &mut self,
        ctx: &mut SimContext,
        bank: BankId,
        amount: Money,
    ) -> Result<LoanDecision, BankError> {
        let borrower = self.banks.get_mut(&bank).ok_or(BankError::UnknownBank(bank))?;
        self.central.lend(ctx, borrower, amount)
    }

    // -----------------------------------------------------------------------
    // Capital
    // -----------------------------------------------------------------------

    /// Raise the number of shares `bank` may issue.
    ///
    /// # Errors
    ///
    /// [`BankError::UnknownBank`].
    pub fn authorise_shares(&mut self, bank: BankId, units: u64) -> Result<(), BankError> {
        let b = self.get_mut(bank)?;
        b.register_mut().authorise(units);
        info!(bank = %bank, units, authorised = b.register().authorised(), "shares authorised");
        Ok(())
    }

    /// Sell `units` new shares of `issuer` to `investor` at `price` each,
    /// paid from `account`. Never exceeds the authorised share count.
    ///
    /// # Errors
    ///
    /// [`BankError::SharesNotAuthorised`], an insufficient funds ledger
    /// error, or [`BankError::ReserveShortfall`]. Nothing is posted on
    /// error.
    #[allow(clippy::too_many_arguments)]
    pub fn sell_capital(
        &mut self,
        step: u64,
        issuer: BankId,
        investor: AgentId,
        account: AccountRef,
        units: u64,
        price: Money,
        memo: &str,
    ) -> Result<Money, BankError> {
        if units == 0 || price <= Money::ZERO {
            return Err(BankError::InvalidAmount(price));
        }
        self.require(account)?;
        let available = self.get(issuer)?.register().available();
        if units > available {
            return Err(BankError::SharesNotAuthorised {
                requested: units,
                available,
            });
        }
        let cost = price.saturating_mul(Money::from(units));
        let balance = self.deposit(account);
        if balance < cost {
            return Err(LedgerError::InsufficientFunds {
                ledger: ledgers::DEPOSITS.to_owned(),
                account: account.account,
                balance,
                requested: cost,
            }
            .into());
        }

        if account.bank == issuer {
            self.get_mut(issuer)?.receive_into_house(
                step,
                ledgers::CAPITAL,
                Some(account.account),
                cost,
                memo,
            )?;
        } else {
            self.settle_out(account.bank, cost)?;
            self.get_mut(account.bank)?
                .send_out(step, account.account, cost, memo)?;
            self.get_mut(issuer)?
                .receive_into_house(step, ledgers::CAPITAL, None, cost, memo)?;
        }
        self.get_mut(issuer)?
            .register_mut()
            .issue(investor, account, units)?;
        info!(bank = %issuer, investor = %investor, units, cost = %cost, memo, "capital sold");
        Ok(cost)
    }

    /// Sell `investor` as many shares as `account` can pay for at the
    /// issuer's share price, capped at the shares still authorised. Returns
    /// the units sold, which may be zero.
    ///
    /// # Errors
    ///
    /// As [`BankingSystem::sell_capital`].
    pub fn sell_investment(
        &mut self,
        step: u64,
        issuer: BankId,
        investor: AgentId,
        account: AccountRef,
        memo: &str,
    ) -> Result<u64, BankError> {
        let bank = self.get(issuer)?;
        let price = bank.share_price();
        let available = bank.register().available();
        let affordable = self
            .deposit(account)
            .checked_div(price)
            .map(|u| u.floor())
            .and_then(|u| u64::try_from(u).ok())
            .unwrap_or(0);
        let units = affordable.min(available);
        if units == 0 {
            return Ok(0);
        }
        self.sell_capital(step, issuer, investor, account, units, price, memo)?;
        Ok(units)
    }

    /// Move `units` shares of `issuer` between holders and update the
    /// register used for dividends.
    ///
    /// # Errors
    ///
    /// [`BankError::InsufficientShares`] or [`BankError::UnknownBank`].
    pub fn transfer_shares(
        &mut self,
        issuer: BankId,
        from: AgentId,
        to: AgentId,
        to_account: AccountRef,
        units: u64,
    ) -> Result<(), BankError> {
        self.get_mut(issuer)?
            .register_mut()
            .transfer(from, to, to_account, units)
    }

    /// Pay up to `total` from `issuer`'s retained earnings to its
    /// shareholders pro rata. Returns the amount actually paid.
    ///
    /// Holders banking elsewhere are paid through reserves; if the issuer's
    /// reserves run out those payments are skipped.
    ///
    /// # Errors
    ///
    /// [`BankError::Restricted`] for a bank in wind-down, or fatal ledger
    /// errors.
    pub fn pay_dividend(
        &mut self,
        step: u64,
        issuer: BankId,
        total: Money,
    ) -> Result<Money, BankError> {
        let bank = self.get(issuer)?;
        if bank.is_restricted() {
            return Err(BankError::Restricted(issuer));
        }
        let total = total.min(bank.distributable());
        let split = bank.register().pro_rata(total);

        let mut paid = Money::ZERO;
        for (holder, account, amount) in split {
            if account.bank == issuer {
                self.get_mut(issuer)?.pay_from_house(
                    step,
                    ledgers::RETAINED_EARNINGS,
                    account.account,
                    amount,
                    "dividend",
                )?;
            } else {
                if self.require(account).is_err() || self.get(issuer)?.reserves() < amount {
                    warn!(bank = %issuer, holder = %holder, amount = %amount, "dividend skipped");
                    continue;
                }
                self.get_mut(issuer)?.pay_from_house_out(
                    step,
                    ledgers::RETAINED_EARNINGS,
                    amount,
                    "dividend",
                )?;
                self.get_mut(account.bank)?
                    .receive_in(step, account.account, amount, "dividend")?;
            }
            paid = paid.saturating_add(amount);
        }
        info!(bank = %issuer, paid = %paid, "dividend paid");
        Ok(paid)
    }

    /// Pay one of `payer`'s own expenses, such as a salary, into `to`.
    ///
    /// The money comes out of this year's interest income, or out of
    /// retained earnings when income does not cover it. An account at
    /// another bank is paid through reserves. A restricted bank may still
    /// pay what it owes.
    ///
    /// # Errors
    ///
    /// An insufficient funds ledger error when neither earnings ledger nor,
    /// for another bank's customer, the reserves cover `amount`; unknown
    /// banks or accounts; fatal ledger errors. Nothing is posted on error.
    pub fn pay_expense(
        &mut self,
        step: u64,
        payer: BankId,
        to: AccountRef,
        amount: Money,
        memo: &str,
    ) -> Result<(), BankError> {
        if amount <= Money::ZERO {
            return Err(BankError::InvalidAmount(amount));
        }
        self.require(to)?;
        let bank = self.get(payer)?;
        let ledger = if bank.ledger_total(ledgers::INTEREST_INCOME) >= amount {
            ledgers::INTEREST_INCOME
        } else {
            ledgers::RETAINED_EARNINGS
        };
        let short = if bank.ledger_total(ledger) < amount {
            Some((ledger, bank.ledger_total(ledger)))
        } else if to.bank != payer && bank.reserves() < amount {
            Some((ledgers::RESERVES, bank.reserves()))
        } else {
            None
        };
        if let Some((ledger, balance)) = short {
            return Err(LedgerError::InsufficientFunds {
                ledger: ledger.to_owned(),
                account: bank.house(),
                balance,
                requested: amount,
            }
            .into());
        }
        if to.bank == payer {
            self.get_mut(payer)?
                .pay_from_house(step, ledger, to.account, amount, memo)?;
        } else {
            self.get_mut(payer)?
                .pay_from_house_out(step, ledger, amount, memo)?;
            self.get_mut(to.bank)?
                .receive_in(step, to.account, amount, memo)?;
        }
        debug!(bank = %payer, to = %to, amount = %amount, memo, "bank expense paid");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Step processing
    // -----------------------------------------------------------------------

    /// Service every loan due at `step`: customer loans at each bank, then
    /// central bank loans. Constraint flags are refreshed afterwards.
    ///
    /// # Errors
    ///
    /// Only fatal ledger errors.
    pub fn service(&mut self, step: u64) -> Result<ServiceReport, BankError> {
        let mut report = ServiceReport::default();
        for bank in self.banks.values_mut() {
            report.merge(bank.service_loans(step)?);
        }
        report.merge(self.central.service(step, &mut self.banks)?);
        let policy = *self.central.policy();
        for bank in self.banks.values_mut() {
            bank.refresh_constraints(&policy);
        }
        Ok(report)
    }

    /// Close interest income into retained earnings at every bank.
    ///
    /// # Errors
    ///
    /// Only fatal ledger errors.
    pub fn close_earnings(&mut self, step: u64) -> Result<Money, BankError> {
        let mut total = Money::ZERO;
        for bank in self.banks.values_mut() {
            total = total.saturating_add(bank.close_earnings(step)?);
        }
        Ok(total)
    }

    /// Zero every account's per-step flow counters.
    pub fn reset_flows(&mut self) {
        for bank in self.banks.values_mut() {
            bank.reset_flows();
        }
    }

    /// Verify every set of books. Returns all anomalies found.
    pub fn verify(&self, step: u64) -> Vec<LedgerAnomaly> {
        let mut anomalies = Vec::new();
        for bank in self.banks.values() {
            if let BalanceResult::Anomaly(a) = bank.verify(step) {
                anomalies.push(a);
            }
        }
        if let BalanceResult::Anomaly(a) = self.central.verify(step) {
            anomalies.push(a);
        }
        anomalies
    }

    /// Broad money: the sum of all customer deposits.
    pub fn total_deposits(&self) -> Money {
        self.banks.values().fold(Money::ZERO, |acc, b| {
            acc.saturating_add(b.ledger_total(ledgers::DEPOSITS))
        })
    }

    /// Reserves held across all commercial banks.
    pub fn total_reserves(&self) -> Money {
        self.banks
            .values()
            .fold(Money::ZERO, |acc, b| acc.saturating_add(b.reserves()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use rust_decimal_macros::dec;
    use threadneedle_types::{LoanKind, PeriodUnit};

    use super::*;

    struct Fixture {
        ctx: SimContext,
        system: BankingSystem,
        a: BankId,
        b: BankId,
    }

    fn fixture() -> Fixture {
        let mut ctx = SimContext::new(11);
        let central = CentralBank::new(&mut ctx, "Central", Policy::default()).unwrap();
        let mut system = BankingSystem::new(central);
        let a = system
            .create_bank(&mut ctx, BankSettings { name: "A".to_owned(), ..BankSettings::default() })
            .unwrap();
        let b = system
            .create_bank(&mut ctx, BankSettings { name: "B".to_owned(), ..BankSettings::default() })
            .unwrap();
        Fixture { ctx, system, a, b }
    }

    fn all_balanced(system: &BankingSystem) -> bool {
        system.verify(0).is_empty()
    }

    #[test]
    fn cross_bank_payment_moves_reserves() {
        let mut f = fixture();
        let alice = f.system.open_account(&mut f.ctx, f.a, AgentId(1)).unwrap();
        let bob = f.system.open_account(&mut f.ctx, f.b, AgentId(2)).unwrap();
        f.system.print_money(1, alice, dec!(100), "seed").unwrap();

        f.system.pay(1, alice, bob, dec!(40), "goods").unwrap();

        assert_eq!(f.system.deposit(alice), dec!(60));
        assert_eq!(f.system.deposit(bob), dec!(40));
        assert_eq!(f.system.bank(f.a).unwrap().reserves(), dec!(60));
        assert_eq!(f.system.bank(f.b).unwrap().reserves(), dec!(40));
        assert_eq!(f.system.total_deposits(), dec!(100));
        assert_eq!(f.system.account(alice).unwrap().outgoing(), dec!(40));
        assert_eq!(f.system.account(bob).unwrap().incoming(), dec!(40));
        assert!(all_balanced(&f.system));
    }

    #[test]
    fn reserve_shortfall_restricts_paying_bank() {
        let mut f = fixture();
        let alice = f.system.open_account(&mut f.ctx, f.a, AgentId(1)).unwrap();
        let bob = f.system.open_account(&mut f.ctx, f.b, AgentId(2)).unwrap();
        let policy = Policy {
            enforce_capital: false,
            enforce_reserve: false,
            ..Policy::default()
        };
        *f.system.central_mut().policy_mut() = policy;
        // Loan money has no reserves behind it.
        let req = LoanRequest {
            account: alice.account,
            amount: dec!(100),
            duration: 12,
            period: PeriodUnit::Month,
            weighting: RiskWeighting::Personal,
            kind: LoanKind::Simple,
        };
        f.system.request_loan(&mut f.ctx, f.a, req).unwrap();

        let result = f.system.pay(1, alice, bob, dec!(50), "goods");
        assert!(matches!(result, Err(BankError::ReserveShortfall { .. })));
        assert!(f.system.bank(f.a).unwrap().is_restricted());
        assert_eq!(f.system.deposit(alice), dec!(100));
        assert_eq!(f.system.deposit(bob), Money::ZERO);
        assert!(all_balanced(&f.system));
    }

    #[test]
    fn capital_sale_respects_authorisation_and_registers_holder() {
        let mut f = fixture();
        let inv = f.system.open_account(&mut f.ctx, f.b, AgentId(7)).unwrap();
        f.system.print_money(1, inv, dec!(1000), "seed").unwrap();
        let available = f.system.bank(f.a).unwrap().register().available();

        let too_many =
            f.system.sell_capital(1, f.a, AgentId(7), inv, available.saturating_add(1), dec!(1), "x");
        assert!(matches!(too_many, Err(BankError::SharesNotAuthorised { .. })));

        let cost = f.system.sell_capital(1, f.a, AgentId(7), inv, 20, dec!(10), "buy").unwrap();
        assert_eq!(cost, dec!(200));
        let bank_a = f.system.bank(f.a).unwrap();
        assert_eq!(bank_a.register().shares_of(AgentId(7)), 20);
        assert_eq!(bank_a.ledger_total(ledgers::CAPITAL), dec!(200));
        assert_eq!(bank_a.reserves(), dec!(200));
        assert_eq!(f.system.deposit(inv), dec!(800));
        assert!(all_balanced(&f.system));
    }

    #[test]
    fn sell_investment_buys_what_deposit_affords() {
        let mut f = fixture();
        let inv = f.system.open_account(&mut f.ctx, f.a, AgentId(7)).unwrap();
        f.system.print_money(1, inv, dec!(95), "seed").unwrap();
        let units = f.system.sell_investment(1, f.a, AgentId(7), inv, "invest").unwrap();
        assert_eq!(units, 9);
        assert_eq!(f.system.deposit(inv), dec!(5));
        assert!(all_balanced(&f.system));
    }

    #[test]
    fn dividend_routes_pro_rata_from_retained_earnings() {
        let mut f = fixture();
        let x = f.system.open_account(&mut f.ctx, f.a, AgentId(1)).unwrap();
        let y = f.system.open_account(&mut f.ctx, f.b, AgentId(2)).unwrap();
        f.system.print_money(1, x, dec!(100), "seed").unwrap();
        f.system.print_money(1, y, dec!(200), "seed").unwrap();
        f.system.sell_capital(1, f.a, AgentId(1), x, 1, dec!(10), "buy").unwrap();
        f.system.sell_capital(1, f.a, AgentId(2), y, 3, dec!(10), "buy").unwrap();

        // Give bank A retained earnings.
        f.system
            .bank_mut(f.a)
            .unwrap()
            .receive_into_house(2, ledgers::RETAINED_EARNINGS, Some(x.account), dec!(40), "fee")
            .unwrap();
        assert_eq!(f.system.bank(f.a).unwrap().distributable(), dec!(40));

        let paid = f.system.pay_dividend(3, f.a, dec!(100)).unwrap();
        assert_eq!(paid, dec!(40));
        assert_eq!(f.system.deposit(x), dec!(100) - dec!(10) - dec!(40) + dec!(10));
        assert_eq!(f.system.deposit(y), dec!(200) - dec!(30) + dec!(30));
        assert!(all_balanced(&f.system));
    }

    #[test]
    fn expense_draws_income_before_retained_earnings() {
        let mut f = fixture();
        let x = f.system.open_account(&mut f.ctx, f.a, AgentId(1)).unwrap();
        let y = f.system.open_account(&mut f.ctx, f.b, AgentId(2)).unwrap();
        f.system.print_money(1, x, dec!(100), "seed").unwrap();
        {
            let bank = f.system.bank_mut(f.a).unwrap();
            bank.receive_into_house(2, ledgers::INTEREST_INCOME, Some(x.account), dec!(30), "interest")
                .unwrap();
            bank.receive_into_house(2, ledgers::RETAINED_EARNINGS, Some(x.account), dec!(50), "fee")
                .unwrap();
        }

        f.system.pay_expense(3, f.a, x, dec!(20), "salary").unwrap();
        let a = f.system.bank(f.a).unwrap();
        assert_eq!(a.ledger_total(ledgers::INTEREST_INCOME), dec!(10));
        assert_eq!(a.ledger_total(ledgers::RETAINED_EARNINGS), dec!(50));
        assert_eq!(f.system.deposit(x), dec!(40));

        // Income no longer covers it: retained earnings pay, across banks.
        f.system.pay_expense(4, f.a, y, dec!(15), "salary").unwrap();
        let a = f.system.bank(f.a).unwrap();
        assert_eq!(a.ledger_total(ledgers::INTEREST_INCOME), dec!(10));
        assert_eq!(a.ledger_total(ledgers::RETAINED_EARNINGS), dec!(35));
        assert_eq!(f.system.deposit(y), dec!(15));
        assert_eq!(f.system.bank(f.b).unwrap().reserves(), dec!(15));
        assert!(all_balanced(&f.system));

        let err = f.system.pay_expense(5, f.a, x, dec!(36), "salary").unwrap_err();
        assert!(err.is_insufficient_funds());
        assert_eq!(f.system.deposit(x), dec!(40));
    }

    #[test]
    fn share_transfer_updates_register() {
        let mut f = fixture();
        let x = f.system.open_account(&mut f.ctx, f.a, AgentId(1)).unwrap();
        let y = f.system.open_account(&mut f.ctx, f.a, AgentId(2)).unwrap();
        f.system.print_money(1, x, dec!(100), "seed").unwrap();
        f.system.sell_capital(1, f.a, AgentId(1), x, 5, dec!(10), "buy").unwrap();
        f.system.transfer_shares(f.a, AgentId(1), AgentId(2), y, 2).unwrap();
        let reg = f.system.bank(f.a).unwrap().register();
        assert_eq!(reg.shares_of(AgentId(1)), 3);
        assert_eq!(reg.shares_of(AgentId(2)), 2);
    }

    #[test]
    fn locate_finds_holding_bank() {
        let mut f = fixture();
        let x = f.system.open_account(&mut f.ctx, f.b, AgentId(1)).unwrap();
        assert_eq!(f.system.locate(x.account), Some(x));
        assert_eq!(f.system.locate(AccountId(9999)), None);
    }
}
