//! The agent interface and its capability traits.
//!
//! Every agent implements [`Agent`], whose [`Agent::evaluate`] is called
//! once per step with exclusive access to the [`Economy`]. What an agent
//! can do beyond that is expressed by composing capability traits:
//!
//! - [`MarketParticipant`] -- holds an account and trades through it.
//! - [`Employer`] -- hires from the labour market, pays and fires staff.
//! - [`Borrower`] -- asks its bank for loans and repays them.
//!
//! The capability traits carry the shared behaviour as provided methods, so
//! a concrete agent only supplies its own parameters.

use threadneedle_bank::{BankError, BankingSystem, LoanDecision, LoanRequest};
use threadneedle_market::{Hire, Lot, MarketError};
use threadneedle_types::{
    AccountRef, AgentId, ContextError, LoanId, LoanKind, Money, PeriodUnit, RiskWeighting,
    SimContext,
};
use tracing::{debug, info, warn};

use crate::employment::{Contract, Employment};
use crate::government::Government;
use crate::markets::Markets;

/// Errors raised while an agent evaluates.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A banking operation failed.
    #[error("bank error: {source}")]
    Bank {
        /// The underlying bank error.
        #[from]
        source: BankError,
    },

    /// A market operation failed.
    #[error("market error: {source}")]
    Market {
        /// The underlying market error.
        #[from]
        source: MarketError,
    },

    /// Id or step bookkeeping failed.
    #[error("context error: {source}")]
    Context {
        /// The underlying context error.
        #[from]
        source: ContextError,
    },

    /// The agent refers to a market that does not exist.
    #[error("agent {agent} refers to a missing market")]
    MissingMarket {
        /// The agent.
        agent: AgentId,
    },

    /// No bank goes by this name.
    #[error("unknown bank {name:?}")]
    UnknownBank {
        /// The name looked up.
        name: String,
    },
}

impl AgentError {
    /// Whether the error means the books can no longer be trusted.
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Bank { source } => source.is_fatal(),
            Self::Market { source } => match source {
                MarketError::Bank(e) => e.is_fatal(),
                MarketError::Context(_) => true,
                _ => false,
            },
            Self::Context { .. } => true,
            Self::MissingMarket { .. } | Self::UnknownBank { .. } => false,
        }
    }
}

/// Everything an agent may act on during its evaluation.
#[derive(Debug)]
pub struct Economy {
    /// Step counter, random source and ids.
    pub ctx: SimContext,
    /// Every bank.
    pub system: BankingSystem,
    /// The government.
    pub government: Government,
    /// Every market.
    pub markets: Markets,
    /// Employment contracts.
    pub employment: Employment,
}

impl Economy {
    /// Deposit held in `account`.
    pub fn deposit(&self, account: AccountRef) -> Money {
        self.system.deposit(account)
    }
}

/// Whether an agent is a firm or a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AgentClass {
    /// Employs, produces, sells.
    Company,
    /// Consumes, works, saves, borrows.
    Person,
}

/// One participant in the simulation.
pub trait Agent {
    /// Agent id.
    fn id(&self) -> AgentId;

    /// Display name.
    fn name(&self) -> &str;

    /// Company or person.
    fn class(&self) -> AgentClass;

    /// Act for the current step.
    ///
    /// # Errors
    ///
    /// Any error the agent could not handle itself. Non-fatal errors are
    /// logged by the engine; fatal ones abort the step.
    fn evaluate(&mut self, economy: &mut Economy) -> Result<(), AgentError>;

    /// A lot this agent offered spoiled unsold and was written off.
    fn lot_expired(&mut self, _lot: &Lot) {}

    /// One-line human-readable state.
    fn describe(&self, economy: &Economy) -> String;
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// An agent with a bank account that trades through it.
pub trait MarketParticipant: Agent {
    /// The agent's account.
    fn account(&self) -> AccountRef;

    /// Current deposit.
    fn deposit(&self, economy: &Economy) -> Money {
        economy.deposit(self.account())
    }
}

/// An agent that employs workers from the labour market.
pub trait Employer: MarketParticipant {
    /// Salary offered to the next hire.
    fn offered_salary(&self) -> Money;

    /// Hire the cheapest worker willing to work for the offered salary.
    fn hire(&self, economy: &mut Economy) -> Option<Hire> {
        let offered = self.offered_salary();
        let hire = economy.markets.labour_mut()?.hire(self.id(), offered)?;
        economy.employment.hire(
            hire.worker,
            Contract {
                employer: self.id(),
                account: hire.account,
                salary: hire.salary,
                since: economy.ctx.step(),
            },
        );
        Some(hire)
    }

    /// Let `worker` go and put them back on the labour market at their
    /// last salary.
    ///
    /// # Errors
    ///
    /// Market errors from relisting.
    fn fire(&self, economy: &mut Economy, worker: AgentId) -> Result<bool, AgentError> {
        let Some(contract) = economy.employment.fire(worker) else {
            return Ok(false);
        };
        info!(employer = %self.id(), worker = %worker, salary = %contract.salary, "worker fired");
        if let Some(labour) = economy.markets.labour_mut() {
            labour.release(&mut economy.ctx, worker, contract.account, contract.salary)?;
        }
        Ok(true)
    }

    /// Let the most recently hired worker go.
    ///
    /// # Errors
    ///
    /// As [`Employer::fire`].
    fn fire_one(&self, economy: &mut Economy) -> Result<bool, AgentError> {
        let newest = economy
            .employment
            .staff(self.id())
            .into_iter()
            .max_by_key(|(w, c)| (c.since, *w))
            .map(|(w, _)| w);
        match newest {
            Some(worker) => self.fire(economy, worker),
            None => Ok(false),
        }
    }

    /// Pay every employee. Anyone who cannot be paid is fired. Returns the
    /// total paid.
    ///
    /// # Errors
    ///
    /// Fatal settlement errors.
    fn pay_salaries(&self, economy: &mut Economy) -> Result<Money, AgentError> {
        let step = economy.ctx.step();
        let mut paid = Money::ZERO;
        for (worker, contract) in economy.employment.staff(self.id()) {
            match economy
                .system
                .pay(step, self.account(), contract.account, contract.salary, "salary")
            {
                Ok(()) => paid = paid.saturating_add(contract.salary),
                Err(e) if !e.is_fatal() => {
                    warn!(employer = %self.id(), worker = %worker, error = %e, "salary unpaid");
                    self.fire(economy, worker)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(paid)
    }

    /// Cut every salary by `by`, never below the minimum wage.
    fn decrease_salaries(&self, economy: &mut Economy, by: Money) {
        let floor = economy.government.min_wage;
        for (worker, contract) in economy.employment.staff(self.id()) {
            let salary = contract.salary.saturating_sub(by).max(floor);
            economy.employment.set_salary(worker, salary);
        }
    }

    /// Number of employees.
    fn headcount(&self, economy: &Economy) -> usize {
        economy.employment.headcount(self.id())
    }
}

/// Terms a borrower asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanTermsWanted {
    /// Principal.
    pub amount: Money,
    /// Periods.
    pub duration: u32,
    /// Period unit.
    pub period: PeriodUnit,
    /// Risk category and bucket.
    pub weighting: RiskWeighting,
    /// Interest convention.
    pub kind: LoanKind,
}

/// An agent that borrows from its own bank.
pub trait Borrower: MarketParticipant {
    /// Ask for a loan. A refusal is a normal outcome.
    ///
    /// # Errors
    ///
    /// Bank errors other than refusals.
    fn borrow(
        &self,
        economy: &mut Economy,
        terms: LoanTermsWanted,
    ) -> Result<LoanDecision, AgentError> {
        let account = self.account();
        let decision = economy.system.request_loan(
            &mut economy.ctx,
            account.bank,
            LoanRequest {
                account: account.account,
                amount: terms.amount,
                duration: terms.duration,
                period: terms.period,
                weighting: terms.weighting,
                kind: terms.kind,
            },
        )?;
        debug!(agent = %self.id(), amount = %terms.amount, ?decision, "loan requested");
        Ok(decision)
    }

    /// Outstanding loans on the agent's account.
    fn loans(&self, system: &BankingSystem) -> Vec<LoanId> {
        system
            .account(self.account())
            .map(|a| a.loans().map(|(_, id)| id).collect())
            .unwrap_or_default()
    }

    /// Capital and interest still owed across all loans.
    fn debt(&self, system: &BankingSystem) -> Money {
        let Some(bank) = system.bank(self.account().bank) else {
            return Money::ZERO;
        };
        self.loans(system)
            .into_iter()
            .filter_map(|id| bank.loan(id))
            .fold(Money::ZERO, |acc, l| {
                acc.saturating_add(l.outstanding())
                    .saturating_add(l.interest_due())
            })
    }

    /// Repay every loan the deposit fully covers. Returns the amount paid.
    ///
    /// # Errors
    ///
    /// Bank errors from the payments.
    fn repay_what_it_can(&self, economy: &mut Economy) -> Result<Money, AgentError> {
        let account = self.account();
        let step = economy.ctx.step();
        let mut paid = Money::ZERO;
        for id in self.loans(&economy.system) {
            let owed = economy
                .system
                .bank(account.bank)
                .and_then(|b| b.loan(id))
                .map_or(Money::ZERO, |l| {
                    l.outstanding().saturating_add(l.interest_due())
                });
            if owed <= Money::ZERO || economy.deposit(account) < owed {
                continue;
            }
            let split = economy.system.pay_loan(step, account, id, owed)?;
            paid = paid.saturating_add(split.total());
        }
        if paid > Money::ZERO {
            info!(agent = %self.id(), paid = %paid, "loans repaid early");
        }
        Ok(paid)
    }
}
