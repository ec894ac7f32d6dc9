//! The staff of a bank.
//!
//! Banks earn interest but do not spend it. A work bank gives one bank a
//! payroll: its employees are paid out of the bank's interest income, or
//! out of retained earnings once income runs short, so lending income flows
//! back into deposits.
//!
//! Each step the staff are paid first. The bank then hires one more worker
//! at the labour market's ask while its earnings cover `hire_cover` steps of
//! the enlarged payroll, or lets its newest hire go while earnings cover
//! fewer than `fire_cover` steps of the current one. Anyone the bank cannot
//! pay is let go on the spot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use threadneedle_bank::bank::ledgers;
use threadneedle_types::{AccountRef, AgentId, BankId, Money};
use tracing::{info, warn};

use super::Profile;
use crate::agent::{Agent, AgentClass, AgentError, Economy, Employer, MarketParticipant};
use crate::config::WorkBankConfig;

/// Employees of one bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkBank {
    profile: Profile,
    hire_cover: u32,
    fire_cover: u32,
    offered: Money,
}

impl WorkBank {
    /// Staff for the bank holding `profile`'s account.
    pub fn new(profile: Profile, config: &WorkBankConfig, min_wage: Money) -> Self {
        Self {
            profile,
            hire_cover: config.hire_cover,
            fire_cover: config.fire_cover,
            offered: min_wage,
        }
    }

    /// Identity and account.
    pub const fn profile(&self) -> &Profile {
        &self.profile
    }

    /// The bank that employs the staff.
    pub const fn bank(&self) -> BankId {
        self.profile.account.bank
    }

    /// Interest income plus retained earnings available for salaries.
    pub fn earnings(&self, economy: &Economy) -> Money {
        economy.system.bank(self.bank()).map_or(Money::ZERO, |b| {
            b.ledger_total(ledgers::INTEREST_INCOME)
                .max(Money::ZERO)
                .saturating_add(b.distributable())
        })
    }

    fn payroll(&self, economy: &Economy) -> Money {
        economy
            .employment
            .staff(self.profile.id)
            .into_iter()
            .fold(Money::ZERO, |acc, (_, c)| acc.saturating_add(c.salary))
    }

    fn adjust_workforce(&mut self, economy: &mut Economy) -> Result<(), AgentError> {
        let Some(ask) = economy.markets.labour().and_then(|l| l.ask().price()) else {
            return Ok(());
        };
        self.offered = ask;
        let earnings = self.earnings(economy);
        let payroll = self.payroll(economy);

        let grown = payroll
            .saturating_add(ask)
            .saturating_mul(Decimal::from(self.hire_cover));
        if earnings >= grown {
            if let Some(hire) = self.hire(economy) {
                info!(
                    bank = %self.bank(),
                    worker = %hire.worker,
                    salary = %hire.salary,
                    "bank hired"
                );
            }
        } else if earnings < payroll.saturating_mul(Decimal::from(self.fire_cover)) {
            self.fire_one(economy)?;
        }
        Ok(())
    }
}

impl Agent for WorkBank {
    fn id(&self) -> AgentId {
        self.profile.id
    }

    fn name(&self) -> &str {
        &self.profile.name
    }

    fn class(&self) -> AgentClass {
        AgentClass::Company
    }

    fn evaluate(&mut self, economy: &mut Economy) -> Result<(), AgentError> {
        self.pay_salaries(economy)?;
        self.adjust_workforce(economy)
    }

    fn describe(&self, economy: &Economy) -> String {
        format!(
            "{} {} (staff of {}) staff {}, payroll {}, earnings {}",
            self.profile.id,
            self.profile.name,
            self.bank(),
            self.headcount(economy),
            self.payroll(economy),
            self.earnings(economy)
        )
    }
}

impl MarketParticipant for WorkBank {
    fn account(&self) -> AccountRef {
        self.profile.account
    }
}

impl Employer for WorkBank {
    fn offered_salary(&self) -> Money {
        self.offered
    }

    /// Salaries come out of the bank's earnings, not the staff account.
    fn pay_salaries(&self, economy: &mut Economy) -> Result<Money, AgentError> {
        let step = economy.ctx.step();
        let mut paid = Money::ZERO;
        for (worker, contract) in economy.employment.staff(self.profile.id) {
            match economy
                .system
                .pay_expense(step, self.bank(), contract.account, contract.salary, "salary")
            {
                Ok(()) => paid = paid.saturating_add(contract.salary),
                Err(e) if !e.is_fatal() => {
                    warn!(bank = %self.bank(), worker = %worker, error = %e, "salary unpaid");
                    self.fire(economy, worker)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(paid)
    }
}
