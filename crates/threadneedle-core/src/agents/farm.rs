//! A farm turns labour into one product.
//!
//! Each step the farm pays its staff, produces `headcount * labour_input`
//! units and offers them to its product's market at whatever price the
//! market gives. It then adjusts its workforce:
//!
//! - With no staff, or with more than three steps of salaries in the bank,
//!   it tries to hire at its offered salary and raises the offer by one if
//!   nobody takes it.
//! - Otherwise, after two consecutive steps of falling sales income, it cuts
//!   every salary by one, or lets its newest worker go once salaries are at
//!   the minimum wage.
//!
//! Output that spoils unsold is written off against the farm and counts as
//! a step of falling income.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use threadneedle_market::{Lot, OrderPrice};
use threadneedle_types::{AccountRef, AgentId, Money};
use tracing::{debug, info};

use super::Profile;
use crate::agent::{Agent, AgentClass, AgentError, Economy, Employer, MarketParticipant};
use crate::config::FarmConfig;

/// Consecutive steps of falling income before the farm cuts costs.
const SHRINK_PATIENCE: u32 = 2;

/// Steps of salaries the farm wants in hand before it grows.
const SALARY_CUSHION: Decimal = Decimal::from_parts(3, 0, 0, false, 0);

/// A producer employing workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Farm {
    profile: Profile,
    product: String,
    labour_input: u64,
    offered: Money,
    last_income: Money,
    shrinking: u32,
    #[serde(default)]
    spoiled: u64,
    #[serde(default)]
    written_off: Money,
}

impl Farm {
    /// A farm configured by `config`, offering `min_wage` to start.
    pub fn new(profile: Profile, config: &FarmConfig, min_wage: Money) -> Self {
        Self {
            profile,
            product: config.product.clone(),
            labour_input: config.labour_input,
            offered: min_wage,
            last_income: Money::ZERO,
            shrinking: 0,
            spoiled: 0,
            written_off: Money::ZERO,
        }
    }

    /// Identity and account.
    pub const fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Product the farm makes.
    pub fn product(&self) -> &str {
        &self.product
    }

    /// Units that spoiled unsold.
    pub const fn spoiled(&self) -> u64 {
        self.spoiled
    }

    /// Production cost of everything that spoiled.
    pub const fn written_off(&self) -> Money {
        self.written_off
    }

    /// Sell this step's output. Returns the sales income.
    fn produce(&self, economy: &mut Economy, paid: Money) -> Result<Money, AgentError> {
        let id = self.profile.id;
        let output = u64::try_from(self.headcount(economy))
            .unwrap_or(u64::MAX)
            .saturating_mul(self.labour_input);
        if output == 0 {
            return Ok(Money::ZERO);
        }
        let market_id = economy
            .markets
            .goods_for(&self.product)
            .ok_or(AgentError::MissingMarket { agent: id })?;
        let min_wage = economy.government.min_wage;
        let Some(market) = economy.markets.goods_mut(market_id) else {
            return Err(AgentError::MissingMarket { agent: id });
        };

        // A lot never carries a zero unit cost, so unsold output always
        // rests at a positive price.
        let per_unit_wage = min_wage
            .checked_div(Decimal::from(self.labour_input))
            .unwrap_or(min_wage);
        let unit_cost = paid
            .checked_div(Decimal::from(output))
            .unwrap_or_default()
            .max(per_unit_wage)
            .round_dp(2);
        let quantity = output.min(market.max_lot());
        let lot = market.make_lot(&mut economy.ctx, quantity, unit_cost)?;
        let report = market.sell(
            &mut economy.ctx,
            &mut economy.system,
            id,
            self.profile.account,
            lot,
            OrderPrice::Market,
        )?;
        if let Some(lot) = report.returned {
            debug!(farm = %id, units = lot.quantity(), "output discarded: market full");
        }
        Ok(report.proceeds)
    }

    fn adjust_workforce(
        &mut self,
        economy: &mut Economy,
        paid: Money,
        income: Money,
    ) -> Result<(), AgentError> {
        let min_wage = economy.government.min_wage;
        let deposit = self.deposit(economy);
        let flush = deposit > paid.saturating_mul(SALARY_CUSHION);

        if (self.headcount(economy) == 0 || flush) && deposit >= self.offered {
            self.shrinking = 0;
            match self.hire(economy) {
                Some(hire) => {
                    info!(
                        farm = %self.profile.id,
                        worker = %hire.worker,
                        salary = %hire.salary,
                        "farm hired"
                    );
                }
                None => {
                    self.offered = self
                        .offered
                        .saturating_add(Decimal::ONE)
                        .min(deposit.max(min_wage));
                }
            }
            return Ok(());
        }

        if income < self.last_income {
            self.shrinking = self.shrinking.saturating_add(1);
        } else {
            self.shrinking = 0;
        }
        if self.shrinking >= SHRINK_PATIENCE {
            self.shrinking = 0;
            if self.offered > min_wage {
                self.offered = self.offered.saturating_sub(Decimal::ONE).max(min_wage);
                self.decrease_salaries(economy, Decimal::ONE);
                debug!(farm = %self.profile.id, offered = %self.offered, "salaries cut");
            } else {
                self.fire_one(economy)?;
            }
        }
        Ok(())
    }
}

impl Agent for Farm {
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
        let paid = self.pay_salaries(economy)?;
        let income = self.produce(economy, paid)?;
        self.adjust_workforce(economy, paid, income)?;
        self.last_income = income;
        Ok(())
    }

    fn lot_expired(&mut self, lot: &Lot) {
        self.spoiled = self.spoiled.saturating_add(lot.quantity());
        self.written_off = self.written_off.saturating_add(lot.cost());
        self.shrinking = self.shrinking.saturating_add(1);
        debug!(farm = %self.profile.id, units = lot.quantity(), cost = %lot.cost(), "output spoiled");
    }

    fn describe(&self, economy: &Economy) -> String {
        format!(
            "{} {} (farm, {}) staff {}, offering {}, last income {}, spoiled {}, deposit {}",
            self.profile.id,
            self.profile.name,
            self.product,
            self.headcount(economy),
            self.offered,
            self.last_income,
            self.spoiled,
            self.deposit(economy)
        )
    }
}

impl MarketParticipant for Farm {
    fn account(&self) -> AccountRef {
        self.profile.account
    }
}

impl Employer for Farm {
    fn offered_salary(&self) -> Money {
        self.offered
    }
}
