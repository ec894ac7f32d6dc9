//! A worker sells labour and spends part of its wage on one product.
//!
//! While unemployed the worker keeps a listing on the labour market and
//! lowers its asking salary by one at every month end, never below the
//! minimum wage. Once hired its asking salary follows the contract. Each
//! step it bids for `consumption` units of its product with a fixed share
//! of its deposit, replacing any bid still resting from the step before.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use threadneedle_market::{MarketError, OrderPrice};
use threadneedle_types::{AccountRef, AgentId, MarketId, Money, OrderId};
use tracing::debug;

use super::Profile;
use crate::agent::{Agent, AgentClass, AgentError, Economy, MarketParticipant};
use crate::config::WorkerConfig;

/// A wage earner and consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    profile: Profile,
    desired_salary: Money,
    product: Option<String>,
    consumption: u64,
    spend_pct: u32,
    resting_bid: Option<(MarketId, OrderId)>,
}

impl Worker {
    /// A worker configured by `config`.
    pub fn new(profile: Profile, config: &WorkerConfig) -> Self {
        Self {
            profile,
            desired_salary: config.desired_salary,
            product: config.product.clone(),
            consumption: config.consumption,
            spend_pct: config.spend_pct,
            resting_bid: None,
        }
    }

    /// Identity and account.
    pub const fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Salary the worker currently asks for.
    pub const fn desired_salary(&self) -> Money {
        self.desired_salary
    }

    fn look_for_work(&mut self, economy: &mut Economy) -> Result<(), AgentError> {
        let id = self.profile.id;
        if let Some(contract) = economy.employment.contract(id) {
            self.desired_salary = contract.salary;
            return Ok(());
        }

        let floor = economy.government.min_wage;
        let Some(labour) = economy.markets.labour_mut() else {
            return Err(AgentError::MissingMarket { agent: id });
        };
        let mut relist = !labour.is_listed(id);
        if economy.ctx.end_of_month() && self.desired_salary > floor {
            self.desired_salary = self
                .desired_salary
                .saturating_sub(Decimal::ONE)
                .max(floor);
            relist |= labour.withdraw(id);
            debug!(worker = %id, desired = %self.desired_salary, "asking salary lowered");
        }
        if relist {
            labour.offer(
                &mut economy.ctx,
                id,
                self.profile.account,
                self.desired_salary,
            )?;
        }
        Ok(())
    }

    fn shop(&mut self, economy: &mut Economy) -> Result<(), AgentError> {
        let Some(product) = self.product.as_deref() else {
            return Ok(());
        };
        let id = self.profile.id;
        let market_id = economy
            .markets
            .goods_for(product)
            .ok_or(AgentError::MissingMarket { agent: id })?;
        let deposit = self.deposit(economy);
        let Some(market) = economy.markets.goods_mut(market_id) else {
            return Err(AgentError::MissingMarket { agent: id });
        };

        if let Some((_, order)) = self.resting_bid.take() {
            match market.cancel(order) {
                Ok(_) | Err(MarketError::UnknownOrder(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let budget = deposit
            .saturating_mul(Decimal::from(self.spend_pct))
            .checked_div(Decimal::ONE_HUNDRED)
            .unwrap_or_default();
        let limit = budget
            .checked_div(Decimal::from(self.consumption))
            .unwrap_or_default()
            .round_dp(2);
        if limit <= Money::ZERO {
            return Ok(());
        }

        let report = market.buy(
            &mut economy.ctx,
            &mut economy.system,
            id,
            self.profile.account,
            self.consumption,
            OrderPrice::Limit(limit),
        )?;
        if report.bought > 0 {
            debug!(worker = %id, bought = report.bought, cost = %report.cost, "goods bought");
        }
        self.resting_bid = report.rested.map(|order| (market_id, order));
        Ok(())
    }
}

impl Agent for Worker {
    fn id(&self) -> AgentId {
        self.profile.id
    }

    fn name(&self) -> &str {
        &self.profile.name
    }

    fn class(&self) -> AgentClass {
        AgentClass::Person
    }

    fn evaluate(&mut self, economy: &mut Economy) -> Result<(), AgentError> {
        self.look_for_work(economy)?;
        self.shop(economy)
    }

    fn describe(&self, economy: &Economy) -> String {
        let status = economy.employment.contract(self.profile.id).map_or_else(
            || format!("unemployed, asking {}", self.desired_salary),
            |c| format!("employed by {} at {}", c.employer, c.salary),
        );
        format!(
            "{} {} (worker) {status}, deposit {}",
            self.profile.id,
            self.profile.name,
            self.deposit(economy)
        )
    }
}

impl MarketParticipant for Worker {
    fn account(&self) -> AccountRef {
        self.profile.account
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::agents::testing::economy;

    #[test]
    fn unemployed_worker_lists_once_and_bids_for_food() {
        let mut econ = economy();
        let profile = Profile::open(&mut econ, "Ann", "Bank", dec!(100)).unwrap();
        let mut worker = Worker::new(
            profile,
            &WorkerConfig {
                common: crate::config::AgentCommon::named("Ann"),
                desired_salary: dec!(12),
                product: Some("food".to_owned()),
                consumption: 2,
                spend_pct: 10,
            },
        );

        worker.evaluate(&mut econ).unwrap();
        worker.evaluate(&mut econ).unwrap();

        let labour = econ.markets.labour().unwrap();
        assert_eq!(labour.available_workers(), 1);
        assert_eq!(labour.ask().price(), Some(dec!(12)));

        let food = econ.markets.goods_for("food").unwrap();
        let bids = econ.markets.goods(food).unwrap().book().bids();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].price, dec!(5));
        assert_eq!(bids[0].quantity, 2);
    }

    #[test]
    fn asking_salary_falls_to_the_minimum_wage() {
        let mut econ = economy();
        let profile = Profile::open(&mut econ, "Bob", "Bank", Money::ZERO).unwrap();
        let mut worker = Worker::new(
            profile,
            &WorkerConfig {
                common: crate::config::AgentCommon::named("Bob"),
                desired_salary: dec!(11),
                product: None,
                consumption: 1,
                spend_pct: 0,
            },
        );
        for _ in 0..90 {
            worker.evaluate(&mut econ).unwrap();
            econ.ctx.advance().unwrap();
        }
        assert_eq!(worker.desired_salary(), econ.government.min_wage);
        let labour = econ.markets.labour().unwrap();
        assert_eq!(labour.available_workers(), 1);
        assert_eq!(labour.ask().price(), Some(econ.government.min_wage));
    }
}
