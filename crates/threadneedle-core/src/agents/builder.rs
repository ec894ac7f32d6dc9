//! A builder borrows to put up one house at a time.
//!
//! A builder with no debt starts a house when fewer than two houses are
//! already on the market and the labour market can supply a crew of
//! `labour_input / build_time` workers. It funds the job with a
//! construction loan of one and a half times the expected wage bill, then
//! hires at the labour market's ask.
//!
//! Each step of the build it pays its crew and adds their headcount to the
//! progress. Once progress reaches `labour_input` the house goes on sale at
//! its cost plus `profit_margin` percent, or at the best bid if that is
//! higher, and the crew is let go. Between builds the builder pays its loan
//! off as soon as its deposit covers it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use threadneedle_bank::LoanDecision;
use threadneedle_market::{Lot, OrderPrice};
use threadneedle_types::{AccountRef, AgentId, LoanKind, Money, PeriodUnit, RiskWeighting};
use tracing::{debug, info};

use super::Profile;
use crate::agent::{
    self, Agent, AgentClass, AgentError, Economy, Employer, LoanTermsWanted, MarketParticipant,
};
use crate::config::BuilderConfig;

/// Houses already on the market that stop a new build.
const MAX_UNSOLD: u64 = 2;

/// Wage bill multiple borrowed for one house.
const FUNDING_COVER: Decimal = Decimal::from_parts(15, 0, 0, false, 1);

/// A house builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Builder {
    profile: Profile,
    product: String,
    labour_input: u64,
    build_time: u64,
    profit_margin: u32,
    offered: Money,
    building: bool,
    progress: u64,
    spent: Money,
    built: u64,
    spoiled: u64,
}

impl Builder {
    /// A builder configured by `config`, offering `min_wage` until it
    /// first reads the labour market.
    pub fn new(profile: Profile, config: &BuilderConfig, min_wage: Money) -> Self {
        Self {
            profile,
            product: config.product.clone(),
            labour_input: config.labour_input,
            build_time: config.build_time,
            profit_margin: config.profit_margin,
            offered: min_wage,
            building: false,
            progress: 0,
            spent: Money::ZERO,
            built: 0,
            spoiled: 0,
        }
    }

    /// Identity and account.
    pub const fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Whether a house is under construction.
    pub const fn is_building(&self) -> bool {
        self.building
    }

    /// Worker-steps put into the current house.
    pub const fn progress(&self) -> u64 {
        self.progress
    }

    /// Houses finished and offered for sale.
    pub const fn built(&self) -> u64 {
        self.built
    }

    /// Houses that went unsold until they were written off.
    pub const fn spoiled(&self) -> u64 {
        self.spoiled
    }

    /// Workers needed to finish a house in `build_time` steps.
    fn crew(&self) -> usize {
        let crew = self
            .labour_input
            .checked_div(self.build_time)
            .unwrap_or(self.labour_input)
            .max(1);
        usize::try_from(crew).unwrap_or(usize::MAX)
    }

    fn unsold(&self, economy: &Economy) -> u64 {
        economy
            .markets
            .goods_for(&self.product)
            .and_then(|m| economy.markets.goods(m))
            .map_or(0, |m| m.book().offered_by(self.profile.id))
    }

    /// Borrow for and staff a new house if the market wants one.
    fn start(&mut self, economy: &mut Economy) -> Result<(), AgentError> {
        if self.unsold(economy) >= MAX_UNSOLD
            || agent::Borrower::debt(self, &economy.system) > Money::ZERO
        {
            return Ok(());
        }
        let crew = self.crew();
        let Some(labour) = economy.markets.labour() else {
            return Ok(());
        };
        let Some(ask) = labour.ask().price() else {
            return Ok(());
        };
        if labour.available_workers() < crew {
            return Ok(());
        }

        let wages = ask.saturating_mul(Decimal::from(self.labour_input));
        let months = self
            .build_time
            .saturating_mul(2)
            .div_ceil(PeriodUnit::Month.steps())
            .max(1);
        let terms = LoanTermsWanted {
            amount: wages.saturating_mul(FUNDING_COVER).round_dp(2),
            duration: u32::try_from(months).unwrap_or(u32::MAX),
            period: PeriodUnit::Month,
            weighting: RiskWeighting::Construction,
            kind: LoanKind::Compound,
        };
        match agent::Borrower::borrow(self, economy, terms)? {
            LoanDecision::Approved(loan) => {
                info!(builder = %self.profile.id, loan = %loan, amount = %terms.amount, "build funded");
            }
            LoanDecision::Refused(reason) => {
                debug!(builder = %self.profile.id, %reason, "build not funded");
                return Ok(());
            }
        }

        while self.headcount(economy) < crew {
            let Some(ask) = economy.markets.labour().and_then(|l| l.ask().price()) else {
                break;
            };
            self.offered = ask;
            if self.hire(economy).is_none() {
                break;
            }
        }
        self.building = self.headcount(economy) > 0;
        self.progress = 0;
        self.spent = Money::ZERO;
        Ok(())
    }

    /// Offer the finished house and stand the crew down.
    fn finish(&mut self, economy: &mut Economy) -> Result<(), AgentError> {
        let id = self.profile.id;
        let market_id = economy
            .markets
            .goods_for(&self.product)
            .ok_or(AgentError::MissingMarket { agent: id })?;
        let min_wage = economy.government.min_wage;
        let Some(market) = economy.markets.goods_mut(market_id) else {
            return Err(AgentError::MissingMarket { agent: id });
        };

        let cost = self.spent.round_dp(2).max(min_wage);
        let asking = cost
            .saturating_mul(Decimal::from(self.profit_margin.saturating_add(100)))
            .checked_div(Decimal::ONE_HUNDRED)
            .unwrap_or(cost)
            .round_dp(2);
        let price = market.bid().price().map_or(asking, |bid| asking.max(bid));
        let lot = market.make_lot(&mut economy.ctx, 1, cost)?;
        let report = market.sell(
            &mut economy.ctx,
            &mut economy.system,
            id,
            self.profile.account,
            lot,
            OrderPrice::Limit(price),
        )?;
        if report.returned.is_some() {
            debug!(builder = %id, "house discarded: market full");
        }
        info!(builder = %id, cost = %cost, price = %price, sold = report.sold, "house finished");

        for (worker, _) in economy.employment.staff(id) {
            self.fire(economy, worker)?;
        }
        self.building = false;
        self.progress = 0;
        self.spent = Money::ZERO;
        self.built = self.built.saturating_add(1);
        Ok(())
    }
}

impl Agent for Builder {
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
        if !self.building {
            self.start(economy)?;
        }
        if self.building {
            let paid = self.pay_salaries(economy)?;
            self.spent = self.spent.saturating_add(paid);
            let crew = u64::try_from(self.headcount(economy)).unwrap_or(u64::MAX);
            self.progress = self.progress.saturating_add(crew);
            if self.progress >= self.labour_input {
                self.finish(economy)?;
            } else if crew == 0 {
                // Everyone walked off unpaid; resume when a crew can be hired.
                self.building = false;
            }
        }
        if !self.building {
            agent::Borrower::repay_what_it_can(self, economy)?;
        }
        Ok(())
    }

    fn lot_expired(&mut self, lot: &Lot) {
        self.spoiled = self.spoiled.saturating_add(lot.quantity());
        debug!(builder = %self.profile.id, lot = %lot.id, "house written off");
    }

    fn describe(&self, economy: &Economy) -> String {
        format!(
            "{} {} (builder, {}) {}, progress {}/{}, built {}, owes {}, deposit {}",
            self.profile.id,
            self.profile.name,
            self.product,
            if self.building { "building" } else { "idle" },
            self.progress,
            self.labour_input,
            self.built,
            agent::Borrower::debt(self, &economy.system),
            self.deposit(economy)
        )
    }
}

impl MarketParticipant for Builder {
    fn account(&self) -> AccountRef {
        self.profile.account
    }
}

impl Employer for Builder {
    fn offered_salary(&self) -> Money {
        self.offered
    }
}

impl agent::Borrower for Builder {}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::agents::testing::economy;
    use threadneedle_market::Market;
    use threadneedle_types::MarketId;

    use crate::config::{AgentCommon, MarketConfig};

    /// The testing economy plus a housing market.
    fn with_housing() -> Economy {
        let mut econ = economy();
        let mut housing = MarketConfig::goods("Housing", "houses");
        housing.max_lot = 1;
        housing.ttl = 120;
        let id: MarketId = econ.ctx.issue().unwrap();
        econ.markets
            .add_goods(Market::new(id, housing.settings()).unwrap());
        econ
    }

    fn builder(econ: &mut Economy, labour_input: u64) -> Builder {
        let profile = Profile::open(econ, "Mason", "Bank", Money::ZERO).unwrap();
        let min_wage = econ.government.min_wage;
        Builder::new(
            profile,
            &BuilderConfig {
                common: AgentCommon::named("Mason"),
                product: "houses".to_owned(),
                labour_input,
                build_time: 1,
                profit_margin: 25,
            },
            min_wage,
        )
    }

    fn list_worker(econ: &mut Economy, name: &str, salary: Money) -> AgentId {
        let profile = Profile::open(econ, name, "Bank", Money::ZERO).unwrap();
        econ.markets
            .labour_mut()
            .unwrap()
            .offer(&mut econ.ctx, profile.id, profile.account, salary)
            .unwrap();
        profile.id
    }

    #[test]
    fn builder_borrows_builds_and_offers_a_house() {
        let mut econ = with_housing();
        let mut mason = builder(&mut econ, 2);
        let a = list_worker(&mut econ, "A", dec!(10));
        let b = list_worker(&mut econ, "B", dec!(10));

        mason.evaluate(&mut econ).unwrap();

        // A crew of two for one step finishes the house.
        assert_eq!(mason.built(), 1);
        assert!(!mason.is_building());
        assert!(!econ.employment.is_employed(a));
        assert!(!econ.employment.is_employed(b));
        assert!(econ.markets.labour().unwrap().is_listed(a));

        // Wage bill 20, marked up by 25%.
        let houses = econ.markets.goods_for("houses").unwrap();
        let market = econ.markets.goods(houses).unwrap();
        assert_eq!(market.inventory(), 1);
        assert_eq!(market.book().asks()[0].price, dec!(25));
        assert_eq!(market.book().asks()[0].item.unit_cost(), dec!(20));

        // Loan of 1.5 x 20 less the wages paid out of it.
        assert!(agent::Borrower::debt(&mason, &econ.system) >= dec!(30));
        assert_eq!(mason.deposit(&econ), dec!(10));
    }

    #[test]
    fn builder_waits_for_a_full_crew() {
        let mut econ = with_housing();
        let mut mason = builder(&mut econ, 2);
        list_worker(&mut econ, "A", dec!(10));

        mason.evaluate(&mut econ).unwrap();
        assert!(!mason.is_building());
        assert_eq!(agent::Borrower::debt(&mason, &econ.system), Money::ZERO);
        assert_eq!(mason.headcount(&econ), 0);
    }

    #[test]
    fn unsold_house_is_reported_spoiled() {
        let mut econ = with_housing();
        let mut mason = builder(&mut econ, 2);
        let houses = econ.markets.goods_for("houses").unwrap();
        let lot = econ
            .markets
            .goods(houses)
            .unwrap()
            .make_lot(&mut econ.ctx, 1, dec!(20))
            .unwrap();
        mason.lot_expired(&lot);
        assert_eq!(mason.spoiled(), 1);
    }
}
