//! The step engine that drives a Threadneedle economy.
//!
//! [`World::new`] builds the central bank, the commercial banks, the markets
//! and the government from a [`SimulationConfig`], then creates every agent
//! population in order. Each call to [`World::step`] then runs these phases:
//!
//! 1. **Evaluate** -- every agent acts once, in an order freshly shuffled
//!    from the context's seeded random source.
//!
//! 2. **Service** -- every bank collects payments on loans whose period
//!    closes this step and writes off defaults; the central bank services
//!    interbank loans.
//!
//! 3. **Expire** -- spoiled lots leave the goods markets.
//!
//! 4. **Year end** -- on the last step of a year every bank closes interest
//!    income into retained earnings and pays its configured share of them
//!    out as a dividend.
//!
//! 5. **Close** -- markets roll their per-step statistics and every
//!    account's flow counters reset. Nothing of this step is visible to the
//!    next until this barrier has passed.
//!
//! 6. **Verify** -- every bank's books must satisfy the accounting
//!    identity. Any anomaly aborts the step with a full state dump.
//!
//! A step either completes all six phases or returns a [`StepError`].
//! Given the same configuration and seed, two worlds produce identical
//! step sequences.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use threadneedle_bank::{BankError, BankingSystem, CentralBank};
use threadneedle_ledger::LedgerAnomaly;
use threadneedle_market::{LabourMarket, Market, MarketError, StockMarket};
use threadneedle_types::{
    AccountRef, AgentId, BankId, ContextError, MarketId, MarketKind, Money, SimContext,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agent::{AgentError, Economy};
use crate::agents::{self, AgentSlot};
use crate::config::{ConfigError, SimulationConfig};
use crate::employment::Employment;
use crate::government::Government;
use crate::markets::Markets;
use crate::report;

/// Errors raised while building or reshaping a world.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The configuration is unusable.
    #[error("config error: {source}")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },

    /// A bank could not be created or funded.
    #[error("bank error: {source}")]
    Bank {
        /// The underlying bank error.
        #[from]
        source: BankError,
    },

    /// A market could not be created.
    #[error("market error: {source}")]
    Market {
        /// The underlying market error.
        #[from]
        source: MarketError,
    },

    /// An agent could not be created.
    #[error("agent error: {source}")]
    Agent {
        /// The underlying agent error.
        #[from]
        source: AgentError,
    },

    /// Id allocation failed.
    #[error("context error: {source}")]
    Context {
        /// The underlying context error.
        #[from]
        source: ContextError,
    },

    /// No bank goes by this name.
    #[error("unknown bank {name:?}")]
    UnknownBank {
        /// The name looked up.
        name: String,
    },

    /// No agent matches this name or id.
    #[error("unknown agent {key:?}")]
    UnknownAgent {
        /// The name or id looked up.
        key: String,
    },
}

/// Errors that abort a step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// An agent hit an error that breaks the books.
    #[error("agent {agent} failed: {source}")]
    Agent {
        /// The agent.
        agent: AgentId,
        /// The underlying agent error.
        source: AgentError,
    },

    /// Loan servicing or dividends failed fatally.
    #[error("bank error: {source}")]
    Bank {
        /// The underlying bank error.
        #[from]
        source: BankError,
    },

    /// The step counter overflowed.
    #[error("context error: {source}")]
    Context {
        /// The underlying context error.
        #[from]
        source: ContextError,
    },

    /// At least one bank's books no longer balance.
    #[error(
        "accounting anomaly at step {step}: {count} bank(s) out of balance",
        count = .anomalies.len()
    )]
    Anomaly {
        /// The step that failed.
        step: u64,
        /// Every anomaly found.
        anomalies: Vec<LedgerAnomaly>,
        /// Full textual state at the time of failure.
        dump: String,
    },
}

/// Summary of one completed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    /// The step that ran.
    pub step: u64,
    /// Agents evaluated.
    pub agents: usize,
    /// Agents whose evaluation failed without breaking the books.
    pub failures: u32,
    /// Loan interest collected.
    pub interest: Money,
    /// Loans written off this step.
    pub defaults: usize,
    /// Capital written off this step.
    pub written_off: Money,
    /// Production cost of spoiled lots.
    pub spoiled: Money,
    /// Goods units traded.
    pub units_sold: u64,
    /// Workers hired.
    pub hires: u64,
    /// Workers employed at step end.
    pub employed: usize,
    /// Dividends paid.
    pub dividends: Money,
    /// Deposits across all banks at step end.
    pub deposits: Money,
    /// Reserves across all banks at step end.
    pub reserves: Money,
}

/// Build the institutions a configuration describes, with no agents.
///
/// # Errors
///
/// Bank, market or id allocation failures, or a share market naming an
/// unknown bank.
pub fn build_economy(config: &SimulationConfig) -> Result<Economy, WorldError> {
    let mut ctx = SimContext::new(config.world.seed);
    let central = CentralBank::new(&mut ctx, &config.central_bank.name, config.policy())?;
    let mut system = BankingSystem::new(central);
    for bank in &config.banks {
        let id = system.create_bank(&mut ctx, bank.settings())?;
        debug!(bank = %id, name = %bank.name, "bank created");
    }

    let mut markets = Markets::new();
    for m in &config.markets {
        let id: MarketId = ctx.issue()?;
        match m.kind {
            MarketKind::Goods => {
                markets.add_goods(Market::new(id, m.settings())?);
            }
            MarketKind::Labour => {
                markets.set_labour(LabourMarket::new(id, m.name.clone()));
            }
            MarketKind::Shares => {
                let name = m.bank.clone().unwrap_or_default();
                let bank = bank_id(&system, &name)?;
                markets.add_shares(m.name.clone(), StockMarket::new(id, bank, m.min_spread)?);
            }
        }
        debug!(market = %id, name = %m.name, kind = ?m.kind, "market created");
    }

    Ok(Economy {
        ctx,
        system,
        government: Government::new(&config.government),
        markets,
        employment: Employment::new(),
    })
}

fn bank_id(system: &BankingSystem, name: &str) -> Result<BankId, WorldError> {
    system
        .bank_by_name(name)
        .map(|b| b.id)
        .ok_or_else(|| WorldError::UnknownBank {
            name: name.to_owned(),
        })
}

/// Year-end dividend percentage per bank.
fn dividend_policy(
    config: &SimulationConfig,
    system: &BankingSystem,
) -> Result<BTreeMap<BankId, Decimal>, WorldError> {
    config
        .banks
        .iter()
        .map(|b| Ok((bank_id(system, &b.name)?, b.dividend_pct)))
        .collect()
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// A running economy and its agents.
#[derive(Debug)]
pub struct World {
    run_id: Uuid,
    config: SimulationConfig,
    economy: Economy,
    agents: BTreeMap<AgentId, AgentSlot>,
    dividends: BTreeMap<BankId, Decimal>,
}

impl World {
    /// Build a world from configuration.
    ///
    /// # Errors
    ///
    /// [`WorldError::Config`] if the configuration does not validate, or
    /// any error creating institutions and agents.
    pub fn new(config: SimulationConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let mut economy = build_economy(&config)?;
        let mut agents = BTreeMap::new();
        for population in &config.agents {
            for slot in agents::spawn(&mut economy, population)? {
                agents.insert(slot.as_agent().id(), slot);
            }
        }
        let dividends = dividend_policy(&config, &economy.system)?;
        let run_id = Uuid::now_v7();
        info!(
            run = %run_id,
            name = %config.world.name,
            seed = config.world.seed,
            banks = config.banks.len(),
            agents = agents.len(),
            "world created"
        );
        Ok(Self {
            run_id,
            config,
            economy,
            agents,
            dividends,
        })
    }

    /// Reassemble a world from restored parts.
    pub(crate) fn from_parts(
        run_id: Uuid,
        config: SimulationConfig,
        economy: Economy,
        agents: impl IntoIterator<Item = AgentSlot>,
    ) -> Result<Self, WorldError> {
        let dividends = dividend_policy(&config, &economy.system)?;
        Ok(Self {
            run_id,
            config,
            economy,
            agents: agents
                .into_iter()
                .map(|slot| (slot.as_agent().id(), slot))
                .collect(),
            dividends,
        })
    }

    /// Identifies this run; kept across snapshots, renewed by a reset.
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The configuration the world was built from.
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Everything agents act on.
    pub const fn economy(&self) -> &Economy {
        &self.economy
    }

    /// Everything agents act on.
    pub const fn economy_mut(&mut self) -> &mut Economy {
        &mut self.economy
    }

    /// The step the next call to [`World::step`] will run.
    pub const fn current_step(&self) -> u64 {
        self.economy.ctx.step()
    }

    /// Seed of the random source.
    pub const fn seed(&self) -> u64 {
        self.economy.ctx.seed()
    }

    /// Every agent in id order.
    pub fn agents(&self) -> impl Iterator<Item = &AgentSlot> {
        self.agents.values()
    }

    /// Agent by id.
    pub fn agent(&self, id: AgentId) -> Option<&AgentSlot> {
        self.agents.get(&id)
    }

    /// Agent by name or id (`A-7` or `7`).
    pub fn find_agent(&self, key: &str) -> Option<&AgentSlot> {
        let id = key
            .trim_start_matches("A-")
            .parse::<u64>()
            .ok()
            .map(AgentId);
        self.agents
            .values()
            .find(|slot| slot.as_agent().name() == key || Some(slot.as_agent().id()) == id)
    }

    // -----------------------------------------------------------------------
    // Stepping
    // -----------------------------------------------------------------------

    /// Run one step.
    ///
    /// # Errors
    ///
    /// See [`StepError`]. The world must not be stepped again after an
    /// error.
    pub fn step(&mut self) -> Result<StepSummary, StepError> {
        let step = self.economy.ctx.step();
        debug!(step, "step started");

        let failures = self.evaluate_agents(step)?;

        let service = self.economy.system.service(step)?;
        for (loan, amount) in &service.defaulted {
            warn!(step, loan = %loan, amount = %amount, "loan written off");
        }

        let mut spoiled = Money::ZERO;
        for (market, report) in self.economy.markets.expire(step) {
            info!(
                step,
                market = %market,
                lots = report.expired.len(),
                cost = %report.written_off,
                "lots expired"
            );
            spoiled = spoiled.saturating_add(report.written_off);
            for (owner, lot) in &report.expired {
                if let Some(slot) = self.agents.get_mut(owner) {
                    slot.as_agent_mut().lot_expired(lot);
                }
            }
        }

        let dividends = if self.economy.ctx.end_of_year() {
            self.close_year(step)?
        } else {
            Money::ZERO
        };

        let units_sold = self.economy.markets.units_sold();
        let hires = self.economy.markets.hires();
        self.economy.markets.end_step();
        self.economy.system.reset_flows();

        let anomalies = self.economy.system.verify(step);
        if !anomalies.is_empty() {
            for anomaly in &anomalies {
                error!(step, bank = %anomaly.bank, %anomaly, "accounting identity violated");
            }
            return Err(StepError::Anomaly {
                step,
                anomalies,
                dump: self.dump(),
            });
        }

        let summary = StepSummary {
            step,
            agents: self.agents.len(),
            failures,
            interest: service.interest,
            defaults: service.defaulted.len(),
            written_off: service.written_off(),
            spoiled,
            units_sold,
            hires,
            employed: self.economy.employment.len(),
            dividends,
            deposits: self.economy.system.total_deposits(),
            reserves: self.economy.system.total_reserves(),
        };
        info!(
            step,
            failures,
            interest = %summary.interest,
            defaults = summary.defaults,
            units_sold,
            hires,
            employed = summary.employed,
            deposits = %summary.deposits,
            "step complete"
        );

        self.economy.ctx.advance()?;
        Ok(summary)
    }

    /// Run `steps` steps, stopping at the first error.
    ///
    /// # Errors
    ///
    /// The first [`StepError`].
    pub fn run(&mut self, steps: u64) -> Result<Vec<StepSummary>, StepError> {
        (0..steps).map(|_| self.step()).collect()
    }

    fn evaluate_agents(&mut self, step: u64) -> Result<u32, StepError> {
        let mut order: Vec<AgentId> = self.agents.keys().copied().collect();
        self.economy.ctx.shuffle(&mut order);

        let mut failures = 0_u32;
        for id in order {
            let Some(slot) = self.agents.get_mut(&id) else {
                continue;
            };
            if let Err(err) = slot.as_agent_mut().evaluate(&mut self.economy) {
                if err.is_fatal() {
                    error!(step, agent = %id, %err, "agent failed fatally");
                    return Err(StepError::Agent {
                        agent: id,
                        source: err,
                    });
                }
                warn!(step, agent = %id, %err, "agent action failed");
                failures = failures.saturating_add(1);
            }
        }
        Ok(failures)
    }

    fn close_year(&mut self, step: u64) -> Result<Money, StepError> {
        let closed = self.economy.system.close_earnings(step)?;
        info!(step, closed = %closed, "year closed");

        let mut paid = Money::ZERO;
        for (bank, pct) in &self.dividends {
            if pct.is_zero() {
                continue;
            }
            let total = self
                .economy
                .system
                .bank(*bank)
                .map_or(Money::ZERO, |b| b.distributable())
                .saturating_mul(*pct)
                .checked_div(Decimal::ONE_HUNDRED)
                .unwrap_or_default()
                .round_dp(2);
            if total <= Money::ZERO {
                continue;
            }
            match self.economy.system.pay_dividend(step, *bank, total) {
                Ok(amount) => paid = paid.saturating_add(amount),
                Err(e) if !e.is_fatal() => {
                    warn!(step, bank = %bank, error = %e, "dividend withheld");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(paid)
    }

    // -----------------------------------------------------------------------
    // Operator actions
    // -----------------------------------------------------------------------

    /// Rebuild the world from its configuration, at step 1.
    ///
    /// # Errors
    ///
    /// As [`World::new`].
    pub fn reset(&mut self) -> Result<(), WorldError> {
        *self = Self::new(self.config.clone())?;
        info!(seed = self.seed(), "world reset");
        Ok(())
    }

    /// Reseed the random source. The new seed also applies to later
    /// resets.
    pub fn set_seed(&mut self, seed: u64) {
        self.config.world.seed = seed;
        self.economy.ctx.reseed(seed);
        info!(seed, "seed set");
    }

    /// Set the central bank's base rate, in percent.
    pub fn set_base_rate(&mut self, rate: Decimal) {
        self.economy.system.central_mut().set_base_rate(rate);
    }

    /// Create `amount` of new money in an agent's account.
    ///
    /// # Errors
    ///
    /// [`WorldError::UnknownAgent`], or the bank's refusal.
    pub fn print_money(&mut self, key: &str, amount: Money) -> Result<AccountRef, WorldError> {
        let account = self
            .find_agent(key)
            .map(AgentSlot::account)
            .ok_or_else(|| WorldError::UnknownAgent {
                key: key.to_owned(),
            })?;
        let step = self.economy.ctx.step();
        self.economy
            .system
            .print_money(step, account, amount, "operator")?;
        Ok(account)
    }

    /// Full textual state: every bank's books and every agent.
    pub fn dump(&self) -> String {
        report::world(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rust_decimal_macros::dec;
    use threadneedle_market::OrderPrice;

    use super::*;
    use crate::config::{AgentCommon, AgentConfig, FarmConfig, SaverConfig};

    fn savers(seed: u64) -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.world.seed = seed;
        let mut common = AgentCommon::named("Sam");
        common.count = 4;
        common.initial_deposit = dec!(25);
        config.agents.push(AgentConfig::Saver(SaverConfig { common }));
        config
    }

    #[test]
    fn steps_advance_and_balance() {
        let mut world = World::new(savers(3)).unwrap();
        let summaries = world.run(5).unwrap();
        assert_eq!(summaries.len(), 5);
        assert_eq!(summaries[0].step, 1);
        assert_eq!(summaries[4].step, 5);
        assert_eq!(world.current_step(), 6);
        assert_eq!(summaries[4].deposits, dec!(100));
        assert_eq!(summaries[4].agents, 4);
    }

    #[test]
    fn agents_are_found_by_name_and_id() {
        let world = World::new(savers(3)).unwrap();
        let sam = world.find_agent("Sam-2").unwrap();
        let id = sam.as_agent().id();
        assert_eq!(world.find_agent(&id.to_string()).unwrap(), sam);
        assert!(world.find_agent("Nobody").is_none());
    }

    #[test]
    fn reset_returns_to_step_one() {
        let mut world = World::new(savers(3)).unwrap();
        world.run(3).unwrap();
        world.print_money("Sam-1", dec!(10)).unwrap();
        world.reset().unwrap();
        assert_eq!(world.current_step(), 1);
        assert_eq!(world.economy().system.total_deposits(), dec!(100));
    }

    #[test]
    fn seed_survives_reset() {
        let mut world = World::new(savers(3)).unwrap();
        world.set_seed(99);
        world.reset().unwrap();
        assert_eq!(world.seed(), 99);
    }

    #[test]
    fn spoiled_lots_are_reported_to_their_seller() {
        let mut config = SimulationConfig::default();
        config.agents.push(AgentConfig::Farm(FarmConfig {
            common: AgentCommon::named("Acre"),
            product: "food".to_owned(),
            labour_input: 1,
        }));
        let mut world = World::new(config).unwrap();
        let acre = world.find_agent("Acre").unwrap();
        let (id, account) = (acre.as_agent().id(), acre.account());

        let econ = world.economy_mut();
        let food = econ.markets.goods_for("food").unwrap();
        let market = econ.markets.goods_mut(food).unwrap();
        let lot = market.make_lot(&mut econ.ctx, 3, dec!(2)).unwrap();
        market
            .sell(&mut econ.ctx, &mut econ.system, id, account, lot, OrderPrice::Limit(dec!(9)))
            .unwrap();

        // The default food market keeps a lot for five steps.
        let summaries = world.run(6).unwrap();
        assert_eq!(summaries[5].spoiled, dec!(6));
        assert!(matches!(
            world.agent(id),
            Some(AgentSlot::Farm(acre)) if acre.spoiled() == 3 && acre.written_off() == dec!(6)
        ));
    }

    #[test]
    fn unknown_agent_cannot_be_paid() {
        let mut world = World::new(savers(3)).unwrap();
        let err = world.print_money("Ghost", dec!(1)).unwrap_err();
        assert!(matches!(err, WorldError::UnknownAgent { .. }));
    }
}
