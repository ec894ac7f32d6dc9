//! Concrete agent kinds and their creation from configuration.
//!
//! # Modules
//!
//! - [`saver`] -- [`Saver`]: holds a deposit.
//! - [`worker`] -- [`Worker`]: sells labour, buys goods.
//! - [`farm`] -- [`Farm`]: employs workers, sells what they make.
//! - [`borrower`] -- [`Borrower`]: borrows from its bank and spends.
//! - [`investor`] -- [`BankInvestor`]: buys and holds bank capital.
//! - [`builder`] -- [`Builder`]: borrows to build houses and sells them.
//! - [`work_bank`] -- [`WorkBank`]: a bank's staff, paid from its earnings.
//!
//! Every live agent sits in an [`AgentSlot`], a closed enum over the kinds
//! above, so the whole population serializes into a snapshot and
//! deserializes back without a registry of constructors.

pub mod borrower;
pub mod builder;
pub mod farm;
pub mod investor;
pub mod saver;
pub mod work_bank;
pub mod worker;

pub use borrower::Borrower;
pub use builder::Builder;
pub use farm::Farm;
pub use investor::BankInvestor;
pub use saver::Saver;
pub use work_bank::WorkBank;
pub use worker::Worker;

use serde::{Deserialize, Serialize};
use threadneedle_types::{AccountRef, AgentId, Money};
use tracing::debug;

use crate::agent::{Agent, AgentClass, AgentError, Economy};
use crate::config::AgentConfig;

/// Identity shared by every agent: id, name and the account it trades
/// through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Agent id.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// The agent's account.
    pub account: AccountRef,
}

impl Profile {
    /// Issue an id, open an account at the bank called `bank` and print
    /// `deposit` into it.
    ///
    /// # Errors
    ///
    /// [`AgentError::UnknownBank`], or bank and context errors.
    pub fn open(
        economy: &mut Economy,
        name: &str,
        bank: &str,
        deposit: Money,
    ) -> Result<Self, AgentError> {
        let bank_id = economy
            .system
            .bank_by_name(bank)
            .map(|b| b.id)
            .ok_or_else(|| AgentError::UnknownBank {
                name: bank.to_owned(),
            })?;
        let id: AgentId = economy.ctx.issue()?;
        let account = economy
            .system
            .open_account(&mut economy.ctx, bank_id, id)?;
        if deposit > Money::ZERO {
            economy
                .system
                .print_money(economy.ctx.step(), account, deposit, "initial deposit")?;
        }
        Ok(Self {
            id,
            name: name.to_owned(),
            account,
        })
    }
}

/// One live agent of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentSlot {
    /// A saver.
    Saver(Saver),
    /// A worker.
    Worker(Worker),
    /// A farm.
    Farm(Farm),
    /// A borrower.
    Borrower(Borrower),
    /// A bank investor.
    BankInvestor(BankInvestor),
    /// A house builder.
    Builder(Builder),
    /// A bank's staff.
    WorkBank(WorkBank),
}

impl AgentSlot {
    /// The agent behind the slot.
    pub fn as_agent(&self) -> &dyn Agent {
        match self {
            Self::Saver(a) => a,
            Self::Worker(a) => a,
            Self::Farm(a) => a,
            Self::Borrower(a) => a,
            Self::BankInvestor(a) => a,
            Self::Builder(a) => a,
            Self::WorkBank(a) => a,
        }
    }

    /// The agent behind the slot.
    pub fn as_agent_mut(&mut self) -> &mut dyn Agent {
        match self {
            Self::Saver(a) => a,
            Self::Worker(a) => a,
            Self::Farm(a) => a,
            Self::Borrower(a) => a,
            Self::BankInvestor(a) => a,
            Self::Builder(a) => a,
            Self::WorkBank(a) => a,
        }
    }

    /// The agent's account.
    pub const fn account(&self) -> AccountRef {
        match self {
            Self::Saver(a) => a.profile().account,
            Self::Worker(a) => a.profile().account,
            Self::Farm(a) => a.profile().account,
            Self::Borrower(a) => a.profile().account,
            Self::BankInvestor(a) => a.profile().account,
            Self::Builder(a) => a.profile().account,
            Self::WorkBank(a) => a.profile().account,
        }
    }

    /// Kind name as written in configuration.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Saver(_) => "saver",
            Self::Worker(_) => "worker",
            Self::Farm(_) => "farm",
            Self::Borrower(_) => "borrower",
            Self::BankInvestor(_) => "bank_investor",
            Self::Builder(_) => "builder",
            Self::WorkBank(_) => "work_bank",
        }
    }

    /// Whether the agent is a company.
    pub fn is_company(&self) -> bool {
        self.as_agent().class() == AgentClass::Company
    }
}

/// Create every agent one configuration entry describes, in order.
///
/// Agents of a population larger than one are numbered `name-1`,
/// `name-2`, ...
///
/// # Errors
///
/// Any error opening accounts, printing initial deposits or selling
/// initial capital.
pub fn spawn(economy: &mut Economy, config: &AgentConfig) -> Result<Vec<AgentSlot>, AgentError> {
    let common = config.common();
    let mut spawned = Vec::new();
    for n in 1..=common.count {
        let name = if common.count == 1 {
            common.name.clone()
        } else {
            format!("{}-{n}", common.name)
        };
        let extra = match config {
            AgentConfig::BankInvestor(c) => c.initial_capital,
            _ => Money::ZERO,
        };
        let profile = Profile::open(
            economy,
            &name,
            &common.bank,
            common.initial_deposit.saturating_add(extra),
        )?;
        economy
            .government
            .settle(profile.id, common.region.as_deref());

        let slot = match config {
            AgentConfig::Saver(_) => AgentSlot::Saver(Saver::new(profile)),
            AgentConfig::Worker(c) => AgentSlot::Worker(Worker::new(profile, c)),
            AgentConfig::Farm(c) => {
                let min_wage = economy.government.min_wage;
                AgentSlot::Farm(Farm::new(profile, c, min_wage))
            }
            AgentConfig::Borrower(c) => AgentSlot::Borrower(Borrower::new(profile, c)),
            AgentConfig::BankInvestor(c) => {
                let bank = economy
                    .system
                    .bank_by_name(&c.investment_bank)
                    .map(|b| b.id)
                    .ok_or_else(|| AgentError::UnknownBank {
                        name: c.investment_bank.clone(),
                    })?;
                let investor = BankInvestor::new(profile, bank, c);
                investor.subscribe(economy, c.initial_capital)?;
                AgentSlot::BankInvestor(investor)
            }
            AgentConfig::Builder(c) => {
                let min_wage = economy.government.min_wage;
                AgentSlot::Builder(Builder::new(profile, c, min_wage))
            }
            AgentConfig::WorkBank(c) => {
                let min_wage = economy.government.min_wage;
                AgentSlot::WorkBank(WorkBank::new(profile, c, min_wage))
            }
        };
        debug!(agent = %slot.as_agent().id(), name = %name, kind = slot.kind(), "agent created");
        spawned.push(slot);
    }
    Ok(spawned)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing {
    use rust_decimal_macros::dec;

    use super::Profile;
    use crate::agent::Economy;
    use crate::config::SimulationConfig;
    use crate::world;

    /// The default economy with its bank capitalised by a founder, so that
    /// it can lend.
    pub fn economy() -> Economy {
        let mut econ = world::build_economy(&SimulationConfig::default()).unwrap();
        let founder = Profile::open(&mut econ, "Founder", "Bank", dec!(1000)).unwrap();
        econ.system
            .sell_capital(
                econ.ctx.step(),
                founder.account.bank,
                founder.id,
                founder.account,
                50,
                dec!(10),
                "founding capital",
            )
            .unwrap();
        econ
    }
}
