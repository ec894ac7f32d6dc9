//! An investor that capitalises one bank.
//!
//! At creation the investor buys as many new shares as its initial capital
//! covers. Afterwards, whenever its deposit exceeds `min_invest`, it buys
//! more new shares from the bank; once the bank has no authorised shares
//! left it bids for existing shares on the bank's share market instead.
//! Dividends flow back into its deposit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use threadneedle_market::{MarketError, OrderPrice};
use threadneedle_types::{AccountRef, AgentId, BankId, Money, OrderId};
use tracing::{debug, info};

use super::Profile;
use crate::agent::{Agent, AgentClass, AgentError, Economy, MarketParticipant};
use crate::config::BankInvestorConfig;

/// A bank shareholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankInvestor {
    profile: Profile,
    bank: BankId,
    min_invest: Money,
    resting_bid: Option<OrderId>,
}

impl BankInvestor {
    /// An investor in `bank`.
    pub const fn new(profile: Profile, bank: BankId, config: &BankInvestorConfig) -> Self {
        Self {
            profile,
            bank,
            min_invest: config.min_invest,
            resting_bid: None,
        }
    }

    /// Identity and account.
    pub const fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Bank the investor holds shares in.
    pub const fn bank(&self) -> BankId {
        self.bank
    }

    /// Buy `capital` worth of new shares at the bank's share price. Returns
    /// the units bought.
    ///
    /// # Errors
    ///
    /// Bank errors from the sale.
    pub fn subscribe(&self, economy: &mut Economy, capital: Money) -> Result<u64, AgentError> {
        let Some(price) = economy.system.bank(self.bank).map(|b| b.share_price()) else {
            return Ok(0);
        };
        let units = capital
            .checked_div(price)
            .map(|u| u.floor())
            .and_then(|u| u64::try_from(u).ok())
            .unwrap_or(0);
        if units == 0 {
            return Ok(0);
        }
        economy.system.sell_capital(
            economy.ctx.step(),
            self.bank,
            self.profile.id,
            self.profile.account,
            units,
            price,
            "initial capital",
        )?;
        Ok(units)
    }

    fn bid_on_market(&mut self, economy: &mut Economy) -> Result<(), AgentError> {
        let Some(market_id) = economy.markets.shares_of(self.bank) else {
            return Ok(());
        };
        let Some(price) = economy.system.bank(self.bank).map(|b| b.share_price()) else {
            return Ok(());
        };
        let deposit = self.deposit(economy);
        let Some(market) = economy.markets.shares_mut(market_id) else {
            return Ok(());
        };
        if let Some(order) = self.resting_bid.take() {
            match market.cancel(order) {
                Ok(()) | Err(MarketError::UnknownOrder(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        let units = deposit
            .checked_div(price)
            .map(|u| u.floor())
            .and_then(|u| u64::try_from(u).ok())
            .unwrap_or(0);
        if units == 0 {
            return Ok(());
        }
        let trades = market.buy(
            &mut economy.ctx,
            &mut economy.system,
            self.profile.id,
            self.profile.account,
            units,
            OrderPrice::Limit(price),
        )?;
        let bought = trades.iter().fold(0_u64, |acc, t| acc.saturating_add(t.units));
        if bought < units {
            self.resting_bid = market
                .book()
                .bids()
                .iter()
                .find(|o| o.owner == self.profile.id)
                .map(|o| o.id);
        }
        debug!(investor = %self.profile.id, bought, "shares bid for");
        Ok(())
    }
}

impl Agent for BankInvestor {
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
        if self.deposit(economy) <= self.min_invest {
            return Ok(());
        }
        let units = economy.system.sell_investment(
            economy.ctx.step(),
            self.bank,
            self.profile.id,
            self.profile.account,
            "investment",
        )?;
        if units > 0 {
            info!(investor = %self.profile.id, bank = %self.bank, units, "capital invested");
            return Ok(());
        }
        let exhausted = economy
            .system
            .bank(self.bank)
            .is_some_and(|b| b.register().available() == 0);
        if exhausted {
            self.bid_on_market(economy)?;
        }
        Ok(())
    }

    fn describe(&self, economy: &Economy) -> String {
        let shares = economy
            .system
            .bank(self.bank)
            .map_or(0, |b| b.register().shares_of(self.profile.id));
        let value = economy
            .system
            .bank(self.bank)
            .map_or(Money::ZERO, |b| b.share_price().saturating_mul(Decimal::from(shares)));
        format!(
            "{} {} (investor in {}) {shares} shares worth {value}, deposit {}",
            self.profile.id,
            self.profile.name,
            self.bank,
            self.deposit(economy)
        )
    }
}

impl MarketParticipant for BankInvestor {
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
    use crate::config::AgentCommon;

    fn investor(econ: &mut Economy, deposit: Money) -> BankInvestor {
        let profile = Profile::open(econ, "Ivy", "Bank", deposit).unwrap();
        let bank = profile.account.bank;
        BankInvestor::new(
            profile,
            bank,
            &BankInvestorConfig {
                common: AgentCommon::named("Ivy"),
                investment_bank: "Bank".to_owned(),
                initial_capital: Money::ZERO,
                min_invest: dec!(50),
            },
        )
    }

    #[test]
    fn subscribes_then_invests_surplus() {
        let mut econ = economy();
        let ivy = investor(&mut econ, dec!(1000));
        assert_eq!(ivy.subscribe(&mut econ, dec!(205)).unwrap(), 20);
        assert_eq!(econ.deposit(ivy.account()), dec!(800));

        let mut ivy = ivy;
        ivy.evaluate(&mut econ).unwrap();
        let bank = econ.system.bank(ivy.bank()).unwrap();
        assert_eq!(bank.register().shares_of(ivy.id()), 100);
        assert_eq!(econ.deposit(ivy.account()), Money::ZERO);
    }

    #[test]
    fn small_deposit_is_left_alone() {
        let mut econ = economy();
        let mut ivy = investor(&mut econ, dec!(40));
        ivy.evaluate(&mut econ).unwrap();
        assert_eq!(econ.deposit(ivy.account()), dec!(40));
    }
}
