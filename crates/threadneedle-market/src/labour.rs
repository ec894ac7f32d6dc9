//! The labour market.
//!
//! Unemployed workers rest one unit of labour each at their desired
//! salary. An employer hires the cheapest worker whose desired salary its
//! offer meets, at that desired salary. No money moves at hire; salaries are
//! paid by the employer each step.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use threadneedle_types::{AccountRef, AgentId, MarketId, Money, OrderId, SimContext};

use crate::book::{Order, OrderBook};
use crate::{MarketError, OrderPrice, Quote};

/// A completed hire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hire {
    /// Worker hired.
    pub worker: AgentId,
    /// Account the salary goes to.
    pub account: AccountRef,
    /// Agreed salary per step.
    pub salary: Money,
}

/// Workers looking for employment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabourMarket {
    /// Market id.
    pub id: MarketId,
    name: String,
    book: OrderBook<()>,
    hires_this_step: u64,
    last_salary: Option<Money>,
}

impl LabourMarket {
    /// An empty labour market.
    pub fn new(id: MarketId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            book: OrderBook::new(),
            hires_this_step: 0,
            last_salary: None,
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Workers listed in priority order.
    pub fn book(&self) -> &OrderBook<()> {
        &self.book
    }

    /// Number of workers listed.
    pub fn available_workers(&self) -> usize {
        self.book.asks().len()
    }

    /// Whether `worker` is listed.
    pub fn is_listed(&self, worker: AgentId) -> bool {
        self.book.offered_by(worker) > 0
    }

    /// Lowest desired salary on offer.
    pub fn ask(&self) -> Quote {
        self.book
            .best_ask()
            .map_or(Quote::NoLiquidity, |o| Quote::Price(o.price))
    }

    /// Salary agreed at the most recent hire.
    pub const fn last_salary(&self) -> Option<Money> {
        self.last_salary
    }

    /// Hires made so far this step.
    pub const fn hires_this_step(&self) -> u64 {
        self.hires_this_step
    }

    /// List `worker` at `desired` salary, replacing any earlier listing.
    ///
    /// # Errors
    ///
    /// [`MarketError::InvalidPrice`] for a non-positive salary, or
    /// [`MarketError::Context`].
    pub fn offer(
        &mut self,
        ctx: &mut SimContext,
        worker: AgentId,
        account: AccountRef,
        desired: Money,
    ) -> Result<OrderId, MarketError> {
        OrderPrice::Limit(desired).validate()?;
        self.book.cancel_all(worker);
        let id: OrderId = ctx.issue()?;
        self.book.insert_ask(Order {
            id,
            owner: worker,
            account,
            price: desired,
            quantity: 1,
            placed: ctx.step(),
            item: (),
        });
        debug!(market = %self.id, worker = %worker, salary = %desired, "worker listed");
        Ok(id)
    }

    /// Put a worker who has been let go back on the market.
    ///
    /// # Errors
    ///
    /// As [`LabourMarket::offer`].
    pub fn release(
        &mut self,
        ctx: &mut SimContext,
        worker: AgentId,
        account: AccountRef,
        desired: Money,
    ) -> Result<OrderId, MarketError> {
        info!(market = %self.id, worker = %worker, "worker released");
        self.offer(ctx, worker, account, desired)
    }

    /// Take `worker` off the market. Returns whether it was listed.
    pub fn withdraw(&mut self, worker: AgentId) -> bool {
        let listed = self.is_listed(worker);
        self.book.cancel_all(worker);
        listed
    }

    /// Hire the best listed worker whose desired salary `offered` meets.
    /// Returns `None` if nobody will work for that.
    pub fn hire(&mut self, employer: AgentId, offered: Money) -> Option<Hire> {
        let order = self
            .book
            .asks()
            .iter()
            .take_while(|o| o.price <= offered)
            .find(|o| o.owner != employer)
            .map(|o| o.id)?;
        let order = self.book.remove_ask(order)?;
        self.hires_this_step = self.hires_this_step.saturating_add(1);
        self.last_salary = Some(order.price);
        info!(
            market = %self.id,
            employer = %employer,
            worker = %order.owner,
            salary = %order.price,
            "worker hired"
        );
        Some(Hire {
            worker: order.owner,
            account: order.account,
            salary: order.price,
        })
    }

    /// Close the step.
    pub const fn end_step(&mut self) {
        self.hires_this_step = 0;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;
    use threadneedle_types::{AccountId, BankId};

    use super::*;

    fn acct(n: u64) -> AccountRef {
        AccountRef {
            bank: BankId(1),
            account: AccountId(n),
        }
    }

    fn market() -> (SimContext, LabourMarket) {
        (SimContext::new(3), LabourMarket::new(MarketId(9), "Labour"))
    }

    #[test]
    fn hires_cheapest_worker_at_desired_salary() {
        let (mut ctx, mut m) = market();
        m.offer(&mut ctx, AgentId(1), acct(1), dec!(12)).unwrap();
        m.offer(&mut ctx, AgentId(2), acct(2), dec!(10)).unwrap();
        assert_eq!(m.available_workers(), 2);
        assert_eq!(m.ask(), Quote::Price(dec!(10)));

        let hire = m.hire(AgentId(50), dec!(15)).unwrap();
        assert_eq!(hire.worker, AgentId(2));
        assert_eq!(hire.salary, dec!(10));
        assert_eq!(m.available_workers(), 1);
    }

    #[test]
    fn offer_below_every_desired_salary_hires_nobody() {
        let (mut ctx, mut m) = market();
        m.offer(&mut ctx, AgentId(1), acct(1), dec!(12)).unwrap();
        assert!(m.hire(AgentId(50), dec!(11)).is_none());
        assert_eq!(m.available_workers(), 1);
    }

    #[test]
    fn relisting_replaces_previous_offer() {
        let (mut ctx, mut m) = market();
        m.offer(&mut ctx, AgentId(1), acct(1), dec!(12)).unwrap();
        m.release(&mut ctx, AgentId(1), acct(1), dec!(8)).unwrap();
        assert_eq!(m.available_workers(), 1);
        assert_eq!(m.ask(), Quote::Price(dec!(8)));
        assert!(m.withdraw(AgentId(1)));
        assert_eq!(m.ask(), Quote::NoLiquidity);
    }

    #[test]
    fn employer_does_not_hire_itself() {
        let (mut ctx, mut m) = market();
        m.offer(&mut ctx, AgentId(1), acct(1), dec!(5)).unwrap();
        assert!(m.hire(AgentId(1), dec!(10)).is_none());
    }
}
