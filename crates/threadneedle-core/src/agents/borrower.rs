//! A household that borrows and spends.
//!
//! Every `borrow_window` steps a borrower without a loan in its bucket asks
//! its bank for one. When a loan is granted it decides, with probability
//! `default_pct` percent, whether it will walk away from it: a defaulting
//! borrower spends its whole deposit and leaves the bank to write the loan
//! off, an honest one keeps back what it still owes.

use rand::Rng;
use serde::{Deserialize, Serialize};
use threadneedle_bank::LoanDecision;
use threadneedle_market::{MarketError, OrderPrice};
use threadneedle_types::{AccountRef, AgentId, LoanKind, Money, OrderId, PeriodUnit, RiskWeighting};
use tracing::{debug, info};

use super::Profile;
use crate::agent::{
    self, Agent, AgentClass, AgentError, Economy, LoanTermsWanted, MarketParticipant,
};
use crate::config::BorrowerConfig;

/// A borrowing household.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrower {
    profile: Profile,
    amount: Money,
    duration: u32,
    period: PeriodUnit,
    weighting: RiskWeighting,
    kind: LoanKind,
    borrow_window: u64,
    default_pct: u32,
    product: Option<String>,
    repay_early: bool,
    defaulting: bool,
    last_request: Option<u64>,
    resting_bid: Option<OrderId>,
}

impl Borrower {
    /// A borrower configured by `config`.
    pub fn new(profile: Profile, config: &BorrowerConfig) -> Self {
        Self {
            profile,
            amount: config.loan_amount,
            duration: config.loan_duration,
            period: config.period,
            weighting: config.weighting,
            kind: config.loan_kind,
            borrow_window: config.borrow_window,
            default_pct: config.default_pct.min(100),
            product: config.product.clone(),
            repay_early: config.repay_early,
            defaulting: false,
            last_request: None,
            resting_bid: None,
        }
    }

    /// Identity and account.
    pub const fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Whether the borrower has decided not to repay its current loan.
    pub const fn is_defaulting(&self) -> bool {
        self.defaulting
    }

    const fn terms(&self) -> LoanTermsWanted {
        LoanTermsWanted {
            amount: self.amount,
            duration: self.duration,
            period: self.period,
            weighting: self.weighting,
            kind: self.kind,
        }
    }

    fn has_loan(&self, economy: &Economy) -> bool {
        economy
            .system
            .account(self.profile.account)
            .is_some_and(|a| a.has_loan_in(self.weighting))
    }

    fn maybe_borrow(&mut self, economy: &mut Economy) -> Result<(), AgentError> {
        let step = economy.ctx.step();
        let due = self
            .last_request
            .is_none_or(|last| step.saturating_sub(last) >= self.borrow_window);
        if !due || self.has_loan(economy) {
            return Ok(());
        }
        self.last_request = Some(step);
        match agent::Borrower::borrow(self, economy, self.terms())? {
            LoanDecision::Approved(loan) => {
                self.defaulting = economy.ctx.rng_mut().random_ratio(self.default_pct, 100);
                info!(
                    borrower = %self.profile.id,
                    loan = %loan,
                    amount = %self.amount,
                    defaulting = self.defaulting,
                    "loan taken"
                );
            }
            LoanDecision::Refused(reason) => {
                debug!(borrower = %self.profile.id, %reason, "loan refused");
            }
        }
        Ok(())
    }

    fn spend(&mut self, economy: &mut Economy) -> Result<(), AgentError> {
        let Some(product) = self.product.as_deref() else {
            return Ok(());
        };
        let id = self.profile.id;
        let market_id = economy
            .markets
            .goods_for(product)
            .ok_or(AgentError::MissingMarket { agent: id })?;
        let keep = if self.defaulting {
            Money::ZERO
        } else {
            agent::Borrower::debt(self, &economy.system)
        };
        let budget = self.deposit(economy).saturating_sub(keep).round_dp(2);
        let Some(market) = economy.markets.goods_mut(market_id) else {
            return Err(AgentError::MissingMarket { agent: id });
        };

        if let Some(order) = self.resting_bid.take() {
            match market.cancel(order) {
                Ok(_) | Err(MarketError::UnknownOrder(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        if budget <= Money::ZERO {
            return Ok(());
        }
        let report = market.buy(
            &mut economy.ctx,
            &mut economy.system,
            id,
            self.profile.account,
            1,
            OrderPrice::Limit(budget),
        )?;
        self.resting_bid = report.rested;
        Ok(())
    }
}

impl Agent for Borrower {
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
        if !self.has_loan(economy) {
            self.defaulting = false;
        }
        self.maybe_borrow(economy)?;
        if self.repay_early && !self.defaulting {
            agent::Borrower::repay_what_it_can(self, economy)?;
        }
        self.spend(economy)
    }

    fn describe(&self, economy: &Economy) -> String {
        let debt = agent::Borrower::debt(self, &economy.system);
        format!(
            "{} {} (borrower) owes {debt}{}, deposit {}",
            self.profile.id,
            self.profile.name,
            if self.defaulting { " (defaulting)" } else { "" },
            self.deposit(economy)
        )
    }
}

impl MarketParticipant for Borrower {
    fn account(&self) -> AccountRef {
        self.profile.account
    }
}

impl agent::Borrower for Borrower {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::agents::testing::economy;
    use crate::config::AgentCommon;

    fn config(default_pct: u32, repay_early: bool) -> BorrowerConfig {
        BorrowerConfig {
            common: AgentCommon::named("Dee"),
            loan_amount: dec!(100),
            loan_duration: 12,
            period: PeriodUnit::Month,
            weighting: RiskWeighting::Personal,
            loan_kind: LoanKind::Compound,
            borrow_window: 30,
            default_pct,
            product: None,
            repay_early,
        }
    }

    #[test]
    fn borrows_once_per_bucket() {
        let mut econ = economy();
        let profile = Profile::open(&mut econ, "Dee", "Bank", Money::ZERO).unwrap();
        let mut dee = Borrower::new(profile, &config(0, false));

        dee.evaluate(&mut econ).unwrap();
        assert_eq!(econ.deposit(dee.account()), dec!(100));
        assert_eq!(agent::Borrower::loans(&dee, &econ.system).len(), 1);
        assert!(!dee.is_defaulting());

        for _ in 0..40 {
            econ.ctx.advance().unwrap();
            dee.evaluate(&mut econ).unwrap();
        }
        assert_eq!(agent::Borrower::loans(&dee, &econ.system).len(), 1);
    }

    #[test]
    fn certain_defaulter_marks_itself() {
        let mut econ = economy();
        let profile = Profile::open(&mut econ, "Dee", "Bank", Money::ZERO).unwrap();
        let mut dee = Borrower::new(profile, &config(100, false));
        dee.evaluate(&mut econ).unwrap();
        assert!(dee.is_defaulting());
    }

    #[test]
    fn early_repayment_clears_the_loan() {
        let mut econ = economy();
        let profile = Profile::open(&mut econ, "Dee", "Bank", dec!(50)).unwrap();
        let mut dee = Borrower::new(profile, &config(0, true));
        dee.evaluate(&mut econ).unwrap();
        assert!(agent::Borrower::loans(&dee, &econ.system).is_empty());
        assert_eq!(econ.deposit(dee.account()), dec!(50));
    }
}
