//! Capital and reserve adequacy.
//!
//! Every predicate here is a pure function of ledger figures and the
//! central bank's thresholds. Banks evaluate them against the books they
//! would have *after* a proposed operation, before posting anything.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use threadneedle_types::{Money, PeriodUnit};

/// System-wide policy set by the central bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Annual base rate in percent. Floor for every loan price.
    pub base_rate: Decimal,
    /// Minimum reserves as a percentage of deposits.
    pub reserve_pct: Decimal,
    /// Minimum equity as a percentage of risk-weighted assets.
    pub capital_pct: Decimal,
    /// Whether the reserve requirement blocks lending.
    pub enforce_reserve: bool,
    /// Whether the capital requirement blocks lending.
    pub enforce_capital: bool,
    /// Term of central bank loans to commercial banks, in periods.
    pub interbank_duration: u32,
    /// Period unit of central bank loans.
    pub interbank_period: PeriodUnit,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            base_rate: Decimal::new(5, 0),
            reserve_pct: Decimal::new(10, 0),
            capital_pct: Decimal::new(8, 0),
            enforce_reserve: true,
            enforce_capital: true,
            interbank_duration: 12,
            interbank_period: PeriodUnit::Month,
        }
    }
}

/// The balance sheet figures the predicates look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BookFigures {
    /// Reserve assets.
    pub reserves: Money,
    /// Customer deposits.
    pub deposits: Money,
    /// Total equity.
    pub equity: Money,
    /// Risk-weighted assets.
    pub risk_weighted: Money,
}

impl BookFigures {
    /// The figures after disbursing a loan of `amount` with risk weight
    /// `weight` into a deposit at the same bank.
    pub fn after_loan(self, amount: Money, weight: Decimal) -> Self {
        Self {
            deposits: self.deposits.saturating_add(amount),
            risk_weighted: self
                .risk_weighted
                .saturating_add(amount.saturating_mul(weight)),
            ..self
        }
    }

    /// Reserves as a fraction of deposits, `None` with no deposits.
    pub fn reserve_ratio(&self) -> Option<Decimal> {
        self.reserves.checked_div(self.deposits)
    }

    /// Equity as a fraction of risk-weighted assets, `None` with no risk.
    pub fn capital_ratio(&self) -> Option<Decimal> {
        self.equity.checked_div(self.risk_weighted)
    }
}

/// `reserves >= deposits * pct / 100`.
pub fn meets_reserve(figures: &BookFigures, pct: Decimal) -> bool {
    let required = figures.deposits.saturating_mul(pct);
    figures.reserves.saturating_mul(Decimal::ONE_HUNDRED) >= required
}

/// `equity >= risk_weighted * pct / 100`.
pub fn meets_capital(figures: &BookFigures, pct: Decimal) -> bool {
    let required = figures.risk_weighted.saturating_mul(pct);
    figures.equity.saturating_mul(Decimal::ONE_HUNDRED) >= required
}

/// Which requirements the figures currently breach, honouring the policy's
/// enforcement toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Constraints {
    /// Reserve requirement breached.
    pub reserve: bool,
    /// Capital requirement breached.
    pub capital: bool,
}

impl Constraints {
    /// Evaluate both requirements.
    pub fn evaluate(figures: &BookFigures, policy: &Policy) -> Self {
        Self {
            reserve: policy.enforce_reserve && !meets_reserve(figures, policy.reserve_pct),
            capital: policy.enforce_capital && !meets_capital(figures, policy.capital_pct),
        }
    }

    /// Whether any requirement is breached.
    pub const fn any(&self) -> bool {
        self.reserve || self.capital
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn figures() -> BookFigures {
        BookFigures {
            reserves: dec!(100),
            deposits: dec!(1000),
            equity: dec!(80),
            risk_weighted: dec!(1000),
        }
    }

    #[test]
    fn exactly_at_threshold_meets_requirement() {
        assert!(meets_reserve(&figures(), dec!(10)));
        assert!(meets_capital(&figures(), dec!(8)));
    }

    #[test]
    fn loan_at_threshold_breaches_reserve() {
        let after = figures().after_loan(dec!(1), Decimal::ONE);
        assert!(!meets_reserve(&after, dec!(10)));
        assert!(!meets_capital(&after, dec!(8)));
    }

    #[test]
    fn zero_weight_loan_leaves_capital_alone() {
        let after = figures().after_loan(dec!(500), Decimal::ZERO);
        assert!(meets_capital(&after, dec!(8)));
        assert_eq!(after.risk_weighted, dec!(1000));
    }

    #[test]
    fn ratios() {
        assert_eq!(figures().reserve_ratio(), Some(dec!(0.1)));
        assert_eq!(figures().capital_ratio(), Some(dec!(0.08)));
        assert_eq!(BookFigures::default().reserve_ratio(), None);
    }

    #[test]
    fn toggles_disable_constraints() {
        let policy = Policy {
            enforce_reserve: false,
            ..Policy::default()
        };
        let bad = BookFigures {
            reserves: Money::ZERO,
            deposits: dec!(10),
            ..BookFigures::default()
        };
        let c = Constraints::evaluate(&bad, &policy);
        assert!(!c.reserve);
        assert!(!c.capital);
        assert!(!c.any());
    }
}
