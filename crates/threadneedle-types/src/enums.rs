//! Enumeration types for the Threadneedle simulation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ledger classification
// ---------------------------------------------------------------------------

/// Side of the balance sheet a ledger belongs to.
///
/// Asset ledgers grow on debit; liability and equity ledgers grow on
/// credit. Every posting debits one ledger and credits another, so
/// `assets == liabilities + equity` holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerType {
    /// Left-hand side: what the bank owns (reserves, loans).
    Asset,
    /// Right-hand side: what the bank owes (deposits, interbank borrowing).
    Liability,
    /// Right-hand side: owners' claim (capital, retained earnings).
    Equity,
}

impl LedgerType {
    /// Signed effect of a debit of one unit on a ledger of this type.
    pub const fn debit_sign(self) -> i64 {
        match self {
            Self::Asset => 1,
            Self::Liability | Self::Equity => -1,
        }
    }
}

// ---------------------------------------------------------------------------
// Loans
// ---------------------------------------------------------------------------

/// Interest convention for a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanKind {
    /// Interest each period is `principal * rate`; unpaid interest stays in
    /// arrears.
    Simple,
    /// Interest each period is `outstanding * rate`; unpaid interest is
    /// capitalised into the outstanding principal.
    Compound,
}

/// Basel-style risk category of a loan.
///
/// The weight scales the loan's outstanding capital when computing the
/// lending bank's risk-weighted assets. The category also doubles as the
/// borrower's loan "bucket": an account may hold at most one outstanding
/// loan per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskWeighting {
    /// Cash and cash equivalents.
    Cash,
    /// Lending to government.
    Sovereign,
    /// Lending between banks, including the central bank facility.
    Interbank,
    /// Residential mortgages.
    Mortgage,
    /// Unsecured lending to households.
    Personal,
    /// Working-capital lending to firms.
    Business,
    /// Construction and development lending.
    Construction,
}

impl RiskWeighting {
    /// Risk weight as a whole percentage.
    pub const fn weight_pct(self) -> u32 {
        match self {
            Self::Cash | Self::Sovereign => 0,
            Self::Interbank => 20,
            Self::Mortgage => 35,
            Self::Personal => 75,
            Self::Business => 100,
            Self::Construction => 150,
        }
    }

    /// Risk weight as a multiplier (e.g. `1.5` for construction).
    pub fn weight(self) -> Decimal {
        Decimal::new(i64::from(self.weight_pct()), 2)
    }

    /// Annual risk premium in percentage points added to the base rate.
    pub fn premium(self) -> Decimal {
        match self {
            Self::Cash | Self::Sovereign | Self::Interbank => Decimal::ZERO,
            Self::Mortgage => Decimal::ONE,
            Self::Personal | Self::Business => Decimal::TWO,
            Self::Construction => Decimal::new(3, 0),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Calendar unit used to express loan durations.
///
/// One simulation step is one day; a month is 30 steps and a year 360.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnit {
    /// One step.
    Day,
    /// Thirty steps.
    Month,
    /// Three hundred and sixty steps.
    Year,
}

impl PeriodUnit {
    /// Number of steps in one period of this unit.
    pub const fn steps(self) -> u64 {
        match self {
            Self::Day => 1,
            Self::Month => 30,
            Self::Year => 360,
        }
    }

    /// Fraction of a year covered by one period, used to scale annual rates.
    pub fn year_fraction(self) -> Decimal {
        Decimal::from(self.steps()) / Decimal::from(Self::Year.steps())
    }
}

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

/// What a market trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    /// Consumable lots with a time-to-live.
    Goods,
    /// Workers offering their labour for a salary.
    Labour,
    /// Ownership certificates in a bank.
    Shares,
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn construction_weight_is_one_and_a_half() {
        assert_eq!(RiskWeighting::Construction.weight(), dec!(1.5));
        assert_eq!(RiskWeighting::Cash.weight(), Decimal::ZERO);
    }

    #[test]
    fn period_lengths() {
        assert_eq!(PeriodUnit::Month.steps() * 12, PeriodUnit::Year.steps());
        assert_eq!(PeriodUnit::Year.year_fraction(), Decimal::ONE);
        assert_eq!(PeriodUnit::Day.steps(), 1);
    }

    #[test]
    fn asset_debits_increase() {
        assert_eq!(LedgerType::Asset.debit_sign(), 1);
        assert_eq!(LedgerType::Equity.debit_sign(), -1);
    }
}
