//! Loans and their repayment schedule.
//!
//! A [`Loan`] moves through `Active -> {Repaid | Defaulted}`. Each period
//! the lending bank calls [`Loan::accrue_interest`], collects up to
//! [`Loan::minimum_payment`] from the borrower, applies it with
//! [`Loan::apply_payment`] and closes the period with [`Loan::end_period`].
//!
//! # Interest conventions
//!
//! - **Simple**: interest each period is `principal * r`. Capital is repaid
//!   in equal slices of `principal / duration`. Unpaid interest stays in
//!   arrears.
//! - **Compound**: interest each period is `outstanding * r`. The borrower
//!   owes a fixed annuity installment; unpaid interest is capitalised.
//!
//! `r` is the annual percentage rate scaled to the loan's period unit.
//! Every interest amount is rounded to cents. The final installment pays
//! the exact residual, so a loan serviced with its minimum payments ends at
//! exactly zero.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use threadneedle_types::{AccountRef, BankId, LoanId, LoanKind, Money, PeriodUnit, RiskWeighting};

/// Decimal places kept on every money amount a loan produces.
pub const MONEY_DP: u32 = 2;

/// Round to cents, halves away from zero.
pub fn round_money(amount: Money) -> Money {
    amount.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Lifecycle state of a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanState {
    /// Being serviced.
    Active,
    /// Outstanding capital reached zero.
    Repaid,
    /// Written off with capital still outstanding.
    Defaulted,
}

/// What closing a period did to the loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodOutcome {
    /// Still active; `capitalised` interest was added to the outstanding
    /// capital (always zero for simple loans).
    Continuing {
        /// Interest moved into outstanding capital this period.
        capitalised: Money,
    },
    /// Fully repaid.
    Repaid,
    /// Duration elapsed, or the bank's policy treats the shortfall as a
    /// default. `write_off` is the capital outstanding at that moment.
    Defaulted {
        /// Capital to write off against the lender's equity.
        write_off: Money,
        /// Interest capitalised before the default.
        capitalised: Money,
    },
}

/// Split of a payment between interest and capital.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaymentSplit {
    /// Portion applied to interest due.
    pub interest: Money,
    /// Portion applied to outstanding capital.
    pub capital: Money,
}

impl PaymentSplit {
    /// Total amount applied.
    pub fn total(&self) -> Money {
        self.interest.saturating_add(self.capital)
    }
}

/// Contract terms fixed when a loan is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Amount disbursed.
    pub principal: Money,
    /// Annual interest rate in percent.
    pub annual_rate: Decimal,
    /// Number of periods.
    pub duration: u32,
    /// Length of one period.
    pub period: PeriodUnit,
    /// Interest convention.
    pub kind: LoanKind,
    /// Risk category, also the borrower's loan bucket.
    pub weighting: RiskWeighting,
}

impl LoanTerms {
    /// Interest rate for one period, as a fraction.
    pub fn period_rate(&self) -> Decimal {
        // annual% * steps / (100 * 360), multiplied first to stay exact.
        let scaled = self
            .annual_rate
            .saturating_mul(Decimal::from(self.period.steps()));
        let per_year = Decimal::ONE_HUNDRED.saturating_mul(Decimal::from(PeriodUnit::Year.steps()));
        scaled.checked_div(per_year).unwrap_or(Decimal::ZERO)
    }

    /// Fixed annuity installment for a compound loan.
    ///
    /// `P * r / (1 - (1 + r)^-n)`, or `P / n` when the rate is zero. Rounded
    /// up to the cent so the installment always covers a period's interest.
    pub fn annuity_installment(&self) -> Money {
        let n = Decimal::from(self.duration.max(1));
        let r = self.period_rate();
        if r.is_zero() {
            return self
                .principal
                .checked_div(n)
                .map_or(self.principal, |x| {
                    x.round_dp_with_strategy(MONEY_DP, RoundingStrategy::AwayFromZero)
                });
        }
        let growth = compound_factor(r, self.duration);
        // P * r * g / (g - 1)
        let numerator = self.principal.saturating_mul(r).saturating_mul(growth);
        let denominator = growth.saturating_sub(Decimal::ONE);
        numerator
            .checked_div(denominator)
            .map_or(self.principal, |x| {
                x.round_dp_with_strategy(MONEY_DP, RoundingStrategy::AwayFromZero)
            })
    }

    /// Capital slice repaid each period on a simple loan.
    pub fn simple_capital_slice(&self) -> Money {
        let n = Decimal::from(self.duration.max(1));
        self.principal
            .checked_div(n)
            .map_or(self.principal, round_money)
    }
}

/// `(1 + r)^n` by repeated multiplication.
fn compound_factor(r: Decimal, n: u32) -> Decimal {
    let base = Decimal::ONE.saturating_add(r);
    (0..n).fold(Decimal::ONE, |acc, _| acc.saturating_mul(base))
}

/// An interest-bearing liability between a borrower account and a lender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    /// Loan id.
    pub id: LoanId,
    /// Account that received the principal and services the loan.
    pub borrower: AccountRef,
    /// Bank that issued the loan.
    pub lender: BankId,
    /// Contract terms.
    pub terms: LoanTerms,
    /// Step at which the principal was disbursed.
    pub issued_at: u64,
    next_due: u64,
    periods_serviced: u32,
    capital_paid: Money,
    interest_paid: Money,
    interest_due: Money,
    capitalised: Money,
    installment: Money,
    state: LoanState,
}

impl Loan {
    /// Create an active loan disbursed at `step`.
    pub fn new(
        id: LoanId,
        borrower: AccountRef,
        lender: BankId,
        terms: LoanTerms,
        step: u64,
    ) -> Self {
        let installment = match terms.kind {
            LoanKind::Compound => terms.annuity_installment(),
            LoanKind::Simple => terms.simple_capital_slice(),
        };
        Self {
            id,
            borrower,
            lender,
            terms,
            issued_at: step,
            next_due: step.saturating_add(terms.period.steps()),
            periods_serviced: 0,
            capital_paid: Money::ZERO,
            interest_paid: Money::ZERO,
            interest_due: Money::ZERO,
            capitalised: Money::ZERO,
            installment,
            state: LoanState::Active,
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> LoanState {
        self.state
    }

    /// Whether the loan is still being serviced.
    pub fn is_active(&self) -> bool {
        self.state == LoanState::Active
    }

    /// Capital still owed: principal plus capitalised interest less capital
    /// repaid.
    pub fn outstanding(&self) -> Money {
        self.terms
            .principal
            .saturating_add(self.capitalised)
            .saturating_sub(self.capital_paid)
    }

    /// Interest accrued and not yet paid.
    pub const fn interest_due(&self) -> Money {
        self.interest_due
    }

    /// Capital repaid so far.
    pub const fn capital_paid(&self) -> Money {
        self.capital_paid
    }

    /// Interest paid so far.
    pub const fn interest_paid(&self) -> Money {
        self.interest_paid
    }

    /// Periods closed so far.
    pub const fn periods_serviced(&self) -> u32 {
        self.periods_serviced
    }

    /// Periods left before maturity.
    pub const fn periods_remaining(&self) -> u32 {
        self.terms.duration.saturating_sub(self.periods_serviced)
    }

    /// Fixed installment: the annuity for compound loans, the capital slice
    /// for simple loans.
    pub const fn installment(&self) -> Money {
        self.installment
    }

    /// Step at which the next period closes.
    pub const fn next_due(&self) -> u64 {
        self.next_due
    }

    /// Whether a period closes at `step`.
    pub fn is_due(&self, step: u64) -> bool {
        self.is_active() && step >= self.next_due
    }

    /// Outstanding capital times the category risk weight.
    pub fn risk_weighted(&self) -> Money {
        if self.is_active() {
            self.outstanding().saturating_mul(self.terms.weighting.weight())
        } else {
            Money::ZERO
        }
    }

    fn is_final_period(&self) -> bool {
        self.periods_serviced.saturating_add(1) >= self.terms.duration
    }

    /// Accrue one period of interest. Returns the amount added to interest
    /// due.
    pub fn accrue_interest(&mut self) -> Money {
        if !self.is_active() {
            return Money::ZERO;
        }
        let basis = match self.terms.kind {
            LoanKind::Simple => self.terms.principal,
            LoanKind::Compound => self.outstanding(),
        };
        let interest = round_money(basis.saturating_mul(self.terms.period_rate()));
        self.interest_due = self.interest_due.saturating_add(interest);
        interest
    }

    /// The payment that keeps the loan on schedule this period.
    ///
    /// In the final period this is everything owed.
    pub fn minimum_payment(&self) -> Money {
        if !self.is_active() {
            return Money::ZERO;
        }
        let owed = self.outstanding().saturating_add(self.interest_due);
        if self.is_final_period() {
            return owed;
        }
        let scheduled = match self.terms.kind {
            LoanKind::Compound => self.installment.max(self.interest_due),
            LoanKind::Simple => self
                .interest_due
                .saturating_add(self.installment.min(self.outstanding())),
        };
        scheduled.min(owed)
    }

    /// Apply a payment: interest due first, then capital. Any excess over
    /// what is owed is not applied; the caller only moves
    /// [`PaymentSplit::total`].
    pub fn apply_payment(&mut self, amount: Money) -> PaymentSplit {
        if !self.is_active() || amount <= Money::ZERO {
            return PaymentSplit::default();
        }
        let interest = amount.min(self.interest_due);
        let rest = amount.saturating_sub(interest);
        let capital = rest.min(self.outstanding());
        self.interest_due = self.interest_due.saturating_sub(interest);
        self.interest_paid = self.interest_paid.saturating_add(interest);
        self.capital_paid = self.capital_paid.saturating_add(capital);
        if self.outstanding().is_zero() {
            self.close_repaid();
        }
        PaymentSplit { interest, capital }
    }

    /// Close the current period.
    ///
    /// Compound loans capitalise unpaid interest. The loan is repaid if
    /// nothing is outstanding; it defaults if the duration has elapsed with
    /// capital outstanding, or immediately when `default_on_shortfall` is set
    /// and `paid` fell short of `required`.
    pub fn end_period(
        &mut self,
        paid: Money,
        required: Money,
        default_on_shortfall: bool,
    ) -> PeriodOutcome {
        if self.state == LoanState::Repaid {
            return PeriodOutcome::Repaid;
        }
        if self.state == LoanState::Defaulted {
            return PeriodOutcome::Defaulted {
                write_off: Money::ZERO,
                capitalised: Money::ZERO,
            };
        }

        let mut capitalised = Money::ZERO;
        if self.terms.kind == LoanKind::Compound && !self.interest_due.is_zero() {
            capitalised = self.interest_due;
            self.capitalised = self.capitalised.saturating_add(capitalised);
            self.interest_due = Money::ZERO;
        }

        self.periods_serviced = self.periods_serviced.saturating_add(1);
        self.next_due = self.next_due.saturating_add(self.terms.period.steps());

        if self.outstanding().is_zero() {
            self.close_repaid();
            return PeriodOutcome::Repaid;
        }

        let matured = self.periods_serviced >= self.terms.duration;
        let missed = default_on_shortfall && paid < required;
        if matured || missed {
            self.state = LoanState::Defaulted;
            return PeriodOutcome::Defaulted {
                write_off: self.outstanding(),
                capitalised,
            };
        }
        PeriodOutcome::Continuing { capitalised }
    }

    fn close_repaid(&mut self) {
        self.state = LoanState::Repaid;
    }
}
