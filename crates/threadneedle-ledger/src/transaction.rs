//! Posting builder and validation for general ledgers.
//!
//! Provides a [`TransactionBuilder`] that enforces the double-entry shape of
//! every posting: a debited leg, a credited leg that differs from it, a
//! strictly positive amount and a memo. Builders validate inputs before
//! producing a [`Posting`].

use threadneedle_types::{LedgerRef, Money, Posting};

use crate::LedgerError;

// ---------------------------------------------------------------------------
// Transaction builder
// ---------------------------------------------------------------------------

/// Builder for constructing validated [`Posting`] values.
///
/// # Examples
///
/// ```
/// use threadneedle_ledger::TransactionBuilder;
/// use threadneedle_types::{AccountId, LedgerRef};
/// use rust_decimal::Decimal;
///
/// let posting = TransactionBuilder::new(0, 1)
///     .from(LedgerRef::new("loans", AccountId(2)))
///     .to(LedgerRef::new("deposits", AccountId(2)))
///     .amount(Decimal::new(500, 0))
///     .memo("loan disbursement")
///     .build();
///
/// assert!(posting.is_ok());
/// ```
#[derive(Debug)]
pub struct TransactionBuilder {
    seq: u64,
    step: u64,
    from: Option<LedgerRef>,
    to: Option<LedgerRef>,
    amount: Option<Money>,
    memo: Option<String>,
}

impl TransactionBuilder {
    /// Start building posting number `seq` at `step`.
    pub const fn new(seq: u64, step: u64) -> Self {
        Self {
            seq,
            step,
            from: None,
            to: None,
            amount: None,
            memo: None,
        }
    }

    /// Set the debited leg.
    #[must_use]
    pub fn from(mut self, leg: LedgerRef) -> Self {
        self.from = Some(leg);
        self
    }

    /// Set the credited leg.
    #[must_use]
    pub fn to(mut self, leg: LedgerRef) -> Self {
        self.to = Some(leg);
        self
    }

    /// Set the amount moved.
    #[must_use]
    pub const fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Set the memo.
    #[must_use]
    pub fn memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Validate inputs and produce a [`Posting`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MissingField`] if a field is not set,
    /// [`LedgerError::ZeroAmount`] or [`LedgerError::NegativeAmount`] for a
    /// non-positive amount, and [`LedgerError::SelfTransfer`] when both legs
    /// name the same balance.
    pub fn build(self) -> Result<Posting, LedgerError> {
        let from = self.from.ok_or(LedgerError::MissingField("from"))?;
        let to = self.to.ok_or(LedgerError::MissingField("to"))?;
        let amount = self.amount.ok_or(LedgerError::MissingField("amount"))?;
        let memo = self.memo.ok_or(LedgerError::MissingField("memo"))?;

        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        if amount.is_sign_negative() {
            return Err(LedgerError::NegativeAmount { amount });
        }
        if from == to {
            return Err(LedgerError::SelfTransfer {
                ledger: from.ledger,
                account: from.account,
            });
        }

        Ok(Posting {
            seq: self.seq,
            step: self.step,
            from,
            to,
            amount,
            memo,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use threadneedle_types::AccountId;

    use super::*;

    fn leg(name: &str, id: u64) -> LedgerRef {
        LedgerRef::new(name, AccountId(id))
    }

    #[test]
    fn builder_produces_valid_posting() {
        let result = TransactionBuilder::new(7, 3)
            .from(leg("reserves", 1))
            .to(leg("deposits", 2))
            .amount(dec!(100))
            .memo("print money")
            .build();

        assert!(result.is_ok());
        if let Ok(p) = result {
            assert_eq!(p.seq, 7);
            assert_eq!(p.step, 3);
            assert_eq!(p.amount, dec!(100));
            assert_eq!(p.from.ledger, "reserves");
        }
    }

    #[test]
    fn zero_amount_rejected() {
        let result = TransactionBuilder::new(0, 1)
            .from(leg("reserves", 1))
            .to(leg("deposits", 2))
            .amount(Money::ZERO)
            .memo("x")
            .build();
        assert!(matches!(result, Err(LedgerError::ZeroAmount)));
    }

    #[test]
    fn negative_amount_rejected() {
        let result = TransactionBuilder::new(0, 1)
            .from(leg("reserves", 1))
            .to(leg("deposits", 2))
            .amount(dec!(-3))
            .memo("x")
            .build();
        assert!(matches!(result, Err(LedgerError::NegativeAmount { .. })));
    }

    #[test]
    fn missing_memo_rejected() {
        let result = TransactionBuilder::new(0, 1)
            .from(leg("reserves", 1))
            .to(leg("deposits", 2))
            .amount(dec!(1))
            .build();
        assert!(matches!(result, Err(LedgerError::MissingField("memo"))));
    }

    #[test]
    fn same_balance_on_both_legs_rejected() {
        let result = TransactionBuilder::new(0, 1)
            .from(leg("deposits", 2))
            .to(leg("deposits", 2))
            .amount(dec!(1))
            .memo("loop")
            .build();
        assert!(matches!(result, Err(LedgerError::SelfTransfer { .. })));
    }
}
