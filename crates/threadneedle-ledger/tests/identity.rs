//! Integration tests for the accounting identity across long posting runs.
//!
//! Drives a general ledger through a mix of money creation, lending,
//! repayment, interest, write-offs and rejected postings, checking after
//! every call that the books still balance.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use threadneedle_ledger::{GeneralLedger, Ledger, LedgerError};
use threadneedle_types::{AccountId, BankId, LedgerRef, LedgerType};

const HOUSE: AccountId = AccountId(1);

fn bank_books() -> GeneralLedger {
    let mut gl = GeneralLedger::new(BankId(1));
    gl.add_ledger(Ledger::new("reserves", LedgerType::Asset)).unwrap();
    gl.add_ledger(Ledger::new("loans", LedgerType::Asset)).unwrap();
    gl.add_ledger(Ledger::new("deposits", LedgerType::Liability)).unwrap();
    gl.add_ledger(Ledger::new("capital", LedgerType::Equity)).unwrap();
    gl.add_ledger(Ledger::new("interest_income", LedgerType::Equity)).unwrap();
    gl.add_ledger(Ledger::new("retained_earnings", LedgerType::Equity).allowing_negative())
        .unwrap();
    gl
}

fn at(ledger: &str, account: u64) -> LedgerRef {
    LedgerRef::new(ledger, AccountId(account))
}

fn assert_balanced(gl: &GeneralLedger, step: u64) {
    assert_eq!(
        gl.total_assets(),
        gl.total_liabilities() + gl.total_equity(),
        "identity broken at step {step}"
    );
    assert!(gl.verify(step).is_balanced(), "verification failed at step {step}");
}

#[test]
fn mixed_postings_keep_identity_every_step() {
    let mut gl = bank_books();
    let customers: Vec<u64> = (10..20).collect();

    for step in 1..=120_u64 {
        let who = customers[usize::try_from(step % 10).unwrap()];
        let amount = Decimal::from(step % 7 + 1);

        // Money creation.
        gl.transfer(&LedgerRef::new("reserves", HOUSE), &at("deposits", who), amount, "print", step)
            .unwrap();
        assert_balanced(&gl, step);

        // Lending every third step, partial repayment otherwise.
        if step % 3 == 0 {
            gl.transfer(&at("loans", who), &at("deposits", who), dec!(10), "loan", step)
                .unwrap();
        } else {
            let repay = gl.balance(&at("loans", who)).unwrap().min(dec!(3));
            if !repay.is_zero() {
                gl.transfer(&at("deposits", who), &at("loans", who), repay, "repay", step)
                    .unwrap();
            }
        }
        assert_balanced(&gl, step);

        // Interest.
        gl.transfer(
            &at("deposits", who),
            &LedgerRef::new("interest_income", HOUSE),
            dec!(0.25),
            "interest",
            step,
        )
        .unwrap();
        assert_balanced(&gl, step);

        // A payment that must fail leaves the books untouched.
        let before = gl.journal().len();
        let result = gl.transfer(
            &at("deposits", who),
            &at("deposits", 999),
            dec!(1000000),
            "too much",
            step,
        );
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(gl.journal().len(), before);
        assert_balanced(&gl, step);
    }

    // Write off everything still lent.
    let lent: Vec<(AccountId, Decimal)> = gl
        .ledger("loans")
        .unwrap()
        .balances()
        .filter(|(_, b)| !b.is_zero())
        .collect();
    let equity_before = gl.total_equity();
    let mut written = Decimal::ZERO;
    for (who, amount) in lent {
        gl.transfer(
            &LedgerRef::new("retained_earnings", HOUSE),
            &LedgerRef::new("loans", who),
            amount,
            "write-off",
            121,
        )
        .unwrap();
        written += amount;
    }
    assert_eq!(gl.total_equity(), equity_before - written);
    assert_eq!(gl.ledger_total("loans").unwrap(), Decimal::ZERO);
    assert_balanced(&gl, 121);
}
