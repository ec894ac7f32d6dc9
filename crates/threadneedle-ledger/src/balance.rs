//! Accounting identity verification for general ledgers.
//!
//! The identity `assets == liabilities + equity` holds by construction:
//! every posting moves the same amount on both sides. The check here
//! recomputes every ledger total from its balances, compares it with the
//! cache, looks for forbidden negative balances and then checks the
//! identity on the recomputed figures.
//!
//! A violation produces a [`LedgerAnomaly`], which the step engine treats
//! as fatal.

use threadneedle_types::{LedgerType, Money};

use crate::{GeneralLedger, LedgerAnomaly};

/// The result of verifying one general ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceResult {
    /// Totals match their balances and the identity holds.
    Balanced,
    /// At least one check failed.
    Anomaly(LedgerAnomaly),
}

impl BalanceResult {
    /// Whether the books are balanced.
    pub const fn is_balanced(&self) -> bool {
        matches!(self, Self::Balanced)
    }
}

/// Verify cached totals, sign constraints and the accounting identity.
pub fn verify_identity(gl: &GeneralLedger, step: u64) -> BalanceResult {
    let mut issues = Vec::new();
    let mut sums = [Money::ZERO; 3];

    for (slot, side) in [LedgerType::Asset, LedgerType::Liability, LedgerType::Equity]
        .into_iter()
        .enumerate()
    {
        for ledger in gl.side(side) {
            let Some(recomputed) = ledger.recompute_total() else {
                issues.push(format!("overflow summing ledger {}", ledger.name()));
                continue;
            };
            if recomputed != ledger.total() {
                issues.push(format!(
                    "ledger {} cached total {} != recomputed {}",
                    ledger.name(),
                    ledger.total(),
                    recomputed
                ));
            }
            for (account, balance) in ledger.negative_balances() {
                issues.push(format!(
                    "negative balance {balance} in {}/{account}",
                    ledger.name()
                ));
            }
            if let Some(sum) = sums.get_mut(slot) {
                *sum = sum.saturating_add(recomputed);
            }
        }
    }

    let [assets, liabilities, equity] = sums;
    let right = liabilities.saturating_add(equity);
    if assets != right {
        issues.push(format!(
            "assets {assets} != liabilities {liabilities} + equity {equity}"
        ));
    }

    if issues.is_empty() {
        BalanceResult::Balanced
    } else {
        let bank = gl.owner();
        let count = issues.len();
        BalanceResult::Anomaly(LedgerAnomaly {
            step,
            bank,
            assets,
            liabilities,
            equity,
            issues,
            message: format!(
                "LEDGER_ANOMALY at step {step}: {count} problem(s) in the books of {bank}"
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use threadneedle_types::{AccountId, BankId, LedgerRef};

    use super::*;
    use crate::Ledger;

    fn books() -> GeneralLedger {
        let mut gl = GeneralLedger::new(BankId(1));
        assert!(gl.add_ledger(Ledger::new("reserves", LedgerType::Asset)).is_ok());
        assert!(gl.add_ledger(Ledger::new("deposits", LedgerType::Liability)).is_ok());
        assert!(gl.add_ledger(Ledger::new("capital", LedgerType::Equity)).is_ok());
        gl
    }

    #[test]
    fn empty_books_balance() {
        assert!(verify_identity(&books(), 1).is_balanced());
    }

    #[test]
    fn postings_keep_books_balanced() {
        let mut gl = books();
        let house = AccountId(1);
        assert!(gl
            .transfer(
                &LedgerRef::new("reserves", house),
                &LedgerRef::new("deposits", AccountId(2)),
                dec!(70),
                "print",
                1,
            )
            .is_ok());
        assert!(gl
            .transfer(
                &LedgerRef::new("deposits", AccountId(2)),
                &LedgerRef::new("capital", house),
                dec!(20),
                "sell capital",
                1,
            )
            .is_ok());
        assert_eq!(verify_identity(&gl, 1), BalanceResult::Balanced);
    }

    #[test]
    fn tampered_snapshot_is_an_anomaly() {
        // Only assets side populated: identity fails.
        let json = r#"{
            "owner": 1,
            "assets": {"reserves": {"name": "reserves", "ledger_type": "asset",
                        "balances": {"1": "10"}}},
            "liabilities": {},
            "equities": {}
        }"#;
        let gl: Option<GeneralLedger> = serde_json::from_str(json).ok();
        assert!(gl.is_some());
        if let Some(gl) = gl {
            let result = verify_identity(&gl, 4);
            assert!(matches!(result, BalanceResult::Anomaly(ref a) if a.step == 4 && a.assets == dec!(10)));
        }
    }

    #[test]
    fn negative_deposit_is_reported() {
        let json = r#"{
            "owner": 1,
            "assets": {},
            "liabilities": {"deposits": {"name": "deposits", "ledger_type": "liability",
                        "balances": {"2": "-5", "3": "5"}}},
            "equities": {}
        }"#;
        let gl: Option<GeneralLedger> = serde_json::from_str(json).ok();
        assert!(gl.is_some());
        if let Some(gl) = gl {
            let result = verify_identity(&gl, 1);
            assert!(matches!(
                result,
                BalanceResult::Anomaly(ref a)
                    if a.issues.iter().any(|i| i.contains("negative balance"))
            ));
        }
    }
}
