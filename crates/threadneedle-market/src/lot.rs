//! Perishable lots of goods.

use serde::{Deserialize, Serialize};

use threadneedle_types::{LotId, Money};

/// A quantity of one product made at one step.
///
/// A lot carries its unit production cost so that, if it perishes unsold,
/// the loss can be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    /// Lot id.
    pub id: LotId,
    /// Product name.
    pub product: String,
    quantity: u64,
    unit_cost: Money,
    made_at: u64,
    ttl: u64,
}

impl Lot {
    /// A lot of `quantity` units made at `made_at` that perishes `ttl`
    /// steps later.
    pub fn new(
        id: LotId,
        product: impl Into<String>,
        quantity: u64,
        unit_cost: Money,
        made_at: u64,
        ttl: u64,
    ) -> Self {
        Self {
            id,
            product: product.into(),
            quantity,
            unit_cost,
            made_at,
            ttl,
        }
    }

    /// Units in the lot.
    pub const fn quantity(&self) -> u64 {
        self.quantity
    }

    /// Production cost of one unit.
    pub const fn unit_cost(&self) -> Money {
        self.unit_cost
    }

    /// Production cost of the whole lot.
    pub fn cost(&self) -> Money {
        self.unit_cost.saturating_mul(Money::from(self.quantity))
    }

    /// Step the lot was made.
    pub const fn made_at(&self) -> u64 {
        self.made_at
    }

    /// First step at which the lot is spoiled.
    pub const fn expires_at(&self) -> u64 {
        self.made_at.saturating_add(self.ttl)
    }

    /// Whether the lot has spoiled by `step`.
    pub const fn is_expired(&self, step: u64) -> bool {
        step >= self.expires_at()
    }

    /// Split `quantity` units off into a new lot with the same cost and age.
    /// Returns `None` if the lot holds fewer units.
    pub fn split(&mut self, id: LotId, quantity: u64) -> Option<Self> {
        let remaining = self.quantity.checked_sub(quantity)?;
        self.quantity = remaining;
        Some(Self {
            id,
            product: self.product.clone(),
            quantity,
            unit_cost: self.unit_cost,
            made_at: self.made_at,
            ttl: self.ttl,
        })
    }

    /// Remove `quantity` units. Saturates at zero.
    pub const fn take(&mut self, quantity: u64) {
        self.quantity = self.quantity.saturating_sub(quantity);
    }

    /// Whether nothing is left.
    pub const fn is_empty(&self) -> bool {
        self.quantity == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn split_keeps_cost_and_age() {
        let mut lot = Lot::new(LotId(1), "food", 10, dec!(2), 5, 3);
        let part = lot.split(LotId(2), 4).unwrap();
        assert_eq!(lot.quantity(), 6);
        assert_eq!(part.quantity(), 4);
        assert_eq!(part.cost(), dec!(8));
        assert_eq!(part.expires_at(), 8);
        assert!(lot.split(LotId(3), 7).is_none());
    }

    #[test]
    fn expiry_is_inclusive_of_ttl_step() {
        let lot = Lot::new(LotId(1), "food", 1, dec!(1), 10, 2);
        assert!(!lot.is_expired(11));
        assert!(lot.is_expired(12));
    }
}
