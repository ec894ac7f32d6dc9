//! Every market in one economy.
//!
//! Goods markets are keyed by id and found by product; there is at most one
//! labour market; each share market trades one bank's shares.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use threadneedle_market::{ExpiryReport, LabourMarket, Market, StockMarket};
use threadneedle_types::{BankId, MarketId, Money};

/// A market of any kind, borrowed for display.
#[derive(Debug, Clone, Copy)]
pub enum AnyMarket<'a> {
    /// A goods market.
    Goods(&'a Market),
    /// The labour market.
    Labour(&'a LabourMarket),
    /// A share market.
    Shares(&'a StockMarket),
}

/// All markets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Markets {
    goods: BTreeMap<MarketId, Market>,
    labour: Option<LabourMarket>,
    shares: BTreeMap<MarketId, StockMarket>,
    share_names: BTreeMap<MarketId, String>,
}

impl Markets {
    /// No markets.
    pub const fn new() -> Self {
        Self {
            goods: BTreeMap::new(),
            labour: None,
            shares: BTreeMap::new(),
            share_names: BTreeMap::new(),
        }
    }

    /// Add a goods market.
    pub fn add_goods(&mut self, market: Market) -> MarketId {
        let id = market.id;
        self.goods.insert(id, market);
        id
    }

    /// Install the labour market, returning any previous one.
    pub fn set_labour(&mut self, market: LabourMarket) -> Option<LabourMarket> {
        self.labour.replace(market)
    }

    /// Add a share market under a display name.
    pub fn add_shares(&mut self, name: impl Into<String>, market: StockMarket) -> MarketId {
        let id = market.id;
        self.share_names.insert(id, name.into());
        self.shares.insert(id, market);
        id
    }

    /// Goods market by id.
    pub fn goods(&self, id: MarketId) -> Option<&Market> {
        self.goods.get(&id)
    }

    /// Goods market by id.
    pub fn goods_mut(&mut self, id: MarketId) -> Option<&mut Market> {
        self.goods.get_mut(&id)
    }

    /// Id of the goods market trading `product`.
    pub fn goods_for(&self, product: &str) -> Option<MarketId> {
        self.goods
            .values()
            .find(|m| m.product() == product)
            .map(|m| m.id)
    }

    /// Every goods market.
    pub fn all_goods(&self) -> impl Iterator<Item = &Market> {
        self.goods.values()
    }

    /// The labour market.
    pub const fn labour(&self) -> Option<&LabourMarket> {
        self.labour.as_ref()
    }

    /// The labour market.
    pub const fn labour_mut(&mut self) -> Option<&mut LabourMarket> {
        self.labour.as_mut()
    }

    /// Share market by id.
    pub fn shares(&self, id: MarketId) -> Option<&StockMarket> {
        self.shares.get(&id)
    }

    /// Share market by id.
    pub fn shares_mut(&mut self, id: MarketId) -> Option<&mut StockMarket> {
        self.shares.get_mut(&id)
    }

    /// Id of the share market for `bank`.
    pub fn shares_of(&self, bank: BankId) -> Option<MarketId> {
        self.shares
            .values()
            .find(|m| m.issuer() == bank)
            .map(|m| m.id)
    }

    /// Find any market by name or id (`M-3` or `3`).
    pub fn find(&self, key: &str) -> Option<AnyMarket<'_>> {
        let id = key
            .trim_start_matches("M-")
            .parse::<u64>()
            .ok()
            .map(MarketId);
        let goods = self
            .goods
            .values()
            .find(|m| m.name() == key || Some(m.id) == id);
        if let Some(m) = goods {
            return Some(AnyMarket::Goods(m));
        }
        if let Some(m) = self
            .labour
            .as_ref()
            .filter(|m| m.name() == key || Some(m.id) == id)
        {
            return Some(AnyMarket::Labour(m));
        }
        self.shares
            .values()
            .find(|m| {
                Some(m.id) == id || self.share_names.get(&m.id).is_some_and(|n| n == key)
            })
            .map(AnyMarket::Shares)
    }

    /// Ids of every market: goods, then labour, then shares.
    pub fn ids(&self) -> Vec<MarketId> {
        self.goods
            .keys()
            .copied()
            .chain(self.labour.as_ref().map(|m| m.id))
            .chain(self.shares.keys().copied())
            .collect()
    }

    /// Display name of any market.
    pub fn name_of(&self, id: MarketId) -> Option<&str> {
        if let Some(m) = self.goods.get(&id) {
            return Some(m.name());
        }
        if let Some(m) = self.labour.as_ref().filter(|m| m.id == id) {
            return Some(m.name());
        }
        self.share_names.get(&id).map(String::as_str)
    }

    /// Discard spoiled lots in every goods market.
    pub fn expire(&mut self, step: u64) -> Vec<(MarketId, ExpiryReport)> {
        self.goods
            .values_mut()
            .map(|m| (m.id, m.expire(step)))
            .filter(|(_, r)| !r.expired.is_empty())
            .collect()
    }

    /// Units traded across all goods markets this step.
    pub fn units_sold(&self) -> u64 {
        self.goods
            .values()
            .fold(0_u64, |acc, m| acc.saturating_add(m.sold_this_step()))
    }

    /// Hires made this step.
    pub fn hires(&self) -> u64 {
        self.labour.as_ref().map_or(0, LabourMarket::hires_this_step)
    }

    /// Close the step in every market.
    pub fn end_step(&mut self) {
        for m in self.goods.values_mut() {
            m.end_step();
        }
        if let Some(l) = self.labour.as_mut() {
            l.end_step();
        }
    }

    /// Cost of everything resting unsold.
    pub fn inventory_cost(&self) -> Money {
        self.goods
            .values()
            .flat_map(|m| m.book().asks())
            .fold(Money::ZERO, |acc, o| acc.saturating_add(o.item.cost()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use threadneedle_market::MarketSettings;

    use super::*;

    #[test]
    fn markets_are_found_by_name_id_and_product() {
        let mut markets = Markets::new();
        let food = Market::new(MarketId(1), MarketSettings::default()).unwrap();
        markets.add_goods(food);
        markets.set_labour(LabourMarket::new(MarketId(2), "Labour"));
        markets.add_shares("Bank Shares", StockMarket::new(MarketId(3), BankId(7), Money::ONE).unwrap());

        assert_eq!(markets.goods_for("food"), Some(MarketId(1)));
        assert_eq!(markets.shares_of(BankId(7)), Some(MarketId(3)));
        assert!(matches!(markets.find("Labour"), Some(AnyMarket::Labour(_))));
        assert!(matches!(markets.find("M-1"), Some(AnyMarket::Goods(_))));
        assert!(matches!(markets.find("Bank Shares"), Some(AnyMarket::Shares(_))));
        assert!(markets.find("Nowhere").is_none());
        assert_eq!(markets.name_of(MarketId(3)), Some("Bank Shares"));
    }
}
