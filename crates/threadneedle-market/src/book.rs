//! Resting interest under price-time priority.
//!
//! Bids are kept best (highest) price first and asks best (lowest) price
//! first. Orders at the same price keep arrival order.

use serde::{Deserialize, Serialize};

use threadneedle_types::{AccountRef, AgentId, Money, OrderId};

/// One resting order. `item` is what a sell order delivers: a lot of goods
/// for a goods market, nothing for labour or shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order<T> {
    /// Order id.
    pub id: OrderId,
    /// Agent that placed the order.
    pub owner: AgentId,
    /// Account that pays or is paid.
    pub account: AccountRef,
    /// Limit price per unit.
    pub price: Money,
    /// Units still wanted or offered.
    pub quantity: u64,
    /// Step the order was placed.
    pub placed: u64,
    /// Payload delivered on a sale.
    pub item: T,
}

/// Both sides of one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook<T> {
    bids: Vec<Order<()>>,
    asks: Vec<Order<T>>,
}

impl<T> Default for OrderBook<T> {
    fn default() -> Self {
        Self {
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }
}

impl<T> OrderBook<T> {
    /// An empty book.
    pub const fn new() -> Self {
        Self {
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Rest a buy order behind every bid at the same or a better price.
    pub fn insert_bid(&mut self, order: Order<()>) {
        let at = self.bids.partition_point(|o| o.price >= order.price);
        self.bids.insert(at, order);
    }

    /// Rest a sell order behind every ask at the same or a better price.
    pub fn insert_ask(&mut self, order: Order<T>) {
        let at = self.asks.partition_point(|o| o.price <= order.price);
        self.asks.insert(at, order);
    }

    /// Highest resting bid.
    pub fn best_bid(&self) -> Option<&Order<()>> {
        self.bids.first()
    }

    /// Lowest resting ask.
    pub fn best_ask(&self) -> Option<&Order<T>> {
        self.asks.first()
    }

    /// Bids in priority order.
    pub fn bids(&self) -> &[Order<()>] {
        &self.bids
    }

    /// Asks in priority order.
    pub fn asks(&self) -> &[Order<T>] {
        &self.asks
    }

    /// Units wanted across all bids.
    pub fn bid_volume(&self) -> u64 {
        self.bids
            .iter()
            .fold(0_u64, |acc, o| acc.saturating_add(o.quantity))
    }

    /// Units offered across all asks.
    pub fn ask_volume(&self) -> u64 {
        self.asks
            .iter()
            .fold(0_u64, |acc, o| acc.saturating_add(o.quantity))
    }

    /// Units `owner` is offering.
    pub fn offered_by(&self, owner: AgentId) -> u64 {
        self.asks
            .iter()
            .filter(|o| o.owner == owner)
            .fold(0_u64, |acc, o| acc.saturating_add(o.quantity))
    }

    /// Mutable ask by id.
    pub fn ask_mut(&mut self, id: OrderId) -> Option<&mut Order<T>> {
        self.asks.iter_mut().find(|o| o.id == id)
    }

    /// Reduce a bid by `units`, removing it when exhausted.
    pub fn fill_bid(&mut self, id: OrderId, units: u64) {
        if let Some(pos) = self.bids.iter().position(|o| o.id == id) {
            let done = self.bids.get_mut(pos).is_some_and(|o| {
                o.quantity = o.quantity.saturating_sub(units);
                o.quantity == 0
            });
            if done {
                self.bids.remove(pos);
            }
        }
    }

    /// Reduce an ask by `units`, removing it when exhausted.
    pub fn fill_ask(&mut self, id: OrderId, units: u64) {
        if let Some(pos) = self.asks.iter().position(|o| o.id == id) {
            let done = self.asks.get_mut(pos).is_some_and(|o| {
                o.quantity = o.quantity.saturating_sub(units);
                o.quantity == 0
            });
            if done {
                self.asks.remove(pos);
            }
        }
    }

    /// Remove and return a bid.
    pub fn remove_bid(&mut self, id: OrderId) -> Option<Order<()>> {
        let pos = self.bids.iter().position(|o| o.id == id)?;
        Some(self.bids.remove(pos))
    }

    /// Remove and return an ask.
    pub fn remove_ask(&mut self, id: OrderId) -> Option<Order<T>> {
        let pos = self.asks.iter().position(|o| o.id == id)?;
        Some(self.asks.remove(pos))
    }

    /// Remove every ask matching `pred`, returning them in priority order.
    pub fn drain_asks(&mut self, mut pred: impl FnMut(&Order<T>) -> bool) -> Vec<Order<T>> {
        let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.asks)
            .into_iter()
            .partition(|o| pred(o));
        self.asks = kept;
        gone
    }

    /// Remove every bid matching `pred`, returning them in priority order.
    pub fn drain_bids(&mut self, mut pred: impl FnMut(&Order<()>) -> bool) -> Vec<Order<()>> {
        let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.bids)
            .into_iter()
            .partition(|o| pred(o));
        self.bids = kept;
        gone
    }

    /// Remove every order placed by `owner`.
    pub fn cancel_all(&mut self, owner: AgentId) {
        self.bids.retain(|o| o.owner != owner);
        self.asks.retain(|o| o.owner != owner);
    }

    /// Whether both sides are empty.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
