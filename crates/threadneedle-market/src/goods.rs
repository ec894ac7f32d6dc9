//! The goods market.
//!
//! Producers offer [`Lot`]s, consumers bid for units. Bid and ask are
//! derived on demand from the book and the trailing sale rate:
//!
//! - **bid** is the best resting buy price.
//! - **ask** starts from the cheapest resting lot, rises by up to
//!   `max_spread` when resting supply is short of the trailing sale rate,
//!   and never falls below `bid + min_spread`.
//!
//! Each incoming order trades at one price: a sale clears at the lowest bid
//! it reaches, a purchase at the ask quoted when it arrived.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use threadneedle_bank::BankingSystem;
use threadneedle_types::{AccountRef, AgentId, LotId, MarketId, Money, OrderId, SimContext};

use crate::book::{Order, OrderBook};
use crate::lot::Lot;
use crate::{absorb, MarketError, OrderPrice, Quote};

/// Market parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSettings {
    /// Display name.
    pub name: String,
    /// Product traded.
    pub product: String,
    /// Largest lot accepted in one sale.
    pub max_lot: u64,
    /// Most units that may rest unsold.
    pub max_inventory: u64,
    /// Smallest gap between bid and ask.
    pub min_spread: Money,
    /// Largest scarcity markup over the cheapest lot.
    pub max_spread: Money,
    /// Deposit a buyer must keep after paying.
    pub min_capital: Money,
    /// Steps a lot survives before spoiling.
    pub ttl: u64,
    /// Steps averaged for the trailing sale rate.
    pub sale_window: usize,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            name: "Market".to_owned(),
            product: "food".to_owned(),
            max_lot: 100,
            max_inventory: 1_000,
            min_spread: Decimal::ONE,
            max_spread: Decimal::new(5, 0),
            min_capital: Decimal::ZERO,
            ttl: 5,
            sale_window: 10,
        }
    }
}

impl MarketSettings {
    /// Check the settings once, at creation.
    pub fn validate(&self) -> Result<(), MarketError> {
        let reason = if self.product.is_empty() {
            "product must be named"
        } else if self.max_lot == 0 {
            "max_lot must be positive"
        } else if self.max_inventory < self.max_lot {
            "max_inventory must hold at least one full lot"
        } else if self.min_spread < Money::ZERO {
            "min_spread must not be negative"
        } else if self.max_spread < Money::ZERO {
            "max_spread must not be negative"
        } else if self.min_capital < Money::ZERO {
            "min_capital must not be negative"
        } else if self.ttl == 0 {
            "ttl must be positive"
        } else if self.sale_window == 0 {
            "sale_window must be positive"
        } else {
            return Ok(());
        };
        Err(MarketError::InvalidSettings {
            reason: reason.to_owned(),
        })
    }
}

/// Outcome of offering a lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleReport {
    /// Agreed unit price, or `None` if nothing cleared.
    pub price: Option<Money>,
    /// Units sold.
    pub sold: u64,
    /// Money received.
    pub proceeds: Money,
    /// Order id of the unsold remainder, if it rests in the book.
    pub rested: Option<OrderId>,
    /// Unsold remainder the market had no room for.
    pub returned: Option<Lot>,
}

/// Outcome of a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuyReport {
    /// Agreed unit price, or `None` if nothing cleared.
    pub price: Option<Money>,
    /// Units bought.
    pub bought: u64,
    /// Money paid.
    pub cost: Money,
    /// Order id of the unfilled remainder, if it rests in the book.
    pub rested: Option<OrderId>,
}

/// Lots removed as spoiled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiryReport {
    /// Each spoiled lot with the agent that offered it.
    pub expired: Vec<(AgentId, Lot)>,
    /// Production cost written off.
    pub written_off: Money,
}

struct Fill {
    order: OrderId,
    counterparty: AccountRef,
    units: u64,
}

/// A continuous double auction for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// Market id.
    pub id: MarketId,
    settings: MarketSettings,
    book: OrderBook<Lot>,
    sales: VecDeque<u64>,
    sold_this_step: u64,
    last_price: Option<Money>,
}

impl Market {
    /// Create a market.
    ///
    /// # Errors
    ///
    /// [`MarketError::InvalidSettings`].
    pub fn new(id: MarketId, settings: MarketSettings) -> Result<Self, MarketError> {
        settings.validate()?;
        Ok(Self {
            id,
            settings,
            book: OrderBook::new(),
            sales: VecDeque::new(),
            sold_this_step: 0,
            last_price: None,
        })
    }

    /// Settings.
    pub const fn settings(&self) -> &MarketSettings {
        &self.settings
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Product traded.
    pub fn product(&self) -> &str {
        &self.settings.product
    }

    /// Largest lot accepted.
    pub const fn max_lot(&self) -> u64 {
        self.settings.max_lot
    }

    /// A fresh lot of this market's product that spoils after the market's
    /// time-to-live.
    ///
    /// # Errors
    ///
    /// [`MarketError::Context`] if no lot id can be issued.
    pub fn make_lot(
        &self,
        ctx: &mut SimContext,
        quantity: u64,
        unit_cost: Money,
    ) -> Result<Lot, MarketError> {
        let id: LotId = ctx.issue()?;
        Ok(Lot::new(
            id,
            self.settings.product.clone(),
            quantity,
            unit_cost,
            ctx.step(),
            self.settings.ttl,
        ))
    }

    /// The order book.
    pub const fn book(&self) -> &OrderBook<Lot> {
        &self.book
    }

    /// Price of the most recent trade.
    pub const fn last_price(&self) -> Option<Money> {
        self.last_price
    }

    /// Units resting unsold.
    pub fn inventory(&self) -> u64 {
        self.book.ask_volume()
    }

    /// Units sold so far this step.
    pub const fn sold_this_step(&self) -> u64 {
        self.sold_this_step
    }

    /// Average units sold per step over the trailing window.
    pub fn sale_rate(&self) -> Decimal {
        if self.sales.is_empty() {
            return Decimal::ZERO;
        }
        let total = self
            .sales
            .iter()
            .fold(0_u64, |acc, n| acc.saturating_add(*n));
        let steps = u64::try_from(self.sales.len()).unwrap_or(u64::MAX);
        Decimal::from(total)
            .checked_div(Decimal::from(steps))
            .unwrap_or(Decimal::ZERO)
    }

    // -----------------------------------------------------------------------
    // Quotes
    // -----------------------------------------------------------------------

    /// Best resting buy price.
    pub fn bid(&self) -> Quote {
        self.book
            .best_bid()
            .map_or(Quote::NoLiquidity, |o| Quote::Price(o.price))
    }

    /// Price a buyer pays now.
    pub fn ask(&self) -> Quote {
        let Some(best) = self.book.best_ask() else {
            return Quote::NoLiquidity;
        };
        let mut ask = best.price.saturating_add(self.scarcity_markup());
        if let Some(bid) = self.bid().price() {
            ask = ask.max(bid.saturating_add(self.settings.min_spread));
        }
        Quote::Price(ask)
    }

    /// Markup from zero to `max_spread` as resting supply falls short of
    /// the trailing sale rate.
    fn scarcity_markup(&self) -> Money {
        let rate = self.sale_rate();
        let supply = Decimal::from(self.inventory());
        if rate.is_zero() || supply >= rate {
            return Money::ZERO;
        }
        rate.saturating_sub(supply)
            .checked_div(rate)
            .map_or(Money::ZERO, |short| {
                self.settings
                    .max_spread
                    .saturating_mul(short)
                    .round_dp(2)
            })
    }

    // -----------------------------------------------------------------------
    // Trading
    // -----------------------------------------------------------------------

    /// Offer `lot` for sale from `seller`, paid into `account`.
    ///
    /// Clears against resting bids at or above the limit (any bid for
    /// [`OrderPrice::Market`]) at the lowest bid reached. Buyers whose
    /// payment fails lose their bid. Whatever is left rests in the book at
    /// the limit, or at the lot's unit cost for a market order, unless that
    /// would exceed `max_inventory`.
    ///
    /// # Errors
    ///
    /// Wrong product, zero or oversized lots, bad limits, and fatal
    /// settlement errors. No sale is not an error.
    pub fn sell(
        &mut self,
        ctx: &mut SimContext,
        system: &mut BankingSystem,
        seller: AgentId,
        account: AccountRef,
        mut lot: Lot,
        price: OrderPrice,
    ) -> Result<SaleReport, MarketError> {
        self.check_lot(&lot)?;
        let price = price.validate()?;
        let floor = match price {
            OrderPrice::Limit(p) => p,
            OrderPrice::Market => Money::ZERO,
        };

        let mut fills = Vec::new();
        let mut wanted = lot.quantity();
        let mut clearing = None;
        for bid in self.book.bids() {
            if wanted == 0 || bid.price < floor {
                break;
            }
            if bid.owner == seller {
                continue;
            }
            let units = bid.quantity.min(wanted);
            wanted = wanted.saturating_sub(units);
            clearing = Some(bid.price);
            fills.push(Fill {
                order: bid.id,
                counterparty: bid.account,
                units,
            });
        }

        let step = ctx.step();
        let mut sold = 0_u64;
        let mut proceeds = Money::ZERO;
        if let Some(unit_price) = clearing {
            for fill in fills {
                let amount = unit_price.saturating_mul(Money::from(fill.units));
                if !self.keeps_capital(system, fill.counterparty, amount) {
                    self.book.remove_bid(fill.order);
                    debug!(
                        market = %self.id,
                        order = %fill.order,
                        "bid cancelled: buyer below min capital"
                    );
                    continue;
                }
                let paid = system.pay(
                    step,
                    fill.counterparty,
                    account,
                    amount,
                    &self.settings.product,
                );
                match paid {
                    Ok(()) => {
                        self.book.fill_bid(fill.order, fill.units);
                        lot.take(fill.units);
                        sold = sold.saturating_add(fill.units);
                        proceeds = proceeds.saturating_add(amount);
                    }
                    Err(e) => {
                        let e = absorb(e)?;
                        self.book.remove_bid(fill.order);
                        warn!(
                            market = %self.id,
                            order = %fill.order,
                            error = %e,
                            "bid cancelled: payment failed"
                        );
                    }
                }
            }
        }

        let price = (sold > 0).then_some(clearing).flatten();
        if let Some(p) = price {
            self.record_sale(sold, p);
        }

        let (rested, returned) = if lot.is_empty() {
            (None, None)
        } else {
            let rest_at = if floor > Money::ZERO {
                floor
            } else {
                lot.unit_cost()
            };
            self.rest_lot(ctx, seller, account, lot, rest_at)?
        };

        debug!(
            market = %self.id,
            seller = %seller,
            sold,
            price = ?price,
            rested = rested.is_some(),
            "sale"
        );
        Ok(SaleReport {
            price,
            sold,
            proceeds,
            rested,
            returned,
        })
    }

    /// Buy up to `quantity` units for `buyer`, paid from `account`.
    ///
    /// Clears against resting lots priced at or below the current ask, all
    /// at that ask, and only if the ask is within the limit. The buyer
    /// never pays below `min_capital`. A failed payment cancels the rest of
    /// the order; otherwise a limit remainder rests as a bid.
    ///
    /// # Errors
    ///
    /// Zero quantity, bad limits and fatal settlement errors.
    pub fn buy(
        &mut self,
        ctx: &mut SimContext,
        system: &mut BankingSystem,
        buyer: AgentId,
        account: AccountRef,
        quantity: u64,
        price: OrderPrice,
    ) -> Result<BuyReport, MarketError> {
        if quantity == 0 {
            return Err(MarketError::ZeroQuantity);
        }
        let price = price.validate()?;
        let ask = self
            .ask()
            .price()
            .filter(|a| price_within(price, *a));

        let step = ctx.step();
        let mut wanted = quantity;
        let mut bought = 0_u64;
        let mut cost = Money::ZERO;
        let mut cancelled = false;

        if let Some(unit_price) = ask {
            let fills: Vec<Fill> = self
                .book
                .asks()
                .iter()
                .filter(|o| o.owner != buyer && o.price <= unit_price)
                .map(|o| Fill {
                    order: o.id,
                    counterparty: o.account,
                    units: o.quantity,
                })
                .collect();

            for fill in fills {
                if wanted == 0 {
                    break;
                }
                let units = fill
                    .units
                    .min(wanted)
                    .min(self.affordable(system, account, unit_price));
                if units == 0 {
                    cancelled = true;
                    break;
                }
                let amount = unit_price.saturating_mul(Money::from(units));
                let paid = system.pay(
                    step,
                    account,
                    fill.counterparty,
                    amount,
                    &self.settings.product,
                );
                if let Err(e) = paid {
                    let e = absorb(e)?;
                    warn!(
                        market = %self.id,
                        buyer = %buyer,
                        error = %e,
                        "purchase cancelled: payment failed"
                    );
                    cancelled = true;
                    break;
                }
                if let Some(o) = self.book.ask_mut(fill.order) {
                    o.item.take(units);
                }
                self.book.fill_ask(fill.order, units);
                wanted = wanted.saturating_sub(units);
                bought = bought.saturating_add(units);
                cost = cost.saturating_add(amount);
            }
        }

        let agreed = (bought > 0).then_some(ask).flatten();
        if let Some(p) = agreed {
            self.record_sale(bought, p);
        }

        let rested = match price {
            OrderPrice::Limit(limit) if wanted > 0 && !cancelled => {
                let id: OrderId = ctx.issue()?;
                self.book.insert_bid(Order {
                    id,
                    owner: buyer,
                    account,
                    price: limit,
                    quantity: wanted,
                    placed: step,
                    item: (),
                });
                Some(id)
            }
            _ => None,
        };

        debug!(market = %self.id, buyer = %buyer, bought, price = ?agreed, "purchase");
        Ok(BuyReport {
            price: agreed,
            bought,
            cost,
            rested,
        })
    }

    /// Withdraw a resting order. A withdrawn sell order hands its lot back.
    ///
    /// # Errors
    ///
    /// [`MarketError::UnknownOrder`].
    pub fn cancel(&mut self, id: OrderId) -> Result<Option<Lot>, MarketError> {
        if self.book.remove_bid(id).is_some() {
            return Ok(None);
        }
        self.book
            .remove_ask(id)
            .map(|o| Some(o.item))
            .ok_or(MarketError::UnknownOrder(id))
    }

    /// Discard every lot spoiled by `step`.
    pub fn expire(&mut self, step: u64) -> ExpiryReport {
        let gone = self.book.drain_asks(|o| o.item.is_expired(step));
        let mut report = ExpiryReport::default();
        for order in gone {
            report.written_off = report.written_off.saturating_add(order.item.cost());
            report.expired.push((order.owner, order.item));
        }
        if !report.expired.is_empty() {
            info!(
                market = %self.id,
                lots = report.expired.len(),
                written_off = %report.written_off,
                "lots expired"
            );
        }
        report
    }

    /// Close the step: roll this step's sales into the trailing window.
    pub fn end_step(&mut self) {
        self.sales.push_back(self.sold_this_step);
        while self.sales.len() > self.settings.sale_window {
            self.sales.pop_front();
        }
        self.sold_this_step = 0;
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn check_lot(&self, lot: &Lot) -> Result<(), MarketError> {
        if lot.product != self.settings.product {
            return Err(MarketError::WrongProduct {
                market: self.id,
                expected: self.settings.product.clone(),
                found: lot.product.clone(),
            });
        }
        if lot.is_empty() {
            return Err(MarketError::ZeroQuantity);
        }
        if lot.quantity() > self.settings.max_lot {
            return Err(MarketError::LotTooLarge {
                quantity: lot.quantity(),
                max_lot: self.settings.max_lot,
            });
        }
        Ok(())
    }

    fn rest_lot(
        &mut self,
        ctx: &mut SimContext,
        seller: AgentId,
        account: AccountRef,
        lot: Lot,
        price: Money,
    ) -> Result<(Option<OrderId>, Option<Lot>), MarketError> {
        let after = self.inventory().saturating_add(lot.quantity());
        if after > self.settings.max_inventory {
            debug!(market = %self.id, seller = %seller, "market full, lot returned");
            return Ok((None, Some(lot)));
        }
        let id: OrderId = ctx.issue()?;
        self.book.insert_ask(Order {
            id,
            owner: seller,
            account,
            price,
            quantity: lot.quantity(),
            placed: ctx.step(),
            item: lot,
        });
        Ok((Some(id), None))
    }

    /// Whether `payer` still holds `min_capital` after paying `amount`.
    fn keeps_capital(&self, system: &BankingSystem, payer: AccountRef, amount: Money) -> bool {
        system.deposit(payer).saturating_sub(amount) >= self.settings.min_capital
    }

    /// Whole units `payer` can buy at `unit_price` without dropping below
    /// `min_capital`.
    fn affordable(&self, system: &BankingSystem, payer: AccountRef, unit_price: Money) -> u64 {
        if unit_price <= Money::ZERO {
            return u64::MAX;
        }
        system
            .deposit(payer)
            .saturating_sub(self.settings.min_capital)
            .checked_div(unit_price)
            .map(|u| u.floor())
            .and_then(|u| u64::try_from(u).ok())
            .unwrap_or(0)
    }

    fn record_sale(&mut self, units: u64, price: Money) {
        self.sold_this_step = self.sold_this_step.saturating_add(units);
        self.last_price = Some(price);
    }
}

fn price_within(price: OrderPrice, ask: Money) -> bool {
    match price {
        OrderPrice::Limit(limit) => ask <= limit,
        OrderPrice::Market => true,
    }
}
