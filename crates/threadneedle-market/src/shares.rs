//! The stock market for one bank's shares.
//!
//! Clears like the goods market, but what changes hands is a holding in
//! the issuing bank's [`ShareRegister`], so dividends follow the new owner.
//! A sell order is only accepted for shares the seller holds and has not
//! already offered.
//!
//! The quoted ask never falls below `bid + min_spread`, and nothing rests
//! inside the spread: an incoming order first withdraws its owner's
//! resting orders on the other side, and a remainder rests no closer than
//! `min_spread` to the opposite best price.
//!
//! [`ShareRegister`]: threadneedle_bank::ShareRegister

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use threadneedle_bank::{BankError, BankingSystem};
use threadneedle_types::{AccountRef, AgentId, BankId, MarketId, Money, OrderId, SimContext};

use crate::book::{Order, OrderBook};
use crate::{absorb, MarketError, OrderPrice, Quote};

/// One settled share trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareTrade {
    /// Agreed price per share.
    pub price: Money,
    /// Shares moved.
    pub units: u64,
    /// Previous holder.
    pub seller: AgentId,
    /// New holder.
    pub buyer: AgentId,
}

/// Resting bids and offers for one issuer's shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMarket {
    /// Market id.
    pub id: MarketId,
    issuer: BankId,
    min_spread: Money,
    book: OrderBook<()>,
    last_price: Option<Money>,
}

struct Match {
    order: OrderId,
    owner: AgentId,
    account: AccountRef,
    units: u64,
}

impl StockMarket {
    /// An empty market in `issuer`'s shares.
    ///
    /// # Errors
    ///
    /// [`MarketError::InvalidSettings`] for a negative `min_spread`.
    pub fn new(id: MarketId, issuer: BankId, min_spread: Money) -> Result<Self, MarketError> {
        if min_spread < Money::ZERO {
            return Err(MarketError::InvalidSettings {
                reason: "min_spread must not be negative".to_owned(),
            });
        }
        Ok(Self {
            id,
            issuer,
            min_spread,
            book: OrderBook::new(),
            last_price: None,
        })
    }

    /// Issuing bank.
    pub const fn issuer(&self) -> BankId {
        self.issuer
    }

    /// Smallest gap between bid and ask.
    pub const fn min_spread(&self) -> Money {
        self.min_spread
    }

    /// The order book.
    pub const fn book(&self) -> &OrderBook<()> {
        &self.book
    }

    /// Best resting bid.
    pub fn bid(&self) -> Quote {
        self.book
            .best_bid()
            .map_or(Quote::NoLiquidity, |o| Quote::Price(o.price))
    }

    /// Price a buyer pays now: the best offer, floored at
    /// `bid + min_spread`.
    pub fn ask(&self) -> Quote {
        let Some(best) = self.book.best_ask() else {
            return Quote::NoLiquidity;
        };
        let floor = self
            .bid()
            .price()
            .map_or(Money::ZERO, |bid| bid.saturating_add(self.min_spread));
        Quote::Price(best.price.max(floor))
    }

    /// Price of the most recent trade.
    pub const fn last_price(&self) -> Option<Money> {
        self.last_price
    }

    fn holding(&self, system: &BankingSystem, holder: AgentId) -> Result<u64, MarketError> {
        system
            .bank(self.issuer)
            .map(|b| b.register().shares_of(holder))
            .ok_or(MarketError::Bank(BankError::UnknownBank(self.issuer)))
    }

    /// Offer `units` shares held by `seller`, paid into `account`.
    ///
    /// Withdraws the seller's own bids, then clears against bids at or
    /// above the limit at the lowest bid reached. The remainder rests at
    /// the limit, or for a market order at the last trade price (falling
    /// back to the issuer's share price), and never within `min_spread` of
    /// the best remaining bid.
    ///
    /// # Errors
    ///
    /// [`MarketError::InsufficientShares`], bad arguments, and fatal
    /// settlement errors.
    pub fn sell(
        &mut self,
        ctx: &mut SimContext,
        system: &mut BankingSystem,
        seller: AgentId,
        account: AccountRef,
        units: u64,
        price: OrderPrice,
    ) -> Result<Vec<ShareTrade>, MarketError> {
        if units == 0 {
            return Err(MarketError::ZeroQuantity);
        }
        let price = price.validate()?;
        let free = self
            .holding(system, seller)?
            .saturating_sub(self.book.offered_by(seller));
        if free < units {
            return Err(MarketError::InsufficientShares {
                holder: seller,
                held: free,
                requested: units,
            });
        }
        let withdrawn = self.book.drain_bids(|o| o.owner == seller);
        if !withdrawn.is_empty() {
            debug!(market = %self.id, seller = %seller, bids = withdrawn.len(), "own bids withdrawn");
        }

        let floor = match price {
            OrderPrice::Limit(p) => p,
            OrderPrice::Market => Money::ZERO,
        };
        let mut wanted = units;
        let mut clearing = None;
        let mut matches = Vec::new();
        for bid in self.book.bids() {
            if wanted == 0 || bid.price < floor {
                break;
            }
            let take = bid.quantity.min(wanted);
            wanted = wanted.saturating_sub(take);
            clearing = Some(bid.price);
            matches.push(Match {
                order: bid.id,
                owner: bid.owner,
                account: bid.account,
                units: take,
            });
        }

        let mut trades = Vec::new();
        if let Some(unit_price) = clearing {
            for m in matches {
                let amount = unit_price.saturating_mul(Money::from(m.units));
                if let Err(e) = system.pay(ctx.step(), m.account, account, amount, "shares") {
                    let e = absorb(e)?;
                    self.book.remove_bid(m.order);
                    warn!(
                        market = %self.id,
                        order = %m.order,
                        error = %e,
                        "share bid cancelled"
                    );
                    continue;
                }
                system.transfer_shares(self.issuer, seller, m.owner, m.account, m.units)?;
                self.book.fill_bid(m.order, m.units);
                trades.push(self.record(unit_price, m.units, seller, m.owner));
            }
        }

        let sold = trades.iter().fold(0_u64, |acc, t| acc.saturating_add(t.units));
        let left = units.saturating_sub(sold);
        if left > 0 {
            let asked = match price {
                OrderPrice::Limit(p) => p,
                OrderPrice::Market => self.reference_price(system),
            };
            let rest_at = self
                .bid()
                .price()
                .map_or(asked, |bid| asked.max(bid.saturating_add(self.min_spread)));
            let id: OrderId = ctx.issue()?;
            self.book.insert_ask(Order {
                id,
                owner: seller,
                account,
                price: rest_at,
                quantity: left,
                placed: ctx.step(),
                item: (),
            });
        }
        Ok(trades)
    }

    /// Bid for `units` shares for `buyer`, paid from `account`.
    ///
    /// Withdraws the buyer's own offers, then clears against offers at or
    /// below the limit (any offer for a market order), all at one price:
    /// the ask quoted on arrival, or the highest offer reached if that is
    /// dearer. Nothing clears when the quoted ask is above the limit.
    /// Offers whose seller no longer holds the shares are dropped. A failed
    /// payment cancels the rest of the order; otherwise a limit remainder
    /// rests as a bid at the limit, lowered to keep `min_spread` below the
    /// best remaining offer.
    ///
    /// # Errors
    ///
    /// Bad arguments and fatal settlement errors.
    pub fn buy(
        &mut self,
        ctx: &mut SimContext,
        system: &mut BankingSystem,
        buyer: AgentId,
        account: AccountRef,
        units: u64,
        price: OrderPrice,
    ) -> Result<Vec<ShareTrade>, MarketError> {
        if units == 0 {
            return Err(MarketError::ZeroQuantity);
        }
        let price = price.validate()?;
        self.drop_unbacked(system);
        let withdrawn = self.book.drain_asks(|o| o.owner == buyer);
        if !withdrawn.is_empty() {
            debug!(market = %self.id, buyer = %buyer, asks = withdrawn.len(), "own offers withdrawn");
        }

        let quote = self
            .ask()
            .price()
            .filter(|q| !matches!(price, OrderPrice::Limit(limit) if *q > limit));
        let mut wanted = units;
        let mut clearing = None;
        let mut matches = Vec::new();
        if let Some(quote) = quote {
            for ask in self.book.asks() {
                if wanted == 0 {
                    break;
                }
                if matches!(price, OrderPrice::Limit(limit) if ask.price > limit) {
                    break;
                }
                let take = ask.quantity.min(wanted);
                wanted = wanted.saturating_sub(take);
                clearing = Some(quote.max(ask.price));
                matches.push(Match {
                    order: ask.id,
                    owner: ask.owner,
                    account: ask.account,
                    units: take,
                });
            }
        }

        let mut trades = Vec::new();
        let mut cancelled = false;
        if let Some(unit_price) = clearing {
            for m in matches {
                let amount = unit_price.saturating_mul(Money::from(m.units));
                if let Err(e) = system.pay(ctx.step(), account, m.account, amount, "shares") {
                    let e = absorb(e)?;
                    warn!(
                        market = %self.id,
                        buyer = %buyer,
                        error = %e,
                        "share purchase cancelled"
                    );
                    cancelled = true;
                    break;
                }
                system.transfer_shares(self.issuer, m.owner, buyer, account, m.units)?;
                self.book.fill_ask(m.order, m.units);
                trades.push(self.record(unit_price, m.units, m.owner, buyer));
            }
        }

        let bought = trades.iter().fold(0_u64, |acc, t| acc.saturating_add(t.units));
        let left = units.saturating_sub(bought);
        if let OrderPrice::Limit(limit) = price {
            if left > 0 && !cancelled {
                let rest_at = self
                    .book
                    .best_ask()
                    .map_or(limit, |ask| limit.min(ask.price.saturating_sub(self.min_spread)));
                if rest_at > Money::ZERO {
                    let id: OrderId = ctx.issue()?;
                    self.book.insert_bid(Order {
                        id,
                        owner: buyer,
                        account,
                        price: rest_at,
                        quantity: left,
                        placed: ctx.step(),
                        item: (),
                    });
                } else {
                    debug!(market = %self.id, buyer = %buyer, left, "bid dropped: no room below offers");
                }
            }
        }
        Ok(trades)
    }

    /// Drop offers that are no longer backed by a holding.
    fn drop_unbacked(&mut self, system: &BankingSystem) {
        let stale: BTreeSet<AgentId> = self
            .book
            .asks()
            .iter()
            .map(|o| o.owner)
            .filter(|owner| {
                !matches!(
                    self.holding(system, *owner),
                    Ok(held) if held >= self.book.offered_by(*owner)
                )
            })
            .collect();
        for owner in stale {
            self.book.drain_asks(|o| o.owner == owner);
            debug!(market = %self.id, owner = %owner, "unbacked share offers dropped");
        }
    }

    /// Withdraw a resting order.
    ///
    /// # Errors
    ///
    /// [`MarketError::UnknownOrder`].
    pub fn cancel(&mut self, id: OrderId) -> Result<(), MarketError> {
        if self.book.remove_bid(id).is_some() || self.book.remove_ask(id).is_some() {
            Ok(())
        } else {
            Err(MarketError::UnknownOrder(id))
        }
    }

    fn reference_price(&self, system: &BankingSystem) -> Money {
        self.last_price
            .or_else(|| system.bank(self.issuer).map(threadneedle_bank::Bank::share_price))
            .unwrap_or(Money::ONE)
    }

    fn record(&mut self, price: Money, units: u64, seller: AgentId, buyer: AgentId) -> ShareTrade {
        self.last_price = Some(price);
        info!(
            market = %self.id,
            issuer = %self.issuer,
            seller = %seller,
            buyer = %buyer,
            units,
            price = %price,
            "shares traded"
        );
        debug!(market = %self.id, bid = %self.bid(), ask = %self.ask(), "share quotes");
        ShareTrade {
            price,
            units,
            seller,
            buyer,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rust_decimal_macros::dec;
    use threadneedle_bank::{BankSettings, CentralBank, Policy};

    use super::*;

    struct Fixture {
        ctx: SimContext,
        system: BankingSystem,
        bank: BankId,
        market: StockMarket,
    }

    fn fixture() -> Fixture {
        let mut ctx = SimContext::new(8);
        let central = CentralBank::new(&mut ctx, "Central", Policy::default()).unwrap();
        let mut system = BankingSystem::new(central);
        let bank = system.create_bank(&mut ctx, BankSettings::default()).unwrap();
        Fixture {
            ctx,
            system,
            bank,
            market: StockMarket::new(MarketId(3), bank, dec!(1)).unwrap(),
        }
    }

    fn investor(f: &mut Fixture, owner: u64, cash: Money, shares: u64) -> AccountRef {
        let a = f.system.open_account(&mut f.ctx, f.bank, AgentId(owner)).unwrap();
        f.system.print_money(1, a, cash, "seed").unwrap();
        if shares > 0 {
            f.system
                .sell_capital(1, f.bank, AgentId(owner), a, shares, dec!(10), "capital")
                .unwrap();
        }
        a
    }

    #[test]
    fn trade_moves_money_and_register() {
        let mut f = fixture();
        let seller = investor(&mut f, 1, dec!(100), 5);
        let buyer = investor(&mut f, 2, dec!(100), 0);

        let rest = f
            .market
            .sell(&mut f.ctx, &mut f.system, AgentId(1), seller, 3, OrderPrice::Limit(dec!(12)))
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(f.market.ask(), Quote::Price(dec!(12)));

        let trades = f
            .market
            .buy(&mut f.ctx, &mut f.system, AgentId(2), buyer, 2, OrderPrice::Market)
            .unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, dec!(12));
        let register = f.system.bank(f.bank).unwrap().register();
        assert_eq!(register.shares_of(AgentId(1)), 3);
        assert_eq!(register.shares_of(AgentId(2)), 2);
        assert_eq!(f.system.deposit(buyer), dec!(76));
        assert_eq!(f.system.deposit(seller), dec!(74));
        assert_eq!(f.market.book().ask_volume(), 1);
    }

    #[test]
    fn cannot_offer_more_than_held() {
        let mut f = fixture();
        let seller = investor(&mut f, 1, dec!(100), 2);
        f.market
            .sell(&mut f.ctx, &mut f.system, AgentId(1), seller, 2, OrderPrice::Limit(dec!(11)))
            .unwrap();
        let err = f
            .market
            .sell(&mut f.ctx, &mut f.system, AgentId(1), seller, 1, OrderPrice::Limit(dec!(11)))
            .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientShares { held: 0, .. }));
    }

    #[test]
    fn sale_hits_resting_bid() {
        let mut f = fixture();
        let seller = investor(&mut f, 1, dec!(100), 4);
        let buyer = investor(&mut f, 2, dec!(100), 0);
        f.market
            .buy(&mut f.ctx, &mut f.system, AgentId(2), buyer, 4, OrderPrice::Limit(dec!(9)))
            .unwrap();
        assert_eq!(f.market.bid(), Quote::Price(dec!(9)));
        let trades = f
            .market
            .sell(&mut f.ctx, &mut f.system, AgentId(1), seller, 4, OrderPrice::Market)
            .unwrap();
        assert_eq!(trades[0].units, 4);
        assert_eq!(f.market.bid(), Quote::NoLiquidity);
        assert_eq!(
            f.system.bank(f.bank).unwrap().register().shares_of(AgentId(2)),
            4
        );
    }

    #[test]
    fn own_bid_is_withdrawn_before_offering() {
        let mut f = fixture();
        let account = investor(&mut f, 1, dec!(100), 5);
        f.market
            .buy(&mut f.ctx, &mut f.system, AgentId(1), account, 1, OrderPrice::Limit(dec!(12)))
            .unwrap();
        assert_eq!(f.market.bid(), Quote::Price(dec!(12)));

        let trades = f
            .market
            .sell(&mut f.ctx, &mut f.system, AgentId(1), account, 1, OrderPrice::Limit(dec!(10)))
            .unwrap();
        assert!(trades.is_empty());
        assert_eq!(f.market.bid(), Quote::NoLiquidity);
        assert_eq!(f.market.ask(), Quote::Price(dec!(10)));
    }

    #[test]
    fn ask_stays_min_spread_above_bid() {
        let mut f = fixture();
        let seller = investor(&mut f, 1, dec!(100), 5);
        let buyer = investor(&mut f, 2, dec!(100), 0);
        f.market
            .buy(&mut f.ctx, &mut f.system, AgentId(2), buyer, 2, OrderPrice::Limit(dec!(9.5)))
            .unwrap();

        // An offer at 10 would sit inside the spread; it rests at 10.5.
        f.market
            .sell(&mut f.ctx, &mut f.system, AgentId(1), seller, 2, OrderPrice::Limit(dec!(10)))
            .unwrap();
        assert_eq!(f.market.ask(), Quote::Price(dec!(10.5)));

        // A bid limited below the quote does not trade and rests a full
        // spread under the offer.
        let third = investor(&mut f, 3, dec!(100), 0);
        let trades = f
            .market
            .buy(&mut f.ctx, &mut f.system, AgentId(3), third, 1, OrderPrice::Limit(dec!(10)))
            .unwrap();
        assert!(trades.is_empty());
        for o in f.market.book().bids() {
            assert!(o.price <= dec!(9.5));
        }
        let bid = f.market.bid().price().unwrap();
        let ask = f.market.ask().price().unwrap();
        assert!(ask >= bid + f.market.min_spread());
        assert!(f.market.book().best_ask().unwrap().price >= bid + f.market.min_spread());
    }

    #[test]
    fn crossing_limit_trades_at_the_resting_bid() {
        let mut f = fixture();
        let seller = investor(&mut f, 1, dec!(100), 3);
        let buyer = investor(&mut f, 2, dec!(100), 0);
        f.market
            .buy(&mut f.ctx, &mut f.system, AgentId(2), buyer, 1, OrderPrice::Limit(dec!(12)))
            .unwrap();
        let trades = f
            .market
            .sell(&mut f.ctx, &mut f.system, AgentId(1), seller, 1, OrderPrice::Limit(dec!(10)))
            .unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, dec!(12));
        assert!(f.market.book().is_empty());
    }

    #[test]
    fn negative_spread_rejected() {
        let err = StockMarket::new(MarketId(1), BankId(1), dec!(-1)).unwrap_err();
        assert!(matches!(err, MarketError::InvalidSettings { .. }));
    }
}
