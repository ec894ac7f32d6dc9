//! Integration tests for market clearing against real bank accounts.
//!
//! Buyers and sellers bank at different banks so every trade settles
//! through reserves, and the books are verified after each round.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use rust_decimal_macros::dec;
use threadneedle_bank::{BankSettings, BankingSystem, CentralBank, Policy};
use threadneedle_market::{Market, MarketSettings, OrderPrice, Quote};
use threadneedle_types::{AccountRef, AgentId, BankId, MarketId, Money, SimContext};

struct Economy {
    ctx: SimContext,
    system: BankingSystem,
    banks: Vec<BankId>,
}

fn economy() -> Economy {
    let mut ctx = SimContext::new(2024);
    let central = CentralBank::new(&mut ctx, "Central", Policy::default()).unwrap();
    let mut system = BankingSystem::new(central);
    let banks = ["North", "South"]
        .iter()
        .map(|name| {
            let settings = BankSettings {
                name: (*name).to_owned(),
                ..BankSettings::default()
            };
            system.create_bank(&mut ctx, settings).unwrap()
        })
        .collect();
    Economy { ctx, system, banks }
}

fn account(e: &mut Economy, bank: usize, owner: u64, cash: Money) -> AccountRef {
    let a = e
        .system
        .open_account(&mut e.ctx, e.banks[bank], AgentId(owner))
        .unwrap();
    if cash > Money::ZERO {
        e.system.print_money(1, a, cash, "seed").unwrap();
    }
    a
}

#[test]
fn single_resting_bid_quotes_bid_but_no_ask() {
    let mut e = economy();
    let mut market = Market::new(MarketId(1), MarketSettings::default()).unwrap();
    let buyer = account(&mut e, 0, 1, dec!(100));
    market
        .buy(&mut e.ctx, &mut e.system, AgentId(1), buyer, 1, OrderPrice::Limit(dec!(10)))
        .unwrap();
    assert_eq!(market.ask(), Quote::NoLiquidity);
    assert_eq!(market.bid(), Quote::Price(dec!(10)));
}

#[test]
fn cross_bank_trades_keep_books_balanced() {
    let mut e = economy();
    let mut market = Market::new(MarketId(1), MarketSettings::default()).unwrap();
    let farm = account(&mut e, 0, 1, Money::ZERO);
    let shoppers: Vec<AccountRef> = (0..4).map(|n| account(&mut e, 1, 10 + n, dec!(50))).collect();

    for step in 1..=20_u64 {
        let lot = market.make_lot(&mut e.ctx, 5, dec!(2)).unwrap();
        market
            .sell(&mut e.ctx, &mut e.system, AgentId(1), farm, lot, OrderPrice::Limit(dec!(3)))
            .unwrap();
        for (n, shopper) in shoppers.iter().enumerate() {
            let id = AgentId(10 + u64::try_from(n).unwrap());
            market
                .buy(&mut e.ctx, &mut e.system, id, *shopper, 1, OrderPrice::Limit(dec!(8)))
                .unwrap();
        }

        if let (Some(bid), Some(ask)) = (market.bid().price(), market.ask().price()) {
            assert!(ask >= bid + market.settings().min_spread);
        }
        market.expire(step);
        market.end_step();
        assert!(e.system.verify(step).is_empty());
        e.ctx.advance().unwrap();
    }

    // Money only moved between accounts.
    assert_eq!(e.system.total_deposits(), dec!(200));
    assert!(e.system.deposit(farm) > Money::ZERO);
    assert_eq!(e.system.bank(e.banks[0]).unwrap().reserves(), e.system.deposit(farm));
}

#[test]
fn unsold_inventory_expires_after_ttl() {
    let mut e = economy();
    let settings = MarketSettings {
        ttl: 3,
        ..MarketSettings::default()
    };
    let mut market = Market::new(MarketId(1), settings).unwrap();
    let farm = account(&mut e, 0, 1, Money::ZERO);
    let lot = market.make_lot(&mut e.ctx, 10, dec!(1.5)).unwrap();
    let made = e.ctx.step();
    let report = market
        .sell(&mut e.ctx, &mut e.system, AgentId(1), farm, lot, OrderPrice::Market)
        .unwrap();
    assert_eq!(report.price, None);
    assert_eq!(market.inventory(), 10);

    assert!(market.expire(made + 2).expired.is_empty());
    let expired = market.expire(made + 3);
    assert_eq!(expired.written_off, dec!(15));
    assert_eq!(expired.expired[0].0, AgentId(1));
    assert_eq!(market.ask(), Quote::NoLiquidity);
}
