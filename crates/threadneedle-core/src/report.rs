//! Plain-text views of the economy for the command shell and state dumps.
//!
//! Every view is built as a list of lines and joined at the end. Lookups
//! that fail return `None` so the caller can print its own usage message.

use threadneedle_bank::{Bank, BankingSystem};
use threadneedle_ledger::GeneralLedger;
use threadneedle_market::{Order, OrderBook};
use threadneedle_types::{BankId, LedgerType};

use crate::agent::Economy;
use crate::markets::AnyMarket;
use crate::world::World;

const SIDES: [LedgerType; 3] = [LedgerType::Asset, LedgerType::Liability, LedgerType::Equity];

/// Bank by name or id (`B-2` or `2`).
pub fn find_bank<'a>(system: &'a BankingSystem, key: &str) -> Option<&'a Bank> {
    let id = key
        .trim_start_matches("B-")
        .parse::<u64>()
        .ok()
        .map(BankId);
    system
        .banks()
        .find(|b| b.name == key || Some(b.id) == id)
}

fn books(gl: &GeneralLedger, lines: &mut Vec<String>) {
    for side in SIDES {
        for ledger in gl.side(side) {
            lines.push(format!(
                "  {:<18} {:?} total {}",
                ledger.name(),
                side,
                ledger.total()
            ));
            for (account, balance) in ledger.balances() {
                lines.push(format!("    {account} {balance}"));
            }
        }
    }
    lines.push(format!(
        "  assets {} = liabilities {} + equity {}",
        gl.total_assets(),
        gl.total_liabilities(),
        gl.total_equity()
    ));
}

fn bank_lines(bank: &Bank, lines: &mut Vec<String>) {
    let constraints = bank.constraints();
    lines.push(format!(
        "{} {}{} share price {}",
        bank.id,
        bank.name,
        if bank.is_restricted() { " (restricted)" } else { "" },
        bank.share_price()
    ));
    lines.push(format!(
        "  reserve constrained {}, capital constrained {}",
        constraints.reserve, constraints.capital
    ));
    books(bank.books(), lines);
    for loan in bank.loans() {
        lines.push(format!(
            "  loan {} to {} {:?}: principal {} outstanding {} interest due {} ({} periods left)",
            loan.id,
            loan.borrower,
            loan.state(),
            loan.terms.principal,
            loan.outstanding(),
            loan.interest_due(),
            loan.periods_remaining()
        ));
    }
}

/// A bank's chart of accounts, balances and loans.
pub fn ledger(economy: &Economy, key: &str) -> Option<String> {
    let bank = find_bank(&economy.system, key)?;
    let mut lines = Vec::new();
    bank_lines(bank, &mut lines);
    Some(lines.join("\n"))
}

/// A bank's share register.
pub fn shareholders(economy: &Economy, key: &str) -> Option<String> {
    let bank = find_bank(&economy.system, key)?;
    let register = bank.register();
    let mut lines = vec![format!(
        "{} {}: {} of {} authorised shares issued",
        bank.id,
        bank.name,
        register.issued(),
        register.authorised()
    )];
    for (holder, holding) in register.holdings() {
        lines.push(format!(
            "  {holder} {} shares, paid into {}",
            holding.shares, holding.account
        ));
    }
    Some(lines.join("\n"))
}

fn side_lines<T>(label: &str, orders: &[Order<T>], lines: &mut Vec<String>) {
    lines.push(format!("  {label}:"));
    if orders.is_empty() {
        lines.push("    (none)".to_owned());
    }
    for o in orders {
        lines.push(format!(
            "    {} {} {} @ {} placed {}",
            o.id, o.owner, o.quantity, o.price, o.placed
        ));
    }
}

fn book_lines<T>(book: &OrderBook<T>, lines: &mut Vec<String>) {
    side_lines("bids", book.bids(), lines);
    side_lines("asks", book.asks(), lines);
}

/// Resting orders in a market, found by name or id.
pub fn orders(economy: &Economy, key: &str) -> Option<String> {
    let mut lines = Vec::new();
    match economy.markets.find(key)? {
        AnyMarket::Goods(m) => {
            lines.push(format!(
                "{} {} ({}) bid {} ask {} last {}",
                m.id,
                m.name(),
                m.product(),
                m.bid(),
                m.ask(),
                m.last_price()
                    .map_or_else(|| "-".to_owned(), |p| p.to_string())
            ));
            book_lines(m.book(), &mut lines);
        }
        AnyMarket::Labour(m) => {
            lines.push(format!(
                "{} {} ask {} workers available {}",
                m.id,
                m.name(),
                m.ask(),
                m.available_workers()
            ));
            book_lines(m.book(), &mut lines);
        }
        AnyMarket::Shares(m) => {
            lines.push(format!(
                "{} {} (shares of {}) bid {} ask {}",
                m.id,
                economy.markets.name_of(m.id).unwrap_or_default(),
                m.issuer(),
                m.bid(),
                m.ask()
            ));
            book_lines(m.book(), &mut lines);
        }
    }
    Some(lines.join("\n"))
}

/// One agent's description, found by name or id.
pub fn agent(world: &World, key: &str) -> Option<String> {
    let slot = world.find_agent(key)?;
    let economy = world.economy();
    let agent = slot.as_agent();
    let line = agent.describe(economy);
    Some(match economy.government.region_of(agent.id()) {
        Some(region) => format!("{line}, lives in {region}"),
        None => line,
    })
}

/// Everything: banks with their books, markets with their orders, and
/// every agent.
pub fn world(world: &World) -> String {
    let economy = world.economy();
    let mut lines = vec![format!(
        "=== {} at step {} (seed {}) ===",
        world.config().world.name,
        world.current_step(),
        world.seed()
    )];

    let central = economy.system.central();
    lines.push(format!("central bank, base rate {}", central.base_rate()));
    books(central.books(), &mut lines);
    for bank in economy.system.banks() {
        bank_lines(bank, &mut lines);
    }

    lines.extend(
        economy
            .markets
            .ids()
            .into_iter()
            .filter_map(|id| orders(economy, &id.to_string())),
    );

    lines.push(format!("{} employed", economy.employment.len()));
    for slot in world.agents() {
        lines.push(slot.as_agent().describe(economy));
    }
    lines.join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::agents::testing::economy;
    use crate::config::{AgentCommon, AgentConfig, SaverConfig, SimulationConfig};

    #[test]
    fn banks_found_by_name_or_id() {
        let econ = economy();
        let id = econ.system.bank_by_name("Bank").unwrap().id;
        assert_eq!(find_bank(&econ.system, "Bank").unwrap().id, id);
        assert_eq!(find_bank(&econ.system, &id.to_string()).unwrap().id, id);
        assert_eq!(find_bank(&econ.system, &id.0.to_string()).unwrap().id, id);
        assert!(find_bank(&econ.system, "Nowhere").is_none());
    }

    #[test]
    fn ledger_view_balances() {
        let econ = economy();
        let bank = econ.system.bank_by_name("Bank").unwrap();
        let view = ledger(&econ, "Bank").unwrap();
        assert!(view.starts_with(&bank.id.to_string()));
        assert!(view.contains(&format!(
            "assets {} = liabilities {} + equity {}",
            bank.books().total_assets(),
            bank.books().total_liabilities(),
            bank.books().total_equity()
        )));
    }

    #[test]
    fn register_lists_the_founder() {
        let econ = economy();
        let view = shareholders(&econ, "Bank").unwrap();
        assert!(view.contains("50 shares"));
    }

    #[test]
    fn unknown_keys_give_nothing() {
        let econ = economy();
        assert!(ledger(&econ, "nope").is_none());
        assert!(orders(&econ, "nope").is_none());
    }

    #[test]
    fn world_dump_has_every_agent() {
        let mut config = SimulationConfig::default();
        config.agents.push(AgentConfig::Saver(SaverConfig {
            common: AgentCommon::named("Sam"),
        }));
        let world = World::new(config).unwrap();
        let dump = super::world(&world);
        assert!(dump.starts_with("=== "));
        assert!(dump.contains("at step 1"));
        assert!(dump.contains("Sam (saver)"));
    }
}
