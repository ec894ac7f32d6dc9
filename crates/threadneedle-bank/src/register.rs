//! Shareholder register of one bank.
//!
//! Tracks how many shares the bank may issue, how many it has issued and
//! who holds them. The register is the routing table for dividends, so
//! every share trade must update it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use threadneedle_types::{AccountRef, AgentId, Money};

use crate::BankError;

/// One shareholder's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    /// Shares held.
    pub shares: u64,
    /// Account that receives dividends.
    pub account: AccountRef,
}

/// Authorised and issued shares plus holdings by agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRegister {
    authorised: u64,
    issued: u64,
    holdings: BTreeMap<AgentId, Holding>,
}

impl ShareRegister {
    /// A register with `authorised` shares available and none issued.
    pub const fn new(authorised: u64) -> Self {
        Self {
            authorised,
            issued: 0,
            holdings: BTreeMap::new(),
        }
    }

    /// Shares the bank may issue in total.
    pub const fn authorised(&self) -> u64 {
        self.authorised
    }

    /// Shares issued so far.
    pub const fn issued(&self) -> u64 {
        self.issued
    }

    /// Shares that can still be issued.
    pub const fn available(&self) -> u64 {
        self.authorised.saturating_sub(self.issued)
    }

    /// Raise the authorised count by `units`.
    pub const fn authorise(&mut self, units: u64) {
        self.authorised = self.authorised.saturating_add(units);
    }

    /// Issue `units` new shares to `holder`.
    ///
    /// # Errors
    ///
    /// [`BankError::SharesNotAuthorised`] if fewer than `units` remain.
    pub fn issue(
        &mut self,
        holder: AgentId,
        account: AccountRef,
        units: u64,
    ) -> Result<(), BankError> {
        if units > self.available() {
            return Err(BankError::SharesNotAuthorised {
                requested: units,
                available: self.available(),
            });
        }
        self.issued = self.issued.saturating_add(units);
        self.credit(holder, account, units);
        Ok(())
    }

    fn credit(&mut self, holder: AgentId, account: AccountRef, units: u64) {
        let entry = self
            .holdings
            .entry(holder)
            .or_insert(Holding { shares: 0, account });
        entry.shares = entry.shares.saturating_add(units);
        entry.account = account;
    }

    /// Move `units` already-issued shares between holders.
    ///
    /// # Errors
    ///
    /// [`BankError::InsufficientShares`] if `from` holds fewer than `units`.
    pub fn transfer(
        &mut self,
        from: AgentId,
        to: AgentId,
        to_account: AccountRef,
        units: u64,
    ) -> Result<(), BankError> {
        let held = self.shares_of(from);
        if held < units {
            return Err(BankError::InsufficientShares {
                holder: from,
                held,
                requested: units,
            });
        }
        let remaining = held.saturating_sub(units);
        if remaining == 0 {
            self.holdings.remove(&from);
        } else if let Some(h) = self.holdings.get_mut(&from) {
            h.shares = remaining;
        }
        self.credit(to, to_account, units);
        Ok(())
    }

    /// Shares held by `holder`.
    pub fn shares_of(&self, holder: AgentId) -> u64 {
        self.holdings.get(&holder).map_or(0, |h| h.shares)
    }

    /// All holdings in agent order.
    pub fn holdings(&self) -> impl Iterator<Item = (AgentId, Holding)> + '_ {
        self.holdings.iter().map(|(k, v)| (*k, *v))
    }

    /// Split `total` across holders pro rata, rounded down to the cent.
    ///
    /// Returns the per-holder amounts; their sum may fall short of `total`
    /// by the rounding remainder.
    pub fn pro_rata(&self, total: Money) -> Vec<(AgentId, AccountRef, Money)> {
        let held: u64 = self
            .holdings
            .values()
            .fold(0_u64, |acc, h| acc.saturating_add(h.shares));
        if held == 0 || total <= Money::ZERO {
            return Vec::new();
        }
        let denominator = Money::from(held);
        self.holdings
            .iter()
            .filter_map(|(agent, h)| {
                let share = total
                    .saturating_mul(Money::from(h.shares))
                    .checked_div(denominator)?
                    .round_dp_with_strategy(2, rust_decimal::RoundingStrategy::ToZero);
                (!share.is_zero()).then_some((*agent, h.account, share))
            })
            .collect()
    }
}
