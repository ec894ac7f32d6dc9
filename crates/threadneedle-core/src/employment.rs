//! Who works for whom, and for how much.
//!
//! Employment is recorded once, here, rather than on both the employer and
//! the worker, so neither side can disagree about a contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use threadneedle_types::{AccountRef, AgentId, Money};

/// One employment contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Employer.
    pub employer: AgentId,
    /// Account the worker is paid into.
    pub account: AccountRef,
    /// Salary per step.
    pub salary: Money,
    /// Step the contract started.
    pub since: u64,
}

/// Every live contract, keyed by worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employment {
    contracts: BTreeMap<AgentId, Contract>,
}

impl Employment {
    /// No contracts.
    pub const fn new() -> Self {
        Self {
            contracts: BTreeMap::new(),
        }
    }

    /// Record that `worker` now works under `contract`, replacing any
    /// earlier contract.
    pub fn hire(&mut self, worker: AgentId, contract: Contract) -> Option<Contract> {
        self.contracts.insert(worker, contract)
    }

    /// End `worker`'s contract.
    pub fn fire(&mut self, worker: AgentId) -> Option<Contract> {
        self.contracts.remove(&worker)
    }

    /// The contract `worker` is on, if employed.
    pub fn contract(&self, worker: AgentId) -> Option<&Contract> {
        self.contracts.get(&worker)
    }

    /// Whether `worker` is employed.
    pub fn is_employed(&self, worker: AgentId) -> bool {
        self.contracts.contains_key(&worker)
    }

    /// Change `worker`'s salary. Returns whether the worker is employed.
    pub fn set_salary(&mut self, worker: AgentId, salary: Money) -> bool {
        self.contracts
            .get_mut(&worker)
            .map(|c| c.salary = salary)
            .is_some()
    }

    /// `employer`'s staff in worker id order.
    pub fn staff(&self, employer: AgentId) -> Vec<(AgentId, Contract)> {
        self.contracts
            .iter()
            .filter(|(_, c)| c.employer == employer)
            .map(|(w, c)| (*w, *c))
            .collect()
    }

    /// Number of people `employer` employs.
    pub fn headcount(&self, employer: AgentId) -> usize {
        self.contracts
            .values()
            .filter(|c| c.employer == employer)
            .count()
    }

    /// Total salaries `employer` owes each step.
    pub fn salary_bill(&self, employer: AgentId) -> Money {
        self.contracts
            .values()
            .filter(|c| c.employer == employer)
            .fold(Money::ZERO, |acc, c| acc.saturating_add(c.salary))
    }

    /// Number of people employed.
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Whether nobody is employed.
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use threadneedle_types::{AccountId, BankId};

    use super::*;

    fn contract(employer: u64, salary: Money) -> Contract {
        Contract {
            employer: AgentId(employer),
            account: AccountRef {
                bank: BankId(1),
                account: AccountId(9),
            },
            salary,
            since: 1,
        }
    }

    #[test]
    fn staff_and_salary_bill_follow_contracts() {
        let mut jobs = Employment::new();
        jobs.hire(AgentId(1), contract(10, dec!(12)));
        jobs.hire(AgentId(2), contract(10, dec!(8)));
        jobs.hire(AgentId(3), contract(11, dec!(20)));
        assert_eq!(jobs.headcount(AgentId(10)), 2);
        assert_eq!(jobs.salary_bill(AgentId(10)), dec!(20));

        assert!(jobs.set_salary(AgentId(2), dec!(9)));
        assert_eq!(jobs.salary_bill(AgentId(10)), dec!(21));

        assert!(jobs.fire(AgentId(1)).is_some());
        assert!(!jobs.is_employed(AgentId(1)));
        assert_eq!(jobs.staff(AgentId(10)).len(), 1);
        assert!(!jobs.set_salary(AgentId(1), dec!(1)));
    }
}
