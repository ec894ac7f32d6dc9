//! Type-safe identifier wrappers around `u64`.
//!
//! Every entity in the simulation has a strongly-typed ID to prevent
//! accidental mixing of identifiers at compile time. IDs are issued by the
//! [`IdAllocator`] held in the [`SimContext`], never by a global counter,
//! so a reset context issues the same sequence again.
//!
//! [`IdAllocator`]: crate::context::IdAllocator
//! [`SimContext`]: crate::context::SimContext

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around `u64` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident, $prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Return the inner numeric value.
            pub const fn into_inner(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an agent (firm, household, investor).
    AgentId, "A"
}

define_id! {
    /// Unique identifier for a bank, including the central bank.
    BankId, "B"
}

define_id! {
    /// Unique identifier for a deposit account held at a bank.
    AccountId, "ACC"
}

define_id! {
    /// Unique identifier for a loan.
    LoanId, "L"
}

define_id! {
    /// Unique identifier for a market.
    MarketId, "M"
}

define_id! {
    /// Unique identifier for a resting order in a market.
    OrderId, "O"
}

define_id! {
    /// Unique identifier for a lot of goods, labour or shares.
    LotId, "W"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_prefix() {
        assert_eq!(AgentId(7).to_string(), "A-7");
        assert_eq!(LoanId(12).to_string(), "L-12");
    }

    #[test]
    fn id_roundtrip_serde_is_transparent() {
        let json = serde_json::to_string(&BankId(3)).ok();
        assert_eq!(json.as_deref(), Some("3"));
        let restored: Result<BankId, _> = serde_json::from_str("3");
        assert_eq!(restored.ok(), Some(BankId(3)));
    }
}
