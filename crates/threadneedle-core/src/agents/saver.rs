//! A saver holds a deposit and does nothing else.

use serde::{Deserialize, Serialize};
use threadneedle_types::{AccountRef, AgentId};

use super::Profile;
use crate::agent::{Agent, AgentClass, AgentError, Economy, MarketParticipant};

/// A passive depositor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Saver {
    profile: Profile,
}

impl Saver {
    /// A saver with an open account.
    pub const fn new(profile: Profile) -> Self {
        Self { profile }
    }

    /// Identity and account.
    pub const fn profile(&self) -> &Profile {
        &self.profile
    }
}

impl Agent for Saver {
    fn id(&self) -> AgentId {
        self.profile.id
    }

    fn name(&self) -> &str {
        &self.profile.name
    }

    fn class(&self) -> AgentClass {
        AgentClass::Person
    }

    fn evaluate(&mut self, _economy: &mut Economy) -> Result<(), AgentError> {
        Ok(())
    }

    fn describe(&self, economy: &Economy) -> String {
        format!(
            "{} {} (saver) deposit {}",
            self.profile.id,
            self.profile.name,
            self.deposit(economy)
        )
    }
}

impl MarketParticipant for Saver {
    fn account(&self) -> AccountRef {
        self.profile.account
    }
}
