//! The government: minimum wage and the regions agents live in.

use serde::{Deserialize, Serialize};
use threadneedle_types::{AgentId, Money};

use crate::config::GovernmentConfig;

/// One region and the agents living there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Region name.
    pub name: String,
    /// Residents in arrival order.
    pub residents: Vec<AgentId>,
}

/// The government.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Government {
    /// Display name.
    pub name: String,
    /// Lowest salary an employer may offer.
    pub min_wage: Money,
    regions: Vec<Region>,
}

impl Government {
    /// Build the government from configuration.
    pub fn new(config: &GovernmentConfig) -> Self {
        Self {
            name: config.name.clone(),
            min_wage: config.min_wage,
            regions: config
                .regions
                .iter()
                .map(|name| Region {
                    name: name.clone(),
                    residents: Vec::new(),
                })
                .collect(),
        }
    }

    /// Reassemble a government with its residents.
    pub const fn from_parts(name: String, min_wage: Money, regions: Vec<Region>) -> Self {
        Self {
            name,
            min_wage,
            regions,
        }
    }

    /// All regions.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Settle `agent` in `region`, or in the first region when `None` or
    /// unknown. Returns the region's name.
    pub fn settle(&mut self, agent: AgentId, region: Option<&str>) -> Option<&str> {
        let at = region
            .and_then(|r| self.regions.iter().position(|x| x.name == r))
            .unwrap_or(0);
        let region = self.regions.get_mut(at)?;
        region.residents.push(agent);
        Some(&region.name)
    }

    /// Region `agent` lives in.
    pub fn region_of(&self, agent: AgentId) -> Option<&str> {
        self.regions
            .iter()
            .find(|r| r.residents.contains(&agent))
            .map(|r| r.name.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn agents_settle_in_named_or_first_region() {
        let mut govt = Government::new(&GovernmentConfig {
            name: "Govt".to_owned(),
            min_wage: dec!(5),
            regions: vec!["North".to_owned(), "South".to_owned()],
        });
        assert_eq!(govt.settle(AgentId(1), Some("South")), Some("South"));
        assert_eq!(govt.settle(AgentId(2), None), Some("North"));
        assert_eq!(govt.settle(AgentId(3), Some("Atlantis")), Some("North"));
        assert_eq!(govt.region_of(AgentId(1)), Some("South"));
        assert_eq!(govt.regions()[0].residents.len(), 2);
    }
}
