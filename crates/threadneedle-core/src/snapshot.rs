//! Saving and restoring a running world as one JSON document.
//!
//! The document lists the institutions first and the agents last:
//! government, banks, regions, markets, companies, persons. Restoring reads
//! the books, loans and order books back as they were; no history is
//! replayed.
//!
//! The random source is saved with everything else, so a restored world
//! continues exactly as the saved one would have. A document without it is
//! still accepted; its stream is then reseeded from the seed and step.

use std::path::Path;

use chrono::{DateTime, Utc};
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use threadneedle_bank::BankingSystem;
use threadneedle_types::{IdAllocator, Money, SimContext};
use tracing::info;
use uuid::Uuid;

use crate::agent::Economy;
use crate::agents::AgentSlot;
use crate::config::{ConfigError, SimulationConfig};
use crate::employment::Employment;
use crate::government::{Government, Region};
use crate::markets::Markets;
use crate::world::{World, WorldError};

/// Layout version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors raised while saving or restoring.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The file could not be read or written.
    #[error("snapshot I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The document is not valid snapshot JSON.
    #[error("snapshot JSON error: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The saved configuration no longer validates.
    #[error("snapshot config error: {source}")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },

    /// The restored parts do not form a world.
    #[error("snapshot world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },

    /// Written by an incompatible version.
    #[error("unsupported snapshot version {found}, expected {SNAPSHOT_VERSION}")]
    Version {
        /// Version found in the document.
        found: u32,
    },
}

/// The government's own settings, without its regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernmentRecord {
    /// Display name.
    pub name: String,
    /// Minimum wage.
    pub min_wage: Money,
}

/// A whole world at the start of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Layout version.
    pub version: u32,
    /// The run this snapshot belongs to.
    pub run_id: Uuid,
    /// Wall-clock time of the save.
    pub saved_at: DateTime<Utc>,
    /// The step the restored world runs next.
    pub step: u64,
    /// Seed of the random source.
    pub seed: u64,
    /// Id allocator state.
    pub ids: IdAllocator,
    /// Random source state.
    #[serde(default)]
    pub rng: Option<ChaCha12Rng>,
    /// The government.
    pub government: GovernmentRecord,
    /// Central bank and commercial banks with their books and loans.
    pub banks: BankingSystem,
    /// Regions and their residents.
    pub regions: Vec<Region>,
    /// Every market with its resting orders.
    pub markets: Markets,
    /// Employment contracts.
    pub employment: Employment,
    /// Company agents.
    pub companies: Vec<AgentSlot>,
    /// Person agents.
    pub persons: Vec<AgentSlot>,
    /// Configuration the world was built from.
    pub config: SimulationConfig,
}

impl Snapshot {
    /// Capture `world` as it stands.
    pub fn capture(world: &World) -> Self {
        let economy = world.economy();
        let (companies, persons) = world
            .agents()
            .cloned()
            .partition::<Vec<_>, _>(AgentSlot::is_company);
        Self {
            version: SNAPSHOT_VERSION,
            run_id: world.run_id(),
            saved_at: Utc::now(),
            step: economy.ctx.step(),
            seed: economy.ctx.seed(),
            ids: economy.ctx.ids(),
            rng: Some(economy.ctx.rng().clone()),
            government: GovernmentRecord {
                name: economy.government.name.clone(),
                min_wage: economy.government.min_wage,
            },
            banks: economy.system.clone(),
            regions: economy.government.regions().to_vec(),
            markets: economy.markets.clone(),
            employment: economy.employment.clone(),
            companies,
            persons,
            config: world.config().clone(),
        }
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a snapshot document.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::Json`] for malformed input, or
    /// [`SnapshotError::Version`] for a document from another version.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version {
                found: snapshot.version,
            });
        }
        Ok(snapshot)
    }

    /// Write the snapshot to `path`.
    ///
    /// # Errors
    ///
    /// I/O or serialization failures.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        std::fs::write(path, self.to_json()?)?;
        info!(
            path = %path.display(),
            run = %self.run_id,
            step = self.step,
            "snapshot saved"
        );
        Ok(())
    }

    /// Read a snapshot from `path`.
    ///
    /// # Errors
    ///
    /// I/O, parse or version failures.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Rebuild the world.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::Config`] if the saved configuration no longer
    /// validates, or [`SnapshotError::World`] if a configured bank is
    /// missing from the saved books.
    pub fn restore(self) -> Result<World, SnapshotError> {
        self.config.validate()?;
        let economy = Economy {
            ctx: SimContext::from_parts(self.step, self.seed, self.ids, self.rng),
            system: self.banks,
            government: Government::from_parts(
                self.government.name,
                self.government.min_wage,
                self.regions,
            ),
            markets: self.markets,
            employment: self.employment,
        };
        let agents = self.companies.into_iter().chain(self.persons);
        let world = World::from_parts(self.run_id, self.config, economy, agents)?;
        info!(
            run = %world.run_id(),
            step = world.current_step(),
            agents = world.agents().count(),
            "snapshot restored"
        );
        Ok(world)
    }
}
