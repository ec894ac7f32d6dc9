//! Configuration, agents and the step engine for the Threadneedle
//! simulation.
//!
//! This crate assembles the banks and markets of the lower crates into a
//! running economy and drives it one step at a time.
//!
//! # Modules
//!
//! - [`config`] -- YAML configuration with defaults and validation.
//! - [`agent`] -- The [`Agent`] interface, the [`Economy`] every agent acts
//!   on, and the capability traits ([`MarketParticipant`], [`Employer`],
//!   [`Borrower`]).
//! - [`agents`] -- Concrete agents: savers, workers, farms, borrowers and
//!   bank investors.
//! - [`government`] -- Minimum wage and regions.
//! - [`employment`] -- Employment contracts.
//! - [`markets`] -- Every market of one economy.
//! - [`world`] -- [`World`]: the six-phase step engine and operator actions.
//! - [`report`] -- Plain-text views of banks, markets and agents.
//! - [`snapshot`] -- Save and restore a world as JSON.
//! - [`command`] -- The operator command table.
//!
//! [`Agent`]: agent::Agent
//! [`Economy`]: agent::Economy
//! [`MarketParticipant`]: agent::MarketParticipant
//! [`Employer`]: agent::Employer
//! [`Borrower`]: agent::Borrower
//! [`World`]: world::World

pub mod agent;
pub mod agents;
pub mod command;
pub mod config;
pub mod employment;
pub mod government;
pub mod markets;
pub mod report;
pub mod snapshot;
pub mod world;

pub use agent::{Agent, AgentError, Economy};
pub use command::{COMMANDS, CommandError, Outcome, dispatch, validate_commands};
pub use config::{ConfigError, SimulationConfig};
pub use snapshot::{Snapshot, SnapshotError};
pub use world::{StepError, StepSummary, World, WorldError};
