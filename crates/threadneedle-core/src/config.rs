//! Configuration loading and typed config structures for the Threadneedle
//! simulation.
//!
//! A simulation is described by one YAML document, conventionally
//! `threadneedle.yaml`. Every section and field has a default, so an empty
//! document describes a small runnable economy. Agents are a list of tagged
//! entries, one typed struct per agent kind:
//!
//! ```yaml
//! agents:
//!   - kind: farm
//!     name: Farm
//!     bank: Bank
//!     product: food
//!     labour_input: 2
//!   - kind: worker
//!     name: Worker
//!     count: 10
//!     desired_salary: 12
//! ```
//!
//! The configuration is validated once, at load, and never re-parsed.

use std::collections::BTreeSet;
use std::num::ParseIntError;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use threadneedle_bank::{BankSettings, DefaultPolicy, Policy};
use threadneedle_market::MarketSettings;
use threadneedle_types::{DEFAULT_SEED, LoanKind, MarketKind, Money, PeriodUnit, RiskWeighting};

/// Environment variable that overrides `world.seed`.
pub const SEED_ENV: &str = "THREADNEEDLE_SEED";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The document parsed but describes an economy that cannot be built.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Run-level settings (name, seed, length).
    #[serde(default)]
    pub world: WorldConfig,

    /// The government: minimum wage and regions.
    #[serde(default)]
    pub government: GovernmentConfig,

    /// Central bank policy.
    #[serde(default)]
    pub central_bank: CentralBankConfig,

    /// Commercial banks, created in order.
    #[serde(default = "default_banks")]
    pub banks: Vec<BankConfig>,

    /// Markets, created in order.
    #[serde(default = "default_markets")]
    pub markets: Vec<MarketConfig>,

    /// Agent populations, created in order.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            government: GovernmentConfig::default(),
            central_bank: CentralBankConfig::default(),
            banks: default_banks(),
            markets: default_markets(),
            agents: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `THREADNEEDLE_SEED` overrides `world.seed`. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if `THREADNEEDLE_SEED` is not a number.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var(SEED_ENV) {
            self.override_seed(&val)?;
        }
        Ok(())
    }

    /// Replace the seed with `raw` parsed as an unsigned integer.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if `raw` is not a number.
    pub fn override_seed(&mut self, raw: &str) -> Result<(), ConfigError> {
        self.world.seed = raw
            .trim()
            .parse()
            .map_err(|e: ParseIntError| invalid(format!("{SEED_ENV}={raw}: {e}")))?;
        Ok(())
    }

    /// Check cross-references and ranges.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.government.validate()?;
        self.central_bank.validate()?;

        if self.banks.is_empty() {
            return Err(invalid("at least one bank is required"));
        }
        let mut banks = BTreeSet::new();
        for bank in &self.banks {
            bank.validate()?;
            if !banks.insert(bank.name.as_str()) {
                return Err(invalid(format!("duplicate bank name {:?}", bank.name)));
            }
        }

        let mut names = BTreeSet::new();
        let mut products = BTreeSet::new();
        let mut labour = 0_usize;
        for market in &self.markets {
            if !names.insert(market.name.as_str()) {
                return Err(invalid(format!("duplicate market name {:?}", market.name)));
            }
            match market.kind {
                MarketKind::Goods => {
                    market
                        .settings()
                        .validate()
                        .map_err(|e| invalid(format!("market {:?}: {e}", market.name)))?;
                    if !products.insert(market.product.as_str()) {
                        return Err(invalid(format!(
                            "two goods markets trade {:?}",
                            market.product
                        )));
                    }
                }
                MarketKind::Labour => labour = labour.saturating_add(1),
                MarketKind::Shares => {
                    let issuer = market.bank.as_deref().ok_or_else(|| {
                        invalid(format!("share market {:?} names no bank", market.name))
                    })?;
                    if !banks.contains(issuer) {
                        return Err(invalid(format!(
                            "share market {:?} names unknown bank {issuer:?}",
                            market.name
                        )));
                    }
                }
            }
        }
        if labour > 1 {
            return Err(invalid("at most one labour market is supported"));
        }

        let check = Refs {
            banks: &banks,
            products: &products,
            regions: &self.government.regions,
            has_labour: labour == 1,
        };
        for agent in &self.agents {
            agent.validate(&check)?;
        }
        Ok(())
    }

    /// The central bank policy this configuration describes.
    pub const fn policy(&self) -> Policy {
        self.central_bank.policy()
    }
}

/// What agent validation checks names against.
struct Refs<'a> {
    banks: &'a BTreeSet<&'a str>,
    products: &'a BTreeSet<&'a str>,
    regions: &'a [String],
    has_labour: bool,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Run-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Human-readable simulation name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Seed for the single random source.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Steps a batch run executes.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
            max_steps: default_max_steps(),
        }
    }
}

/// The government.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernmentConfig {
    /// Display name.
    #[serde(default = "default_government_name")]
    pub name: String,

    /// Lowest salary any employer may offer.
    #[serde(default = "default_min_wage")]
    pub min_wage: Money,

    /// Regions agents live in. The first is the default.
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
}

impl Default for GovernmentConfig {
    fn default() -> Self {
        Self {
            name: default_government_name(),
            min_wage: default_min_wage(),
            regions: default_regions(),
        }
    }
}

impl GovernmentConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_wage <= Money::ZERO {
            return Err(invalid("government.min_wage must be positive"));
        }
        if self.regions.is_empty() {
            return Err(invalid("government.regions must not be empty"));
        }
        Ok(())
    }
}

/// Central bank policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CentralBankConfig {
    /// Display name.
    #[serde(default = "default_central_name")]
    pub name: String,

    /// Annual base rate in percent.
    #[serde(default = "default_base_rate")]
    pub base_rate: Decimal,

    /// Minimum reserves as a percentage of deposits.
    #[serde(default = "default_reserve_pct")]
    pub reserve_pct: Decimal,

    /// Minimum equity as a percentage of risk-weighted assets.
    #[serde(default = "default_capital_pct")]
    pub capital_pct: Decimal,

    /// Whether the reserve requirement blocks lending.
    #[serde(default = "default_true")]
    pub enforce_reserve: bool,

    /// Whether the capital requirement blocks lending.
    #[serde(default = "default_true")]
    pub enforce_capital: bool,

    /// Term of central bank loans, in periods.
    #[serde(default = "default_interbank_duration")]
    pub interbank_duration: u32,

    /// Period of central bank loans.
    #[serde(default = "default_interbank_period")]
    pub interbank_period: PeriodUnit,
}

impl Default for CentralBankConfig {
    fn default() -> Self {
        Self {
            name: default_central_name(),
            base_rate: default_base_rate(),
            reserve_pct: default_reserve_pct(),
            capital_pct: default_capital_pct(),
            enforce_reserve: default_true(),
            enforce_capital: default_true(),
            interbank_duration: default_interbank_duration(),
            interbank_period: default_interbank_period(),
        }
    }
}

impl CentralBankConfig {
    /// The policy the central bank starts with.
    pub const fn policy(&self) -> Policy {
        Policy {
            base_rate: self.base_rate,
            reserve_pct: self.reserve_pct,
            capital_pct: self.capital_pct,
            enforce_reserve: self.enforce_reserve,
            enforce_capital: self.enforce_capital,
            interbank_duration: self.interbank_duration,
            interbank_period: self.interbank_period,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.base_rate.is_sign_negative() {
            return Err(invalid("central_bank.base_rate must not be negative"));
        }
        for (field, pct) in [
            ("reserve_pct", self.reserve_pct),
            ("capital_pct", self.capital_pct),
        ] {
            if pct.is_sign_negative() || pct > Decimal::ONE_HUNDRED {
                return Err(invalid(format!("central_bank.{field} must be 0..=100")));
            }
        }
        if self.interbank_duration == 0 {
            return Err(invalid("central_bank.interbank_duration must be positive"));
        }
        Ok(())
    }
}

/// One commercial bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankConfig {
    /// Display name, referenced by agents and markets.
    #[serde(default = "default_bank_name")]
    pub name: String,

    /// Margin over the base rate, in annual percentage points.
    #[serde(default = "default_rate_delta")]
    pub interest_rate_delta: Decimal,

    /// Price of one share.
    #[serde(default = "default_share_price")]
    pub share_price: Money,

    /// Shares the bank may issue at creation.
    #[serde(default = "default_authorised_shares")]
    pub authorised_shares: u64,

    /// What happens when a scheduled payment is missed.
    #[serde(default)]
    pub default_policy: DefaultPolicy,

    /// Share of retained earnings paid out at each year end, in percent.
    #[serde(default)]
    pub dividend_pct: Decimal,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            name: default_bank_name(),
            interest_rate_delta: default_rate_delta(),
            share_price: default_share_price(),
            authorised_shares: default_authorised_shares(),
            default_policy: DefaultPolicy::default(),
            dividend_pct: Decimal::ZERO,
        }
    }
}

impl BankConfig {
    /// Construction parameters for the bank.
    pub fn settings(&self) -> BankSettings {
        BankSettings {
            name: self.name.clone(),
            interest_rate_delta: self.interest_rate_delta,
            share_price: self.share_price,
            authorised_shares: self.authorised_shares,
            default_policy: self.default_policy,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(invalid("bank name must not be empty"));
        }
        if self.share_price <= Money::ZERO {
            return Err(invalid(format!("bank {:?}: share_price must be positive", self.name)));
        }
        if self.dividend_pct.is_sign_negative() || self.dividend_pct > Decimal::ONE_HUNDRED {
            return Err(invalid(format!("bank {:?}: dividend_pct must be 0..=100", self.name)));
        }
        Ok(())
    }
}

/// One market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// What the market trades.
    pub kind: MarketKind,

    /// Display name.
    pub name: String,

    /// Product traded by a goods market.
    #[serde(default)]
    pub product: String,

    /// Issuing bank of a share market.
    #[serde(default)]
    pub bank: Option<String>,

    /// Largest lot accepted.
    #[serde(default = "default_max_lot")]
    pub max_lot: u64,

    /// Most units the market will hold on offer.
    #[serde(default = "default_max_inventory")]
    pub max_inventory: u64,

    /// Smallest gap between bid and ask.
    #[serde(default = "default_min_spread")]
    pub min_spread: Money,

    /// Largest scarcity markup over the best offer.
    #[serde(default = "default_max_spread")]
    pub max_spread: Money,

    /// Deposit a buyer must keep after paying.
    #[serde(default)]
    pub min_capital: Money,

    /// Steps a lot stays on offer before it spoils.
    #[serde(default = "default_ttl")]
    pub ttl: u64,

    /// Steps in the trailing sale-rate window.
    #[serde(default = "default_sale_window")]
    pub sale_window: usize,
}

impl MarketConfig {
    /// A goods market for `product` with default parameters.
    pub fn goods(name: impl Into<String>, product: impl Into<String>) -> Self {
        Self {
            kind: MarketKind::Goods,
            name: name.into(),
            product: product.into(),
            bank: None,
            max_lot: default_max_lot(),
            max_inventory: default_max_inventory(),
            min_spread: default_min_spread(),
            max_spread: default_max_spread(),
            min_capital: Money::ZERO,
            ttl: default_ttl(),
            sale_window: default_sale_window(),
        }
    }

    /// A labour market.
    pub fn labour(name: impl Into<String>) -> Self {
        Self {
            kind: MarketKind::Labour,
            ..Self::goods(name, "")
        }
    }

    /// A share market for `bank`.
    pub fn shares(name: impl Into<String>, bank: impl Into<String>) -> Self {
        Self {
            kind: MarketKind::Shares,
            bank: Some(bank.into()),
            ..Self::goods(name, "")
        }
    }

    /// Goods market settings.
    pub fn settings(&self) -> MarketSettings {
        MarketSettings {
            name: self.name.clone(),
            product: self.product.clone(),
            max_lot: self.max_lot,
            max_inventory: self.max_inventory,
            min_spread: self.min_spread,
            max_spread: self.max_spread,
            min_capital: self.min_capital,
            ttl: self.ttl,
            sale_window: self.sale_window,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// One agent population, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentConfig {
    /// Passive depositors.
    Saver(SaverConfig),
    /// Workers who sell labour and buy goods.
    Worker(WorkerConfig),
    /// Producers who employ workers and sell goods.
    Farm(FarmConfig),
    /// Households that borrow.
    Borrower(BorrowerConfig),
    /// Investors who buy bank capital.
    BankInvestor(BankInvestorConfig),
    /// Builders who borrow to put up houses.
    Builder(BuilderConfig),
    /// The staff of a bank, paid from its earnings.
    WorkBank(WorkBankConfig),
}

impl AgentConfig {
    /// Fields every kind shares.
    pub const fn common(&self) -> &AgentCommon {
        match self {
            Self::Saver(c) => &c.common,
            Self::Worker(c) => &c.common,
            Self::Farm(c) => &c.common,
            Self::Borrower(c) => &c.common,
            Self::BankInvestor(c) => &c.common,
            Self::Builder(c) => &c.common,
            Self::WorkBank(c) => &c.common,
        }
    }

    fn validate(&self, refs: &Refs<'_>) -> Result<(), ConfigError> {
        let common = self.common();
        let who = &common.name;
        if who.trim().is_empty() {
            return Err(invalid("agent name must not be empty"));
        }
        if common.count == 0 {
            return Err(invalid(format!("agent {who:?}: count must be positive")));
        }
        if !refs.banks.contains(common.bank.as_str()) {
            return Err(invalid(format!(
                "agent {who:?} banks at unknown bank {:?}",
                common.bank
            )));
        }
        if let Some(region) = &common.region {
            if !refs.regions.contains(region) {
                return Err(invalid(format!("agent {who:?} lives in unknown region {region:?}")));
            }
        }
        if common.initial_deposit.is_sign_negative() {
            return Err(invalid(format!("agent {who:?}: initial_deposit is negative")));
        }

        let wants_product = |product: Option<&str>| -> Result<(), ConfigError> {
            match product {
                Some(p) if !refs.products.contains(p) => Err(invalid(format!(
                    "agent {who:?} trades {p:?} but no goods market does"
                ))),
                _ => Ok(()),
            }
        };
        match self {
            Self::Saver(_) => Ok(()),
            Self::Worker(c) => {
                if !refs.has_labour {
                    return Err(invalid(format!("worker {who:?} needs a labour market")));
                }
                if c.desired_salary <= Money::ZERO {
                    return Err(invalid(format!("worker {who:?}: desired_salary must be positive")));
                }
                if c.spend_pct > 100 {
                    return Err(invalid(format!("worker {who:?}: spend_pct must be 0..=100")));
                }
                wants_product(c.product.as_deref())
            }
            Self::Farm(c) => {
                if !refs.has_labour {
                    return Err(invalid(format!("farm {who:?} needs a labour market")));
                }
                if c.labour_input == 0 {
                    return Err(invalid(format!("farm {who:?}: labour_input must be positive")));
                }
                wants_product(Some(&c.product))
            }
            Self::Borrower(c) => {
                if c.loan_amount <= Money::ZERO || c.loan_duration == 0 || c.borrow_window == 0 {
                    return Err(invalid(format!(
                        "borrower {who:?}: loan_amount, loan_duration and borrow_window must be positive"
                    )));
                }
                if c.default_pct > 100 {
                    return Err(invalid(format!("borrower {who:?}: default_pct must be 0..=100")));
                }
                wants_product(c.product.as_deref())
            }
            Self::BankInvestor(c) => {
                if !refs.banks.contains(c.investment_bank.as_str()) {
                    return Err(invalid(format!(
                        "investor {who:?} invests in unknown bank {:?}",
                        c.investment_bank
                    )));
                }
                Ok(())
            }
            Self::Builder(c) => {
                if !refs.has_labour {
                    return Err(invalid(format!("builder {who:?} needs a labour market")));
                }
                if c.labour_input == 0 || c.build_time == 0 {
                    return Err(invalid(format!(
                        "builder {who:?}: labour_input and build_time must be positive"
                    )));
                }
                wants_product(Some(&c.product))
            }
            Self::WorkBank(c) => {
                if !refs.has_labour {
                    return Err(invalid(format!("bank staff {who:?} need a labour market")));
                }
                if common.count != 1 {
                    return Err(invalid(format!("bank staff {who:?}: count must be 1")));
                }
                if c.hire_cover < c.fire_cover {
                    return Err(invalid(format!(
                        "bank staff {who:?}: hire_cover must not be below fire_cover"
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Fields shared by every agent kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCommon {
    /// Display name; numbered when `count > 1`.
    pub name: String,

    /// Bank holding the agent's account.
    #[serde(default = "default_bank_name")]
    pub bank: String,

    /// Number of identical agents to create.
    #[serde(default = "default_count")]
    pub count: u32,

    /// Region; the government's first region when absent.
    #[serde(default)]
    pub region: Option<String>,

    /// Money printed into the agent's account at creation.
    #[serde(default)]
    pub initial_deposit: Money,
}

impl AgentCommon {
    /// One agent called `name`, banking at the default bank.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bank: default_bank_name(),
            count: default_count(),
            region: None,
            initial_deposit: Money::ZERO,
        }
    }
}

/// A passive depositor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaverConfig {
    /// Shared fields.
    #[serde(flatten)]
    pub common: AgentCommon,
}

/// A worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Shared fields.
    #[serde(flatten)]
    pub common: AgentCommon,

    /// Salary asked for on the labour market.
    #[serde(default = "default_desired_salary")]
    pub desired_salary: Money,

    /// Goods bought each step, if any.
    #[serde(default)]
    pub product: Option<String>,

    /// Units wanted each step.
    #[serde(default = "default_consumption")]
    pub consumption: u64,

    /// Share of the deposit spent on goods each step, in percent.
    #[serde(default = "default_spend_pct")]
    pub spend_pct: u32,
}

/// A farm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmConfig {
    /// Shared fields.
    #[serde(flatten)]
    pub common: AgentCommon,

    /// Product grown.
    pub product: String,

    /// Units each employee produces per step.
    #[serde(default = "default_labour_input")]
    pub labour_input: u64,
}

/// A household that borrows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowerConfig {
    /// Shared fields.
    #[serde(flatten)]
    pub common: AgentCommon,

    /// Principal requested.
    #[serde(default = "default_loan_amount")]
    pub loan_amount: Money,

    /// Loan term in periods.
    #[serde(default = "default_loan_duration")]
    pub loan_duration: u32,

    /// Period of the loan.
    #[serde(default = "default_loan_period")]
    pub period: PeriodUnit,

    /// Risk category of the loan.
    #[serde(default = "default_weighting")]
    pub weighting: RiskWeighting,

    /// Interest convention.
    #[serde(default = "default_loan_kind")]
    pub loan_kind: LoanKind,

    /// Borrow at most once every this many steps.
    #[serde(default = "default_borrow_window")]
    pub borrow_window: u64,

    /// Chance, in percent, that a new loan will not be serviced.
    #[serde(default)]
    pub default_pct: u32,

    /// Goods the loan proceeds are spent on, if any.
    #[serde(default)]
    pub product: Option<String>,

    /// Repay in full as soon as the deposit covers the loan.
    #[serde(default)]
    pub repay_early: bool,
}

/// An investor in bank capital.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankInvestorConfig {
    /// Shared fields.
    #[serde(flatten)]
    pub common: AgentCommon,

    /// Bank whose shares are bought.
    pub investment_bank: String,

    /// Capital bought at creation, at the bank's share price.
    #[serde(default)]
    pub initial_capital: Money,

    /// Deposit above which new shares are bought.
    #[serde(default = "default_min_invest")]
    pub min_invest: Money,
}

/// A house builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Shared fields.
    #[serde(flatten)]
    pub common: AgentCommon,

    /// Product built; a goods market must trade it.
    pub product: String,

    /// Worker-months one house takes.
    #[serde(default = "default_build_labour")]
    pub labour_input: u64,

    /// Months one house should take to build.
    #[serde(default = "default_build_time")]
    pub build_time: u64,

    /// Markup over cost asked for a finished house, in percent.
    #[serde(default = "default_profit_margin")]
    pub profit_margin: u32,
}

/// The staff of one bank. `common.bank` names the bank that employs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkBankConfig {
    /// Shared fields.
    #[serde(flatten)]
    pub common: AgentCommon,

    /// Hire while earnings cover this many steps of the enlarged payroll.
    #[serde(default = "default_hire_cover")]
    pub hire_cover: u32,

    /// Fire while earnings cover fewer than this many steps of payroll.
    #[serde(default = "default_fire_cover")]
    pub fire_cover: u32,
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_world_name() -> String {
    "Threadneedle".to_owned()
}

const fn default_seed() -> u64 {
    DEFAULT_SEED
}

const fn default_max_steps() -> u64 {
    1200
}

fn default_government_name() -> String {
    "Government".to_owned()
}

const fn default_min_wage() -> Money {
    Decimal::TEN
}

fn default_regions() -> Vec<String> {
    vec!["Capital".to_owned()]
}

fn default_central_name() -> String {
    "Central Bank".to_owned()
}

const fn default_base_rate() -> Decimal {
    Decimal::from_parts(5, 0, 0, false, 0)
}

const fn default_reserve_pct() -> Decimal {
    Decimal::TEN
}

const fn default_capital_pct() -> Decimal {
    Decimal::from_parts(8, 0, 0, false, 0)
}

const fn default_true() -> bool {
    true
}

const fn default_interbank_duration() -> u32 {
    12
}

const fn default_interbank_period() -> PeriodUnit {
    PeriodUnit::Month
}

fn default_banks() -> Vec<BankConfig> {
    vec![BankConfig::default()]
}

fn default_bank_name() -> String {
    "Bank".to_owned()
}

const fn default_rate_delta() -> Decimal {
    Decimal::ONE
}

const fn default_share_price() -> Money {
    Decimal::TEN
}

const fn default_authorised_shares() -> u64 {
    10_000
}

fn default_markets() -> Vec<MarketConfig> {
    vec![
        MarketConfig::labour("Labour"),
        MarketConfig::goods("Food", "food"),
    ]
}

const fn default_max_lot() -> u64 {
    100
}

const fn default_max_inventory() -> u64 {
    1000
}

const fn default_min_spread() -> Money {
    Decimal::ONE
}

const fn default_max_spread() -> Money {
    Decimal::from_parts(5, 0, 0, false, 0)
}

const fn default_ttl() -> u64 {
    5
}

const fn default_sale_window() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_count() -> u32 {
    1
}

const fn default_desired_salary() -> Money {
    Decimal::from_parts(12, 0, 0, false, 0)
}

const fn default_consumption() -> u64 {
    1
}

const fn default_spend_pct() -> u32 {
    10
}

const fn default_labour_input() -> u64 {
    1
}

const fn default_loan_amount() -> Money {
    Decimal::ONE_HUNDRED
}

const fn default_loan_duration() -> u32 {
    12
}

const fn default_loan_period() -> PeriodUnit {
    PeriodUnit::Month
}

const fn default_weighting() -> RiskWeighting {
    RiskWeighting::Personal
}

const fn default_loan_kind() -> LoanKind {
    LoanKind::Compound
}

const fn default_borrow_window() -> u64 {
    30
}

const fn default_min_invest() -> Money {
    Decimal::from_parts(50, 0, 0, false, 0)
}

const fn default_build_labour() -> u64 {
    120
}

const fn default_build_time() -> u64 {
    12
}

const fn default_profit_margin() -> u32 {
    25
}

const fn default_hire_cover() -> u32 {
    12
}

const fn default_fire_cover() -> u32 {
    2
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.world.seed, DEFAULT_SEED);
        assert_eq!(config.banks.len(), 1);
        assert_eq!(config.markets.len(), 2);
        assert_eq!(config.policy().base_rate, dec!(5));
        assert_eq!(config.government.min_wage, dec!(10));
    }

    #[test]
    fn parse_empty_yaml() {
        let config = SimulationConfig::parse("").unwrap();
        assert_eq!(config.banks[0].name, "Bank");
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
world:
  name: Test Economy
  seed: 99
  max_steps: 360
government:
  min_wage: 8
  regions: [North, South]
central_bank:
  base_rate: 3
  reserve_pct: 12.5
  enforce_capital: false
banks:
  - name: First
    interest_rate_delta: 2
    dividend_pct: 50
  - name: Second
    default_policy: on_missed_payment
markets:
  - kind: labour
    name: Jobs
  - kind: goods
    name: Grain
    product: grain
    ttl: 3
  - kind: shares
    name: First Shares
    bank: First
agents:
  - kind: farm
    name: Farm
    bank: First
    product: grain
    labour_input: 2
    initial_deposit: 500
  - kind: worker
    name: Worker
    bank: Second
    count: 5
    region: South
    product: grain
  - kind: borrower
    name: Household
    bank: First
    loan_kind: simple
    period: year
  - kind: bank_investor
    name: Investor
    bank: Second
    investment_bank: First
    initial_capital: 1000
logging:
  level: debug
  json: true
";
        let config = SimulationConfig::parse(yaml).unwrap();
        assert_eq!(config.world.max_steps, 360);
        assert_eq!(config.government.regions.len(), 2);
        assert_eq!(config.central_bank.reserve_pct, dec!(12.5));
        assert!(!config.central_bank.enforce_capital);
        assert_eq!(config.banks[1].default_policy, DefaultPolicy::OnMissedPayment);
        assert_eq!(config.markets[1].settings().ttl, 3);
        assert_eq!(config.agents.len(), 4);
        assert!(matches!(
            &config.agents[1],
            AgentConfig::Worker(w) if w.common.count == 5 && w.desired_salary == dec!(12)
        ));
        assert!(matches!(
            &config.agents[2],
            AgentConfig::Borrower(b) if b.loan_kind == LoanKind::Simple && b.period == PeriodUnit::Year
        ));
        assert!(config.logging.json);
    }

    #[test]
    fn unknown_bank_is_rejected() {
        let yaml = "agents:\n  - kind: saver\n    name: S\n    bank: Nowhere\n";
        let err = SimulationConfig::parse(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn farm_needs_a_market_for_its_product() {
        let yaml = "agents:\n  - kind: farm\n    name: F\n    product: wool\n";
        let err = SimulationConfig::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("wool"));
    }

    #[test]
    fn builder_and_bank_staff_parse_with_defaults() {
        let yaml = r"
markets:
  - kind: labour
    name: Labour
  - kind: goods
    name: Housing
    product: houses
    ttl: 120
    max_lot: 1
agents:
  - kind: builder
    name: Builder
    product: houses
  - kind: work_bank
    name: Bank Staff
";
        let config = SimulationConfig::parse(yaml).unwrap();
        assert!(matches!(
            &config.agents[0],
            AgentConfig::Builder(b)
                if b.labour_input == 120 && b.build_time == 12 && b.profit_margin == 25
        ));
        assert!(matches!(
            &config.agents[1],
            AgentConfig::WorkBank(w) if w.hire_cover == 12 && w.fire_cover == 2
        ));
    }

    #[test]
    fn bank_staff_are_one_agent() {
        let yaml = "agents:\n  - kind: work_bank\n    name: Staff\n    count: 2\n";
        let err = SimulationConfig::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("count must be 1"));
    }

    #[test]
    fn second_labour_market_is_rejected() {
        let mut config = SimulationConfig::default();
        config.markets.push(MarketConfig::labour("More Jobs"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn share_market_requires_known_bank() {
        let mut config = SimulationConfig::default();
        config.markets.push(MarketConfig::shares("Shares", "Ghost"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn seed_override_parses_or_fails() {
        let mut config = SimulationConfig::default();
        config.override_seed(" 77 ").unwrap();
        assert_eq!(config.world.seed, 77);
        assert!(matches!(
            config.override_seed("seven"),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        let err = SimulationConfig::parse("banks: [").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }
}
