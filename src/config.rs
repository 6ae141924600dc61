//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the simulation bot's password) are referenced by env-var name
//! in the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

use crate::storage::{credentials, LedgerConfig};
use crate::types::PlayMode;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub ledger: LedgerSection,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerSection {
    pub path: String,
    #[serde(default = "default_starting_balance")]
    pub starting_balance: Decimal,
    #[serde(default = "default_digest_iterations")]
    pub digest_iterations: u32,
    #[serde(default = "default_digest_memory_kib")]
    pub digest_memory_kib: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimulationConfig {
    pub catalog_path: String,
    pub username: String,
    pub password_env: String,
    #[serde(default)]
    pub email: Option<String>,
    pub stake: Decimal,
    pub picks_per_slip: usize,
    #[serde(default)]
    pub mode: PlayMode,
    pub rounds: u64,
    pub interval_ms: u64,
    /// Fixed seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_starting_balance() -> Decimal {
    Decimal::from(1000)
}

fn default_digest_iterations() -> u32 {
    credentials::DEFAULT_ITERATIONS
}

fn default_digest_memory_kib() -> u32 {
    credentials::DEFAULT_MEMORY_KIB
}

impl LedgerSection {
    pub fn store_config(&self) -> LedgerConfig {
        LedgerConfig {
            starting_balance: self.starting_balance,
            digest_iterations: self.digest_iterations,
            digest_memory_kib: self.digest_memory_kib,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        if config.ledger.starting_balance < Decimal::ZERO {
            anyhow::bail!("ledger.starting_balance must not be negative");
        }
        if config.simulation.stake <= Decimal::ZERO {
            anyhow::bail!("simulation.stake must be positive");
        }
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
