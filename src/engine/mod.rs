//! Core engine: outcome oracles, settlement, and the slip simulator.

pub mod oracle;
pub mod settlement;
pub mod simulator;

pub use oracle::{CoinFlipOracle, FixedOracle, OutcomeOracle, Resolution};
pub use settlement::{Bettor, SettlementEngine, SettlementResult};
