//! Pick'em wager ledger and settlement engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the simulation binary.

pub mod config;
pub mod types;
pub mod payout;
pub mod slip;
pub mod catalog;
pub mod storage;
pub mod engine;
