//! Slip simulator.
//!
//! Builds random slips from the prop catalog and keeps a running tally of
//! settled results. Drives the simulation binary.

use anyhow::{bail, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use std::fmt;
use tracing::debug;

use crate::catalog::Catalog;
use crate::engine::settlement::SettlementResult;
use crate::slip::{Slip, MAX_PICKS};
use crate::types::{Direction, Outcome, PlayMode};

/// Build a slip of `picks` distinct random props in random directions.
///
/// Props that clash with one already drawn (same player, stat and line
/// listed twice in the catalog) are skipped.
pub fn random_slip<R: Rng>(
    catalog: &Catalog,
    picks: usize,
    mode: PlayMode,
    rng: &mut R,
) -> Result<Slip> {
    if picks == 0 || picks > MAX_PICKS {
        bail!("Picks per slip must be between 1 and {MAX_PICKS}, got {picks}");
    }

    let mut candidates: Vec<_> = catalog.props().iter().collect();
    candidates.shuffle(rng);

    let mut slip = Slip::new();
    for prop in candidates {
        if slip.len() == picks {
            break;
        }
        let direction = if rng.gen_bool(0.5) { Direction::Over } else { Direction::Under };
        if let Err(e) = slip.add_pick(prop.pick(direction)) {
            debug!(prop = %prop, error = %e, "Skipping prop");
        }
    }

    if slip.len() < picks {
        bail!(
            "Catalog only has {} distinct props, need {picks}",
            slip.len()
        );
    }
    slip.set_mode(mode)?;
    Ok(slip)
}

/// Running totals across simulated settlements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationTally {
    pub rounds: u64,
    pub wins: u64,
    pub losses: u64,
    pub total_staked: Decimal,
    pub total_paid: Decimal,
}

impl SimulationTally {
    pub fn record(&mut self, result: &SettlementResult) {
        self.rounds += 1;
        match result.outcome() {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
        }
        self.total_staked += result.record.stake;
        self.total_paid += result.record.payout;
    }

    pub fn net(&self) -> Decimal {
        self.total_paid - self.total_staked
    }

    /// Win rate as a percentage. Returns 0 if nothing was settled.
    pub fn win_rate(&self) -> Decimal {
        if self.rounds == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.wins) * Decimal::ONE_HUNDRED / Decimal::from(self.rounds)
        }
    }
}

impl fmt::Display for SimulationTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rounds={} (W{}/L{}) | win_rate={:.1}% | staked=${:.2} | paid=${:.2} | net=${:.2}",
            self.rounds,
            self.wins,
            self.losses,
            self.win_rate(),
            self.total_staked,
            self.total_paid,
            self.net(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
