//! Outcome oracles.
//!
//! Real prop results are not available to the engine, so the outcome of a
//! slip comes from an injected [`OutcomeOracle`]. The simulator uses a
//! seeded coin flip; callers with known results use [`FixedOracle`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use crate::slip::Slip;

/// How a slip fared: the number of picks that missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub losses: usize,
}

impl Resolution {
    /// Every pick hit.
    pub fn perfect() -> Self {
        Self { losses: 0 }
    }

    pub fn with_losses(losses: usize) -> Self {
        Self { losses }
    }
}

/// Source of slip outcomes.
#[cfg_attr(test, mockall::automock)]
pub trait OutcomeOracle: Send + Sync {
    fn resolve(&self, slip: &Slip) -> Resolution;
}

/// Returns the same caller-supplied resolution for every slip.
#[derive(Debug, Clone, Copy)]
pub struct FixedOracle(pub Resolution);

impl FixedOracle {
    pub fn win() -> Self {
        Self(Resolution::perfect())
    }

    /// Every pick misses.
    pub fn loss() -> Self {
        Self(Resolution::with_losses(usize::MAX))
    }
}

impl OutcomeOracle for FixedOracle {
    fn resolve(&self, slip: &Slip) -> Resolution {
        Resolution::with_losses(self.0.losses.min(slip.len()))
    }
}

/// Fair coin per slip: heads every pick hits, tails every pick misses.
pub struct CoinFlipOracle {
    rng: Mutex<StdRng>,
}

impl CoinFlipOracle {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl OutcomeOracle for CoinFlipOracle {
    fn resolve(&self, slip: &Slip) -> Resolution {
        let win = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .gen_bool(0.5);
        if win {
            Resolution::perfect()
        } else {
            Resolution::with_losses(slip.len())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
