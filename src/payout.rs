//! Payout tables.
//!
//! Fixed-odds multipliers for both scoring schemes. These are literal
//! lookup tables, not formulas: any combination not listed pays nothing.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::slip::Slip;
use crate::types::PlayMode;

/// PowerPlay multipliers indexed by `pick_count - 1`.
const POWER_PLAY: [Decimal; 8] = [
    dec!(1.5),
    dec!(3),
    dec!(6),
    dec!(10),
    dec!(20),
    dec!(35),
    dec!(65),
    dec!(120),
];

/// Flex multipliers as `(pick_count, losses, multiplier)`.
const FLEX: [(usize, usize, Decimal); 15] = [
    (3, 0, dec!(3)),
    (4, 0, dec!(6)),
    (5, 0, dec!(10)),
    (6, 0, dec!(25)),
    (7, 0, dec!(40)),
    (8, 0, dec!(80)),
    (3, 1, dec!(1)),
    (4, 1, dec!(1.5)),
    (5, 1, dec!(2.5)),
    (6, 1, dec!(2.6)),
    (7, 1, dec!(2.75)),
    (8, 1, dec!(3)),
    (6, 2, dec!(0.25)),
    (7, 2, dec!(0.5)),
    (8, 2, dec!(1)),
];

/// Multiplier for a slip of `pick_count` picks with `losses` misses.
///
/// Total: undefined combinations return zero. PowerPlay forfeits on any miss.
pub fn multiplier(mode: PlayMode, pick_count: usize, losses: usize) -> Decimal {
    match mode {
        PlayMode::PowerPlay => {
            if losses > 0 || pick_count == 0 {
                return Decimal::ZERO;
            }
            POWER_PLAY.get(pick_count - 1).copied().unwrap_or(Decimal::ZERO)
        }
        PlayMode::Flex => FLEX
            .iter()
            .find(|(n, l, _)| *n == pick_count && *l == losses)
            .map(|(_, _, m)| *m)
            .unwrap_or(Decimal::ZERO),
    }
}

/// Most misses a Flex slip of this size can absorb and still pay out.
pub fn flex_tolerance(pick_count: usize) -> Option<usize> {
    FLEX.iter()
        .filter(|(n, _, _)| *n == pick_count)
        .map(|(_, l, _)| *l)
        .max()
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// Multipliers a slip would currently pay, shown before staking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoutPreview {
    pub pick_count: usize,
    pub mode: PlayMode,
    pub power_play: Decimal,
    pub flex_perfect: Decimal,
    pub flex_one_miss: Decimal,
    /// Only offered for sizes whose Flex table absorbs two misses.
    pub flex_two_miss: Option<Decimal>,
}

impl PayoutPreview {
    /// Multiplier for the slip's active mode with no misses.
    pub fn headline(&self) -> Decimal {
        match self.mode {
            PlayMode::PowerPlay => self.power_play,
            PlayMode::Flex => self.flex_perfect,
        }
    }
}

pub fn preview(slip: &Slip) -> PayoutPreview {
    let n = slip.len();
    PayoutPreview {
        pick_count: n,
        mode: slip.mode(),
        power_play: multiplier(PlayMode::PowerPlay, n, 0),
        flex_perfect: multiplier(PlayMode::Flex, n, 0),
        flex_one_miss: multiplier(PlayMode::Flex, n, 1),
        flex_two_miss: flex_tolerance(n)
            .filter(|&t| t >= 2)
            .map(|_| multiplier(PlayMode::Flex, n, 2)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
