//! Slip builder.
//!
//! Accumulates validated picks into a bounded slip. Every operation either
//! applies fully or leaves the slip untouched and reports why.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Pick, PlayMode, WagerError};

/// Maximum picks on one slip.
pub const MAX_PICKS: usize = 8;
/// Minimum picks before Flex scoring is allowed.
pub const MIN_FLEX_PICKS: usize = 3;

/// An in-progress pick slip owned by the caller's session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slip {
    picks: Vec<Pick>,
    mode: PlayMode,
}

impl Slip {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a slip from picks in order, then apply the mode.
    pub fn build(picks: impl IntoIterator<Item = Pick>, mode: PlayMode) -> Result<Self, WagerError> {
        let mut slip = Self::new();
        for pick in picks {
            slip.add_pick(pick)?;
        }
        slip.set_mode(mode)?;
        Ok(slip)
    }

    pub fn picks(&self) -> &[Pick] {
        &self.picks
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.picks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.picks.len() >= MAX_PICKS
    }

    /// Append a pick.
    ///
    /// Rejects when the slip is full, when the identical pick is already on
    /// it, or when the same prop is on it with the opposite direction. The
    /// caller has to remove a conflicting pick explicitly.
    pub fn add_pick(&mut self, pick: Pick) -> Result<(), WagerError> {
        if self.is_full() {
            return Err(WagerError::SlipFull { max: MAX_PICKS });
        }
        if let Some(existing) = self.picks.iter().find(|p| p.same_prop(&pick)) {
            if existing.direction == pick.direction {
                return Err(WagerError::DuplicatePick(pick.to_string()));
            }
            return Err(WagerError::ConflictingPick(format!(
                "{} {} {}",
                pick.player, pick.stat, pick.line
            )));
        }
        debug!(pick = %pick, count = self.picks.len() + 1, "Pick added");
        self.picks.push(pick);
        Ok(())
    }

    /// Remove the pick at `index` (zero-based) and return it.
    ///
    /// A Flex slip that drops below the Flex minimum reverts to PowerPlay.
    pub fn remove_pick(&mut self, index: usize) -> Result<Pick, WagerError> {
        if index >= self.picks.len() {
            return Err(WagerError::PickIndexOutOfRange {
                index,
                len: self.picks.len(),
            });
        }
        let removed = self.picks.remove(index);
        if self.mode == PlayMode::Flex && self.picks.len() < MIN_FLEX_PICKS {
            debug!(count = self.picks.len(), "Slip below Flex minimum, reverting to PowerPlay");
            self.mode = PlayMode::PowerPlay;
        }
        Ok(removed)
    }

    pub fn set_mode(&mut self, mode: PlayMode) -> Result<(), WagerError> {
        if mode == PlayMode::Flex && self.picks.len() < MIN_FLEX_PICKS {
            return Err(WagerError::InsufficientPicks {
                required: MIN_FLEX_PICKS,
                have: self.picks.len(),
            });
        }
        self.mode = mode;
        Ok(())
    }

    /// Re-check the slip invariants before it is priced.
    pub fn validate(&self) -> Result<(), WagerError> {
        if self.picks.is_empty() {
            return Err(WagerError::EmptySlip);
        }
        if self.picks.len() > MAX_PICKS {
            return Err(WagerError::SlipFull { max: MAX_PICKS });
        }
        if self.mode == PlayMode::Flex && self.picks.len() < MIN_FLEX_PICKS {
            return Err(WagerError::InsufficientPicks {
                required: MIN_FLEX_PICKS,
                have: self.picks.len(),
            });
        }
        for (i, pick) in self.picks.iter().enumerate() {
            if let Some(other) = self.picks[i + 1..].iter().find(|p| p.same_prop(pick)) {
                return Err(if other.direction == pick.direction {
                    WagerError::DuplicatePick(pick.to_string())
                } else {
                    WagerError::ConflictingPick(format!("{} {} {}", pick.player, pick.stat, pick.line))
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
