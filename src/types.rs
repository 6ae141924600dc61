//! Shared types for the pick'em ledger.
//!
//! These types form the data model used across all modules: picks and
//! modes used by the slip builder, the persisted user and settlement
//! records owned by the ledger store, and the error taxonomy every
//! engine operation reports through.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Prediction direction for a prop line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Over,
    Under,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Over => write!(f, "OVER"),
            Direction::Under => write!(f, "UNDER"),
        }
    }
}

/// Parse a direction (case-insensitive, accepts `o`/`u` shorthands).
impl std::str::FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "over" | "o" | "higher" => Ok(Direction::Over),
            "under" | "u" | "lower" => Ok(Direction::Under),
            other => anyhow::bail!("Unknown direction: {other}"),
        }
    }
}

/// Scoring scheme applied to a slip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlayMode {
    /// All-or-nothing: any miss forfeits the slip.
    #[default]
    PowerPlay,
    /// Partial credit, tolerates a limited number of misses.
    Flex,
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayMode::PowerPlay => write!(f, "PowerPlay"),
            PlayMode::Flex => write!(f, "Flex"),
        }
    }
}

impl std::str::FromStr for PlayMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "powerplay" | "power" | "power_play" => Ok(PlayMode::PowerPlay),
            "flex" => Ok(PlayMode::Flex),
            other => anyhow::bail!("Unknown play mode: {other}"),
        }
    }
}

/// Result of a settled slip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win => write!(f, "win"),
            Outcome::Loss => write!(f, "loss"),
        }
    }
}

// ---------------------------------------------------------------------------
// Picks and props
// ---------------------------------------------------------------------------

/// A single over/under prediction on a player stat line.
///
/// Identity for de-duplication is `(player, stat, line)`; the direction is
/// not part of it, so the same prop with the opposite direction conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    pub player: String,
    pub stat: String,
    pub line: Decimal,
    pub direction: Direction,
}

impl Pick {
    pub fn new(player: impl Into<String>, stat: impl Into<String>, line: Decimal, direction: Direction) -> Self {
        Self {
            player: player.into(),
            stat: stat.into(),
            line,
            direction,
        }
    }

    /// Whether both picks target the same prop, regardless of direction.
    pub fn same_prop(&self, other: &Pick) -> bool {
        self.player == other.player && self.stat == other.stat && self.line == other.line
    }
}

impl fmt::Display for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} (Line: {}): {}", self.player, self.stat, self.line, self.direction)
    }
}

/// A read-only prop listing supplied by the ingestion side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prop {
    pub player: String,
    pub stat: String,
    pub line: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport: Option<String>,
}

impl Prop {
    /// Turn this listing into a pick in the given direction.
    pub fn pick(&self, direction: Direction) -> Pick {
        Pick::new(self.player.clone(), self.stat.clone(), self.line, direction)
    }
}

impl fmt::Display for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} (Line: {})", self.player, self.stat, self.line)?;
        if let Some(sport) = &self.sport {
            write!(f, " [{sport}]")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// One settled slip in a user's history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: Uuid,
    /// Epoch seconds.
    pub created_at: i64,
    pub picks: Vec<Pick>,
    pub stake: Decimal,
    pub mode: PlayMode,
    pub result: Outcome,
    /// Misses reported by the outcome oracle.
    #[serde(default)]
    pub losses: usize,
    pub multiplier: Decimal,
    pub payout: Decimal,
    pub completed: bool,
}

impl SettlementRecord {
    /// Balance change this settlement applied: payout minus stake.
    pub fn net(&self) -> Decimal {
        self.payout - self.stake
    }
}

impl fmt::Display for SettlementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} picks | {} | stake ${:.2} | {}x | {} | payout ${:.2}",
            self.picks.len(),
            self.mode,
            self.stake,
            self.multiplier,
            self.result,
            self.payout,
        )
    }
}

/// A persisted user. Only the ledger store reads or writes these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Username in the case it was registered with.
    pub username: String,
    pub password_digest: String,
    #[serde(default)]
    pub email: Option<String>,
    pub balance: Decimal,
    /// Epoch seconds.
    pub created_at: i64,
    #[serde(default)]
    pub history: Vec<SettlementRecord>,
}

impl UserRecord {
    /// Sanitized view with the digest stripped.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            username: self.username.clone(),
            email: self.email.clone(),
            balance: self.balance,
            created_at: self.created_at,
            settlements: self.history.len(),
        }
    }
}

/// What callers outside the store get to see about a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub email: Option<String>,
    pub balance: Decimal,
    pub created_at: i64,
    pub settlements: usize,
}

impl fmt::Display for UserProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | balance=${:.2} | settlements={}",
            self.username, self.balance, self.settlements
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Coarse classification the routing layer maps to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input shape. Never retried, nothing mutated.
    Validation,
    /// Unknown user or bad credentials, reported generically.
    Auth,
    NotFound,
    /// Balance cannot cover the stake. Nothing mutated.
    Funds,
    /// Persistence failure. Retryable.
    Store,
}

/// Domain-specific error types for the wager engine.
#[derive(Debug, thiserror::Error)]
pub enum WagerError {
    #[error("Slip is full: at most {max} picks allowed")]
    SlipFull { max: usize },

    #[error("Duplicate pick: {0}")]
    DuplicatePick(String),

    #[error("Conflicting pick: opposite direction already on slip for {0}")]
    ConflictingPick(String),

    #[error("Flex mode needs at least {required} picks, slip has {have}")]
    InsufficientPicks { required: usize, have: usize },

    #[error("Slip has no picks")]
    EmptySlip,

    #[error("No pick at position {index} (slip has {len})")]
    PickIndexOutOfRange { index: usize, len: usize },

    #[error("Stake must be positive, got {0}")]
    InvalidStake(Decimal),

    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("Username already exists: {0}")]
    UsernameTaken(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Insufficient balance: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Ledger store error: {0}")]
    Store(String),
}

impl WagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WagerError::SlipFull { .. }
            | WagerError::DuplicatePick(_)
            | WagerError::ConflictingPick(_)
            | WagerError::InsufficientPicks { .. }
            | WagerError::EmptySlip
            | WagerError::PickIndexOutOfRange { .. }
            | WagerError::InvalidStake(_)
            | WagerError::InvalidRegistration(_)
            | WagerError::UsernameTaken(_) => ErrorKind::Validation,
            WagerError::InvalidCredentials => ErrorKind::Auth,
            WagerError::UserNotFound(_) => ErrorKind::NotFound,
            WagerError::InsufficientFunds { .. } => ErrorKind::Funds,
            WagerError::Store(_) => ErrorKind::Store,
        }
    }

    /// Only infrastructure failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Store
    }

    pub(crate) fn store(err: anyhow::Error) -> Self {
        WagerError::Store(format!("{err:#}"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
