//! Settlement engine.
//!
//! Resolves a finalized slip and applies it to the bettor's ledger record:
//!
//! 1. validate: slip invariants, positive stake, and for registered users
//!    a balance that covers the stake. Failures here never touch the store.
//! 2. price: ask the oracle how many picks missed and look up the multiplier.
//! 3. commit: one store transaction debits the stake, credits the payout
//!    and appends the settlement record. Guests skip this step entirely.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::oracle::OutcomeOracle;
use crate::payout;
use crate::slip::Slip;
use crate::storage::{AbortReason, LedgerStore, TransactionResult, TxDecision};
use crate::types::{Outcome, SettlementRecord, WagerError};

/// Who is placing the slip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bettor {
    /// Unauthenticated play. Computed and returned, never persisted.
    Guest,
    /// An already-authenticated username.
    User(String),
}

impl Bettor {
    pub fn user(username: impl Into<String>) -> Self {
        Bettor::User(username.into())
    }
}

/// What a settlement produced.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementResult {
    pub record: SettlementRecord,
    /// Balance after commit; `None` for guests.
    pub balance_after: Option<Decimal>,
    /// Whether the record was written to the ledger.
    pub persisted: bool,
}

impl SettlementResult {
    pub fn outcome(&self) -> Outcome {
        self.record.result
    }

    pub fn payout(&self) -> Decimal {
        self.record.payout
    }
}

pub struct SettlementEngine {
    store: LedgerStore,
    oracle: Arc<dyn OutcomeOracle>,
}

impl SettlementEngine {
    pub fn new(store: LedgerStore, oracle: Arc<dyn OutcomeOracle>) -> Self {
        Self { store, oracle }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Settle `slip` for `bettor` with `stake`.
    pub async fn settle(&self, bettor: &Bettor, slip: &Slip, stake: Decimal) -> Result<SettlementResult, WagerError> {
        // -- Validate ----------------------------------------------------------
        slip.validate()?;
        if stake <= Decimal::ZERO {
            return Err(WagerError::InvalidStake(stake));
        }
        if let Bettor::User(username) = bettor {
            let profile = self.store.get_user(username).await?;
            if stake > profile.balance {
                warn!(username = %username, stake = %stake, balance = %profile.balance, "Settlement rejected");
                return Err(WagerError::InsufficientFunds {
                    needed: stake,
                    available: profile.balance,
                });
            }
        }

        // -- Price -------------------------------------------------------------
        let record = self.price(slip, stake)?;

        // -- Commit ------------------------------------------------------------
        let username = match bettor {
            Bettor::Guest => {
                info!(
                    picks = record.picks.len(),
                    mode = %record.mode,
                    stake = %stake,
                    result = %record.result,
                    payout = %record.payout,
                    "Guest slip settled"
                );
                return Ok(SettlementResult {
                    record,
                    balance_after: None,
                    persisted: false,
                });
            }
            Bettor::User(username) => username.clone(),
        };

        // Runs on its own task so a caller dropping this future cannot
        // interrupt a commit that has already started.
        let store = self.store.clone();
        let entry = record.clone();
        let task_username = username.clone();
        let committed = tokio::spawn(async move {
            store
                .transact(&task_username, move |view| {
                    if stake > view.balance {
                        return TxDecision::Abort(AbortReason::InsufficientFunds {
                            needed: stake,
                            available: view.balance,
                        });
                    }
                    let payout = entry.payout;
                    match view.balance.checked_sub(stake).and_then(|b| b.checked_add(payout)) {
                        Some(new_balance) => TxDecision::Commit { new_balance, entry },
                        None => TxDecision::Abort(AbortReason::BalanceOverflow),
                    }
                })
                .await
        })
        .await
        .map_err(|e| WagerError::store(e.into()))??;

        match committed {
            TransactionResult::Committed { balance, history_len } => {
                info!(
                    username = %username,
                    mode = %record.mode,
                    picks = record.picks.len(),
                    stake = %stake,
                    multiplier = %record.multiplier,
                    result = %record.result,
                    payout = %record.payout,
                    balance = %balance,
                    history_len,
                    "Settlement committed"
                );
                Ok(SettlementResult {
                    record,
                    balance_after: Some(balance),
                    persisted: true,
                })
            }
            TransactionResult::Aborted(AbortReason::InsufficientFunds { needed, available }) => {
                Err(WagerError::InsufficientFunds { needed, available })
            }
            TransactionResult::Aborted(AbortReason::NegativeBalance { .. }) => {
                let available = self.store.get_user(&username).await?.balance;
                Err(WagerError::InsufficientFunds { needed: stake, available })
            }
            TransactionResult::Aborted(AbortReason::BalanceOverflow) => Err(WagerError::InvalidStake(stake)),
        }
    }

    fn price(&self, slip: &Slip, stake: Decimal) -> Result<SettlementRecord, WagerError> {
        let n = slip.len();
        let losses = self.oracle.resolve(slip).losses.min(n);
        let multiplier = payout::multiplier(slip.mode(), n, losses);
        let (result, payout) = if multiplier > Decimal::ZERO {
            // Guest stakes are uncapped, so the product can exceed Decimal's range.
            let payout = stake.checked_mul(multiplier).ok_or(WagerError::InvalidStake(stake))?;
            (Outcome::Win, payout)
        } else {
            (Outcome::Loss, Decimal::ZERO)
        };

        Ok(SettlementRecord {
            id: Uuid::new_v4(),
            created_at: chrono::Utc::now().timestamp(),
            picks: slip.picks().to_vec(),
            stake,
            mode: slip.mode(),
            result,
            losses,
            multiplier,
            payout,
            completed: true,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
