//! End-to-end settlement scenarios against a real JSON ledger file.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::Arc;

use pickem_ledger::engine::{Bettor, FixedOracle, OutcomeOracle, Resolution, SettlementEngine};
use pickem_ledger::slip::Slip;
use pickem_ledger::storage::{JsonFileBackend, LedgerConfig, LedgerDocument, LedgerStore};
use pickem_ledger::types::{Direction, ErrorKind, Outcome, Pick, PlayMode, WagerError};

struct TempLedger(PathBuf);

impl TempLedger {
    fn new() -> Self {
        let mut p = std::env::temp_dir();
        p.push(format!("pickem_it_ledger_{}.json", uuid::Uuid::new_v4()));
        Self(p)
    }

    fn backend(&self) -> JsonFileBackend {
        JsonFileBackend::new(&self.0)
    }

    fn read(&self) -> LedgerDocument {
        serde_json::from_str(&std::fs::read_to_string(&self.0).unwrap()).unwrap()
    }
}

impl Drop for TempLedger {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn config() -> LedgerConfig {
    LedgerConfig {
        starting_balance: dec!(1000),
        digest_iterations: 1,
        digest_memory_kib: 8,
    }
}

fn three_pick_slip() -> Slip {
    let picks = vec![
        Pick::new("Jayson Tatum", "Points", dec!(27.5), Direction::Over),
        Pick::new("Nikola Jokic", "Assists", dec!(9.5), Direction::Under),
        Pick::new("Luka Doncic", "Points", dec!(32.5), Direction::Over),
    ];
    Slip::build(picks, PlayMode::PowerPlay).unwrap()
}

async fn engine(ledger: &TempLedger, oracle: impl OutcomeOracle + 'static) -> SettlementEngine {
    let store = LedgerStore::open(ledger.backend(), config()).await.unwrap();
    SettlementEngine::new(store, Arc::new(oracle))
}

#[tokio::test]
async fn win_then_overdraw_scenario() {
    let ledger = TempLedger::new();
    let engine = engine(&ledger, FixedOracle::win()).await;
    engine.store().register("alice", "password123", None).await.unwrap();
    let alice = Bettor::user("alice");

    let result = engine.settle(&alice, &three_pick_slip(), dec!(10)).await.unwrap();
    assert_eq!(result.record.multiplier, dec!(6));
    assert_eq!(result.payout(), dec!(60));
    assert_eq!(result.balance_after, Some(dec!(1050)));

    let history = engine.store().history("alice").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].result, Outcome::Win);
    assert_eq!(history[0].payout, dec!(60));

    let err = engine.settle(&alice, &three_pick_slip(), dec!(2000)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Funds);
    let profile = engine.store().get_user("alice").await.unwrap();
    assert_eq!(profile.balance, dec!(1050));
    assert_eq!(profile.settlements, 1);

    // What is on disk matches what the store reports.
    let on_disk = ledger.read();
    let record = on_disk.find("alice").unwrap();
    assert_eq!(record.balance, dec!(1050));
    assert_eq!(record.history.len(), 1);
}

#[tokio::test]
async fn committed_state_survives_reopen() {
    let ledger = TempLedger::new();
    {
        let engine = engine(&ledger, FixedOracle(Resolution::with_losses(1))).await;
        engine.store().register("Bob", "pw", Some("bob@example.com")).await.unwrap();
        let slip = three_pick_slip();
        engine.settle(&Bettor::user("bob"), &slip, dec!(100)).await.unwrap();
    }

    let reopened = LedgerStore::open(ledger.backend(), config()).await.unwrap();
    let profile = reopened.authenticate("BOB", "pw").await.unwrap();
    assert_eq!(profile.username, "Bob");
    assert_eq!(profile.balance, dec!(900));
    assert_eq!(profile.email.as_deref(), Some("bob@example.com"));

    let history = reopened.history("bob").await.unwrap();
    assert_eq!(history[0].result, Outcome::Loss);
    assert_eq!(history[0].payout, Decimal::ZERO);
    assert!(history[0].completed);
}

#[tokio::test]
async fn case_insensitive_username_collision() {
    let ledger = TempLedger::new();
    let store = LedgerStore::open(ledger.backend(), config()).await.unwrap();
    store.register("Alice", "pw", None).await.unwrap();
    let err = store.register("alice", "pw2", None).await.unwrap_err();
    assert!(matches!(err, WagerError::UsernameTaken(_)));
    assert_eq!(ledger.read().users.len(), 1);
}

#[tokio::test]
async fn guest_settlement_leaves_ledger_untouched() {
    let ledger = TempLedger::new();
    let engine = engine(&ledger, FixedOracle::win()).await;
    engine.store().register("carol", "pw", None).await.unwrap();
    let before = std::fs::read_to_string(&ledger.0).unwrap();

    let result = engine.settle(&Bettor::Guest, &three_pick_slip(), dec!(25)).await.unwrap();
    assert_eq!(result.payout(), dec!(150));
    assert!(!result.persisted);

    assert_eq!(std::fs::read_to_string(&ledger.0).unwrap(), before);
    assert!(engine.store().get_user("guest").await.is_err());
}

#[tokio::test]
async fn rejected_settlement_does_not_write() {
    let ledger = TempLedger::new();
    let engine = engine(&ledger, FixedOracle::win()).await;
    engine.store().register("dave", "pw", None).await.unwrap();
    let before = std::fs::read_to_string(&ledger.0).unwrap();
    let dave = Bettor::user("dave");

    for stake in [Decimal::ZERO, dec!(-1), dec!(1000.01)] {
        let err = engine.settle(&dave, &three_pick_slip(), stake).await.unwrap_err();
        assert!(!err.is_retryable());
    }
    assert!(engine.settle(&dave, &Slip::new(), dec!(1)).await.is_err());

    assert_eq!(std::fs::read_to_string(&ledger.0).unwrap(), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_settlements_conserve_money() {
    let ledger = TempLedger::new();
    let engine = Arc::new(engine(&ledger, FixedOracle::win()).await);
    engine.store().register("erin", "pw", None).await.unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.settle(&Bettor::user("erin"), &three_pick_slip(), dec!(5)).await
            })
        })
        .collect();

    for outcome in futures::future::join_all(tasks).await {
        outcome.unwrap().unwrap();
    }

    // Each win nets 5 * 6 - 5 = 25.
    let profile = engine.store().get_user("erin").await.unwrap();
    assert_eq!(profile.balance, dec!(1000) + dec!(25) * Decimal::from(20));
    assert_eq!(profile.settlements, 20);
    assert_eq!(ledger.read().find("erin").unwrap().history.len(), 20);
}

#[tokio::test]
async fn corrupt_ledger_recovers_empty() {
    let ledger = TempLedger::new();
    std::fs::write(&ledger.0, "not json at all").unwrap();

    let store = LedgerStore::open(ledger.backend(), config()).await.unwrap();
    assert!(store.get_user("anyone").await.is_err());
    store.register("frank", "pw", None).await.unwrap();
    assert_eq!(ledger.read().users.len(), 1);

    let dir = ledger.0.parent().unwrap();
    let stem = ledger.0.file_name().unwrap().to_string_lossy().to_string();
    for entry in std::fs::read_dir(dir).unwrap().flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(&stem) && name.contains(".corrupt-") {
            let _ = std::fs::remove_file(entry.path());
        }
    }
}
