//! Ledger store.
//!
//! Owns every persisted user record. Callers get a cloneable [`LedgerStore`]
//! handle; the only way to change a balance is [`LedgerStore::transact`],
//! which runs the caller's decision under that user's lock and persists
//! the result before returning.
//!
//! The whole ledger is one document. A commit builds a candidate document,
//! hands it to the backend, and only swaps it in after the backend reports
//! it durable, so a failed write leaves the in-memory state untouched.

pub mod credentials;
pub mod json_file;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::{SettlementRecord, UserProfile, UserRecord, WagerError};

pub use json_file::JsonFileBackend;
pub use memory::MemoryBackend;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Everything the ledger persists, keyed by username as registered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerDocument {
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
}

impl LedgerDocument {
    /// Stored key matching `username` case-insensitively.
    pub fn find_key(&self, username: &str) -> Option<&str> {
        let wanted = username.to_lowercase();
        self.users
            .keys()
            .find(|k| k.to_lowercase() == wanted)
            .map(String::as_str)
    }

    pub fn find(&self, username: &str) -> Option<&UserRecord> {
        self.find_key(username).and_then(|k| self.users.get(k))
    }
}

/// Where the ledger document lives.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Load the current document. Missing or unreadable content is
    /// reported as an empty document, not an error.
    async fn load(&self) -> Result<LedgerDocument>;

    /// Durably replace the stored document. Must be all-or-nothing.
    async fn persist(&self, document: &LedgerDocument) -> Result<()>;

    /// Backend name for logging.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Snapshot handed to a transaction callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerView {
    pub balance: Decimal,
    pub history_len: usize,
}

/// What a transaction callback wants done.
#[derive(Debug, Clone)]
pub enum TxDecision {
    Commit {
        new_balance: Decimal,
        entry: SettlementRecord,
    },
    Abort(AbortReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    InsufficientFunds { needed: Decimal, available: Decimal },
    /// The callback asked for a balance below zero.
    NegativeBalance { attempted: Decimal },
    /// The new balance does not fit in a `Decimal`.
    BalanceOverflow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransactionResult {
    Committed { balance: Decimal, history_len: usize },
    Aborted(AbortReason),
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Store settings.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Balance every new user starts with.
    pub starting_balance: Decimal,
    pub digest_iterations: u32,
    pub digest_memory_kib: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_balance: Decimal::from(1000),
            digest_iterations: credentials::DEFAULT_ITERATIONS,
            digest_memory_kib: credentials::DEFAULT_MEMORY_KIB,
        }
    }
}

struct Inner {
    backend: Box<dyn LedgerBackend>,
    config: LedgerConfig,
    /// Last durably committed document.
    document: Mutex<LedgerDocument>,
    /// One lock per lowercased username, held across a whole transaction.
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Shared handle to the ledger. Cheap to clone.
#[derive(Clone)]
pub struct LedgerStore {
    inner: Arc<Inner>,
}

impl LedgerStore {
    /// Load the document from `backend` and wrap it in a store handle.
    pub async fn open(backend: impl LedgerBackend + 'static, config: LedgerConfig) -> Result<Self, WagerError> {
        let document = backend.load().await.map_err(WagerError::store)?;
        info!(
            backend = %backend.describe(),
            users = document.users.len(),
            starting_balance = %config.starting_balance,
            "Ledger store opened"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                backend: Box::new(backend),
                config,
                document: Mutex::new(document),
                user_locks: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Lock for an existing user. Unknown names never get an entry, and
    /// users are never deleted, so the map is bounded by the user count.
    async fn user_lock(&self, username: &str) -> Result<Arc<Mutex<()>>, WagerError> {
        let key = {
            let document = self.inner.document.lock().await;
            document
                .find_key(username)
                .ok_or_else(|| WagerError::UserNotFound(username.to_owned()))?
                .to_lowercase()
        };
        let mut locks = self.inner.user_locks.lock().await;
        Ok(locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// Create a user with the configured starting balance.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<UserProfile, WagerError> {
        let username = username.trim();
        if username.is_empty() || username.chars().any(char::is_whitespace) {
            return Err(WagerError::InvalidRegistration(
                "username must be non-empty and contain no whitespace".into(),
            ));
        }
        if password.is_empty() {
            return Err(WagerError::InvalidRegistration("password must not be empty".into()));
        }

        let iterations = self.inner.config.digest_iterations;
        let memory_kib = self.inner.config.digest_memory_kib;
        let password = password.to_owned();
        let password_digest = tokio::task::spawn_blocking(move || {
            credentials::hash_password(&password, iterations, memory_kib)
        })
        .await
        .map_err(|e| WagerError::store(e.into()))?
        .map_err(WagerError::store)?;

        let record = UserRecord {
            username: username.to_owned(),
            password_digest,
            email: email.map(str::trim).filter(|e| !e.is_empty()).map(str::to_owned),
            balance: self.inner.config.starting_balance,
            created_at: chrono::Utc::now().timestamp(),
            history: Vec::new(),
        };

        let mut document = self.inner.document.lock().await;
        if let Some(existing) = document.find_key(username) {
            debug!(username, existing, "Registration collided with existing user");
            return Err(WagerError::UsernameTaken(username.to_owned()));
        }

        let mut candidate = document.clone();
        candidate.users.insert(record.username.clone(), record.clone());
        self.inner
            .backend
            .persist(&candidate)
            .await
            .map_err(WagerError::store)?;
        *document = candidate;

        info!(username, balance = %record.balance, "User registered");
        Ok(record.profile())
    }

    /// Verify credentials. Unknown users and wrong passwords fail the same way.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<UserProfile, WagerError> {
        let found = {
            let document = self.inner.document.lock().await;
            document.find(username).cloned()
        };
        let Some(record) = found else {
            debug!(username, "Authentication failed");
            return Err(WagerError::InvalidCredentials);
        };

        let password = password.to_owned();
        let digest = record.password_digest.clone();
        let valid =
            tokio::task::spawn_blocking(move || credentials::verify_password(&password, &digest))
                .await
                .map_err(|e| WagerError::store(e.into()))?;

        if valid {
            Ok(record.profile())
        } else {
            debug!(username, "Authentication failed");
            Err(WagerError::InvalidCredentials)
        }
    }

    pub async fn get_user(&self, username: &str) -> Result<UserProfile, WagerError> {
        let document = self.inner.document.lock().await;
        document
            .find(username)
            .map(UserRecord::profile)
            .ok_or_else(|| WagerError::UserNotFound(username.to_owned()))
    }

    /// Settlement records in the order they were committed.
    pub async fn history(&self, username: &str) -> Result<Vec<SettlementRecord>, WagerError> {
        let document = self.inner.document.lock().await;
        document
            .find(username)
            .map(|u| u.history.clone())
            .ok_or_else(|| WagerError::UserNotFound(username.to_owned()))
    }

    /// Run one read-modify-write against a user's record.
    ///
    /// `decide` sees the committed balance and history length while this
    /// user's lock is held; no other transaction on the same user runs until
    /// this one commits or aborts. A commit is persisted before it becomes
    /// visible. Persistence failures leave the user unchanged.
    pub async fn transact<F>(&self, username: &str, decide: F) -> Result<TransactionResult, WagerError>
    where
        F: FnOnce(LedgerView) -> TxDecision,
    {
        let lock = self.user_lock(username).await?;
        let _held = lock.lock().await;

        let (key, view) = {
            let document = self.inner.document.lock().await;
            let key = document
                .find_key(username)
                .ok_or_else(|| WagerError::UserNotFound(username.to_owned()))?
                .to_owned();
            let user = &document.users[&key];
            let view = LedgerView {
                balance: user.balance,
                history_len: user.history.len(),
            };
            (key, view)
        };

        let (new_balance, entry) = match decide(view) {
            TxDecision::Abort(reason) => {
                warn!(username = %key, reason = ?reason, "Transaction aborted");
                return Ok(TransactionResult::Aborted(reason));
            }
            TxDecision::Commit { new_balance, .. } if new_balance < Decimal::ZERO => {
                let reason = AbortReason::NegativeBalance { attempted: new_balance };
                warn!(username = %key, reason = ?reason, "Transaction aborted");
                return Ok(TransactionResult::Aborted(reason));
            }
            TxDecision::Commit { new_balance, entry } => (new_balance, entry),
        };

        let mut document = self.inner.document.lock().await;
        let mut candidate = document.clone();
        let user = candidate
            .users
            .get_mut(&key)
            .ok_or_else(|| WagerError::UserNotFound(username.to_owned()))?;
        user.balance = new_balance;
        user.history.push(entry);
        let history_len = user.history.len();

        if let Err(e) = self.inner.backend.persist(&candidate).await {
            warn!(username = %key, error = %e, "Commit not persisted, balance unchanged");
            return Err(WagerError::store(e));
        }
        *document = candidate;

        debug!(username = %key, balance = %new_balance, history_len, "Transaction committed");
        Ok(TransactionResult::Committed {
            balance: new_balance,
            history_len,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Outcome, PlayMode};
    use rust_decimal_macros::dec;
    use tokio_test::{assert_err, assert_ok};

    fn test_config() -> LedgerConfig {
        LedgerConfig {
            starting_balance: dec!(1000),
            digest_iterations: 1,
            digest_memory_kib: 8,
        }
    }

    async fn memory_store() -> LedgerStore {
        LedgerStore::open(MemoryBackend::new(), test_config()).await.unwrap()
    }

    fn entry(stake: Decimal, payout: Decimal) -> SettlementRecord {
        SettlementRecord {
            id: uuid::Uuid::new_v4(),
            created_at: 0,
            picks: Vec::new(),
            stake,
            mode: PlayMode::PowerPlay,
            result: if payout > Decimal::ZERO { Outcome::Win } else { Outcome::Loss },
            losses: 0,
            multiplier: Decimal::ZERO,
            payout,
            completed: true,
        }
    }

    fn apply(delta: Decimal) -> impl FnOnce(LedgerView) -> TxDecision {
        move |view| TxDecision::Commit {
            new_balance: view.balance + delta,
            entry: entry(Decimal::ZERO, Decimal::ZERO),
        }
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let store = memory_store().await;
        let profile = store.register("Alice", "pw", Some("alice@example.com")).await.unwrap();
        assert_eq!(profile.username, "Alice");
        assert_eq!(profile.balance, dec!(1000));
        assert_eq!(profile.email.as_deref(), Some("alice@example.com"));

        let fetched = store.get_user("ALICE").await.unwrap();
        assert_eq!(fetched.username, "Alice");
    }

    #[tokio::test]
    async fn test_register_case_insensitive_collision() {
        let store = memory_store().await;
        assert_ok!(store.register("Alice", "pw", None).await);
        let err = store.register("alice", "other", None).await.unwrap_err();
        assert!(matches!(err, WagerError::UsernameTaken(_)));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let store = memory_store().await;
        assert!(matches!(
            store.register("   ", "pw", None).await,
            Err(WagerError::InvalidRegistration(_))
        ));
        assert!(matches!(
            store.register("two words", "pw", None).await,
            Err(WagerError::InvalidRegistration(_))
        ));
        assert!(matches!(
            store.register("bob", "", None).await,
            Err(WagerError::InvalidRegistration(_))
        ));
    }

    #[tokio::test]
    async fn test_digest_not_raw_password() {
        let backend = MemoryBackend::new();
        let store = LedgerStore::open(backend.clone(), test_config()).await.unwrap();
        store.register("carol", "hunter2", None).await.unwrap();
        let stored = backend.snapshot().await;
        let record = stored.find("carol").unwrap();
        assert_ne!(record.password_digest, "hunter2");
        assert!(credentials::verify_password("hunter2", &record.password_digest));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let store = memory_store().await;
        store.register("Dave", "secret", None).await.unwrap();

        let profile = store.authenticate("dave", "secret").await.unwrap();
        assert_eq!(profile.username, "Dave");

        let wrong = store.authenticate("Dave", "nope").await.unwrap_err();
        let missing = store.authenticate("nobody", "secret").await.unwrap_err();
        assert!(matches!(wrong, WagerError::InvalidCredentials));
        assert!(matches!(missing, WagerError::InvalidCredentials));
        assert_eq!(wrong.to_string(), missing.to_string());
    }

    #[tokio::test]
    async fn test_get_user_not_found() {
        let store = memory_store().await;
        assert!(matches!(store.get_user("ghost").await, Err(WagerError::UserNotFound(_))));
        assert!(matches!(store.history("ghost").await, Err(WagerError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn test_transact_commit() {
        let store = memory_store().await;
        store.register("erin", "pw", None).await.unwrap();

        let result = store
            .transact("ERIN", |view| {
                assert_eq!(view.balance, dec!(1000));
                assert_eq!(view.history_len, 0);
                TxDecision::Commit {
                    new_balance: dec!(1050),
                    entry: entry(dec!(10), dec!(60)),
                }
            })
            .await
            .unwrap();

        assert_eq!(
            result,
            TransactionResult::Committed { balance: dec!(1050), history_len: 1 }
        );
        assert_eq!(store.get_user("erin").await.unwrap().balance, dec!(1050));
        assert_eq!(store.history("erin").await.unwrap()[0].payout, dec!(60));
    }

    #[tokio::test]
    async fn test_transact_abort_leaves_record() {
        let store = memory_store().await;
        store.register("frank", "pw", None).await.unwrap();

        let result = store
            .transact("frank", |view| {
                TxDecision::Abort(AbortReason::InsufficientFunds {
                    needed: dec!(5000),
                    available: view.balance,
                })
            })
            .await
            .unwrap();

        assert!(matches!(result, TransactionResult::Aborted(AbortReason::InsufficientFunds { .. })));
        let profile = store.get_user("frank").await.unwrap();
        assert_eq!(profile.balance, dec!(1000));
        assert_eq!(profile.settlements, 0);
    }

    #[tokio::test]
    async fn test_transact_refuses_negative_balance() {
        let store = memory_store().await;
        store.register("gina", "pw", None).await.unwrap();

        let result = store.transact("gina", apply(dec!(-1001))).await.unwrap();
        assert_eq!(
            result,
            TransactionResult::Aborted(AbortReason::NegativeBalance { attempted: dec!(-1) })
        );
        assert_eq!(store.get_user("gina").await.unwrap().balance, dec!(1000));
    }

    #[tokio::test]
    async fn test_transact_unknown_user() {
        let store = memory_store().await;
        let err = store.transact("nobody", apply(dec!(1))).await.unwrap_err();
        assert!(matches!(err, WagerError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_users_do_not_grow_lock_table() {
        let store = memory_store().await;
        store.register("Kim", "pw", None).await.unwrap();
        for i in 0..100 {
            assert_err!(store.transact(&format!("ghost{i}"), apply(dec!(1))).await);
        }
        assert!(store.inner.user_locks.lock().await.is_empty());

        assert_ok!(store.transact("kim", apply(dec!(1))).await);
        assert_ok!(store.transact("KIM", apply(dec!(1))).await);
        assert_eq!(store.inner.user_locks.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_persist_failure_leaves_balance_unchanged() {
        let mut backend = MockLedgerBackend::new();
        backend.expect_load().returning(|| Ok(LedgerDocument::default()));
        backend.expect_describe().returning(|| "mock".to_string());
        let mut calls = 0;
        backend.expect_persist().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(())
            } else {
                Err(anyhow::anyhow!("disk full"))
            }
        });

        let store = LedgerStore::open(backend, test_config()).await.unwrap();
        store.register("hank", "pw", None).await.unwrap();

        let err = store.transact("hank", apply(dec!(-10))).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("disk full"));

        let profile = store.get_user("hank").await.unwrap();
        assert_eq!(profile.balance, dec!(1000));
        assert_eq!(profile.settlements, 0);
    }

    #[tokio::test]
    async fn test_open_propagates_load_failure() {
        let mut backend = MockLedgerBackend::new();
        backend
            .expect_load()
            .returning(|| Err(anyhow::anyhow!("permission denied")));
        backend.expect_describe().returning(|| "mock".to_string());
        let result = LedgerStore::open(backend, test_config()).await;
        assert!(matches!(result, Err(WagerError::Store(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transactions_no_lost_update() {
        let store = memory_store().await;
        store.register("ivy", "pw", None).await.unwrap();

        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let store = store.clone();
                let delta = if i % 2 == 0 { dec!(3) } else { dec!(-1) };
                tokio::spawn(async move { store.transact("Ivy", apply(delta)).await })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            assert_ok!(task.unwrap());
        }

        let profile = store.get_user("ivy").await.unwrap();
        assert_eq!(profile.balance, dec!(1000) + dec!(75) - dec!(25));
        assert_eq!(profile.settlements, 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_single_winner() {
        let store = memory_store().await;
        let names = ["Zed", "zed", "ZED", "zEd"];
        let tasks: Vec<_> = names
            .iter()
            .map(|name| {
                let store = store.clone();
                let name = name.to_string();
                tokio::spawn(async move { store.register(&name, "pw", None).await })
            })
            .collect();

        let results = futures::future::join_all(tasks).await;
        let ok = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
        assert_eq!(ok, 1);
        for result in results {
            if let Ok(Err(e)) = result {
                assert!(matches!(e, WagerError::UsernameTaken(_)));
            }
        }
    }

    #[tokio::test]
    async fn test_empty_password_rejected_before_hashing() {
        let store = memory_store().await;
        assert_err!(store.register("jay", "", None).await);
        assert!(store.get_user("jay").await.is_err());
    }

    #[test]
    fn test_document_find_key() {
        let mut doc = LedgerDocument::default();
        doc.users.insert(
            "Alice".into(),
            UserRecord {
                username: "Alice".into(),
                password_digest: String::new(),
                email: None,
                balance: dec!(1),
                created_at: 0,
                history: Vec::new(),
            },
        );
        assert_eq!(doc.find_key("aLiCe"), Some("Alice"));
        assert!(doc.find("bob").is_none());
    }
}
