//! Pick'em simulator.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the ledger (creating it if missing), then repeatedly builds a
//! random slip from the prop catalog and settles it for a bot user until
//! the configured rounds are done, the bot is broke, or Ctrl+C.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use pickem_ledger::catalog::Catalog;
use pickem_ledger::config::{self, SimulationConfig};
use pickem_ledger::engine::simulator::{random_slip, SimulationTally};
use pickem_ledger::engine::{Bettor, CoinFlipOracle, SettlementEngine};
use pickem_ledger::payout;
use pickem_ledger::storage::{JsonFileBackend, LedgerStore};
use pickem_ledger::types::{UserProfile, WagerError};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;
    init_logging();

    info!(
        ledger = %cfg.ledger.path,
        catalog = %cfg.simulation.catalog_path,
        mode = %cfg.simulation.mode,
        stake = %cfg.simulation.stake,
        rounds = cfg.simulation.rounds,
        "Pick'em simulator starting up"
    );

    let store = LedgerStore::open(JsonFileBackend::new(&cfg.ledger.path), cfg.ledger.store_config())
        .await
        .context("Failed to open ledger")?;
    let catalog = Catalog::load(&cfg.simulation.catalog_path)?;

    let sim = &cfg.simulation;
    let password = SecretString::new(config::AppConfig::resolve_env(&sim.password_env)?);
    let bot = sign_in(&store, sim, &password).await?;
    info!(username = %bot.username, balance = %bot.balance, "Simulation user ready");

    let (oracle, mut rng) = match sim.seed {
        Some(seed) => (CoinFlipOracle::seeded(seed), StdRng::seed_from_u64(seed.wrapping_add(1))),
        None => (CoinFlipOracle::from_entropy(), StdRng::from_entropy()),
    };
    let engine = SettlementEngine::new(store.clone(), Arc::new(oracle));
    let bettor = Bettor::user(bot.username.clone());

    // -- Main loop -------------------------------------------------------

    let mut tally = SimulationTally::default();
    let mut interval = tokio::time::interval(Duration::from_millis(sim.interval_ms));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    while tally.rounds < sim.rounds {
        tokio::select! {
            _ = interval.tick() => {
                let slip = random_slip(&catalog, sim.picks_per_slip, sim.mode, &mut rng)?;
                let preview = payout::preview(&slip);
                info!(
                    picks = slip.len(),
                    mode = %slip.mode(),
                    multiplier = %preview.headline(),
                    "Slip built"
                );
                for pick in slip.picks() {
                    info!(pick = %pick, "  pick");
                }

                match engine.settle(&bettor, &slip, sim.stake).await {
                    Ok(result) => {
                        tally.record(&result);
                        info!(
                            round = tally.rounds,
                            result = %result.outcome(),
                            payout = format!("${:.2}", result.payout()),
                            balance = ?result.balance_after,
                            "Slip settled"
                        );
                    }
                    Err(WagerError::InsufficientFunds { needed, available }) => {
                        warn!(%needed, %available, "Out of money. Stopping.");
                        break;
                    }
                    Err(e) if e.is_retryable() => {
                        error!(error = %e, "Settlement failed, will retry next tick");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    let profile = store.get_user(&bot.username).await?;
    info!(
        summary = %tally,
        balance = format!("${:.2}", profile.balance),
        settlements = profile.settlements,
        "Simulation finished."
    );

    Ok(())
}

/// Authenticate the bot, registering it on first run.
async fn sign_in(store: &LedgerStore, sim: &SimulationConfig, password: &SecretString) -> Result<UserProfile> {
    match store.authenticate(&sim.username, password.expose_secret()).await {
        Ok(profile) => Ok(profile),
        Err(WagerError::InvalidCredentials) => {
            if store.get_user(&sim.username).await.is_ok() {
                anyhow::bail!("Simulation user {} exists with a different password", sim.username);
            }
            info!(username = %sim.username, "Registering simulation user");
            Ok(store
                .register(&sim.username, password.expose_secret(), sim.email.as_deref())
                .await?)
        }
        Err(e) => Err(e).context("Simulation user could not sign in"),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pickem_ledger=info"));

    let json_logging = std::env::var("PICKEM_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
