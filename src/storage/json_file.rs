//! JSON file backend.
//!
//! Keeps the ledger as one pretty-printed JSON document so it stays
//! diffable. Writes go to a sibling temp file which is fsynced and then
//! renamed over the ledger, so a crash leaves either the old or the new
//! document on disk, never a torn one.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{LedgerBackend, LedgerDocument};

/// Default ledger file path.
pub const DEFAULT_LEDGER_FILE: &str = "users_db.json";

#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Move an unreadable ledger aside so an operator can inspect it.
    async fn quarantine(&self) -> Result<PathBuf> {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".corrupt-{}", chrono::Utc::now().timestamp()));
        let target = self.path.with_file_name(name);
        fs::rename(&self.path, &target)
            .await
            .with_context(|| format!("Failed to quarantine {}", self.path.display()))?;
        Ok(target)
    }
}

/// Flush the directory entry for `path` so a completed rename survives a crash.
#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    fs::File::open(dir)
        .await
        .with_context(|| format!("Failed to open ledger directory {}", dir.display()))?
        .sync_all()
        .await
        .with_context(|| format!("Failed to sync ledger directory {}", dir.display()))
}

// Directories cannot be opened as files here; the rename is as durable as
// the platform makes it.
#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

impl Default for JsonFileBackend {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_FILE)
    }
}

#[async_trait]
impl LedgerBackend for JsonFileBackend {
    async fn load(&self) -> Result<LedgerDocument> {
        let path = self.path.display().to_string();

        let json = match fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path, "No ledger found, creating empty ledger");
                let document = LedgerDocument::default();
                self.persist(&document).await?;
                return Ok(document);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read ledger from {path}"));
            }
        };

        match serde_json::from_str::<LedgerDocument>(&json) {
            Ok(document) => {
                info!(path, users = document.users.len(), "Ledger loaded from disk");
                Ok(document)
            }
            Err(e) => {
                let moved_to = self.quarantine().await?;
                warn!(
                    path,
                    error = %e,
                    quarantined = %moved_to.display(),
                    "Ledger file is corrupted; starting with an empty ledger"
                );
                let document = LedgerDocument::default();
                self.persist(&document).await?;
                Ok(document)
            }
        }
    }

    async fn persist(&self, document: &LedgerDocument) -> Result<()> {
        let json = serde_json::to_vec_pretty(document).context("Failed to serialise ledger")?;
        let temp = self.temp_path();

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create ledger directory {}", dir.display()))?;
        }

        let mut file = fs::File::create(&temp)
            .await
            .with_context(|| format!("Failed to create {}", temp.display()))?;
        file.write_all(&json)
            .await
            .with_context(|| format!("Failed to write {}", temp.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("Failed to sync {}", temp.display()))?;
        drop(file);

        fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("Failed to replace ledger at {}", self.path.display()))?;
        sync_parent_dir(&self.path).await?;

        debug!(path = %self.path.display(), users = document.users.len(), "Ledger saved");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
