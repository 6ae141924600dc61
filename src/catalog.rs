//! Read-only prop catalog.
//!
//! Props come from the ingestion side as a JSON array. The engine only
//! reads them to populate slips and never mutates the listing.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::types::Prop;

/// Raw row as exported by the scraper; column names vary by source.
#[derive(Debug, Deserialize)]
struct RawProp {
    #[serde(alias = "full_name")]
    player: Option<String>,
    #[serde(alias = "stat_name")]
    stat: Option<String>,
    #[serde(alias = "stat_value", alias = "value")]
    line: Option<Decimal>,
    #[serde(default)]
    sport: Option<String>,
}

impl RawProp {
    fn into_prop(self) -> Option<Prop> {
        let player = self.player.filter(|p| !p.trim().is_empty())?;
        let stat = self.stat.filter(|s| !s.trim().is_empty())?;
        Some(Prop {
            player,
            stat,
            line: self.line?,
            sport: self.sport,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    props: Vec<Prop>,
}

impl Catalog {
    pub fn new(props: Vec<Prop>) -> Self {
        Self { props }
    }

    /// Parse a JSON array of props, skipping rows that lack a player,
    /// stat, or numeric line.
    pub fn from_json(json: &str) -> Result<Self> {
        let rows: Vec<serde_json::Value> =
            serde_json::from_str(json).context("Catalog is not a JSON array")?;
        let total = rows.len();

        let props: Vec<Prop> = rows
            .into_iter()
            .enumerate()
            .filter_map(|(i, row)| {
                match serde_json::from_value::<RawProp>(row).ok().and_then(RawProp::into_prop) {
                    Some(prop) => Some(prop),
                    None => {
                        warn!(row = i, "Skipping malformed catalog row");
                        None
                    }
                }
            })
            .collect();

        if props.len() < total {
            warn!(kept = props.len(), total, "Catalog rows dropped");
        }
        Ok(Self { props })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog: {}", path.display()))?;
        let catalog = Self::from_json(&json)
            .with_context(|| format!("Failed to parse catalog: {}", path.display()))?;
        info!(path = %path.display(), props = catalog.len(), "Catalog loaded");
        Ok(catalog)
    }

    pub fn props(&self) -> &[Prop] {
        &self.props
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Sorted, de-duplicated player names.
    pub fn players(&self) -> Vec<&str> {
        let mut players: Vec<&str> = self.props.iter().map(|p| p.player.as_str()).collect();
        players.sort_unstable();
        players.dedup();
        players
    }

    /// Props whose player name contains `query`, case-insensitively.
    pub fn find_player(&self, query: &str) -> Vec<&Prop> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.props
            .iter()
            .filter(|p| p.player.to_lowercase().contains(&needle))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
