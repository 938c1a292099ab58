//! Unified, cross-chain balance snapshot.

use crate::chain;
use crate::provider::{self, UserAsset};
use crate::session::ProviderSession;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("Provider not initialized")]
    NotInitialized,

    #[error("Balance fetch failed: {0}")]
    Provider(#[from] provider::Error),
}

/// Fiat value held on one chain across all assets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainShare {
    pub chain_id: u64,
    pub chain_name: String,
    pub value: f64,
    /// Share of the total fiat value, 0-100.
    pub percent: f64,
}

#[derive(Default)]
struct Snapshot {
    assets: Arc<[UserAsset]>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Holds the last balance snapshot pulled from the provider.
///
/// Refreshes replace the whole collection; readers get a shared handle to
/// one complete snapshot.
#[derive(Default)]
pub struct BalanceCache {
    snapshot: RwLock<Snapshot>,
    refreshes: AtomicUsize,
}

impl BalanceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull a fresh snapshot. On failure the previous snapshot is kept.
    pub async fn refresh(&self, session: &ProviderSession) -> Result<usize, BalanceError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let assets = {
            let guard = session.connection().await;
            let connection = guard.as_ref().ok_or(BalanceError::NotInitialized)?;
            connection.provider().unified_balances().await?
        };

        let count = assets.len();
        let mut snapshot = match self.snapshot.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *snapshot = Snapshot {
            assets: assets.into(),
            refreshed_at: Some(Utc::now()),
        };
        debug!(assets = count, "Balances refreshed");
        Ok(count)
    }

    fn read<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> T {
        match self.snapshot.read() {
            Ok(g) => f(&g),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<[UserAsset]> {
        self.read(|s| s.assets.clone())
    }

    #[must_use]
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.read(|s| s.refreshed_at)
    }

    /// Number of refresh calls made, successful or not.
    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn total_fiat(&self) -> f64 {
        total_fiat(&self.snapshot())
    }

    #[must_use]
    pub fn chain_distribution(&self) -> Vec<ChainShare> {
        chain_distribution(&self.snapshot())
    }
}

#[must_use]
pub fn total_fiat(assets: &[UserAsset]) -> f64 {
    assets.iter().filter_map(|a| a.balance_in_fiat).sum()
}

/// Per-chain fiat totals, largest first.
#[must_use]
pub fn chain_distribution(assets: &[UserAsset]) -> Vec<ChainShare> {
    let mut by_chain: BTreeMap<u64, f64> = BTreeMap::new();
    for slice in assets.iter().flat_map(|a| a.breakdown.iter()) {
        if let Some(value) = slice.balance_in_fiat {
            *by_chain.entry(slice.chain_id).or_default() += value;
        }
    }

    let total: f64 = by_chain.values().sum();
    let mut shares: Vec<ChainShare> = by_chain
        .into_iter()
        .map(|(chain_id, value)| ChainShare {
            chain_id,
            chain_name: chain::display_name(chain_id),
            value,
            percent: if total > 0.0 { value / total * 100.0 } else { 0.0 },
        })
        .collect();
    shares.sort_by(|a, b| b.value.total_cmp(&a.value));
    shares
}
