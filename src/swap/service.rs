use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::SwapDirection;
use super::auto::LoopState;
use super::counter::{BucketPolicy, DailyVolumeStore, counter_key};
use super::store::SqliteStore;
use crate::chain::Chains;
use crate::error::{SwapError, SwapResult};
use crate::price::PriceOracle;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DailyLimits {
    pub loki_to_bloki: Decimal,
    pub bloki_to_loki: Decimal,
}

impl Default for DailyLimits {
    fn default() -> Self {
        Self {
            loki_to_bloki: Decimal::from(10_000),
            bloki_to_loki: Decimal::from(10_000),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SwapServiceConfig {
    /// Charged once per destination address when paying out LOKI, in 1e9 units.
    pub withdrawal_fee: u64,
    pub daily_limit_usd: DailyLimits,
    /// Asset id passed to the price oracle.
    pub price_asset: String,
    pub auto_interval_secs: u64,
    pub reconcile_window_secs: i64,
    pub bucket_policy: BucketPolicy,
}

impl Default for SwapServiceConfig {
    fn default() -> Self {
        Self {
            withdrawal_fee: 0,
            daily_limit_usd: DailyLimits::default(),
            price_asset: "loki-network".to_string(),
            auto_interval_secs: 300,
            reconcile_window_secs: 2 * 24 * 60 * 60,
            bucket_policy: BucketPolicy::Manual,
        }
    }
}

impl SwapServiceConfig {
    pub fn daily_limit_usd(&self, direction: SwapDirection) -> Decimal {
        match direction {
            SwapDirection::LokiToBloki => self.daily_limit_usd.loki_to_bloki,
            SwapDirection::BlokiToLoki => self.daily_limit_usd.bloki_to_loki,
        }
    }
}

pub struct SwapService {
    pub(super) cfg: SwapServiceConfig,
    pub(super) chains: Chains,
    pub(super) store: SqliteStore,
    pub(super) volume: Box<dyn DailyVolumeStore>,
    pub(super) oracle: Arc<dyn PriceOracle>,
    pub(super) state: LoopState,
}

impl SwapService {
    pub fn new(
        cfg: SwapServiceConfig,
        chains: Chains,
        store: SqliteStore,
        volume: Box<dyn DailyVolumeStore>,
        oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        Self {
            cfg,
            chains,
            store,
            volume,
            oracle,
            state: LoopState::Sleeping,
        }
    }

    pub fn config(&self) -> &SwapServiceConfig {
        &self.cfg
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SqliteStore {
        &mut self.store
    }

    pub fn chains(&self) -> &Chains {
        &self.chains
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub(super) fn volume_key(&self, direction: SwapDirection) -> String {
        counter_key(direction, &self.cfg.bucket_policy.bucket(chrono::Utc::now()))
    }

    /// USD volume settled by the auto-loop in the current bucket.
    pub fn daily_volume_usd(&self, direction: SwapDirection) -> Result<Decimal> {
        Ok(self
            .volume
            .get(&self.volume_key(direction))?
            .unwrap_or_default())
    }

    pub fn has_headroom(&self, direction: SwapDirection) -> Result<bool> {
        Ok(self.daily_volume_usd(direction)? < self.cfg.daily_limit_usd(direction))
    }

    pub(super) async fn current_price(&self) -> SwapResult<Decimal> {
        let asset = &self.cfg.price_asset;
        let failed = |reason: String| SwapError::PriceFetchFailed {
            asset: asset.clone(),
            reason,
        };
        match self.oracle.current_price_usd(asset).await {
            Ok(Some(price)) if price > Decimal::ZERO => Ok(price),
            Ok(Some(price)) => Err(failed(format!("non-positive price {price}"))),
            Ok(None) => Err(failed("no quote available".to_string())),
            Err(err) => Err(failed(format!("{err:#}"))),
        }
    }
}
