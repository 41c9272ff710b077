//! Persisted per-direction USD volume counters.
//!
//! Counters live in a small JSON key-value file next to the ledger, not in
//! the ledger itself. Every `set` is flushed to disk before returning.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::SwapDirection;

pub trait DailyVolumeStore: Send {
    fn get(&self, key: &str) -> Result<Option<Decimal>>;
    fn set(&mut self, key: &str, value: Decimal) -> Result<()>;
}

/// How settled volume is grouped into "days".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketPolicy {
    /// One bucket that only an operator reset clears.
    #[default]
    Manual,
    /// A fresh bucket per UTC calendar day.
    UtcDay,
}

impl BucketPolicy {
    pub fn bucket(self, now: DateTime<Utc>) -> String {
        match self {
            BucketPolicy::Manual => "current".to_string(),
            BucketPolicy::UtcDay => now.format("%Y-%m-%d").to_string(),
        }
    }
}

impl std::str::FromStr for BucketPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(BucketPolicy::Manual),
            "utc_day" => Ok(BucketPolicy::UtcDay),
            other => anyhow::bail!("unknown bucket policy: {other} (expected manual/utc_day)"),
        }
    }
}

pub fn counter_key(direction: SwapDirection, bucket: &str) -> String {
    format!("daily_volume_usd:{direction}:{bucket}")
}

#[derive(Debug)]
pub struct JsonFileVolumeStore {
    path: PathBuf,
    values: BTreeMap<String, Decimal>,
}

impl JsonFileVolumeStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("create counter dir {}", dir.display()))?;
        }

        let values = if path.exists() {
            let json = fs::read_to_string(&path)
                .with_context(|| format!("read counters {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("parse counters {}", path.display()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &BTreeMap<String, Decimal> {
        &self.values
    }

    fn flush(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.values).context("serialize counters")?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).with_context(|| format!("write counters {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace counters {}", self.path.display()))?;
        Ok(())
    }
}

impl DailyVolumeStore for JsonFileVolumeStore {
    fn get(&self, key: &str) -> Result<Option<Decimal>> {
        Ok(self.values.get(key).copied())
    }

    fn set(&mut self, key: &str, value: Decimal) -> Result<()> {
        let previous = self.values.insert(key.to_string(), value);
        if let Err(err) = self.flush() {
            match previous {
                Some(v) => self.values.insert(key.to_string(), v),
                None => self.values.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }
}
