use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser as _, Subcommand};
use loki_bridge_swap::swap::SwapDirection;
use loki_bridge_swap::swap::counter::{
    BucketPolicy, DailyVolumeStore as _, JsonFileVolumeStore, counter_key,
};
use loki_bridge_swap::swap::store::SqliteStore;
use rust_decimal::Decimal;
use serde_json::json;

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long)]
    store_path: PathBuf,

    #[arg(long)]
    volume_path: PathBuf,

    #[arg(long, default_value = "manual")]
    bucket_policy: BucketPolicy,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Swaps waiting for a payout, in settlement order.
    Pending {
        #[arg(long)]
        direction: SwapDirection,
    },
    Swaps {
        #[arg(long)]
        direction: SwapDirection,
    },
    /// USD volume settled by auto processing in the current bucket.
    Volume,
    ResetVolume {
        #[arg(long)]
        direction: SwapDirection,
    },
}

fn main() -> Result<()> {
    loki_bridge_swap::logging::init().ok();
    let args = Args::parse();

    let store = SqliteStore::open(args.store_path).context("open sqlite store")?;
    let mut volume = JsonFileVolumeStore::open(args.volume_path).context("open volume store")?;
    let bucket = args.bucket_policy.bucket(chrono::Utc::now());

    let out = match args.command {
        Command::Pending { direction } => {
            let pending = store
                .pending_swaps(direction)
                .with_context(|| format!("list pending {direction} swaps"))?;
            let total = pending
                .iter()
                .fold(0u64, |acc, p| acc.saturating_add(p.swap.amount));
            json!({
              "direction": direction,
              "count": pending.len(),
              "total_amount": total,
              "swaps": pending,
            })
        }
        Command::Swaps { direction } => {
            let swaps = store
                .swaps(direction)
                .with_context(|| format!("list {direction} swaps"))?;
            json!({
              "direction": direction,
              "count": swaps.len(),
              "swaps": swaps,
            })
        }
        Command::Volume => {
            let mut directions = serde_json::Map::new();
            for direction in SwapDirection::ALL {
                let usd = volume
                    .get(&counter_key(direction, &bucket))?
                    .unwrap_or_default();
                directions.insert(direction.to_string(), json!(usd.to_string()));
            }
            json!({
              "bucket": bucket,
              "volume_usd": directions,
            })
        }
        Command::ResetVolume { direction } => {
            let key = counter_key(direction, &bucket);
            let previous = volume.get(&key)?.unwrap_or_default();
            volume
                .set(&key, Decimal::ZERO)
                .with_context(|| format!("reset {key}"))?;
            tracing::info!(%direction, %bucket, %previous, "daily volume reset");
            json!({
              "direction": direction,
              "bucket": bucket,
              "previous_usd": previous.to_string(),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
