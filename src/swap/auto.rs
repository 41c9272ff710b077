//! Daily-limit auto-processing loop.
//!
//! Each wake sweeps deposits, reconciles balances, then settles each
//! direction up to its remaining USD allowance. A balance mismatch or any
//! non-recoverable error halts the loop; restarting it is left to whatever
//! supervises the process.

use std::fmt;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;

use super::service::SwapService;
use super::settlement::SettlementResult;
use super::{PendingSwap, SwapDirection};
use crate::error::{SwapError, SwapResult};
use crate::price::usd_value;

#[derive(Debug, Clone, Copy, Default)]
pub struct AutoOptions {
    /// Stop after a single cycle instead of sleeping and repeating.
    pub run_once: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Sleeping,
    Sweeping,
    Reconciling,
    Settling(SwapDirection),
    Halted,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Sleeping => f.write_str("sleeping"),
            LoopState::Sweeping => f.write_str("sweeping"),
            LoopState::Reconciling => f.write_str("reconciling"),
            LoopState::Settling(direction) => write!(f, "settling {direction}"),
            LoopState::Halted => f.write_str("halted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoExit {
    RanOnce,
    /// Every direction reached its daily limit.
    LimitsReached,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoSettlement {
    pub settlement: SettlementResult,
    pub price_usd: Decimal,
    pub volume_usd: Decimal,
    pub accumulated_usd: Decimal,
}

#[derive(Debug, Clone)]
pub struct Admission {
    pub swaps: Vec<PendingSwap>,
    pub volume_usd: Decimal,
}

/// Picks the prefix of `pending` to settle this cycle.
///
/// A swap is admitted while the running total is still below `limit_usd`,
/// so the swap that crosses the limit is settled too and nothing after it.
/// A direction with any headroom left therefore never settles zero swaps.
pub fn admit_within_limit(
    pending: Vec<PendingSwap>,
    price: Decimal,
    accumulated_usd: Decimal,
    limit_usd: Decimal,
) -> Admission {
    let mut running = accumulated_usd;
    let mut volume_usd = Decimal::ZERO;
    let mut swaps = Vec::new();
    for swap in pending {
        if running >= limit_usd {
            break;
        }
        let value = usd_value(swap.swap.amount, price);
        running += value;
        volume_usd += value;
        swaps.push(swap);
    }
    Admission { swaps, volume_usd }
}

impl SwapService {
    pub async fn run_auto_processing(&mut self, options: AutoOptions) -> SwapResult<AutoExit> {
        let interval = Duration::from_secs(self.cfg.auto_interval_secs);
        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            let has_headroom = match self.run_auto_cycle().await {
                Ok(has_headroom) => has_headroom,
                Err(err) => {
                    self.transition(LoopState::Halted);
                    tracing::error!(cycle, error = %err, "auto processing halted");
                    return Err(err);
                }
            };

            self.transition(LoopState::Sleeping);
            if options.run_once {
                return Ok(AutoExit::RanOnce);
            }
            if !has_headroom {
                tracing::info!(cycle, "daily limits reached for every direction; stopping");
                return Ok(AutoExit::LimitsReached);
            }

            tracing::debug!(cycle, interval_secs = interval.as_secs(), "sleeping");
            tokio::time::sleep(interval).await;
        }
    }

    /// One sweep / reconcile / settle pass. Returns whether any direction
    /// still has daily headroom.
    pub async fn run_auto_cycle(&mut self) -> SwapResult<bool> {
        self.transition(LoopState::Sweeping);
        let (swept, snapshots) = self.sweep_all().await?;
        tracing::debug!(?swept, "sweep finished");

        // Reconcile against what the sweep saw; a deposit confirming in
        // between is picked up next cycle.
        self.transition(LoopState::Reconciling);
        for snapshot in &snapshots {
            self.balance_report(snapshot)?.ensure_balanced()?;
        }

        let mut has_headroom = false;
        for direction in SwapDirection::ALL {
            self.transition(LoopState::Settling(direction));
            match self.process_auto_swaps(direction).await {
                Ok(done) => {
                    tracing::info!(
                        %direction,
                        swaps = done.settlement.swaps.len(),
                        volume_usd = %done.volume_usd,
                        accumulated_usd = %done.accumulated_usd,
                        "auto settlement complete"
                    );
                }
                Err(err) if err.is_recoverable() => {
                    tracing::info!(%direction, reason = %err, "skipping direction this cycle");
                }
                Err(err) => return Err(err),
            }
            has_headroom |= self.has_headroom(direction)?;
        }
        Ok(has_headroom)
    }

    /// Settles pending swaps of `direction` within the remaining daily allowance.
    pub async fn process_auto_swaps(
        &mut self,
        direction: SwapDirection,
    ) -> SwapResult<AutoSettlement> {
        let key = self.volume_key(direction);
        let accumulated_usd = self.volume.get(&key)?.unwrap_or_default();
        let limit_usd = self.cfg.daily_limit_usd(direction);
        if accumulated_usd >= limit_usd {
            return Err(SwapError::DailyLimitHit {
                direction,
                accumulated_usd,
                limit_usd,
            });
        }

        let price_usd = self.current_price().await?;

        let pending = self.store.pending_swaps(direction)?;
        if pending.is_empty() {
            return Err(SwapError::NoSwapsToProcess(direction));
        }
        let admission = admit_within_limit(pending, price_usd, accumulated_usd, limit_usd);
        tracing::debug!(
            %direction,
            admitted = admission.swaps.len(),
            volume_usd = %admission.volume_usd,
            %limit_usd,
            "admitted swaps within daily limit"
        );

        let settlement = self.process_swaps(direction, admission.swaps).await?;
        let volume_usd = usd_value(settlement.total_amount, price_usd);
        let accumulated_usd = accumulated_usd + volume_usd;
        self.volume.set(&key, accumulated_usd)?;

        Ok(AutoSettlement {
            settlement,
            price_usd,
            volume_usd,
            accumulated_usd,
        })
    }

    fn transition(&mut self, next: LoopState) {
        tracing::debug!(from = %self.state, to = %next, "auto loop state");
        self.state = next;
    }
}
