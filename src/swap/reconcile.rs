use std::collections::HashSet;

use serde::Serialize;

use super::service::SwapService;
use super::store::now_unix;
use super::sweeper::{DepositSnapshot, is_swappable};
use super::{ClientAccount, SwapDirection, SwapRecord};
use crate::chain::{ChainFacade, IncomingTransaction};
use crate::error::{SwapError, SwapResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceReport {
    pub direction: SwapDirection,
    pub window_start: i64,
    pub transaction_total: u64,
    pub swap_total: u64,
}

impl BalanceReport {
    pub fn is_balanced(&self) -> bool {
        self.transaction_total == self.swap_total
    }

    pub fn ensure_balanced(&self) -> SwapResult<()> {
        if self.is_balanced() {
            return Ok(());
        }
        Err(SwapError::BalanceMismatch {
            direction: self.direction,
            transaction_total: self.transaction_total,
            swap_total: self.swap_total,
        })
    }
}

/// Sum of confirmed deposits at or after `window_start`, each hash counted once.
pub fn transaction_side_total(
    facade: &dyn ChainFacade,
    fetched: &[(ClientAccount, Vec<IncomingTransaction>)],
    window_start: i64,
) -> u64 {
    let mut seen = HashSet::new();
    let mut total = 0u64;
    for (account, txs) in fetched {
        for tx in txs {
            if tx.timestamp < window_start || !is_swappable(facade, account, tx) {
                continue;
            }
            if seen.insert(tx.hash.as_str()) {
                total = total.saturating_add(tx.amount);
            }
        }
    }
    total
}

pub fn swap_side_total(swaps: &[SwapRecord], window_start: i64) -> u64 {
    swaps
        .iter()
        .filter(|s| s.deposit_observed_at >= window_start)
        .fold(0u64, |acc, s| acc.saturating_add(s.amount))
}

impl SwapService {
    pub async fn check_all_balances(&self) -> SwapResult<Vec<BalanceReport>> {
        let mut reports = Vec::with_capacity(SwapDirection::ALL.len());
        for direction in SwapDirection::ALL {
            reports.push(self.check_balance(direction).await?);
        }
        Ok(reports)
    }

    /// Fetches the chain afresh and compares it with the ledger.
    pub async fn check_balance(&self, direction: SwapDirection) -> SwapResult<BalanceReport> {
        let snapshot = self.snapshot_deposits(direction).await?;
        self.balance_report(&snapshot)
    }

    /// Compares an already fetched view of the chain with the ledger.
    pub fn balance_report(&self, snapshot: &DepositSnapshot) -> SwapResult<BalanceReport> {
        let direction = snapshot.direction;
        let window_start = now_unix() - self.cfg.reconcile_window_secs;
        let facade = self.chains.deposit(direction);
        let swaps = self.store.swaps(direction)?;

        let report = BalanceReport {
            direction,
            window_start,
            transaction_total: transaction_side_total(
                facade.as_ref(),
                &snapshot.fetched,
                window_start,
            ),
            swap_total: swap_side_total(&swaps, window_start),
        };

        if report.is_balanced() {
            tracing::debug!(
                %direction,
                total = report.transaction_total,
                "balances match"
            );
        } else {
            tracing::error!(
                %direction,
                transaction_total = report.transaction_total,
                swap_total = report.swap_total,
                window_start,
                "balance mismatch"
            );
        }
        Ok(report)
    }
}
