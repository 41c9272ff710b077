use std::collections::HashSet;

use futures::StreamExt as _;
use serde::Serialize;

use super::service::SwapService;
use super::store::now_unix;
use super::{ClientAccount, DepositAccount, SwapDirection, SwapRecord};
use crate::chain::{ChainError, ChainFacade, IncomingTransaction};
use crate::error::SwapResult;

/// Accounts queried concurrently per direction.
const FETCH_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub loki_to_bloki: usize,
    pub bloki_to_loki: usize,
    /// Recent deposits into the bridge that no client account claims.
    pub unmatched: usize,
}

impl SweepSummary {
    pub fn get(&self, direction: SwapDirection) -> usize {
        match direction {
            SwapDirection::LokiToBloki => self.loki_to_bloki,
            SwapDirection::BlokiToLoki => self.bloki_to_loki,
        }
    }
}

/// Incoming transactions of every deposit account of one direction, as
/// fetched in a single pass.
#[derive(Debug, Clone)]
pub struct DepositSnapshot {
    pub direction: SwapDirection,
    pub fetched: Vec<(ClientAccount, Vec<IncomingTransaction>)>,
}

#[derive(Debug)]
struct Sweep {
    inserted: Vec<SwapRecord>,
    unmatched: usize,
    snapshot: DepositSnapshot,
}

/// Fetches every account's incoming transactions, preserving account order.
async fn fetch_incoming(
    facade: &dyn ChainFacade,
    accounts: Vec<ClientAccount>,
) -> Result<Vec<(ClientAccount, Vec<IncomingTransaction>)>, ChainError> {
    let results: Vec<_> = futures::stream::iter(accounts)
        .map(|account| async move {
            let txs = facade.incoming_transactions(&account.deposit).await;
            (account, txs)
        })
        .buffered(FETCH_CONCURRENCY)
        .collect()
        .await;

    results
        .into_iter()
        .map(|(account, txs)| txs.map(|txs| (account, txs)))
        .collect()
}

/// Whether `tx` is a confirmed deposit that may back a swap for `account`.
pub(super) fn is_swappable(
    facade: &dyn ChainFacade,
    account: &ClientAccount,
    tx: &IncomingTransaction,
) -> bool {
    if !facade.is_settled(tx) {
        return false;
    }
    if !tx.belongs_to(&account.deposit) {
        tracing::warn!(
            account = %account.uuid,
            tx = %tx.hash,
            source = ?tx.source,
            "incoming transaction reported for the wrong account; dropped"
        );
        return false;
    }
    true
}

impl SwapService {
    pub async fn sweep_all_pending_swaps(&mut self) -> SwapResult<SweepSummary> {
        let (summary, _) = self.sweep_all().await?;
        Ok(summary)
    }

    /// Records new confirmed deposits for `direction` as pending swaps.
    pub async fn sweep_pending_swaps(
        &mut self,
        direction: SwapDirection,
    ) -> SwapResult<Vec<SwapRecord>> {
        Ok(self.sweep_direction(direction).await?.inserted)
    }

    /// Sweeps both directions and keeps what was fetched, so the caller can
    /// reconcile against the same view of the chains.
    pub(super) async fn sweep_all(&mut self) -> SwapResult<(SweepSummary, Vec<DepositSnapshot>)> {
        let mut summary = SweepSummary::default();
        let mut snapshots = Vec::with_capacity(SwapDirection::ALL.len());
        for direction in SwapDirection::ALL {
            let sweep = self.sweep_direction(direction).await?;
            match direction {
                SwapDirection::LokiToBloki => summary.loki_to_bloki = sweep.inserted.len(),
                SwapDirection::BlokiToLoki => summary.bloki_to_loki = sweep.inserted.len(),
            }
            summary.unmatched += sweep.unmatched;
            snapshots.push(sweep.snapshot);
        }
        Ok((summary, snapshots))
    }

    pub(super) async fn snapshot_deposits(
        &self,
        direction: SwapDirection,
    ) -> SwapResult<DepositSnapshot> {
        let accounts = self.store.client_accounts(direction.deposit_chain())?;
        let facade = self.chains.deposit(direction);
        let fetched = fetch_incoming(facade.as_ref(), accounts).await?;
        Ok(DepositSnapshot { direction, fetched })
    }

    async fn sweep_direction(&mut self, direction: SwapDirection) -> SwapResult<Sweep> {
        let snapshot = self.snapshot_deposits(direction).await?;
        let unmatched = self.report_unmatched_deposits(&snapshot).await?;
        let inserted = self.record_swaps(&snapshot)?;
        Ok(Sweep {
            inserted,
            unmatched,
            snapshot,
        })
    }

    /// Logs recent deposits that match none of the snapshot's accounts.
    async fn report_unmatched_deposits(&self, snapshot: &DepositSnapshot) -> SwapResult<usize> {
        let direction = snapshot.direction;
        let deposits: Vec<DepositAccount> = snapshot
            .fetched
            .iter()
            .map(|(account, _)| account.deposit.clone())
            .collect();
        let stray = self
            .chains
            .deposit(direction)
            .unmatched_deposits(&deposits)
            .await?;

        let window_start = now_unix() - self.cfg.reconcile_window_secs;
        let mut count = 0;
        for tx in stray.iter().filter(|tx| tx.timestamp >= window_start) {
            tracing::warn!(
                %direction,
                tx = %tx.hash,
                amount = tx.amount,
                source = ?tx.source,
                "deposit matches no client account; dropped"
            );
            count += 1;
        }
        Ok(count)
    }

    fn record_swaps(&mut self, snapshot: &DepositSnapshot) -> SwapResult<Vec<SwapRecord>> {
        let direction = snapshot.direction;
        if snapshot.fetched.is_empty() {
            return Ok(Vec::new());
        }

        let facade = self.chains.deposit(direction).clone();
        let mut known: HashSet<String> = self
            .store
            .swap_deposit_hashes(direction)?
            .into_iter()
            .collect();

        let mut batch = Vec::new();
        for (account, txs) in &snapshot.fetched {
            for tx in txs {
                if !is_swappable(facade.as_ref(), account, tx) {
                    continue;
                }
                if !known.insert(tx.hash.clone()) {
                    continue;
                }
                batch.push((tx.clone(), account.clone()));
            }
        }

        if batch.is_empty() {
            tracing::debug!(%direction, "no new deposits");
            return Ok(Vec::new());
        }

        let inserted = self.store.insert_swaps(direction, &batch)?;
        let total = inserted
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.amount));
        tracing::info!(
            %direction,
            swaps = inserted.len(),
            amount = total,
            "recorded new swaps"
        );
        Ok(inserted)
    }
}
