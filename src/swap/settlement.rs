use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::service::SwapService;
use super::store::now_unix;
use super::{PendingSwap, SwapDirection, SwapRecord};
use crate::chain::PayoutOutput;
use crate::error::{SwapError, SwapResult};

#[derive(Debug, Clone, Serialize)]
pub struct SettlementResult {
    pub direction: SwapDirection,
    pub swaps: Vec<SwapRecord>,
    /// Sum of the settled swap amounts before fees.
    pub total_amount: u64,
    pub total_fee: u64,
    pub transfer_tx_hash: String,
}

/// Sums amounts per destination address, in first-seen order.
pub fn merge_by_address(swaps: &[PendingSwap]) -> Vec<PayoutOutput> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<PayoutOutput> = Vec::new();
    for s in swaps {
        match index.get(s.address.as_str()) {
            Some(&i) => out[i].amount = out[i].amount.saturating_add(s.swap.amount),
            None => {
                index.insert(s.address.as_str(), out.len());
                out.push(PayoutOutput {
                    address: s.address.clone(),
                    amount: s.swap.amount,
                });
            }
        }
    }
    out
}

/// Deducts `fee` once per output, never below zero. Returns the fee withheld.
pub fn apply_withdrawal_fee(outputs: &mut [PayoutOutput], fee: u64) -> u64 {
    let mut total_fee = 0u64;
    for o in outputs.iter_mut() {
        let charged = fee.min(o.amount);
        o.amount -= charged;
        total_fee += charged;
    }
    total_fee
}

impl SwapService {
    /// Settles every pending swap of `direction`, ignoring daily limits.
    pub async fn process_all_swaps_of_type(
        &mut self,
        direction: SwapDirection,
    ) -> SwapResult<SettlementResult> {
        let pending = self.store.pending_swaps(direction)?;
        self.process_swaps(direction, pending).await
    }

    pub async fn process_swaps(
        &mut self,
        direction: SwapDirection,
        swaps: Vec<PendingSwap>,
    ) -> SwapResult<SettlementResult> {
        let payout = self.chains.payout(direction).clone();

        // Addresses owed less than the payout chain can express wait for
        // more deposits.
        let unpayable: HashSet<String> = merge_by_address(&swaps)
            .into_iter()
            .filter(|o| !payout.payable(o.amount))
            .map(|o| o.address)
            .collect();
        let (swaps, deferred): (Vec<_>, Vec<_>) = swaps
            .into_iter()
            .partition(|s| !unpayable.contains(&s.address));
        if !deferred.is_empty() {
            tracing::warn!(
                %direction,
                swaps = deferred.len(),
                addresses = ?unpayable,
                "amount below payout precision; leaving swaps pending"
            );
        }

        let mut outputs = merge_by_address(&swaps);
        if outputs.is_empty() {
            return Err(SwapError::NoSwapsToProcess(direction));
        }

        let total_fee = if direction.charges_withdrawal_fee() {
            apply_withdrawal_fee(&mut outputs, self.cfg.withdrawal_fee)
        } else {
            0
        };
        outputs.retain(|o| payout.payable(o.amount));
        if outputs.is_empty() {
            tracing::warn!(
                %direction,
                swaps = swaps.len(),
                fee = self.cfg.withdrawal_fee,
                "every payout is consumed by the withdrawal fee; leaving swaps pending"
            );
            return Err(SwapError::NoSwapsToProcess(direction));
        }

        let total_amount = swaps
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.swap.amount));

        let hashes = payout.send_payout(&outputs).await?;
        if hashes.is_empty() {
            return Err(SwapError::PayoutFailed {
                direction,
                reason: "payout returned no transaction hashes".to_string(),
            });
        }
        let transfer_tx_hash = hashes.join(",");

        let processed_at = now_unix();
        let uuids: Vec<String> = swaps.iter().map(|s| s.swap.uuid.clone()).collect();
        if let Err(err) = self
            .store
            .mark_swaps_processed(&uuids, &transfer_tx_hash, processed_at)
        {
            tracing::error!(
                %direction,
                %transfer_tx_hash,
                swaps = ?uuids,
                error = %err,
                "payout sent but swaps could not be marked processed"
            );
            return Err(err.into());
        }

        tracing::info!(
            %direction,
            swaps = swaps.len(),
            outputs = outputs.len(),
            total_amount,
            total_fee,
            %transfer_tx_hash,
            "settled swaps"
        );

        Ok(SettlementResult {
            direction,
            swaps: swaps
                .into_iter()
                .map(|s| SwapRecord {
                    transfer_tx_hash: Some(transfer_tx_hash.clone()),
                    processed_at: Some(processed_at),
                    ..s.swap
                })
                .collect(),
            total_amount,
            total_fee,
            transfer_tx_hash,
        })
    }
}
