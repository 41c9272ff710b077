use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Chain, ChainError, ChainFacade, IncomingTransaction, PayoutOutput, TxSource};
use crate::swap::DepositAccount;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferKind {
    In,
    Pool,
}

/// One entry of the wallet's `get_transfers` result.
#[derive(Debug, Clone)]
pub struct WalletTransfer {
    pub txid: String,
    pub amount: u64,
    pub timestamp: i64,
    pub confirmations: u64,
    pub subaddr_index: u32,
    pub kind: TransferKind,
}

/// Wallet RPC transport. Implementations own connection details and timeouts.
#[async_trait]
pub trait LokiWalletRpc: Send + Sync {
    async fn open_wallet(&self) -> Result<(), ChainError>;

    /// Incoming and pool transfers received on a sub-address.
    async fn get_transfers(&self, subaddr_index: u32) -> Result<Vec<WalletTransfer>, ChainError>;

    /// Returns the hashes of every transaction created.
    async fn transfer_split(
        &self,
        destinations: &[PayoutOutput],
    ) -> Result<Vec<String>, ChainError>;

    async fn validate_address(&self, address: &str) -> Result<bool, ChainError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LokiFacadeConfig {
    pub min_confirmations: u64,
    pub max_open_attempts: u32,
}

impl Default for LokiFacadeConfig {
    fn default() -> Self {
        Self {
            min_confirmations: 6,
            max_open_attempts: 3,
        }
    }
}

pub struct LokiFacade {
    rpc: Arc<dyn LokiWalletRpc>,
    cfg: LokiFacadeConfig,
}

impl LokiFacade {
    pub fn new(rpc: Arc<dyn LokiWalletRpc>, cfg: LokiFacadeConfig) -> Self {
        Self { rpc, cfg }
    }

    /// Runs `op`, reopening the wallet between attempts while the wallet
    /// reports that none is open.
    async fn with_open_wallet<T, F, Fut>(
        &self,
        operation: &'static str,
        mut op: F,
    ) -> Result<T, ChainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let attempts = self.cfg.max_open_attempts.max(1);
        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_wallet_not_open() => {
                    tracing::warn!(operation, attempt, "wallet not open; reopening");
                    if attempt == attempts {
                        break;
                    }
                    if let Err(err) = self.rpc.open_wallet().await {
                        tracing::warn!(operation, attempt, error = %err, "reopen wallet failed");
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Err(ChainError::RetriesExhausted {
            operation,
            attempts,
        })
    }
}

#[async_trait]
impl ChainFacade for LokiFacade {
    fn chain(&self) -> Chain {
        Chain::Loki
    }

    async fn incoming_transactions(
        &self,
        account: &DepositAccount,
    ) -> Result<Vec<IncomingTransaction>, ChainError> {
        let DepositAccount::Loki { address_index, .. } = account else {
            return Ok(Vec::new());
        };
        let index = *address_index;

        let transfers = self
            .with_open_wallet("get_transfers", || self.rpc.get_transfers(index))
            .await?;

        Ok(transfers
            .into_iter()
            .map(|t| {
                let pool = t.kind == TransferKind::Pool;
                IncomingTransaction {
                    hash: t.txid,
                    amount: t.amount,
                    timestamp: t.timestamp,
                    confirmations: if pool { 0 } else { t.confirmations },
                    pool,
                    source: TxSource::AddressIndex(t.subaddr_index),
                }
            })
            .collect())
    }

    fn is_settled(&self, tx: &IncomingTransaction) -> bool {
        !tx.pool && tx.confirmations >= self.cfg.min_confirmations
    }

    async fn send_payout(&self, outputs: &[PayoutOutput]) -> Result<Vec<String>, ChainError> {
        if outputs.is_empty() {
            return Err(ChainError::EmptyPayout);
        }
        if let Some(o) = outputs.iter().find(|o| o.amount == 0) {
            return Err(ChainError::InvalidAmount(format!("zero payout to {}", o.address)));
        }
        self.with_open_wallet("transfer_split", || self.rpc.transfer_split(outputs))
            .await
    }

    async fn validate_address(&self, address: &str) -> Result<bool, ChainError> {
        self.with_open_wallet("validate_address", || self.rpc.validate_address(address))
            .await
    }
}
