use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::bech32;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::amount::{from_fixed, to_fixed};
use super::{Chain, ChainError, ChainFacade, IncomingTransaction, PayoutOutput, TxSource};
use crate::swap::DepositAccount;

const ADDRESS_PAYLOAD_LEN: usize = 20;

/// A token transfer into the bridge deposit address, as reported by the chain.
#[derive(Debug, Clone)]
pub struct BnbTransfer {
    pub tx_hash: String,
    pub memo: String,
    /// Decimal string, e.g. `"12.5"`.
    pub value: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BnbOutput {
    pub address: String,
    pub amount: Decimal,
}

/// Binance Chain transport: explorer queries and signed multi-send.
#[async_trait]
pub trait BnbChainClient: Send + Sync {
    async fn incoming_transfers(&self, address: &str) -> Result<Vec<BnbTransfer>, ChainError>;

    async fn multi_send(&self, outputs: &[BnbOutput]) -> Result<Vec<String>, ChainError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct BnbFacadeConfig {
    /// Bridge address users deposit BLOKI into, tagged with their memo.
    pub deposit_address: String,
    #[serde(default = "default_address_prefix")]
    pub address_prefix: String,
}

fn default_address_prefix() -> String {
    "bnb".to_string()
}

pub struct BnbFacade {
    client: Arc<dyn BnbChainClient>,
    cfg: BnbFacadeConfig,
}

impl BnbFacade {
    pub fn new(client: Arc<dyn BnbChainClient>, cfg: BnbFacadeConfig) -> Self {
        Self { client, cfg }
    }
}

pub fn is_valid_address(address: &str, prefix: &str) -> bool {
    match bech32::decode(address.trim()) {
        Ok((hrp, data)) => {
            hrp.to_lowercase() == prefix.to_lowercase() && data.len() == ADDRESS_PAYLOAD_LEN
        }
        Err(_) => false,
    }
}

fn incoming(amount: u64, t: BnbTransfer) -> IncomingTransaction {
    IncomingTransaction {
        hash: t.tx_hash,
        amount,
        timestamp: t.timestamp,
        confirmations: 1,
        pool: false,
        source: TxSource::Memo(t.memo.trim().to_string()),
    }
}

#[async_trait]
impl ChainFacade for BnbFacade {
    fn chain(&self) -> Chain {
        Chain::Bnb
    }

    async fn incoming_transactions(
        &self,
        account: &DepositAccount,
    ) -> Result<Vec<IncomingTransaction>, ChainError> {
        let DepositAccount::Bnb { memo } = account else {
            return Ok(Vec::new());
        };
        let memo = memo.trim();

        let transfers = self
            .client
            .incoming_transfers(&self.cfg.deposit_address)
            .await?;

        transfers
            .into_iter()
            .filter(|t| t.memo.trim() == memo)
            .map(|t| -> Result<IncomingTransaction, ChainError> {
                Ok(incoming(to_fixed(&t.value)?, t))
            })
            .collect()
    }

    async fn unmatched_deposits(
        &self,
        accounts: &[DepositAccount],
    ) -> Result<Vec<IncomingTransaction>, ChainError> {
        let memos: HashSet<&str> = accounts
            .iter()
            .filter_map(|account| match account {
                DepositAccount::Bnb { memo } => Some(memo.trim()),
                DepositAccount::Loki { .. } => None,
            })
            .collect();

        let transfers = self
            .client
            .incoming_transfers(&self.cfg.deposit_address)
            .await?;

        let mut out = Vec::new();
        for t in transfers {
            if memos.contains(t.memo.trim()) {
                continue;
            }
            let amount = to_fixed(&t.value).unwrap_or_else(|err| {
                tracing::warn!(tx = %t.tx_hash, error = %err, "unreadable transfer amount");
                0
            });
            out.push(incoming(amount, t));
        }
        Ok(out)
    }

    fn is_settled(&self, tx: &IncomingTransaction) -> bool {
        !tx.pool
    }

    fn payable(&self, amount: u64) -> bool {
        !from_fixed(amount).is_zero()
    }

    async fn send_payout(&self, outputs: &[PayoutOutput]) -> Result<Vec<String>, ChainError> {
        if outputs.is_empty() {
            return Err(ChainError::EmptyPayout);
        }
        let mut converted = Vec::with_capacity(outputs.len());
        for o in outputs {
            let amount = from_fixed(o.amount);
            if amount.is_zero() {
                return Err(ChainError::InvalidAmount(format!(
                    "{} units to {} is below bnb precision",
                    o.amount, o.address
                )));
            }
            converted.push(BnbOutput {
                address: o.address.clone(),
                amount,
            });
        }
        self.client.multi_send(&converted).await
    }

    async fn validate_address(&self, address: &str) -> Result<bool, ChainError> {
        Ok(is_valid_address(address, &self.cfg.address_prefix))
    }
}
