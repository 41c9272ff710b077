pub mod amount;
pub mod bnb;
pub mod loki;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::swap::{DepositAccount, SwapDirection};

/// Wallet RPC error code for "no wallet file" / no wallet open.
pub const WALLET_NOT_OPEN_CODE: i64 = -13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chain {
    Loki,
    Bnb,
}

impl Chain {
    pub fn as_str(self) -> &'static str {
        match self {
            Chain::Loki => "loki",
            Chain::Bnb => "bnb",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an incoming transaction was received, as reported by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxSource {
    AddressIndex(u32),
    Memo(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingTransaction {
    pub hash: String,
    /// Smallest unit, 1e9 per coin on both chains.
    pub amount: u64,
    /// Unix seconds.
    pub timestamp: i64,
    pub confirmations: u64,
    pub pool: bool,
    pub source: TxSource,
}

impl IncomingTransaction {
    /// Whether this transaction was received on `account`.
    pub fn belongs_to(&self, account: &DepositAccount) -> bool {
        match (&self.source, account) {
            (TxSource::AddressIndex(index), DepositAccount::Loki { address_index, .. }) => {
                index == address_index
            }
            (TxSource::Memo(memo), DepositAccount::Bnb { memo: expected }) => {
                memo.trim() == expected.trim()
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutOutput {
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("no wallet open")]
    NoWalletOpen,

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("payout has no outputs")]
    EmptyPayout,

    #[error("{operation} gave up after {attempts} attempts: wallet could not be reopened")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
    },
}

impl ChainError {
    pub fn transport(message: impl Into<String>) -> Self {
        ChainError::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn is_wallet_not_open(&self) -> bool {
        match self {
            ChainError::NoWalletOpen => true,
            ChainError::Rpc { code, .. } => *code == WALLET_NOT_OPEN_CODE,
            _ => false,
        }
    }

    /// Machine readable code, `None` for errors raised locally.
    pub fn code(&self) -> Option<i64> {
        match self {
            ChainError::NoWalletOpen => Some(WALLET_NOT_OPEN_CODE),
            ChainError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ChainFacade: Send + Sync {
    fn chain(&self) -> Chain;

    async fn incoming_transactions(
        &self,
        account: &DepositAccount,
    ) -> Result<Vec<IncomingTransaction>, ChainError>;

    /// Deposits into the bridge that match none of `accounts`. Chains that
    /// address deposits per account have nothing to report.
    async fn unmatched_deposits(
        &self,
        _accounts: &[DepositAccount],
    ) -> Result<Vec<IncomingTransaction>, ChainError> {
        Ok(Vec::new())
    }

    /// The chain's confirmation rule for deposits that may become swaps.
    fn is_settled(&self, tx: &IncomingTransaction) -> bool;

    /// Whether `amount` survives the chain's payout precision.
    fn payable(&self, amount: u64) -> bool {
        amount > 0
    }

    /// Rejects an empty or unpayable output list instead of sending less.
    async fn send_payout(&self, outputs: &[PayoutOutput]) -> Result<Vec<String>, ChainError>;

    async fn validate_address(&self, address: &str) -> Result<bool, ChainError>;
}

#[derive(Clone)]
pub struct Chains {
    loki: Arc<dyn ChainFacade>,
    bnb: Arc<dyn ChainFacade>,
}

impl Chains {
    pub fn new(loki: Arc<dyn ChainFacade>, bnb: Arc<dyn ChainFacade>) -> Self {
        Self { loki, bnb }
    }

    pub fn get(&self, chain: Chain) -> &Arc<dyn ChainFacade> {
        match chain {
            Chain::Loki => &self.loki,
            Chain::Bnb => &self.bnb,
        }
    }

    pub fn deposit(&self, direction: SwapDirection) -> &Arc<dyn ChainFacade> {
        self.get(direction.deposit_chain())
    }

    pub fn payout(&self, direction: SwapDirection) -> &Arc<dyn ChainFacade> {
        self.get(direction.payout_chain())
    }

    pub async fn validate_address(
        &self,
        direction: SwapDirection,
        address: &str,
    ) -> Result<bool, ChainError> {
        self.payout(direction).validate_address(address).await
    }
}
