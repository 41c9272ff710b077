pub mod auto;
pub mod counter;
pub mod reconcile;
pub mod service;
pub mod settlement;
pub mod store;
pub mod sweeper;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chain::Chain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapDirection {
    LokiToBloki,
    BlokiToLoki,
}

impl SwapDirection {
    pub const ALL: [SwapDirection; 2] = [SwapDirection::LokiToBloki, SwapDirection::BlokiToLoki];

    pub fn as_str(self) -> &'static str {
        match self {
            SwapDirection::LokiToBloki => "loki_to_bloki",
            SwapDirection::BlokiToLoki => "bloki_to_loki",
        }
    }

    /// Chain the user deposits on.
    pub fn deposit_chain(self) -> Chain {
        match self {
            SwapDirection::LokiToBloki => Chain::Loki,
            SwapDirection::BlokiToLoki => Chain::Bnb,
        }
    }

    /// Chain the bridge pays out on.
    pub fn payout_chain(self) -> Chain {
        match self {
            SwapDirection::LokiToBloki => Chain::Bnb,
            SwapDirection::BlokiToLoki => Chain::Loki,
        }
    }

    /// Only withdrawals into LOKI pay the wallet's per-destination fee.
    pub fn charges_withdrawal_fee(self) -> bool {
        match self {
            SwapDirection::LokiToBloki => false,
            SwapDirection::BlokiToLoki => true,
        }
    }
}

impl fmt::Display for SwapDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loki_to_bloki" => Ok(SwapDirection::LokiToBloki),
            "bloki_to_loki" => Ok(SwapDirection::BlokiToLoki),
            other => anyhow::bail!("unknown swap direction: {other}"),
        }
    }
}

/// The bridge-side account a user deposits into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "chain", rename_all = "snake_case")]
pub enum DepositAccount {
    Loki { address: String, address_index: u32 },
    Bnb { memo: String },
}

impl DepositAccount {
    pub fn chain(&self) -> Chain {
        match self {
            DepositAccount::Loki { .. } => Chain::Loki,
            DepositAccount::Bnb { .. } => Chain::Bnb,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAccount {
    pub uuid: String,
    /// User's destination for payouts.
    pub address: String,
    pub address_chain: Chain,
    pub deposit: DepositAccount,
}

impl ClientAccount {
    pub fn direction(&self) -> SwapDirection {
        match self.deposit.chain() {
            Chain::Loki => SwapDirection::LokiToBloki,
            Chain::Bnb => SwapDirection::BlokiToLoki,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub uuid: String,
    pub direction: SwapDirection,
    pub amount: u64,
    pub client_account_uuid: String,

    pub deposit_tx_hash: String,
    pub deposit_observed_at: i64,

    pub transfer_tx_hash: Option<String>,
    pub processed_at: Option<i64>,

    pub created_at: i64,
}

impl SwapRecord {
    pub fn is_pending(&self) -> bool {
        self.transfer_tx_hash.is_none() && self.processed_at.is_none()
    }
}

/// A pending swap joined with the address it pays out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSwap {
    pub swap: SwapRecord,
    pub address: String,
}
