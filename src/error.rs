use rust_decimal::Decimal;
use thiserror::Error;

use crate::chain::ChainError;
use crate::swap::SwapDirection;

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("no {0} swaps to process")]
    NoSwapsToProcess(SwapDirection),

    #[error("daily limit hit for {direction}: {accumulated_usd} of {limit_usd} USD")]
    DailyLimitHit {
        direction: SwapDirection,
        accumulated_usd: Decimal,
        limit_usd: Decimal,
    },

    #[error("failed to fetch {asset} price: {reason}")]
    PriceFetchFailed { asset: String, reason: String },

    #[error(
        "balance mismatch for {direction}: transactions {transaction_total} != swaps {swap_total}"
    )]
    BalanceMismatch {
        direction: SwapDirection,
        transaction_total: u64,
        swap_total: u64,
    },

    #[error("payout failed for {direction}: {reason}")]
    PayoutFailed {
        direction: SwapDirection,
        reason: String,
    },

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl SwapError {
    /// Recoverable errors skip one direction for one cycle; everything else
    /// ends the current invocation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SwapError::NoSwapsToProcess(_)
                | SwapError::DailyLimitHit { .. }
                | SwapError::PriceFetchFailed { .. }
        )
    }
}

pub type SwapResult<T> = Result<T, SwapError>;
