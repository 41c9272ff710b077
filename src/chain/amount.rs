//! Conversion between decimal coin amounts and the 1e9 fixed-point integers
//! stored in the ledger.
//!
//! Binance Chain amounts carry 8 decimal places. Both directions truncate to
//! that precision so a payout is never larger than the recorded amount.

use rust_decimal::prelude::ToPrimitive as _;
use rust_decimal::{Decimal, RoundingStrategy};

use super::ChainError;

pub const FIXED_POINT_SCALE: u32 = 9;
pub const BNB_DECIMALS: u32 = 8;

const UNITS_PER_COIN: u64 = 1_000_000_000;

/// Parse a decimal amount (as returned by the chain) into 1e9 units.
pub fn to_fixed(value: &str) -> Result<u64, ChainError> {
    let decimal: Decimal = value
        .trim()
        .parse()
        .map_err(|_| ChainError::InvalidAmount(value.to_string()))?;
    decimal_to_fixed(decimal)
}

pub fn decimal_to_fixed(value: Decimal) -> Result<u64, ChainError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ChainError::InvalidAmount(value.to_string()));
    }
    value
        .round_dp_with_strategy(BNB_DECIMALS, RoundingStrategy::ToZero)
        .checked_mul(Decimal::from(UNITS_PER_COIN))
        .and_then(|units| units.trunc().to_u64())
        .ok_or_else(|| ChainError::InvalidAmount(value.to_string()))
}

/// Render 1e9 units as a decimal amount with at most 8 decimal places.
pub fn from_fixed(units: u64) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(units), FIXED_POINT_SCALE)
        .round_dp_with_strategy(BNB_DECIMALS, RoundingStrategy::ToZero)
        .normalize()
}
