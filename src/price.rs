use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::chain::amount::FIXED_POINT_SCALE;

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Current USD price of one whole coin, `None` when the feed has no quote.
    async fn current_price_usd(&self, asset: &str) -> Result<Option<Decimal>>;
}

/// USD value of `amount` 1e9 units at `price` per coin.
pub fn usd_value(amount: u64, price: Decimal) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(amount), FIXED_POINT_SCALE) * price
}
