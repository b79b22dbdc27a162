//! Funding favorability for the short leg.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::market::MarketSnapshot;

/// Funding intervals per day assumed for annualization (8h funding).
pub const DEFAULT_FUNDING_PERIODS_PER_DAY: u32 = 3;

/// Positive funding above `min_rate` pays the short leg.
pub fn is_funding_favorable(snapshot: &MarketSnapshot, min_rate: Decimal) -> bool {
    snapshot.funding_rate > min_rate
}

/// Annualized funding in percent: rate × periods/day × 365 × 100.
pub fn annualized_apr_pct(funding_rate: Decimal, periods_per_day: u32) -> Decimal {
    funding_rate * Decimal::from(periods_per_day) * dec!(365) * dec!(100)
}
