//! Delta evaluation for the spot-long / perp-short pair.
//!
//! Sign convention: positive `delta_usd` means net long spot exposure.
//! The ratio denominator is the larger of the two legs.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::utils::decimal::ratio_bps;

/// Derived delta for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeltaResult {
    /// Spot exposure minus perp exposure, USD
    pub delta_usd: Decimal,
    /// `|delta_usd|` relative to the larger leg, basis points
    pub delta_ratio_bps: u32,
    /// `delta_ratio_bps >= threshold`
    pub needs_rebalance: bool,
}

/// Evaluate the delta between both legs against `threshold_bps`.
///
/// Never fails. When both legs are zero the ratio is zero.
pub fn evaluate(spot_value_usd: Decimal, perp_value_usd: Decimal, threshold_bps: u32) -> DeltaResult {
    let delta_usd = spot_value_usd - perp_value_usd;
    let notional = spot_value_usd.max(perp_value_usd);
    let delta_ratio_bps = ratio_bps(delta_usd, notional);
    let needs_rebalance = delta_ratio_bps >= threshold_bps;

    debug!(
        spot = %spot_value_usd,
        perp = %perp_value_usd,
        %delta_usd,
        delta_ratio_bps,
        threshold_bps,
        needs_rebalance,
        "Evaluated delta"
    );

    DeltaResult {
        delta_usd,
        delta_ratio_bps,
        needs_rebalance,
    }
}
