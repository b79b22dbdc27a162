//! Fixed-point conversions between on-chain integers and `Decimal`.
//!
//! Ledger values are unsigned integers with an implied number of decimals
//! (6 for USD, 18 for base-asset wei). These helpers keep the conversion in
//! one place so no caller goes through floating point.

use anyhow::{anyhow, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Decimals used by USD fixed-point values on both ledgers.
pub const USD_DECIMALS: u32 = 6;

/// Decimals used by base-asset sizes (wei).
pub const WEI_DECIMALS: u32 = 18;

/// Interpret an unsigned raw integer as a decimal with `decimals` places.
pub fn from_fixed(raw: u128, decimals: u32) -> Result<Decimal> {
    let signed = i128::try_from(raw).map_err(|_| anyhow!("fixed-point value {} too large", raw))?;
    from_fixed_signed(signed, decimals)
}

/// Interpret a signed raw integer as a decimal with `decimals` places.
pub fn from_fixed_signed(raw: i128, decimals: u32) -> Result<Decimal> {
    Decimal::try_from_i128_with_scale(raw, decimals)
        .map(|d| d.normalize())
        .map_err(|e| anyhow!("fixed-point value {} out of decimal range: {}", raw, e))
}

/// Convert a non-negative decimal to a raw integer, truncating extra places.
pub fn to_fixed_floor(value: Decimal, decimals: u32) -> Result<u128> {
    if value.is_sign_negative() && !value.is_zero() {
        anyhow::bail!("cannot encode negative value {} as unsigned fixed-point", value);
    }

    let scaled = value
        .checked_mul(Decimal::from(10u64.pow(decimals)))
        .ok_or_else(|| anyhow!("value {} overflows at {} decimals", value, decimals))?;

    scaled
        .floor()
        .to_u128()
        .ok_or_else(|| anyhow!("value {} not representable as u128", scaled))
}

/// `|part| / whole` in basis points, rounded half away from zero.
/// Returns zero when `whole` is zero.
pub fn ratio_bps(part: Decimal, whole: Decimal) -> u32 {
    if whole <= Decimal::ZERO {
        return 0;
    }

    (part.abs() / whole * dec!(10000))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fixed_usd_and_wei() {
        assert_eq!(from_fixed(100_000_000_000, USD_DECIMALS).unwrap(), dec!(100000));
        assert_eq!(
            from_fixed(1_500_000_000_000_000_000, WEI_DECIMALS).unwrap(),
            dec!(1.5)
        );
        assert_eq!(from_fixed_signed(-5_000_000_000, USD_DECIMALS).unwrap(), dec!(-5000));
    }

    #[test]
    fn test_to_fixed_floor_truncates() {
        assert_eq!(to_fixed_floor(dec!(3456.7891239), USD_DECIMALS).unwrap(), 3_456_789_123);
        assert_eq!(to_fixed_floor(Decimal::ZERO, USD_DECIMALS).unwrap(), 0);
        assert!(to_fixed_floor(dec!(-1), USD_DECIMALS).is_err());
    }

    #[test]
    fn test_ratio_bps_rounding() {
        assert_eq!(ratio_bps(dec!(5000), dec!(100000)), 500);
        assert_eq!(ratio_bps(dec!(-2000), dec!(100000)), 200);
        // 0.00005 -> 0.5 bps rounds away from zero
        assert_eq!(ratio_bps(dec!(5), dec!(100000)), 1);
        assert_eq!(ratio_bps(dec!(10), Decimal::ZERO), 0);
    }
}
