use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// USDC.e on Polygon has 6 decimals.
pub const COLLATERAL_DECIMALS: u32 = 6;
const UNITS_PER_TOKEN: u64 = 1_000_000;

/// Converts a token quantity into collateral base units, truncating sub-unit dust.
/// Returns `None` for negative or out-of-range values.
pub fn to_base_units(amount: Decimal) -> Option<u64> {
    if amount.is_sign_negative() {
        return None;
    }
    (amount * Decimal::from(UNITS_PER_TOKEN)).trunc().to_u64()
}

pub fn from_base_units(units: u64) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(units), COLLATERAL_DECIMALS)
}

/// `8000000` -> `"8.00"`.
pub fn format_usdc(units: u64) -> String {
    format!("{:.2}", from_base_units(units))
}

/// First 10 chars of a condition id for log lines.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(10) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
