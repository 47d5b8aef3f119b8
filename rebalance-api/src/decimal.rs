//! Fixed-point decimal scales for money, share quantity, and allocation
//! percentage. All arithmetic is exact `Decimal` math; quantization to a
//! fixed number of places happens only at assignment time, half-up.

use rust_decimal::prelude::RoundingStrategy;
use rust_decimal::Decimal;

/// Decimal places used for cash amounts.
pub const MONEY_SCALE: u32 = 2;
/// Decimal places used for share quantities (supports fractional shares).
pub const QUANTITY_SCALE: u32 = 9;
/// Decimal places used for allocation percentages (a fraction of 1).
pub const PERCENT_SCALE: u32 = 4;

/// Quantizes `value` to `scale` decimal places, half-up (midpoint away from
/// zero), matching spec's "Money quantizes ... half-up" rule applied
/// uniformly across all three scales.
pub fn quantize(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Quantizes a cash amount to [`MONEY_SCALE`].
pub fn quantize_money(value: Decimal) -> Decimal {
    quantize(value, MONEY_SCALE)
}

/// Quantizes a share quantity to [`QUANTITY_SCALE`].
pub fn quantize_quantity(value: Decimal) -> Decimal {
    quantize(value, QUANTITY_SCALE)
}

/// Quantizes an allocation fraction to [`PERCENT_SCALE`].
pub fn quantize_percent(value: Decimal) -> Decimal {
    quantize(value, PERCENT_SCALE)
}

/// One tick at [`QUANTITY_SCALE`] — the smallest representable share
/// increment, used by tests to express the quantization bound of spec §8.
pub fn one_quantity_tick() -> Decimal {
    Decimal::new(1, QUANTITY_SCALE)
}
