//! Order pricing.
//!
//! Pure functions only: same inputs always yield identical outputs, no
//! hidden state. Amounts keep full precision internally; rounding happens at
//! presentation time or at the minor-unit conversion for the gateway.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::errors::ServiceError;
use crate::models::{CartLine, CoinSelection, OrderPricing};
use crate::services::coins::max_applicable;

/// GST applied to every order. Policy constant, not derived.
pub const TAX_RATE: Decimal = dec!(0.18);

/// One loyalty coin is worth one major currency unit.
pub const COIN_VALUE: Decimal = dec!(1);

/// Derives the full pricing breakdown from cart lines and a coin selection.
///
/// `coins_applied` is clamped against both the coin balance and the floored
/// order total, so the selection can never push the final amount negative.
pub fn compute_pricing(
    lines: &[CartLine],
    selection: &CoinSelection,
    available_coins: i64,
) -> OrderPricing {
    let subtotal: Decimal = lines.iter().map(CartLine::line_total).sum();
    let tax = subtotal * TAX_RATE;
    let total_before_coins = subtotal + tax;

    let coins_applied = if selection.use_coins {
        selection
            .coins_to_use
            .min(max_applicable(available_coins, total_before_coins))
            .max(0)
    } else {
        0
    };

    let final_amount =
        (total_before_coins - Decimal::from(coins_applied) * COIN_VALUE).max(Decimal::ZERO);

    let savings: Decimal = lines
        .iter()
        .filter(|line| line.has_discount())
        .map(|line| (line.unit_price - line.effective_price()) * Decimal::from(line.quantity))
        .sum();

    OrderPricing {
        subtotal,
        tax,
        total_before_coins,
        coins_applied,
        final_amount,
        savings,
    }
}

/// Converts a major-unit amount to minor units (`round(amount * 100)`), the
/// only place full precision is given up.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * dec!(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| {
            ServiceError::ValidationError(format!("Amount {} out of range for minor units", amount))
        })
}

/// Display rounding: two fraction digits, half away from zero, presentation
/// only.
pub fn round_for_display(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
