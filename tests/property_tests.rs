//! Property-based tests for the pricing and coin-clamp invariants.
//!
//! These use proptest to verify the pricing calculator across a wide range
//! of carts and coin selections, catching edge cases unit tests miss.

use proptest::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use agrimart_checkout::models::{CartLine, CoinSelection};
use agrimart_checkout::services::coins::max_applicable;
use agrimart_checkout::services::pricing::compute_pricing;

// Strategies for generating test data
fn price_strategy() -> impl Strategy<Value = Decimal> {
    // 0.01 ..= 10_000.00, two fraction digits like real catalog prices
    (1i64..1_000_000).prop_map(|minor| Decimal::new(minor, 2))
}

fn cart_line_strategy() -> impl Strategy<Value = CartLine> {
    (
        "[a-z0-9]{8}",
        price_strategy(),
        proptest::option::of(price_strategy()),
        1u32..50,
        1u32..500,
    )
        .prop_map(|(product_id, unit_price, discounted, quantity, available)| {
            CartLine {
                product_id,
                product_name: "generated".into(),
                unit_price,
                discounted_unit_price: discounted,
                quantity: quantity.min(available),
                available_quantity: available,
                seller_id: "seller".into(),
                category: "produce".into(),
            }
        })
}

fn cart_strategy() -> impl Strategy<Value = Vec<CartLine>> {
    proptest::collection::vec(cart_line_strategy(), 0..8)
}

fn coin_selection_strategy() -> impl Strategy<Value = CoinSelection> {
    (any::<bool>(), 0i64..100_000).prop_map(|(use_coins, coins_to_use)| CoinSelection {
        use_coins,
        coins_to_use,
    })
}

// Property: pricing is deterministic
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn pricing_is_deterministic(
        lines in cart_strategy(),
        selection in coin_selection_strategy(),
        balance in 0i64..100_000,
    ) {
        let first = compute_pricing(&lines, &selection, balance);
        let second = compute_pricing(&lines, &selection, balance);
        prop_assert_eq!(first, second);
    }
}

// Property: the coin ceiling is exactly min(balance, floor(total))
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn coin_ceiling_matches_formula(
        balance in 0i64..1_000_000,
        total_minor in 0i64..100_000_000,
    ) {
        let total = Decimal::new(total_minor, 2);
        let ceiling = max_applicable(balance, total);

        let floored = total.floor().to_i64().unwrap();
        prop_assert_eq!(ceiling, balance.min(floored));
        prop_assert!(ceiling >= 0);
    }
}

// Properties of the computed breakdown
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn savings_are_never_negative(lines in cart_strategy()) {
        let pricing = compute_pricing(&lines, &CoinSelection::default(), 0);
        prop_assert!(pricing.savings >= Decimal::ZERO);
    }

    #[test]
    fn savings_are_zero_without_markdowns(lines in cart_strategy()) {
        let undiscounted: Vec<CartLine> = lines
            .into_iter()
            .map(|mut line| {
                line.discounted_unit_price = None;
                line
            })
            .collect();
        let pricing = compute_pricing(&undiscounted, &CoinSelection::default(), 0);
        prop_assert_eq!(pricing.savings, Decimal::ZERO);
    }

    #[test]
    fn final_amount_is_bounded(
        lines in cart_strategy(),
        selection in coin_selection_strategy(),
        balance in 0i64..100_000,
    ) {
        let pricing = compute_pricing(&lines, &selection, balance);

        prop_assert!(pricing.final_amount >= Decimal::ZERO);
        prop_assert!(pricing.final_amount <= pricing.total_before_coins);
        prop_assert!(pricing.coins_applied >= 0);
        prop_assert!(pricing.coins_applied <= balance || !selection.use_coins);
    }

    #[test]
    fn subtotal_is_sum_of_line_totals(lines in cart_strategy()) {
        let pricing = compute_pricing(&lines, &CoinSelection::default(), 0);
        let expected: Decimal = lines.iter().map(CartLine::line_total).sum();
        prop_assert_eq!(pricing.subtotal, expected);
    }

    #[test]
    fn tax_is_eighteen_percent_of_subtotal(lines in cart_strategy()) {
        let pricing = compute_pricing(&lines, &CoinSelection::default(), 0);
        prop_assert_eq!(pricing.tax, pricing.subtotal * Decimal::new(18, 2));
        prop_assert_eq!(pricing.total_before_coins, pricing.subtotal + pricing.tax);
    }
}
