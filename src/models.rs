use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// One product the buyer intends to purchase.
///
/// Owned exclusively by the persisted cart store; every mutation reads the
/// current list, changes it in memory and writes the full list back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Backend-assigned product id, unique within the cart
    pub product_id: String,
    pub product_name: String,
    pub unit_price: Decimal,
    /// Marked-down price; only honored when below the list price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discounted_unit_price: Option<Decimal>,
    pub quantity: u32,
    /// Snapshot of backend stock at add-time; quantity is clamped to this
    pub available_quantity: u32,
    pub seller_id: String,
    pub category: String,
}

impl CartLine {
    /// The discounted price when a genuine markdown is present, the list
    /// price otherwise.
    pub fn effective_price(&self) -> Decimal {
        match self.discounted_unit_price {
            Some(discounted) if discounted < self.unit_price => discounted,
            _ => self.unit_price,
        }
    }

    pub fn has_discount(&self) -> bool {
        matches!(self.discounted_unit_price, Some(d) if d < self.unit_price)
    }

    pub fn line_total(&self) -> Decimal {
        self.effective_price() * Decimal::from(self.quantity)
    }
}

/// The buyer's choice of how many loyalty coins to spend on this order.
///
/// Ephemeral: handed from the cart screen to the checkout screen and
/// re-clamped whenever the balance or the order total changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinSelection {
    pub use_coins: bool,
    pub coins_to_use: i64,
}

impl CoinSelection {
    /// Re-clamps the selection against the current balance and order total.
    pub fn clamp(&mut self, available_coins: i64, order_total: Decimal) {
        let ceiling = crate::services::coins::max_applicable(available_coins, order_total);
        self.coins_to_use = self.coins_to_use.clamp(0, ceiling);
    }
}

/// Deterministic pricing breakdown derived from the cart and coin selection.
/// Never stored independently of its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPricing {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total_before_coins: Decimal,
    pub coins_applied: i64,
    pub final_amount: Decimal,
    pub savings: Decimal,
}

/// States of a pending-order hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldState {
    Active,
    Retried,
    Expired,
    CancelledByUser,
}

/// A payment-failed order placed on a temporary hold while the buyer may
/// still retry the payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOrderHold {
    pub order_id: String,
    pub created_at: DateTime<Utc>,
    pub hold_duration_secs: u64,
    pub remaining_secs: u64,
    pub state: HoldState,
}

impl PendingOrderHold {
    pub fn new(order_id: String, hold_duration_secs: u64) -> Self {
        Self {
            order_id,
            created_at: Utc::now(),
            hold_duration_secs,
            remaining_secs: hold_duration_secs,
            state: HoldState::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == HoldState::Active
    }
}

/// Checkout orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutState {
    Idle,
    Validating,
    CreatingIntent,
    AwaitingGateway,
    Verifying,
    PlacingOrder,
    Done,
    HoldCreated,
    HoldActive,
    Cancelling,
    Cancelled,
}

/// How the buyer pays for the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Razorpay,
    CashOnDelivery,
}

/// A saved delivery address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: String,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

fn validate_digits(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("digits");
        err.message = Some("Must contain only digits".into());
        Err(err)
    }
}

/// Address creation form.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAddressInput {
    #[validate(length(min = 1))]
    pub full_name: String,
    #[validate(length(equal = 10), custom = "validate_digits")]
    pub phone: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 1))]
    pub state: String,
    #[validate(length(equal = 6), custom = "validate_digits")]
    pub postal_code: String,
}
