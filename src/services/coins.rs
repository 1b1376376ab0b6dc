//! Loyalty-coin ledger client.
//!
//! Read-only: the balance lives on the backend, coins are redeemed through
//! order creation. A balance fetch failure never blocks checkout; the buyer
//! simply cannot apply coins on that attempt.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::backend::CheckoutBackend;

/// Maximum coins applicable to an order: `min(balance, floor(order_total))`,
/// never negative. Pure and total.
pub fn max_applicable(balance: i64, order_total: Decimal) -> i64 {
    let floored_total = order_total.floor().to_i64().unwrap_or(i64::MAX);
    balance.min(floored_total).max(0)
}

#[derive(Clone)]
pub struct CoinService {
    backend: Arc<dyn CheckoutBackend>,
}

impl CoinService {
    pub fn new(backend: Arc<dyn CheckoutBackend>) -> Self {
        Self { backend }
    }

    /// Fetches the current coin balance, treating any failure as a zero
    /// balance so checkout is never blocked on the ledger.
    #[instrument(skip(self))]
    pub async fn balance(&self) -> i64 {
        match self.backend.fetch_coin_balance().await {
            Ok(balance) => balance.max(0),
            Err(err) => {
                warn!("Coin balance unavailable, treating as 0: {}", err);
                0
            }
        }
    }
}
