use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::backend::CheckoutBackend;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{CartLine, CoinSelection};
use crate::storage::KeyValueStorage;

/// Storage key for the persisted cart line list.
pub const CART_STORAGE_KEY: &str = "agrimart.cart";
/// Storage key for the transient coin-selection handoff between the cart
/// screen and the checkout screen.
pub const COIN_SELECTION_KEY: &str = "agrimart.checkout.coins";

/// Shopping cart service over the device-local persisted store.
///
/// The store is the single owner of cart state: every mutation loads the
/// full list, changes it in memory and writes the full list back, then
/// publishes a change event so the header badge and any open view refresh.
/// Readers re-load on every user-visible navigation instead of caching.
#[derive(Clone)]
pub struct CartService {
    storage: Arc<dyn KeyValueStorage>,
    backend: Arc<dyn CheckoutBackend>,
    event_sender: EventSender,
}

/// Input for adding a marketplace product to the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartInput {
    pub product_id: String,
    pub product_name: String,
    pub unit_price: rust_decimal::Decimal,
    #[serde(default)]
    pub discounted_unit_price: Option<rust_decimal::Decimal>,
    pub quantity: u32,
    /// Backend stock at add-time; the cart clamps quantities against this
    pub available_quantity: u32,
    pub seller_id: String,
    pub category: String,
}

impl CartService {
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        backend: Arc<dyn CheckoutBackend>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            storage,
            backend,
            event_sender,
        }
    }

    /// Loads the persisted cart. Absent or corrupt payloads yield an empty
    /// cart, never an error.
    pub fn load(&self) -> Vec<CartLine> {
        let raw = match self.storage.read(CART_STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!("Cart storage unreadable, starting empty: {}", err);
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(lines) => lines,
            Err(err) => {
                warn!("Discarding corrupt cart payload: {}", err);
                Vec::new()
            }
        }
    }

    /// Atomically overwrites the persisted list and notifies subscribers.
    pub fn save(&self, lines: &[CartLine]) -> Result<(), ServiceError> {
        let payload = serde_json::to_string(lines)?;
        self.storage.write(CART_STORAGE_KEY, &payload)?;
        self.event_sender.send_or_log(Event::CartUpdated {
            item_count: lines.len(),
        });
        Ok(())
    }

    /// Removes the persisted cart entirely (after a successful order).
    pub fn clear(&self) -> Result<(), ServiceError> {
        self.storage.remove(CART_STORAGE_KEY)?;
        self.storage.remove(COIN_SELECTION_KEY)?;
        self.event_sender.send_or_log(Event::CartCleared);
        Ok(())
    }

    pub fn item_count(&self) -> usize {
        self.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.load().is_empty()
    }

    /// Adds a product to the cart, merging with an existing line for the
    /// same product. Quantities are clamped to the last known stock, never
    /// silently exceeded.
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub fn add_line(&self, input: AddToCartInput) -> Result<Vec<CartLine>, ServiceError> {
        if input.quantity == 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }
        if input.available_quantity == 0 {
            return Err(ServiceError::InvalidOperation(format!(
                "{} is out of stock",
                input.product_name
            )));
        }

        let mut lines = self.load();

        if let Some(line) = lines.iter_mut().find(|l| l.product_id == input.product_id) {
            line.available_quantity = input.available_quantity;
            line.quantity = (line.quantity + input.quantity).min(line.available_quantity);
        } else {
            lines.push(CartLine {
                product_id: input.product_id.clone(),
                product_name: input.product_name,
                unit_price: input.unit_price,
                discounted_unit_price: input.discounted_unit_price,
                quantity: input.quantity.min(input.available_quantity),
                available_quantity: input.available_quantity,
                seller_id: input.seller_id,
                category: input.category,
            });
        }

        self.save(&lines)?;
        info!("Added product {} to cart", input.product_id);
        Ok(lines)
    }

    /// Sets the quantity of a cart line, clamped to the last known stock.
    /// A quantity of zero removes the line (and releases its reservation).
    ///
    /// Quantity increases perform no reservation call: the last known stock
    /// snapshot is trusted optimistically and the backend re-validates at
    /// order creation.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        product_id: &str,
        quantity: u32,
    ) -> Result<Vec<CartLine>, ServiceError> {
        if quantity == 0 {
            return self.remove_line(product_id).await;
        }

        let mut lines = self.load();
        let line = lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
            })?;

        line.quantity = quantity.min(line.available_quantity);

        self.save(&lines)?;
        Ok(lines)
    }

    /// Removes a line from the cart, returning its reserved quantity to
    /// backend stock.
    ///
    /// The release call happens exactly once per removal and is best-effort:
    /// the backend owns the stock truth, so the local removal proceeds (with
    /// a warning event) even when the release fails.
    #[instrument(skip(self))]
    pub async fn remove_line(&self, product_id: &str) -> Result<Vec<CartLine>, ServiceError> {
        let mut lines = self.load();
        let position = lines
            .iter()
            .position(|l| l.product_id == product_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
            })?;
        let removed = lines.remove(position);

        if let Err(err) = self
            .backend
            .release_stock(&removed.product_id, removed.quantity)
            .await
        {
            warn!(
                product_id = %removed.product_id,
                quantity = removed.quantity,
                "Stock release failed, removing locally anyway: {}",
                err
            );
            self.event_sender.send_or_log(Event::StockReleaseFailed {
                product_id: removed.product_id.clone(),
            });
        }

        self.save(&lines)?;
        info!("Removed product {} from cart", product_id);
        Ok(lines)
    }

    /// Persists the coin selection chosen on the cart screen for the
    /// checkout screen to pick up.
    pub fn save_coin_selection(&self, selection: &CoinSelection) -> Result<(), ServiceError> {
        let payload = serde_json::to_string(selection)?;
        self.storage.write(COIN_SELECTION_KEY, &payload)
    }

    /// Consumes the coin-selection handoff: reads it and deletes the key so
    /// a stale selection never leaks into a later checkout session.
    pub fn take_coin_selection(&self) -> Option<CoinSelection> {
        let raw = self.storage.read(COIN_SELECTION_KEY).ok()??;
        if let Err(err) = self.storage.remove(COIN_SELECTION_KEY) {
            warn!("Could not clear coin-selection snapshot: {}", err);
        }
        match serde_json::from_str(&raw) {
            Ok(selection) => Some(selection),
            Err(err) => {
                warn!("Discarding corrupt coin-selection payload: {}", err);
                None
            }
        }
    }
}
