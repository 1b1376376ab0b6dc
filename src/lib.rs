//! Agrimart Checkout Core
//!
//! Client-side checkout, payment-retry and cart-reservation core for the
//! Agrimart farm marketplace. The embedding UI renders screens and routes
//! user input here; business truth (pricing policy aside) lives on the
//! marketplace backend, reached over REST.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod backend;
pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod models;
pub mod services;
pub mod storage;

use std::sync::Arc;

use backend::{CheckoutBackend, HttpBackend};
use errors::ServiceError;
use events::EventSender;
use services::cart::CartService;
use services::checkout::CheckoutService;
use services::coins::CoinService;
use services::gateway::{PaymentGateway, ScriptLoader, WidgetDriver};
use storage::KeyValueStorage;

/// Wired-up checkout core, one per tab.
///
/// The gateway loader/driver pair and the storage backend are injected so
/// embedders (and tests) can swap the vendor widget and the persistence
/// location without touching global state.
#[derive(Clone)]
pub struct CoreState {
    pub config: Arc<config::AppConfig>,
    pub event_sender: EventSender,
    pub backend: Arc<dyn CheckoutBackend>,
    pub cart_service: Arc<CartService>,
    pub coin_service: Arc<CoinService>,
    pub gateway: Arc<PaymentGateway>,
    pub checkout_service: Arc<CheckoutService>,
}

impl CoreState {
    /// Wires the services against an explicit backend implementation.
    pub fn new(
        config: config::AppConfig,
        backend: Arc<dyn CheckoutBackend>,
        storage: Arc<dyn KeyValueStorage>,
        loader: Arc<dyn ScriptLoader>,
        driver: Arc<dyn WidgetDriver>,
    ) -> Self {
        let config = Arc::new(config);
        let event_sender = EventSender::new();

        let cart_service = Arc::new(CartService::new(
            storage,
            backend.clone(),
            event_sender.clone(),
        ));
        let coin_service = Arc::new(CoinService::new(backend.clone()));
        let gateway = Arc::new(PaymentGateway::new(
            loader,
            driver,
            config.gateway.script_url.clone(),
            config.gateway.min_amount_minor,
        ));
        let checkout_service = Arc::new(CheckoutService::new(
            backend.clone(),
            gateway.clone(),
            cart_service.clone(),
            coin_service.clone(),
            event_sender.clone(),
            config.hold_duration_secs,
        ));

        Self {
            config,
            event_sender,
            backend,
            cart_service,
            coin_service,
            gateway,
            checkout_service,
        }
    }

    /// Wires the services against the production HTTP backend.
    pub fn with_http_backend(
        config: config::AppConfig,
        storage: Arc<dyn KeyValueStorage>,
        loader: Arc<dyn ScriptLoader>,
        driver: Arc<dyn WidgetDriver>,
    ) -> Result<Self, ServiceError> {
        let backend = Arc::new(HttpBackend::new(&config)?);
        Ok(Self::new(config, backend, storage, loader, driver))
    }
}
