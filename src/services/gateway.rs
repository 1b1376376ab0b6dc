//! Payment gateway adapter.
//!
//! Wraps the third-party hosted payment widget behind injected loader and
//! driver dependencies so the rest of the core (and the tests) never touch
//! vendor globals. The adapter only reports what the gateway reported;
//! server-side verification is the sole authority on whether money moved.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use crate::backend::PaymentIntent;
use crate::errors::ServiceError;

/// Adapter lifecycle. One widget at most may be open at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayPhase {
    Unloaded,
    Loading,
    Ready,
    Open,
}

/// Loads the vendor widget script. Injected at configuration time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScriptLoader: Send + Sync {
    async fn load(&self, script_url: &str) -> Result<(), ServiceError>;
}

/// Contact details prefilled into the hosted widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactPrefill {
    pub email: String,
    pub phone: String,
}

/// Exactly one outcome per widget presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// Gateway reported completion. Still untrusted until the backend
    /// verifies the id/signature pair.
    Success {
        payment_id: String,
        signature: String,
    },
    /// Gateway flagged the payment for server-side confirmation.
    VerificationNeeded {
        payment_id: String,
        signature: String,
    },
    /// Buyer closed the widget without completing payment.
    Dismissed,
}

/// Presents the hosted widget for one payment intent and resolves with the
/// single outcome the gateway reported. Injected at configuration time.
#[async_trait]
pub trait WidgetDriver: Send + Sync {
    async fn present(&self, intent: &PaymentIntent, prefill: &ContactPrefill) -> GatewayOutcome;
}

pub struct PaymentGateway {
    loader: Arc<dyn ScriptLoader>,
    driver: Arc<dyn WidgetDriver>,
    script_url: String,
    min_amount_minor: i64,
    loaded: OnceCell<bool>,
    phase: Mutex<GatewayPhase>,
}

/// Resets the adapter to `Ready` when a presentation ends, normally or not.
struct OpenGuard<'a> {
    gateway: &'a PaymentGateway,
}

impl Drop for OpenGuard<'_> {
    fn drop(&mut self) {
        self.gateway.set_phase(GatewayPhase::Ready);
    }
}

impl PaymentGateway {
    pub fn new(
        loader: Arc<dyn ScriptLoader>,
        driver: Arc<dyn WidgetDriver>,
        script_url: impl Into<String>,
        min_amount_minor: i64,
    ) -> Self {
        Self {
            loader,
            driver,
            script_url: script_url.into(),
            min_amount_minor,
            loaded: OnceCell::new(),
            phase: Mutex::new(GatewayPhase::Unloaded),
        }
    }

    pub fn min_amount_minor(&self) -> i64 {
        self.min_amount_minor
    }

    pub fn phase(&self) -> GatewayPhase {
        *self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_phase(&self, next: GatewayPhase) {
        let mut phase = self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *phase = next;
    }

    /// Loads the vendor script exactly once per process lifetime, no matter
    /// how many callers race here. Returns `false` when loading failed, in
    /// which case checkout must not proceed to `open`.
    pub async fn ensure_loaded(&self) -> bool {
        *self
            .loaded
            .get_or_init(|| async {
                self.set_phase(GatewayPhase::Loading);
                match self.loader.load(&self.script_url).await {
                    Ok(()) => {
                        self.set_phase(GatewayPhase::Ready);
                        info!("Payment widget script loaded");
                        true
                    }
                    Err(err) => {
                        self.set_phase(GatewayPhase::Unloaded);
                        warn!("Payment widget script failed to load: {}", err);
                        false
                    }
                }
            })
            .await
    }

    /// Presents the hosted widget for the given intent.
    ///
    /// Enforces the minimum payable floor before anything is shown and
    /// refuses to open a second widget while one is on screen.
    #[instrument(skip(self, intent, prefill), fields(gateway_order_id = %intent.id))]
    pub async fn open(
        &self,
        intent: &PaymentIntent,
        prefill: &ContactPrefill,
    ) -> Result<GatewayOutcome, ServiceError> {
        if intent.amount < self.min_amount_minor {
            return Err(ServiceError::ValidationError(format!(
                "Payable amount of {} minor units is below the {} minor-unit minimum",
                intent.amount, self.min_amount_minor
            )));
        }

        {
            let mut phase = self
                .phase
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match *phase {
                GatewayPhase::Ready => *phase = GatewayPhase::Open,
                GatewayPhase::Open => {
                    return Err(ServiceError::InvalidOperation(
                        "A payment widget is already open".to_string(),
                    ))
                }
                GatewayPhase::Unloaded | GatewayPhase::Loading => {
                    return Err(ServiceError::GatewayError(
                        "Payment widget script is not loaded".to_string(),
                    ))
                }
            }
        }

        let guard = OpenGuard { gateway: self };
        let outcome = self.driver.present(intent, prefill).await;
        drop(guard);

        info!(
            "Payment widget closed with {}",
            match &outcome {
                GatewayOutcome::Success { .. } => "success",
                GatewayOutcome::VerificationNeeded { .. } => "verification needed",
                GatewayOutcome::Dismissed => "dismissal",
            }
        );
        Ok(outcome)
    }
}
