//! Checkout orchestrator.
//!
//! Drives the end-to-end flow: validate preconditions, create a backend
//! payment intent, open the hosted gateway widget, verify the reported
//! payment server-side, then create the final order. A failed or dismissed
//! payment persists a pending order and starts a retry countdown; the
//! countdown either lets the buyer retry against the same pending order or
//! expires and cancels it.
//!
//! No backend failure ever advances the machine toward a success state; the
//! only transition taken without backend confirmation is the initial local
//! validation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::backend::{
    CheckoutBackend, CreateIntentRequest, CreateOrderRequest, OrderItemInput, PaymentIntent,
    VerificationStatus, VerifyPaymentRequest,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    Address, CartLine, CheckoutState, CoinSelection, HoldState, OrderPricing, PaymentMethod,
    PendingOrderHold,
};
use crate::services::cart::CartService;
use crate::services::coins::CoinService;
use crate::services::gateway::{ContactPrefill, GatewayOutcome, PaymentGateway};
use crate::services::pricing::{compute_pricing, to_minor_units};

/// Wire values for persisting a payment-failed attempt.
const PAYMENT_STATUS_FAILED: &str = "FAILED";
const ORDER_STATUS_PENDING: &str = "PENDING";

/// Checkout request from the UI.
#[derive(Debug, Clone)]
pub struct PlaceOrderInput {
    /// The selected delivery address; checkout refuses to start without one
    pub address: Option<Address>,
    pub payment_method: PaymentMethod,
    /// Overrides the persisted cart-screen coin snapshot when present
    pub coin_selection: Option<CoinSelection>,
}

/// How a checkout attempt ended, for the confirmation or hold screen.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutOutcome {
    Placed {
        order_id: String,
        pricing: OrderPricing,
        payment_method: PaymentMethod,
    },
    /// Payment failed or was dismissed; the pending order can be retried
    /// until the window runs out.
    HeldForRetry {
        order_id: String,
        retry_window_secs: u64,
    },
}

/// Everything a retry needs to re-drive the gateway for the same pending
/// order.
struct CheckoutContext {
    lines: Vec<CartLine>,
    pricing: OrderPricing,
    address: Address,
}

struct Session {
    state: CheckoutState,
    session_id: Option<Uuid>,
    hold: Option<PendingOrderHold>,
    context: Option<CheckoutContext>,
}

impl Session {
    fn new() -> Self {
        Self {
            state: CheckoutState::Idle,
            session_id: None,
            hold: None,
            context: None,
        }
    }
}

/// Resets the submitting flag on every exit path so the UI is never left
/// permanently disabled.
struct SubmitGuard<'a>(&'a AtomicBool);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The core checkout state machine. One instance per tab; a second
/// `place_order` while one is in flight is refused.
pub struct CheckoutService {
    backend: Arc<dyn CheckoutBackend>,
    gateway: Arc<PaymentGateway>,
    cart: Arc<CartService>,
    coins: Arc<CoinService>,
    event_sender: EventSender,
    hold_duration_secs: u64,
    session: Arc<Mutex<Session>>,
    timer: std::sync::Mutex<Option<JoinHandle<()>>>,
    submitting: AtomicBool,
}

impl CheckoutService {
    pub fn new(
        backend: Arc<dyn CheckoutBackend>,
        gateway: Arc<PaymentGateway>,
        cart: Arc<CartService>,
        coins: Arc<CoinService>,
        event_sender: EventSender,
        hold_duration_secs: u64,
    ) -> Self {
        Self {
            backend,
            gateway,
            cart,
            coins,
            event_sender,
            hold_duration_secs,
            session: Arc::new(Mutex::new(Session::new())),
            timer: std::sync::Mutex::new(None),
            submitting: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> CheckoutState {
        self.session.lock().await.state
    }

    /// Id of the checkout session started by the last `place_order`, if any.
    pub async fn session_id(&self) -> Option<Uuid> {
        self.session.lock().await.session_id
    }

    pub async fn hold(&self) -> Option<PendingOrderHold> {
        self.session.lock().await.hold.clone()
    }

    pub async fn remaining_secs(&self) -> Option<u64> {
        self.session
            .lock()
            .await
            .hold
            .as_ref()
            .map(|hold| hold.remaining_secs)
    }

    /// Runs one checkout attempt end to end.
    #[instrument(skip(self, input))]
    pub async fn place_order(&self, input: PlaceOrderInput) -> Result<CheckoutOutcome, ServiceError> {
        if self.submitting.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::InvalidOperation(
                "A checkout is already in progress".to_string(),
            ));
        }
        let _guard = SubmitGuard(&self.submitting);

        let session_id = {
            let mut session = self.session.lock().await;
            if !matches!(
                session.state,
                CheckoutState::Idle | CheckoutState::Done | CheckoutState::Cancelled
            ) {
                return Err(ServiceError::InvalidOperation(format!(
                    "Cannot start checkout from state {}",
                    session.state
                )));
            }
            let session_id = Uuid::new_v4();
            session.state = CheckoutState::Validating;
            session.session_id = Some(session_id);
            session.hold = None;
            session.context = None;
            session_id
        };

        // Local preconditions only; violations leave no trace on the backend
        let lines = self.cart.load();
        if lines.is_empty() {
            self.reset_to_idle().await;
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }
        let address = match input.address {
            Some(address) => address,
            None => {
                self.reset_to_idle().await;
                return Err(ServiceError::ValidationError(
                    "Select a delivery address before placing the order".to_string(),
                ));
            }
        };

        let selection = input
            .coin_selection
            .or_else(|| self.cart.take_coin_selection())
            .unwrap_or_default();
        let available_coins = if selection.use_coins {
            self.coins.balance().await
        } else {
            0
        };
        let pricing = compute_pricing(&lines, &selection, available_coins);

        self.event_sender
            .send_or_log(Event::CheckoutStarted { session_id });

        match input.payment_method {
            PaymentMethod::CashOnDelivery => self.place_cod_order(lines, pricing, address).await,
            PaymentMethod::Razorpay => self.run_online_payment(lines, pricing, address).await,
        }
    }

    /// Re-drives the gateway against the existing pending order. Does not
    /// create a new hold.
    #[instrument(skip(self))]
    pub async fn retry_payment(&self) -> Result<CheckoutOutcome, ServiceError> {
        if self.submitting.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::InvalidOperation(
                "A checkout is already in progress".to_string(),
            ));
        }
        let _guard = SubmitGuard(&self.submitting);

        // Claim the hold under the lock; an expiry that already fired wins
        // and this retry is refused.
        let (lines, pricing, address) = {
            let mut session = self.session.lock().await;
            let claimable = matches!(
                (&session.state, &session.hold),
                (CheckoutState::HoldActive, Some(hold)) if hold.is_active()
            );
            if !claimable {
                return Err(ServiceError::InvalidOperation(
                    "No active payment hold to retry".to_string(),
                ));
            }
            let context = session
                .context
                .as_ref()
                .map(|c| (c.lines.clone(), c.pricing.clone(), c.address.clone()))
                .ok_or_else(|| {
                    ServiceError::InternalError("Checkout context missing for retry".to_string())
                })?;
            session.state = CheckoutState::CreatingIntent;
            if let Some(hold) = session.hold.as_mut() {
                // Not ACTIVE while the retry runs: pauses the countdown and
                // refuses a concurrent cancel
                hold.state = HoldState::Retried;
            }
            context
        };
        self.stop_timer();

        let intent = match self.create_intent(&pricing, &address).await {
            Ok(intent) => intent,
            Err(err) => {
                warn!("Retry intent creation failed, resuming hold: {}", err);
                let _ = self.resume_hold().await;
                return Err(err);
            }
        };

        self.drive_gateway(intent, lines, pricing, address).await
    }

    /// Cancels the held order immediately at the buyer's request.
    #[instrument(skip(self))]
    pub async fn cancel_hold(&self) -> Result<(), ServiceError> {
        let order_id = {
            let mut session = self.session.lock().await;
            let cancellable = matches!(
                (&session.state, &session.hold),
                (CheckoutState::HoldActive, Some(hold)) if hold.is_active()
            );
            if !cancellable {
                return Err(ServiceError::InvalidOperation(
                    "No active payment hold to cancel".to_string(),
                ));
            }
            // Parks the countdown: ticks skip while not HoldActive
            session.state = CheckoutState::Cancelling;
            session
                .hold
                .as_ref()
                .map(|hold| hold.order_id.clone())
                .unwrap_or_default()
        };

        match self.backend.cancel_order(&order_id).await {
            Ok(_) => {
                self.stop_timer();
                {
                    let mut session = self.session.lock().await;
                    if let Some(hold) = session.hold.as_mut() {
                        hold.state = HoldState::CancelledByUser;
                    }
                    session.state = CheckoutState::Cancelled;
                }
                self.event_sender.send_or_log(Event::HoldCancelled {
                    order_id: order_id.clone(),
                });
                info!("Cancelled held order {}", order_id);
                Ok(())
            }
            Err(err) => {
                // Backend refused; the hold stays live and the countdown
                // resumes ownership
                let _ = self.resume_hold().await;
                Err(err)
            }
        }
    }

    /// Tears the orchestrator down on navigation away: the countdown stops
    /// and local state clears. No backend call is made; the pending order,
    /// if any, is left for the buyer's order history.
    pub async fn teardown(&self) {
        self.stop_timer();
        let mut session = self.session.lock().await;
        *session = Session::new();
    }

    async fn place_cod_order(
        &self,
        lines: Vec<CartLine>,
        pricing: OrderPricing,
        address: Address,
    ) -> Result<CheckoutOutcome, ServiceError> {
        self.set_state(CheckoutState::PlacingOrder).await;

        let request = Self::order_request(
            &lines,
            &pricing,
            PaymentMethod::CashOnDelivery,
            &address,
            None,
            None,
            None,
        );
        match self.backend.create_order(request).await {
            Ok(order) => {
                self.finish_placed(order.id, pricing, PaymentMethod::CashOnDelivery)
                    .await
            }
            Err(err) => {
                self.reset_to_idle().await;
                Err(err)
            }
        }
    }

    async fn run_online_payment(
        &self,
        lines: Vec<CartLine>,
        pricing: OrderPricing,
        address: Address,
    ) -> Result<CheckoutOutcome, ServiceError> {
        // Minimum payable floor, enforced before any intent exists
        let amount_minor = match to_minor_units(pricing.final_amount) {
            Ok(amount) => amount,
            Err(err) => {
                self.reset_to_idle().await;
                return Err(err);
            }
        };
        if amount_minor < self.gateway.min_amount_minor() {
            self.reset_to_idle().await;
            return Err(ServiceError::ValidationError(format!(
                "Payable amount of {} minor units is below the minimum of {}",
                amount_minor,
                self.gateway.min_amount_minor()
            )));
        }

        self.set_state(CheckoutState::CreatingIntent).await;
        let intent = match self.create_intent(&pricing, &address).await {
            Ok(intent) => intent,
            Err(err) => {
                // No gateway was opened, so no hold is created
                self.reset_to_idle().await;
                return Err(err);
            }
        };

        if !self.gateway.ensure_loaded().await {
            self.reset_to_idle().await;
            return Err(ServiceError::GatewayError(
                "Payment library failed to load".to_string(),
            ));
        }

        {
            let mut session = self.session.lock().await;
            session.context = Some(CheckoutContext {
                lines: lines.clone(),
                pricing: pricing.clone(),
                address: address.clone(),
            });
        }

        self.drive_gateway(intent, lines, pricing, address).await
    }

    async fn create_intent(
        &self,
        pricing: &OrderPricing,
        address: &Address,
    ) -> Result<PaymentIntent, ServiceError> {
        let amount = to_minor_units(pricing.final_amount)?;
        self.backend
            .create_payment_intent(CreateIntentRequest {
                amount,
                email: address.email.clone(),
                phone: address.phone.clone(),
            })
            .await
    }

    async fn drive_gateway(
        &self,
        intent: PaymentIntent,
        lines: Vec<CartLine>,
        pricing: OrderPricing,
        address: Address,
    ) -> Result<CheckoutOutcome, ServiceError> {
        self.set_state(CheckoutState::AwaitingGateway).await;

        let prefill = ContactPrefill {
            email: address.email.clone(),
            phone: address.phone.clone(),
        };
        let outcome = match self.gateway.open(&intent, &prefill).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.unwind_attempt().await;
                return Err(err);
            }
        };

        match outcome {
            GatewayOutcome::Success {
                payment_id,
                signature,
            }
            | GatewayOutcome::VerificationNeeded {
                payment_id,
                signature,
            } => {
                self.verify_and_place(intent, payment_id, signature, lines, pricing, address)
                    .await
            }
            GatewayOutcome::Dismissed => {
                info!("Payment widget dismissed, holding order for retry");
                self.fail_into_hold(None, lines, pricing, address).await
            }
        }
    }

    async fn verify_and_place(
        &self,
        intent: PaymentIntent,
        payment_id: String,
        signature: String,
        lines: Vec<CartLine>,
        pricing: OrderPricing,
        address: Address,
    ) -> Result<CheckoutOutcome, ServiceError> {
        self.set_state(CheckoutState::Verifying).await;

        let status = match self
            .backend
            .verify_payment(VerifyPaymentRequest {
                order_id: intent.id.clone(),
                payment_id: payment_id.clone(),
                signature,
                email: address.email.clone(),
                phone: address.phone.clone(),
            })
            .await
        {
            Ok(status) => status,
            Err(err) => {
                // An unverifiable payment cannot be trusted; take the
                // failure path so the attempt stays retryable against the
                // same pending order.
                warn!("Payment verification unreachable, holding order: {}", err);
                return self
                    .fail_into_hold(Some(payment_id), lines, pricing, address)
                    .await;
            }
        };

        match status {
            VerificationStatus::Failed => {
                info!("Payment {} failed verification", payment_id);
                self.fail_into_hold(Some(payment_id), lines, pricing, address)
                    .await
            }
            VerificationStatus::Success => {
                self.event_sender.send_or_log(Event::PaymentVerified {
                    payment_id: payment_id.clone(),
                });
                self.set_state(CheckoutState::PlacingOrder).await;

                let request = Self::order_request(
                    &lines,
                    &pricing,
                    PaymentMethod::Razorpay,
                    &address,
                    Some(payment_id.clone()),
                    None,
                    None,
                );
                match self.backend.create_order(request).await {
                    Ok(order) => {
                        self.finish_placed(order.id, pricing, PaymentMethod::Razorpay)
                            .await
                    }
                    Err(err) => {
                        // Money has moved; this must never look like an
                        // ordinary checkout error
                        error!(
                            payment_id = %payment_id,
                            "Payment captured but order creation failed: {}",
                            err
                        );
                        self.reset_to_idle().await;
                        Err(ServiceError::OrderNotPersisted {
                            payment_id,
                            message: err.to_string(),
                        })
                    }
                }
            }
        }
    }

    /// Routes a failed/dismissed payment into the hold branch: resumes the
    /// existing hold after a failed retry, or persists a new pending order.
    async fn fail_into_hold(
        &self,
        payment_id: Option<String>,
        lines: Vec<CartLine>,
        pricing: OrderPricing,
        address: Address,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let has_hold = self.session.lock().await.hold.is_some();
        if has_hold {
            let outcome = self.resume_hold().await;
            outcome.ok_or_else(|| {
                ServiceError::InternalError("Hold vanished during retry".to_string())
            })
        } else {
            self.hold_pending_order(payment_id, lines, pricing, address)
                .await
        }
    }

    async fn hold_pending_order(
        &self,
        payment_id: Option<String>,
        lines: Vec<CartLine>,
        pricing: OrderPricing,
        address: Address,
    ) -> Result<CheckoutOutcome, ServiceError> {
        self.set_state(CheckoutState::HoldCreated).await;

        let request = Self::order_request(
            &lines,
            &pricing,
            PaymentMethod::Razorpay,
            &address,
            payment_id,
            Some(PAYMENT_STATUS_FAILED),
            Some(ORDER_STATUS_PENDING),
        );
        let order = match self.backend.create_order(request).await {
            Ok(order) => order,
            Err(err) => {
                // Without a persisted pending order there is nothing to hold
                self.reset_to_idle().await;
                return Err(err);
            }
        };

        {
            let mut session = self.session.lock().await;
            session.hold = Some(PendingOrderHold::new(
                order.id.clone(),
                self.hold_duration_secs,
            ));
            session.state = CheckoutState::HoldActive;
        }
        self.event_sender.send_or_log(Event::HoldCreated {
            order_id: order.id.clone(),
            expires_in_secs: self.hold_duration_secs,
        });
        self.start_timer();

        info!(
            "Pending order {} held for retry ({}s window)",
            order.id, self.hold_duration_secs
        );
        Ok(CheckoutOutcome::HeldForRetry {
            order_id: order.id,
            retry_window_secs: self.hold_duration_secs,
        })
    }

    /// Puts an existing hold back in charge: reactivates it and restarts
    /// the countdown from wherever it stopped.
    async fn resume_hold(&self) -> Option<CheckoutOutcome> {
        let resumed = {
            let mut guard = self.session.lock().await;
            let session = &mut *guard;
            match session.hold.as_mut() {
                Some(hold) => {
                    hold.state = HoldState::Active;
                    session.state = CheckoutState::HoldActive;
                    Some(CheckoutOutcome::HeldForRetry {
                        order_id: hold.order_id.clone(),
                        retry_window_secs: hold.remaining_secs,
                    })
                }
                None => None,
            }
        };
        if resumed.is_some() {
            self.start_timer();
        }
        resumed
    }

    async fn finish_placed(
        &self,
        order_id: String,
        pricing: OrderPricing,
        payment_method: PaymentMethod,
    ) -> Result<CheckoutOutcome, ServiceError> {
        self.stop_timer();
        {
            let mut session = self.session.lock().await;
            session.hold = None;
            session.context = None;
            session.state = CheckoutState::Done;
        }

        if let Err(err) = self.cart.clear() {
            warn!("Order placed but cart could not be cleared: {}", err);
        }
        self.event_sender.send_or_log(Event::OrderPlaced {
            order_id: order_id.clone(),
        });

        info!("Order {} placed", order_id);
        Ok(CheckoutOutcome::Placed {
            order_id,
            pricing,
            payment_method,
        })
    }

    /// After a gateway `open` error, returns to the hold if one exists
    /// (failed retry), otherwise to idle (failed first attempt).
    async fn unwind_attempt(&self) {
        let has_hold = self.session.lock().await.hold.is_some();
        if has_hold {
            let _ = self.resume_hold().await;
        } else {
            self.reset_to_idle().await;
        }
    }

    async fn set_state(&self, next: CheckoutState) {
        self.session.lock().await.state = next;
    }

    async fn reset_to_idle(&self) {
        let mut session = self.session.lock().await;
        session.state = CheckoutState::Idle;
        session.hold = None;
        session.context = None;
    }

    /// Starts the one-second hold countdown. The task owns nothing but
    /// Arc'd handles and exits whenever the machine has moved on, so a
    /// stale tick can never fire a cancel against a settled order.
    fn start_timer(&self) {
        let session = Arc::clone(&self.session);
        let backend = Arc::clone(&self.backend);
        let events = self.event_sender.clone();

        let handle = tokio::spawn(async move {
            enum Tick {
                Counting,
                Superseded,
                Expired(String),
            }

            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            // The first tick completes immediately; skip it so the first
            // decrement lands a full second after the hold became active
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let tick = {
                    let mut guard = session.lock().await;
                    let current = &mut *guard;
                    let state = current.state;
                    match current.hold.as_mut() {
                        Some(hold) if state == CheckoutState::HoldActive && hold.is_active() => {
                            hold.remaining_secs = hold.remaining_secs.saturating_sub(1);
                            let order_id = hold.order_id.clone();
                            if hold.remaining_secs == 0 {
                                hold.state = HoldState::Expired;
                                current.state = CheckoutState::Cancelling;
                                Tick::Expired(order_id)
                            } else {
                                events.send_or_log(Event::HoldTick {
                                    order_id,
                                    remaining_secs: hold.remaining_secs,
                                });
                                Tick::Counting
                            }
                        }
                        // A retry or cancel owns the flow now
                        _ => Tick::Superseded,
                    }
                };

                match tick {
                    Tick::Counting => {}
                    Tick::Superseded => return,
                    Tick::Expired(order_id) => {
                        events.send_or_log(Event::HoldExpired {
                            order_id: order_id.clone(),
                        });
                        // The hold left ACTIVE under the lock above, so a
                        // racing retry is refused; cancel exactly once
                        match backend.cancel_order(&order_id).await {
                            Ok(_) => {
                                session.lock().await.state = CheckoutState::Cancelled;
                                events.send_or_log(Event::HoldCancelled {
                                    order_id: order_id.clone(),
                                });
                                info!("Held order {} expired and was cancelled", order_id);
                            }
                            Err(err) => {
                                warn!("Could not cancel expired order {}: {}", order_id, err);
                            }
                        }
                        return;
                    }
                }
            }
        });

        let mut timer = self
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = timer.replace(handle) {
            previous.abort();
        }
    }

    fn stop_timer(&self) {
        let mut timer = self
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = timer.take() {
            handle.abort();
        }
    }

    fn order_request(
        lines: &[CartLine],
        pricing: &OrderPricing,
        payment_method: PaymentMethod,
        address: &Address,
        payment_id: Option<String>,
        payment_status: Option<&str>,
        order_status: Option<&str>,
    ) -> CreateOrderRequest {
        CreateOrderRequest {
            items: lines
                .iter()
                .map(|line| OrderItemInput {
                    product_id: line.product_id.clone(),
                    product_name: line.product_name.clone(),
                    quantity: line.quantity,
                    unit_price: line.effective_price(),
                    line_total: line.line_total(),
                    seller_id: line.seller_id.clone(),
                })
                .collect(),
            subtotal: pricing.subtotal,
            tax_amount: pricing.tax,
            total_amount: pricing.total_before_coins,
            coins_used: pricing.coins_applied,
            final_amount: pricing.final_amount,
            payment_method,
            address_id: address.id.clone(),
            payment_id,
            payment_status: payment_status.map(str::to_string),
            order_status: order_status.map(str::to_string),
        }
    }
}

impl Drop for CheckoutService {
    fn drop(&mut self) {
        self.stop_timer();
    }
}
