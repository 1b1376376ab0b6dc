//! Shared test wiring: a scripted fake backend, a fake gateway pair and a
//! fully wired `CoreState` over in-memory storage.

#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agrimart_checkout::backend::{
    CheckoutBackend, CreateIntentRequest, CreateOrderRequest, OrderSummary, PaymentIntent,
    VerificationStatus, VerifyPaymentRequest,
};
use agrimart_checkout::config::AppConfig;
use agrimart_checkout::errors::ServiceError;
use agrimart_checkout::models::{Address, CartLine, CreateAddressInput};
use agrimart_checkout::services::gateway::{
    ContactPrefill, GatewayOutcome, ScriptLoader, WidgetDriver,
};
use agrimart_checkout::storage::MemoryStorage;
use agrimart_checkout::CoreState;

/// Scripted backend: responses are queued per endpoint, requests recorded.
/// An empty queue yields a generic success so happy-path tests stay terse.
pub struct FakeBackend {
    pub coin_balance: Mutex<Result<i64, ServiceError>>,
    pub intent_results: Mutex<VecDeque<Result<PaymentIntent, ServiceError>>>,
    pub verify_results: Mutex<VecDeque<Result<VerificationStatus, ServiceError>>>,
    pub order_results: Mutex<VecDeque<Result<OrderSummary, ServiceError>>>,
    pub cancel_results: Mutex<VecDeque<Result<OrderSummary, ServiceError>>>,
    pub release_result: Mutex<Result<(), ServiceError>>,

    pub intent_requests: Mutex<Vec<CreateIntentRequest>>,
    pub verify_requests: Mutex<Vec<VerifyPaymentRequest>>,
    pub order_requests: Mutex<Vec<CreateOrderRequest>>,
    pub cancelled_orders: Mutex<Vec<String>>,
    pub release_calls: Mutex<Vec<(String, u32)>>,

    order_seq: AtomicUsize,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            coin_balance: Mutex::new(Ok(0)),
            intent_results: Mutex::new(VecDeque::new()),
            verify_results: Mutex::new(VecDeque::new()),
            order_results: Mutex::new(VecDeque::new()),
            cancel_results: Mutex::new(VecDeque::new()),
            release_result: Mutex::new(Ok(())),
            intent_requests: Mutex::new(Vec::new()),
            verify_requests: Mutex::new(Vec::new()),
            order_requests: Mutex::new(Vec::new()),
            cancelled_orders: Mutex::new(Vec::new()),
            release_calls: Mutex::new(Vec::new()),
            order_seq: AtomicUsize::new(1),
        }
    }
}

impl FakeBackend {
    pub fn set_coin_balance(&self, balance: i64) {
        *self.coin_balance.lock().unwrap() = Ok(balance);
    }

    pub fn push_intent_result(&self, result: Result<PaymentIntent, ServiceError>) {
        self.intent_results.lock().unwrap().push_back(result);
    }

    pub fn push_verify_result(&self, result: Result<VerificationStatus, ServiceError>) {
        self.verify_results.lock().unwrap().push_back(result);
    }

    pub fn push_order_result(&self, result: Result<OrderSummary, ServiceError>) {
        self.order_results.lock().unwrap().push_back(result);
    }

    pub fn push_cancel_result(&self, result: Result<OrderSummary, ServiceError>) {
        self.cancel_results.lock().unwrap().push_back(result);
    }

    pub fn set_release_result(&self, result: Result<(), ServiceError>) {
        *self.release_result.lock().unwrap() = result;
    }

    pub fn intent_count(&self) -> usize {
        self.intent_requests.lock().unwrap().len()
    }

    pub fn order_count(&self) -> usize {
        self.order_requests.lock().unwrap().len()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancelled_orders.lock().unwrap().len()
    }

    fn next_order_id(&self) -> String {
        format!("order-{}", self.order_seq.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl CheckoutBackend for FakeBackend {
    async fn fetch_coin_balance(&self) -> Result<i64, ServiceError> {
        self.coin_balance.lock().unwrap().clone()
    }

    async fn list_addresses(&self) -> Result<Vec<Address>, ServiceError> {
        Ok(vec![sample_address()])
    }

    async fn create_address(&self, input: CreateAddressInput) -> Result<Address, ServiceError> {
        Ok(Address {
            id: "addr-new".into(),
            full_name: input.full_name,
            phone: input.phone,
            email: input.email,
            line1: input.line1,
            line2: input.line2,
            city: input.city,
            state: input.state,
            postal_code: input.postal_code,
        })
    }

    async fn create_payment_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let scripted = self.intent_results.lock().unwrap().pop_front();
        let amount = request.amount;
        self.intent_requests.lock().unwrap().push(request);
        scripted.unwrap_or_else(|| {
            Ok(PaymentIntent {
                id: "rzp_order_1".into(),
                key_id: "rzp_test_key".into(),
                amount,
                currency: "INR".into(),
            })
        })
    }

    async fn verify_payment(
        &self,
        request: VerifyPaymentRequest,
    ) -> Result<VerificationStatus, ServiceError> {
        let scripted = self.verify_results.lock().unwrap().pop_front();
        self.verify_requests.lock().unwrap().push(request);
        scripted.unwrap_or(Ok(VerificationStatus::Success))
    }

    async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderSummary, ServiceError> {
        let scripted = self.order_results.lock().unwrap().pop_front();
        self.order_requests.lock().unwrap().push(request);
        scripted.unwrap_or_else(|| {
            Ok(OrderSummary {
                id: self.next_order_id(),
                order_status: None,
                payment_status: None,
            })
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<OrderSummary, ServiceError> {
        let scripted = self.cancel_results.lock().unwrap().pop_front();
        self.cancelled_orders.lock().unwrap().push(order_id.to_string());
        scripted.unwrap_or_else(|| {
            Ok(OrderSummary {
                id: order_id.to_string(),
                order_status: Some("CANCELLED".into()),
                payment_status: None,
            })
        })
    }

    async fn release_stock(&self, product_id: &str, quantity: u32) -> Result<(), ServiceError> {
        self.release_calls
            .lock()
            .unwrap()
            .push((product_id.to_string(), quantity));
        self.release_result.lock().unwrap().clone()
    }
}

/// Counts load attempts; optionally fails them.
pub struct FakeLoader {
    pub loads: AtomicUsize,
    pub fail: bool,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self {
            loads: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            loads: AtomicUsize::new(0),
            fail: true,
        }
    }
}

#[async_trait]
impl ScriptLoader for FakeLoader {
    async fn load(&self, _script_url: &str) -> Result<(), ServiceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ServiceError::ExternalServiceError(
                "script unreachable".into(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Replays queued outcomes; an empty queue reports success.
pub struct FakeDriver {
    pub outcomes: Mutex<VecDeque<GatewayOutcome>>,
    pub presentations: AtomicUsize,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            presentations: AtomicUsize::new(0),
        }
    }

    pub fn push_outcome(&self, outcome: GatewayOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn presentation_count(&self) -> usize {
        self.presentations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WidgetDriver for FakeDriver {
    async fn present(&self, _intent: &PaymentIntent, _prefill: &ContactPrefill) -> GatewayOutcome {
        self.presentations.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(GatewayOutcome::Success {
                payment_id: "pay_test_1".into(),
                signature: "sig_test_1".into(),
            })
    }
}

/// Fully wired core over fakes, mirroring production wiring.
pub struct TestCore {
    pub core: CoreState,
    pub backend: Arc<FakeBackend>,
    pub loader: Arc<FakeLoader>,
    pub driver: Arc<FakeDriver>,
    pub storage: Arc<MemoryStorage>,
}

impl TestCore {
    pub fn new() -> Self {
        Self::build(FakeLoader::new())
    }

    /// A core whose gateway script never loads.
    pub fn with_failing_loader() -> Self {
        Self::build(FakeLoader::failing())
    }

    fn build(loader: FakeLoader) -> Self {
        let backend = Arc::new(FakeBackend::default());
        let loader = Arc::new(loader);
        let driver = Arc::new(FakeDriver::new());
        let storage = Arc::new(MemoryStorage::new());

        let core = CoreState::new(
            AppConfig::default(),
            backend.clone(),
            storage.clone(),
            loader.clone(),
            driver.clone(),
        );

        Self {
            core,
            backend,
            loader,
            driver,
            storage,
        }
    }

    /// Seeds the persisted cart directly through the cart service.
    pub fn seed_cart(&self, lines: &[CartLine]) {
        self.core.cart_service.save(lines).expect("seed cart");
    }
}

pub fn sample_line(
    product_id: &str,
    unit_price: Decimal,
    discounted: Option<Decimal>,
    quantity: u32,
    available_quantity: u32,
) -> CartLine {
    CartLine {
        product_id: product_id.to_string(),
        product_name: format!("Product {}", product_id),
        unit_price,
        discounted_unit_price: discounted,
        quantity,
        available_quantity,
        seller_id: "seller-1".into(),
        category: "produce".into(),
    }
}

pub fn sample_address() -> Address {
    Address {
        id: "addr-1".into(),
        full_name: "Ravi Kumar".into(),
        phone: "9876543210".into(),
        email: "ravi@example.com".into(),
        line1: "14 Canal Road".into(),
        line2: None,
        city: "Nashik".into(),
        state: "Maharashtra".into(),
        postal_code: "422001".into(),
    }
}
