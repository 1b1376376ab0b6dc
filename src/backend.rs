//! REST client for the marketplace backend.
//!
//! The backend surface consumed by the checkout core is a trait so the
//! orchestrator can be exercised against scripted fakes; `HttpBackend` is
//! the production implementation.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use validator::Validate;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::models::{Address, CreateAddressInput, PaymentMethod};

/// Gateway payment intent issued by the backend. Must exist before the
/// hosted widget can be opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub key_id: String,
    /// Amount in minor currency units
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    /// Amount in minor currency units
    pub amount: i64,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub email: String,
    pub phone: String,
}

/// Backend verdict on a gateway payment. Authoritative: the raw gateway
/// callback is never trusted without this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Success,
    Failed,
}

#[derive(Debug, Deserialize)]
struct VerifyPaymentResponse {
    status: VerificationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub seller_id: String,
}

/// Order creation payload, used for both final orders and pending-failed
/// holds (the latter carry explicit `payment_status`/`order_status`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemInput>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub coins_used: i64,
    pub final_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub address_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: String,
    #[serde(default)]
    pub order_status: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinBalanceResponse {
    total_coins: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseStockRequest {
    quantity: u32,
}

/// Backend REST endpoints consumed by the checkout core.
#[async_trait]
pub trait CheckoutBackend: Send + Sync {
    async fn fetch_coin_balance(&self) -> Result<i64, ServiceError>;
    async fn list_addresses(&self) -> Result<Vec<Address>, ServiceError>;
    async fn create_address(&self, input: CreateAddressInput) -> Result<Address, ServiceError>;
    async fn create_payment_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError>;
    async fn verify_payment(
        &self,
        request: VerifyPaymentRequest,
    ) -> Result<VerificationStatus, ServiceError>;
    async fn create_order(&self, request: CreateOrderRequest)
        -> Result<OrderSummary, ServiceError>;
    async fn cancel_order(&self, order_id: &str) -> Result<OrderSummary, ServiceError>;
    async fn release_stock(&self, product_id: &str, quantity: u32) -> Result<(), ServiceError>;
}

/// Production backend client.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &AppConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(ServiceError::from)?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        let mut message = message.trim().to_string();
        message.truncate(512);
        Err(ServiceError::ExternalApiError {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CheckoutBackend for HttpBackend {
    #[instrument(skip(self))]
    async fn fetch_coin_balance(&self) -> Result<i64, ServiceError> {
        let response = self.request(Method::GET, "/coins").send().await?;
        let body: CoinBalanceResponse = Self::check(response).await?.json().await?;
        Ok(body.total_coins)
    }

    #[instrument(skip(self))]
    async fn list_addresses(&self) -> Result<Vec<Address>, ServiceError> {
        let response = self.request(Method::GET, "/addresses").send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    #[instrument(skip(self, input))]
    async fn create_address(&self, input: CreateAddressInput) -> Result<Address, ServiceError> {
        input.validate()?;
        let response = self
            .request(Method::POST, "/addresses")
            .json(&input)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    #[instrument(skip(self, request))]
    async fn create_payment_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let response = self
            .request(Method::POST, "/payment/create-order")
            .json(&request)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    #[instrument(skip(self, request))]
    async fn verify_payment(
        &self,
        request: VerifyPaymentRequest,
    ) -> Result<VerificationStatus, ServiceError> {
        let response = self
            .request(Method::POST, "/payment/verify")
            .json(&request)
            .send()
            .await?;
        let body: VerifyPaymentResponse = Self::check(response).await?.json().await?;
        Ok(body.status)
    }

    #[instrument(skip(self, request))]
    async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderSummary, ServiceError> {
        let response = self
            .request(Method::POST, "/orders")
            .json(&request)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, order_id: &str) -> Result<OrderSummary, ServiceError> {
        let response = self
            .request(Method::PATCH, &format!("/orders/{}/cancel", order_id))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    #[instrument(skip(self))]
    async fn release_stock(&self, product_id: &str, quantity: u32) -> Result<(), ServiceError> {
        let response = self
            .request(Method::POST, &format!("/products/{}/release", product_id))
            .json(&ReleaseStockRequest { quantity })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
