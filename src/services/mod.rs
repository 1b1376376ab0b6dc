pub mod cart;
pub mod checkout;
pub mod coins;
pub mod gateway;
pub mod pricing;

pub use cart::{AddToCartInput, CartService};
pub use checkout::{CheckoutOutcome, CheckoutService, PlaceOrderInput};
pub use coins::CoinService;
pub use gateway::{ContactPrefill, GatewayOutcome, PaymentGateway, ScriptLoader, WidgetDriver};
pub use pricing::compute_pricing;
