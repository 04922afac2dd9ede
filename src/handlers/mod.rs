pub mod auth;
pub mod commerce;
pub mod common;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;
pub mod users;

use crate::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db::DbPool,
    entities::PaymentMethod,
    errors::ServiceError,
    events::EventSender,
    services::{
        commerce::{
            CartService, CustomerService, PricingService, ProductCatalogService, ReviewService,
        },
        orders::OrderService,
        payments::{PayPalGateway, PaymentGateway, PaymentService, StripeGateway, StripeWebhookVerifier},
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub pricing: Arc<PricingService>,
    pub product_catalog: Arc<ProductCatalogService>,
    pub cart: Arc<CartService>,
    pub customer: Arc<CustomerService>,
    pub reviews: Arc<ReviewService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    /// Builds the services with the live PayPal/Stripe clients for every enabled
    /// payment method.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
    ) -> Result<Self, ServiceError> {
        let mut gateways: Vec<Arc<dyn PaymentGateway>> = Vec::new();
        let currency = config.pricing.currency.clone();

        if config.payment_methods.is_enabled(PaymentMethod::PayPal) {
            gateways.push(Arc::new(PayPalGateway::new(
                config.paypal.clone(),
                currency.clone(),
            )?));
        }
        if config.payment_methods.is_enabled(PaymentMethod::Stripe) {
            gateways.push(Arc::new(StripeGateway::new(
                config.stripe.clone(),
                currency,
            )?));
        }

        Ok(Self::with_gateways(db_pool, event_sender, config, gateways))
    }

    /// Builds the services around the given payment gateways.
    pub fn with_gateways(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        gateways: Vec<Arc<dyn PaymentGateway>>,
    ) -> Self {
        let page_size = config.catalog.page_size;

        let auth = Arc::new(AuthService::new(AuthConfig::from(config)));
        let pricing = Arc::new(PricingService::new(config.pricing.clone()));
        let product_catalog = Arc::new(ProductCatalogService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.catalog.clone(),
        ));
        let cart = Arc::new(CartService::new(
            db_pool.clone(),
            event_sender.clone(),
            pricing.clone(),
        ));
        let customer = Arc::new(CustomerService::new(
            db_pool.clone(),
            event_sender.clone(),
            auth.clone(),
            cart.clone(),
            config.payment_methods.clone(),
            page_size,
        ));
        let reviews = Arc::new(ReviewService::new(db_pool.clone(), event_sender.clone()));
        let orders = Arc::new(OrderService::new(
            db_pool.clone(),
            event_sender.clone(),
            cart.clone(),
            page_size,
        ));

        let payments = gateways
            .into_iter()
            .fold(PaymentService::new(db_pool, event_sender), |svc, gw| {
                svc.with_gateway(gw)
            })
            .with_webhook_verifier(StripeWebhookVerifier::from_config(&config.stripe));

        Self {
            auth,
            pricing,
            product_catalog,
            cart,
            customer,
            reviews,
            orders,
            payments: Arc::new(payments),
        }
    }
}
