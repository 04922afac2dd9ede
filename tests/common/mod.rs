#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_api::{
    auth::{hash_password, RequestContext, SessionUser},
    build_router,
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        user, OrderModel, PaymentMethod, PaymentResult, ProductModel, ShippingAddress,
        UserModel, UserRole,
    },
    errors::ServiceError,
    events,
    handlers::AppServices,
    services::{
        commerce::product_catalog_service::ProductInput,
        payments::{PaymentGateway, PaymentIntent, StripeWebhookVerifier},
    },
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const SECRET: &str = "kX9vQ2mN7pL4wR8tY1uZ6aB3cD5eF0gH2jK4lM6nP8qS1tV3wX5yZ7bC9dE2fG4h";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const PASSWORD: &str = "secret123";

/// Stripe reference prefix the fake gateway reports as `succeeded`.
pub const STRIPE_SUCCEEDED: &str = "pi_succeeded";

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        SECRET.to_string(),
        "127.0.0.1".to_string(),
        0,
        "test".to_string(),
    );
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg.cors_allow_any_origin = true;
    cfg.payment_methods.enabled = vec![
        PaymentMethod::PayPal,
        PaymentMethod::Stripe,
        PaymentMethod::CashOnDelivery,
    ];
    cfg.stripe.webhook_secret = Some(WEBHOOK_SECRET.to_string());
    cfg
}

/// In-process payment provider.
///
/// `create_intent` hands out `<prefix>-<order id>`; `verify_and_capture` accepts the
/// reference stored on the order (PayPal) or any `pi_succeeded*` reference (Stripe),
/// and charges the order total.
pub struct FakeGateway {
    method: PaymentMethod,
    captures: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            captures: Mutex::new(Vec::new()),
        }
    }

    pub fn captures(&self) -> Vec<String> {
        self.captures.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn create_intent(&self, order: &OrderModel) -> Result<PaymentIntent, ServiceError> {
        let prefix = match self.method {
            PaymentMethod::Stripe => "pi",
            _ => "PAYPAL",
        };
        Ok(PaymentIntent {
            provider_reference: format!("{}-{}", prefix, order.id),
            client_secret: (self.method == PaymentMethod::Stripe)
                .then(|| format!("secret-{}", order.id)),
        })
    }

    async fn verify_and_capture(
        &self,
        order: &OrderModel,
        provider_reference: &str,
    ) -> Result<PaymentResult, ServiceError> {
        self.captures
            .lock()
            .unwrap()
            .push(provider_reference.to_string());

        let accepted = match self.method {
            PaymentMethod::Stripe => provider_reference.starts_with(STRIPE_SUCCEEDED),
            _ => order
                .payment_result
                .as_ref()
                .map(|r| r.id == provider_reference)
                .unwrap_or(false),
        };
        if !accepted {
            return Err(ServiceError::PaymentFailed(
                "Error in PayPal payment".to_string(),
            ));
        }

        Ok(PaymentResult {
            id: provider_reference.to_string(),
            status: "COMPLETED".to_string(),
            email_address: "buyer@example.com".to_string(),
            price_paid: order.total_price,
        })
    }
}

/// Application state and router over a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub paypal: Arc<FakeGateway>,
    pub stripe: Arc<FakeGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let paypal = Arc::new(FakeGateway::new(PaymentMethod::PayPal));
        let stripe = Arc::new(FakeGateway::new(PaymentMethod::Stripe));
        let services = AppServices::with_gateways(
            db_arc.clone(),
            Arc::new(event_sender),
            &cfg,
            vec![
                paypal.clone() as Arc<dyn PaymentGateway>,
                stripe.clone() as Arc<dyn PaymentGateway>,
            ],
        );

        let state = AppState {
            db: db_arc,
            config: Arc::new(cfg),
            services,
        };
        let router = build_router(state.clone()).expect("router builds");

        Self {
            router,
            state,
            paypal,
            stripe,
            _event_task: event_task,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> ProductModel {
        let slug = format!("{}-{}", name.to_lowercase().replace(' ', "-"), Uuid::new_v4());
        self.services()
            .product_catalog
            .create_product(ProductInput {
                name: name.to_string(),
                slug,
                category: "Shirts".to_string(),
                brand: "Polo".to_string(),
                description: format!("{} seeded for tests", name),
                images: vec!["/images/sample.jpg".to_string()],
                price,
                stock,
                is_featured: false,
                banner: None,
            })
            .await
            .expect("seed product")
    }

    pub async fn seed_user(&self, email: &str, role: UserRole) -> UserModel {
        let now = Utc::now();
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(email.split('@').next().unwrap_or("user").to_string()),
            email: Set(email.to_string()),
            password_hash: Set(Some(hash_password(PASSWORD).expect("hash"))),
            role: Set(role),
            address: Set(None),
            payment_method: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed user")
    }

    /// A customer with a saved address and `method` as payment method.
    pub async fn seed_customer(&self, email: &str, method: PaymentMethod) -> UserModel {
        let customer = self.seed_user(email, UserRole::User).await;
        let mut active: user::ActiveModel = customer.into();
        active.address = Set(Some(sample_address()));
        active.payment_method = Set(Some(method));
        active.update(&*self.state.db).await.expect("update customer")
    }

    pub fn token_for(&self, user: &UserModel) -> String {
        self.services().auth.issue_token(user).expect("token")
    }

    /// Adds `product` to the customer's cart `qty` times and places the order.
    pub async fn place_order(
        &self,
        ctx: &RequestContext,
        lines: &[(&ProductModel, i32)],
    ) -> Uuid {
        for (product, qty) in lines {
            for _ in 0..*qty {
                self.services()
                    .cart
                    .add_item(ctx, product.id)
                    .await
                    .expect("add to cart");
            }
        }
        self.services()
            .orders
            .create_order(ctx)
            .await
            .expect("create order")
            .order_id
    }

    pub fn webhook_verifier(&self) -> StripeWebhookVerifier {
        StripeWebhookVerifier::new(WEBHOOK_SECRET, 300)
    }

    /// Sends a request through the full middleware stack.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        session: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", tok));
        }
        if let Some(session) = session {
            builder = builder.header(header::COOKIE, format!("sessionCartId={}", session));
        }

        let body = if let Some(json) = body {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize request body"))
        } else {
            Body::empty()
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error during test request")
    }

    pub async fn request_raw(
        &self,
        uri: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(Method::POST).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(body)).expect("build request"))
            .await
            .expect("router error during test request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn sample_address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Jane Buyer".to_string(),
        street_address: "1 Market Street".to_string(),
        city: "Springfield".to_string(),
        postal_code: "12345".to_string(),
        country: "United States".to_string(),
        lat: None,
        lng: None,
    }
}

pub fn session_user(user: &UserModel) -> SessionUser {
    SessionUser {
        user_id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        role: user.role,
    }
}

pub fn signed_in(user: &UserModel) -> RequestContext {
    RequestContext::signed_in(format!("session-{}", user.id), session_user(user))
}

pub async fn response_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("json body")
    };
    (status, value)
}
