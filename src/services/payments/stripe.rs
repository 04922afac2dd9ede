use super::gateway::{ensure_success, http_client, PaymentGateway, PaymentIntent};
use crate::{
    common::round_money,
    config::StripeConfig,
    entities::{OrderModel, PaymentMethod, PaymentResult},
    errors::ServiceError,
};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::{info, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

const SUCCEEDED: &str = "succeeded";
const ORDER_ID_KEY: &str = "orderId";

/// Stripe PaymentIntents client.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    config: StripeConfig,
    currency: String,
}

/// The subset of a Stripe PaymentIntent object the storefront reads.
#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub amount_received: Option<i64>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub receipt_email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StripePaymentIntent {
    pub fn order_id(&self) -> Option<&str> {
        self.metadata.get(ORDER_ID_KEY).map(String::as_str)
    }
}

/// Webhook event envelope
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeGateway {
    pub fn new(config: StripeConfig, currency: impl Into<String>) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            config,
            currency: currency.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    pub async fn retrieve_intent(&self, id: &str) -> Result<StripePaymentIntent, ServiceError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/payment_intents/{}", id)))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;
        Ok(ensure_success("Stripe", response).await?.json().await?)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_intent(&self, order: &OrderModel) -> Result<PaymentIntent, ServiceError> {
        let amount = minor_units(order.total_price)?.to_string();
        let order_id = order.id.to_string();
        let currency = self.currency.to_lowercase();

        let response = self
            .client
            .post(self.url("/v1/payment_intents"))
            .bearer_auth(&self.config.secret_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", currency.as_str()),
                ("metadata[orderId]", order_id.as_str()),
            ])
            .send()
            .await?;
        let intent: StripePaymentIntent = ensure_success("Stripe", response).await?.json().await?;

        info!(payment_intent = %intent.id, amount = %amount, "created Stripe payment intent");
        Ok(PaymentIntent {
            provider_reference: intent.id,
            client_secret: intent.client_secret,
        })
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn verify_and_capture(
        &self,
        order: &OrderModel,
        provider_reference: &str,
    ) -> Result<PaymentResult, ServiceError> {
        let intent = self.retrieve_intent(provider_reference).await?;
        intent_to_payment_result(order, &intent)
    }
}

/// Amount in cents, rounded half away from zero.
pub fn minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ServiceError::InternalError(format!("Amount {} out of range", amount)))
}

/// Accepts an intent only when it was created for `order` and Stripe reports it
/// `succeeded`.
pub fn intent_to_payment_result(
    order: &OrderModel,
    intent: &StripePaymentIntent,
) -> Result<PaymentResult, ServiceError> {
    let order_id = order.id.to_string();
    if intent.order_id() != Some(order_id.as_str()) {
        warn!(payment_intent = %intent.id, "payment intent belongs to another order");
        return Err(ServiceError::ValidationError(
            "Payment intent does not match this order".to_string(),
        ));
    }

    if intent.status != SUCCEEDED {
        return Err(ServiceError::PaymentFailed(format!(
            "Payment is {}",
            intent.status
        )));
    }

    let received = intent.amount_received.unwrap_or(intent.amount);
    Ok(PaymentResult {
        id: intent.id.clone(),
        status: intent.status.clone(),
        email_address: intent.receipt_email.clone().unwrap_or_default(),
        price_paid: round_money(Decimal::new(received, 2)),
    })
}

/// Verifies `Stripe-Signature` headers (`t=<unix>,v1=<hex hmac>`).
#[derive(Clone)]
pub struct StripeWebhookVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl StripeWebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    pub fn from_config(config: &StripeConfig) -> Option<Self> {
        config
            .webhook_secret
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|secret| Self::new(secret.clone(), config.webhook_tolerance_secs))
    }

    /// Checks the signature against `payload` at time `now` and parses the event.
    pub fn verify(
        &self,
        header: Option<&str>,
        payload: &[u8],
        now: i64,
    ) -> Result<StripeEvent, ServiceError> {
        let invalid = || ServiceError::Unauthorized("Invalid webhook signature".to_string());
        let header = header.ok_or_else(invalid)?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(invalid)?;
        if (now - timestamp).unsigned_abs() > self.tolerance_secs {
            warn!(timestamp, now, "webhook timestamp outside tolerance");
            return Err(invalid());
        }

        let matched = signatures.iter().any(|signature| {
            let Ok(expected) = hex::decode(signature) else {
                return false;
            };
            let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
                return false;
            };
            mac.update(timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(payload);
            mac.verify_slice(&expected).is_ok()
        });
        if !matched {
            return Err(invalid());
        }

        Ok(serde_json::from_slice(payload)?)
    }

    /// Produces a header value for `payload`; used by tests and local tooling.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, ServiceError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(format!(
            "t={},v1={}",
            timestamp,
            hex::encode(mac.finalize().into_bytes())
        ))
    }
}
