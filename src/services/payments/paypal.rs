use super::gateway::{ensure_success, http_client, PaymentGateway, PaymentIntent};
use crate::{
    common::round_money,
    config::PayPalConfig,
    entities::{OrderModel, PaymentMethod, PaymentResult},
    errors::ServiceError,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use tracing::{info, instrument, warn};

const COMPLETED: &str = "COMPLETED";

/// PayPal Orders v2 client.
#[derive(Clone)]
pub struct PayPalGateway {
    client: reqwest::Client,
    config: PayPalConfig,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CreatedOrder {
    id: String,
}

/// Capture response, reduced to the fields the storefront records.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureResponse {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub payer: Option<Payer>,
    #[serde(default)]
    pub purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Payer {
    #[serde(default)]
    pub email_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseUnit {
    #[serde(default)]
    pub payments: Option<Payments>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Payments {
    #[serde(default)]
    pub captures: Vec<Capture>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Capture {
    pub amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Amount {
    pub value: String,
}

impl PayPalGateway {
    pub fn new(config: PayPalConfig, currency: impl Into<String>) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            config,
            currency: currency.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.app_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let token: AccessToken = ensure_success("PayPal", response).await?.json().await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::PayPal
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_intent(&self, order: &OrderModel) -> Result<PaymentIntent, ServiceError> {
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": self.currency,
                    "value": round_money(order.total_price).to_string(),
                }
            }]
        });

        let response = self
            .client
            .post(self.url("/v2/checkout/orders"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let created: CreatedOrder = ensure_success("PayPal", response).await?.json().await?;

        info!(paypal_order_id = %created.id, "created PayPal order");
        Ok(PaymentIntent {
            provider_reference: created.id,
            client_secret: None,
        })
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn verify_and_capture(
        &self,
        order: &OrderModel,
        provider_reference: &str,
    ) -> Result<PaymentResult, ServiceError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.url(&format!(
                "/v2/checkout/orders/{}/capture",
                provider_reference
            )))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await?;
        let capture: CaptureResponse = ensure_success("PayPal", response).await?.json().await?;

        let expected = order.payment_result.as_ref().map(|r| r.id.as_str());
        capture_to_payment_result(expected, capture)
    }
}

/// Accepts a capture only if it is for the PayPal order stored on our order and
/// PayPal reports it `COMPLETED`.
pub fn capture_to_payment_result(
    expected_id: Option<&str>,
    capture: CaptureResponse,
) -> Result<PaymentResult, ServiceError> {
    let failed = || ServiceError::PaymentFailed("Error in PayPal payment".to_string());

    if expected_id != Some(capture.id.as_str()) || capture.status != COMPLETED {
        warn!(
            capture_id = %capture.id,
            status = %capture.status,
            "rejecting PayPal capture"
        );
        return Err(failed());
    }

    let value = capture
        .purchase_units
        .first()
        .and_then(|unit| unit.payments.as_ref())
        .and_then(|payments| payments.captures.first())
        .map(|c| c.amount.value.as_str())
        .ok_or_else(failed)?;
    let price_paid = Decimal::from_str(value).map_err(|_| failed())?;

    Ok(PaymentResult {
        id: capture.id,
        status: capture.status,
        email_address: capture
            .payer
            .and_then(|p| p.email_address)
            .unwrap_or_default(),
        price_paid: round_money(price_paid),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn capture(id: &str, status: &str) -> CaptureResponse {
        serde_json::from_value(json!({
            "id": id,
            "status": status,
            "payer": { "email_address": "a@b.com" },
            "purchase_units": [{
                "payments": { "captures": [{ "amount": { "value": "96.25" } }] }
            }]
        }))
        .unwrap()
    }

    #[test]
    fn matching_completed_capture_is_accepted() {
        let result = capture_to_payment_result(Some("PAY1"), capture("PAY1", "COMPLETED")).unwrap();
        assert_eq!(result.id, "PAY1");
        assert_eq!(result.email_address, "a@b.com");
        assert_eq!(result.price_paid, dec!(96.25));
    }

    #[test]
    fn mismatched_or_incomplete_capture_is_rejected() {
        assert_matches!(
            capture_to_payment_result(Some("PAY1"), capture("PAY2", "COMPLETED")),
            Err(ServiceError::PaymentFailed(_))
        );
        assert_matches!(
            capture_to_payment_result(Some("PAY1"), capture("PAY1", "PENDING")),
            Err(ServiceError::PaymentFailed(_))
        );
        assert_matches!(
            capture_to_payment_result(None, capture("PAY1", "COMPLETED")),
            Err(ServiceError::PaymentFailed(_))
        );
    }
}
