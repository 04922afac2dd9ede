use crate::{
    entities::{OrderModel, PaymentMethod, PaymentResult},
    errors::ServiceError,
};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Provider-side payment created for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    /// PayPal order id or Stripe payment intent id
    pub provider_reference: String,
    /// Handed to the browser SDK; Stripe only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// A hosted payment provider.
///
/// `verify_and_capture` must only return `Ok` when the provider confirms that the
/// money for this exact order has been taken; every mismatch is a `PaymentFailed`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn method(&self) -> PaymentMethod;

    async fn create_intent(&self, order: &OrderModel) -> Result<PaymentIntent, ServiceError>;

    async fn verify_and_capture(
        &self,
        order: &OrderModel,
        provider_reference: &str,
    ) -> Result<PaymentResult, ServiceError>;
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ServiceError::InternalError(format!("Failed to build HTTP client: {}", e)))
}

/// Turns a non-2xx provider response into an `ExternalServiceError`.
pub(crate) async fn ensure_success(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(provider, %status, body = %body, "payment provider request failed");
    Err(ServiceError::ExternalServiceError(format!(
        "{} request failed with status {}",
        provider, status
    )))
}
