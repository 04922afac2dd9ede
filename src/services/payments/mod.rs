//! Payment capture and fulfillment state.
//!
//! An order moves `Created -> AwaitingCapture -> Paid`, with `Delivered` reachable
//! only from `Paid`. Every route to `Paid` (PayPal capture, the Stripe webhook and
//! the admin cash-on-delivery action) goes through [`PaymentService::mark_paid`], the
//! only place product stock is decremented. Stock is checked before any provider
//! call; a capture that still finds a shortfall is kept and the order backordered.

pub mod gateway;
pub mod paypal;
pub mod stripe;

pub use gateway::{PaymentGateway, PaymentIntent};
pub use paypal::PayPalGateway;
pub use stripe::{StripeGateway, StripeWebhookVerifier};

use crate::{
    auth::RequestContext,
    db::with_transaction,
    entities::{order, order_item, product, Order, OrderItem, OrderModel, PaymentMethod, PaymentResult, Product},
    errors::ServiceError,
    events::{Event, EventSender},
    tracing::with_timing,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// What the Stripe success page should show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeLanding {
    pub order_id: Uuid,
    pub is_success: bool,
    pub is_paid: bool,
    pub redirect_to: String,
}

/// How a verified webhook event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WebhookOutcome {
    Paid,
    AlreadyPaid,
    PaymentFailed,
    Ignored,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    gateways: HashMap<PaymentMethod, Arc<dyn PaymentGateway>>,
    webhook_verifier: Option<StripeWebhookVerifier>,
}

impl PaymentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db,
            event_sender,
            gateways: HashMap::new(),
            webhook_verifier: None,
        }
    }

    /// Registers the gateway for its payment method, replacing any earlier one.
    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.method(), gateway);
        self
    }

    pub fn with_webhook_verifier(mut self, verifier: Option<StripeWebhookVerifier>) -> Self {
        self.webhook_verifier = verifier;
        self
    }

    fn gateway(&self, method: PaymentMethod) -> Result<&Arc<dyn PaymentGateway>, ServiceError> {
        self.gateways.get(&method).ok_or_else(|| {
            ServiceError::InvalidOperation(format!("{} payments are not available", method))
        })
    }

    async fn find_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))
    }

    /// Loads an unpaid order the caller may pay for.
    async fn payable_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let caller = ctx.require_user()?;
        let order = self.find_order(order_id).await?;

        if order.user_id != caller.user_id && !caller.is_admin() {
            return Err(ServiceError::Forbidden(
                "You are not allowed to pay for this order".to_string(),
            ));
        }
        if order.is_paid {
            return Err(ServiceError::AlreadyPaid);
        }
        Ok(order)
    }

    /// Fails with `InsufficientStock` when any line of the order can no longer be filled.
    async fn ensure_in_stock(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        for item in items {
            let product = Product::find_by_id(item.product_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} no longer exists", item.name))
                })?;
            if product.stock < item.qty {
                return Err(ServiceError::InsufficientStock(format!(
                    "Not enough stock for {}",
                    item.name
                )));
            }
        }
        Ok(())
    }

    /// Creates the provider-side payment and records its reference on the order.
    #[instrument(skip(self))]
    pub async fn initiate_payment(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
    ) -> Result<PaymentIntent, ServiceError> {
        let order = self.payable_order(ctx, order_id).await?;
        let gateway = self.gateway(order.payment_method)?;
        self.ensure_in_stock(order_id).await?;
        let intent = with_timing("payment.create_intent", || gateway.create_intent(&order)).await?;

        let stored = Order::update_many()
            .col_expr(
                order::Column::PaymentResult,
                Expr::value(Some(PaymentResult::pending(
                    intent.provider_reference.clone(),
                ))),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::IsPaid.eq(false))
            .exec(&*self.db)
            .await?;
        if stored.rows_affected == 0 {
            return Err(ServiceError::AlreadyPaid);
        }

        self.event_sender
            .send_or_log(Event::PaymentInitiated {
                order_id,
                reference: intent.provider_reference.clone(),
            })
            .await;

        Ok(intent)
    }

    /// Captures a PayPal payment and marks the order paid when PayPal confirms it.
    ///
    /// Stripe orders are confirmed by the signed webhook only.
    #[instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        provider_reference: &str,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.payable_order(ctx, order_id).await?;
        if order.payment_method == PaymentMethod::Stripe {
            return Err(ServiceError::InvalidOperation(
                "Stripe payments are confirmed by Stripe".to_string(),
            ));
        }

        let gateway = self.gateway(order.payment_method)?;
        self.ensure_in_stock(order_id).await?;
        let captured = with_timing("payment.capture", || {
            gateway.verify_and_capture(&order, provider_reference)
        })
        .await;

        match captured {
            Ok(result) => self.mark_paid(order_id, Some(result)).await,
            Err(e) => {
                if let ServiceError::PaymentFailed(reason) = &e {
                    self.event_sender
                        .send_or_log(Event::PaymentFailed {
                            order_id,
                            reason: reason.clone(),
                        })
                        .await;
                }
                Err(e)
            }
        }
    }

    /// Admin: settle a cash-on-delivery order.
    #[instrument(skip(self))]
    pub async fn mark_paid_cod(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        ctx.require_admin()?;
        let order = self.find_order(order_id).await?;
        if order.payment_method != PaymentMethod::CashOnDelivery {
            return Err(ServiceError::InvalidOperation(
                "Only cash on delivery orders can be marked paid manually".to_string(),
            ));
        }
        self.mark_paid(order_id, None).await
    }

    /// Marks an order paid and takes its items out of stock, atomically.
    ///
    /// The paid flag is flipped with a conditional update, so of two concurrent
    /// callers exactly one proceeds and the other gets `AlreadyPaid`.
    ///
    /// Without a provider result (cash on delivery) a product short of stock rolls
    /// the whole transition back. With one, the money is already taken: the order is
    /// still marked paid, short lines take whatever stock is left and the order is
    /// flagged `is_backordered` for restock or refund.
    #[instrument(skip(self, payment_result))]
    pub async fn mark_paid(
        &self,
        order_id: Uuid,
        payment_result: Option<PaymentResult>,
    ) -> Result<OrderModel, ServiceError> {
        let captured = payment_result.is_some();
        let (paid, short_items) = with_transaction(&*self.db, move |txn| {
            Box::pin(async move {
                let existing = Order::find_by_id(order_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
                if existing.is_paid {
                    return Err(ServiceError::AlreadyPaid);
                }

                let now = Utc::now();
                let mut update = Order::update_many()
                    .col_expr(order::Column::IsPaid, Expr::value(true))
                    .col_expr(order::Column::PaidAt, Expr::value(Some(now)))
                    .col_expr(order::Column::UpdatedAt, Expr::value(now));
                if let Some(result) = payment_result {
                    update = update.col_expr(order::Column::PaymentResult, Expr::value(Some(result)));
                }
                let flipped = update
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::IsPaid.eq(false))
                    .exec(txn)
                    .await?;
                if flipped.rows_affected == 0 {
                    return Err(ServiceError::AlreadyPaid);
                }

                let items = OrderItem::find()
                    .filter(order_item::Column::OrderId.eq(order_id))
                    .all(txn)
                    .await?;
                let mut short_items = Vec::new();
                for item in items {
                    let decremented = Product::update_many()
                        .col_expr(
                            product::Column::Stock,
                            Expr::col(product::Column::Stock).sub(item.qty),
                        )
                        .filter(product::Column::Id.eq(item.product_id))
                        .filter(product::Column::Stock.gte(item.qty))
                        .exec(txn)
                        .await?;
                    if decremented.rows_affected > 0 {
                        continue;
                    }

                    let exists = Product::find_by_id(item.product_id).one(txn).await?;
                    if !captured {
                        return Err(match exists {
                            Some(_) => ServiceError::InsufficientStock(format!(
                                "Not enough stock for {}",
                                item.name
                            )),
                            None => ServiceError::NotFound(format!(
                                "Product {} no longer exists",
                                item.name
                            )),
                        });
                    }
                    if exists.is_some() {
                        Product::update_many()
                            .col_expr(product::Column::Stock, Expr::value(0))
                            .filter(product::Column::Id.eq(item.product_id))
                            .exec(txn)
                            .await?;
                    }
                    short_items.push(item.name);
                }

                if !short_items.is_empty() {
                    Order::update_many()
                        .col_expr(order::Column::IsBackordered, Expr::value(true))
                        .filter(order::Column::Id.eq(order_id))
                        .exec(txn)
                        .await?;
                }

                let paid = Order::find_by_id(order_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
                Ok((paid, short_items))
            })
        })
        .await?;

        self.event_sender
            .send_or_log(Event::OrderPaid {
                order_id,
                amount: paid.total_price,
            })
            .await;
        if !short_items.is_empty() {
            warn!(order_id = %order_id, items = ?short_items, "captured payment without enough stock");
            self.event_sender
                .send_or_log(Event::OrderBackordered {
                    order_id,
                    items: short_items,
                })
                .await;
        }
        info!(order_id = %order_id, "order marked paid");

        Ok(paid)
    }

    /// Admin: mark a paid order delivered.
    #[instrument(skip(self))]
    pub async fn mark_delivered(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        ctx.require_admin()?;

        let now = Utc::now();
        let updated = Order::update_many()
            .col_expr(order::Column::IsDelivered, Expr::value(true))
            .col_expr(order::Column::DeliveredAt, Expr::value(Some(now)))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::IsPaid.eq(true))
            .filter(order::Column::IsDelivered.eq(false))
            .exec(&*self.db)
            .await?;

        let order = self.find_order(order_id).await?;
        if updated.rows_affected == 0 {
            return Err(if !order.is_paid {
                ServiceError::NotPaid
            } else {
                ServiceError::InvalidOperation("Order is already delivered".to_string())
            });
        }

        self.event_sender
            .send_or_log(Event::OrderDelivered(order_id))
            .await;
        info!(order_id = %order_id, "order marked delivered");

        Ok(order)
    }

    /// Reports the outcome of the browser's return from Stripe. Never marks paid;
    /// the signed webhook does that.
    #[instrument(skip(self))]
    pub async fn stripe_success_landing(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        payment_intent: &str,
    ) -> Result<StripeLanding, ServiceError> {
        let caller = ctx.require_user()?;
        let order = self.find_order(order_id).await?;
        if order.user_id != caller.user_id && !caller.is_admin() {
            return Err(ServiceError::Forbidden(
                "You are not allowed to view this order".to_string(),
            ));
        }

        let is_success = match self
            .gateway(PaymentMethod::Stripe)?
            .verify_and_capture(&order, payment_intent)
            .await
        {
            Ok(_) => true,
            Err(ServiceError::PaymentFailed(reason)) => {
                info!(order_id = %order_id, reason = %reason, "Stripe payment not complete yet");
                false
            }
            Err(e) => return Err(e),
        };

        Ok(StripeLanding {
            order_id,
            is_success,
            is_paid: order.is_paid,
            redirect_to: format!("/order/{}", order_id),
        })
    }

    /// Verifies and applies a Stripe webhook delivery.
    ///
    /// Redeliveries for an order that is already paid are acknowledged without change.
    #[instrument(skip(self, payload, signature))]
    pub async fn handle_stripe_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, ServiceError> {
        let verifier = self.webhook_verifier.as_ref().ok_or_else(|| {
            ServiceError::InvalidOperation("Stripe webhooks are not configured".to_string())
        })?;
        let event = verifier.verify(signature, payload, Utc::now().timestamp())?;

        let succeeded = match event.event_type.as_str() {
            "payment_intent.succeeded" => true,
            "payment_intent.payment_failed" => false,
            other => {
                info!(event_id = %event.id, event_type = %other, "ignoring Stripe event");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let intent: stripe::StripePaymentIntent = serde_json::from_value(event.data.object)?;
        let Some(order_id) = intent.order_id().and_then(|id| Uuid::parse_str(id).ok()) else {
            warn!(event_id = %event.id, "Stripe event without an order id");
            return Ok(WebhookOutcome::Ignored);
        };
        let Some(order) = Order::find_by_id(order_id).one(&*self.db).await? else {
            warn!(event_id = %event.id, order_id = %order_id, "Stripe event for unknown order");
            return Ok(WebhookOutcome::Ignored);
        };

        if !succeeded {
            self.event_sender
                .send_or_log(Event::PaymentFailed {
                    order_id,
                    reason: format!("Stripe payment intent {} failed", intent.id),
                })
                .await;
            return Ok(WebhookOutcome::PaymentFailed);
        }

        let result = stripe::intent_to_payment_result(&order, &intent)?;
        match self.mark_paid(order_id, Some(result)).await {
            Ok(_) => Ok(WebhookOutcome::Paid),
            Err(ServiceError::AlreadyPaid) => {
                info!(order_id = %order_id, "Stripe redelivery for paid order");
                Ok(WebhookOutcome::AlreadyPaid)
            }
            Err(e) => {
                error!(order_id = %order_id, error = %e, "failed to apply Stripe payment");
                Err(e)
            }
        }
    }
}
