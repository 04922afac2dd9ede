use crate::{
    auth::RequestContext,
    db::with_transaction,
    entities::{cart, Cart, CartLines, CartModel, LineItem, Product, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::commerce::pricing_service::PricingService,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, QueryFilter, Set, SqlErr,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outcome of a cart mutation: the persisted cart plus the message shown to the shopper.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMutation {
    pub cart: CartModel,
    pub message: String,
}

/// Shopping cart service.
///
/// A cart belongs to the signed-in user when there is one, otherwise to the session
/// cookie. Every write recomputes the four price columns from the lines and is a
/// compare-and-swap on `version`, so two tabs racing on the same cart get a
/// `ConcurrentModification` instead of a lost update. Stock is read but never
/// changed here.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    pricing: Arc<PricingService>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        pricing: Arc<PricingService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            pricing,
        }
    }

    /// Returns the caller's cart, or `None` when they have not added anything yet.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, ctx: &RequestContext) -> Result<Option<CartModel>, ServiceError> {
        self.find_for(&*self.db, ctx).await
    }

    /// Adds one unit of `product_id` to the caller's cart, creating the cart lazily.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        ctx: &RequestContext,
        product_id: Uuid,
    ) -> Result<CartMutation, ServiceError> {
        let session_id = ctx.require_session()?;

        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        let existing = match self.find_for(&*self.db, ctx).await? {
            Some(existing) => existing,
            None => {
                if let Some(cart) = self.create_cart(ctx, session_id, &product).await? {
                    return Ok(CartMutation {
                        cart,
                        message: format!("{} added to cart", product.name),
                    });
                }
                // A concurrent first add created the cart; add to that one.
                self.find_for(&*self.db, ctx).await?.ok_or_else(|| {
                    ServiceError::Conflict("Cart changed while adding, please retry".to_string())
                })?
            }
        };

        let mut lines = existing.items.0.clone();
        let message = match lines.iter_mut().find(|l| l.product_id == product.id) {
            Some(line) => {
                if line.qty + 1 > product.stock {
                    return Err(ServiceError::InsufficientStock("Not enough stock".to_string()));
                }
                line.qty += 1;
                format!("{} updated in cart", product.name)
            }
            None => {
                if product.stock < 1 {
                    return Err(ServiceError::InsufficientStock("Not enough stock".to_string()));
                }
                lines.push(line_for(&product));
                format!("{} added to cart", product.name)
            }
        };

        let cart = self.replace_lines(&*self.db, &existing, lines).await?;
        self.event_sender
            .send_or_log(Event::CartUpdated(cart.id))
            .await;

        Ok(CartMutation { cart, message })
    }

    /// Inserts a one-line cart for the caller. Returns `None` when another request
    /// created the caller's cart first.
    async fn create_cart(
        &self,
        ctx: &RequestContext,
        session_id: &str,
        product: &ProductModel,
    ) -> Result<Option<CartModel>, ServiceError> {
        if product.stock < 1 {
            return Err(ServiceError::InsufficientStock("Not enough stock".to_string()));
        }

        let lines = vec![line_for(product)];
        let prices = self.pricing.calculate(&lines);
        let now = Utc::now();
        let inserted = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(ctx.user_id()),
            session_id: Set(session_id.to_string()),
            items: Set(CartLines(lines)),
            items_price: Set(prices.items_price),
            shipping_price: Set(prices.shipping_price),
            tax_price: Set(prices.tax_price),
            total_price: Set(prices.total_price),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await;

        let cart = match inserted {
            Ok(cart) => cart,
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                info!(session_id = %session_id, "cart created concurrently");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        self.event_sender
            .send_or_log(Event::CartCreated(cart.id))
            .await;
        info!(cart_id = %cart.id, product_id = %product.id, "created cart");
        Ok(Some(cart))
    }

    /// Removes one unit of `product_id`; the line disappears when it reaches zero.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        ctx: &RequestContext,
        product_id: Uuid,
    ) -> Result<CartMutation, ServiceError> {
        let existing = self
            .find_for(&*self.db, ctx)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        let mut lines = existing.items.0.clone();
        let position = lines
            .iter()
            .position(|l| l.product_id == product_id)
            .ok_or_else(|| ServiceError::NotFound("Item not found".to_string()))?;

        let name = lines[position].name.clone();
        if lines[position].qty <= 1 {
            lines.remove(position);
        } else {
            lines[position].qty -= 1;
        }

        let cart = self.replace_lines(&*self.db, &existing, lines).await?;
        self.event_sender
            .send_or_log(Event::CartUpdated(cart.id))
            .await;

        Ok(CartMutation {
            cart,
            message: format!("{} removed from cart", name),
        })
    }

    /// Hands the anonymous session cart over to `user_id` after sign-in.
    ///
    /// A cart the user already owns wins and the session cart is discarded.
    #[instrument(skip(self))]
    pub async fn merge_on_sign_in(
        &self,
        session_id: &str,
        user_id: Uuid,
    ) -> Result<Option<CartModel>, ServiceError> {
        let session_id = session_id.to_string();

        let merged = with_transaction(&*self.db, move |txn| {
            Box::pin(async move {
                let user_cart = Cart::find()
                    .filter(cart::Column::UserId.eq(user_id))
                    .one(txn)
                    .await?;
                let session_cart = Cart::find()
                    .filter(cart::Column::SessionId.eq(session_id.as_str()))
                    .filter(cart::Column::UserId.is_null())
                    .one(txn)
                    .await?;

                match (user_cart, session_cart) {
                    (Some(owned), Some(anonymous)) => {
                        anonymous.delete(txn).await?;
                        Ok(Some(owned))
                    }
                    (None, Some(anonymous)) => {
                        let now = Utc::now();
                        let result = Cart::update_many()
                            .col_expr(cart::Column::UserId, Expr::value(Some(user_id)))
                            .col_expr(cart::Column::Version, Expr::value(anonymous.version + 1))
                            .col_expr(cart::Column::UpdatedAt, Expr::value(now))
                            .filter(cart::Column::Id.eq(anonymous.id))
                            .filter(cart::Column::Version.eq(anonymous.version))
                            .exec(txn)
                            .await?;
                        if result.rows_affected == 0 {
                            return Err(ServiceError::ConcurrentModification(anonymous.id));
                        }
                        Ok(Some(CartModel {
                            user_id: Some(user_id),
                            version: anonymous.version + 1,
                            updated_at: now,
                            ..anonymous
                        }))
                    }
                    (owned, None) => Ok(owned),
                }
            })
        })
        .await?;

        if let Some(cart) = &merged {
            self.event_sender
                .send_or_log(Event::CartMerged {
                    cart_id: cart.id,
                    user_id,
                })
                .await;
        }

        Ok(merged)
    }

    /// Loads the cart owned by the context: the user's cart when signed in, else the
    /// anonymous cart of the session.
    pub(crate) async fn find_for<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &RequestContext,
    ) -> Result<Option<CartModel>, ServiceError> {
        if let Some(user_id) = ctx.user_id() {
            return Ok(Cart::find()
                .filter(cart::Column::UserId.eq(user_id))
                .one(conn)
                .await?);
        }

        match ctx.session_id.as_deref() {
            Some(session_id) => Ok(Cart::find()
                .filter(cart::Column::SessionId.eq(session_id))
                .filter(cart::Column::UserId.is_null())
                .one(conn)
                .await?),
            None => Ok(None),
        }
    }

    /// Persists `lines` with freshly computed prices, guarded by the cart version.
    pub(crate) async fn replace_lines<C: ConnectionTrait>(
        &self,
        conn: &C,
        current: &CartModel,
        lines: Vec<LineItem>,
    ) -> Result<CartModel, ServiceError> {
        let prices = self.pricing.calculate(&lines);
        let now = Utc::now();
        let next_version = current.version + 1;

        let result = Cart::update_many()
            .col_expr(cart::Column::Items, Expr::value(CartLines(lines.clone())))
            .col_expr(cart::Column::ItemsPrice, Expr::value(prices.items_price))
            .col_expr(cart::Column::ShippingPrice, Expr::value(prices.shipping_price))
            .col_expr(cart::Column::TaxPrice, Expr::value(prices.tax_price))
            .col_expr(cart::Column::TotalPrice, Expr::value(prices.total_price))
            .col_expr(cart::Column::Version, Expr::value(next_version))
            .col_expr(cart::Column::UpdatedAt, Expr::value(now))
            .filter(cart::Column::Id.eq(current.id))
            .filter(cart::Column::Version.eq(current.version))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            warn!(cart_id = %current.id, version = current.version, "stale cart write");
            return Err(ServiceError::ConcurrentModification(current.id));
        }

        Ok(CartModel {
            items: CartLines(lines),
            items_price: prices.items_price,
            shipping_price: prices.shipping_price,
            tax_price: prices.tax_price,
            total_price: prices.total_price,
            version: next_version,
            updated_at: now,
            ..current.clone()
        })
    }
}

fn line_for(product: &ProductModel) -> LineItem {
    LineItem {
        product_id: product.id,
        name: product.name.clone(),
        slug: product.slug.clone(),
        image: product.primary_image(),
        price: product.price,
        qty: 1,
    }
}
