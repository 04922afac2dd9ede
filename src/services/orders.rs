use crate::{
    auth::RequestContext,
    common::{page_index, page_size, round_money, Page},
    db::with_transaction,
    entities::{order, order_item, user, LineItem, Order, OrderItem, OrderModel, User, UserModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::commerce::cart_service::CartService,
};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, instrument};
use uuid::Uuid;

const LATEST_ORDERS_IN_SUMMARY: u64 = 6;

/// Result of a successful checkout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order_id: Uuid,
    pub redirect_to: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderOwner {
    pub name: String,
    pub email: String,
}

/// An order with its line items and owner, as shown on the order page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: OrderModel,
    pub items: Vec<LineItem>,
    pub user: OrderOwner,
}

/// Row of the admin order table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    #[serde(with = "crate::common::money")]
    pub total_price: Decimal,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub is_backordered: bool,
    pub created_at: DateTime<Utc>,
}

impl OrderListEntry {
    fn from_pair((order, owner): (OrderModel, Option<UserModel>)) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            user_name: owner.map(|u| u.name).unwrap_or_else(|| "Deleted user".to_string()),
            total_price: order.total_price,
            is_paid: order.is_paid,
            paid_at: order.paid_at,
            is_delivered: order.is_delivered,
            delivered_at: order.delivered_at,
            is_backordered: order.is_backordered,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySales {
    /// `MM/YY`
    pub month: String,
    #[serde(with = "crate::common::money")]
    pub total_sales: Decimal,
}

/// Admin dashboard figures.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersSummary {
    pub orders_count: u64,
    pub products_count: u64,
    pub users_count: u64,
    #[serde(with = "crate::common::money")]
    pub total_sales: Decimal,
    pub sales_data: Vec<MonthlySales>,
    pub latest_orders: Vec<OrderListEntry>,
}

#[derive(Debug, FromQueryResult)]
struct SaleRow {
    created_at: DateTime<Utc>,
    total_price: Decimal,
}

/// Checkout and order queries.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    carts: Arc<CartService>,
    page_size: u64,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        carts: Arc<CartService>,
        page_size: u64,
    ) -> Self {
        Self {
            db,
            event_sender,
            carts,
            page_size,
        }
    }

    /// Places an order from the caller's cart.
    ///
    /// Preconditions are checked in order (signed in, non-empty cart, saved address,
    /// saved payment method). The order row, its line items and the emptied cart are
    /// written in one transaction.
    #[instrument(skip(self))]
    pub async fn create_order(&self, ctx: &RequestContext) -> Result<PlacedOrder, ServiceError> {
        let user_id = ctx.require_user()?.user_id;

        let cart = self
            .carts
            .find_for(&*self.db, ctx)
            .await?
            .filter(|cart| !cart.is_empty())
            .ok_or(ServiceError::EmptyCart)?;

        let customer = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        let shipping_address = customer
            .address
            .clone()
            .ok_or(ServiceError::MissingShippingAddress)?;
        let payment_method = customer
            .payment_method
            .ok_or(ServiceError::MissingPaymentMethod)?;

        let carts = self.carts.clone();
        let order = with_transaction(&*self.db, move |txn| {
            Box::pin(async move {
                let now = Utc::now();
                let order = order::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    shipping_address: Set(shipping_address),
                    payment_method: Set(payment_method),
                    payment_result: Set(None),
                    items_price: Set(round_money(cart.items_price)),
                    shipping_price: Set(round_money(cart.shipping_price)),
                    tax_price: Set(round_money(cart.tax_price)),
                    total_price: Set(round_money(cart.total_price)),
                    is_paid: Set(false),
                    paid_at: Set(None),
                    is_delivered: Set(false),
                    delivered_at: Set(None),
                    is_backordered: Set(false),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(txn)
                .await?;

                for (position, line) in (0..).zip(&cart.items.0) {
                    order_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        order_id: Set(order.id),
                        product_id: Set(line.product_id),
                        name: Set(line.name.clone()),
                        slug: Set(line.slug.clone()),
                        image: Set(line.image.clone()),
                        price: Set(line.price),
                        qty: Set(line.qty),
                        position: Set(position),
                    }
                    .insert(txn)
                    .await?;
                }

                carts.replace_lines(txn, &cart, Vec::new()).await?;
                Ok(order)
            })
        })
        .await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;
        info!(order_id = %order.id, total = %order.total_price, "order created");

        Ok(PlacedOrder {
            order_id: order.id,
            redirect_to: format!("/order/{}", order.id),
        })
    }

    /// Order with items and owner. Customers may only read their own orders.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
    ) -> Result<OrderDetails, ServiceError> {
        let caller = ctx.require_user()?;

        let (order, owner) = Order::find_by_id(order_id)
            .find_also_related(User)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        if order.user_id != caller.user_id && !caller.is_admin() {
            return Err(ServiceError::Forbidden(
                "You are not allowed to view this order".to_string(),
            ));
        }

        let items = order
            .find_related(OrderItem)
            .order_by_asc(order_item::Column::Position)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(LineItem::from)
            .collect();

        let user = owner
            .map(|u| OrderOwner {
                name: u.name,
                email: u.email,
            })
            .unwrap_or(OrderOwner {
                name: "Deleted user".to_string(),
                email: String::new(),
            });

        Ok(OrderDetails { order, items, user })
    }

    /// The caller's orders, newest first.
    #[instrument(skip(self))]
    pub async fn get_my_orders(
        &self,
        ctx: &RequestContext,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Page<OrderModel>, ServiceError> {
        let user_id = ctx.require_user()?.user_id;
        let limit = page_size(limit, self.page_size);

        let paginator = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page_index(page)).await?;

        Ok(Page::new(data, total, limit))
    }

    /// Admin: all orders newest first, optionally filtered by owner name.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: Option<u64>,
        limit: Option<u64>,
        query: Option<String>,
    ) -> Result<Page<OrderListEntry>, ServiceError> {
        let limit = page_size(limit, self.page_size);

        let mut select = Order::find()
            .find_also_related(User)
            .order_by_desc(order::Column::CreatedAt);
        if let Some(q) = query.filter(|q| !q.trim().is_empty() && q != "all") {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col((user::Entity, user::Column::Name))))
                    .like(format!("%{}%", q.to_lowercase())),
            );
        }

        let paginator = select.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let data = paginator
            .fetch_page(page_index(page))
            .await?
            .into_iter()
            .map(OrderListEntry::from_pair)
            .collect();

        Ok(Page::new(data, total, limit))
    }

    /// Admin: delete an order and its line items.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
        order.delete(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderDeleted(order_id))
            .await;
        info!("Deleted order: {}", order_id);
        Ok(())
    }

    /// Admin: dashboard counts, sales totals and the latest orders.
    #[instrument(skip(self))]
    pub async fn orders_summary(&self) -> Result<OrdersSummary, ServiceError> {
        let orders_count = Order::find().count(&*self.db).await?;
        let products_count = crate::entities::Product::find().count(&*self.db).await?;
        let users_count = User::find().count(&*self.db).await?;

        let sales = Order::find()
            .select_only()
            .column(order::Column::CreatedAt)
            .column(order::Column::TotalPrice)
            .order_by_asc(order::Column::CreatedAt)
            .into_model::<SaleRow>()
            .all(&*self.db)
            .await?;

        let total_sales = round_money(sales.iter().map(|s| s.total_price).sum());
        let sales_data = monthly_sales(sales.iter().map(|s| (s.created_at, s.total_price)));

        let latest_orders = Order::find()
            .find_also_related(User)
            .order_by_desc(order::Column::CreatedAt)
            .limit(LATEST_ORDERS_IN_SUMMARY)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(OrderListEntry::from_pair)
            .collect();

        Ok(OrdersSummary {
            orders_count,
            products_count,
            users_count,
            total_sales,
            sales_data,
            latest_orders,
        })
    }
}

/// Buckets sales per calendar month, oldest month first, labelled `MM/YY`.
pub fn monthly_sales(
    sales: impl IntoIterator<Item = (DateTime<Utc>, Decimal)>,
) -> Vec<MonthlySales> {
    let mut buckets: BTreeMap<(i32, u32), Decimal> = BTreeMap::new();
    for (at, amount) in sales {
        *buckets.entry((at.year(), at.month())).or_default() += amount;
    }

    buckets
        .into_iter()
        .map(|((year, month), total)| MonthlySales {
            month: format!("{:02}/{:02}", month, year.rem_euclid(100)),
            total_sales: round_money(total),
        })
        .collect()
}
