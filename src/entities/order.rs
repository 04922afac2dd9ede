use super::user::ShippingAddress;
use crate::common::money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placed order entity.
///
/// Prices, address and payment method are frozen at creation. `is_paid` only ever
/// moves from false to true, and `is_delivered` requires `is_paid`. `is_backordered`
/// is set when a captured payment found too little stock for some line.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    #[sea_orm(column_type = "Json")]
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    #[sea_orm(column_type = "Json", nullable)]
    pub payment_result: Option<PaymentResult>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    #[serde(with = "money")]
    pub items_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    #[serde(with = "money")]
    pub shipping_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    #[serde(with = "money")]
    pub tax_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    #[serde(with = "money")]
    pub total_price: Decimal,
    pub is_paid: bool,
    #[sea_orm(nullable)]
    pub paid_at: Option<DateTime<Utc>>,
    pub is_delivered: bool,
    #[sea_orm(nullable)]
    pub delivered_at: Option<DateTime<Utc>>,
    pub is_backordered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Accepted payment methods.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum PaymentMethod {
    #[default]
    #[sea_orm(string_value = "PayPal")]
    PayPal,
    #[sea_orm(string_value = "Stripe")]
    Stripe,
    #[sea_orm(string_value = "CashOnDelivery")]
    CashOnDelivery,
}

/// Provider outcome stored on the order.
///
/// Written twice for PayPal: once with the provider order id and empty placeholders
/// when the remote order is created, then with the capture details when paid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub id: String,
    pub status: String,
    pub email_address: String,
    #[serde(with = "money")]
    pub price_paid: Decimal,
}

impl PaymentResult {
    /// Placeholder recorded when a provider-side payment is first created.
    pub fn pending(reference: impl Into<String>) -> Self {
        Self {
            id: reference.into(),
            status: String::new(),
            email_address: String::new(),
            price_paid: Decimal::ZERO,
        }
    }
}
