use crate::common::money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shopping cart entity.
///
/// One row per signed-in user (`user_id`) or, for anonymous visitors, per session
/// cookie (`session_id` with a null `user_id`). Line items live in the `items` JSON
/// column; the four price columns are always the pricing output over those items.
/// `version` increases on every write and guards updates with compare-and-swap.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "carts")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(nullable, unique)]
    pub user_id: Option<Uuid>,
    pub session_id: String,
    #[sea_orm(column_type = "Json")]
    pub items: CartLines,
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
    #[serde(skip_serializing, default)]
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_empty(&self) -> bool {
        self.items.0.is_empty()
    }
}

/// A product line, embedded in carts and copied into `order_items` at checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: Uuid,
    pub name: String,
    pub slug: String,
    pub image: String,
    #[serde(with = "money")]
    pub price: Decimal,
    pub qty: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct CartLines(pub Vec<LineItem>);
