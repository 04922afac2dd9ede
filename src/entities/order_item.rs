use super::cart::LineItem;
use crate::common::money;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Line snapshot copied from the cart when the order is placed. `position` keeps the
/// cart's line order.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub slug: String,
    pub image: String,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    #[serde(with = "money")]
    pub price: Decimal,
    pub qty: i32,
    pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for LineItem {
    fn from(item: Model) -> Self {
        LineItem {
            product_id: item.product_id,
            name: item.name,
            slug: item.slug,
            image: item.image,
            price: item.price,
            qty: item.qty,
        }
    }
}
