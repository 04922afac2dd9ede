use crate::{
    auth::RequestContext,
    common::round_money,
    db::with_transaction,
    entities::{product, review, Product, Review, ReviewModel, User},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
    #[validate(length(min = 3, message = "Title must be at least 3 characters"))]
    pub title: String,
    #[validate(length(min = 3, message = "Description must be at least 3 characters"))]
    pub description: String,
}

/// A review as listed on the product page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub rating: i32,
    pub title: String,
    pub description: String,
    pub is_verified_purchase: bool,
    pub created_at: DateTime<Utc>,
}

/// Product reviews and the derived product rating.
#[derive(Clone)]
pub struct ReviewService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ReviewService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Writes the caller's review for a product, replacing any earlier one, and
    /// recomputes the product's rating and review count in the same transaction.
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn create_or_update_review(
        &self,
        ctx: &RequestContext,
        input: ReviewInput,
    ) -> Result<ReviewModel, ServiceError> {
        let user_id = ctx.require_user()?.user_id;
        input.validate()?;

        let product_id = input.product_id;
        let review = with_transaction(&*self.db, move |txn| {
            Box::pin(async move {
                Product::find_by_id(product_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

                let existing = Review::find()
                    .filter(review::Column::UserId.eq(user_id))
                    .filter(review::Column::ProductId.eq(product_id))
                    .one(txn)
                    .await?;

                let now = Utc::now();
                let saved = match existing {
                    Some(existing) => {
                        let mut active: review::ActiveModel = existing.into();
                        active.rating = Set(input.rating);
                        active.title = Set(input.title);
                        active.description = Set(input.description);
                        active.updated_at = Set(now);
                        active.update(txn).await?
                    }
                    None => review::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        user_id: Set(user_id),
                        product_id: Set(product_id),
                        rating: Set(input.rating),
                        title: Set(input.title),
                        description: Set(input.description),
                        is_verified_purchase: Set(true),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(txn)
                    .await
                    .map_err(|e| ServiceError::from_write(e, "review"))?,
                };

                refresh_product_rating(txn, product_id).await?;
                Ok(saved)
            })
        })
        .await?;

        self.event_sender
            .send_or_log(Event::ReviewSubmitted {
                product_id,
                user_id,
            })
            .await;

        info!(review_id = %review.id, "review saved");
        Ok(review)
    }

    /// Reviews of a product, newest first.
    #[instrument(skip(self))]
    pub async fn get_product_reviews(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<ReviewView>, ServiceError> {
        let rows = Review::find()
            .filter(review::Column::ProductId.eq(product_id))
            .order_by_desc(review::Column::CreatedAt)
            .find_also_related(User)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(r, user)| ReviewView {
                id: r.id,
                product_id: r.product_id,
                user_id: r.user_id,
                user_name: user.map(|u| u.name).unwrap_or_default(),
                rating: r.rating,
                title: r.title,
                description: r.description,
                is_verified_purchase: r.is_verified_purchase,
                created_at: r.created_at,
            })
            .collect())
    }

    /// The caller's own review of a product, if they wrote one.
    #[instrument(skip(self))]
    pub async fn get_user_review(
        &self,
        ctx: &RequestContext,
        product_id: Uuid,
    ) -> Result<Option<ReviewModel>, ServiceError> {
        let user_id = ctx.require_user()?.user_id;
        Ok(Review::find()
            .filter(review::Column::UserId.eq(user_id))
            .filter(review::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?)
    }
}

async fn refresh_product_rating<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<(), ServiceError> {
    let ratings: Vec<i32> = Review::find()
        .filter(review::Column::ProductId.eq(product_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|r| r.rating)
        .collect();

    let (rating, count) = average_rating(&ratings);

    Product::update_many()
        .col_expr(
            product::Column::Rating,
            sea_orm::sea_query::Expr::value(rating),
        )
        .col_expr(
            product::Column::NumReviews,
            sea_orm::sea_query::Expr::value(count),
        )
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;

    Ok(())
}

/// Mean rating to two decimals, with the review count.
pub fn average_rating(ratings: &[i32]) -> (Decimal, i32) {
    if ratings.is_empty() {
        return (round_money(Decimal::ZERO), 0);
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    let count = ratings.len() as i32;
    (
        round_money(Decimal::from(sum) / Decimal::from(count)),
        count,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn average_rounds_to_two_places() {
        assert_eq!(average_rating(&[5, 4, 4]), (dec!(4.33), 3));
        assert_eq!(average_rating(&[5, 4]), (dec!(4.50), 2));
        assert_eq!(average_rating(&[]), (dec!(0.00), 0));
    }

    #[test]
    fn rating_must_be_one_to_five() {
        let input = ReviewInput {
            product_id: Uuid::new_v4(),
            rating: 6,
            title: "Great".into(),
            description: "Fits well".into(),
        };
        let err = ServiceError::from(input.validate().unwrap_err());
        assert_eq!(err.to_string(), "Rating must be between 1 and 5");
    }
}
