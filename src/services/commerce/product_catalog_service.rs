use crate::{
    common::{page_index, page_size, Page},
    config::CatalogConfig,
    entities::{product, ImageList, Product, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, FromQueryResult,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set,
};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, sync::Arc};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Product catalog: storefront browsing plus admin product management.
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: CatalogConfig,
}

impl ProductCatalogService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: CatalogConfig,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Newest products for the home page
    #[instrument(skip(self))]
    pub async fn get_latest_products(&self) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .order_by_desc(product::Column::CreatedAt)
            .limit(self.config.latest_products_limit)
            .all(&*self.db)
            .await?)
    }

    /// Featured products for the home page carousel
    #[instrument(skip(self))]
    pub async fn get_featured_products(&self) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::IsFeatured.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .limit(self.config.featured_products_limit)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_product_by_slug(&self, slug: &str) -> Result<ProductModel, ServiceError> {
        Product::find()
            .filter(product::Column::Slug.eq(slug))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_product_by_id(&self, id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    /// Filtered, sorted and paginated product search.
    ///
    /// The total is counted over the same filtered query that produces the page.
    #[instrument(skip(self))]
    pub async fn search_products(
        &self,
        query: ProductSearchQuery,
    ) -> Result<Page<ProductModel>, ServiceError> {
        let limit = page_size(query.limit, self.config.page_size);

        let select = apply_sort(
            Product::find().filter(search_condition(&query)?),
            query.sort.as_deref().map(ProductSort::parse).unwrap_or_default(),
        );

        let paginator = select.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page_index(query.page)).await?;

        Ok(Page::new(data, total, limit))
    }

    /// Distinct categories with the number of products in each.
    #[instrument(skip(self))]
    pub async fn get_all_categories(&self) -> Result<Vec<CategoryCount>, ServiceError> {
        Ok(Product::find()
            .select_only()
            .column(product::Column::Category)
            .column_as(Expr::col(product::Column::Id).count(), "count")
            .group_by(product::Column::Category)
            .order_by_asc(product::Column::Category)
            .into_model::<CategoryCount>()
            .all(&*self.db)
            .await?)
    }

    /// Admin: create a product.
    #[instrument(skip(self))]
    pub async fn create_product(&self, input: ProductInput) -> Result<ProductModel, ServiceError> {
        input.validate()?;

        let product_id = Uuid::new_v4();
        let now = Utc::now();

        let product = product::ActiveModel {
            id: Set(product_id),
            name: Set(input.name),
            slug: Set(input.slug),
            category: Set(input.category),
            brand: Set(input.brand),
            description: Set(input.description),
            images: Set(ImageList(input.images)),
            price: Set(input.price),
            stock: Set(input.stock),
            rating: Set(Decimal::ZERO),
            num_reviews: Set(0),
            is_featured: Set(input.is_featured),
            banner: Set(input.banner),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_write(e, "slug"))?;

        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;

        info!("Created product: {}", product_id);
        Ok(product)
    }

    /// Admin: replace a product's editable fields. Rating and review count are kept.
    #[instrument(skip(self))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: ProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;

        let existing = self.get_product_by_id(id).await?;
        let mut product: product::ActiveModel = existing.into();
        product.name = Set(input.name);
        product.slug = Set(input.slug);
        product.category = Set(input.category);
        product.brand = Set(input.brand);
        product.description = Set(input.description);
        product.images = Set(ImageList(input.images));
        product.price = Set(input.price);
        product.stock = Set(input.stock);
        product.is_featured = Set(input.is_featured);
        product.banner = Set(input.banner);
        product.updated_at = Set(Utc::now());

        let product = product
            .update(&*self.db)
            .await
            .map_err(|e| ServiceError::from_write(e, "slug"))?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(id))
            .await;

        info!("Updated product: {}", id);
        Ok(product)
    }

    /// Admin: delete a product
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let product = self.get_product_by_id(id).await?;
        product.delete(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductDeleted(id))
            .await;

        info!("Deleted product: {}", id);
        Ok(())
    }
}

/// Query-string filters for product search. `"all"` disables a text filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductSearchQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    /// Inclusive range written as `"min-max"`, e.g. `"51-100"`.
    pub price: Option<String>,
    pub rating: Option<Decimal>,
    pub sort: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductSort {
    #[default]
    Newest,
    Lowest,
    Highest,
    Rating,
}

impl ProductSort {
    /// Unknown values fall back to newest first.
    pub fn parse(value: &str) -> Self {
        match value {
            "lowest" => Self::Lowest,
            "highest" => Self::Highest,
            "rating" => Self::Rating,
            _ => Self::Newest,
        }
    }
}

fn is_active_filter(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty() && *v != "all")
}

fn search_condition(query: &ProductSearchQuery) -> Result<Condition, ServiceError> {
    let mut condition = Condition::all();

    if let Some(q) = is_active_filter(query.q.as_deref()) {
        condition = condition.add(
            Expr::expr(Func::lower(Expr::col(product::Column::Name)))
                .like(format!("%{}%", q.to_lowercase())),
        );
    }

    if let Some(category) = is_active_filter(query.category.as_deref()) {
        condition = condition.add(product::Column::Category.eq(category));
    }

    if let Some(range) = is_active_filter(query.price.as_deref()) {
        let (min, max) = parse_price_range(range)?;
        condition = condition
            .add(product::Column::Price.gte(min))
            .add(product::Column::Price.lte(max));
    }

    if let Some(rating) = query.rating.filter(|r| *r > Decimal::ZERO) {
        condition = condition.add(product::Column::Rating.gte(rating));
    }

    Ok(condition)
}

/// Parses `"min-max"` into inclusive decimal bounds.
pub fn parse_price_range(range: &str) -> Result<(Decimal, Decimal), ServiceError> {
    let invalid = || ServiceError::ValidationError(format!("Invalid price range: {}", range));

    let (min, max) = range.split_once('-').ok_or_else(invalid)?;
    let min = Decimal::from_str(min.trim()).map_err(|_| invalid())?;
    let max = Decimal::from_str(max.trim()).map_err(|_| invalid())?;
    if min > max {
        return Err(invalid());
    }
    Ok((min, max))
}

fn apply_sort(select: Select<Product>, sort: ProductSort) -> Select<Product> {
    match sort {
        ProductSort::Newest => select.order_by_desc(product::Column::CreatedAt),
        ProductSort::Lowest => select.order_by_asc(product::Column::Price),
        ProductSort::Highest => select.order_by_desc(product::Column::Price),
        ProductSort::Rating => select.order_by_desc(product::Column::Rating),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromQueryResult)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

/// Admin product form.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    #[validate(length(min = 3, message = "Name must be at least 3 characters"))]
    pub name: String,
    #[validate(length(min = 3, message = "Slug must be at least 3 characters"))]
    pub slug: String,
    #[validate(length(min = 3, message = "Category must be at least 3 characters"))]
    pub category: String,
    #[validate(length(min = 3, message = "Brand must be at least 3 characters"))]
    pub brand: String,
    #[validate(length(min = 3, message = "Description must be at least 3 characters"))]
    pub description: String,
    #[validate(length(min = 1, message = "Product must have at least one image"))]
    pub images: Vec<String>,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(range(min = 0, message = "Stock must not be negative"))]
    pub stock: i32,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub banner: Option<String>,
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        let mut err = ValidationError::new("price");
        err.message = Some("Price must not be negative".into());
        return Err(err);
    }
    if price.normalize().scale() > 2 {
        let mut err = ValidationError::new("price");
        err.message = Some("Price must have exactly two decimal places".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input() -> ProductInput {
        ProductInput {
            name: "Polo Sporting Stretch Shirt".into(),
            slug: "polo-sporting-stretch-shirt".into(),
            category: "Men's Dress Shirts".into(),
            brand: "Polo".into(),
            description: "Classic polo style".into(),
            images: vec!["/images/p1-1.jpg".into()],
            price: dec!(59.99),
            stock: 5,
            is_featured: false,
            banner: None,
        }
    }

    #[test]
    fn price_range_parses_inclusive_bounds() {
        assert_eq!(parse_price_range("51-100").unwrap(), (dec!(51), dec!(100)));
        assert!(parse_price_range("100").is_err());
        assert!(parse_price_range("100-50").is_err());
        assert!(parse_price_range("a-b").is_err());
    }

    #[test]
    fn unknown_sort_falls_back_to_newest() {
        assert_eq!(ProductSort::parse("highest"), ProductSort::Highest);
        assert_eq!(ProductSort::parse("bogus"), ProductSort::Newest);
    }

    #[test]
    fn product_input_rules() {
        assert!(input().validate().is_ok());

        let mut bad = input();
        bad.images.clear();
        bad.price = dec!(1.999);
        let err = ServiceError::from(bad.validate().unwrap_err());
        let message = err.to_string();
        assert!(message.contains("Product must have at least one image"));
        assert!(message.contains("Price must have exactly two decimal places"));

        let mut negative = input();
        negative.stock = -1;
        assert!(negative.validate().is_err());
    }

    #[test]
    fn all_disables_text_filters() {
        assert_eq!(is_active_filter(Some("all")), None);
        assert_eq!(is_active_filter(Some(" ")), None);
        assert_eq!(is_active_filter(Some("shirt")), Some("shirt"));
    }
}
