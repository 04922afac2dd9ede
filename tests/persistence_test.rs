use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use storefront_api::{
    db::{self, DbConfig},
    entities::{product, ImageList, Product},
    errors::ServiceError,
};
use tempfile::TempDir;
use uuid::Uuid;

async fn connect(dir: &TempDir) -> sea_orm::DatabaseConnection {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("shop.db").display());
    db::establish_connection_with_config(&DbConfig {
        url,
        max_connections: 1,
        ..Default::default()
    })
    .await
    .expect("connect to file database")
}

fn product(slug: &str) -> product::ActiveModel {
    let now = Utc::now();
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Polo Shirt".to_string()),
        slug: Set(slug.to_string()),
        category: Set("Shirts".to_string()),
        brand: Set("Polo".to_string()),
        description: Set("Classic fit".to_string()),
        images: Set(ImageList(vec!["/images/polo.jpg".to_string()])),
        price: Set(dec!(59.99)),
        stock: Set(3),
        rating: Set(Decimal::ZERO),
        num_reviews: Set(0),
        is_featured: Set(false),
        banner: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

#[tokio::test]
async fn migrations_are_repeatable_and_data_survives_reconnect() {
    let dir = TempDir::new().unwrap();

    let first = connect(&dir).await;
    db::run_migrations(&first).await.unwrap();
    let saved = product("polo-shirt").insert(&first).await.unwrap();
    first.close().await.unwrap();

    let second = connect(&dir).await;
    db::run_migrations(&second).await.unwrap();
    db::check_connection(&second).await.unwrap();

    let loaded = Product::find_by_id(saved.id)
        .one(&second)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.price, dec!(59.99));
    assert_eq!(loaded.images.0, vec!["/images/polo.jpg".to_string()]);
}

#[tokio::test]
async fn slug_uniqueness_is_enforced_by_the_store() {
    let dir = TempDir::new().unwrap();
    let conn = connect(&dir).await;
    db::run_migrations(&conn).await.unwrap();

    product("sun-hat").insert(&conn).await.unwrap();
    let err = product("sun-hat")
        .insert(&conn)
        .await
        .map_err(|e| ServiceError::from_write(e, "slug"))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(ref msg) if msg == "Slug already exists"));
}
