mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::{response_json, signed_in, TestApp};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use serde_json::json;
use storefront_api::{
    auth::RequestContext,
    entities::{Product, UserRole},
    errors::ServiceError,
    services::commerce::review_service::ReviewInput,
};
use uuid::Uuid;

fn review(product_id: Uuid, rating: i32, title: &str) -> ReviewInput {
    ReviewInput {
        product_id,
        rating,
        title: title.to_string(),
        description: "Fits as expected".to_string(),
    }
}

#[tokio::test]
async fn reviews_refresh_product_rating() {
    let app = TestApp::new().await;
    let shirt = app.seed_product("Polo Shirt", dec!(20.00), 5).await;
    let ann = app.seed_user("ann@example.com", UserRole::User).await;
    let ben = app.seed_user("ben@example.com", UserRole::User).await;
    let reviews = &app.services().reviews;

    reviews
        .create_or_update_review(&signed_in(&ann), review(shirt.id, 5, "Great shirt"))
        .await
        .unwrap();
    reviews
        .create_or_update_review(&signed_in(&ben), review(shirt.id, 4, "Nice"))
        .await
        .unwrap();

    let product = Product::find_by_id(shirt.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.num_reviews, 2);
    assert_eq!(product.rating, dec!(4.50));

    let listed = reviews.get_product_reviews(shirt.id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().any(|r| r.user_name == "ann"));
}

#[tokio::test]
async fn second_review_from_same_user_replaces_the_first() {
    let app = TestApp::new().await;
    let shirt = app.seed_product("Polo Shirt", dec!(20.00), 5).await;
    let ann = app.seed_user("ann@example.com", UserRole::User).await;
    let ctx = signed_in(&ann);
    let reviews = &app.services().reviews;

    let first = reviews
        .create_or_update_review(&ctx, review(shirt.id, 2, "Too small"))
        .await
        .unwrap();
    let second = reviews
        .create_or_update_review(&ctx, review(shirt.id, 4, "Better after washing"))
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.title, "Better after washing");

    let mine = reviews.get_user_review(&ctx, shirt.id).await.unwrap().unwrap();
    assert_eq!(mine.rating, 4);

    let product = Product::find_by_id(shirt.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.num_reviews, 1);
    assert_eq!(product.rating, dec!(4.00));
}

#[tokio::test]
async fn reviews_require_sign_in_and_a_real_product() {
    let app = TestApp::new().await;
    let shirt = app.seed_product("Polo Shirt", dec!(20.00), 5).await;
    let reviews = &app.services().reviews;

    let err = reviews
        .create_or_update_review(
            &RequestContext::anonymous("guest"),
            review(shirt.id, 5, "Great"),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Unauthorized(_));

    let ann = app.seed_user("ann@example.com", UserRole::User).await;
    let err = reviews
        .create_or_update_review(&signed_in(&ann), review(Uuid::new_v4(), 5, "Great"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(ref msg) if msg == "Product not found");

    assert!(reviews
        .get_user_review(&signed_in(&ann), shirt.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn review_over_http_uses_the_path_product() {
    let app = TestApp::new().await;
    let shirt = app.seed_product("Polo Shirt", dec!(20.00), 5).await;
    let ann = app.seed_user("ann@example.com", UserRole::User).await;
    let token = app.token_for(&ann);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/products/{}/reviews", shirt.id),
            Some(json!({
                "productId": Uuid::new_v4(),
                "rating": 3,
                "title": "Okay",
                "description": "Average fabric"
            })),
            Some(&token),
            None,
        )
        .await;
    let (status, body) = response_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Review updated successfully");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/products/{}/reviews", shirt.id),
            Some(json!({
                "productId": shirt.id,
                "rating": 0,
                "title": "Bad",
                "description": "Rating out of range"
            })),
            Some(&token),
            None,
        )
        .await;
    let (status, body) = response_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Rating must be between 1 and 5");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/{}/reviews", shirt.id),
            None,
            None,
            None,
        )
        .await;
    let (status, body) = response_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["rating"], 3);
}
