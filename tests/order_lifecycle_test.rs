mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::{response_json, signed_in, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use storefront_api::{
    entities::{order_item, OrderItem, PaymentMethod, UserRole},
    errors::ServiceError,
};

#[tokio::test]
async fn delivery_requires_payment_and_happens_once() {
    let app = TestApp::new().await;
    let admin = app.seed_user("admin@example.com", UserRole::Admin).await;
    let customer = app.seed_customer("deliver@example.com", PaymentMethod::PayPal).await;
    let shirt = app.seed_product("Polo Shirt", dec!(20.00), 5).await;
    let order_id = app.place_order(&signed_in(&customer), &[(&shirt, 1)]).await;
    let payments = &app.services().payments;

    let err = payments
        .mark_delivered(&signed_in(&admin), order_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotPaid);

    payments.mark_paid(order_id, None).await.unwrap();

    let err = payments
        .mark_delivered(&signed_in(&customer), order_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let delivered = payments
        .mark_delivered(&signed_in(&admin), order_id)
        .await
        .unwrap();
    assert!(delivered.is_paid);
    assert!(delivered.is_delivered);
    assert!(delivered.delivered_at.is_some());

    let err = payments
        .mark_delivered(&signed_in(&admin), order_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(ref msg) if msg == "Order is already delivered");
}

#[tokio::test]
async fn deliver_over_http_answers_not_paid() {
    let app = TestApp::new().await;
    let admin = app.seed_user("admin@example.com", UserRole::Admin).await;
    let customer = app.seed_customer("http@example.com", PaymentMethod::CashOnDelivery).await;
    let shirt = app.seed_product("Polo Shirt", dec!(20.00), 5).await;
    let order_id = app.place_order(&signed_in(&customer), &[(&shirt, 1)]).await;
    let token = app.token_for(&admin);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/admin/orders/{}/delivered", order_id),
            None,
            Some(&token),
            None,
        )
        .await;
    let (status, body) = response_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Order is not paid yet");
}

#[tokio::test]
async fn customers_only_see_their_own_orders() {
    let app = TestApp::new().await;
    let admin = app.seed_user("admin@example.com", UserRole::Admin).await;
    let alice = app.seed_customer("alice@example.com", PaymentMethod::PayPal).await;
    let bob = app.seed_customer("bob@example.com", PaymentMethod::PayPal).await;
    let shirt = app.seed_product("Polo Shirt", dec!(20.00), 10).await;

    let alice_order = app.place_order(&signed_in(&alice), &[(&shirt, 1)]).await;
    app.place_order(&signed_in(&bob), &[(&shirt, 2)]).await;

    let orders = &app.services().orders;
    let err = orders
        .get_order(&signed_in(&bob), alice_order)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let seen_by_admin = orders
        .get_order(&signed_in(&admin), alice_order)
        .await
        .unwrap();
    assert_eq!(seen_by_admin.user.email, "alice@example.com");
    assert_eq!(seen_by_admin.items.len(), 1);

    let mine = orders
        .get_my_orders(&signed_in(&alice), None, None)
        .await
        .unwrap();
    assert_eq!(mine.total, 1);
    assert_eq!(mine.data[0].id, alice_order);
}

#[tokio::test]
async fn my_orders_are_paginated_newest_first() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("many@example.com", PaymentMethod::PayPal).await;
    let ctx = signed_in(&customer);
    let shirt = app.seed_product("Polo Shirt", dec!(20.00), 50).await;

    let mut placed = Vec::new();
    for _ in 0..3 {
        placed.push(app.place_order(&ctx, &[(&shirt, 1)]).await);
    }

    let first = app
        .services()
        .orders
        .get_my_orders(&ctx, Some(1), Some(2))
        .await
        .unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.total_pages, 2);
    assert_eq!(first.data.len(), 2);
    assert_eq!(first.data[0].id, placed[2]);

    let second = app
        .services()
        .orders
        .get_my_orders(&ctx, Some(2), Some(2))
        .await
        .unwrap();
    assert_eq!(second.data.len(), 1);
    assert_eq!(second.data[0].id, placed[0]);
}

#[tokio::test]
async fn admin_lists_filters_and_summarizes_orders() {
    let app = TestApp::new().await;
    let admin = app.seed_user("admin@example.com", UserRole::Admin).await;
    let alice = app.seed_customer("alice@example.com", PaymentMethod::PayPal).await;
    let bob = app.seed_customer("bob@example.com", PaymentMethod::PayPal).await;
    let shirt = app.seed_product("Polo Shirt", dec!(20.00), 10).await;

    let alice_order = app.place_order(&signed_in(&alice), &[(&shirt, 1)]).await;
    app.place_order(&signed_in(&bob), &[(&shirt, 1)]).await;

    let all = app
        .services()
        .orders
        .list_orders(None, None, None)
        .await
        .unwrap();
    assert_eq!(all.total, 2);

    let filtered = app
        .services()
        .orders
        .list_orders(None, None, Some("ALI".to_string()))
        .await
        .unwrap();
    assert_eq!(filtered.total, 1);
    assert_eq!(filtered.data[0].id, alice_order);
    assert_eq!(filtered.data[0].user_name, "alice");

    let summary = app.services().orders.orders_summary().await.unwrap();
    assert_eq!(summary.orders_count, 2);
    assert_eq!(summary.products_count, 1);
    assert_eq!(summary.users_count, 3);
    assert_eq!(summary.total_sales, dec!(66.00));
    assert_eq!(summary.sales_data.len(), 1);
    assert_eq!(summary.sales_data[0].total_sales, dec!(66.00));
    assert_eq!(summary.latest_orders.len(), 2);

    let token = app.token_for(&admin);
    let response = app
        .request(Method::GET, "/api/v1/admin/orders/summary", None, Some(&token), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let customer_token = app.token_for(&alice);
    let response = app
        .request(
            Method::GET,
            "/api/v1/admin/orders",
            None,
            Some(&customer_token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn deleting_an_order_removes_its_items() {
    let app = TestApp::new().await;
    let admin = app.seed_user("admin@example.com", UserRole::Admin).await;
    let customer = app.seed_customer("gone@example.com", PaymentMethod::PayPal).await;
    let shirt = app.seed_product("Polo Shirt", dec!(20.00), 5).await;
    let order_id = app.place_order(&signed_in(&customer), &[(&shirt, 1)]).await;

    let token = app.token_for(&admin);
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/admin/orders/{}", order_id),
            None,
            Some(&token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let remaining = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(remaining, 0);

    let err = app
        .services()
        .orders
        .delete_order(order_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn order_items_keep_cart_order() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("ordered@example.com", PaymentMethod::PayPal).await;
    let ctx = signed_in(&customer);
    let zebra = app.seed_product("Zebra Tee", dec!(12.00), 5).await;
    let mango = app.seed_product("Mango Socks", dec!(4.00), 5).await;
    let apple = app.seed_product("Apple Cap", dec!(9.00), 5).await;
    let order_id = app
        .place_order(&ctx, &[(&zebra, 1), (&mango, 2), (&apple, 1)])
        .await;

    let details = app.services().orders.get_order(&ctx, order_id).await.unwrap();
    let names: Vec<_> = details.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["Zebra Tee", "Mango Socks", "Apple Cap"]);
    assert_eq!(details.items[1].qty, 2);
}

#[tokio::test]
async fn huge_page_numbers_return_an_empty_page() {
    let app = TestApp::new().await;
    let admin = app.seed_user("admin@example.com", UserRole::Admin).await;
    let customer = app.seed_customer("pages@example.com", PaymentMethod::PayPal).await;
    let shirt = app.seed_product("Polo Shirt", dec!(20.00), 5).await;
    app.place_order(&signed_in(&customer), &[(&shirt, 1)]).await;

    let mine = app
        .services()
        .orders
        .get_my_orders(&signed_in(&customer), Some(u64::MAX), Some(u64::MAX))
        .await
        .unwrap();
    assert_eq!(mine.total, 1);
    assert!(mine.data.is_empty());

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/admin/orders?page={}", u64::MAX),
            None,
            Some(&app.token_for(&admin)),
            None,
        )
        .await;
    let (status, body) = response_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["data"].as_array().unwrap().len(), 0);
}
