mod common;

use assert_matches::assert_matches;
use axum::http::{header, Method, StatusCode};
use common::{response_json, signed_in, TestApp, PASSWORD};
use rstest::rstest;
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::{
    auth::RequestContext,
    entities::{PaymentMethod, UserRole},
    errors::ServiceError,
    services::commerce::customer_service::{SignInInput, SignUpInput, UpdateUserInput},
};

fn sign_up_input(email: &str, password: &str, confirm: &str) -> SignUpInput {
    SignUpInput {
        name: "New Customer".to_string(),
        email: email.to_string(),
        password: password.to_string(),
        confirm_password: confirm.to_string(),
        callback_url: Some("/shipping-address".to_string()),
    }
}

#[tokio::test]
async fn sign_up_signs_in_and_rejects_duplicates() {
    let app = TestApp::new().await;
    let customer = &app.services().customer;
    let ctx = RequestContext::anonymous("fresh");

    let nav = customer
        .sign_up(&ctx, sign_up_input("new@example.com", PASSWORD, PASSWORD))
        .await
        .unwrap();
    assert_eq!(nav.location, "/shipping-address");
    assert!(nav.set_cookie.unwrap().starts_with("auth_token="));

    let err = customer
        .sign_up(&ctx, sign_up_input("new@example.com", PASSWORD, PASSWORD))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(ref msg) if msg == "Email already exists");

    let err = customer
        .sign_up(&ctx, sign_up_input("other@example.com", PASSWORD, "different"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(ref msg) if msg == "Passwords don't match");
}

#[rstest]
#[case("known@example.com", "wrong-password")]
#[case("unknown@example.com", PASSWORD)]
#[case("not-an-email", PASSWORD)]
#[tokio::test]
async fn bad_credentials_share_one_message(#[case] email: &str, #[case] password: &str) {
    let app = TestApp::new().await;
    app.seed_user("known@example.com", UserRole::User).await;

    let err = app
        .services()
        .customer
        .sign_in(
            &RequestContext::anonymous("guest"),
            SignInInput {
                email: email.to_string(),
                password: password.to_string(),
                callback_url: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Unauthorized(ref msg) if msg == "Invalid email or password");
}

#[tokio::test]
async fn off_site_callback_falls_back_to_home() {
    let app = TestApp::new().await;
    app.seed_user("redirect@example.com", UserRole::User).await;

    let nav = app
        .services()
        .customer
        .sign_in(
            &RequestContext::anonymous("guest"),
            SignInInput {
                email: "redirect@example.com".to_string(),
                password: PASSWORD.to_string(),
                callback_url: Some("https://evil.example.com".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(nav.location, "/");
}

#[tokio::test]
async fn disabled_payment_method_is_refused() {
    let mut cfg = common::test_config();
    cfg.payment_methods.enabled = vec![PaymentMethod::PayPal];
    let app = TestApp::with_config(cfg).await;
    let user = app.seed_user("pay@example.com", UserRole::User).await;

    let err = app
        .services()
        .customer
        .update_payment_method(&signed_in(&user), PaymentMethod::Stripe)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(ref msg) if msg == "Invalid payment method");

    let saved = app
        .services()
        .customer
        .update_payment_method(&signed_in(&user), PaymentMethod::PayPal)
        .await
        .unwrap();
    assert_eq!(saved.payment_method, Some(PaymentMethod::PayPal));
}

#[tokio::test]
async fn profile_over_http_hides_the_password_hash() {
    let app = TestApp::new().await;
    let user = app.seed_user("me@example.com", UserRole::User).await;
    let token = app.token_for(&user);

    let response = app
        .request(Method::GET, "/api/v1/me", None, Some(&token), None)
        .await;
    let (status, body) = response_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "me@example.com");
    assert!(body["data"].get("passwordHash").is_none());

    let response = app
        .request(Method::GET, "/api/v1/me", None, Some("not-a-token"), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sign_out_clears_the_cookie() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::POST, "/api/v1/auth/sign-out", None, None, None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn sign_up_over_http_validates_input() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/sign-up",
            Some(json!({
                "name": "Al",
                "email": "short@example.com",
                "password": PASSWORD,
                "confirmPassword": PASSWORD
            })),
            None,
            Some("signup-session"),
        )
        .await;
    let (status, body) = response_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Name must be at least 3 characters");
}

#[tokio::test]
async fn admin_manages_users() {
    let app = TestApp::new().await;
    app.seed_user("admin@example.com", UserRole::Admin).await;
    let carol = app.seed_user("carol@example.com", UserRole::User).await;
    app.seed_user("dave@example.com", UserRole::User).await;
    let customer = &app.services().customer;

    let all = customer.list_users(None, None).await.unwrap();
    assert_eq!(all.total, 3);

    let filtered = customer
        .list_users(None, Some("CAR".to_string()))
        .await
        .unwrap();
    assert_eq!(filtered.total, 1);
    assert_eq!(filtered.data[0].id, carol.id);

    let promoted = customer
        .update_user(
            carol.id,
            UpdateUserInput {
                name: "Carol Admin".to_string(),
                role: UserRole::Admin,
            },
        )
        .await
        .unwrap();
    assert_eq!(promoted.role, UserRole::Admin);
    assert_eq!(promoted.name, "Carol Admin");

    customer.delete_user(carol.id).await.unwrap();
    assert_eq!(customer.count_users().await.unwrap(), 2);
    assert_matches!(
        customer.get_user(carol.id).await.unwrap_err(),
        ServiceError::NotFound(_)
    );
}

#[tokio::test]
async fn deleting_a_user_removes_their_orders() {
    let app = TestApp::new().await;
    let admin = app.seed_user("admin@example.com", UserRole::Admin).await;
    let buyer = app
        .seed_customer("leaving@example.com", PaymentMethod::PayPal)
        .await;
    let shirt = app.seed_product("Polo Shirt", dec!(20.00), 5).await;
    let order_id = app.place_order(&signed_in(&buyer), &[(&shirt, 1)]).await;

    let token = app.token_for(&admin);
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/admin/users/{}", buyer.id),
            None,
            Some(&token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let err = app
        .services()
        .orders
        .get_order(&signed_in(&admin), order_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn profile_rename_over_http() {
    let app = TestApp::new().await;
    let user = app.seed_user("rename@example.com", UserRole::User).await;
    let token = app.token_for(&user);

    let response = app
        .request(
            Method::PUT,
            "/api/v1/me",
            Some(json!({ "name": "Renamed Customer" })),
            Some(&token),
            None,
        )
        .await;
    let (status, body) = response_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Renamed Customer");

    let stored = app.services().customer.get_user(user.id).await.unwrap();
    assert_eq!(stored.name, "Renamed Customer");
}
