//! Local-first cart: stock clamping, line uniqueness, mirroring.

#![allow(clippy::unwrap_used)]

use serde_json::{Value, json};
use sneaco_core::cart::CartLine;
use sneaco_core::{UserId, VariantId};
use sneaco_integration_tests::{TestApp, eventually};
use sneaco_storefront::models::CartOwner;

async fn cart(app: &TestApp) -> Value {
    app.get("/cart").await.json().await.unwrap()
}

// =============================================================================
// Adding
// =============================================================================

#[tokio::test]
async fn test_add_is_clamped_to_stock() {
    let app = TestApp::spawn().await;

    let first: Value = app.add_to_cart("V9", 2).await.json().await.unwrap();
    assert_eq!(first["quantity"], 2);

    // V9 has 3 in stock
    let response = app.add_to_cart("V9", 2).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("HX-Trigger").unwrap(),
        "cart-updated, cart-open"
    );
    let second: Value = response.json().await.unwrap();
    assert_eq!(second["quantity"], 3);
    assert_eq!(second["count"], 3);
    assert_eq!(second["drawer_open"], true);
}

#[tokio::test]
async fn test_same_variant_keeps_a_single_line() {
    let app = TestApp::spawn().await;

    app.add_to_cart("V11", 1).await;
    app.add_to_cart("T1", 1).await;
    app.add_to_cart("V11", 1).await;

    let body = cart(&app).await;
    assert_eq!(body["lines"].as_array().unwrap().len(), 2);
    assert_eq!(body["lines"][0]["variant_id"], "V11");
    assert_eq!(body["lines"][0]["quantity"], 2);
    assert_eq!(body["lines"][1]["variant_id"], "T1");
    assert_eq!(body["count"], 3);
    assert_eq!(body["subtotal"], "198.98");
}

#[tokio::test]
async fn test_add_defaults_to_one_unit() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json("/cart/add", &json!({ "variant_id": "T1" }))
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["quantity"], 1);
}

#[tokio::test]
async fn test_sold_out_variant_cannot_be_added() {
    let app = TestApp::spawn().await;

    let response = app.add_to_cart("V10", 1).await;
    assert_eq!(response.status(), 400);

    let count: Value = app.get("/cart/count").await.json().await.unwrap();
    assert_eq!(count["count"], 0);
}

#[tokio::test]
async fn test_zero_quantity_and_unknown_variant_are_rejected() {
    let app = TestApp::spawn().await;

    assert_eq!(app.add_to_cart("V9", 0).await.status(), 400);
    assert_eq!(app.add_to_cart("NOPE", 1).await.status(), 404);
}

#[tokio::test]
async fn test_negative_quantity_is_a_cart_error() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json("/cart/add", &json!({ "variant_id": "V9", "quantity": -2 }))
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());

    let count: Value = app.get("/cart/count").await.json().await.unwrap();
    assert_eq!(count["count"], 0);
}

// =============================================================================
// Updating and removing
// =============================================================================

#[tokio::test]
async fn test_quantity_updates_are_clamped_between_one_and_stock() {
    let app = TestApp::spawn().await;
    app.add_to_cart("V9", 2).await;

    let response = app
        .post_json("/cart/update", &json!({ "variant_id": "V9", "quantity": 0 }))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("HX-Trigger").unwrap(), "cart-updated");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["quantity"], 1);

    let body: Value = app
        .post_json("/cart/update", &json!({ "variant_id": "V9", "quantity": 99 }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["quantity"], 3);
}

#[tokio::test]
async fn test_update_drops_line_whose_stock_ran_out() {
    let app = TestApp::spawn().await;
    app.add_to_cart("V9", 2).await;
    app.catalog.set_stock(&VariantId::new("V9"), 0);

    let body: Value = app
        .post_json("/cart/update", &json!({ "variant_id": "V9", "quantity": 2 }))
        .await
        .json()
        .await
        .unwrap();
    assert!(body["quantity"].is_null());
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_update_or_remove_of_missing_line_is_not_found() {
    let app = TestApp::spawn().await;

    let update = app
        .post_json("/cart/update", &json!({ "variant_id": "V9", "quantity": 1 }))
        .await;
    assert_eq!(update.status(), 404);

    let remove = app
        .post_json("/cart/remove", &json!({ "variant_id": "V9" }))
        .await;
    assert_eq!(remove.status(), 404);
}

#[tokio::test]
async fn test_remove_and_clear() {
    let app = TestApp::spawn().await;
    app.add_to_cart("V9", 1).await;
    app.add_to_cart("T1", 1).await;

    let body: Value = app
        .post_json("/cart/remove", &json!({ "variant_id": "V9" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 1);

    let body: Value = app.post_json("/cart/clear", &json!({})).await.json().await.unwrap();
    assert_eq!(body["count"], 0);
    assert!(cart(&app).await["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_carts_are_per_session() {
    let app = TestApp::spawn().await;
    app.add_to_cart("V9", 1).await;

    let other = reqwest::Client::new();
    let body: Value = other
        .get(app.url("/cart/count"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 0);
}

// =============================================================================
// Remote mirror
// =============================================================================

#[tokio::test]
async fn test_signed_in_cart_is_mirrored() {
    let app = TestApp::spawn().await;
    app.sign_in("u-1", "client@sneaco.fr").await;

    app.add_to_cart("V11", 2).await;

    let carts = app.carts.clone();
    eventually(move || {
        carts.lines("user:u-1")
            == vec![CartLine {
                variant_id: VariantId::new("V11"),
                quantity: 2,
            }]
    })
    .await;
}

#[tokio::test]
async fn test_empty_cart_adopts_mirrored_lines_after_sign_in() {
    let app = TestApp::spawn().await;
    app.carts.put(
        &CartOwner::User(UserId::new("u-2")),
        vec![CartLine {
            variant_id: VariantId::new("T1"),
            quantity: 2,
        }],
    );

    app.sign_in("u-2", "retour@sneaco.fr").await;

    let body = cart(&app).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["lines"][0]["name"], "Trail Runner");
}

#[tokio::test]
async fn test_sign_in_adoption_is_clamped_to_stock() {
    let app = TestApp::spawn().await;
    app.carts.put(
        &CartOwner::User(UserId::new("u-3")),
        vec![
            CartLine {
                variant_id: VariantId::new("V9"),
                quantity: 5,
            },
            CartLine {
                variant_id: VariantId::new("V10"),
                quantity: 1,
            },
        ],
    );

    app.sign_in("u-3", "stock@sneaco.fr").await;

    // V9 has 3 in stock, V10 is sold out
    let body = cart(&app).await;
    assert_eq!(body["lines"].as_array().unwrap().len(), 1);
    assert_eq!(body["lines"][0]["variant_id"], "V9");
    assert_eq!(body["lines"][0]["quantity"], 3);
}

#[tokio::test]
async fn test_cleared_cart_stays_empty_when_mirror_lags() {
    let app = TestApp::spawn().await;
    app.carts.put(
        &CartOwner::User(UserId::new("u-4")),
        vec![CartLine {
            variant_id: VariantId::new("T1"),
            quantity: 1,
        }],
    );
    app.carts.lose_deletes();
    app.sign_in("u-4", "lent@sneaco.fr").await;
    assert_eq!(cart(&app).await["count"], 1);

    let body: Value = app.post_json("/cart/clear", &json!({})).await.json().await.unwrap();
    assert_eq!(body["count"], 0);

    for _ in 0..3 {
        let count: Value = app.get("/cart/count").await.json().await.unwrap();
        assert_eq!(count["count"], 0);
    }
    assert!(cart(&app).await["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_removing_last_line_stays_removed_when_mirror_lags() {
    let app = TestApp::spawn().await;
    app.carts.lose_deletes();
    app.sign_in("u-5", "lent@sneaco.fr").await;
    app.add_to_cart("V11", 1).await;

    let carts = app.carts.clone();
    eventually(move || !carts.lines("user:u-5").is_empty()).await;

    let body: Value = app
        .post_json("/cart/remove", &json!({ "variant_id": "V11" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 0);

    let count: Value = app.get("/cart/count").await.json().await.unwrap();
    assert_eq!(count["count"], 0);
}
