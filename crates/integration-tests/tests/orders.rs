//! Order reconciliation after payment.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde_json::Value;
use sneaco_core::{PaymentSessionId, VariantId};
use sneaco_integration_tests::TestApp;
use sneaco_storefront::payments::PaymentSession;

/// Sign in, buy one V9 and return the payment session id.
async fn pay_for_one_court_classic(app: &TestApp) -> String {
    app.sign_in("u-1", "client@sneaco.fr").await;
    app.add_to_cart("V9", 1).await;

    let form = [
        ("email", "client@sneaco.fr"),
        ("address_line1", "12 rue de la Paix"),
        ("city", "Paris"),
        ("postal_code", "75002"),
        ("country", "FR"),
    ];
    let response = app.post_form("/checkout", &form).await;
    assert_eq!(response.status(), 303);
    "cs_test_1".to_owned()
}

// =============================================================================
// Confirmation page
// =============================================================================

#[tokio::test]
async fn test_paid_session_creates_one_order_with_checkout_prices() {
    let app = TestApp::spawn().await;
    let session_id = pay_for_one_court_classic(&app).await;

    let response = app.get(&format!("/order-success?session_id={session_id}")).await;
    assert_eq!(response.status(), 200);
    let html = response.text().await.unwrap();
    assert!(html.contains("Commande confirmée"));
    assert!(html.contains("order-1"));
    assert!(html.contains("49.99 EUR"));

    let orders = app.orders.orders();
    assert_eq!(orders.len(), 1);
    let (_, order) = orders.first().unwrap();
    assert_eq!(order.payment_session_id.as_str(), "cs_test_1");
    assert_eq!(order.total_amount, Decimal::new(4999, 2));
    let item = order.items.first().unwrap();
    assert_eq!(item.variant_id.as_str(), "V9");
    assert_eq!(item.quantity, 1);
    assert_eq!(item.unit_price, Decimal::new(4999, 2));
    assert_eq!(order.shipping_address.as_ref().unwrap()["city"], "Paris");
}

#[tokio::test]
async fn test_reloading_confirmation_keeps_a_single_order() {
    let app = TestApp::spawn().await;
    let session_id = pay_for_one_court_classic(&app).await;
    let path = format!("/order-success?session_id={session_id}");

    let first = app.get(&path).await.text().await.unwrap();
    let second = app.get(&path).await.text().await.unwrap();

    assert_eq!(app.orders.orders().len(), 1);
    assert!(first.contains("order-1"));
    assert!(second.contains("order-1"));
}

#[tokio::test]
async fn test_price_at_purchase_survives_repricing() {
    let app = TestApp::spawn().await;
    let session_id = pay_for_one_court_classic(&app).await;

    app.catalog.set_price(&VariantId::new("V9"), Decimal::new(7999, 2));
    app.get(&format!("/order-success?session_id={session_id}")).await;

    let (_, order) = app.orders.orders().pop().unwrap();
    assert_eq!(order.items.first().unwrap().unit_price, Decimal::new(4999, 2));
}

#[tokio::test]
async fn test_confirmation_empties_the_cart() {
    let app = TestApp::spawn().await;
    let session_id = pay_for_one_court_classic(&app).await;

    app.get(&format!("/order-success?session_id={session_id}")).await;

    let count: Value = app.get("/cart/count").await.json().await.unwrap();
    assert_eq!(count["count"], 0);
}

#[tokio::test]
async fn test_confirmed_cart_stays_empty_when_mirror_lags() {
    let app = TestApp::spawn().await;
    app.carts.lose_deletes();
    let session_id = pay_for_one_court_classic(&app).await;

    app.get(&format!("/order-success?session_id={session_id}")).await;

    for _ in 0..2 {
        let count: Value = app.get("/cart/count").await.json().await.unwrap();
        assert_eq!(count["count"], 0);
    }
}

#[tokio::test]
async fn test_missing_session_reference_goes_back_to_shop() {
    let app = TestApp::spawn().await;

    for path in ["/order-success", "/order-success?session_id=", "/order-success?session_id=%20"] {
        let response = app.get(path).await;
        assert!(response.status().is_redirection(), "{path}");
        assert_eq!(response.headers().get("location").unwrap(), "/products");
    }
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app.get("/order-success?session_id=cs_unknown").await;
    assert_eq!(response.status(), 404);
    assert!(response.text().await.unwrap().contains("Cette commande est introuvable."));
    assert!(app.orders.orders().is_empty());
}

#[tokio::test]
async fn test_session_without_owner_creates_no_order() {
    let app = TestApp::spawn().await;
    app.payments.put_session(PaymentSession {
        id: PaymentSessionId::new("cs_orphan"),
        amount_total: Some(4999),
        currency: Some("eur".to_owned()),
        payment_status: Some("paid".to_owned()),
        customer_details: None,
        shipping_details: None,
        metadata: HashMap::from([("items".to_owned(), r#"[["V9",1,49.99]]"#.to_owned())]),
        line_items: Vec::new(),
    });

    let response = app.get("/order-success?session_id=cs_orphan").await;
    assert_eq!(response.status(), 404);
    assert!(app.orders.orders().is_empty());
}

#[tokio::test]
async fn test_unpaid_session_creates_no_order() {
    let app = TestApp::spawn().await;
    app.payments.put_session(PaymentSession {
        id: PaymentSessionId::new("cs_unpaid"),
        amount_total: Some(4999),
        currency: Some("eur".to_owned()),
        payment_status: Some("unpaid".to_owned()),
        customer_details: None,
        shipping_details: None,
        metadata: HashMap::from([
            ("userId".to_owned(), "u-1".to_owned()),
            ("items".to_owned(), r#"[["V9",1,49.99]]"#.to_owned()),
        ]),
        line_items: Vec::new(),
    });

    let response = app.get("/order-success?session_id=cs_unpaid").await;
    assert_eq!(response.status(), 404);
    assert!(app.orders.orders().is_empty());
}

#[tokio::test]
async fn test_failed_insert_still_confirms_with_session_reference() {
    let app = TestApp::spawn().await;
    let session_id = pay_for_one_court_classic(&app).await;
    app.orders.fail_inserts();

    let response = app.get(&format!("/order-success?session_id={session_id}")).await;
    assert_eq!(response.status(), 200);
    assert!(response.text().await.unwrap().contains("cs_test_1"));
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_history_requires_sign_in() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/orders").await;
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_history_lists_recorded_orders() {
    let app = TestApp::spawn().await;
    let session_id = pay_for_one_court_classic(&app).await;
    app.get(&format!("/order-success?session_id={session_id}")).await;

    let body: Value = app.get("/api/orders").await.json().await.unwrap();
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], "order-1");
    assert_eq!(body[0]["status"], "paid");
    assert_eq!(body[0]["items"][0]["unit_price"], "49.99");
}
