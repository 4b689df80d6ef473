//! Integration tests for checkout.
//!
//! These run the full cart-to-order flow against the in-memory store and
//! check stock, totals, cart state and confirmation emails.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use bazaar_core::{OrderStatus, Principal, ProductId, Role, UserId};
use bazaar_integration_tests::{RecordingMailer, Shop, TestApp, create_user, price_of, stock_of};
use bazaar_storefront::error::StorefrontError;
use bazaar_storefront::models::ProductUpdate;

// =============================================================================
// Happy Path
// =============================================================================

#[tokio::test]
async fn test_checkout_creates_order_and_empties_cart() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "5.00", 10).await;
    let b = shop.product(app.store(), "Matcha", "3.00", 1).await;

    let carts = app.state.carts();
    carts.add_item(&shop.customer, a.id, 2).await.unwrap();
    carts.add_item(&shop.customer, b.id, 1).await.unwrap();

    let order = app.state.checkout().checkout(&shop.customer).await.unwrap();

    assert_eq!(order.owner, shop.customer.id);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_price, price_of("13.00"));
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.items[0].product_id, Some(a.id));
    assert_eq!(order.items[0].quantity, 2);
    assert_eq!(order.items[0].price, price_of("5.00"));
    assert_eq!(order.items[1].product_id, Some(b.id));
    assert_eq!(order.items[1].quantity, 1);
    assert_eq!(order.items[1].price, price_of("3.00"));
    assert_eq!(order.items_total(), order.total_price);

    assert_eq!(stock_of(app.store(), a.id).await, 8);
    assert_eq!(stock_of(app.store(), b.id).await, 0);
    assert!(carts.cart(&shop.customer).await.unwrap().is_empty());

    let stored = app.state.orders().get_order(&shop.customer, order.id).await.unwrap();
    assert_eq!(stored, order);
}

#[tokio::test]
async fn test_adding_same_product_accumulates_quantity() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;

    let carts = app.state.carts();
    carts.add_item(&shop.customer, a.id, 2).await.unwrap();
    let cart = carts.add_item(&shop.customer, a.id, 3).await.unwrap();

    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 5);

    let order = app.state.checkout().checkout(&shop.customer).await.unwrap();
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].quantity, 5);
    assert_eq!(order.total_price, price_of("12.50"));
    assert_eq!(stock_of(app.store(), a.id).await, 5);
}

#[tokio::test]
async fn test_order_keeps_price_snapshot() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "10.00", 10).await;

    app.state.carts().add_item(&shop.customer, a.id, 1).await.unwrap();
    let order = app.state.checkout().checkout(&shop.customer).await.unwrap();

    app.state
        .catalog()
        .update_product(
            &shop.seller,
            a.id,
            ProductUpdate {
                price: Some(price_of("20.00")),
                ..ProductUpdate::default()
            },
        )
        .await
        .unwrap();

    let stored = app.state.orders().get_order(&shop.customer, order.id).await.unwrap();
    assert_eq!(stored.total_price, price_of("10.00"));
    assert_eq!(stored.items[0].price, price_of("10.00"));

    app.state.catalog().delete_product(&shop.seller, a.id).await.unwrap();
    let stored = app.state.orders().get_order(&shop.customer, order.id).await.unwrap();
    assert_eq!(stored.items[0].price, price_of("10.00"));
    assert_eq!(stored.items[0].product_id, None);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_empty_cart_is_rejected() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;

    let err = app.state.checkout().checkout(&shop.customer).await.unwrap_err();
    assert!(matches!(err, StorefrontError::EmptyCart));
    assert!(app.state.orders().list_orders(&shop.customer).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_total_beyond_price_range_writes_nothing() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Gyokuro", "99999999.99", 10).await;

    app.state.carts().add_item(&shop.customer, a.id, 5).await.unwrap();
    let err = app.state.checkout().checkout(&shop.customer).await.unwrap_err();

    assert!(matches!(err, StorefrontError::Validation { field: "total_price", .. }));
    assert_eq!(stock_of(app.store(), a.id).await, 10);
    assert_eq!(app.state.carts().cart(&shop.customer).await.unwrap().items[0].quantity, 5);
    assert!(app.state.orders().list_orders(&shop.customer).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_short_stock_writes_nothing() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;
    let b = shop.product(app.store(), "Matcha", "4.00", 5).await;
    let c = shop.product(app.store(), "Hojicha", "3.00", 4).await;

    let carts = app.state.carts();
    carts.add_item(&shop.customer, a.id, 2).await.unwrap();
    carts.add_item(&shop.customer, b.id, 1).await.unwrap();
    carts.add_item(&shop.customer, c.id, 4).await.unwrap();

    // Someone else buys C down to 1 after it went into the cart.
    app.state
        .catalog()
        .update_product(
            &shop.seller,
            c.id,
            ProductUpdate {
                stock: Some(1),
                ..ProductUpdate::default()
            },
        )
        .await
        .unwrap();

    let err = app.state.checkout().checkout(&shop.customer).await.unwrap_err();
    match err {
        StorefrontError::InsufficientStock {
            product_id,
            requested,
            available,
        } => {
            assert_eq!(product_id, c.id);
            assert_eq!(requested, 4);
            assert_eq!(available, 1);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    assert_eq!(stock_of(app.store(), a.id).await, 10);
    assert_eq!(stock_of(app.store(), b.id).await, 5);
    assert_eq!(stock_of(app.store(), c.id).await, 1);
    assert_eq!(carts.cart(&shop.customer).await.unwrap().items.len(), 3);
    assert!(app.state.orders().list_orders(&shop.customer).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_user_cannot_check_out() {
    let app = TestApp::new();
    let ghost = Principal::new(UserId::new(9999), Role::Customer);

    let err = app.state.checkout().checkout(&ghost).await.unwrap_err();
    assert!(matches!(err, StorefrontError::NotFound { entity: "user", .. }));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_never_oversell() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 5).await;

    let mut buyers = Vec::new();
    for n in 0..4 {
        let buyer = create_user(app.store(), &format!("buyer{n}"), Role::Customer, None).await;
        app.state.carts().add_item(&buyer, a.id, 2).await.unwrap();
        buyers.push(buyer);
    }

    let mut handles = Vec::new();
    for buyer in buyers {
        let state = app.state.clone();
        handles.push(tokio::spawn(async move {
            state.checkout().checkout(&buyer).await
        }));
    }

    let mut placed = 0;
    let mut short = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(StorefrontError::InsufficientStock { product_id, .. }) => {
                assert_eq!(product_id, a.id);
                short += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(placed, 2);
    assert_eq!(short, 2);
    assert_eq!(stock_of(app.store(), a.id).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_same_cart_checked_out_once() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;
    app.state.carts().add_item(&shop.customer, a.id, 3).await.unwrap();

    let first = {
        let state = app.state.clone();
        let customer = shop.customer;
        tokio::spawn(async move { state.checkout().checkout(&customer).await })
    };
    let second = {
        let state = app.state.clone();
        let customer = shop.customer;
        tokio::spawn(async move { state.checkout().checkout(&customer).await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    let placed = results.iter().filter(|r| r.is_ok()).count();
    let empty = results
        .iter()
        .filter(|r| matches!(r, Err(StorefrontError::EmptyCart)))
        .count();
    assert_eq!((placed, empty), (1, 1));
    assert_eq!(stock_of(app.store(), a.id).await, 7);
    assert_eq!(app.state.orders().list_orders(&shop.customer).await.unwrap().len(), 1);
}

// =============================================================================
// After Commit
// =============================================================================

#[tokio::test]
async fn test_checkout_refreshes_cached_product() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;

    let cached = app.state.catalog().get_product(a.id).await.unwrap();
    assert_eq!(cached.stock, 10);

    app.state.carts().add_item(&shop.customer, a.id, 4).await.unwrap();
    app.state.checkout().checkout(&shop.customer).await.unwrap();

    let fresh = app.state.catalog().get_product(a.id).await.unwrap();
    assert_eq!(fresh.stock, 6);
}

#[tokio::test]
async fn test_checkout_sends_confirmation() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;

    app.state.carts().add_item(&shop.customer, a.id, 1).await.unwrap();
    let order = app.state.checkout().checkout(&shop.customer).await.unwrap();

    let sent = app.finish().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to.as_str(), "alice@example.com");
    assert_eq!(sent[0].subject, "Your Order Confirmation");
    assert_eq!(sent[0].text, format!("Your order #{} has been confirmed.", order.id));
}

#[tokio::test]
async fn test_customer_without_email_gets_no_confirmation() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;
    let quiet = create_user(app.store(), "quiet", Role::Customer, None).await;

    app.state.carts().add_item(&quiet, a.id, 1).await.unwrap();
    app.state.checkout().checkout(&quiet).await.unwrap();

    assert!(app.finish().await.is_empty());
}

#[tokio::test]
async fn test_failing_mailer_does_not_fail_checkout() {
    let app = TestApp::with_mailer(RecordingMailer::failing_first(u32::MAX));
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;

    app.state.carts().add_item(&shop.customer, a.id, 1).await.unwrap();
    let order = app.state.checkout().checkout(&shop.customer).await;
    assert!(order.is_ok());
    assert_eq!(stock_of(app.store(), a.id).await, 9);

    let mailer = app.mailer.clone();
    assert!(app.finish().await.is_empty());
    assert_eq!(mailer.attempts(), 3);
}

#[tokio::test]
async fn test_flaky_mailer_is_retried() {
    let app = TestApp::with_mailer(RecordingMailer::failing_first(2));
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;

    app.state.carts().add_item(&shop.customer, a.id, 1).await.unwrap();
    app.state.checkout().checkout(&shop.customer).await.unwrap();

    let mailer = app.mailer.clone();
    assert_eq!(app.finish().await.len(), 1);
    assert_eq!(mailer.attempts(), 3);
}

#[tokio::test]
async fn test_unknown_product_id_is_not_found() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;

    let err = app
        .state
        .carts()
        .add_item(&shop.customer, ProductId::new(404), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, StorefrontError::NotFound { entity: "product", .. }));
}
