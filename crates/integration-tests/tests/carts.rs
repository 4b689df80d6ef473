//! Integration tests for cart line management.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use bazaar_core::{CartItemId, Role};
use bazaar_integration_tests::{Shop, TestApp, create_user, stock_of};
use bazaar_storefront::error::StorefrontError;
use bazaar_storefront::models::CartItemUpdate;

// =============================================================================
// Adding
// =============================================================================

#[tokio::test]
async fn test_first_access_creates_empty_cart() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;

    let carts = app.state.carts();
    let first = carts.cart(&shop.customer).await.unwrap();
    let again = carts.cart(&shop.customer).await.unwrap();

    assert!(first.is_empty());
    assert_eq!(first.cart.owner, shop.customer.id);
    assert_eq!(first.cart.id, again.cart.id);
}

#[tokio::test]
async fn test_add_rejects_non_positive_quantity() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;

    for quantity in [0, -3] {
        let err = app
            .state
            .carts()
            .add_item(&shop.customer, a.id, quantity)
            .await
            .unwrap_err();
        assert!(matches!(err, StorefrontError::Validation { field: "quantity", .. }));
    }
    assert!(app.state.carts().cart(&shop.customer).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_add_checks_current_stock() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 3).await;

    let err = app
        .state
        .carts()
        .add_item(&shop.customer, a.id, 4)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorefrontError::InsufficientStock {
            requested: 4,
            available: 3,
            ..
        }
    ));

    // Adding never reserves stock.
    app.state.carts().add_item(&shop.customer, a.id, 3).await.unwrap();
    assert_eq!(stock_of(app.store(), a.id).await, 3);
}

#[tokio::test]
async fn test_add_checks_stock_against_line_total() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 5).await;

    let carts = app.state.carts();
    carts.add_item(&shop.customer, a.id, 3).await.unwrap();
    let err = carts.add_item(&shop.customer, a.id, 3).await.unwrap_err();
    assert!(matches!(
        err,
        StorefrontError::InsufficientStock {
            requested: 6,
            available: 5,
            ..
        }
    ));

    let cart = carts.add_item(&shop.customer, a.id, 2).await.unwrap();
    assert_eq!(cart.items[0].quantity, 5);
}

#[tokio::test]
async fn test_accumulating_past_i32_max_is_rejected() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", i32::MAX).await;

    let carts = app.state.carts();
    carts.add_item(&shop.customer, a.id, i32::MAX).await.unwrap();
    let err = carts.add_item(&shop.customer, a.id, 1).await.unwrap_err();
    assert!(matches!(err, StorefrontError::Validation { field: "quantity", .. }));

    let cart = carts.cart(&shop.customer).await.unwrap();
    assert_eq!(cart.items[0].quantity, i32::MAX);
}

// =============================================================================
// Updating and Removing
// =============================================================================

#[tokio::test]
async fn test_update_sets_quantity() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;

    let carts = app.state.carts();
    let line = carts.add_item(&shop.customer, a.id, 2).await.unwrap().items[0].clone();

    let updated = carts
        .update_item(&shop.customer, line.id, CartItemUpdate { quantity: Some(7) })
        .await
        .unwrap();
    assert_eq!(updated.quantity, 7);

    let unchanged = carts
        .update_item(&shop.customer, line.id, CartItemUpdate::default())
        .await
        .unwrap();
    assert_eq!(unchanged.quantity, 7);

    let err = carts
        .update_item(&shop.customer, line.id, CartItemUpdate { quantity: Some(11) })
        .await
        .unwrap_err();
    assert!(matches!(err, StorefrontError::InsufficientStock { .. }));

    let err = carts
        .update_item(&shop.customer, line.id, CartItemUpdate { quantity: Some(0) })
        .await
        .unwrap_err();
    assert!(matches!(err, StorefrontError::Validation { .. }));
}

#[tokio::test]
async fn test_other_users_lines_are_forbidden() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;
    let bob = create_user(app.store(), "bob", Role::Customer, None).await;
    let admin = create_user(app.store(), "root", Role::Admin, None).await;

    let carts = app.state.carts();
    let line = carts.add_item(&shop.customer, a.id, 2).await.unwrap().items[0].clone();

    for intruder in [&bob, &admin] {
        let err = carts
            .update_item(intruder, line.id, CartItemUpdate { quantity: Some(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, StorefrontError::Forbidden));

        let err = carts.remove_item(intruder, line.id).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Forbidden));
    }

    let cart = carts.cart(&shop.customer).await.unwrap();
    assert_eq!(cart.items[0].quantity, 2);
}

#[tokio::test]
async fn test_remove_then_remove_again_is_not_found() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;

    let carts = app.state.carts();
    let line = carts.add_item(&shop.customer, a.id, 2).await.unwrap().items[0].clone();

    carts.remove_item(&shop.customer, line.id).await.unwrap();
    assert!(carts.cart(&shop.customer).await.unwrap().is_empty());

    let err = carts.remove_item(&shop.customer, line.id).await.unwrap_err();
    assert!(matches!(err, StorefrontError::NotFound { entity: "cart item", .. }));

    let err = carts
        .update_item(&shop.customer, CartItemId::new(404), CartItemUpdate { quantity: Some(1) })
        .await
        .unwrap_err();
    assert!(matches!(err, StorefrontError::NotFound { .. }));
}

#[tokio::test]
async fn test_deleting_product_drops_cart_lines() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;
    let b = shop.product(app.store(), "Matcha", "4.00", 10).await;

    let carts = app.state.carts();
    carts.add_item(&shop.customer, a.id, 1).await.unwrap();
    carts.add_item(&shop.customer, b.id, 1).await.unwrap();

    app.state.catalog().delete_product(&shop.seller, a.id).await.unwrap();

    let cart = carts.cart(&shop.customer).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].product_id, b.id);
}
