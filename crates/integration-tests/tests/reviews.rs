//! Integration tests for product reviews.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use bazaar_core::{ProductId, ReviewId, Role};
use bazaar_integration_tests::{Shop, TestApp, create_user};
use bazaar_storefront::error::StorefrontError;
use bazaar_storefront::models::{NewReview, ReviewUpdate};

fn review(rating: i16, comment: &str) -> NewReview {
    NewReview {
        rating,
        comment: comment.to_owned(),
    }
}

// =============================================================================
// Writing
// =============================================================================

#[tokio::test]
async fn test_customer_reviews_product_once() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;

    let reviews = app.state.reviews();
    let created = reviews
        .create_review(&shop.customer, a.id, review(5, "Grassy and sweet"))
        .await
        .unwrap();
    assert_eq!(created.author, shop.customer.id);
    assert_eq!(created.product_id, a.id);
    assert_eq!(created.rating, 5);

    let err = reviews
        .create_review(&shop.customer, a.id, review(3, "Changed my mind"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorefrontError::InvalidState(_)));
    assert_eq!(reviews.list_reviews(a.id).await.unwrap(), vec![created]);
}

#[tokio::test]
async fn test_only_customers_may_review() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;
    let admin = create_user(app.store(), "root", Role::Admin, None).await;

    let reviews = app.state.reviews();
    for principal in [shop.seller, admin] {
        let err = reviews
            .create_review(&principal, a.id, review(4, "Fine"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorefrontError::Forbidden));
    }
    assert!(reviews.list_reviews(a.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_review_input_is_validated() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;

    let reviews = app.state.reviews();
    for rating in [0, 6, -1] {
        let err = reviews
            .create_review(&shop.customer, a.id, review(rating, "Odd"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorefrontError::Validation { field: "rating", .. }));
    }

    let err = reviews
        .create_review(&shop.customer, a.id, review(3, "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, StorefrontError::Validation { field: "comment", .. }));

    let err = reviews
        .create_review(&shop.customer, ProductId::new(404), review(3, "Where?"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorefrontError::NotFound { entity: "product", .. }));
}

// =============================================================================
// Editing and Removing
// =============================================================================

#[tokio::test]
async fn test_author_alone_edits_and_deletes() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;
    let bob = create_user(app.store(), "bob", Role::Customer, None).await;
    let admin = create_user(app.store(), "root", Role::Admin, None).await;

    let reviews = app.state.reviews();
    let created = reviews
        .create_review(&shop.customer, a.id, review(4, "Nice"))
        .await
        .unwrap();

    for principal in [bob, admin] {
        let err = reviews
            .update_review(&principal, created.id, ReviewUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorefrontError::Forbidden));
        let err = reviews.delete_review(&principal, created.id).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Forbidden));
    }

    let updated = reviews
        .update_review(
            &shop.customer,
            created.id,
            ReviewUpdate {
                rating: Some(2),
                comment: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.rating, 2);
    assert_eq!(updated.comment, "Nice");

    let err = reviews
        .update_review(
            &shop.customer,
            created.id,
            ReviewUpdate {
                rating: Some(9),
                comment: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorefrontError::Validation { field: "rating", .. }));

    reviews.delete_review(&shop.customer, created.id).await.unwrap();
    assert!(reviews.list_reviews(a.id).await.unwrap().is_empty());

    let err = reviews.delete_review(&shop.customer, created.id).await.unwrap_err();
    assert!(matches!(err, StorefrontError::NotFound { entity: "review", .. }));
}

// =============================================================================
// Reading
// =============================================================================

#[tokio::test]
async fn test_reviews_listed_oldest_first_and_removed_with_product() {
    let app = TestApp::new();
    let shop = Shop::open(app.store()).await;
    let a = shop.product(app.store(), "Sencha", "2.50", 10).await;
    let b = shop.product(app.store(), "Matcha", "4.00", 10).await;
    let bob = create_user(app.store(), "bob", Role::Customer, None).await;

    let reviews = app.state.reviews();
    let first = reviews
        .create_review(&shop.customer, a.id, review(5, "Lovely"))
        .await
        .unwrap();
    let second = reviews.create_review(&bob, a.id, review(3, "Fine")).await.unwrap();
    reviews.create_review(&bob, b.id, review(1, "Bitter")).await.unwrap();

    let ids: Vec<ReviewId> = reviews
        .list_reviews(a.id)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![first.id, second.id]);

    app.state.catalog().delete_product(&shop.seller, a.id).await.unwrap();
    let err = reviews.list_reviews(a.id).await.unwrap_err();
    assert!(matches!(err, StorefrontError::NotFound { entity: "product", .. }));
    assert_eq!(reviews.list_reviews(b.id).await.unwrap().len(), 1);
}
