//! Checkout: turn a cart into an order.
//!
//! Checkout is the one path that touches carts, products and orders
//! together, so it runs as a single store transaction:
//!
//! 1. Lock the caller's cart row and read its lines (ascending line ID).
//! 2. Lock every referenced product row (ascending product ID).
//! 3. Plan: check stock line by line, snapshot current prices, total up.
//! 4. Create the order and its lines, decrement stock, set the total.
//! 5. Empty the cart and commit.
//!
//! Any error before the commit drops the transaction, leaving no order, no
//! stock change and the cart as it was. Cache invalidation and the
//! confirmation email happen after the commit and cannot fail the checkout.

use std::collections::HashMap;

use tracing::{info, instrument};

use bazaar_core::{OrderStatus, Price, Principal, ProductId};

use super::catalog::ProductCache;
use super::notifications::{Notification, NotificationDispatcher};
use crate::db::{Store, StoreTx};
use crate::error::{Result, StorefrontError, add_breadcrumb};
use crate::models::{CartItem, Order, Product};

/// One order line as planned from a cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLine {
    pub product_id: ProductId,
    pub quantity: i32,
    /// Unit price snapshot.
    pub price: Price,
}

/// The validated outcome of a checkout, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPlan {
    /// Lines in cart line order.
    pub lines: Vec<PlannedLine>,
    pub total: Price,
}

impl CheckoutPlan {
    /// Distinct products in the plan, ascending.
    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = self.lines.iter().map(|line| line.product_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Validate cart lines against current product rows and build the plan.
///
/// Lines are checked in the given order. Stock is tracked per product, so
/// two lines for the same product must fit in its stock together.
///
/// # Errors
///
/// Returns `EmptyCart` for no lines, `NotFound` if a line's product is not in
/// `products`, `InsufficientStock` for the first line that does not fit and
/// `Validation` if the order total would not fit in a price.
pub fn plan_checkout(items: &[CartItem], products: &[Product]) -> Result<CheckoutPlan> {
    if items.is_empty() {
        return Err(StorefrontError::EmptyCart);
    }

    let by_id: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();
    let mut remaining: HashMap<ProductId, i32> = products.iter().map(|p| (p.id, p.stock)).collect();

    let mut lines = Vec::with_capacity(items.len());
    let mut total = Price::ZERO;
    for item in items {
        let product = by_id
            .get(&item.product_id)
            .ok_or_else(|| StorefrontError::not_found("product", item.product_id))?;
        let left = remaining.entry(item.product_id).or_default();
        if *left < item.quantity {
            return Err(StorefrontError::InsufficientStock {
                product_id: item.product_id,
                requested: item.quantity,
                available: *left,
            });
        }
        *left -= item.quantity;

        total = product
            .price
            .checked_line_total(item.quantity)
            .and_then(|line| total.checked_add(line))
            .map_err(|e| StorefrontError::validation("total_price", e.to_string()))?;
        lines.push(PlannedLine {
            product_id: item.product_id,
            quantity: item.quantity,
            price: product.price,
        });
    }

    Ok(CheckoutPlan { lines, total })
}

/// Checkout over a store.
pub struct CheckoutService<'a, S: Store> {
    store: &'a S,
    cache: &'a ProductCache,
    notifier: &'a NotificationDispatcher,
}

impl<'a, S: Store> CheckoutService<'a, S> {
    /// Create a checkout service.
    #[must_use]
    pub const fn new(
        store: &'a S,
        cache: &'a ProductCache,
        notifier: &'a NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            cache,
            notifier,
        }
    }

    /// Convert the caller's cart into a pending order.
    ///
    /// # Errors
    ///
    /// Returns `EmptyCart` if the cart has no lines, `InsufficientStock`
    /// naming the first product that cannot cover its line, `NotFound` if
    /// the caller is not a known user, and `Repository` on store failure.
    /// Nothing is written when an error is returned.
    #[instrument(skip_all, fields(user_id = %principal.id))]
    pub async fn checkout(&self, principal: &Principal) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let user = tx
            .user(principal.id)
            .await?
            .ok_or_else(|| StorefrontError::not_found("user", principal.id))?;

        let cart = tx.cart_for_update(principal.id).await?;
        let items = tx.cart_items(cart.id).await?;
        if items.is_empty() {
            return Err(StorefrontError::EmptyCart);
        }

        let mut product_ids: Vec<ProductId> = items.iter().map(|item| item.product_id).collect();
        product_ids.sort_unstable();
        product_ids.dedup();
        let products = tx.lock_products(&product_ids).await?;
        let plan = plan_checkout(&items, &products)?;

        let order = tx
            .insert_order(principal.id, OrderStatus::Pending, Price::ZERO)
            .await?;
        let mut order_items = Vec::with_capacity(plan.lines.len());
        for line in &plan.lines {
            order_items.push(
                tx.insert_order_item(order.id, line.product_id, line.quantity, line.price)
                    .await?,
            );
            if !tx.decrement_stock(line.product_id, line.quantity).await? {
                let available = tx.product(line.product_id).await?.map_or(0, |p| p.stock);
                return Err(StorefrontError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available,
                });
            }
        }
        tx.set_order_total(order.id, plan.total).await?;
        tx.clear_cart(cart.id).await?;
        tx.commit().await?;

        let order = Order {
            total_price: plan.total,
            items: order_items,
            ..order
        };

        self.cache.invalidate(&product_ids).await;
        if let Some(to) = user.email {
            self.notifier.dispatch(Notification::OrderConfirmed {
                to,
                order_id: order.id,
            });
        }

        add_breadcrumb(
            "checkout",
            "Order placed",
            &[
                ("order_id", order.id.to_string()),
                ("total", order.total_price.to_string()),
            ],
        );
        info!(
            order_id = %order.id,
            lines = order.items.len(),
            total = %order.total_price,
            "Checkout complete"
        );
        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::Utc;

    use bazaar_core::{CartId, CartItemId, CategoryId, UserId};

    use super::*;

    fn product(id: i64, cents: i64, stock: i32) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("product {id}"),
            description: String::new(),
            price: Price::from_cents(cents).unwrap(),
            stock,
            category_id: CategoryId::new(1),
            seller_id: UserId::new(1),
            created_at: Utc::now(),
        }
    }

    fn line(id: i64, product_id: i64, quantity: i32) -> CartItem {
        CartItem {
            id: CartItemId::new(id),
            cart_id: CartId::new(1),
            product_id: ProductId::new(product_id),
            quantity,
        }
    }

    #[test]
    fn test_plan_totals_and_snapshots_prices() {
        let products = [product(1, 500, 10), product(2, 300, 1)];
        let plan = plan_checkout(&[line(1, 1, 2), line(2, 2, 1)], &products).unwrap();

        assert_eq!(plan.total, Price::from_cents(1300).unwrap());
        assert_eq!(plan.lines.len(), 2);
        assert_eq!(plan.lines[0].price, Price::from_cents(500).unwrap());
        assert_eq!(plan.lines[1].quantity, 1);
        assert_eq!(plan.product_ids(), vec![ProductId::new(1), ProductId::new(2)]);
    }

    #[test]
    fn test_plan_rejects_empty_cart() {
        let err = plan_checkout(&[], &[product(1, 500, 10)]).unwrap_err();
        assert!(matches!(err, StorefrontError::EmptyCart));
    }

    #[test]
    fn test_plan_names_first_short_product() {
        let products = [product(1, 500, 10), product(2, 300, 1), product(3, 100, 0)];
        let err = plan_checkout(&[line(1, 1, 2), line(2, 2, 1), line(3, 3, 1)], &products)
            .unwrap_err();

        match err {
            StorefrontError::InsufficientStock {
                product_id,
                requested,
                available,
            } => {
                assert_eq!(product_id, ProductId::new(3));
                assert_eq!(requested, 1);
                assert_eq!(available, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_plan_counts_stock_across_lines_of_same_product() {
        let products = [product(1, 500, 3)];
        let err = plan_checkout(&[line(1, 1, 2), line(2, 1, 2)], &products).unwrap_err();
        assert!(matches!(
            err,
            StorefrontError::InsufficientStock { available: 1, .. }
        ));
    }

    #[test]
    fn test_plan_rejects_total_beyond_price_range() {
        let products = [product(1, 9_999_999_999, 10)];
        let err = plan_checkout(&[line(1, 1, 5)], &products).unwrap_err();
        assert!(matches!(err, StorefrontError::Validation { field: "total_price", .. }));

        let products = [product(1, 6_000_000_000, 1), product(2, 5_000_000_000, 1)];
        let err = plan_checkout(&[line(1, 1, 1), line(2, 2, 1)], &products).unwrap_err();
        assert!(matches!(err, StorefrontError::Validation { field: "total_price", .. }));
    }

    #[test]
    fn test_plan_rejects_missing_product() {
        let err = plan_checkout(&[line(1, 9, 1)], &[product(1, 500, 3)]).unwrap_err();
        assert!(matches!(err, StorefrontError::NotFound { entity: "product", .. }));
    }
}
