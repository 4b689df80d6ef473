//! Cart line management.
//!
//! Every user has exactly one cart, created on first access. Stock checks
//! here are best-effort: checkout re-validates against locked rows.

use tracing::{info, instrument};

use bazaar_core::{Action, CartItemId, Principal, ProductId, Resource, authorize};

use crate::db::{Store, StoreTx};
use crate::error::{Result, StorefrontError};
use crate::models::{CartContents, CartItem, CartItemUpdate};

/// Cart operations over a store.
pub struct CartService<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> CartService<'a, S> {
    /// Create a cart service.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// The caller's cart and its lines.
    ///
    /// # Errors
    ///
    /// Returns `StorefrontError::Repository` if the store fails.
    #[instrument(skip_all, fields(user_id = %principal.id))]
    pub async fn cart(&self, principal: &Principal) -> Result<CartContents> {
        let mut tx = self.store.begin().await?;
        let cart = tx.get_or_create_cart(principal.id).await?;
        let items = tx.cart_items(cart.id).await?;
        tx.commit().await?;
        Ok(CartContents { cart, items })
    }

    /// Add `quantity` units of a product to the caller's cart. Adding a
    /// product already in the cart increases that line's quantity.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `quantity < 1` or the line total overflows,
    /// `NotFound` for unknown products and `InsufficientStock` if the
    /// product has fewer units than the line would then hold.
    #[instrument(skip_all, fields(user_id = %principal.id, product_id = %product_id, quantity))]
    pub async fn add_item(
        &self,
        principal: &Principal,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartContents> {
        validate_quantity(quantity)?;

        let mut tx = self.store.begin().await?;
        let product = tx
            .product(product_id)
            .await?
            .ok_or_else(|| StorefrontError::not_found("product", product_id))?;

        let cart = tx.get_or_create_cart(principal.id).await?;
        let in_cart = tx
            .cart_items(cart.id)
            .await?
            .iter()
            .find(|item| item.product_id == product_id)
            .map_or(0, |item| item.quantity);
        let requested = in_cart.checked_add(quantity).ok_or_else(|| {
            StorefrontError::validation("quantity", "cart line quantity is too large")
        })?;
        if !product.has_stock_for(requested) {
            return Err(StorefrontError::InsufficientStock {
                product_id,
                requested,
                available: product.stock,
            });
        }

        let line = tx.add_to_cart(cart.id, product_id, quantity).await?;
        let items = tx.cart_items(cart.id).await?;
        tx.commit().await?;

        info!(cart_item_id = %line.id, line_quantity = line.quantity, "Added to cart");
        Ok(CartContents { cart, items })
    }

    /// Apply a partial update to one of the caller's cart lines.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown lines, `Forbidden` for lines in another
    /// user's cart, `Validation` if the new quantity is below 1 and
    /// `InsufficientStock` if the product has fewer units than requested.
    #[instrument(skip_all, fields(user_id = %principal.id, cart_item_id = %item_id))]
    pub async fn update_item(
        &self,
        principal: &Principal,
        item_id: CartItemId,
        update: CartItemUpdate,
    ) -> Result<CartItem> {
        let mut tx = self.store.begin().await?;
        let item = owned_item(&mut tx, principal, item_id, Action::Update).await?;

        let Some(quantity) = update.quantity else {
            return Ok(item);
        };
        validate_quantity(quantity)?;

        let available = tx.product(item.product_id).await?.map_or(0, |p| p.stock);
        if available < quantity {
            return Err(StorefrontError::InsufficientStock {
                product_id: item.product_id,
                requested: quantity,
                available,
            });
        }

        let item = tx.set_cart_item_quantity(item_id, quantity).await?;
        tx.commit().await?;

        info!(quantity, "Cart line updated");
        Ok(item)
    }

    /// Remove one of the caller's cart lines.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown (or already removed) lines and
    /// `Forbidden` for lines in another user's cart.
    #[instrument(skip_all, fields(user_id = %principal.id, cart_item_id = %item_id))]
    pub async fn remove_item(&self, principal: &Principal, item_id: CartItemId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        owned_item(&mut tx, principal, item_id, Action::Delete).await?;
        if !tx.delete_cart_item(item_id).await? {
            return Err(StorefrontError::not_found("cart item", item_id));
        }
        tx.commit().await?;

        info!("Cart line removed");
        Ok(())
    }
}

/// Fetch a cart line and check the caller may act on it.
async fn owned_item<T: StoreTx>(
    tx: &mut T,
    principal: &Principal,
    item_id: CartItemId,
    action: Action,
) -> Result<CartItem> {
    let item = tx
        .cart_item(item_id)
        .await?
        .ok_or_else(|| StorefrontError::not_found("cart item", item_id))?;
    let cart = tx
        .cart(item.cart_id)
        .await?
        .ok_or_else(|| StorefrontError::not_found("cart", item.cart_id))?;

    if !authorize(
        principal,
        Resource::CartItem {
            cart_owner: cart.owner,
        },
        action,
    )
    .is_allowed()
    {
        return Err(StorefrontError::Forbidden);
    }
    Ok(item)
}

fn validate_quantity(quantity: i32) -> Result<()> {
    if quantity < 1 {
        return Err(StorefrontError::validation("quantity", "must be at least 1"));
    }
    Ok(())
}
