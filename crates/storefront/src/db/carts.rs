//! Cart and cart line queries.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use bazaar_core::{CartId, CartItemId, ProductId, UserId};

use super::{RepositoryError, not_found_on_missing_row};
use crate::models::{Cart, CartItem};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    id: CartId,
    owner_id: UserId,
    created_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
    fn from(row: CartRow) -> Self {
        Self {
            id: row.id,
            owner: row.owner_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    id: CartItemId,
    cart_id: CartId,
    product_id: ProductId,
    quantity: i32,
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        Self {
            id: row.id,
            cart_id: row.cart_id,
            product_id: row.product_id,
            quantity: row.quantity,
        }
    }
}

// =============================================================================
// Carts
// =============================================================================

/// Insert-or-fetch on the unique owner constraint. Safe under concurrent
/// first access: the losing insert is a no-op and the select sees the
/// winner's row.
pub(super) async fn get_or_create(
    conn: &mut PgConnection,
    owner: UserId,
    for_update: bool,
) -> Result<Cart, RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO bazaar.cart (owner_id)
        VALUES ($1)
        ON CONFLICT (owner_id) DO NOTHING
        ",
    )
    .bind(owner)
    .execute(&mut *conn)
    .await?;

    let lock = if for_update { "FOR UPDATE" } else { "" };
    let row = sqlx::query_as::<_, CartRow>(&format!(
        "SELECT id, owner_id, created_at FROM bazaar.cart WHERE owner_id = $1 {lock}"
    ))
    .bind(owner)
    .fetch_one(conn)
    .await
    .map_err(not_found_on_missing_row)?;

    Ok(row.into())
}

pub(super) async fn get(conn: &mut PgConnection, id: CartId) -> Result<Option<Cart>, RepositoryError> {
    let row = sqlx::query_as::<_, CartRow>(
        "SELECT id, owner_id, created_at FROM bazaar.cart WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(Cart::from))
}

// =============================================================================
// Cart Items
// =============================================================================

pub(super) async fn items(
    conn: &mut PgConnection,
    cart: CartId,
) -> Result<Vec<CartItem>, RepositoryError> {
    let rows = sqlx::query_as::<_, CartItemRow>(
        r"
        SELECT id, cart_id, product_id, quantity
        FROM bazaar.cart_item
        WHERE cart_id = $1
        ORDER BY id
        ",
    )
    .bind(cart)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(CartItem::from).collect())
}

pub(super) async fn item(
    conn: &mut PgConnection,
    id: CartItemId,
) -> Result<Option<CartItem>, RepositoryError> {
    let row = sqlx::query_as::<_, CartItemRow>(
        "SELECT id, cart_id, product_id, quantity FROM bazaar.cart_item WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(CartItem::from))
}

/// One statement, so concurrent adds to the same line both land.
pub(super) async fn add(
    conn: &mut PgConnection,
    cart: CartId,
    product: ProductId,
    quantity: i32,
) -> Result<CartItem, RepositoryError> {
    let row = sqlx::query_as::<_, CartItemRow>(
        r"
        INSERT INTO bazaar.cart_item (cart_id, product_id, quantity)
        VALUES ($1, $2, $3)
        ON CONFLICT (cart_id, product_id)
        DO UPDATE SET quantity = bazaar.cart_item.quantity + EXCLUDED.quantity
        RETURNING id, cart_id, product_id, quantity
        ",
    )
    .bind(cart)
    .bind(product)
    .bind(quantity)
    .fetch_one(conn)
    .await?;

    Ok(row.into())
}

pub(super) async fn set_quantity(
    conn: &mut PgConnection,
    id: CartItemId,
    quantity: i32,
) -> Result<CartItem, RepositoryError> {
    let row = sqlx::query_as::<_, CartItemRow>(
        r"
        UPDATE bazaar.cart_item
        SET quantity = $2
        WHERE id = $1
        RETURNING id, cart_id, product_id, quantity
        ",
    )
    .bind(id)
    .bind(quantity)
    .fetch_one(conn)
    .await
    .map_err(not_found_on_missing_row)?;

    Ok(row.into())
}

pub(super) async fn delete_item(
    conn: &mut PgConnection,
    id: CartItemId,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query("DELETE FROM bazaar.cart_item WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub(super) async fn clear(conn: &mut PgConnection, cart: CartId) -> Result<u64, RepositoryError> {
    let result = sqlx::query("DELETE FROM bazaar.cart_item WHERE cart_id = $1")
        .bind(cart)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}
