//! Order and order line queries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;

use bazaar_core::{OrderId, OrderItemId, OrderStatus, Price, ProductId, UserId};

use super::{RepositoryError, not_found_on_missing_row, stored_price};
use crate::models::{Order, OrderItem};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    owner_id: UserId,
    status: String,
    total_price: Decimal,
    created_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        let status: OrderStatus = self
            .status
            .parse()
            .map_err(RepositoryError::DataCorruption)?;

        Ok(Order {
            id: self.id,
            owner: self.owner_id,
            status,
            total_price: stored_price(self.total_price)?,
            created_at: self.created_at,
            items,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: Option<ProductId>,
    quantity: i32,
    price: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            quantity: row.quantity,
            price: stored_price(row.price)?,
        })
    }
}

const ORDER_COLUMNS: &str = "id, owner_id, status, total_price, created_at";
const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, price";

/// Load the lines of `orders` and attach them, keeping the orders' sequence.
async fn with_items(
    conn: &mut PgConnection,
    orders: Vec<OrderRow>,
) -> Result<Vec<Order>, RepositoryError> {
    let ids: Vec<i64> = orders.iter().map(|o| o.id.as_i64()).collect();
    let rows = sqlx::query_as::<_, OrderItemRow>(&format!(
        r"
        SELECT {ORDER_ITEM_COLUMNS}
        FROM bazaar.order_item
        WHERE order_id = ANY($1)
        ORDER BY id
        "
    ))
    .bind(ids)
    .fetch_all(conn)
    .await?;

    let mut lines: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
    for row in rows {
        let item = OrderItem::try_from(row)?;
        lines.entry(item.order_id).or_default().push(item);
    }

    orders
        .into_iter()
        .map(|order| {
            let items = lines.remove(&order.id).unwrap_or_default();
            order.into_order(items)
        })
        .collect()
}

// =============================================================================
// Orders
// =============================================================================

pub(super) async fn create(
    conn: &mut PgConnection,
    owner: UserId,
    status: OrderStatus,
    total_price: Price,
) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r"
        INSERT INTO bazaar.order (owner_id, status, total_price)
        VALUES ($1, $2, $3)
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(owner)
    .bind(status.as_str())
    .bind(total_price.amount())
    .fetch_one(conn)
    .await?;

    row.into_order(Vec::new())
}

pub(super) async fn create_item(
    conn: &mut PgConnection,
    order: OrderId,
    product: ProductId,
    quantity: i32,
    price: Price,
) -> Result<OrderItem, RepositoryError> {
    let row = sqlx::query_as::<_, OrderItemRow>(&format!(
        r"
        INSERT INTO bazaar.order_item (order_id, product_id, quantity, price)
        VALUES ($1, $2, $3, $4)
        RETURNING {ORDER_ITEM_COLUMNS}
        "
    ))
    .bind(order)
    .bind(product)
    .bind(quantity)
    .bind(price.amount())
    .fetch_one(conn)
    .await?;

    row.try_into()
}

pub(super) async fn set_total(
    conn: &mut PgConnection,
    id: OrderId,
    total: Price,
) -> Result<(), RepositoryError> {
    let result = sqlx::query("UPDATE bazaar.order SET total_price = $2 WHERE id = $1")
        .bind(id)
        .bind(total.amount())
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

pub(super) async fn get(
    conn: &mut PgConnection,
    id: OrderId,
) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM bazaar.order WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(with_items(conn, vec![row]).await?.pop())
}

pub(super) async fn list(
    conn: &mut PgConnection,
    owner: Option<UserId>,
) -> Result<Vec<Order>, RepositoryError> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        r"
        SELECT {ORDER_COLUMNS}
        FROM bazaar.order
        WHERE $1::BIGINT IS NULL OR owner_id = $1
        ORDER BY id
        "
    ))
    .bind(owner)
    .fetch_all(&mut *conn)
    .await?;

    with_items(conn, rows).await
}

pub(super) async fn set_status(
    conn: &mut PgConnection,
    id: OrderId,
    status: OrderStatus,
) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r"
        UPDATE bazaar.order
        SET status = $2
        WHERE id = $1
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(id)
    .bind(status.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(not_found_on_missing_row)?;

    let mut orders = with_items(conn, vec![row]).await?;
    orders.pop().ok_or(RepositoryError::NotFound)
}

/// Lines go with the order through `ON DELETE CASCADE`.
pub(super) async fn delete(conn: &mut PgConnection, id: OrderId) -> Result<bool, RepositoryError> {
    let result = sqlx::query("DELETE FROM bazaar.order WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}
