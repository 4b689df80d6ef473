//! Product and back-in-stock subscription queries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;

use bazaar_core::{CategoryId, ProductId, SubscriptionId, UserId};

use super::{RepositoryError, not_found_on_missing_row, stored_price};
use crate::models::{NewProduct, Product, ProductPage, ProductQuery, ProductSubscription};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    description: String,
    price: Decimal,
    stock: i32,
    category_id: CategoryId,
    seller_id: UserId,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            price: stored_price(row.price)?,
            stock: row.stock,
            category_id: row.category_id,
            seller_id: row.seller_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: SubscriptionId,
    user_id: UserId,
    product_id: ProductId,
    subscribed_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for ProductSubscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            product_id: row.product_id,
            subscribed_at: row.subscribed_at,
        }
    }
}

const PRODUCT_COLUMNS: &str =
    "id, name, description, price, stock, category_id, seller_id, created_at";

/// Shared filter clause for listing and counting; `$1..$4` are the optional
/// min price, max price, category ID and category name.
const LIST_FILTER: &str = r"
    ($1::NUMERIC IS NULL OR price >= $1)
    AND ($2::NUMERIC IS NULL OR price <= $2)
    AND ($3::BIGINT IS NULL OR category_id = $3)
    AND ($4::TEXT IS NULL OR category_id IN (
        SELECT id FROM bazaar.category WHERE LOWER(name) = LOWER($4)
    ))
";

fn into_products(rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
    rows.into_iter().map(Product::try_from).collect()
}

// =============================================================================
// Products
// =============================================================================

pub(super) async fn get(
    conn: &mut PgConnection,
    id: ProductId,
) -> Result<Option<Product>, RepositoryError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM bazaar.product WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    row.map(Product::try_from).transpose()
}

/// Row locks are taken in `ORDER BY id` order, so two transactions locking
/// overlapping sets cannot deadlock.
pub(super) async fn lock(
    conn: &mut PgConnection,
    ids: &[ProductId],
) -> Result<Vec<Product>, RepositoryError> {
    let ids: Vec<i64> = ids.iter().map(ProductId::as_i64).collect();
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        r"
        SELECT {PRODUCT_COLUMNS}
        FROM bazaar.product
        WHERE id = ANY($1)
        ORDER BY id
        FOR UPDATE
        "
    ))
    .bind(ids)
    .fetch_all(conn)
    .await?;

    into_products(rows)
}

pub(super) async fn list(
    conn: &mut PgConnection,
    query: &ProductQuery,
) -> Result<ProductPage, RepositoryError> {
    let query = query.clone().normalized();
    let min_price = query.min_price.map(|p| p.amount());
    let max_price = query.max_price.map(|p| p.amount());
    let offset = i64::try_from(query.offset()).unwrap_or(i64::MAX);

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM bazaar.product WHERE {LIST_FILTER}"
    ))
    .bind(min_price)
    .bind(max_price)
    .bind(query.category_id)
    .bind(query.category_name.as_deref())
    .fetch_one(&mut *conn)
    .await?;

    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        r"
        SELECT {PRODUCT_COLUMNS}
        FROM bazaar.product
        WHERE {LIST_FILTER}
        ORDER BY created_at DESC, id DESC
        LIMIT $5 OFFSET $6
        "
    ))
    .bind(min_price)
    .bind(max_price)
    .bind(query.category_id)
    .bind(query.category_name.as_deref())
    .bind(i64::from(query.page_size))
    .bind(offset)
    .fetch_all(conn)
    .await?;

    Ok(ProductPage {
        items: into_products(rows)?,
        page: query.page,
        page_size: query.page_size,
        total: u64::try_from(total).unwrap_or_default(),
    })
}

pub(super) async fn create(
    conn: &mut PgConnection,
    seller: UserId,
    new: &NewProduct,
) -> Result<Product, RepositoryError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        r"
        INSERT INTO bazaar.product (name, description, price, stock, category_id, seller_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {PRODUCT_COLUMNS}
        "
    ))
    .bind(&new.name)
    .bind(&new.description)
    .bind(new.price.amount())
    .bind(new.stock)
    .bind(new.category_id)
    .bind(seller)
    .fetch_one(conn)
    .await?;

    row.try_into()
}

pub(super) async fn save(
    conn: &mut PgConnection,
    product: &Product,
) -> Result<Product, RepositoryError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        r"
        UPDATE bazaar.product
        SET name = $2, description = $3, price = $4, stock = $5, category_id = $6
        WHERE id = $1
        RETURNING {PRODUCT_COLUMNS}
        "
    ))
    .bind(product.id)
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.price.amount())
    .bind(product.stock)
    .bind(product.category_id)
    .fetch_one(conn)
    .await
    .map_err(not_found_on_missing_row)?;

    row.try_into()
}

pub(super) async fn delete(conn: &mut PgConnection, id: ProductId) -> Result<bool, RepositoryError> {
    let result = sqlx::query("DELETE FROM bazaar.product WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub(super) async fn decrement_stock(
    conn: &mut PgConnection,
    id: ProductId,
    quantity: i32,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE bazaar.product
        SET stock = stock - $2
        WHERE id = $1 AND stock >= $2
        ",
    )
    .bind(id)
    .bind(quantity)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

// =============================================================================
// Subscriptions
// =============================================================================

/// The no-op `DO UPDATE` makes `RETURNING` yield the existing row.
pub(super) async fn upsert_subscription(
    conn: &mut PgConnection,
    user: UserId,
    product: ProductId,
) -> Result<ProductSubscription, RepositoryError> {
    let row = sqlx::query_as::<_, SubscriptionRow>(
        r"
        INSERT INTO bazaar.product_subscription (user_id, product_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, product_id) DO UPDATE SET user_id = EXCLUDED.user_id
        RETURNING id, user_id, product_id, subscribed_at
        ",
    )
    .bind(user)
    .bind(product)
    .fetch_one(conn)
    .await?;

    Ok(row.into())
}

pub(super) async fn drain_subscriptions(
    conn: &mut PgConnection,
    product: ProductId,
) -> Result<Vec<ProductSubscription>, RepositoryError> {
    let mut rows = sqlx::query_as::<_, SubscriptionRow>(
        r"
        DELETE FROM bazaar.product_subscription
        WHERE product_id = $1
        RETURNING id, user_id, product_id, subscribed_at
        ",
    )
    .bind(product)
    .fetch_all(conn)
    .await?;

    rows.sort_by_key(|row| row.id);
    Ok(rows.into_iter().map(ProductSubscription::from).collect())
}
