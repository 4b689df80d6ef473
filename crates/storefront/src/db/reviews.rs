//! Product review queries.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use bazaar_core::{ProductId, ReviewId, UserId};

use super::{RepositoryError, conflict_on_unique, not_found_on_missing_row};
use crate::models::{NewReview, Review};

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: ReviewId,
    product_id: ProductId,
    user_id: UserId,
    rating: i16,
    comment: String,
    created_at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            author: row.user_id,
            rating: row.rating,
            comment: row.comment,
            created_at: row.created_at,
        }
    }
}

const REVIEW_COLUMNS: &str = "id, product_id, user_id, rating, comment, created_at";

pub(super) async fn list(
    conn: &mut PgConnection,
    product: ProductId,
) -> Result<Vec<Review>, RepositoryError> {
    let rows = sqlx::query_as::<_, ReviewRow>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM bazaar.review WHERE product_id = $1 ORDER BY id"
    ))
    .bind(product)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Review::from).collect())
}

pub(super) async fn get(
    conn: &mut PgConnection,
    id: ReviewId,
) -> Result<Option<Review>, RepositoryError> {
    let row = sqlx::query_as::<_, ReviewRow>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM bazaar.review WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(Review::from))
}

pub(super) async fn create(
    conn: &mut PgConnection,
    product: ProductId,
    author: UserId,
    new: &NewReview,
) -> Result<Review, RepositoryError> {
    let row = sqlx::query_as::<_, ReviewRow>(&format!(
        r"
        INSERT INTO bazaar.review (product_id, user_id, rating, comment)
        VALUES ($1, $2, $3, $4)
        RETURNING {REVIEW_COLUMNS}
        "
    ))
    .bind(product)
    .bind(author)
    .bind(new.rating)
    .bind(&new.comment)
    .fetch_one(conn)
    .await
    .map_err(|e| conflict_on_unique(e, "review"))?;

    Ok(row.into())
}

pub(super) async fn save(
    conn: &mut PgConnection,
    review: &Review,
) -> Result<Review, RepositoryError> {
    let row = sqlx::query_as::<_, ReviewRow>(&format!(
        r"
        UPDATE bazaar.review
        SET rating = $2, comment = $3
        WHERE id = $1
        RETURNING {REVIEW_COLUMNS}
        "
    ))
    .bind(review.id)
    .bind(review.rating)
    .bind(&review.comment)
    .fetch_one(conn)
    .await
    .map_err(not_found_on_missing_row)?;

    Ok(row.into())
}

pub(super) async fn delete(conn: &mut PgConnection, id: ReviewId) -> Result<bool, RepositoryError> {
    let result = sqlx::query("DELETE FROM bazaar.review WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}
