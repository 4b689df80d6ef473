//! User and category queries.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use bazaar_core::{CategoryId, Email, Role, UserId};

use super::{RepositoryError, conflict_on_unique};
use crate::models::{Category, NewCategory, NewUser, User};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: UserId,
    username: String,
    email: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = row
            .email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
            })?;
        let role: Role = row.role.parse().map_err(RepositoryError::DataCorruption)?;

        Ok(Self {
            id: row.id,
            username: row.username,
            email,
            role,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: CategoryId,
    name: String,
    parent_id: Option<CategoryId>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            parent_id: row.parent_id,
        }
    }
}

const USER_COLUMNS: &str = "id, username, email, role, created_at";

// =============================================================================
// Users
// =============================================================================

pub(super) async fn get(
    conn: &mut PgConnection,
    id: UserId,
) -> Result<Option<User>, RepositoryError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM bazaar.user WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    row.map(User::try_from).transpose()
}

pub(super) async fn get_by_username(
    conn: &mut PgConnection,
    username: &str,
) -> Result<Option<User>, RepositoryError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM bazaar.user WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(conn)
    .await?;

    row.map(User::try_from).transpose()
}

pub(super) async fn create(
    conn: &mut PgConnection,
    new: &NewUser,
) -> Result<User, RepositoryError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        r"
        INSERT INTO bazaar.user (username, email, role)
        VALUES ($1, $2, $3)
        RETURNING {USER_COLUMNS}
        "
    ))
    .bind(&new.username)
    .bind(new.email.as_ref().map(Email::as_str))
    .bind(new.role.as_str())
    .fetch_one(conn)
    .await
    .map_err(|e| conflict_on_unique(e, "username"))?;

    row.try_into()
}

// =============================================================================
// Categories
// =============================================================================

pub(super) async fn category(
    conn: &mut PgConnection,
    id: CategoryId,
) -> Result<Option<Category>, RepositoryError> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, parent_id FROM bazaar.category WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(Category::from))
}

pub(super) async fn category_by_name(
    conn: &mut PgConnection,
    name: &str,
) -> Result<Option<Category>, RepositoryError> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, parent_id FROM bazaar.category WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(Category::from))
}

pub(super) async fn create_category(
    conn: &mut PgConnection,
    new: &NewCategory,
) -> Result<Category, RepositoryError> {
    let row = sqlx::query_as::<_, CategoryRow>(
        r"
        INSERT INTO bazaar.category (name, parent_id)
        VALUES ($1, $2)
        RETURNING id, name, parent_id
        ",
    )
    .bind(&new.name)
    .bind(new.parent_id)
    .fetch_one(conn)
    .await
    .map_err(|e| conflict_on_unique(e, "category"))?;

    Ok(row.into())
}
