//! Seed the catalog from a YAML file.
//!
//! The file lists categories, users and products:
//!
//! ```yaml
//! categories:
//!   - name: Lighting
//!   - name: Desk Lamps
//!     parent: Lighting
//! users:
//!   - username: sam
//!     email: sam@example.com
//!     role: seller
//! products:
//!   - name: Brass Lamp
//!     description: Warm light for small desks
//!     price: "49.90"
//!     stock: 12
//!     category: Desk Lamps
//!     seller: sam
//! ```
//!
//! Everything is written in one transaction. Categories and users that
//! already exist (by name) are left alone, so re-running a file only adds
//! what is new; products are always inserted.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use bazaar_core::{CategoryId, Price, PriceError, UserId};
use bazaar_storefront::db::{RepositoryError, Store, StoreTx};
use bazaar_storefront::models::{NewCategory, NewProduct, NewUser};

use super::CommandResult;

/// Seeding failures.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Invalid price for {product}: {source}")]
    InvalidPrice {
        product: String,
        #[source]
        source: PriceError,
    },

    #[error("Invalid stock for {0}: must not be negative")]
    InvalidStock(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Contents of a seed file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub categories: Vec<SeedCategory>,
    pub users: Vec<NewUser>,
    pub products: Vec<SeedProduct>,
}

#[derive(Debug, Deserialize)]
pub struct SeedCategory {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
    /// Category name.
    pub category: String,
    /// Seller username.
    pub seller: String,
}

/// What a seed run wrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories: usize,
    pub users: usize,
    pub products: usize,
    pub skipped: usize,
}

/// Seed from the YAML file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if seeding fails.
pub async fn from_file<S: Store>(store: &S, path: &str) -> CommandResult {
    let path = Path::new(path);
    if !path.exists() {
        return Err(format!("File not found: {}", path.display()).into());
    }

    info!(path = %path.display(), "Loading seed file");
    let content = tokio::fs::read_to_string(path).await.map_err(SeedError::from)?;
    let file: SeedFile = serde_yaml::from_str(&content).map_err(SeedError::from)?;

    let summary = seed(store, &file).await?;
    info!(
        categories = summary.categories,
        users = summary.users,
        products = summary.products,
        skipped = summary.skipped,
        "Seeding complete"
    );
    Ok(())
}

/// Write the contents of `file` in a single transaction.
///
/// Categories may name a parent defined earlier in the file or already in
/// the store. Products may reference categories and sellers the same way.
///
/// # Errors
///
/// Returns an error, writing nothing, if a reference cannot be resolved, a
/// price or stock is invalid, or the store fails.
pub async fn seed<S: Store>(store: &S, file: &SeedFile) -> Result<SeedSummary, SeedError> {
    let mut tx = store.begin().await?;
    let mut summary = SeedSummary::default();

    for category in &file.categories {
        if tx.category_by_name(&category.name).await?.is_some() {
            summary.skipped += 1;
            continue;
        }
        let parent_id = match &category.parent {
            Some(parent) => Some(category_id(&mut tx, parent).await?),
            None => None,
        };
        tx.insert_category(&NewCategory {
            name: category.name.clone(),
            parent_id,
        })
        .await?;
        summary.categories += 1;
    }

    for user in &file.users {
        if tx.user_by_username(&user.username).await?.is_some() {
            summary.skipped += 1;
            continue;
        }
        tx.insert_user(user).await?;
        summary.users += 1;
    }

    for product in &file.products {
        let price = Price::new(product.price).map_err(|source| SeedError::InvalidPrice {
            product: product.name.clone(),
            source,
        })?;
        if product.stock < 0 {
            return Err(SeedError::InvalidStock(product.name.clone()));
        }
        let category_id = category_id(&mut tx, &product.category).await?;
        let seller = seller_id(&mut tx, &product.seller).await?;
        tx.insert_product(
            seller,
            &NewProduct {
                name: product.name.clone(),
                description: product.description.clone(),
                price,
                stock: product.stock,
                category_id,
            },
        )
        .await?;
        summary.products += 1;
    }

    tx.commit().await?;
    Ok(summary)
}

async fn category_id<T: StoreTx>(tx: &mut T, name: &str) -> Result<CategoryId, SeedError> {
    tx.category_by_name(name)
        .await?
        .map(|category| category.id)
        .ok_or_else(|| SeedError::UnknownCategory(name.to_string()))
}

async fn seller_id<T: StoreTx>(tx: &mut T, username: &str) -> Result<UserId, SeedError> {
    tx.user_by_username(username)
        .await?
        .map(|user| user.id)
        .ok_or_else(|| SeedError::UnknownUser(username.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use bazaar_core::Role;
    use bazaar_storefront::db::MemoryStore;
    use bazaar_storefront::models::ProductQuery;

    const SEED: &str = r#"
categories:
  - name: Lighting
  - name: Desk Lamps
    parent: Lighting
users:
  - username: sam
    email: sam@example.com
    role: seller
  - username: alice
products:
  - name: Brass Lamp
    price: "49.90"
    stock: 12
    category: Desk Lamps
    seller: sam
"#;

    #[tokio::test]
    async fn test_seed_writes_everything() {
        let store = MemoryStore::new();
        let file: SeedFile = serde_yaml::from_str(SEED).unwrap();

        let summary = seed(&store, &file).await.unwrap();
        assert_eq!(
            summary,
            SeedSummary {
                categories: 2,
                users: 2,
                products: 1,
                skipped: 0,
            }
        );

        let mut tx = store.begin().await.unwrap();
        let lighting = tx.category_by_name("Lighting").await.unwrap().unwrap();
        let lamps = tx.category_by_name("Desk Lamps").await.unwrap().unwrap();
        assert_eq!(lamps.parent_id, Some(lighting.id));

        let alice = tx.user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(alice.role, Role::Customer);
        assert!(alice.email.is_none());

        let page = tx.list_products(&ProductQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].price, Price::from_cents(4990).unwrap());
        assert_eq!(page.items[0].category_id, lamps.id);
    }

    #[tokio::test]
    async fn test_reseeding_skips_existing_categories_and_users() {
        let store = MemoryStore::new();
        let file: SeedFile = serde_yaml::from_str(SEED).unwrap();
        seed(&store, &file).await.unwrap();

        let summary = seed(&store, &file).await.unwrap();
        assert_eq!(summary.categories, 0);
        assert_eq!(summary.users, 0);
        assert_eq!(summary.skipped, 4);
    }

    #[tokio::test]
    async fn test_unknown_seller_writes_nothing() {
        let store = MemoryStore::new();
        let file: SeedFile = serde_yaml::from_str(
            r#"
categories:
  - name: Lighting
products:
  - name: Lamp
    price: "10.00"
    stock: 1
    category: Lighting
    seller: nobody
"#,
        )
        .unwrap();

        let err = seed(&store, &file).await.unwrap_err();
        assert!(matches!(err, SeedError::UnknownUser(name) if name == "nobody"));

        let mut tx = store.begin().await.unwrap();
        assert!(tx.category_by_name("Lighting").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_overly_precise_price() {
        let store = MemoryStore::new();
        let file: SeedFile = serde_yaml::from_str(
            r#"
categories:
  - name: Lighting
users:
  - username: sam
    role: seller
products:
  - name: Lamp
    price: "10.005"
    stock: 1
    category: Lighting
    seller: sam
"#,
        )
        .unwrap();

        let err = seed(&store, &file).await.unwrap_err();
        assert!(matches!(err, SeedError::InvalidPrice { .. }));
    }
}
