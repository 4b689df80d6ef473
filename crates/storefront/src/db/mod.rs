//! Persistence for the storefront.
//!
//! Services talk to storage through two ports:
//!
//! - [`Store`] - a handle that can open transactions
//! - [`StoreTx`] - one open transaction; every read and write goes through it
//!
//! Dropping a `StoreTx` without calling [`StoreTx::commit`] rolls it back, so
//! a `?` anywhere in a service method releases the transaction with nothing
//! applied.
//!
//! # Adapters
//!
//! - [`PgStore`] - `PostgreSQL` via sqlx, row locks with `SELECT ... FOR UPDATE`
//! - [`MemoryStore`] - in-process, transactions serialized on one async mutex
//!   (feature `memory-store`, always on in unit tests)
//!
//! # Database schema: `bazaar`
//!
//! - `bazaar.user`, `bazaar.category`, `bazaar.product`
//! - `bazaar.product_subscription`
//! - `bazaar.cart`, `bazaar.cart_item`
//! - `bazaar.order`, `bazaar.order_item`
//! - `bazaar.review`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p bazaar-cli -- migrate
//! ```

mod carts;
mod catalog;
mod orders;
mod pg;
mod reviews;
mod users;

#[cfg(any(test, feature = "memory-store"))]
mod memory;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use bazaar_core::{
    CartId, CartItemId, CategoryId, OrderId, OrderStatus, Price, ProductId, ReviewId, UserId,
};

use crate::models::{
    Cart, CartItem, Category, NewCategory, NewProduct, NewReview, NewUser, Order, OrderItem,
    Product, ProductPage, ProductQuery, ProductSubscription, Review, User,
};

#[cfg(any(test, feature = "memory-store"))]
pub use memory::MemoryStore;
pub use pg::{PgStore, PgTx};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique username).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// A transactional store.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// The transaction type this store hands out.
    type Tx: StoreTx;

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if no connection can be acquired.
    async fn begin(&self) -> Result<Self::Tx, RepositoryError>;
}

/// One open transaction.
///
/// Methods named `*_for_update` and [`lock_products`](Self::lock_products)
/// take row locks held until commit or rollback. Collections are always
/// returned in ascending ID order unless stated otherwise.
#[async_trait]
pub trait StoreTx: Send {
    // -------------------------------------------------------------------------
    // Users and categories
    // -------------------------------------------------------------------------

    /// Get a user by ID.
    async fn user(&mut self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Get a user by username.
    async fn user_by_username(&mut self, username: &str) -> Result<Option<User>, RepositoryError>;

    /// Create a user. `Conflict` if the username is taken.
    async fn insert_user(&mut self, new: &NewUser) -> Result<User, RepositoryError>;

    /// Get a category by ID.
    async fn category(&mut self, id: CategoryId) -> Result<Option<Category>, RepositoryError>;

    /// Get a category by name.
    async fn category_by_name(&mut self, name: &str) -> Result<Option<Category>, RepositoryError>;

    /// Create a category. `Conflict` if the name is taken.
    async fn insert_category(&mut self, new: &NewCategory) -> Result<Category, RepositoryError>;

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    /// Get a product by ID without locking it.
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Lock the given products, in ascending ID order, and return the ones
    /// that exist.
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// One page of products matching `query`, newest first.
    async fn list_products(&mut self, query: &ProductQuery) -> Result<ProductPage, RepositoryError>;

    /// List a product sold by `seller`.
    async fn insert_product(
        &mut self,
        seller: UserId,
        new: &NewProduct,
    ) -> Result<Product, RepositoryError>;

    /// Overwrite a product's mutable fields. `NotFound` if it is gone.
    async fn save_product(&mut self, product: &Product) -> Result<Product, RepositoryError>;

    /// Delete a product. Returns whether it existed.
    async fn delete_product(&mut self, id: ProductId) -> Result<bool, RepositoryError>;

    /// Take `quantity` units from stock if at least that many are left.
    /// Returns `false`, changing nothing, when stock is short.
    async fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: i32,
    ) -> Result<bool, RepositoryError>;

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Subscribe a user to a product; an existing subscription is returned
    /// unchanged.
    async fn upsert_subscription(
        &mut self,
        user: UserId,
        product: ProductId,
    ) -> Result<ProductSubscription, RepositoryError>;

    /// Delete and return every subscription to `product`.
    async fn drain_subscriptions(
        &mut self,
        product: ProductId,
    ) -> Result<Vec<ProductSubscription>, RepositoryError>;

    // -------------------------------------------------------------------------
    // Carts
    // -------------------------------------------------------------------------

    /// Get the owner's cart, creating it if missing.
    async fn get_or_create_cart(&mut self, owner: UserId) -> Result<Cart, RepositoryError>;

    /// Like [`get_or_create_cart`](Self::get_or_create_cart), and lock the
    /// cart row.
    async fn cart_for_update(&mut self, owner: UserId) -> Result<Cart, RepositoryError>;

    /// Get a cart by ID.
    async fn cart(&mut self, id: CartId) -> Result<Option<Cart>, RepositoryError>;

    /// Lines of a cart.
    async fn cart_items(&mut self, cart: CartId) -> Result<Vec<CartItem>, RepositoryError>;

    /// Get a cart line by ID.
    async fn cart_item(&mut self, id: CartItemId) -> Result<Option<CartItem>, RepositoryError>;

    /// Add `quantity` to the (cart, product) line, creating it if missing.
    async fn add_to_cart(
        &mut self,
        cart: CartId,
        product: ProductId,
        quantity: i32,
    ) -> Result<CartItem, RepositoryError>;

    /// Set a line's quantity. `NotFound` if the line is gone.
    async fn set_cart_item_quantity(
        &mut self,
        id: CartItemId,
        quantity: i32,
    ) -> Result<CartItem, RepositoryError>;

    /// Delete a line. Returns whether it existed.
    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<bool, RepositoryError>;

    /// Delete every line of a cart, keeping the cart. Returns lines removed.
    async fn clear_cart(&mut self, cart: CartId) -> Result<u64, RepositoryError>;

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    /// Create an order with no lines.
    async fn insert_order(
        &mut self,
        owner: UserId,
        status: OrderStatus,
        total_price: Price,
    ) -> Result<Order, RepositoryError>;

    /// Add a line snapshot to an order.
    async fn insert_order_item(
        &mut self,
        order: OrderId,
        product: ProductId,
        quantity: i32,
        price: Price,
    ) -> Result<OrderItem, RepositoryError>;

    /// Set an order's total. `NotFound` if the order is gone.
    async fn set_order_total(&mut self, id: OrderId, total: Price) -> Result<(), RepositoryError>;

    /// Get an order with its lines.
    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Orders with their lines; every order when `owner` is `None`.
    async fn orders(&mut self, owner: Option<UserId>) -> Result<Vec<Order>, RepositoryError>;

    /// Set an order's status. `NotFound` if the order is gone.
    async fn set_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, RepositoryError>;

    /// Delete an order and its lines. Returns whether it existed.
    async fn delete_order(&mut self, id: OrderId) -> Result<bool, RepositoryError>;

    // -------------------------------------------------------------------------
    // Reviews
    // -------------------------------------------------------------------------

    /// Reviews of a product.
    async fn reviews(&mut self, product: ProductId) -> Result<Vec<Review>, RepositoryError>;

    /// Get a review by ID.
    async fn review(&mut self, id: ReviewId) -> Result<Option<Review>, RepositoryError>;

    /// Add a review. `Conflict` if the author already reviewed the product.
    async fn insert_review(
        &mut self,
        product: ProductId,
        author: UserId,
        new: &NewReview,
    ) -> Result<Review, RepositoryError>;

    /// Overwrite a review's rating and comment. `NotFound` if it is gone.
    async fn save_review(&mut self, review: &Review) -> Result<Review, RepositoryError>;

    /// Delete a review. Returns whether it existed.
    async fn delete_review(&mut self, id: ReviewId) -> Result<bool, RepositoryError>;

    // -------------------------------------------------------------------------

    /// Make every change of this transaction visible.
    async fn commit(self) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique-constraint violation to `Conflict`, anything else to `Database`.
fn conflict_on_unique(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(err)
}

/// Map a `RowNotFound` from `fetch_one` to `NotFound`.
fn not_found_on_missing_row(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        other => RepositoryError::Database(other),
    }
}

/// Re-validate a stored price.
fn stored_price(amount: rust_decimal::Decimal) -> Result<Price, RepositoryError> {
    Price::new(amount)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid price in database: {e}")))
}
