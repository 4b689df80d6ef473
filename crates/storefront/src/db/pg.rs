//! `PostgreSQL` adapter for the store ports.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use bazaar_core::{
    CartId, CartItemId, CategoryId, OrderId, OrderStatus, Price, ProductId, ReviewId, UserId,
};

use super::{RepositoryError, Store, StoreTx, carts, catalog, orders, reviews, users};
use crate::models::{
    Cart, CartItem, Category, NewCategory, NewProduct, NewReview, NewUser, Order, OrderItem,
    Product, ProductPage, ProductQuery, ProductSubscription, Review, User,
};

/// Store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, RepositoryError> {
        Ok(PgTx {
            tx: self.pool.begin().await?,
        })
    }
}

/// An open `PostgreSQL` transaction. Rolled back on drop unless committed.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn user(&mut self, id: UserId) -> Result<Option<User>, RepositoryError> {
        users::get(&mut self.tx, id).await
    }

    async fn user_by_username(&mut self, username: &str) -> Result<Option<User>, RepositoryError> {
        users::get_by_username(&mut self.tx, username).await
    }

    async fn insert_user(&mut self, new: &NewUser) -> Result<User, RepositoryError> {
        users::create(&mut self.tx, new).await
    }

    async fn category(&mut self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        users::category(&mut self.tx, id).await
    }

    async fn category_by_name(&mut self, name: &str) -> Result<Option<Category>, RepositoryError> {
        users::category_by_name(&mut self.tx, name).await
    }

    async fn insert_category(&mut self, new: &NewCategory) -> Result<Category, RepositoryError> {
        users::create_category(&mut self.tx, new).await
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        catalog::get(&mut self.tx, id).await
    }

    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        catalog::lock(&mut self.tx, ids).await
    }

    async fn list_products(&mut self, query: &ProductQuery) -> Result<ProductPage, RepositoryError> {
        catalog::list(&mut self.tx, query).await
    }

    async fn insert_product(
        &mut self,
        seller: UserId,
        new: &NewProduct,
    ) -> Result<Product, RepositoryError> {
        catalog::create(&mut self.tx, seller, new).await
    }

    async fn save_product(&mut self, product: &Product) -> Result<Product, RepositoryError> {
        catalog::save(&mut self.tx, product).await
    }

    async fn delete_product(&mut self, id: ProductId) -> Result<bool, RepositoryError> {
        catalog::delete(&mut self.tx, id).await
    }

    async fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: i32,
    ) -> Result<bool, RepositoryError> {
        catalog::decrement_stock(&mut self.tx, id, quantity).await
    }

    async fn upsert_subscription(
        &mut self,
        user: UserId,
        product: ProductId,
    ) -> Result<ProductSubscription, RepositoryError> {
        catalog::upsert_subscription(&mut self.tx, user, product).await
    }

    async fn drain_subscriptions(
        &mut self,
        product: ProductId,
    ) -> Result<Vec<ProductSubscription>, RepositoryError> {
        catalog::drain_subscriptions(&mut self.tx, product).await
    }

    async fn get_or_create_cart(&mut self, owner: UserId) -> Result<Cart, RepositoryError> {
        carts::get_or_create(&mut self.tx, owner, false).await
    }

    async fn cart_for_update(&mut self, owner: UserId) -> Result<Cart, RepositoryError> {
        carts::get_or_create(&mut self.tx, owner, true).await
    }

    async fn cart(&mut self, id: CartId) -> Result<Option<Cart>, RepositoryError> {
        carts::get(&mut self.tx, id).await
    }

    async fn cart_items(&mut self, cart: CartId) -> Result<Vec<CartItem>, RepositoryError> {
        carts::items(&mut self.tx, cart).await
    }

    async fn cart_item(&mut self, id: CartItemId) -> Result<Option<CartItem>, RepositoryError> {
        carts::item(&mut self.tx, id).await
    }

    async fn add_to_cart(
        &mut self,
        cart: CartId,
        product: ProductId,
        quantity: i32,
    ) -> Result<CartItem, RepositoryError> {
        carts::add(&mut self.tx, cart, product, quantity).await
    }

    async fn set_cart_item_quantity(
        &mut self,
        id: CartItemId,
        quantity: i32,
    ) -> Result<CartItem, RepositoryError> {
        carts::set_quantity(&mut self.tx, id, quantity).await
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<bool, RepositoryError> {
        carts::delete_item(&mut self.tx, id).await
    }

    async fn clear_cart(&mut self, cart: CartId) -> Result<u64, RepositoryError> {
        carts::clear(&mut self.tx, cart).await
    }

    async fn insert_order(
        &mut self,
        owner: UserId,
        status: OrderStatus,
        total_price: Price,
    ) -> Result<Order, RepositoryError> {
        orders::create(&mut self.tx, owner, status, total_price).await
    }

    async fn insert_order_item(
        &mut self,
        order: OrderId,
        product: ProductId,
        quantity: i32,
        price: Price,
    ) -> Result<OrderItem, RepositoryError> {
        orders::create_item(&mut self.tx, order, product, quantity, price).await
    }

    async fn set_order_total(&mut self, id: OrderId, total: Price) -> Result<(), RepositoryError> {
        orders::set_total(&mut self.tx, id, total).await
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        orders::get(&mut self.tx, id).await
    }

    async fn orders(&mut self, owner: Option<UserId>) -> Result<Vec<Order>, RepositoryError> {
        orders::list(&mut self.tx, owner).await
    }

    async fn set_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        orders::set_status(&mut self.tx, id, status).await
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<bool, RepositoryError> {
        orders::delete(&mut self.tx, id).await
    }

    async fn reviews(&mut self, product: ProductId) -> Result<Vec<Review>, RepositoryError> {
        reviews::list(&mut self.tx, product).await
    }

    async fn review(&mut self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
        reviews::get(&mut self.tx, id).await
    }

    async fn insert_review(
        &mut self,
        product: ProductId,
        author: UserId,
        new: &NewReview,
    ) -> Result<Review, RepositoryError> {
        reviews::create(&mut self.tx, product, author, new).await
    }

    async fn save_review(&mut self, review: &Review) -> Result<Review, RepositoryError> {
        reviews::save(&mut self.tx, review).await
    }

    async fn delete_review(&mut self, id: ReviewId) -> Result<bool, RepositoryError> {
        reviews::delete(&mut self.tx, id).await
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }
}
