//! In-process adapter for the store ports.
//!
//! One `tokio::sync::Mutex` guards the whole state. A transaction holds the
//! owned guard for its lifetime and works on a staged copy; `commit` swaps
//! the copy in, dropping the transaction discards it. Transactions are
//! therefore fully serialized, which gives the same observable guarantees as
//! the row locks of the `PostgreSQL` adapter.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use bazaar_core::{
    CartId, CartItemId, CategoryId, OrderId, OrderItemId, OrderStatus, Price, ProductId,
    ReviewId, SubscriptionId, UserId,
};

use super::{RepositoryError, Store, StoreTx};
use crate::models::{
    Cart, CartItem, Category, NewCategory, NewProduct, NewReview, NewUser, Order, OrderItem,
    Product, ProductPage, ProductQuery, ProductSubscription, Review, User,
};

/// Store held entirely in memory. Cloning shares the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, RepositoryError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTx { guard, staged })
    }
}

/// Last issued ID per table.
#[derive(Debug, Clone, Default)]
struct Sequences {
    user: i64,
    category: i64,
    product: i64,
    subscription: i64,
    cart: i64,
    cart_item: i64,
    order: i64,
    order_item: i64,
    review: i64,
}

fn next(sequence: &mut i64) -> i64 {
    *sequence += 1;
    *sequence
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    seq: Sequences,
    users: BTreeMap<UserId, User>,
    categories: BTreeMap<CategoryId, Category>,
    products: BTreeMap<ProductId, Product>,
    subscriptions: BTreeMap<SubscriptionId, ProductSubscription>,
    carts: BTreeMap<CartId, Cart>,
    cart_items: BTreeMap<CartItemId, CartItem>,
    /// Orders are stored without lines; `order_items` holds those.
    orders: BTreeMap<OrderId, Order>,
    order_items: BTreeMap<OrderItemId, OrderItem>,
    reviews: BTreeMap<ReviewId, Review>,
}

impl MemoryState {
    fn with_items(&self, order: &Order) -> Order {
        let items = self
            .order_items
            .values()
            .filter(|item| item.order_id == order.id)
            .cloned()
            .collect();
        Order {
            items,
            ..order.clone()
        }
    }

    fn cart_of(&self, owner: UserId) -> Option<&Cart> {
        self.carts.values().find(|cart| cart.owner == owner)
    }

    fn check_product(&self, product: &Product) -> Result<(), RepositoryError> {
        if product.stock < 0 {
            return Err(RepositoryError::Conflict(format!(
                "product {} stock cannot be negative",
                product.id
            )));
        }
        if !self.categories.contains_key(&product.category_id) {
            return Err(RepositoryError::Conflict(format!(
                "category {} does not exist",
                product.category_id
            )));
        }
        Ok(())
    }
}

/// An open in-memory transaction.
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn user(&mut self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.staged.users.get(&id).cloned())
    }

    async fn user_by_username(&mut self, username: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .staged
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn insert_user(&mut self, new: &NewUser) -> Result<User, RepositoryError> {
        let state = &mut self.staged;
        if state.users.values().any(|u| u.username == new.username) {
            return Err(RepositoryError::Conflict("username already exists".to_owned()));
        }
        let user = User {
            id: UserId::new(next(&mut state.seq.user)),
            username: new.username.clone(),
            email: new.email.clone(),
            role: new.role,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn category(&mut self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        Ok(self.staged.categories.get(&id).cloned())
    }

    async fn category_by_name(&mut self, name: &str) -> Result<Option<Category>, RepositoryError> {
        Ok(self
            .staged
            .categories
            .values()
            .find(|category| category.name == name)
            .cloned())
    }

    async fn insert_category(&mut self, new: &NewCategory) -> Result<Category, RepositoryError> {
        let state = &mut self.staged;
        if state.categories.values().any(|c| c.name == new.name) {
            return Err(RepositoryError::Conflict("category already exists".to_owned()));
        }
        let category = Category {
            id: CategoryId::new(next(&mut state.seq.category)),
            name: new.name.clone(),
            parent_id: new.parent_id,
        };
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.staged.products.get(&id).cloned())
    }

    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        // BTreeMap iteration is already ascending by ID.
        Ok(self
            .staged
            .products
            .values()
            .filter(|product| ids.contains(&product.id))
            .cloned()
            .collect())
    }

    async fn list_products(&mut self, query: &ProductQuery) -> Result<ProductPage, RepositoryError> {
        let query = query.clone().normalized();
        let named: Option<Vec<CategoryId>> = query.category_name.as_deref().map(|name| {
            let name = name.to_lowercase();
            self.staged
                .categories
                .values()
                .filter(|category| category.name.to_lowercase() == name)
                .map(|category| category.id)
                .collect()
        });
        let mut matching: Vec<&Product> = self
            .staged
            .products
            .values()
            .filter(|product| query.matches(product))
            .filter(|product| named.as_ref().is_none_or(|ids| ids.contains(&product.category_id)))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let skip = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let take = usize::try_from(query.page_size).unwrap_or(usize::MAX);
        Ok(ProductPage {
            total: matching.len() as u64,
            items: matching.into_iter().skip(skip).take(take).cloned().collect(),
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn insert_product(
        &mut self,
        seller: UserId,
        new: &NewProduct,
    ) -> Result<Product, RepositoryError> {
        let state = &mut self.staged;
        let product = Product {
            id: ProductId::new(state.seq.product + 1),
            name: new.name.clone(),
            description: new.description.clone(),
            price: new.price,
            stock: new.stock,
            category_id: new.category_id,
            seller_id: seller,
            created_at: Utc::now(),
        };
        state.check_product(&product)?;
        next(&mut state.seq.product);
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn save_product(&mut self, product: &Product) -> Result<Product, RepositoryError> {
        let state = &mut self.staged;
        state.check_product(product)?;
        let stored = state
            .products
            .get_mut(&product.id)
            .ok_or(RepositoryError::NotFound)?;
        stored.name.clone_from(&product.name);
        stored.description.clone_from(&product.description);
        stored.price = product.price;
        stored.stock = product.stock;
        stored.category_id = product.category_id;
        Ok(stored.clone())
    }

    async fn delete_product(&mut self, id: ProductId) -> Result<bool, RepositoryError> {
        let state = &mut self.staged;
        if state.products.remove(&id).is_none() {
            return Ok(false);
        }
        state.cart_items.retain(|_, item| item.product_id != id);
        state.subscriptions.retain(|_, sub| sub.product_id != id);
        state.reviews.retain(|_, review| review.product_id != id);
        for item in state.order_items.values_mut() {
            if item.product_id == Some(id) {
                item.product_id = None;
            }
        }
        Ok(true)
    }

    async fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: i32,
    ) -> Result<bool, RepositoryError> {
        match self.staged.products.get_mut(&id) {
            Some(product) if product.stock >= quantity => {
                product.stock -= quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_subscription(
        &mut self,
        user: UserId,
        product: ProductId,
    ) -> Result<ProductSubscription, RepositoryError> {
        let state = &mut self.staged;
        if let Some(existing) = state
            .subscriptions
            .values()
            .find(|sub| sub.user_id == user && sub.product_id == product)
        {
            return Ok(existing.clone());
        }
        if !state.products.contains_key(&product) {
            return Err(RepositoryError::NotFound);
        }
        let subscription = ProductSubscription {
            id: SubscriptionId::new(next(&mut state.seq.subscription)),
            user_id: user,
            product_id: product,
            subscribed_at: Utc::now(),
        };
        state
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn drain_subscriptions(
        &mut self,
        product: ProductId,
    ) -> Result<Vec<ProductSubscription>, RepositoryError> {
        let (drained, kept): (BTreeMap<_, _>, BTreeMap<_, _>) =
            std::mem::take(&mut self.staged.subscriptions)
                .into_iter()
                .partition(|(_, sub)| sub.product_id == product);
        self.staged.subscriptions = kept;
        Ok(drained.into_values().collect())
    }

    async fn get_or_create_cart(&mut self, owner: UserId) -> Result<Cart, RepositoryError> {
        let state = &mut self.staged;
        if let Some(cart) = state.cart_of(owner) {
            return Ok(cart.clone());
        }
        let cart = Cart {
            id: CartId::new(next(&mut state.seq.cart)),
            owner,
            created_at: Utc::now(),
        };
        state.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn cart_for_update(&mut self, owner: UserId) -> Result<Cart, RepositoryError> {
        self.get_or_create_cart(owner).await
    }

    async fn cart(&mut self, id: CartId) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.staged.carts.get(&id).cloned())
    }

    async fn cart_items(&mut self, cart: CartId) -> Result<Vec<CartItem>, RepositoryError> {
        Ok(self
            .staged
            .cart_items
            .values()
            .filter(|item| item.cart_id == cart)
            .cloned()
            .collect())
    }

    async fn cart_item(&mut self, id: CartItemId) -> Result<Option<CartItem>, RepositoryError> {
        Ok(self.staged.cart_items.get(&id).cloned())
    }

    async fn add_to_cart(
        &mut self,
        cart: CartId,
        product: ProductId,
        quantity: i32,
    ) -> Result<CartItem, RepositoryError> {
        let state = &mut self.staged;
        if let Some(line) = state
            .cart_items
            .values_mut()
            .find(|item| item.cart_id == cart && item.product_id == product)
        {
            line.quantity = line.quantity.checked_add(quantity).ok_or_else(|| {
                RepositoryError::Conflict("cart line quantity out of range".to_owned())
            })?;
            return Ok(line.clone());
        }
        let line = CartItem {
            id: CartItemId::new(next(&mut state.seq.cart_item)),
            cart_id: cart,
            product_id: product,
            quantity,
        };
        state.cart_items.insert(line.id, line.clone());
        Ok(line)
    }

    async fn set_cart_item_quantity(
        &mut self,
        id: CartItemId,
        quantity: i32,
    ) -> Result<CartItem, RepositoryError> {
        let line = self
            .staged
            .cart_items
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        line.quantity = quantity;
        Ok(line.clone())
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<bool, RepositoryError> {
        Ok(self.staged.cart_items.remove(&id).is_some())
    }

    async fn clear_cart(&mut self, cart: CartId) -> Result<u64, RepositoryError> {
        let before = self.staged.cart_items.len();
        self.staged.cart_items.retain(|_, item| item.cart_id != cart);
        Ok((before - self.staged.cart_items.len()) as u64)
    }

    async fn insert_order(
        &mut self,
        owner: UserId,
        status: OrderStatus,
        total_price: Price,
    ) -> Result<Order, RepositoryError> {
        let state = &mut self.staged;
        let order = Order {
            id: OrderId::new(next(&mut state.seq.order)),
            owner,
            status,
            total_price,
            created_at: Utc::now(),
            items: Vec::new(),
        };
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn insert_order_item(
        &mut self,
        order: OrderId,
        product: ProductId,
        quantity: i32,
        price: Price,
    ) -> Result<OrderItem, RepositoryError> {
        let state = &mut self.staged;
        if !state.orders.contains_key(&order) {
            return Err(RepositoryError::NotFound);
        }
        let item = OrderItem {
            id: OrderItemId::new(next(&mut state.seq.order_item)),
            order_id: order,
            product_id: Some(product),
            quantity,
            price,
        };
        state.order_items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn set_order_total(&mut self, id: OrderId, total: Price) -> Result<(), RepositoryError> {
        let order = self
            .staged
            .orders
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        order.total_price = total;
        Ok(())
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .staged
            .orders
            .get(&id)
            .map(|order| self.staged.with_items(order)))
    }

    async fn orders(&mut self, owner: Option<UserId>) -> Result<Vec<Order>, RepositoryError> {
        Ok(self
            .staged
            .orders
            .values()
            .filter(|order| owner.is_none_or(|owner| order.owner == owner))
            .map(|order| self.staged.with_items(order))
            .collect())
    }

    async fn set_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let order = self
            .staged
            .orders
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        order.status = status;
        let order = order.clone();
        Ok(self.staged.with_items(&order))
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<bool, RepositoryError> {
        let state = &mut self.staged;
        if state.orders.remove(&id).is_none() {
            return Ok(false);
        }
        state.order_items.retain(|_, item| item.order_id != id);
        Ok(true)
    }

    async fn reviews(&mut self, product: ProductId) -> Result<Vec<Review>, RepositoryError> {
        Ok(self
            .staged
            .reviews
            .values()
            .filter(|review| review.product_id == product)
            .cloned()
            .collect())
    }

    async fn review(&mut self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
        Ok(self.staged.reviews.get(&id).cloned())
    }

    async fn insert_review(
        &mut self,
        product: ProductId,
        author: UserId,
        new: &NewReview,
    ) -> Result<Review, RepositoryError> {
        let state = &mut self.staged;
        if state
            .reviews
            .values()
            .any(|review| review.product_id == product && review.author == author)
        {
            return Err(RepositoryError::Conflict("review already exists".to_owned()));
        }
        if !state.products.contains_key(&product) {
            return Err(RepositoryError::Conflict(format!("product {product} does not exist")));
        }
        let review = Review {
            id: ReviewId::new(next(&mut state.seq.review)),
            product_id: product,
            author,
            rating: new.rating,
            comment: new.comment.clone(),
            created_at: Utc::now(),
        };
        state.reviews.insert(review.id, review.clone());
        Ok(review)
    }

    async fn save_review(&mut self, review: &Review) -> Result<Review, RepositoryError> {
        let stored = self
            .staged
            .reviews
            .get_mut(&review.id)
            .ok_or(RepositoryError::NotFound)?;
        stored.rating = review.rating;
        stored.comment.clone_from(&review.comment);
        Ok(stored.clone())
    }

    async fn delete_review(&mut self, id: ReviewId) -> Result<bool, RepositoryError> {
        Ok(self.staged.reviews.remove(&id).is_some())
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        let Self { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }
}
