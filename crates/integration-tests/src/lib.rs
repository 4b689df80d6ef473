//! Integration tests for Bazaar.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory store tests
//! cargo test -p bazaar-integration-tests
//!
//! # PostgreSQL tests (needs a migrated database)
//! DATABASE_URL=postgres://... cargo test -p bazaar-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `checkout` - Cart to order conversion, stock and atomicity
//! - `carts` - Cart line management and ownership
//! - `orders` - Order visibility, cancellation and status updates
//! - `catalog` - Listings, caching and back-in-stock notifications
//! - `postgres` - The same flows against a real database
//!
//! This crate holds the shared fixtures; the tests live under `tests/`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use bazaar_core::{Email, Price, Principal, ProductId, Role};
use bazaar_storefront::config::{CacheConfig, NotificationConfig};
use bazaar_storefront::db::{MemoryStore, Store, StoreTx};
use bazaar_storefront::models::{Category, NewCategory, NewProduct, NewUser, Product};
use bazaar_storefront::services::{
    EmailMessage, Mailer, NotificationDispatcher, NotificationWorker, NotifyError,
};
use bazaar_storefront::state::AppState;

// =============================================================================
// Mailer
// =============================================================================

/// Records every message it is asked to send. Can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    failures_left: AtomicU32,
    attempts: AtomicU32,
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    /// A mailer that always succeeds.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A mailer that fails the first `failures` sends.
    #[must_use]
    pub fn failing_first(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicU32::new(failures),
            ..Self::default()
        })
    }

    /// Messages delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send attempts so far, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(NotifyError::Unavailable("relay down".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}

/// Notification settings with millisecond retries.
#[must_use]
pub const fn fast_notifications() -> NotificationConfig {
    NotificationConfig {
        max_attempts: 3,
        retry_base_delay: Duration::from_millis(1),
        queue_capacity: 64,
    }
}

// =============================================================================
// Test App
// =============================================================================

/// Application state over an in-memory store, with a recording mailer.
pub struct TestApp {
    pub state: AppState<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    worker: NotificationWorker,
}

impl TestApp {
    /// An app whose mailer always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mailer(RecordingMailer::new())
    }

    /// An app delivering through `mailer`.
    #[must_use]
    pub fn with_mailer(mailer: Arc<RecordingMailer>) -> Self {
        let (notifier, worker) = NotificationDispatcher::spawn(mailer.clone(), &fast_notifications());
        Self {
            state: AppState::new(MemoryStore::new(), &CacheConfig::default(), notifier),
            mailer,
            worker,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        self.state.store()
    }

    /// Shut down and return every message the worker delivered.
    ///
    /// Every clone of `state` must have been dropped, or this waits forever.
    pub async fn finish(self) -> Vec<EmailMessage> {
        drop(self.state);
        self.worker.finish().await;
        self.mailer.sent()
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Create a user and return the principal they act as.
///
/// # Panics
///
/// Panics if the user cannot be created.
pub async fn create_user<S: Store>(
    store: &S,
    username: &str,
    role: Role,
    email: Option<&str>,
) -> Principal {
    let mut tx = store.begin().await.expect("begin");
    let user = tx
        .insert_user(&NewUser {
            username: username.to_string(),
            email: email.map(|e| Email::parse(e).expect("valid email")),
            role,
        })
        .await
        .expect("insert user");
    tx.commit().await.expect("commit");
    user.principal()
}

/// Create a category.
///
/// # Panics
///
/// Panics if the category cannot be created.
pub async fn create_category<S: Store>(store: &S, name: &str) -> Category {
    let mut tx = store.begin().await.expect("begin");
    let category = tx
        .insert_category(&NewCategory {
            name: name.to_string(),
            parent_id: None,
        })
        .await
        .expect("insert category");
    tx.commit().await.expect("commit");
    category
}

/// List a product for `seller` in `category`.
///
/// # Panics
///
/// Panics if the product cannot be created.
pub async fn create_product<S: Store>(
    store: &S,
    seller: &Principal,
    category: &Category,
    name: &str,
    price: &str,
    stock: i32,
) -> Product {
    let mut tx = store.begin().await.expect("begin");
    let product = tx
        .insert_product(
            seller.id,
            &NewProduct {
                name: name.to_string(),
                description: String::new(),
                price: price_of(price),
                stock,
                category_id: category.id,
            },
        )
        .await
        .expect("insert product");
    tx.commit().await.expect("commit");
    product
}

/// Current stock of a product, bypassing every cache.
///
/// # Panics
///
/// Panics if the product does not exist.
pub async fn stock_of<S: Store>(store: &S, id: ProductId) -> i32 {
    let mut tx = store.begin().await.expect("begin");
    tx.product(id).await.expect("read product").expect("product exists").stock
}

/// Parse a price literal such as `"4.50"`.
///
/// # Panics
///
/// Panics if the literal is not a valid price.
#[must_use]
pub fn price_of(literal: &str) -> Price {
    Price::new(literal.parse().expect("decimal literal")).expect("valid price")
}

/// A seller, a category and a customer with an email address.
pub struct Shop {
    pub seller: Principal,
    pub customer: Principal,
    pub category: Category,
}

impl Shop {
    /// Create the seller `sam`, the customer `alice` and the category `Tea`.
    pub async fn open<S: Store>(store: &S) -> Self {
        Self {
            seller: create_user(store, "sam", Role::Seller, Some("sam@example.com")).await,
            customer: create_user(store, "alice", Role::Customer, Some("alice@example.com")).await,
            category: create_category(store, "Tea").await,
        }
    }

    /// List a product in the shop's category.
    pub async fn product<S: Store>(&self, store: &S, name: &str, price: &str, stock: i32) -> Product {
        create_product(store, &self.seller, &self.category, name, price, stock).await
    }
}
