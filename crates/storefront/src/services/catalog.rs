//! Product catalog: cached reads, seller/admin writes and back-in-stock
//! subscriptions.
//!
//! Reads are served from `moka` caches (product detail and list pages, each
//! with its own TTL). Every write invalidates the affected entries before it
//! returns, so a caller never reads its own stale write.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::future::Cache;
use tracing::{debug, info, instrument};

use bazaar_core::{Action, Principal, ProductId, Resource, authorize};

use super::notifications::{Notification, NotificationDispatcher};
use crate::config::CacheConfig;
use crate::db::{Store, StoreTx};
use crate::error::{Result, StorefrontError, add_breadcrumb};
use crate::models::{
    NewProduct, Product, ProductPage, ProductQuery, ProductSubscription, ProductUpdate,
};

// =============================================================================
// ProductCache
// =============================================================================

/// Read-side cache for products and product list pages.
///
/// Cloning shares the underlying caches. Every invalidation bumps a
/// generation counter; a fill that started before an invalidation is
/// dropped again, so a slow reader cannot put back what a writer removed.
#[derive(Clone)]
pub struct ProductCache {
    products: Cache<ProductId, Product>,
    pages: Cache<ProductQuery, ProductPage>,
    generation: Arc<AtomicU64>,
}

impl ProductCache {
    /// Create empty caches sized and timed per `config`.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            products: Cache::builder()
                .max_capacity(config.capacity)
                .time_to_live(config.product_ttl)
                .build(),
            pages: Cache::builder()
                .max_capacity(config.capacity)
                .time_to_live(config.list_ttl)
                .build(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cached product, if present and fresh.
    pub async fn product(&self, id: ProductId) -> Option<Product> {
        self.products.get(&id).await
    }

    /// Cached list page, if present and fresh.
    pub async fn page(&self, query: &ProductQuery) -> Option<ProductPage> {
        self.pages.get(query).await
    }

    /// Drop the entries of `ids` and every list page.
    ///
    /// List pages embed stock and price, so any product change can make any
    /// page stale.
    pub async fn invalidate(&self, ids: &[ProductId]) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        for id in ids {
            self.products.invalidate(id).await;
        }
        self.pages.invalidate_all();
        debug!(products = ids.len(), "Invalidated product cache entries");
    }

    /// Drop every list page, keeping product entries.
    pub fn invalidate_pages(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.pages.invalidate_all();
    }

    /// Take before reading the store; hand to the matching `fill_*` call.
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    async fn fill_product(&self, seen: u64, product: Product) {
        let id = product.id;
        self.products.insert(id, product).await;
        if self.generation() != seen {
            self.products.invalidate(&id).await;
        }
    }

    async fn fill_page(&self, seen: u64, query: ProductQuery, page: ProductPage) {
        self.pages.insert(query.clone(), page).await;
        if self.generation() != seen {
            self.pages.invalidate(&query).await;
        }
    }
}

// =============================================================================
// CatalogService
// =============================================================================

/// Catalog operations over a store.
pub struct CatalogService<'a, S: Store> {
    store: &'a S,
    cache: &'a ProductCache,
    notifier: &'a NotificationDispatcher,
}

impl<'a, S: Store> CatalogService<'a, S> {
    /// Create a catalog service.
    #[must_use]
    pub const fn new(
        store: &'a S,
        cache: &'a ProductCache,
        notifier: &'a NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            cache,
            notifier,
        }
    }

    /// Get a product, from cache when possible.
    ///
    /// # Errors
    ///
    /// Returns `StorefrontError::NotFound` if the product does not exist.
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        if let Some(product) = self.cache.product(id).await {
            return Ok(product);
        }

        let seen = self.cache.generation();
        let mut tx = self.store.begin().await?;
        let product = tx
            .product(id)
            .await?
            .ok_or_else(|| StorefrontError::not_found("product", id))?;
        drop(tx);
        self.cache.fill_product(seen, product.clone()).await;
        Ok(product)
    }

    /// One page of products, newest first, from cache when possible.
    ///
    /// # Errors
    ///
    /// Returns `StorefrontError::Validation` if the price bounds are inverted.
    #[instrument(skip(self))]
    pub async fn list_products(&self, query: ProductQuery) -> Result<ProductPage> {
        let query = query.normalized();
        if let (Some(min), Some(max)) = (query.min_price, query.max_price)
            && min > max
        {
            return Err(StorefrontError::validation(
                "min_price",
                "must not exceed max_price",
            ));
        }
        if let Some(page) = self.cache.page(&query).await {
            return Ok(page);
        }

        let seen = self.cache.generation();
        let mut tx = self.store.begin().await?;
        let page = tx.list_products(&query).await?;
        drop(tx);
        self.cache.fill_page(seen, query, page.clone()).await;
        Ok(page)
    }

    /// List a new product sold by the caller.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the caller is a seller or admin, and
    /// `Validation` for an empty name, negative stock or unknown category.
    #[instrument(skip_all, fields(user_id = %principal.id))]
    pub async fn create_product(&self, principal: &Principal, new: NewProduct) -> Result<Product> {
        if !authorize(principal, Resource::Catalog, Action::Create).is_allowed() {
            return Err(StorefrontError::Forbidden);
        }
        validate_name(&new.name)?;
        validate_stock(new.stock)?;

        let mut tx = self.store.begin().await?;
        if tx.category(new.category_id).await?.is_none() {
            return Err(StorefrontError::validation("category_id", "unknown category"));
        }
        let product = tx.insert_product(principal.id, &new).await?;
        tx.commit().await?;

        self.cache.invalidate_pages();
        info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    /// Apply a partial update to a product.
    ///
    /// When stock goes from zero (or below) to positive, every subscription
    /// to the product is consumed in the same transaction and each
    /// subscriber with an email address is notified after commit.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown products, `Forbidden` unless the caller
    /// is an admin or the product's seller, and `Validation` for invalid
    /// fields.
    #[instrument(skip_all, fields(user_id = %principal.id, product_id = %id))]
    pub async fn update_product(
        &self,
        principal: &Principal,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        if let Some(stock) = update.stock {
            validate_stock(stock)?;
        }

        let mut tx = self.store.begin().await?;
        let current = lock_product(&mut tx, id).await?;
        if !authorize(
            principal,
            Resource::Product {
                seller: current.seller_id,
            },
            Action::Update,
        )
        .is_allowed()
        {
            return Err(StorefrontError::Forbidden);
        }
        if let Some(category_id) = update.category_id
            && tx.category(category_id).await?.is_none()
        {
            return Err(StorefrontError::validation("category_id", "unknown category"));
        }

        let was_out_of_stock = current.stock <= 0;
        let saved = tx.save_product(&update.apply(current)).await?;

        let mut notifications = Vec::new();
        if was_out_of_stock && saved.stock > 0 {
            for subscription in tx.drain_subscriptions(id).await? {
                let email = tx.user(subscription.user_id).await?.and_then(|u| u.email);
                if let Some(to) = email {
                    notifications.push(Notification::BackInStock {
                        to,
                        product_id: id,
                        product_name: saved.name.clone(),
                    });
                }
            }
        }
        tx.commit().await?;

        self.cache.invalidate(&[id]).await;
        if !notifications.is_empty() {
            info!(subscribers = notifications.len(), "Product back in stock");
        }
        for notification in notifications {
            self.notifier.dispatch(notification);
        }

        add_breadcrumb("catalog", "Product updated", &[("product_id", id.to_string())]);
        info!(stock = saved.stock, "Product updated");
        Ok(saved)
    }

    /// Delete a product.
    ///
    /// Cart lines and subscriptions for the product go with it; order lines
    /// keep their price snapshot and lose the product reference.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown products and `Forbidden` unless the
    /// caller is an admin or the product's seller.
    #[instrument(skip_all, fields(user_id = %principal.id, product_id = %id))]
    pub async fn delete_product(&self, principal: &Principal, id: ProductId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let product = lock_product(&mut tx, id).await?;
        if !authorize(
            principal,
            Resource::Product {
                seller: product.seller_id,
            },
            Action::Delete,
        )
        .is_allowed()
        {
            return Err(StorefrontError::Forbidden);
        }
        tx.delete_product(id).await?;
        tx.commit().await?;

        self.cache.invalidate(&[id]).await;
        info!("Product deleted");
        Ok(())
    }

    /// Ask to be notified when a product is back in stock. Subscribing twice
    /// returns the existing subscription.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown products.
    #[instrument(skip_all, fields(user_id = %principal.id, product_id = %id))]
    pub async fn subscribe(&self, principal: &Principal, id: ProductId) -> Result<ProductSubscription> {
        let mut tx = self.store.begin().await?;
        let product = tx
            .product(id)
            .await?
            .ok_or_else(|| StorefrontError::not_found("product", id))?;
        if !authorize(
            principal,
            Resource::Product {
                seller: product.seller_id,
            },
            Action::Subscribe,
        )
        .is_allowed()
        {
            return Err(StorefrontError::Forbidden);
        }
        let subscription = tx.upsert_subscription(principal.id, id).await?;
        tx.commit().await?;
        Ok(subscription)
    }
}

async fn lock_product<T: StoreTx>(tx: &mut T, id: ProductId) -> Result<Product> {
    tx.lock_products(&[id])
        .await?
        .pop()
        .ok_or_else(|| StorefrontError::not_found("product", id))
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StorefrontError::validation("name", "must not be empty"));
    }
    Ok(())
}

fn validate_stock(stock: i32) -> Result<()> {
    if stock < 0 {
        return Err(StorefrontError::validation("stock", "must not be negative"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::{Price, Role};

    use super::*;
    use crate::config::NotificationConfig;
    use crate::db::MemoryStore;
    use crate::models::{NewCategory, NewUser};
    use crate::services::notifications::LogMailer;

    struct Fixture {
        store: MemoryStore,
        cache: ProductCache,
        notifier: NotificationDispatcher,
        seller: Principal,
        product: Product,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = MemoryStore::new();
            let mut tx = store.begin().await.unwrap();
            let seller = tx
                .insert_user(&NewUser {
                    username: "seller".to_string(),
                    email: None,
                    role: Role::Seller,
                })
                .await
                .unwrap();
            let category = tx
                .insert_category(&NewCategory {
                    name: "Tea".to_string(),
                    parent_id: None,
                })
                .await
                .unwrap();
            let product = tx
                .insert_product(
                    seller.id,
                    &NewProduct {
                        name: "Sencha".to_string(),
                        description: String::new(),
                        price: Price::from_cents(1000).unwrap(),
                        stock: 5,
                        category_id: category.id,
                    },
                )
                .await
                .unwrap();
            tx.commit().await.unwrap();

            let (notifier, _worker) =
                NotificationDispatcher::spawn(Arc::new(LogMailer), &NotificationConfig::default());
            Self {
                store,
                cache: ProductCache::new(&CacheConfig::default()),
                notifier,
                seller: seller.principal(),
                product,
            }
        }

        fn catalog(&self) -> CatalogService<'_, MemoryStore> {
            CatalogService::new(&self.store, &self.cache, &self.notifier)
        }
    }

    #[tokio::test]
    async fn test_update_invalidates_cached_product() {
        let fx = Fixture::new().await;
        let catalog = fx.catalog();

        let cached = catalog.get_product(fx.product.id).await.unwrap();
        assert_eq!(cached.price, Price::from_cents(1000).unwrap());

        catalog
            .update_product(
                &fx.seller,
                fx.product.id,
                ProductUpdate {
                    price: Some(Price::from_cents(2000).unwrap()),
                    ..ProductUpdate::default()
                },
            )
            .await
            .unwrap();

        let fresh = catalog.get_product(fx.product.id).await.unwrap();
        assert_eq!(fresh.price, Price::from_cents(2000).unwrap());
    }

    #[tokio::test]
    async fn test_fill_after_invalidation_is_discarded() {
        let fx = Fixture::new().await;
        let query = ProductQuery::default();
        let page = ProductPage {
            items: vec![fx.product.clone()],
            page: 1,
            page_size: ProductQuery::DEFAULT_PAGE_SIZE,
            total: 1,
        };

        let seen = fx.cache.generation();
        fx.cache.invalidate(&[fx.product.id]).await;
        fx.cache.fill_product(seen, fx.product.clone()).await;
        fx.cache.fill_page(seen, query.clone(), page.clone()).await;
        assert!(fx.cache.product(fx.product.id).await.is_none());
        assert!(fx.cache.page(&query).await.is_none());

        let seen = fx.cache.generation();
        fx.cache.fill_product(seen, fx.product.clone()).await;
        fx.cache.fill_page(seen, query.clone(), page.clone()).await;
        assert_eq!(fx.cache.product(fx.product.id).await, Some(fx.product.clone()));
        assert_eq!(fx.cache.page(&query).await, Some(page));
    }

    #[tokio::test]
    async fn test_customer_cannot_update_product() {
        let fx = Fixture::new().await;
        let customer = Principal::new(bazaar_core::UserId::new(99), Role::Customer);

        let err = fx
            .catalog()
            .update_product(&customer, fx.product.id, ProductUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorefrontError::Forbidden));
    }

    #[tokio::test]
    async fn test_negative_stock_rejected() {
        let fx = Fixture::new().await;

        let err = fx
            .catalog()
            .update_product(
                &fx.seller,
                fx.product.id,
                ProductUpdate {
                    stock: Some(-1),
                    ..ProductUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorefrontError::Validation { field: "stock", .. }));
    }

    #[tokio::test]
    async fn test_list_rejects_inverted_price_bounds() {
        let fx = Fixture::new().await;
        let query = ProductQuery {
            min_price: Some(Price::from_cents(500).unwrap()),
            max_price: Some(Price::from_cents(100).unwrap()),
            ..ProductQuery::default()
        };

        let err = fx.catalog().list_products(query).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let fx = Fixture::new().await;
        let catalog = fx.catalog();

        let first = catalog.subscribe(&fx.seller, fx.product.id).await.unwrap();
        let second = catalog.subscribe(&fx.seller, fx.product.id).await.unwrap();
        assert_eq!(first.id, second.id);

        let err = catalog
            .subscribe(&fx.seller, ProductId::new(404))
            .await
            .unwrap_err();
        assert!(matches!(err, StorefrontError::NotFound { .. }));
    }
}
