//! Application state shared across callers.

use std::sync::Arc;

use lettre::transport::smtp::Error as SmtpError;

use crate::config::{CacheConfig, StorefrontConfig};
use crate::db::Store;
use crate::services::{
    CartService, CatalogService, CheckoutService, LogMailer, Mailer, NotificationDispatcher,
    NotificationWorker, OrderService, ProductCache, ReviewService, SmtpMailer,
};

/// Application state shared across all callers.
///
/// This struct is cheaply cloneable via `Arc` and hands out the services,
/// which borrow the store, the product cache and the notification queue.
pub struct AppState<S: Store> {
    inner: Arc<AppStateInner<S>>,
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AppStateInner<S> {
    store: S,
    cache: ProductCache,
    notifier: NotificationDispatcher,
}

impl<S: Store> AppState<S> {
    /// Create application state from its parts.
    #[must_use]
    pub fn new(store: S, cache_config: &CacheConfig, notifier: NotificationDispatcher) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                cache: ProductCache::new(cache_config),
                notifier,
            }),
        }
    }

    /// Create application state from configuration and start the
    /// notification worker.
    ///
    /// Sends email over SMTP when it is configured and to the log otherwise.
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP relay address is invalid.
    pub fn from_config(
        config: &StorefrontConfig,
        store: S,
    ) -> Result<(Self, NotificationWorker), SmtpError> {
        let mailer: Arc<dyn Mailer> = match &config.email {
            Some(email) => Arc::new(SmtpMailer::new(email)?),
            None => {
                tracing::warn!("SMTP not configured, emails will be logged only");
                Arc::new(LogMailer)
            }
        };
        let (notifier, worker) = NotificationDispatcher::spawn(mailer, &config.notifications);
        Ok((Self::new(store, &config.cache, notifier), worker))
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Get a reference to the product cache.
    #[must_use]
    pub fn cache(&self) -> &ProductCache {
        &self.inner.cache
    }

    /// Get a reference to the notification dispatcher.
    #[must_use]
    pub fn notifier(&self) -> &NotificationDispatcher {
        &self.inner.notifier
    }

    /// Cart operations.
    #[must_use]
    pub fn carts(&self) -> CartService<'_, S> {
        CartService::new(&self.inner.store)
    }

    /// Checkout.
    #[must_use]
    pub fn checkout(&self) -> CheckoutService<'_, S> {
        CheckoutService::new(&self.inner.store, &self.inner.cache, &self.inner.notifier)
    }

    /// Order operations.
    #[must_use]
    pub fn orders(&self) -> OrderService<'_, S> {
        OrderService::new(&self.inner.store)
    }

    /// Catalog operations.
    #[must_use]
    pub fn catalog(&self) -> CatalogService<'_, S> {
        CatalogService::new(&self.inner.store, &self.inner.cache, &self.inner.notifier)
    }

    /// Review operations.
    #[must_use]
    pub fn reviews(&self) -> ReviewService<'_, S> {
        ReviewService::new(&self.inner.store)
    }
}
