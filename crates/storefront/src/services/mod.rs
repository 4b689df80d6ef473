//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `cart` - Cart line management
//! - `checkout` - Cart to order conversion
//! - `orders` - Order queries and lifecycle
//! - `catalog` - Cached product reads, product writes, back-in-stock subscriptions
//! - `reviews` - Product reviews
//! - `notifications` - Queued, retrying email delivery
//!
//! Services borrow what they need from [`AppState`](crate::state::AppState)
//! and are cheap to construct per call.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod notifications;
pub mod orders;
pub mod reviews;

pub use cart::CartService;
pub use catalog::{CatalogService, ProductCache};
pub use checkout::{CheckoutPlan, CheckoutService, PlannedLine, plan_checkout};
pub use notifications::{
    EmailMessage, LogMailer, Mailer, Notification, NotificationDispatcher, NotificationWorker,
    NotifyError, RetryPolicy, SmtpMailer,
};
pub use orders::OrderService;
pub use reviews::ReviewService;
