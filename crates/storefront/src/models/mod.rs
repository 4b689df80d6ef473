//! Domain models for the storefront.
//!
//! These are validated domain types, separate from the database row types
//! in [`crate::db`].

pub mod cart;
pub mod order;
pub mod product;
pub mod review;
pub mod user;

pub use cart::{Cart, CartContents, CartItem, CartItemUpdate};
pub use order::{Order, OrderItem, OrderUpdate};
pub use product::{
    Category, NewCategory, NewProduct, Product, ProductPage, ProductQuery, ProductSubscription,
    ProductUpdate,
};
pub use review::{NewReview, Review, ReviewUpdate};
pub use user::{NewUser, User};
