//! Catalog domain types: categories, products and back-in-stock subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::{CategoryId, Price, ProductId, SubscriptionId, UserId};

/// A product category. Categories may nest through `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub parent_id: Option<CategoryId>,
}

/// Input for creating a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Unique product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Long description.
    pub description: String,
    /// Current unit price. Orders snapshot this at checkout.
    pub price: Price,
    /// Units available. Never negative.
    pub stock: i32,
    /// Category the product is listed under.
    pub category_id: CategoryId,
    /// Seller who listed the product.
    pub seller_id: UserId,
    /// When the product was listed.
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Whether `quantity` units can be taken from current stock.
    #[must_use]
    pub const fn has_stock_for(&self, quantity: i32) -> bool {
        self.stock >= quantity
    }
}

/// Input for listing a product. The seller is always the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    pub stock: i32,
    pub category_id: CategoryId,
}

/// Partial product update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Price>,
    pub stock: Option<i32>,
    pub category_id: Option<CategoryId>,
}

impl ProductUpdate {
    /// Return `product` with this update applied.
    #[must_use]
    pub fn apply(&self, mut product: Product) -> Product {
        if let Some(name) = &self.name {
            product.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            product.description.clone_from(description);
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(category_id) = self.category_id {
            product.category_id = category_id;
        }
        product
    }
}

/// Filters and pagination for product listings.
///
/// Listings are ordered newest first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductQuery {
    /// 1-based page number.
    pub page: u32,
    /// Products per page.
    pub page_size: u32,
    /// Inclusive lower price bound.
    pub min_price: Option<Price>,
    /// Inclusive upper price bound.
    pub max_price: Option<Price>,
    /// Only products in this category.
    pub category_id: Option<CategoryId>,
    /// Only products in a category with this name, ignoring case.
    pub category_name: Option<String>,
}

impl ProductQuery {
    pub const DEFAULT_PAGE_SIZE: u32 = 10;
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Clamp page to at least 1 and page size to at most 100. A zero page
    /// size means the default; a blank category name means no filter.
    #[must_use]
    pub fn normalized(self) -> Self {
        let page_size = match self.page_size {
            0 => Self::DEFAULT_PAGE_SIZE,
            size => size.min(Self::MAX_PAGE_SIZE),
        };
        Self {
            page: self.page.max(1),
            page_size,
            category_name: self
                .category_name
                .map(|name| name.trim().to_owned())
                .filter(|name| !name.is_empty()),
            ..self
        }
    }

    /// Number of products skipped before this page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    /// Whether `product` passes the price and category ID filters. The
    /// category name filter needs the category table and is applied by the
    /// store.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        self.min_price.is_none_or(|min| product.price >= min)
            && self.max_price.is_none_or(|max| product.price <= max)
            && self.category_id.is_none_or(|id| product.category_id == id)
    }
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: Self::DEFAULT_PAGE_SIZE,
            min_price: None,
            max_price: None,
            category_id: None,
            category_name: None,
        }
    }
}

/// One page of a product listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub page: u32,
    pub page_size: u32,
    /// Products matching the filters across all pages.
    pub total: u64,
}

/// A user waiting to hear when a product is back in stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSubscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub subscribed_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(price_cents: i64, category: i64) -> Product {
        Product {
            id: ProductId::new(1),
            name: "Lamp".to_string(),
            description: String::new(),
            price: Price::from_cents(price_cents).unwrap(),
            stock: 3,
            category_id: CategoryId::new(category),
            seller_id: UserId::new(9),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_query_normalization_and_offset() {
        let query = ProductQuery {
            page: 0,
            page_size: 500,
            ..ProductQuery::default()
        }
        .normalized();
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, ProductQuery::MAX_PAGE_SIZE);
        assert_eq!(query.offset(), 0);

        let third = ProductQuery {
            page: 3,
            ..ProductQuery::default()
        };
        assert_eq!(third.offset(), 20);

        let unsized_page = ProductQuery {
            page_size: 0,
            category_name: Some("  ".to_string()),
            ..ProductQuery::default()
        }
        .normalized();
        assert_eq!(unsized_page.page_size, ProductQuery::DEFAULT_PAGE_SIZE);
        assert_eq!(unsized_page.category_name, None);

        let named = ProductQuery {
            category_name: Some(" Tea ".to_string()),
            ..ProductQuery::default()
        }
        .normalized();
        assert_eq!(named.category_name.as_deref(), Some("Tea"));
    }

    #[test]
    fn test_query_filters() {
        let query = ProductQuery {
            min_price: Some(Price::from_cents(1000).unwrap()),
            max_price: Some(Price::from_cents(2000).unwrap()),
            category_id: Some(CategoryId::new(2)),
            ..ProductQuery::default()
        };
        assert!(query.matches(&product(1500, 2)));
        assert!(query.matches(&product(2000, 2)));
        assert!(!query.matches(&product(2500, 2)));
        assert!(!query.matches(&product(1500, 3)));
    }

    #[test]
    fn test_update_applies_only_present_fields() {
        let update = ProductUpdate {
            stock: Some(0),
            ..ProductUpdate::default()
        };
        let updated = update.apply(product(1500, 2));
        assert_eq!(updated.stock, 0);
        assert_eq!(updated.name, "Lamp");
        assert_eq!(updated.price, Price::from_cents(1500).unwrap());
    }
}
