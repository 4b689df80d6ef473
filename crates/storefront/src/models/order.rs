//! Order domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::{OrderId, OrderItemId, OrderStatus, Price, ProductId, UserId};

/// A placed order with its immutable line snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order ID.
    pub id: OrderId,
    /// User who placed the order.
    pub owner: UserId,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Sum of `price × quantity` over `items`, fixed at checkout.
    pub total_price: Price,
    /// When checkout created the order.
    pub created_at: DateTime<Utc>,
    /// Line snapshots, ordered by line ID.
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Recompute the total from the line snapshots.
    #[must_use]
    pub fn items_total(&self) -> Price {
        self.items.iter().map(OrderItem::line_total).sum()
    }
}

/// An order line. Created once at checkout, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    /// `None` once the product has been deleted from the catalog.
    pub product_id: Option<ProductId>,
    pub quantity: i32,
    /// Unit price at purchase time.
    pub price: Price,
}

impl OrderItem {
    /// `price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.line_total(self.quantity)
    }
}

/// Partial order update. Status changes are not validated against a
/// lifecycle; any status may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
}
