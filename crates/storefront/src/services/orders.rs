//! Order queries and lifecycle.
//!
//! Orders are created only by checkout. Afterwards the owner (or an admin)
//! may read them, set their status, or cancel them while still pending.
//! Status changes are not checked against a lifecycle, and cancelling does
//! not return stock.

use tracing::{info, instrument};

use bazaar_core::{Action, OrderId, Principal, Resource, authorize};

use crate::db::{Store, StoreTx};
use crate::error::{Result, StorefrontError};
use crate::models::{Order, OrderUpdate};

/// Order operations over a store.
pub struct OrderService<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> OrderService<'a, S> {
    /// Create an order service.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Orders visible to the caller, ascending by ID: every order for an
    /// admin, the caller's own otherwise.
    ///
    /// # Errors
    ///
    /// Returns `StorefrontError::Repository` if the store fails.
    #[instrument(skip_all, fields(user_id = %principal.id))]
    pub async fn list_orders(&self, principal: &Principal) -> Result<Vec<Order>> {
        let owner = if authorize(principal, Resource::AllOrders, Action::Read).is_allowed() {
            None
        } else {
            Some(principal.id)
        };

        let mut tx = self.store.begin().await?;
        Ok(tx.orders(owner).await?)
    }

    /// One order with its lines.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown orders and `Forbidden` unless the
    /// caller owns the order or is an admin.
    #[instrument(skip_all, fields(user_id = %principal.id, order_id = %id))]
    pub async fn get_order(&self, principal: &Principal, id: OrderId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        authorized_order(&mut tx, principal, id, Action::Read).await
    }

    /// Cancel a pending order. The order and its lines are deleted.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Forbidden` as for [`get_order`](Self::get_order),
    /// and `InvalidState` if the order is no longer pending.
    #[instrument(skip_all, fields(user_id = %principal.id, order_id = %id))]
    pub async fn cancel_order(&self, principal: &Principal, id: OrderId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let order = authorized_order(&mut tx, principal, id, Action::Delete).await?;
        if !order.status.is_cancellable() {
            return Err(StorefrontError::InvalidState(format!(
                "order {id} is {} and can no longer be cancelled",
                order.status
            )));
        }
        tx.delete_order(id).await?;
        tx.commit().await?;

        info!("Order cancelled");
        Ok(())
    }

    /// Apply a partial update. Only the status is writable, and any status
    /// may be set.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` and `Forbidden` as for [`get_order`](Self::get_order).
    #[instrument(skip_all, fields(user_id = %principal.id, order_id = %id))]
    pub async fn update_order(
        &self,
        principal: &Principal,
        id: OrderId,
        update: OrderUpdate,
    ) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let order = authorized_order(&mut tx, principal, id, Action::Update).await?;

        let Some(status) = update.status else {
            return Ok(order);
        };
        let order = tx.set_order_status(id, status).await?;
        tx.commit().await?;

        info!(status = %order.status, "Order updated");
        Ok(order)
    }
}

async fn authorized_order<T: StoreTx>(
    tx: &mut T,
    principal: &Principal,
    id: OrderId,
    action: Action,
) -> Result<Order> {
    let order = tx
        .order(id)
        .await?
        .ok_or_else(|| StorefrontError::not_found("order", id))?;
    if !authorize(principal, Resource::Order { owner: order.owner }, action).is_allowed() {
        return Err(StorefrontError::Forbidden);
    }
    Ok(order)
}
