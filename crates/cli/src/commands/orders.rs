//! Order management commands.

use tracing::info;

use bazaar_core::{OrderId, OrderStatus};
use bazaar_storefront::db::Store;
use bazaar_storefront::models::{Order, OrderUpdate};
use bazaar_storefront::state::AppState;

use super::{CommandResult, principal_for};

/// Log the orders visible to `username`.
///
/// # Errors
///
/// Returns an error if the user is unknown or the store fails.
pub async fn list<S: Store>(state: &AppState<S>, username: &str) -> CommandResult {
    let principal = principal_for(state.store(), username).await?;
    let orders = state.orders().list_orders(&principal).await?;

    if orders.is_empty() {
        info!("No orders");
    }
    for order in &orders {
        log_order(order);
    }
    Ok(())
}

/// Cancel a pending order as `username`.
///
/// # Errors
///
/// Returns an error if the user or order is unknown, the user may not touch
/// the order, or the order is past pending.
pub async fn cancel<S: Store>(state: &AppState<S>, username: &str, id: OrderId) -> CommandResult {
    let principal = principal_for(state.store(), username).await?;
    state.orders().cancel_order(&principal, id).await?;
    info!(order_id = %id, "Order cancelled");
    Ok(())
}

/// Set an order's status as `username`.
///
/// # Errors
///
/// Returns an error if the user or order is unknown or the user may not
/// touch the order.
pub async fn set_status<S: Store>(
    state: &AppState<S>,
    username: &str,
    id: OrderId,
    status: OrderStatus,
) -> CommandResult {
    let principal = principal_for(state.store(), username).await?;
    let order = state
        .orders()
        .update_order(
            &principal,
            id,
            OrderUpdate {
                status: Some(status),
            },
        )
        .await?;
    log_order(&order);
    Ok(())
}

fn log_order(order: &Order) {
    info!(
        order_id = %order.id,
        owner = %order.owner,
        status = %order.status,
        total = %order.total_price,
        lines = order.items.len(),
        created_at = %order.created_at,
        "Order"
    );
}
