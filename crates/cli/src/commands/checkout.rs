//! Check out a user's cart from the command line.

use tracing::info;

use bazaar_storefront::db::Store;
use bazaar_storefront::state::AppState;

use super::{CommandResult, principal_for};

/// Turn `username`'s cart into a pending order.
///
/// # Errors
///
/// Returns an error if the user is unknown or checkout fails.
pub async fn run<S: Store>(state: &AppState<S>, username: &str) -> CommandResult {
    let principal = principal_for(state.store(), username).await?;
    let order = state.checkout().checkout(&principal).await?;

    for item in &order.items {
        info!(
            product_id = ?item.product_id,
            quantity = item.quantity,
            price = %item.price,
            "Order line"
        );
    }
    info!(
        order_id = %order.id,
        total = %order.total_price,
        status = %order.status,
        "Order placed for {username}"
    );
    Ok(())
}
