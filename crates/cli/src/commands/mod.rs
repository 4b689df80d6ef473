//! CLI command implementations.

pub mod checkout;
pub mod migrate;
pub mod orders;
pub mod seed;

use bazaar_core::Principal;
use bazaar_storefront::db::{Store, StoreTx};

/// Result type shared by the commands.
pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Look up the user a command acts as.
///
/// # Errors
///
/// Returns an error if the user does not exist or the store fails.
pub async fn principal_for<S: Store>(store: &S, username: &str) -> CommandResult<Principal> {
    let mut tx = store.begin().await?;
    let user = tx
        .user_by_username(username)
        .await?
        .ok_or_else(|| format!("User not found: {username}"))?;
    Ok(user.principal())
}
