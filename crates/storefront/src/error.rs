//! Unified error handling with Sentry integration.
//!
//! Every service operation returns [`Result<T>`]. `StorefrontError`
//! implements `IntoResponse`, so a host application can hand it straight
//! back from a handler: server errors are captured to Sentry before the
//! response is built, and their details never reach the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use bazaar_core::ProductId;

use crate::db::RepositoryError;

/// Errors returned by storefront services.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// The entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The caller may not perform this action.
    #[error("permission denied")]
    Forbidden,

    /// Checkout was attempted on a cart with no lines.
    #[error("cart is empty")]
    EmptyCart,

    /// Not enough stock to satisfy the requested quantity.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    /// The entity is in a state that forbids the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed input.
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// Store operation failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl StorefrontError {
    /// Shorthand for [`StorefrontError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`StorefrontError::Validation`].
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Stable machine-readable kind, used as the `error` field of responses.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Forbidden => "forbidden",
            Self::EmptyCart => "empty_cart",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::InvalidState(_) => "invalid_state",
            Self::Validation { .. } => "validation",
            Self::Repository(_) => "internal",
        }
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::EmptyCart | Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::InsufficientStock { .. } | Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StorefrontError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(self, Self::Repository(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status();
        let mut body = json!({ "error": self.kind() });

        // Don't expose internal error details to clients
        body["message"] = match &self {
            Self::Repository(_) => json!("Internal server error"),
            _ => json!(self.to_string()),
        };
        match &self {
            Self::InsufficientStock { product_id, .. } => body["product_id"] = json!(product_id),
            Self::Validation { field, .. } => body["field"] = json!(field),
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `StorefrontError`.
pub type Result<T> = std::result::Result<T, StorefrontError>;

/// Add a breadcrumb for a completed write.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, String)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb
            .data
            .insert((*key).to_string(), serde_json::Value::String(value.clone()));
    }

    sentry::add_breadcrumb(breadcrumb);
}
