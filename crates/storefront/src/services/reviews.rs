//! Product reviews.
//!
//! Anyone may read a product's reviews. Customers write at most one review
//! per product and only the author may change or remove it.

use tracing::{info, instrument};

use bazaar_core::{Action, Principal, ProductId, Resource, ReviewId, authorize};

use crate::db::{RepositoryError, Store, StoreTx};
use crate::error::{Result, StorefrontError};
use crate::models::{NewReview, Review, ReviewUpdate};

/// Review operations over a store.
pub struct ReviewService<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> ReviewService<'a, S> {
    /// Create a review service.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Reviews of a product, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown products.
    #[instrument(skip(self))]
    pub async fn list_reviews(&self, product_id: ProductId) -> Result<Vec<Review>> {
        let mut tx = self.store.begin().await?;
        if tx.product(product_id).await?.is_none() {
            return Err(StorefrontError::not_found("product", product_id));
        }
        Ok(tx.reviews(product_id).await?)
    }

    /// Review a product as the caller.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the caller is a customer, `Validation` for
    /// a rating outside 1 to 5 or an empty comment, `NotFound` for unknown
    /// products and `InvalidState` if the caller already reviewed it.
    #[instrument(skip_all, fields(user_id = %principal.id, product_id = %product_id))]
    pub async fn create_review(
        &self,
        principal: &Principal,
        product_id: ProductId,
        new: NewReview,
    ) -> Result<Review> {
        let resource = Resource::Review {
            author: principal.id,
        };
        if !authorize(principal, resource, Action::Create).is_allowed() {
            return Err(StorefrontError::Forbidden);
        }
        validate_rating(new.rating)?;
        validate_comment(&new.comment)?;

        let mut tx = self.store.begin().await?;
        if tx.product(product_id).await?.is_none() {
            return Err(StorefrontError::not_found("product", product_id));
        }
        let review = match tx.insert_review(product_id, principal.id, &new).await {
            Ok(review) => review,
            Err(RepositoryError::Conflict(_)) => {
                return Err(StorefrontError::InvalidState(format!(
                    "product {product_id} already reviewed"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;

        info!(review_id = %review.id, rating = review.rating, "Review created");
        Ok(review)
    }

    /// Apply a partial update to one of the caller's reviews.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown reviews, `Forbidden` unless the caller
    /// wrote the review and `Validation` for invalid fields.
    #[instrument(skip_all, fields(user_id = %principal.id, review_id = %id))]
    pub async fn update_review(
        &self,
        principal: &Principal,
        id: ReviewId,
        update: ReviewUpdate,
    ) -> Result<Review> {
        if let Some(rating) = update.rating {
            validate_rating(rating)?;
        }
        if let Some(comment) = &update.comment {
            validate_comment(comment)?;
        }

        let mut tx = self.store.begin().await?;
        let review = authored_review(&mut tx, principal, id, Action::Update).await?;
        let saved = tx.save_review(&update.apply(review)).await?;
        tx.commit().await?;

        info!(rating = saved.rating, "Review updated");
        Ok(saved)
    }

    /// Delete one of the caller's reviews.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown reviews and `Forbidden` unless the
    /// caller wrote the review.
    #[instrument(skip_all, fields(user_id = %principal.id, review_id = %id))]
    pub async fn delete_review(&self, principal: &Principal, id: ReviewId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        authored_review(&mut tx, principal, id, Action::Delete).await?;
        tx.delete_review(id).await?;
        tx.commit().await?;

        info!("Review deleted");
        Ok(())
    }
}

async fn authored_review<T: StoreTx>(
    tx: &mut T,
    principal: &Principal,
    id: ReviewId,
    action: Action,
) -> Result<Review> {
    let review = tx
        .review(id)
        .await?
        .ok_or_else(|| StorefrontError::not_found("review", id))?;
    let resource = Resource::Review {
        author: review.author,
    };
    if !authorize(principal, resource, action).is_allowed() {
        return Err(StorefrontError::Forbidden);
    }
    Ok(review)
}

fn validate_rating(rating: i16) -> Result<()> {
    if !Review::is_valid_rating(rating) {
        return Err(StorefrontError::validation("rating", "must be between 1 and 5"));
    }
    Ok(())
}

fn validate_comment(comment: &str) -> Result<()> {
    if comment.trim().is_empty() {
        return Err(StorefrontError::validation("comment", "must not be empty"));
    }
    Ok(())
}
