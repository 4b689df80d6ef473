//! Product review types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::{ProductId, ReviewId, UserId};

/// A customer's rating of a product. At most one per (product, author).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub author: UserId,
    /// Between [`Review::MIN_RATING`] and [`Review::MAX_RATING`].
    pub rating: i16,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub const MIN_RATING: i16 = 1;
    pub const MAX_RATING: i16 = 5;

    /// Whether `rating` is on the 1 to 5 scale.
    #[must_use]
    pub const fn is_valid_rating(rating: i16) -> bool {
        rating >= Self::MIN_RATING && rating <= Self::MAX_RATING
    }
}

/// Input for reviewing a product. The author is always the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReview {
    pub rating: i16,
    pub comment: String,
}

/// Partial review update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewUpdate {
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

impl ReviewUpdate {
    /// Return `review` with this update applied.
    #[must_use]
    pub fn apply(&self, mut review: Review) -> Review {
        if let Some(rating) = self.rating {
            review.rating = rating;
        }
        if let Some(comment) = &self.comment {
            review.comment.clone_from(comment);
        }
        review
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_scale() {
        assert!(!Review::is_valid_rating(0));
        assert!(Review::is_valid_rating(1));
        assert!(Review::is_valid_rating(5));
        assert!(!Review::is_valid_rating(6));
    }

    #[test]
    fn test_update_keeps_absent_fields() {
        let review = Review {
            id: ReviewId::new(1),
            product_id: ProductId::new(1),
            author: UserId::new(3),
            rating: 4,
            comment: "Smooth".to_owned(),
            created_at: Utc::now(),
        };
        let updated = ReviewUpdate {
            rating: Some(2),
            comment: None,
        }
        .apply(review);
        assert_eq!(updated.rating, 2);
        assert_eq!(updated.comment, "Smooth");
    }
}
