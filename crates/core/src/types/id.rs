//! Newtype IDs for type-safe entity references.
//!
//! Every table in the store uses a `BIGSERIAL` primary key. Wrapping the raw
//! `i64` per entity keeps a `ProductId` from being passed where an `OrderId`
//! is expected.

/// Define a type-safe `i64` ID wrapper.
///
/// The generated type is `Copy`, ordered (checkout relies on ascending ID
/// order for deterministic locking), serializes as a bare number and, with
/// the `postgres` feature, maps to `BIGINT` transparently.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[cfg_attr(feature = "postgres", derive(::sqlx::Type), sqlx(transparent))]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Create a new ID from an i64 value.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the underlying i64 value.
            #[must_use]
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::core::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// A registered user.
    UserId
);
define_id!(
    /// A product category.
    CategoryId
);
define_id!(
    /// A catalog product.
    ProductId
);
define_id!(
    /// A back-in-stock subscription.
    SubscriptionId
);
define_id!(
    /// A user's cart (one per user).
    CartId
);
define_id!(
    /// A line in a cart.
    CartItemId
);
define_id!(
    /// A placed order.
    OrderId
);
define_id!(
    /// An immutable line of a placed order.
    OrderItemId
);
define_id!(
    /// A customer's review of a product.
    ReviewId
);
