//! Role-based permission policy.
//!
//! Every permission question in Bazaar goes through [`authorize`]: the
//! caller, the resource being touched (with the ownership facts needed to
//! decide) and the action. The decision table is keyed by role first, so
//! each role's rights read top to bottom in one place.

use crate::types::{Principal, Role, UserId};

/// What is being accessed, with the ownership facts the policy needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// A single order.
    Order {
        /// The user who placed the order.
        owner: UserId,
    },
    /// The collection of every user's orders.
    AllOrders,
    /// A line in some user's cart.
    CartItem {
        /// The owner of the cart holding the line.
        cart_owner: UserId,
    },
    /// The product catalog as a whole (creating products).
    Catalog,
    /// A single product.
    Product {
        /// The seller who listed the product.
        seller: UserId,
    },
    /// A product review. For `Create`, `author` is the would-be author.
    Review {
        /// The user who wrote the review.
        author: UserId,
    },
}

/// What the caller wants to do with the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Read the resource.
    Read,
    /// Create a child of the resource (e.g. a product in the catalog).
    Create,
    /// Modify the resource.
    Update,
    /// Delete the resource.
    Delete,
    /// Subscribe to availability notifications.
    Subscribe,
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The action may proceed.
    Allow,
    /// The action is forbidden.
    Deny,
}

impl Decision {
    /// Whether the decision allows the action.
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }

    const fn from_bool(allowed: bool) -> Self {
        if allowed { Self::Allow } else { Self::Deny }
    }
}

/// Decide whether `principal` may perform `action` on `resource`.
#[must_use]
pub fn authorize(principal: &Principal, resource: Resource, action: Action) -> Decision {
    let caller = principal.id;
    let allowed = match principal.role {
        Role::Admin => match (resource, action) {
            // Carts are private even to admins.
            (Resource::CartItem { cart_owner }, _) => cart_owner == caller,
            (Resource::Review { .. }, Action::Read) => true,
            (Resource::Review { author }, Action::Update | Action::Delete) => author == caller,
            (Resource::Review { .. }, _) => false,
            (
                Resource::Order { .. }
                | Resource::AllOrders
                | Resource::Catalog
                | Resource::Product { .. },
                _,
            ) => true,
        },
        Role::Seller => match (resource, action) {
            (Resource::Catalog, Action::Create | Action::Read)
            | (Resource::Product { .. }, Action::Read | Action::Subscribe)
            | (Resource::Review { .. }, Action::Read) => true,
            (Resource::Product { seller }, Action::Update | Action::Delete) => seller == caller,
            (Resource::Review { author }, Action::Update | Action::Delete) => author == caller,
            (Resource::Order { owner }, _) => owner == caller,
            (Resource::CartItem { cart_owner }, _) => cart_owner == caller,
            (
                Resource::Catalog
                | Resource::Product { .. }
                | Resource::AllOrders
                | Resource::Review { .. },
                _,
            ) => false,
        },
        Role::Customer => match (resource, action) {
            (Resource::Catalog, Action::Read)
            | (Resource::Product { .. }, Action::Read | Action::Subscribe)
            | (Resource::Review { .. }, Action::Read) => true,
            (Resource::Review { author }, Action::Create | Action::Update | Action::Delete) => {
                author == caller
            }
            (Resource::Order { owner }, _) => owner == caller,
            (Resource::CartItem { cart_owner }, _) => cart_owner == caller,
            (
                Resource::Catalog
                | Resource::Product { .. }
                | Resource::AllOrders
                | Resource::Review { .. },
                _,
            ) => false,
        },
    };
    Decision::from_bool(allowed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: Principal = Principal::new(UserId::new(1), Role::Admin);
    const SELLER: Principal = Principal::new(UserId::new(2), Role::Seller);
    const ALICE: Principal = Principal::new(UserId::new(3), Role::Customer);
    const BOB: Principal = Principal::new(UserId::new(4), Role::Customer);

    #[test]
    fn test_order_owner_and_admin_allowed() {
        let order = Resource::Order { owner: ALICE.id };
        for action in [Action::Read, Action::Update, Action::Delete] {
            assert!(authorize(&ALICE, order, action).is_allowed());
            assert!(authorize(&ADMIN, order, action).is_allowed());
            assert_eq!(authorize(&BOB, order, action), Decision::Deny);
            assert_eq!(authorize(&SELLER, order, action), Decision::Deny);
        }
    }

    #[test]
    fn test_only_admin_lists_all_orders() {
        assert!(authorize(&ADMIN, Resource::AllOrders, Action::Read).is_allowed());
        assert!(!authorize(&SELLER, Resource::AllOrders, Action::Read).is_allowed());
        assert!(!authorize(&ALICE, Resource::AllOrders, Action::Read).is_allowed());
    }

    #[test]
    fn test_cart_items_are_private_even_to_admin() {
        let line = Resource::CartItem {
            cart_owner: ALICE.id,
        };
        assert!(authorize(&ALICE, line, Action::Update).is_allowed());
        assert!(!authorize(&BOB, line, Action::Update).is_allowed());
        assert!(!authorize(&ADMIN, line, Action::Delete).is_allowed());
    }

    #[test]
    fn test_product_management() {
        let own = Resource::Product { seller: SELLER.id };
        let other = Resource::Product { seller: ADMIN.id };

        assert!(authorize(&SELLER, Resource::Catalog, Action::Create).is_allowed());
        assert!(!authorize(&ALICE, Resource::Catalog, Action::Create).is_allowed());

        assert!(authorize(&SELLER, own, Action::Update).is_allowed());
        assert!(!authorize(&SELLER, other, Action::Update).is_allowed());
        assert!(authorize(&ADMIN, own, Action::Delete).is_allowed());
        assert!(!authorize(&ALICE, own, Action::Delete).is_allowed());
    }

    #[test]
    fn test_only_customers_write_their_own_reviews() {
        let alices = Resource::Review { author: ALICE.id };
        assert!(authorize(&ALICE, alices, Action::Create).is_allowed());
        assert!(!authorize(&BOB, alices, Action::Create).is_allowed());

        for principal in [ADMIN, SELLER] {
            let own = Resource::Review { author: principal.id };
            assert!(!authorize(&principal, own, Action::Create).is_allowed());
        }
    }

    #[test]
    fn test_review_author_alone_edits() {
        let alices = Resource::Review { author: ALICE.id };
        for action in [Action::Update, Action::Delete] {
            assert!(authorize(&ALICE, alices, action).is_allowed());
            assert!(!authorize(&BOB, alices, action).is_allowed());
            assert!(!authorize(&ADMIN, alices, action).is_allowed());
        }
        for principal in [ADMIN, SELLER, ALICE, BOB] {
            assert!(authorize(&principal, alices, Action::Read).is_allowed());
            assert!(!authorize(&principal, alices, Action::Subscribe).is_allowed());
        }
    }

    #[test]
    fn test_everyone_reads_and_subscribes_to_products() {
        let product = Resource::Product { seller: SELLER.id };
        for principal in [ADMIN, SELLER, ALICE] {
            assert!(authorize(&principal, product, Action::Read).is_allowed());
            assert!(authorize(&principal, product, Action::Subscribe).is_allowed());
        }
    }
}
