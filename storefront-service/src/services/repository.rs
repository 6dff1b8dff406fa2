//! Persistence seams for the three record collections.
//!
//! Every method that changes state is conditional. Implementations must make
//! the condition and the write a single atomic step so the sagas in
//! `cart_store` and `checkout` can rely on them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::ServiceError;
use crate::models::{Cart, CheckoutSession, Order, OrderStatus, OwnerKey};

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn find_by_owner(&self, owner: &OwnerKey) -> Result<Option<Cart>, ServiceError>;

    /// Insert a cart. A cart already held by the same owner is a Conflict.
    async fn insert(&self, cart: &Cart) -> Result<(), ServiceError>;

    /// Replace the stored cart if its version still equals `cart.version`.
    /// Returns the stored cart with its bumped version; a stale version is a Conflict.
    async fn save(&self, cart: &Cart) -> Result<Cart, ServiceError>;

    /// Delete the cart only if it is still at `version`. False when it moved or vanished.
    async fn take(&self, id: &str, version: i64) -> Result<bool, ServiceError>;

    async fn delete_by_owner(&self, owner: &OwnerKey) -> Result<bool, ServiceError>;
}

#[async_trait]
pub trait CheckoutRepository: Send + Sync {
    async fn insert(&self, checkout: &CheckoutSession) -> Result<(), ServiceError>;

    async fn find(&self, id: &str) -> Result<Option<CheckoutSession>, ServiceError>;

    /// Flip an unpaid checkout to paid. None when it is missing or already paid.
    async fn mark_paid(
        &self,
        id: &str,
        payment_details: Option<serde_json::Value>,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<CheckoutSession>, ServiceError>;

    /// Reserve a paid, unfinalized, unclaimed checkout for `order_id`, stamped at `claimed_at`.
    async fn claim_for_finalize(
        &self,
        id: &str,
        order_id: &str,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    /// Move a claim held by `stale_order_id` to `order_id`, only if it was taken
    /// before `stale_before` (or carries no timestamp) and is not finalized.
    async fn take_over_claim(
        &self,
        id: &str,
        stale_order_id: &str,
        order_id: &str,
        stale_before: DateTime<Utc>,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    /// Undo a claim that is still held by `order_id` and not finalized.
    async fn release_claim(&self, id: &str, order_id: &str) -> Result<bool, ServiceError>;

    /// Finalize a checkout claimed by `order_id`. None when the claim was lost.
    async fn mark_finalized(
        &self,
        id: &str,
        order_id: &str,
        finalized_at: DateTime<Utc>,
    ) -> Result<Option<CheckoutSession>, ServiceError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// A second order for the same checkout is a Conflict.
    async fn insert(&self, order: &Order) -> Result<(), ServiceError>;

    async fn find(&self, id: &str) -> Result<Option<Order>, ServiceError>;

    async fn find_by_checkout(&self, checkout_id: &str) -> Result<Option<Order>, ServiceError>;

    /// Newest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>, ServiceError>;

    /// Newest first.
    async fn list_all(&self) -> Result<Vec<Order>, ServiceError>;

    /// Apply a status change atomically, following `Order::apply_status`.
    async fn update_status(
        &self,
        id: &str,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, ServiceError>;

    async fn delete(&self, id: &str) -> Result<bool, ServiceError>;
}
