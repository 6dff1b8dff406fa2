use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use super::metrics::{record_checkout_transition, record_saga_compensation};
use super::orders::OrderMaterializer;
use super::payment::PaymentVerifier;
use super::repository::{CartRepository, CheckoutRepository};
use super::ServiceError;
use crate::models::{CheckoutSession, LineItem, Order, OwnerKey, Principal, ShippingAddress};

/// Age after which a finalize claim with no finished saga behind it is abandoned.
pub const FINALIZE_CLAIM_TIMEOUT_SECS: i64 = 300;

const FINALIZE_IN_PROGRESS: &str = "Checkout finalize already in progress";

/// Everything a caller supplies to open a checkout.
#[derive(Debug, Clone)]
pub struct NewCheckout {
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub total_price: Decimal,
}

#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    pub order: Order,
    /// False when the order exists but the user's live cart could not be deleted.
    pub cart_cleared: bool,
}

#[derive(Clone)]
pub struct CheckoutManager {
    checkouts: Arc<dyn CheckoutRepository>,
    carts: Arc<dyn CartRepository>,
    orders: OrderMaterializer,
    payments: Arc<dyn PaymentVerifier>,
}

impl CheckoutManager {
    pub fn new(
        checkouts: Arc<dyn CheckoutRepository>,
        carts: Arc<dyn CartRepository>,
        orders: OrderMaterializer,
        payments: Arc<dyn PaymentVerifier>,
    ) -> Self {
        Self {
            checkouts,
            carts,
            orders,
            payments,
        }
    }

    #[tracing::instrument(skip(self, principal, request), fields(user_id = %principal.id))]
    pub async fn create(
        &self,
        principal: &Principal,
        request: NewCheckout,
    ) -> Result<CheckoutSession, ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::validation("No items to check out"));
        }
        if request.items.iter().any(|item| item.quantity == 0) {
            return Err(ServiceError::validation("Item quantities must be positive"));
        }

        let checkout = CheckoutSession::new(
            &principal.id,
            request.items,
            request.shipping_address,
            request.payment_method,
            request.total_price,
        );
        self.checkouts.insert(&checkout).await?;

        record_checkout_transition("created");
        tracing::info!(checkout_id = %checkout.id, "Checkout created");
        Ok(checkout)
    }

    /// Fetch a checkout owned by the principal.
    pub async fn get_for(
        &self,
        principal: &Principal,
        checkout_id: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        let checkout = self
            .checkouts
            .find(checkout_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Checkout not found"))?;

        if !checkout.is_owned_by(&principal.id) {
            tracing::warn!(checkout_id = %checkout_id, user_id = %principal.id, "Checkout access denied to non-owner");
            return Err(ServiceError::Forbidden("Not authorized for this checkout".to_string()));
        }
        Ok(checkout)
    }

    #[tracing::instrument(skip(self, principal, payment_details), fields(user_id = %principal.id))]
    pub async fn mark_paid(
        &self,
        principal: &Principal,
        checkout_id: &str,
        status_token: &str,
        payment_details: Option<serde_json::Value>,
    ) -> Result<CheckoutSession, ServiceError> {
        self.get_for(principal, checkout_id).await?;
        self.payments
            .verify(checkout_id, status_token, payment_details.as_ref())
            .await?;

        let checkout = self
            .checkouts
            .mark_paid(checkout_id, payment_details, Utc::now())
            .await?
            .ok_or_else(|| ServiceError::conflict("Checkout is already paid"))?;

        record_checkout_transition("paid");
        tracing::info!(checkout_id = %checkout.id, "Checkout marked paid");
        Ok(checkout)
    }

    /// Turn a paid checkout into its order, then clear the user's cart.
    ///
    /// Steps: claim the checkout for a fresh order id, create the order, mark
    /// the checkout finalized, delete the cart. A failure before the last step
    /// undoes the earlier ones; a failed cart delete is only reported. A claim
    /// older than [`FINALIZE_CLAIM_TIMEOUT_SECS`] is treated as abandoned and
    /// the next finalize either completes it or takes it over.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.id))]
    pub async fn finalize(
        &self,
        principal: &Principal,
        checkout_id: &str,
    ) -> Result<FinalizeOutcome, ServiceError> {
        let checkout = self.get_for(principal, checkout_id).await?;
        if checkout.is_finalized {
            return Err(ServiceError::conflict("Checkout already finalized"));
        }
        if !checkout.is_paid {
            return Err(ServiceError::conflict("Checkout is not paid"));
        }

        let order_id = uuid::Uuid::new_v4().to_string();
        if !self
            .checkouts
            .claim_for_finalize(checkout_id, &order_id, Utc::now())
            .await?
        {
            return self.recover_claim(checkout_id, &order_id).await;
        }

        self.materialize(&checkout, &order_id).await
    }

    /// Handle a checkout whose claim is held by someone else.
    async fn recover_claim(
        &self,
        checkout_id: &str,
        order_id: &str,
    ) -> Result<FinalizeOutcome, ServiceError> {
        let current = self
            .checkouts
            .find(checkout_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Checkout not found"))?;
        if current.is_finalized {
            return Err(ServiceError::conflict("Checkout already finalized"));
        }
        let Some(held_by) = current.order_id.clone() else {
            return Err(ServiceError::conflict(FINALIZE_IN_PROGRESS));
        };

        let stale_before = Utc::now() - Duration::seconds(FINALIZE_CLAIM_TIMEOUT_SECS);
        if current.claimed_at.is_some_and(|at| at >= stale_before) {
            return Err(ServiceError::conflict(FINALIZE_IN_PROGRESS));
        }

        if let Some(order) = self.orders.find_by_checkout(checkout_id).await? {
            if order.id != held_by {
                return Err(ServiceError::conflict(FINALIZE_IN_PROGRESS));
            }
            record_saga_compensation("finalize", "resume_stranded_claim");
            tracing::warn!(checkout_id = %checkout_id, order_id = %order.id, "Resuming a stranded finalize whose order exists");
            self.seal(checkout_id, &held_by).await?;
            return Ok(self.clear_cart(&current, order).await);
        }

        if !self
            .checkouts
            .take_over_claim(checkout_id, &held_by, order_id, stale_before, Utc::now())
            .await?
        {
            return Err(ServiceError::conflict(FINALIZE_IN_PROGRESS));
        }
        record_saga_compensation("finalize", "take_over_stale_claim");
        tracing::warn!(checkout_id = %checkout_id, stale_order_id = %held_by, "Took over an abandoned finalize claim");

        self.materialize(&current, order_id).await
    }

    /// Create the order under a claim this caller holds, then finalize.
    async fn materialize(
        &self,
        checkout: &CheckoutSession,
        order_id: &str,
    ) -> Result<FinalizeOutcome, ServiceError> {
        let order = match self.orders.from_checkout(checkout, order_id).await {
            Ok(order) => order,
            Err(e) => {
                self.release_claim(&checkout.id, order_id).await;
                return Err(e);
            }
        };

        if let Err(e) = self.seal(&checkout.id, order_id).await {
            self.discard_order(order_id).await;
            self.release_claim(&checkout.id, order_id).await;
            return Err(e);
        }

        Ok(self.clear_cart(checkout, order).await)
    }

    /// Mark the checkout finalized under `order_id`. Succeeds as well when a
    /// recovering finalize already sealed the same claim.
    async fn seal(&self, checkout_id: &str, order_id: &str) -> Result<(), ServiceError> {
        if self
            .checkouts
            .mark_finalized(checkout_id, order_id, Utc::now())
            .await?
            .is_some()
        {
            record_checkout_transition("finalized");
            return Ok(());
        }

        match self.checkouts.find(checkout_id).await? {
            Some(c) if c.is_finalized && c.order_id.as_deref() == Some(order_id) => Ok(()),
            _ => Err(ServiceError::conflict("Checkout already finalized")),
        }
    }

    async fn clear_cart(&self, checkout: &CheckoutSession, order: Order) -> FinalizeOutcome {
        let cart_cleared = match self
            .carts
            .delete_by_owner(&OwnerKey::User(checkout.user_id.clone()))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    order_id = %order.id,
                    error = %e,
                    "Order created but the user's cart could not be cleared"
                );
                false
            }
        };

        tracing::info!(checkout_id = %checkout.id, order_id = %order.id, cart_cleared, "Checkout finalized");
        FinalizeOutcome {
            order,
            cart_cleared,
        }
    }

    async fn release_claim(&self, checkout_id: &str, order_id: &str) {
        record_saga_compensation("finalize", "release_claim");
        match self.checkouts.release_claim(checkout_id, order_id).await {
            Ok(true) => tracing::warn!(checkout_id = %checkout_id, "Released finalize claim"),
            Ok(false) => tracing::warn!(checkout_id = %checkout_id, "Finalize claim was already gone"),
            Err(e) => tracing::error!(
                checkout_id = %checkout_id,
                error = %e,
                "Failed to release finalize claim; checkout stays locked"
            ),
        }
    }

    async fn discard_order(&self, order_id: &str) {
        record_saga_compensation("finalize", "discard_order");
        if let Err(e) = self.orders.discard(order_id).await {
            tracing::error!(order_id = %order_id, error = %e, "Failed to discard order of an aborted finalize");
        }
    }
}
