use chrono::Utc;
use std::sync::Arc;

use super::metrics::record_order_status;
use super::repository::OrderRepository;
use super::ServiceError;
use crate::models::{CheckoutSession, Order, OrderStatus, Principal};

#[derive(Clone)]
pub struct OrderMaterializer {
    orders: Arc<dyn OrderRepository>,
}

impl OrderMaterializer {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    /// Persist the order for a paid checkout under a pre-reserved id.
    #[tracing::instrument(skip(self, checkout), fields(checkout_id = %checkout.id))]
    pub async fn from_checkout(
        &self,
        checkout: &CheckoutSession,
        order_id: &str,
    ) -> Result<Order, ServiceError> {
        if !checkout.is_paid {
            return Err(ServiceError::conflict("Checkout is not paid"));
        }

        let order = Order::from_checkout(checkout, order_id);
        self.orders.insert(&order).await?;

        record_order_status(order.status);
        tracing::info!(order_id = %order.id, user_id = %order.user_id, "Order created");
        Ok(order)
    }

    /// Remove an order that a failed finalize created.
    pub(crate) async fn discard(&self, order_id: &str) -> Result<bool, ServiceError> {
        self.orders.delete(order_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<Order, ServiceError> {
        let order = self
            .orders
            .update_status(order_id, status, Utc::now())
            .await?
            .ok_or_else(|| ServiceError::not_found("Order not found"))?;

        record_order_status(status);
        tracing::info!(status = %status, delivered = order.is_delivered, "Order status updated");
        Ok(order)
    }

    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.id))]
    pub async fn list_for_user(&self, principal: &Principal) -> Result<Vec<Order>, ServiceError> {
        self.orders.list_for_user(&principal.id).await
    }

    /// Fetch an order the principal owns. Admins can read any order.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.id))]
    pub async fn get_for(&self, principal: &Principal, order_id: &str) -> Result<Order, ServiceError> {
        let order = self.get(order_id).await?;
        if order.user_id != principal.id && !principal.is_admin() {
            tracing::warn!("Order access denied to non-owner");
            return Err(ServiceError::Forbidden("Not authorized to view this order".to_string()));
        }
        Ok(order)
    }

    pub async fn get(&self, order_id: &str) -> Result<Order, ServiceError> {
        self.orders
            .find(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order not found"))
    }

    pub async fn list_all(&self) -> Result<Vec<Order>, ServiceError> {
        self.orders.list_all().await
    }

    pub async fn find_by_checkout(&self, checkout_id: &str) -> Result<Option<Order>, ServiceError> {
        self.orders.find_by_checkout(checkout_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, order_id: &str) -> Result<(), ServiceError> {
        if !self.orders.delete(order_id).await? {
            return Err(ServiceError::not_found("Order not found"));
        }
        tracing::info!("Order removed");
        Ok(())
    }
}
