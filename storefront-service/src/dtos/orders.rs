use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::cart::LineItemDto;
use crate::models::{Order, OrderStatus, PaymentStatus, ShippingAddress};
use crate::services::FinalizeOutcome;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub checkout_id: String,
    pub order_items: Vec<LineItemDto>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub total_price: Decimal,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_items: order.items.iter().map(LineItemDto::from).collect(),
            id: order.id,
            user_id: order.user_id,
            checkout_id: order.checkout_id,
            shipping_address: order.shipping_address,
            payment_method: order.payment_method,
            total_price: order.total_price,
            is_paid: order.is_paid,
            paid_at: order.paid_at,
            is_delivered: order.is_delivered,
            delivered_at: order.delivered_at,
            status: order.status,
            payment_status: order.payment_status,
            payment_details: order.payment_details,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// The new order plus whether the buyer's cart was cleared.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub cart_cleared: bool,
}

impl From<FinalizeOutcome> for FinalizeResponse {
    fn from(outcome: FinalizeOutcome) -> Self {
        Self {
            order: outcome.order.into(),
            cart_cleared: outcome.cart_cleared,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOrderStatusRequest {
    #[validate(length(min = 1, message = "status is required"))]
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
