use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::opt_chrono_datetime_as_bson_datetime;
use super::{CheckoutSession, LineItem, PaymentStatus, ShippingAddress};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl FromStr for OrderStatus {
    type Err = String;

    /// Accepts the English names in any case, plus the Spanish labels older
    /// admin clients still send.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processing" | "procesando" => Ok(OrderStatus::Processing),
            "shipped" | "enviado" => Ok(OrderStatus::Shipped),
            "delivered" | "entregado" => Ok(OrderStatus::Delivered),
            "cancelled" | "canceled" | "cancelado" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: String,
    pub checkout_id: String,
    pub user_id: String,
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub total_price: Decimal,
    pub is_paid: bool,
    #[serde(default, with = "opt_chrono_datetime_as_bson_datetime")]
    pub paid_at: Option<DateTime<Utc>>,
    pub is_delivered: bool,
    #[serde(default, with = "opt_chrono_datetime_as_bson_datetime")]
    pub delivered_at: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub payment_details: Option<serde_json::Value>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Copy a checkout's snapshot into a fresh order under the id the
    /// finalize claim reserved.
    pub fn from_checkout(checkout: &CheckoutSession, order_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: order_id.to_string(),
            checkout_id: checkout.id.clone(),
            user_id: checkout.user_id.clone(),
            items: checkout.items.clone(),
            shipping_address: checkout.shipping_address.clone(),
            payment_method: checkout.payment_method.clone(),
            total_price: checkout.total_price,
            is_paid: checkout.is_paid,
            paid_at: checkout.paid_at,
            is_delivered: false,
            delivered_at: None,
            status: OrderStatus::Processing,
            payment_status: checkout.payment_status,
            payment_details: checkout.payment_details.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `status`. Delivery is stamped the first time the order becomes
    /// Delivered and never cleared. Returns true when this call stamped it.
    pub fn apply_status(&mut self, status: OrderStatus, now: DateTime<Utc>) -> bool {
        self.status = status;
        self.updated_at = now;

        if status == OrderStatus::Delivered && !self.is_delivered {
            self.is_delivered = true;
            self.delivered_at = Some(now);
            return true;
        }
        false
    }
}
