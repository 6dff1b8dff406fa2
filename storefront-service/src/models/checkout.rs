use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::opt_chrono_datetime_as_bson_datetime;
use super::LineItem;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
}

/// Where a checkout sits in its one-way lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutState {
    Created,
    Paid,
    Finalized,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    /// Frozen copy of the cart lines at creation.
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub total_price: Decimal,
    pub payment_status: PaymentStatus,
    pub is_paid: bool,
    #[serde(default)]
    pub payment_details: Option<serde_json::Value>,
    #[serde(default, with = "opt_chrono_datetime_as_bson_datetime")]
    pub paid_at: Option<DateTime<Utc>>,
    pub is_finalized: bool,
    #[serde(default, with = "opt_chrono_datetime_as_bson_datetime")]
    pub finalized_at: Option<DateTime<Utc>>,
    /// Set when a finalize claims this checkout, before the order exists.
    #[serde(default)]
    pub order_id: Option<String>,
    /// When the current claim was taken; an old claim may be taken over.
    #[serde(default, with = "opt_chrono_datetime_as_bson_datetime")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl CheckoutSession {
    pub fn new(
        user_id: &str,
        items: Vec<LineItem>,
        shipping_address: ShippingAddress,
        payment_method: String,
        total_price: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            items,
            shipping_address,
            payment_method,
            total_price,
            payment_status: PaymentStatus::Pending,
            is_paid: false,
            payment_details: None,
            paid_at: None,
            is_finalized: false,
            finalized_at: None,
            order_id: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> CheckoutState {
        if self.is_finalized {
            CheckoutState::Finalized
        } else if self.is_paid {
            CheckoutState::Paid
        } else {
            CheckoutState::Created
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}
