use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Cart, LineItem, LineKey, OwnerKey};

/// Owner parameters shared by every cart call. `userId` wins over `guestId`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartQuery {
    pub user_id: Option<String>,
    pub guest_id: Option<String>,
}

impl CartQuery {
    pub fn owner(&self) -> Option<OwnerKey> {
        OwnerKey::resolve(self.user_id.as_deref(), self.guest_id.as_deref())
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    #[validate(length(min = 1, message = "productId is required"))]
    pub product_id: String,
    #[validate(range(min = 1, message = "quantity must be a positive integer"))]
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
    pub guest_id: Option<String>,
    pub user_id: Option<String>,
}

impl AddToCartRequest {
    /// The requested owner, or a freshly minted guest when none was given.
    pub fn owner(&self) -> OwnerKey {
        OwnerKey::resolve(self.user_id.as_deref(), self.guest_id.as_deref())
            .unwrap_or_else(OwnerKey::generated_guest)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartItemRequest {
    #[validate(length(min = 1, message = "productId is required"))]
    pub product_id: String,
    /// Zero removes the line.
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
    pub guest_id: Option<String>,
    pub user_id: Option<String>,
}

impl UpdateCartItemRequest {
    pub fn owner(&self) -> Option<OwnerKey> {
        OwnerKey::resolve(self.user_id.as_deref(), self.guest_id.as_deref())
    }

    pub fn key(&self) -> LineKey {
        LineKey::new(self.product_id.clone(), self.size.clone(), self.color.clone())
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RemoveCartItemRequest {
    #[validate(length(min = 1, message = "productId is required"))]
    pub product_id: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub guest_id: Option<String>,
    pub user_id: Option<String>,
}

impl RemoveCartItemRequest {
    pub fn owner(&self) -> Option<OwnerKey> {
        OwnerKey::resolve(self.user_id.as_deref(), self.guest_id.as_deref())
    }

    pub fn key(&self) -> LineKey {
        LineKey::new(self.product_id.clone(), self.size.clone(), self.color.clone())
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MergeCartRequest {
    #[validate(length(min = 1, message = "guestId is required"))]
    pub guest_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItemDto {
    pub product_id: String,
    pub name: String,
    pub image: Option<String>,
    pub price: Decimal,
    pub size: Option<String>,
    pub color: Option<String>,
    pub quantity: u32,
}

impl From<&LineItem> for LineItemDto {
    fn from(item: &LineItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            name: item.name.clone(),
            image: item.image.clone(),
            price: item.unit_price,
            size: item.size.clone(),
            color: item.color.clone(),
            quantity: item.quantity,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub id: String,
    pub user_id: Option<String>,
    pub guest_id: Option<String>,
    pub items: Vec<LineItemDto>,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        Self {
            items: cart.items.iter().map(LineItemDto::from).collect(),
            id: cart.id,
            user_id: cart.user_id,
            guest_id: cart.guest_id,
            total_price: cart.total_price,
            created_at: cart.created_at,
            updated_at: cart.updated_at,
        }
    }
}
