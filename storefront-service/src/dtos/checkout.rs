use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::cart::LineItemDto;
use crate::models::{CheckoutSession, LineItem, PaymentStatus, ShippingAddress};
use crate::services::NewCheckout;

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("negative_amount"));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItemRequest {
    #[validate(length(min = 1, message = "productId is required"))]
    pub product_id: String,
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    pub image: Option<String>,
    #[validate(custom(function = "non_negative"))]
    pub price: Decimal,
    pub size: Option<String>,
    pub color: Option<String>,
    #[validate(range(min = 1, message = "quantity must be a positive integer"))]
    pub quantity: u32,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddressRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[validate(length(min = 1, message = "address is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "postalCode is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "country is required"))]
    pub country: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    #[validate(length(min = 1, message = "No items to check out"), nested)]
    pub checkout_items: Vec<CheckoutItemRequest>,
    #[validate(nested)]
    pub shipping_address: ShippingAddressRequest,
    #[validate(length(min = 1, message = "paymentMethod is required"))]
    pub payment_method: String,
    #[validate(custom(function = "non_negative"))]
    pub total_price: Decimal,
}

impl From<CheckoutItemRequest> for LineItem {
    fn from(item: CheckoutItemRequest) -> Self {
        LineItem {
            product_id: item.product_id,
            name: item.name,
            image: item.image,
            unit_price: item.price,
            size: item.size,
            color: item.color,
            quantity: item.quantity,
        }
    }
}

impl From<ShippingAddressRequest> for ShippingAddress {
    fn from(address: ShippingAddressRequest) -> Self {
        ShippingAddress {
            first_name: address.first_name,
            last_name: address.last_name,
            address: address.address,
            city: address.city,
            postal_code: address.postal_code,
            country: address.country,
            phone: address.phone,
        }
    }
}

impl From<CreateCheckoutRequest> for NewCheckout {
    fn from(request: CreateCheckoutRequest) -> Self {
        NewCheckout {
            items: request.checkout_items.into_iter().map(LineItem::from).collect(),
            shipping_address: request.shipping_address.into(),
            payment_method: request.payment_method,
            total_price: request.total_price,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PayCheckoutRequest {
    #[validate(length(min = 1, message = "paymentStatus is required"))]
    pub payment_status: String,
    pub payment_details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub id: String,
    pub user_id: String,
    pub checkout_items: Vec<LineItemDto>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub total_price: Decimal,
    pub payment_status: PaymentStatus,
    pub is_paid: bool,
    pub payment_details: Option<serde_json::Value>,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_finalized: bool,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(checkout: CheckoutSession) -> Self {
        Self {
            checkout_items: checkout.items.iter().map(LineItemDto::from).collect(),
            id: checkout.id,
            user_id: checkout.user_id,
            shipping_address: checkout.shipping_address,
            payment_method: checkout.payment_method,
            total_price: checkout.total_price,
            payment_status: checkout.payment_status,
            is_paid: checkout.is_paid,
            payment_details: checkout.payment_details,
            paid_at: checkout.paid_at,
            is_finalized: checkout.is_finalized,
            finalized_at: checkout.finalized_at,
            created_at: checkout.created_at,
            updated_at: checkout.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> serde_json::Value {
        serde_json::json!({
            "checkoutItems": [{
                "productId": "P1",
                "name": "Linen Shirt",
                "price": "50.00",
                "quantity": 2
            }],
            "shippingAddress": {
                "address": "1 Main St",
                "city": "Springfield",
                "postalCode": "12345",
                "country": "US"
            },
            "paymentMethod": "card",
            "totalPrice": "100.00"
        })
    }

    #[test]
    fn valid_request_passes() {
        let request: CreateCheckoutRequest = serde_json::from_value(valid_request()).unwrap();
        assert!(request.validate().is_ok());

        let new_checkout = NewCheckout::from(request);
        assert_eq!(new_checkout.items[0].unit_price, Decimal::new(5000, 2));
    }

    #[test]
    fn missing_shipping_field_fails_validation() {
        let mut body = valid_request();
        body["shippingAddress"]["city"] = serde_json::json!("");
        let request: CreateCheckoutRequest = serde_json::from_value(body).unwrap();

        assert!(request.validate().is_err());
    }

    #[test]
    fn empty_items_and_negative_total_fail_validation() {
        let mut body = valid_request();
        body["checkoutItems"] = serde_json::json!([]);
        let request: CreateCheckoutRequest = serde_json::from_value(body).unwrap();
        assert!(request.validate().is_err());

        let mut body = valid_request();
        body["totalPrice"] = serde_json::json!("-1");
        let request: CreateCheckoutRequest = serde_json::from_value(body).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn invalid_line_inside_items_fails_validation() {
        let mut body = valid_request();
        body["checkoutItems"][0]["quantity"] = serde_json::json!(0);
        let request: CreateCheckoutRequest = serde_json::from_value(body).unwrap();

        let errors = request.validate().unwrap_err();
        assert!(errors.errors().contains_key("checkout_items"));
    }
}
