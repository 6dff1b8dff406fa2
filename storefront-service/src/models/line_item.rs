use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ProductSnapshot;

/// Denormalized product data frozen when the item entered a cart. Never re-fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub unit_price: Decimal,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    pub quantity: u32,
}

/// Identity of a line within a cart. Compared literally: no case folding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineKey {
    pub product_id: String,
    pub size: Option<String>,
    pub color: Option<String>,
}

impl LineKey {
    pub fn new(product_id: impl Into<String>, size: Option<String>, color: Option<String>) -> Self {
        Self {
            product_id: product_id.into(),
            size,
            color,
        }
    }
}

impl LineItem {
    pub fn from_product(
        product: &ProductSnapshot,
        size: Option<String>,
        color: Option<String>,
        quantity: u32,
    ) -> Self {
        Self {
            product_id: product.id.clone(),
            name: product.name.clone(),
            image: product.image.clone(),
            unit_price: product.price,
            size,
            color,
            quantity,
        }
    }

    pub fn key(&self) -> LineKey {
        LineKey::new(self.product_id.clone(), self.size.clone(), self.color.clone())
    }

    pub fn matches(&self, key: &LineKey) -> bool {
        self.product_id == key.product_id && self.size == key.size && self.color == key.color
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}
