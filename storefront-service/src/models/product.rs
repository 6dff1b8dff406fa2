use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What the catalog tells us about a product at the moment it is added to a cart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}
