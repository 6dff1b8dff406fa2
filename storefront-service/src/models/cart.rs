use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::{LineItem, LineKey};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("Quantity for product {0} is too large")]
    QuantityOverflow(String),
}

/// Who a cart belongs to. A cart is keyed by exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnerKey {
    User(String),
    Guest(String),
}

impl OwnerKey {
    /// Pick the owner key from request parameters. The user id wins when both
    /// are present; blank values are ignored.
    pub fn resolve(user_id: Option<&str>, guest_id: Option<&str>) -> Option<Self> {
        match (non_blank(user_id), non_blank(guest_id)) {
            (Some(user), _) => Some(OwnerKey::User(user.to_string())),
            (None, Some(guest)) => Some(OwnerKey::Guest(guest.to_string())),
            (None, None) => None,
        }
    }

    /// A guest key from a raw token, trimmed. Blank tokens yield `None`.
    pub fn guest(token: &str) -> Option<Self> {
        non_blank(Some(token)).map(|token| OwnerKey::Guest(token.to_string()))
    }

    /// A fresh anonymous owner for shoppers that arrive without a guest token.
    pub fn generated_guest() -> Self {
        OwnerKey::Guest(format!("guest_{}", uuid::Uuid::new_v4().simple()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerKey::User(id) => write!(f, "user:{}", id),
            OwnerKey::Guest(token) => write!(f, "guest:{}", token),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: Option<String>,
    pub guest_id: Option<String>,
    #[serde(default)]
    pub items: Vec<LineItem>,
    pub total_price: Decimal,
    /// Bumped by the store on every successful write; writes are conditional on it.
    #[serde(default)]
    pub version: i64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(owner: &OwnerKey) -> Self {
        let now = Utc::now();
        let (user_id, guest_id) = match owner {
            OwnerKey::User(id) => (Some(id.clone()), None),
            OwnerKey::Guest(token) => (None, Some(token.clone())),
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            guest_id,
            items: Vec::new(),
            total_price: Decimal::ZERO,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn owner(&self) -> Option<OwnerKey> {
        match (&self.user_id, &self.guest_id) {
            (Some(user), _) => Some(OwnerKey::User(user.clone())),
            (None, Some(guest)) => Some(OwnerKey::Guest(guest.clone())),
            (None, None) => None,
        }
    }

    pub fn is_owned_by(&self, owner: &OwnerKey) -> bool {
        match owner {
            OwnerKey::User(id) => self.user_id.as_deref() == Some(id.as_str()),
            OwnerKey::Guest(token) => {
                self.user_id.is_none() && self.guest_id.as_deref() == Some(token.as_str())
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find_line(&self, key: &LineKey) -> Option<&LineItem> {
        self.items.iter().find(|item| item.matches(key))
    }

    /// Add an item, folding it into an existing line with the same key.
    /// The cart is unchanged when the summed quantity would overflow.
    pub fn add_line(&mut self, item: LineItem) -> Result<(), CartError> {
        self.absorb([item])
    }

    /// Overwrite a line's quantity; zero removes the line. Returns false when
    /// no line matches.
    pub fn set_quantity(&mut self, key: &LineKey, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove_line(key);
        }

        let Some(line) = self.items.iter_mut().find(|item| item.matches(key)) else {
            return false;
        };
        line.quantity = quantity;
        self.recompute_total();
        true
    }

    pub fn remove_line(&mut self, key: &LineKey) -> bool {
        let Some(index) = self.items.iter().position(|item| item.matches(key)) else {
            return false;
        };
        self.items.remove(index);
        self.recompute_total();
        true
    }

    /// Merge another cart's lines into this one, summing quantities on key
    /// matches. All or nothing: an overflowing sum leaves the cart as it was.
    pub fn absorb(&mut self, items: impl IntoIterator<Item = LineItem>) -> Result<(), CartError> {
        let mut merged = self.items.clone();
        for item in items {
            fold_line(&mut merged, item)?;
        }
        self.items = merged;
        self.recompute_total();
        Ok(())
    }

    /// Hand a guest cart over to a user. Clears the guest token.
    pub fn assign_to_user(&mut self, user_id: &str) {
        self.user_id = Some(user_id.to_string());
        self.guest_id = None;
        self.updated_at = Utc::now();
    }

    pub fn computed_total(&self) -> Decimal {
        self.items.iter().map(LineItem::line_total).sum()
    }

    fn recompute_total(&mut self) {
        self.total_price = self.computed_total();
        self.updated_at = Utc::now();
    }
}

fn fold_line(items: &mut Vec<LineItem>, item: LineItem) -> Result<(), CartError> {
    let key = item.key();
    match items.iter_mut().find(|existing| existing.matches(&key)) {
        Some(existing) => {
            existing.quantity = existing
                .quantity
                .checked_add(item.quantity)
                .ok_or_else(|| CartError::QuantityOverflow(item.product_id.clone()))?;
        }
        None => items.push(item),
    }
    Ok(())
}
