pub mod cart;
pub mod checkout;
pub mod line_item;
pub mod order;
pub mod principal;
pub mod product;

pub use cart::{Cart, CartError, OwnerKey};
pub use checkout::{CheckoutSession, CheckoutState, PaymentStatus, ShippingAddress};
pub use line_item::{LineItem, LineKey};
pub use order::{Order, OrderStatus};
pub use principal::{Principal, Role};
pub use product::ProductSnapshot;

// Helper module for optional DateTime<Utc> as BSON DateTime
pub(crate) mod opt_chrono_datetime_as_bson_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(dt) => bson::DateTime::from_chrono(*dt).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<bson::DateTime> = Option::deserialize(deserializer)?;
        Ok(opt.map(|dt| dt.to_chrono()))
    }
}
