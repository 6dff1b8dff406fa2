use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, Collection, Database, IndexModel,
};
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;

use super::repository::{CartRepository, CheckoutRepository, OrderRepository};
use super::ServiceError;
use crate::models::{Cart, CheckoutSession, Order, OrderStatus, OwnerKey, PaymentStatus};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &Secret<String>, database: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri.expose_secret())
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to MongoDB: {}", e);
                AppError::from(e)
            })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for storefront-service");

        // Partial so that the null side of the owner pair is not indexed.
        let cart_user_index = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("cart_user_unique".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! { "user_id": { "$type": "string" } })
                    .build(),
            )
            .build();
        let cart_guest_index = IndexModel::builder()
            .keys(doc! { "guest_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("cart_guest_unique".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! { "guest_id": { "$type": "string" } })
                    .build(),
            )
            .build();
        self.carts()
            .create_indexes([cart_user_index, cart_guest_index], None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create owner indexes on carts collection: {}", e);
                AppError::from(e)
            })?;
        tracing::info!("Created unique indexes on carts.user_id and carts.guest_id");

        let checkout_user_index = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("checkout_user_lookup".to_string())
                    .build(),
            )
            .build();
        self.checkouts()
            .create_index(checkout_user_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create user index on checkouts collection: {}", e);
                AppError::from(e)
            })?;
        tracing::info!("Created index on checkouts.user_id");

        let order_user_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("order_user_recent".to_string())
                    .build(),
            )
            .build();
        // One order per checkout, whatever happens to the finalize claim.
        let order_checkout_index = IndexModel::builder()
            .keys(doc! { "checkout_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("order_checkout_unique".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        self.orders()
            .create_indexes([order_user_index, order_checkout_index], None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create indexes on orders collection: {}", e);
                AppError::from(e)
            })?;
        tracing::info!("Created indexes on orders.(user_id, created_at) and orders.checkout_id");

        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    pub fn carts(&self) -> Collection<Cart> {
        self.db.collection("carts")
    }

    pub fn checkouts(&self) -> Collection<CheckoutSession> {
        self.db.collection("checkouts")
    }

    pub fn orders(&self) -> Collection<Order> {
        self.db.collection("orders")
    }
}

fn owner_filter(owner: &OwnerKey) -> Document {
    match owner {
        OwnerKey::User(id) => doc! { "user_id": id.as_str() },
        OwnerKey::Guest(token) => doc! { "guest_id": token.as_str(), "user_id": null },
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Unique-index violations become Conflicts; everything else stays a database error.
fn conflict_on_duplicate(message: &'static str) -> impl Fn(mongodb::error::Error) -> ServiceError {
    move |err| {
        if is_duplicate_key(&err) {
            ServiceError::conflict(message)
        } else {
            ServiceError::Database(err)
        }
    }
}

fn to_bson<T: serde::Serialize>(value: &T) -> Result<bson::Bson, ServiceError> {
    bson::to_bson(value).map_err(|e| ServiceError::Internal(anyhow::Error::new(e)))
}

fn return_after() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

fn newest_first() -> FindOptions {
    FindOptions::builder().sort(doc! { "created_at": -1 }).build()
}

#[async_trait]
impl CartRepository for MongoStore {
    async fn find_by_owner(&self, owner: &OwnerKey) -> Result<Option<Cart>, ServiceError> {
        Ok(self.carts().find_one(owner_filter(owner), None).await?)
    }

    async fn insert(&self, cart: &Cart) -> Result<(), ServiceError> {
        self.carts()
            .insert_one(cart, None)
            .await
            .map_err(conflict_on_duplicate("A cart already exists for this owner"))?;
        Ok(())
    }

    async fn save(&self, cart: &Cart) -> Result<Cart, ServiceError> {
        let mut next = cart.clone();
        next.version += 1;

        let result = self
            .carts()
            .replace_one(doc! { "_id": cart.id.as_str(), "version": cart.version }, &next, None)
            .await
            .map_err(conflict_on_duplicate("A cart already exists for this owner"))?;

        if result.matched_count == 0 {
            return Err(ServiceError::conflict("Cart was modified concurrently"));
        }
        Ok(next)
    }

    async fn take(&self, id: &str, version: i64) -> Result<bool, ServiceError> {
        let result = self
            .carts()
            .delete_one(doc! { "_id": id, "version": version }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn delete_by_owner(&self, owner: &OwnerKey) -> Result<bool, ServiceError> {
        let result = self.carts().delete_one(owner_filter(owner), None).await?;
        Ok(result.deleted_count == 1)
    }
}

#[async_trait]
impl CheckoutRepository for MongoStore {
    async fn insert(&self, checkout: &CheckoutSession) -> Result<(), ServiceError> {
        self.checkouts().insert_one(checkout, None).await?;
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<CheckoutSession>, ServiceError> {
        Ok(self.checkouts().find_one(doc! { "_id": id }, None).await?)
    }

    async fn mark_paid(
        &self,
        id: &str,
        payment_details: Option<serde_json::Value>,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<CheckoutSession>, ServiceError> {
        let paid_at = bson::DateTime::from_chrono(paid_at);
        let update = doc! {
            "$set": {
                "is_paid": true,
                "payment_status": to_bson(&PaymentStatus::Paid)?,
                "payment_details": to_bson(&payment_details)?,
                "paid_at": paid_at,
                "updated_at": paid_at,
            }
        };

        Ok(self
            .checkouts()
            .find_one_and_update(doc! { "_id": id, "is_paid": false }, update, return_after())
            .await?)
    }

    async fn claim_for_finalize(
        &self,
        id: &str,
        order_id: &str,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let claimed_at = bson::DateTime::from_chrono(claimed_at);
        let filter = doc! {
            "_id": id,
            "is_paid": true,
            "is_finalized": false,
            "order_id": null,
        };
        let update = doc! {
            "$set": { "order_id": order_id, "claimed_at": claimed_at, "updated_at": claimed_at }
        };

        let result = self.checkouts().update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn take_over_claim(
        &self,
        id: &str,
        stale_order_id: &str,
        order_id: &str,
        stale_before: DateTime<Utc>,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let claimed_at = bson::DateTime::from_chrono(claimed_at);
        let filter = doc! {
            "_id": id,
            "order_id": stale_order_id,
            "is_finalized": false,
            "$or": [
                { "claimed_at": { "$lt": bson::DateTime::from_chrono(stale_before) } },
                { "claimed_at": null },
            ],
        };
        let update = doc! {
            "$set": { "order_id": order_id, "claimed_at": claimed_at, "updated_at": claimed_at }
        };

        let result = self.checkouts().update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn release_claim(&self, id: &str, order_id: &str) -> Result<bool, ServiceError> {
        let filter = doc! { "_id": id, "order_id": order_id, "is_finalized": false };
        let update = doc! {
            "$set": { "order_id": null, "claimed_at": null, "updated_at": bson::DateTime::now() }
        };

        let result = self.checkouts().update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn mark_finalized(
        &self,
        id: &str,
        order_id: &str,
        finalized_at: DateTime<Utc>,
    ) -> Result<Option<CheckoutSession>, ServiceError> {
        let finalized_at = bson::DateTime::from_chrono(finalized_at);
        let filter = doc! { "_id": id, "order_id": order_id, "is_finalized": false };
        let update = doc! {
            "$set": {
                "is_finalized": true,
                "finalized_at": finalized_at,
                "updated_at": finalized_at,
            }
        };

        Ok(self
            .checkouts()
            .find_one_and_update(filter, update, return_after())
            .await?)
    }
}

#[async_trait]
impl OrderRepository for MongoStore {
    async fn insert(&self, order: &Order) -> Result<(), ServiceError> {
        self.orders()
            .insert_one(order, None)
            .await
            .map_err(conflict_on_duplicate("An order already exists for this checkout"))?;
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<Order>, ServiceError> {
        Ok(self.orders().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_by_checkout(&self, checkout_id: &str) -> Result<Option<Order>, ServiceError> {
        Ok(self
            .orders()
            .find_one(doc! { "checkout_id": checkout_id }, None)
            .await?)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>, ServiceError> {
        let cursor = self
            .orders()
            .find(doc! { "user_id": user_id }, newest_first())
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list_all(&self) -> Result<Vec<Order>, ServiceError> {
        let cursor = self.orders().find(doc! {}, newest_first()).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update_status(
        &self,
        id: &str,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, ServiceError> {
        let now = bson::DateTime::from_chrono(now);
        let mut set = doc! {
            "status": to_bson(&status)?,
            "updated_at": now,
        };
        if status == OrderStatus::Delivered {
            // Expressions in a pipeline stage read the pre-update document.
            set.insert(
                "delivered_at",
                doc! { "$cond": ["$is_delivered", "$delivered_at", now] },
            );
            set.insert("is_delivered", true);
        }

        Ok(self
            .orders()
            .find_one_and_update(doc! { "_id": id }, vec![doc! { "$set": set }], return_after())
            .await?)
    }

    async fn delete(&self, id: &str) -> Result<bool, ServiceError> {
        let result = self.orders().delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count == 1)
    }
}
