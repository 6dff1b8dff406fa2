use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::repository::{CartRepository, CheckoutRepository, OrderRepository};
use super::ServiceError;
use crate::models::{Cart, CheckoutSession, Order, OrderStatus, OwnerKey, PaymentStatus};

/// Process-local store with the same conditional-write rules as `MongoStore`,
/// including the unique owner and checkout constraints.
#[derive(Default)]
pub struct InMemoryStore {
    carts: Mutex<HashMap<String, Cart>>,
    checkouts: Mutex<HashMap<String, CheckoutSession>>,
    orders: Mutex<HashMap<String, Order>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>, ServiceError> {
    mutex
        .lock()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("{} mutex poisoned: {}", name, e)))
}

fn owner_taken(carts: &HashMap<String, Cart>, cart: &Cart) -> bool {
    carts.values().filter(|other| other.id != cart.id).any(|other| {
        let same_user = cart.user_id.is_some() && other.user_id == cart.user_id;
        let same_guest = cart.guest_id.is_some() && other.guest_id == cart.guest_id;
        same_user || same_guest
    })
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

#[async_trait]
impl CartRepository for InMemoryStore {
    async fn find_by_owner(&self, owner: &OwnerKey) -> Result<Option<Cart>, ServiceError> {
        let carts = lock(&self.carts, "carts")?;
        Ok(carts.values().find(|cart| cart.is_owned_by(owner)).cloned())
    }

    async fn insert(&self, cart: &Cart) -> Result<(), ServiceError> {
        let mut carts = lock(&self.carts, "carts")?;
        if carts.contains_key(&cart.id) || owner_taken(&carts, cart) {
            return Err(ServiceError::conflict("A cart already exists for this owner"));
        }
        carts.insert(cart.id.clone(), cart.clone());
        Ok(())
    }

    async fn save(&self, cart: &Cart) -> Result<Cart, ServiceError> {
        let mut carts = lock(&self.carts, "carts")?;
        match carts.get(&cart.id) {
            Some(stored) if stored.version == cart.version => {}
            _ => return Err(ServiceError::conflict("Cart was modified concurrently")),
        }
        if owner_taken(&carts, cart) {
            return Err(ServiceError::conflict("A cart already exists for this owner"));
        }

        let mut next = cart.clone();
        next.version += 1;
        carts.insert(next.id.clone(), next.clone());
        Ok(next)
    }

    async fn take(&self, id: &str, version: i64) -> Result<bool, ServiceError> {
        let mut carts = lock(&self.carts, "carts")?;
        if carts.get(id).is_some_and(|cart| cart.version == version) {
            carts.remove(id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn delete_by_owner(&self, owner: &OwnerKey) -> Result<bool, ServiceError> {
        let mut carts = lock(&self.carts, "carts")?;
        let id = carts
            .values()
            .find(|cart| cart.is_owned_by(owner))
            .map(|cart| cart.id.clone());
        Ok(id.and_then(|id| carts.remove(&id)).is_some())
    }
}

#[async_trait]
impl CheckoutRepository for InMemoryStore {
    async fn insert(&self, checkout: &CheckoutSession) -> Result<(), ServiceError> {
        let mut checkouts = lock(&self.checkouts, "checkouts")?;
        checkouts.insert(checkout.id.clone(), checkout.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<CheckoutSession>, ServiceError> {
        Ok(lock(&self.checkouts, "checkouts")?.get(id).cloned())
    }

    async fn mark_paid(
        &self,
        id: &str,
        payment_details: Option<serde_json::Value>,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<CheckoutSession>, ServiceError> {
        let mut checkouts = lock(&self.checkouts, "checkouts")?;
        let Some(checkout) = checkouts.get_mut(id).filter(|c| !c.is_paid) else {
            return Ok(None);
        };

        checkout.is_paid = true;
        checkout.payment_status = PaymentStatus::Paid;
        checkout.payment_details = payment_details;
        checkout.paid_at = Some(paid_at);
        checkout.updated_at = paid_at;
        Ok(Some(checkout.clone()))
    }

    async fn claim_for_finalize(
        &self,
        id: &str,
        order_id: &str,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut checkouts = lock(&self.checkouts, "checkouts")?;
        let Some(checkout) = checkouts
            .get_mut(id)
            .filter(|c| c.is_paid && !c.is_finalized && c.order_id.is_none())
        else {
            return Ok(false);
        };

        checkout.order_id = Some(order_id.to_string());
        checkout.claimed_at = Some(claimed_at);
        checkout.updated_at = claimed_at;
        Ok(true)
    }

    async fn take_over_claim(
        &self,
        id: &str,
        stale_order_id: &str,
        order_id: &str,
        stale_before: DateTime<Utc>,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut checkouts = lock(&self.checkouts, "checkouts")?;
        let Some(checkout) = checkouts.get_mut(id).filter(|c| {
            !c.is_finalized
                && c.order_id.as_deref() == Some(stale_order_id)
                && c.claimed_at.map_or(true, |at| at < stale_before)
        }) else {
            return Ok(false);
        };

        checkout.order_id = Some(order_id.to_string());
        checkout.claimed_at = Some(claimed_at);
        checkout.updated_at = claimed_at;
        Ok(true)
    }

    async fn release_claim(&self, id: &str, order_id: &str) -> Result<bool, ServiceError> {
        let mut checkouts = lock(&self.checkouts, "checkouts")?;
        let Some(checkout) = checkouts
            .get_mut(id)
            .filter(|c| !c.is_finalized && c.order_id.as_deref() == Some(order_id))
        else {
            return Ok(false);
        };

        checkout.order_id = None;
        checkout.claimed_at = None;
        checkout.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_finalized(
        &self,
        id: &str,
        order_id: &str,
        finalized_at: DateTime<Utc>,
    ) -> Result<Option<CheckoutSession>, ServiceError> {
        let mut checkouts = lock(&self.checkouts, "checkouts")?;
        let Some(checkout) = checkouts
            .get_mut(id)
            .filter(|c| !c.is_finalized && c.order_id.as_deref() == Some(order_id))
        else {
            return Ok(None);
        };

        checkout.is_finalized = true;
        checkout.finalized_at = Some(finalized_at);
        checkout.updated_at = finalized_at;
        Ok(Some(checkout.clone()))
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert(&self, order: &Order) -> Result<(), ServiceError> {
        let mut orders = lock(&self.orders, "orders")?;
        let duplicate = orders.contains_key(&order.id)
            || orders.values().any(|o| o.checkout_id == order.checkout_id);
        if duplicate {
            return Err(ServiceError::conflict("An order already exists for this checkout"));
        }
        orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<Order>, ServiceError> {
        Ok(lock(&self.orders, "orders")?.get(id).cloned())
    }

    async fn find_by_checkout(&self, checkout_id: &str) -> Result<Option<Order>, ServiceError> {
        let orders = lock(&self.orders, "orders")?;
        Ok(orders.values().find(|o| o.checkout_id == checkout_id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>, ServiceError> {
        let orders = lock(&self.orders, "orders")?;
        let mine = orders.values().filter(|o| o.user_id == user_id).cloned().collect();
        Ok(newest_first(mine))
    }

    async fn list_all(&self) -> Result<Vec<Order>, ServiceError> {
        let orders = lock(&self.orders, "orders")?;
        Ok(newest_first(orders.values().cloned().collect()))
    }

    async fn update_status(
        &self,
        id: &str,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, ServiceError> {
        let mut orders = lock(&self.orders, "orders")?;
        Ok(orders.get_mut(id).map(|order| {
            order.apply_status(status, now);
            order.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool, ServiceError> {
        Ok(lock(&self.orders, "orders")?.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stale_cart_version_is_rejected() {
        let store = InMemoryStore::new();
        let cart = Cart::new(&OwnerKey::Guest("g1".to_string()));
        CartRepository::insert(&store, &cart).await.unwrap();

        let saved = store.save(&cart).await.unwrap();
        assert_eq!(saved.version, 1);

        let err = store.save(&cart).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn one_cart_per_owner() {
        let store = InMemoryStore::new();
        let owner = OwnerKey::User("u1".to_string());
        CartRepository::insert(&store, &Cart::new(&owner)).await.unwrap();

        let err = CartRepository::insert(&store, &Cart::new(&owner)).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn take_only_removes_the_expected_version() {
        let store = InMemoryStore::new();
        let cart = Cart::new(&OwnerKey::Guest("g1".to_string()));
        CartRepository::insert(&store, &cart).await.unwrap();
        store.save(&cart).await.unwrap();

        assert!(!store.take(&cart.id, 0).await.unwrap());
        assert!(store.take(&cart.id, 1).await.unwrap());
        assert!(store
            .find_by_owner(&OwnerKey::Guest("g1".to_string()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn only_an_old_claim_can_be_taken_over() {
        let store = InMemoryStore::new();
        let mut checkout = CheckoutSession::new(
            "u1",
            vec![],
            crate::models::ShippingAddress {
                first_name: None,
                last_name: None,
                address: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                postal_code: "12345".to_string(),
                country: "US".to_string(),
                phone: None,
            },
            "card".to_string(),
            rust_decimal::Decimal::ONE,
        );
        checkout.is_paid = true;
        CheckoutRepository::insert(&store, &checkout).await.unwrap();

        let now = Utc::now();
        assert!(store.claim_for_finalize(&checkout.id, "first", now).await.unwrap());
        assert!(!store.claim_for_finalize(&checkout.id, "second", now).await.unwrap());

        let cutoff = now - chrono::Duration::minutes(5);
        assert!(!store.take_over_claim(&checkout.id, "first", "second", cutoff, now).await.unwrap());

        let later = now + chrono::Duration::minutes(10);
        let cutoff = later - chrono::Duration::minutes(5);
        assert!(!store.take_over_claim(&checkout.id, "other", "second", cutoff, later).await.unwrap());
        assert!(store.take_over_claim(&checkout.id, "first", "second", cutoff, later).await.unwrap());

        let stored = CheckoutRepository::find(&store, &checkout.id).await.unwrap().unwrap();
        assert_eq!(stored.order_id.as_deref(), Some("second"));
        assert_eq!(stored.claimed_at, Some(later));

        assert!(store.release_claim(&checkout.id, "second").await.unwrap());
        let stored = CheckoutRepository::find(&store, &checkout.id).await.unwrap().unwrap();
        assert!(stored.order_id.is_none() && stored.claimed_at.is_none());
    }
}
