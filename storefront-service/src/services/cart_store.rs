use std::sync::Arc;

use super::catalog::CatalogLookup;
use super::metrics::{record_cart_mutation, record_saga_compensation};
use super::repository::CartRepository;
use super::ServiceError;
use crate::models::{Cart, LineItem, LineKey, OwnerKey};

/// Read-modify-write attempts before a contended cart mutation gives up.
pub const MAX_CART_WRITE_ATTEMPTS: u32 = 3;

/// Result of an add: the stored cart and whether this call created it.
#[derive(Debug, Clone)]
pub struct CartUpdate {
    pub cart: Cart,
    pub created: bool,
}

#[derive(Clone)]
pub struct CartStore {
    carts: Arc<dyn CartRepository>,
    catalog: Arc<dyn CatalogLookup>,
}

fn retryable(err: &ServiceError, attempt: u32) -> bool {
    err.is_conflict() && attempt < MAX_CART_WRITE_ATTEMPTS
}

fn merged(cart: Cart, guest: &Cart) -> Cart {
    record_cart_mutation("merge", "merged");
    tracing::info!(cart_id = %cart.id, guest_cart_id = %guest.id, "Guest cart merged");
    cart
}

impl CartStore {
    pub fn new(carts: Arc<dyn CartRepository>, catalog: Arc<dyn CatalogLookup>) -> Self {
        Self { carts, catalog }
    }

    #[tracing::instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn resolve(&self, owner: &OwnerKey) -> Result<Cart, ServiceError> {
        self.carts
            .find_by_owner(owner)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cart not found"))
    }

    #[tracing::instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn add_item(
        &self,
        owner: &OwnerKey,
        product_id: &str,
        quantity: u32,
        size: Option<String>,
        color: Option<String>,
    ) -> Result<CartUpdate, ServiceError> {
        if quantity == 0 {
            return Err(ServiceError::validation("Quantity must be a positive integer"));
        }

        let product = self
            .catalog
            .product(product_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product not found"))?;
        let line = LineItem::from_product(&product, size, color, quantity);

        for attempt in 1..=MAX_CART_WRITE_ATTEMPTS {
            let outcome = match self.carts.find_by_owner(owner).await? {
                Some(mut cart) => {
                    cart.add_line(line.clone())?;
                    self.carts.save(&cart).await.map(|cart| CartUpdate {
                        cart,
                        created: false,
                    })
                }
                None => {
                    let mut cart = Cart::new(owner);
                    cart.add_line(line.clone())?;
                    self.carts
                        .insert(&cart)
                        .await
                        .map(|()| CartUpdate { cart, created: true })
                }
            };

            match outcome {
                Ok(update) => {
                    let label = if update.created { "created" } else { "updated" };
                    record_cart_mutation("add_item", label);
                    tracing::info!(cart_id = %update.cart.id, created = update.created, "Item added to cart");
                    return Ok(update);
                }
                Err(e) if retryable(&e, attempt) => {
                    tracing::debug!(attempt, "Cart changed underneath add; retrying");
                }
                Err(e) => {
                    record_cart_mutation("add_item", "failed");
                    return Err(e);
                }
            }
        }

        Err(ServiceError::conflict("Cart was modified concurrently"))
    }

    #[tracing::instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn set_item_quantity(
        &self,
        owner: &OwnerKey,
        key: &LineKey,
        quantity: u32,
    ) -> Result<Cart, ServiceError> {
        self.mutate_existing(owner, "set_quantity", |cart| {
            if cart.set_quantity(key, quantity) {
                Ok(())
            } else {
                Err(ServiceError::not_found("Product not found in cart"))
            }
        })
        .await
    }

    #[tracing::instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn remove_item(&self, owner: &OwnerKey, key: &LineKey) -> Result<Cart, ServiceError> {
        self.mutate_existing(owner, "remove_item", |cart| {
            if cart.remove_line(key) {
                Ok(())
            } else {
                Err(ServiceError::not_found("Product not found in cart"))
            }
        })
        .await
    }

    /// Fold a guest cart into the user's cart.
    ///
    /// The guest cart is taken with a conditional delete before its lines are
    /// folded in, so two concurrent merges cannot both apply it. Once taken,
    /// its lines are carried until they land somewhere: the user-side write is
    /// retried against fresh reads, and a failed merge puts them back under
    /// the guest key.
    #[tracing::instrument(skip(self))]
    pub async fn merge_guest_into_user(
        &self,
        guest_token: &str,
        user_id: &str,
    ) -> Result<Cart, ServiceError> {
        let guest_key = OwnerKey::guest(guest_token)
            .ok_or_else(|| ServiceError::validation("guest_id is required"))?;
        let user_key = OwnerKey::User(user_id.to_string());

        for attempt in 1..=MAX_CART_WRITE_ATTEMPTS {
            let guest = self.carts.find_by_owner(&guest_key).await?;
            let user = self.carts.find_by_owner(&user_key).await?;

            let Some(guest) = guest else {
                return user.ok_or_else(|| ServiceError::not_found("Nothing to merge"));
            };
            if guest.is_empty() {
                return Err(ServiceError::validation("Guest cart is empty"));
            }

            if user.is_none() {
                let mut rekeyed = guest.clone();
                rekeyed.assign_to_user(user_id);
                match self.carts.save(&rekeyed).await {
                    Ok(cart) => return Ok(merged(cart, &guest)),
                    Err(e) if retryable(&e, attempt) => {
                        tracing::debug!(attempt, "Merge collided with a concurrent cart write; retrying");
                        continue;
                    }
                    Err(e) => {
                        record_cart_mutation("merge", "failed");
                        return Err(e);
                    }
                }
            }

            if !self.carts.take(&guest.id, guest.version).await? {
                tracing::debug!(attempt, "Guest cart moved before it could be taken; retrying");
                continue;
            }

            return match self.fold_taken_guest(&guest, &user_key).await {
                Ok(cart) => Ok(merged(cart, &guest)),
                Err(e) => {
                    record_cart_mutation("merge", "failed");
                    self.restore_guest_cart(&guest).await;
                    Err(e)
                }
            };
        }

        record_cart_mutation("merge", "failed");
        Err(ServiceError::conflict("Guest cart changed during merge"))
    }

    /// Write the lines of an already-taken guest cart into the user's cart,
    /// re-reading it on every attempt. A user cart that vanished is recreated.
    async fn fold_taken_guest(&self, guest: &Cart, user_key: &OwnerKey) -> Result<Cart, ServiceError> {
        for attempt in 1..=MAX_CART_WRITE_ATTEMPTS {
            let outcome = match self.carts.find_by_owner(user_key).await? {
                Some(mut user_cart) => {
                    user_cart.absorb(guest.items.iter().cloned())?;
                    self.carts.save(&user_cart).await
                }
                None => {
                    let mut fresh = Cart::new(user_key);
                    fresh.absorb(guest.items.iter().cloned())?;
                    self.carts.insert(&fresh).await.map(|()| fresh)
                }
            };

            match outcome {
                Ok(cart) => return Ok(cart),
                Err(e) if retryable(&e, attempt) => {
                    tracing::debug!(attempt, "User cart changed during merge; retrying with a fresh read");
                }
                Err(e) => return Err(e),
            }
        }

        Err(ServiceError::conflict("Cart was modified concurrently"))
    }

    /// Put the lines of a taken guest cart back under the guest key. If a new
    /// guest cart appeared in the meantime the lines are folded into it.
    async fn restore_guest_cart(&self, guest: &Cart) {
        record_saga_compensation("merge", "restore_guest_cart");
        let Some(guest_key) = guest.owner() else {
            tracing::error!(guest_cart_id = %guest.id, "Taken guest cart has no owner; lines dropped");
            return;
        };

        for attempt in 1..=MAX_CART_WRITE_ATTEMPTS {
            let outcome = match self.carts.find_by_owner(&guest_key).await {
                Ok(None) => self.carts.insert(guest).await.map(|()| guest.id.clone()),
                Ok(Some(mut current)) => match current.absorb(guest.items.iter().cloned()) {
                    Ok(()) => self.carts.save(&current).await.map(|cart| cart.id),
                    Err(e) => Err(e.into()),
                },
                Err(e) => Err(e),
            };

            match outcome {
                Ok(cart_id) => {
                    tracing::warn!(
                        guest_cart_id = %guest.id,
                        restored_into = %cart_id,
                        "Restored guest cart lines after an aborted merge"
                    );
                    return;
                }
                Err(e) if retryable(&e, attempt) => {
                    tracing::debug!(attempt, "Guest key changed during restore; retrying");
                }
                Err(e) => {
                    tracing::error!(
                        guest_cart_id = %guest.id,
                        error = %e,
                        "Failed to restore guest cart after an aborted merge"
                    );
                    return;
                }
            }
        }

        tracing::error!(guest_cart_id = %guest.id, "Gave up restoring guest cart after repeated conflicts");
    }

    async fn mutate_existing<F>(
        &self,
        owner: &OwnerKey,
        operation: &'static str,
        mut apply: F,
    ) -> Result<Cart, ServiceError>
    where
        F: FnMut(&mut Cart) -> Result<(), ServiceError> + Send,
    {
        for attempt in 1..=MAX_CART_WRITE_ATTEMPTS {
            let mut cart = self
                .carts
                .find_by_owner(owner)
                .await?
                .ok_or_else(|| ServiceError::not_found("Cart not found"))?;
            apply(&mut cart)?;

            match self.carts.save(&cart).await {
                Ok(saved) => {
                    record_cart_mutation(operation, "updated");
                    tracing::info!(cart_id = %saved.id, items = saved.items.len(), "Cart updated");
                    return Ok(saved);
                }
                Err(e) if retryable(&e, attempt) => {
                    tracing::debug!(attempt, "Cart changed underneath update; retrying");
                }
                Err(e) => {
                    record_cart_mutation(operation, "failed");
                    return Err(e);
                }
            }
        }

        Err(ServiceError::conflict("Cart was modified concurrently"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductSnapshot;
    use crate::services::catalog::StaticCatalog;
    use crate::services::memory::InMemoryStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn catalog() -> Arc<StaticCatalog> {
        Arc::new(StaticCatalog::new([
            ProductSnapshot {
                id: "P1".to_string(),
                name: "Linen Shirt".to_string(),
                price: Decimal::new(2500, 2),
                image: Some("https://cdn.example.com/p1.jpg".to_string()),
                available: true,
            },
            ProductSnapshot {
                id: "P2".to_string(),
                name: "Canvas Tote".to_string(),
                price: Decimal::new(1000, 2),
                image: None,
                available: true,
            },
        ]))
    }

    fn store() -> (CartStore, Arc<InMemoryStore>) {
        let repo = Arc::new(InMemoryStore::new());
        (CartStore::new(repo.clone(), catalog()), repo)
    }

    fn guest(token: &str) -> OwnerKey {
        OwnerKey::Guest(token.to_string())
    }

    fn user(id: &str) -> OwnerKey {
        OwnerKey::User(id.to_string())
    }

    fn m_red() -> (Option<String>, Option<String>) {
        (Some("M".to_string()), Some("Red".to_string()))
    }

    fn p1_m_red() -> LineKey {
        let (size, color) = m_red();
        LineKey::new("P1", size, color)
    }

    fn tote(quantity: u32) -> LineItem {
        LineItem {
            product_id: "P2".to_string(),
            name: "Canvas Tote".to_string(),
            image: None,
            unit_price: Decimal::new(1000, 2),
            size: None,
            color: None,
            quantity,
        }
    }

    async fn seed_guest_and_user(inner: &Arc<InMemoryStore>) {
        let seeding = CartStore::new(inner.clone(), catalog());
        let (size, color) = m_red();
        seeding.add_item(&guest("g1"), "P1", 5, size.clone(), color.clone()).await.unwrap();
        seeding.add_item(&user("u1"), "P1", 1, size, color).await.unwrap();
    }

    #[tokio::test]
    async fn first_add_creates_then_repeat_increments() {
        let (carts, _) = store();
        let (size, color) = m_red();

        let first = carts.add_item(&guest("g1"), "P1", 2, size.clone(), color.clone()).await.unwrap();
        assert!(first.created);
        assert_eq!(first.cart.total_price, Decimal::new(5000, 2));

        let second = carts.add_item(&guest("g1"), "P1", 1, size, color).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.cart.items.len(), 1);
        assert_eq!(second.cart.items[0].quantity, 3);
        assert_eq!(second.cart.total_price, Decimal::new(7500, 2));
    }

    #[tokio::test]
    async fn add_rejects_unknown_product_and_zero_quantity() {
        let (carts, _) = store();

        let err = carts.add_item(&guest("g1"), "nope", 1, None, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = carts.add_item(&guest("g1"), "P1", 0, None, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn resolve_does_not_create() {
        let (carts, repo) = store();

        assert!(matches!(carts.resolve(&guest("g1")).await, Err(ServiceError::NotFound(_))));
        assert!(repo.find_by_owner(&guest("g1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_quantity_zero_removes_line() {
        let (carts, _) = store();
        let (size, color) = m_red();
        carts.add_item(&user("u1"), "P1", 2, size, color).await.unwrap();
        carts.add_item(&user("u1"), "P2", 1, None, None).await.unwrap();

        let cart = carts.set_item_quantity(&user("u1"), &p1_m_red(), 0).await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.total_price, Decimal::new(1000, 2));

        let err = carts.set_item_quantity(&user("u1"), &p1_m_red(), 3).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_requires_cart_and_line() {
        let (carts, _) = store();
        let err = carts.remove_item(&user("u1"), &p1_m_red()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let (size, color) = m_red();
        carts.add_item(&user("u1"), "P1", 1, size, color).await.unwrap();
        let cart = carts.remove_item(&user("u1"), &p1_m_red()).await.unwrap();
        assert!(cart.items.is_empty());
        assert_eq!(cart.total_price, Decimal::ZERO);
    }

    #[tokio::test]
    async fn merge_without_user_cart_rekeys_guest_cart() {
        let (carts, _) = store();
        let (size, color) = m_red();
        let guest_cart = carts.add_item(&guest("g1"), "P1", 3, size, color).await.unwrap().cart;

        let merged = carts.merge_guest_into_user("g1", "u1").await.unwrap();
        assert_eq!(merged.id, guest_cart.id);
        assert_eq!(merged.user_id.as_deref(), Some("u1"));
        assert!(merged.guest_id.is_none());
        assert_eq!(merged.items[0].quantity, 3);
        assert!(carts.resolve(&guest("g1")).await.is_err());
    }

    #[tokio::test]
    async fn merge_into_existing_user_cart_sums_and_removes_guest() {
        let (carts, _) = store();
        let (size, color) = m_red();
        carts.add_item(&guest("g1"), "P1", 2, size.clone(), color.clone()).await.unwrap();
        carts.add_item(&guest("g1"), "P2", 1, None, None).await.unwrap();
        carts.add_item(&user("u1"), "P1", 1, size, color).await.unwrap();

        let merged = carts.merge_guest_into_user("g1", "u1").await.unwrap();
        assert_eq!(merged.items.len(), 2);
        assert_eq!(merged.find_line(&p1_m_red()).map(|l| l.quantity), Some(3));
        assert_eq!(merged.total_price, Decimal::new(8500, 2));
        assert!(carts.resolve(&guest("g1")).await.is_err());
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let (carts, _) = store();
        carts.add_item(&guest("g1"), "P2", 2, None, None).await.unwrap();

        let first = carts.merge_guest_into_user("g1", "u1").await.unwrap();
        let second = carts.merge_guest_into_user("g1", "u1").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.items, second.items);
        assert_eq!(first.version, second.version);
    }

    #[tokio::test]
    async fn merge_edge_cases() {
        let (carts, repo) = store();
        let err = carts.merge_guest_into_user("g1", "u1").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        CartRepository::insert(repo.as_ref(), &Cart::new(&guest("g2"))).await.unwrap();
        let err = carts.merge_guest_into_user("g2", "u1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = carts.merge_guest_into_user("   ", "u1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn merge_trims_guest_token() {
        let (carts, _) = store();
        carts.add_item(&guest("g1"), "P2", 2, None, None).await.unwrap();

        let merged = carts.merge_guest_into_user("  g1 ", "u1").await.unwrap();
        assert_eq!(merged.user_id.as_deref(), Some("u1"));
        assert_eq!(merged.items[0].quantity, 2);
        assert!(carts.resolve(&guest("g1")).await.is_err());
    }

    #[tokio::test]
    async fn add_refuses_quantity_overflow() {
        let (carts, _) = store();
        carts.add_item(&guest("g1"), "P2", u32::MAX, None, None).await.unwrap();

        let err = carts.add_item(&guest("g1"), "P2", 1, None, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        let cart = carts.resolve(&guest("g1")).await.unwrap();
        assert_eq!(cart.items[0].quantity, u32::MAX);
    }

    /// Lets one save through from a "competing writer" before the caller's
    /// save, so the caller's copy is stale.
    struct InterleavedWriter {
        inner: Arc<InMemoryStore>,
        interfered: AtomicBool,
    }

    #[async_trait]
    impl CartRepository for InterleavedWriter {
        async fn find_by_owner(&self, owner: &OwnerKey) -> Result<Option<Cart>, ServiceError> {
            self.inner.find_by_owner(owner).await
        }

        async fn insert(&self, cart: &Cart) -> Result<(), ServiceError> {
            CartRepository::insert(self.inner.as_ref(), cart).await
        }

        async fn save(&self, cart: &Cart) -> Result<Cart, ServiceError> {
            if !self.interfered.swap(true, Ordering::SeqCst) {
                let owner = cart.owner().unwrap();
                let mut competing = self.inner.find_by_owner(&owner).await?.unwrap();
                competing.add_line(tote(1)).unwrap();
                self.inner.save(&competing).await?;
            }
            self.inner.save(cart).await
        }

        async fn take(&self, id: &str, version: i64) -> Result<bool, ServiceError> {
            self.inner.take(id, version).await
        }

        async fn delete_by_owner(&self, owner: &OwnerKey) -> Result<bool, ServiceError> {
            self.inner.delete_by_owner(owner).await
        }
    }

    #[tokio::test]
    async fn concurrent_write_is_retried_instead_of_lost() {
        let inner = Arc::new(InMemoryStore::new());
        let (size, color) = m_red();
        CartStore::new(inner.clone(), catalog())
            .add_item(&guest("g1"), "P1", 1, size.clone(), color.clone())
            .await
            .unwrap();

        let racing = CartStore::new(
            Arc::new(InterleavedWriter {
                inner: inner.clone(),
                interfered: AtomicBool::new(false),
            }),
            catalog(),
        );
        let cart = racing.add_item(&guest("g1"), "P1", 1, size, color).await.unwrap().cart;

        assert_eq!(cart.find_line(&p1_m_red()).map(|l| l.quantity), Some(2));
        assert_eq!(cart.find_line(&LineKey::new("P2", None, None)).map(|l| l.quantity), Some(1));
        assert_eq!(cart.total_price, cart.computed_total());
    }

    /// Before the first save of a user cart, a racer opens a fresh guest cart
    /// under the same token and bumps the user cart.
    struct GuestRacer {
        inner: Arc<InMemoryStore>,
        raced: AtomicBool,
    }

    #[async_trait]
    impl CartRepository for GuestRacer {
        async fn find_by_owner(&self, owner: &OwnerKey) -> Result<Option<Cart>, ServiceError> {
            self.inner.find_by_owner(owner).await
        }

        async fn insert(&self, cart: &Cart) -> Result<(), ServiceError> {
            CartRepository::insert(self.inner.as_ref(), cart).await
        }

        async fn save(&self, cart: &Cart) -> Result<Cart, ServiceError> {
            if cart.user_id.is_some() && !self.raced.swap(true, Ordering::SeqCst) {
                let mut fresh = Cart::new(&guest("g1"));
                fresh.add_line(tote(1)).unwrap();
                CartRepository::insert(self.inner.as_ref(), &fresh).await?;

                let bumped = self.inner.find_by_owner(&cart.owner().unwrap()).await?.unwrap();
                self.inner.save(&bumped).await?;
            }
            self.inner.save(cart).await
        }

        async fn take(&self, id: &str, version: i64) -> Result<bool, ServiceError> {
            self.inner.take(id, version).await
        }

        async fn delete_by_owner(&self, owner: &OwnerKey) -> Result<bool, ServiceError> {
            self.inner.delete_by_owner(owner).await
        }
    }

    #[tokio::test]
    async fn merge_keeps_taken_guest_lines_when_user_cart_races() {
        let inner = Arc::new(InMemoryStore::new());
        seed_guest_and_user(&inner).await;

        let racing = CartStore::new(
            Arc::new(GuestRacer {
                inner: inner.clone(),
                raced: AtomicBool::new(false),
            }),
            catalog(),
        );
        let merged = racing.merge_guest_into_user("g1", "u1").await.unwrap();

        assert_eq!(merged.find_line(&p1_m_red()).map(|l| l.quantity), Some(6));
        assert_eq!(merged.total_price, Decimal::new(15000, 2));

        let newer_guest = inner.find_by_owner(&guest("g1")).await.unwrap().unwrap();
        assert_eq!(newer_guest.items, vec![tote(1)]);
    }

    /// Refuses every write of a user cart. With `open_guest` set, a new guest
    /// cart appears under the same token just before the first refusal.
    struct RefusingUserWrites {
        inner: Arc<InMemoryStore>,
        open_guest: bool,
        opened: AtomicBool,
    }

    impl RefusingUserWrites {
        async fn refuse(&self) -> ServiceError {
            if self.open_guest && !self.opened.swap(true, Ordering::SeqCst) {
                let mut fresh = Cart::new(&guest("g1"));
                fresh.add_line(tote(1)).unwrap();
                CartRepository::insert(self.inner.as_ref(), &fresh).await.unwrap();
            }
            ServiceError::Internal(anyhow::anyhow!("storage unavailable"))
        }
    }

    #[async_trait]
    impl CartRepository for RefusingUserWrites {
        async fn find_by_owner(&self, owner: &OwnerKey) -> Result<Option<Cart>, ServiceError> {
            self.inner.find_by_owner(owner).await
        }

        async fn insert(&self, cart: &Cart) -> Result<(), ServiceError> {
            if cart.user_id.is_some() {
                return Err(self.refuse().await);
            }
            CartRepository::insert(self.inner.as_ref(), cart).await
        }

        async fn save(&self, cart: &Cart) -> Result<Cart, ServiceError> {
            if cart.user_id.is_some() {
                return Err(self.refuse().await);
            }
            self.inner.save(cart).await
        }

        async fn take(&self, id: &str, version: i64) -> Result<bool, ServiceError> {
            self.inner.take(id, version).await
        }

        async fn delete_by_owner(&self, owner: &OwnerKey) -> Result<bool, ServiceError> {
            self.inner.delete_by_owner(owner).await
        }
    }

    fn refusing(inner: &Arc<InMemoryStore>, open_guest: bool) -> CartStore {
        CartStore::new(
            Arc::new(RefusingUserWrites {
                inner: inner.clone(),
                open_guest,
                opened: AtomicBool::new(false),
            }),
            catalog(),
        )
    }

    #[tokio::test]
    async fn failed_merge_puts_guest_cart_back() {
        let inner = Arc::new(InMemoryStore::new());
        seed_guest_and_user(&inner).await;

        let err = refusing(&inner, false).merge_guest_into_user("g1", "u1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)));

        let restored = inner.find_by_owner(&guest("g1")).await.unwrap().unwrap();
        assert_eq!(restored.find_line(&p1_m_red()).map(|l| l.quantity), Some(5));
        let untouched = inner.find_by_owner(&user("u1")).await.unwrap().unwrap();
        assert_eq!(untouched.find_line(&p1_m_red()).map(|l| l.quantity), Some(1));
    }

    #[tokio::test]
    async fn failed_merge_folds_lines_into_newer_guest_cart() {
        let inner = Arc::new(InMemoryStore::new());
        seed_guest_and_user(&inner).await;

        let err = refusing(&inner, true).merge_guest_into_user("g1", "u1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)));

        let restored = inner.find_by_owner(&guest("g1")).await.unwrap().unwrap();
        assert_eq!(restored.find_line(&p1_m_red()).map(|l| l.quantity), Some(5));
        assert_eq!(restored.find_line(&LineKey::new("P2", None, None)).map(|l| l.quantity), Some(1));
        assert_eq!(restored.total_price, restored.computed_total());
    }
}
