//! Local-first cart.
//!
//! [`CartStore`] applies every mutation to the session copy of the cart and
//! awaits that write before returning. The remote mirror (`carts` and
//! `cart_items`) is updated from a detached task; its failures are logged
//! and otherwise ignored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use sneaco_core::cart::{Cart, CartError, CartLine, QuantityUpdate};
use sneaco_core::{ProductId, VariantId};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::catalog::CatalogSource;
use super::{LocalStorage, StorageError};
use crate::db::RepositoryError;
use crate::models::CartOwner;

/// Errors surfaced by cart operations. Mirror failures never appear here.
#[derive(Debug, Error)]
pub enum CartServiceError {
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("variant {0} not found")]
    VariantNotFound(VariantId),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("catalog error: {0}")]
    Catalog(#[from] RepositoryError),
}

/// Remote copy of a cart, keyed by its owner.
#[async_trait]
pub trait CartMirror: Send + Sync {
    /// Insert the line or overwrite its quantity, creating the cart record if needed.
    async fn upsert_line(&self, owner: &CartOwner, line: &CartLine) -> Result<(), RepositoryError>;

    async fn remove_line(&self, owner: &CartOwner, variant_id: &VariantId) -> Result<(), RepositoryError>;

    /// Delete every line and the cart record itself.
    async fn clear(&self, owner: &CartOwner) -> Result<(), RepositoryError>;

    async fn fetch(&self, owner: &CartOwner) -> Result<Vec<CartLine>, RepositoryError>;
}

/// A cart line resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLineView {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub name: String,
    pub brand: String,
    pub image: String,
    pub size: String,
    pub color: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
}

/// The displayable cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub subtotal: Decimal,
    /// Units across the displayed lines.
    pub count: u32,
}

impl CartView {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Result of a cart mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartMutation {
    pub variant_id: Option<VariantId>,
    /// The line's quantity afterwards, `None` once it is gone.
    pub quantity: Option<u32>,
    /// Units in the whole cart afterwards.
    pub count: u32,
    /// The cart drawer should be shown.
    pub drawer_open: bool,
}

/// Cart operations for one browsing session.
pub struct CartStore {
    storage: Box<dyn LocalStorage<Cart>>,
    mirror: Arc<dyn CartMirror>,
    catalog: Arc<dyn CatalogSource>,
    owner: CartOwner,
}

impl CartStore {
    #[must_use]
    pub fn new(
        storage: Box<dyn LocalStorage<Cart>>,
        mirror: Arc<dyn CartMirror>,
        catalog: Arc<dyn CatalogSource>,
        owner: CartOwner,
    ) -> Self {
        Self {
            storage,
            mirror,
            catalog,
            owner,
        }
    }

    /// Adopt the mirrored lines into an empty local cart.
    ///
    /// Called once per sign-in, never on ordinary requests, so a cart the
    /// customer emptied stays empty while the mirror delete is in flight.
    /// Quantities are clamped to fresh stock; sold-out or unknown variants
    /// are dropped. Best-effort: failures are logged and leave the local cart
    /// as it was. Returns whether lines were adopted.
    #[instrument(skip(self), fields(owner = %self.owner.key()))]
    pub async fn adopt_mirror(&self) -> bool {
        if self.owner.user_id().is_none() {
            return false;
        }
        match self.storage.load().await {
            Ok(cart) if cart.is_empty() => {}
            Ok(_) => return false,
            Err(error) => {
                warn!(%error, "Could not read local cart before adopting the mirror");
                return false;
            }
        }

        let lines = match self.mirror.fetch(&self.owner).await {
            Ok(lines) => lines,
            Err(error) => {
                warn!(%error, "Cart mirror fetch failed");
                return false;
            }
        };

        let merged = Cart::from(lines);
        let mut cart = Cart::new();
        for line in merged.lines() {
            let stock = match self.catalog.stock(&line.variant_id).await {
                Ok(Some(stock)) => stock,
                Ok(None) => continue,
                // No fresh stock: keep the mirrored quantity as-is
                Err(error) => {
                    warn!(%error, variant_id = %line.variant_id, "Stock read failed while adopting");
                    line.quantity
                }
            };
            if let Err(error) = cart.add(line.variant_id.clone(), line.quantity, stock) {
                debug!(%error, "Skipping mirrored cart line");
            }
        }
        if cart.is_empty() {
            return false;
        }

        debug!(lines = cart.lines().len(), "Adopting mirrored cart");
        if let Err(error) = self.storage.save(&cart).await {
            warn!(%error, "Could not store mirrored cart locally");
            return false;
        }
        true
    }

    #[must_use]
    pub const fn owner(&self) -> &CartOwner {
        &self.owner
    }

    /// Current local cart lines.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be read.
    pub async fn cart(&self) -> Result<Cart, CartServiceError> {
        Ok(self.storage.load().await?)
    }

    /// Units in the cart.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be read.
    pub async fn count(&self) -> Result<u32, CartServiceError> {
        Ok(self.cart().await?.item_count())
    }

    /// Add units of a variant, clamped to its current stock.
    ///
    /// # Errors
    ///
    /// `InvalidQuantity` for zero, `OutOfStock` when the fresh stock is zero,
    /// `VariantNotFound` for an unknown variant. The cart is unchanged on error.
    #[instrument(skip(self), fields(owner = %self.owner.key()))]
    pub async fn add(&self, variant_id: VariantId, quantity: u32) -> Result<CartMutation, CartServiceError> {
        let stock = self
            .catalog
            .stock(&variant_id)
            .await?
            .ok_or_else(|| CartServiceError::VariantNotFound(variant_id.clone()))?;

        let mut cart = self.storage.load().await?;
        let new_quantity = cart.add(variant_id.clone(), quantity, stock)?;
        self.storage.save(&cart).await?;

        let line = CartLine {
            variant_id: variant_id.clone(),
            quantity: new_quantity,
        };
        self.mirror_in_background("upsert_line", move |mirror, owner| async move {
            mirror.upsert_line(&owner, &line).await
        });

        Ok(CartMutation {
            variant_id: Some(variant_id),
            quantity: Some(new_quantity),
            count: cart.item_count(),
            drawer_open: true,
        })
    }

    /// Set a line's quantity, clamped to `[1, stock]`.
    ///
    /// A failed stock read clamps only to a minimum of 1. A stock of zero
    /// removes the line.
    ///
    /// # Errors
    ///
    /// `LineNotFound` if the variant is not in the cart.
    #[instrument(skip(self), fields(owner = %self.owner.key()))]
    pub async fn set_quantity(
        &self,
        variant_id: VariantId,
        requested: i64,
    ) -> Result<CartMutation, CartServiceError> {
        let stock = match self.catalog.stock(&variant_id).await {
            Ok(stock) => stock,
            Err(error) => {
                warn!(%error, "Stock read failed, clamping to a minimum of 1 only");
                None
            }
        };

        let mut cart = self.storage.load().await?;
        let update = cart.set_quantity(&variant_id, requested, stock)?;
        self.storage.save(&cart).await?;

        let quantity = match update {
            QuantityUpdate::Set(quantity) => {
                let line = CartLine {
                    variant_id: variant_id.clone(),
                    quantity,
                };
                self.mirror_in_background("upsert_line", move |mirror, owner| async move {
                    mirror.upsert_line(&owner, &line).await
                });
                Some(quantity)
            }
            QuantityUpdate::Removed => {
                let id = variant_id.clone();
                self.mirror_in_background("remove_line", move |mirror, owner| async move {
                    mirror.remove_line(&owner, &id).await
                });
                None
            }
        };

        Ok(CartMutation {
            variant_id: Some(variant_id),
            quantity,
            count: cart.item_count(),
            drawer_open: false,
        })
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// `LineNotFound` if the variant is not in the cart.
    #[instrument(skip(self), fields(owner = %self.owner.key()))]
    pub async fn remove(&self, variant_id: VariantId) -> Result<CartMutation, CartServiceError> {
        let mut cart = self.storage.load().await?;
        cart.remove(&variant_id)?;
        self.storage.save(&cart).await?;

        let id = variant_id.clone();
        self.mirror_in_background("remove_line", move |mirror, owner| async move {
            mirror.remove_line(&owner, &id).await
        });

        Ok(CartMutation {
            variant_id: Some(variant_id),
            quantity: None,
            count: cart.item_count(),
            drawer_open: false,
        })
    }

    /// Empty the cart and drop the mirrored cart record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be written.
    #[instrument(skip(self), fields(owner = %self.owner.key()))]
    pub async fn clear(&self) -> Result<CartMutation, CartServiceError> {
        self.storage.save(&Cart::new()).await?;

        self.mirror_in_background("clear", |mirror, owner| async move {
            mirror.clear(&owner).await
        });

        Ok(CartMutation {
            variant_id: None,
            quantity: None,
            count: 0,
            drawer_open: false,
        })
    }

    /// Resolve every line against the catalog for display.
    ///
    /// Lines whose variant no longer exists are left out of the view but
    /// stay in the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the session or the catalog cannot be read.
    pub async fn detailed(&self) -> Result<CartView, CartServiceError> {
        let cart = self.storage.load().await?;
        if cart.is_empty() {
            return Ok(CartView::default());
        }

        let ids: Vec<VariantId> = cart.lines().iter().map(|l| l.variant_id.clone()).collect();
        let details: HashMap<VariantId, _> = self
            .catalog
            .variant_details(&ids)
            .await?
            .into_iter()
            .map(|d| (d.variant.id.clone(), d))
            .collect();

        let lines: Vec<CartLineView> = cart
            .lines()
            .iter()
            .filter_map(|line| {
                let Some(detail) = details.get(&line.variant_id) else {
                    debug!(variant_id = %line.variant_id, "Dropping unresolvable cart line from view");
                    return None;
                };
                let unit_price = detail.variant.price;
                Some(CartLineView {
                    variant_id: line.variant_id.clone(),
                    product_id: detail.product_id.clone(),
                    name: detail.product_name.clone(),
                    brand: detail.brand.clone(),
                    image: detail.image.clone(),
                    size: detail.variant.size.clone(),
                    color: detail.variant.color.clone(),
                    unit_price,
                    quantity: line.quantity,
                    line_total: unit_price * Decimal::from(line.quantity),
                })
            })
            .collect();

        let subtotal = lines.iter().map(|l| l.line_total).sum();
        let count = lines
            .iter()
            .fold(0_u32, |acc, l| acc.saturating_add(l.quantity));

        Ok(CartView {
            lines,
            subtotal,
            count,
        })
    }

    /// Run a mirror call on a detached task. Failures are logged at `warn`.
    fn mirror_in_background<F, Fut>(&self, operation: &'static str, call: F)
    where
        F: FnOnce(Arc<dyn CartMirror>, CartOwner) -> Fut,
        Fut: Future<Output = Result<(), RepositoryError>> + Send + 'static,
    {
        let owner_key = self.owner.key();
        let call = call(Arc::clone(&self.mirror), self.owner.clone());
        tokio::spawn(async move {
            if let Err(error) = call.await {
                warn!(%error, operation, owner = %owner_key, "Cart mirror failed");
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use sneaco_core::catalog::{Product, Variant};

    use super::*;
    use crate::services::catalog::VariantDetail;
    use crate::services::tests::MemoryStorage;

    /// Catalog with fixed variants; `fail_stock` makes stock reads error.
    #[derive(Default)]
    pub struct StaticCatalog {
        pub variants: Vec<Variant>,
        pub fail_stock: bool,
    }

    #[async_trait]
    impl CatalogSource for StaticCatalog {
        async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
            Ok(vec![])
        }

        async fn product(&self, _id: &ProductId) -> Result<Option<Product>, RepositoryError> {
            Ok(None)
        }

        async fn variant_details(&self, ids: &[VariantId]) -> Result<Vec<VariantDetail>, RepositoryError> {
            Ok(self
                .variants
                .iter()
                .filter(|v| ids.contains(&v.id))
                .map(|v| VariantDetail {
                    product_id: ProductId::new("p-1"),
                    product_name: "Runner Eco".to_owned(),
                    brand: "Sneaco".to_owned(),
                    image: "/img.png".to_owned(),
                    variant: v.clone(),
                })
                .collect())
        }

        async fn stock(&self, id: &VariantId) -> Result<Option<u32>, RepositoryError> {
            if self.fail_stock {
                return Err(RepositoryError::DataCorruption("stock read failed".to_owned()));
            }
            Ok(self.variants.iter().find(|v| &v.id == id).map(|v| v.stock))
        }
    }

    /// Mirror that records calls and can be told to fail.
    #[derive(Default)]
    pub struct RecordingMirror {
        pub calls: Mutex<Vec<String>>,
        pub stored: Mutex<Vec<CartLine>>,
        pub fail: bool,
    }

    #[async_trait]
    impl CartMirror for RecordingMirror {
        async fn upsert_line(&self, owner: &CartOwner, line: &CartLine) -> Result<(), RepositoryError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("upsert {} {} {}", owner.key(), line.variant_id, line.quantity));
            if self.fail {
                return Err(RepositoryError::NotFound);
            }
            Ok(())
        }

        async fn remove_line(&self, owner: &CartOwner, variant_id: &VariantId) -> Result<(), RepositoryError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("remove {} {variant_id}", owner.key()));
            Ok(())
        }

        async fn clear(&self, owner: &CartOwner) -> Result<(), RepositoryError> {
            self.calls.lock().unwrap().push(format!("clear {}", owner.key()));
            Ok(())
        }

        async fn fetch(&self, _owner: &CartOwner) -> Result<Vec<CartLine>, RepositoryError> {
            Ok(self.stored.lock().unwrap().clone())
        }
    }

    fn variant(id: &str, stock: u32) -> Variant {
        Variant::new(id, "42", Some("Blanc"), Decimal::new(4999, 2), stock)
    }

    struct Harness {
        store: CartStore,
        storage: MemoryStorage<Cart>,
        mirror: Arc<RecordingMirror>,
    }

    fn harness(catalog: StaticCatalog, mirror: RecordingMirror, owner: CartOwner) -> Harness {
        let storage = MemoryStorage::<Cart>::default();
        let mirror = Arc::new(mirror);
        let store = CartStore::new(
            Box::new(storage.clone()),
            Arc::clone(&mirror) as Arc<dyn CartMirror>,
            Arc::new(catalog),
            owner,
        );
        Harness {
            store,
            storage,
            mirror,
        }
    }

    fn anonymous() -> CartOwner {
        CartOwner::Anonymous("t-1".to_owned())
    }

    async fn wait_for_calls(mirror: &RecordingMirror, n: usize) -> Vec<String> {
        for _ in 0..100 {
            let calls = mirror.calls.lock().unwrap().clone();
            if calls.len() >= n {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        mirror.calls.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_add_clamps_to_fresh_stock_and_opens_drawer() {
        let h = harness(
            StaticCatalog {
                variants: vec![variant("V1", 3)],
                ..StaticCatalog::default()
            },
            RecordingMirror::default(),
            anonymous(),
        );

        h.store.add(VariantId::new("V1"), 2).await.unwrap();
        let mutation = h.store.add(VariantId::new("V1"), 2).await.unwrap();

        assert_eq!(mutation.quantity, Some(3));
        assert!(mutation.drawer_open);
        assert_eq!(h.storage.get().quantity_of(&VariantId::new("V1")), Some(3));

        let calls = wait_for_calls(&h.mirror, 2).await;
        assert!(calls.contains(&"upsert anon:t-1 V1 3".to_owned()));
    }

    #[tokio::test]
    async fn test_add_unknown_variant_leaves_cart_untouched() {
        let h = harness(StaticCatalog::default(), RecordingMirror::default(), anonymous());
        let err = h.store.add(VariantId::new("nope"), 1).await.unwrap_err();
        assert!(matches!(err, CartServiceError::VariantNotFound(_)));
        assert!(h.storage.get().is_empty());
    }

    #[tokio::test]
    async fn test_mirror_failure_does_not_roll_back() {
        let h = harness(
            StaticCatalog {
                variants: vec![variant("V1", 5)],
                ..StaticCatalog::default()
            },
            RecordingMirror {
                fail: true,
                ..RecordingMirror::default()
            },
            anonymous(),
        );

        let mutation = h.store.add(VariantId::new("V1"), 1).await.unwrap();
        assert_eq!(mutation.quantity, Some(1));
        wait_for_calls(&h.mirror, 1).await;
        assert_eq!(h.storage.get().quantity_of(&VariantId::new("V1")), Some(1));
    }

    #[tokio::test]
    async fn test_set_quantity_without_stock_clamps_to_one_only() {
        let h = harness(
            StaticCatalog {
                variants: vec![variant("V1", 3)],
                fail_stock: false,
            },
            RecordingMirror::default(),
            anonymous(),
        );
        h.store.add(VariantId::new("V1"), 1).await.unwrap();

        let failing = CartStore::new(
            Box::new(h.storage.clone()),
            Arc::clone(&h.mirror) as Arc<dyn CartMirror>,
            Arc::new(StaticCatalog {
                variants: vec![variant("V1", 3)],
                fail_stock: true,
            }),
            anonymous(),
        );
        let mutation = failing.set_quantity(VariantId::new("V1"), 10).await.unwrap();
        assert_eq!(mutation.quantity, Some(10));

        let mutation = failing.set_quantity(VariantId::new("V1"), 0).await.unwrap();
        assert_eq!(mutation.quantity, Some(1));
    }

    #[tokio::test]
    async fn test_set_quantity_zero_stock_removes_line() {
        let storage = MemoryStorage::<Cart>::default();
        let mut cart = Cart::new();
        cart.add(VariantId::new("V1"), 2, 5).unwrap();
        storage.save(&cart).await.unwrap();

        let store = CartStore::new(
            Box::new(storage.clone()),
            Arc::new(RecordingMirror::default()),
            Arc::new(StaticCatalog {
                variants: vec![variant("V1", 0)],
                ..StaticCatalog::default()
            }),
            anonymous(),
        );
        let mutation = store.set_quantity(VariantId::new("V1"), 1).await.unwrap();
        assert_eq!(mutation.quantity, None);
        assert!(storage.get().is_empty());
    }

    #[tokio::test]
    async fn test_detailed_drops_unresolvable_lines_from_view_only() {
        let h = harness(
            StaticCatalog {
                variants: vec![variant("V1", 5)],
                ..StaticCatalog::default()
            },
            RecordingMirror::default(),
            anonymous(),
        );
        let mut cart = Cart::new();
        cart.add(VariantId::new("V1"), 2, 5).unwrap();
        cart.add(VariantId::new("gone"), 1, 5).unwrap();
        h.storage.save(&cart).await.unwrap();

        let view = h.store.detailed().await.unwrap();
        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.subtotal, Decimal::new(9998, 2));
        assert_eq!(view.count, 2);
        assert_eq!(h.storage.get().lines().len(), 2);
    }

    fn signed_in() -> CartOwner {
        CartOwner::User(sneaco_core::UserId::new("u-1"))
    }

    fn mirror_holding(lines: &[(&str, u32)]) -> RecordingMirror {
        let mirror = RecordingMirror::default();
        mirror.stored.lock().unwrap().extend(lines.iter().map(|(id, quantity)| CartLine {
            variant_id: VariantId::new(*id),
            quantity: *quantity,
        }));
        mirror
    }

    #[tokio::test]
    async fn test_adopt_mirror_clamps_to_fresh_stock() {
        let h = harness(
            StaticCatalog {
                variants: vec![variant("V1", 3), variant("V2", 0)],
                ..StaticCatalog::default()
            },
            mirror_holding(&[("V1", 5), ("V2", 1), ("gone", 1)]),
            signed_in(),
        );

        assert!(h.store.adopt_mirror().await);
        let cart = h.storage.get();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.quantity_of(&VariantId::new("V1")), Some(3));
    }

    #[tokio::test]
    async fn test_adopt_mirror_keeps_non_empty_local_cart() {
        let h = harness(
            StaticCatalog {
                variants: vec![variant("V1", 3), variant("V2", 3)],
                ..StaticCatalog::default()
            },
            mirror_holding(&[("V1", 2)]),
            signed_in(),
        );
        h.store.add(VariantId::new("V2"), 1).await.unwrap();

        assert!(!h.store.adopt_mirror().await);
        assert_eq!(h.storage.get().quantity_of(&VariantId::new("V1")), None);
    }

    #[tokio::test]
    async fn test_cleared_cart_stays_empty_while_mirror_lags() {
        // RecordingMirror::clear does not touch `stored`, like a delete that
        // has not landed or failed.
        let h = harness(
            StaticCatalog {
                variants: vec![variant("V1", 5)],
                ..StaticCatalog::default()
            },
            mirror_holding(&[("V1", 2)]),
            signed_in(),
        );
        assert!(h.store.adopt_mirror().await);
        assert_eq!(h.store.count().await.unwrap(), 2);

        h.store.clear().await.unwrap();

        let reopened = CartStore::new(
            Box::new(h.storage.clone()),
            Arc::clone(&h.mirror) as Arc<dyn CartMirror>,
            Arc::new(StaticCatalog {
                variants: vec![variant("V1", 5)],
                ..StaticCatalog::default()
            }),
            signed_in(),
        );
        assert_eq!(reopened.count().await.unwrap(), 0);
        assert!(reopened.detailed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_empties_and_clears_mirror() {
        let h = harness(
            StaticCatalog {
                variants: vec![variant("V1", 5)],
                ..StaticCatalog::default()
            },
            RecordingMirror::default(),
            anonymous(),
        );
        h.store.add(VariantId::new("V1"), 1).await.unwrap();
        h.store.clear().await.unwrap();

        assert!(h.storage.get().is_empty());
        let calls = wait_for_calls(&h.mirror, 2).await;
        assert!(calls.contains(&"clear anon:t-1".to_owned()));
    }
}
